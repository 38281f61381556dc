use serde::{Deserialize, Serialize};

/// Axis-aligned box in integer frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Truncates toward zero, as integer pixel conversion of model output does.
    pub fn from_f32(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32)
    }

    /// x1 <= x2 and y1 <= y2.
    pub fn is_well_formed(&self) -> bool {
        self.x1 <= self.x2 && self.y1 <= self.y2
    }

    /// Centre with floor division.
    pub fn center(&self) -> Point {
        Point {
            x: (self.x1 as i64 + self.x2 as i64).div_euclid(2) as i32,
            y: (self.y1 as i64 + self.y2 as i64).div_euclid(2) as i32,
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        if !self.is_well_formed() {
            return 0;
        }
        self.width() as i64 * self.height() as i64
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }
        let inter = (ix2 - ix1) as i64 * (iy2 - iy1) as i64;
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            return 0.0;
        }
        inter as f32 / union as f32
    }
}

/// One object observation in one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Present only in tracking mode, and only when the tracker assigned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u64>,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
            track_id: None,
        }
    }

    pub fn with_track_id(mut self, track_id: u64) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}

/// Class-wise non-maximum suppression: keeps the most confident box of every overlapping
/// same-class group whose IoU exceeds `iou_threshold`.
pub fn suppress_overlaps(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let overlaps = keep.iter().any(|kept| {
            kept.class_id == det.class_id && kept.bbox.iou(&det.bbox) > iou_threshold
        });
        if !overlaps {
            keep.push(det);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_uses_floor_division() {
        assert_eq!(BoundingBox::new(0, 0, 5, 9).center(), Point { x: 2, y: 4 });
        assert_eq!(BoundingBox::new(-5, -3, 0, 0).center(), Point { x: -3, y: -2 });
    }

    #[test]
    fn malformed_boxes_are_detected() {
        assert!(BoundingBox::new(1, 1, 1, 1).is_well_formed());
        assert!(!BoundingBox::new(5, 0, 4, 10).is_well_formed());
        assert!(!BoundingBox::new(0, 5, 4, 4).is_well_formed());
        assert_eq!(BoundingBox::new(5, 0, 4, 10).area(), 0);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(20, 20, 30, 30);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
        let half = BoundingBox::new(5, 0, 15, 10);
        assert!((a.iou(&half) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn suppression_is_per_class() {
        let dets = vec![
            Detection::new(0, 0.6, BoundingBox::new(0, 0, 10, 10)),
            Detection::new(0, 0.9, BoundingBox::new(1, 1, 11, 11)),
            Detection::new(1, 0.5, BoundingBox::new(0, 0, 10, 10)),
        ];
        let kept = suppress_overlaps(dets, 0.5);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 1);
    }
}
