use serde::Serialize;

use crate::error::CountError;

/// Horizontal counting line with a symmetric, inclusive tolerance band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CountingLine {
    y: i32,
    tolerance: i32,
}

impl CountingLine {
    pub fn new(y: i32, tolerance: i32) -> Result<Self, CountError> {
        if tolerance < 0 {
            return Err(CountError::invalid(format!(
                "tolerance must be >= 0, got {}",
                tolerance
            )));
        }
        Ok(Self { y, tolerance })
    }

    /// `floor(0.4 * height)`.
    pub fn default_y(frame_height: u32) -> i32 {
        (u64::from(frame_height) * 2 / 5) as i32
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn tolerance(&self) -> i32 {
        self.tolerance
    }

    /// Inclusive band bounds `(y - tolerance, y + tolerance)`.
    pub fn band(&self) -> (i64, i64) {
        let y = i64::from(self.y);
        let t = i64::from(self.tolerance);
        (y - t, y + t)
    }

    pub fn contains(&self, y: i32) -> bool {
        let (low, high) = self.band();
        (low..=high).contains(&i64::from(y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_is_inclusive() -> Result<(), CountError> {
        let line = CountingLine::new(100, 5)?;
        assert!(line.contains(95));
        assert!(line.contains(105));
        assert!(!line.contains(94));
        assert!(!line.contains(106));
        Ok(())
    }

    #[test]
    fn zero_tolerance_is_exact() -> Result<(), CountError> {
        let line = CountingLine::new(10, 0)?;
        assert!(line.contains(10));
        assert!(!line.contains(11));
        Ok(())
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let err = CountingLine::new(10, -1).err();
        assert_eq!(err.map(|e| e.kind()), Some("invalid_options"));
    }

    #[test]
    fn default_line_is_floor_of_forty_percent() {
        assert_eq!(CountingLine::default_y(480), 192);
        assert_eq!(CountingLine::default_y(1080), 432);
        assert_eq!(CountingLine::default_y(7), 2);
        assert_eq!(CountingLine::default_y(0), 0);
    }

    #[test]
    fn extreme_values_do_not_overflow() -> Result<(), CountError> {
        let line = CountingLine::new(i32::MAX, i32::MAX)?;
        assert!(line.contains(i32::MAX));
        assert!(line.contains(0));
        Ok(())
    }
}
