use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CountError;

/// Final per-class counts of one invocation. Immutable once built.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSnapshot {
    total_count: u64,
    counts_by_class: BTreeMap<String, u64>,
}

impl CountSnapshot {
    /// Build a snapshot, verifying `total_count == Σ counts_by_class`.
    pub fn new(counts_by_class: BTreeMap<String, u64>, total_count: u64) -> Result<Self, CountError> {
        let class_sum = counts_by_class
            .values()
            .try_fold(0u64, |acc, n| acc.checked_add(*n));
        match class_sum {
            Some(sum) if sum == total_count => Ok(Self {
                total_count,
                counts_by_class,
            }),
            other => Err(CountError::Inconsistent {
                total: total_count,
                class_sum: other.unwrap_or(u64::MAX),
            }),
        }
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn counts_by_class(&self) -> &BTreeMap<String, u64> {
        &self.counts_by_class
    }

    /// Count for one class; 0 when it was never counted.
    pub fn count_of(&self, class_name: &str) -> u64 {
        self.counts_by_class.get(class_name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inconsistent_totals() {
        let counts = BTreeMap::from([("grain".to_string(), 2), ("husk".to_string(), 1)]);
        assert!(CountSnapshot::new(counts.clone(), 3).is_ok());
        let err = CountSnapshot::new(counts, 4).err();
        assert_eq!(err.map(|e| e.kind()), Some("inconsistent"));
    }

    #[test]
    fn serializes_as_result_document() -> Result<(), Box<dyn std::error::Error>> {
        let counts = BTreeMap::from([("grain".to_string(), 2)]);
        let snapshot = CountSnapshot::new(counts, 2)?;
        let json = serde_json::to_value(&snapshot)?;
        assert_eq!(
            json,
            serde_json::json!({"total_count": 2, "counts_by_class": {"grain": 2}})
        );
        Ok(())
    }
}
