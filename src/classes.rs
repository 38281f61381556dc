//! Class-name table.
//!
//! Detectors emit integer class ids; the table maps them to labels. It is loaded once per
//! `CounterContext` from an Ultralytics-style `data.yaml`, whose `names` key is either a list or an
//! index→name mapping.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::error::CountError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassTable {
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DataYaml {
    names: NamesField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NamesField {
    List(Vec<String>),
    Map(BTreeMap<u32, String>),
}

impl ClassTable {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(anyhow!("class table must contain at least one name"));
        }
        if let Some(idx) = names.iter().position(|name| name.trim().is_empty()) {
            return Err(anyhow!("class table entry {} is empty", idx));
        }
        Ok(Self { names })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read class table {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid class table {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let data: DataYaml = serde_yaml::from_str(raw)?;
        let names = match data.names {
            NamesField::List(names) => names,
            NamesField::Map(map) => {
                // Ids must be dense so that index == class id.
                for (expected, id) in map.keys().enumerate() {
                    if *id as usize != expected {
                        return Err(anyhow!(
                            "class ids must be contiguous from 0 (missing id {})",
                            expected
                        ));
                    }
                }
                map.into_values().collect()
            }
        };
        Self::new(names)
    }

    /// Resolve a class id; ids outside the table are fatal for the invocation.
    pub fn resolve(&self, class_id: u32) -> Result<&str, CountError> {
        self.names
            .get(class_id as usize)
            .map(String::as_str)
            .ok_or(CountError::UnknownClass {
                class_id,
                table_len: self.names.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_list_and_map_layouts() -> Result<()> {
        let list = ClassTable::from_yaml("names: [grain, husk]\nnc: 2\n")?;
        assert_eq!(list.names(), &["grain".to_string(), "husk".to_string()]);

        let map = ClassTable::from_yaml("names:\n  0: grain\n  1: husk\n")?;
        assert_eq!(map, list);
        Ok(())
    }

    #[test]
    fn rejects_sparse_map() {
        assert!(ClassTable::from_yaml("names:\n  0: grain\n  2: husk\n").is_err());
    }

    #[test]
    fn unknown_class_is_an_error() -> Result<()> {
        let table = ClassTable::new(vec!["grain".to_string()])?;
        assert_eq!(table.resolve(0)?, "grain");
        match table.resolve(3) {
            Err(CountError::UnknownClass {
                class_id,
                table_len,
            }) => {
                assert_eq!(class_id, 3);
                assert_eq!(table_len, 1);
            }
            other => panic!("expected UnknownClass, got {:?}", other),
        }
        Ok(())
    }
}
