//! Flat records and per-resource-type record lists

use std::collections::{BTreeMap, HashMap};

/// One inventoried object: column name to string value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: HashMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) -> &mut Self {
        self.fields.insert(column.to_string(), value.into());
        self
    }

    /// Builder form of [`Record::set`]
    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Values in column order; columns this record lacks are empty
    pub fn row<'a>(&'a self, columns: &[String]) -> Vec<&'a str> {
        columns
            .iter()
            .map(|c| self.get(c).unwrap_or(""))
            .collect()
    }
}

/// Resource-type key to ordered records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assessment {
    records: BTreeMap<String, Vec<Record>>,
}

impl Assessment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, record: Record) {
        self.records.entry(key.to_string()).or_default().push(record);
    }

    pub fn extend(&mut self, key: &str, records: impl IntoIterator<Item = Record>) {
        self.records
            .entry(key.to_string())
            .or_default()
            .extend(records);
    }

    /// Append every list of `other` after this one's
    pub fn merge(&mut self, other: Assessment) {
        for (key, records) in other.records {
            self.records.entry(key).or_default().extend(records);
        }
    }

    pub fn records(&self, key: &str) -> &[Record] {
        self.records.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, key: &str) -> usize {
        self.records(key).len()
    }

    pub fn total(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}
