use std::collections::{BTreeMap, HashMap};

use crate::MatchError;

/// How the `author` field of a record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorFormat {
    /// BibTeX name list: entries separated by `and`, each either
    /// `Last, First` or `First Last`, with optional `{...}` protected groups.
    #[default]
    BibTeX,
    /// Canonical `First Last` names joined by commas, as written into
    /// literature-note front-matter.
    Joined,
}

/// A bibliographic record: a citation key plus a map of field name to value.
///
/// Field names are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BibRecord {
    pub key: String,
    pub fields: BTreeMap<String, String>,
    pub author_format: AuthorFormat,
}

impl BibRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_author_format(mut self, format: AuthorFormat) -> Self {
        self.author_format = format;
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(name.to_lowercase(), value.into());
    }

    /// Raw value of a field, exactly as loaded.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Trimmed value of a field, or `None` when absent or blank.
    ///
    /// Identity signals (DOI, ISSN, year, month) and required-field checks go
    /// through this so that an empty `doi:` line in a note counts as absent.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn has(&self, name: &str) -> bool {
        self.value(name).is_some()
    }
}

/// Insertion-ordered collection of records with unique keys.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<BibRecord>,
    index: HashMap<String, usize>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from records, failing on the first repeated key.
    pub fn from_records(records: impl IntoIterator<Item = BibRecord>) -> Result<Self, MatchError> {
        let mut set = Self::new();
        for record in records {
            set.insert(record)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, record: BibRecord) -> Result<(), MatchError> {
        if self.index.contains_key(&record.key) {
            return Err(MatchError::DuplicateKey {
                key: record.key,
                paths: vec![],
            });
        }
        self.index.insert(record.key.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&BibRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BibRecord> {
        self.records.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn as_slice(&self) -> &[BibRecord] {
        &self.records
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a BibRecord;
    type IntoIter = std::slice::Iter<'a, BibRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_lowercased() {
        let r = BibRecord::new("k").with_field("DOI", "10.1/x");
        assert_eq!(r.get("doi"), Some("10.1/x"));
        assert_eq!(r.get("DOI"), None);
    }

    #[test]
    fn test_blank_value_is_absent() {
        let r = BibRecord::new("k").with_field("doi", "   ");
        assert_eq!(r.get("doi"), Some("   "));
        assert_eq!(r.value("doi"), None);
        assert!(!r.has("doi"));
    }

    #[test]
    fn test_record_set_preserves_order() {
        let set = RecordSet::from_records([
            BibRecord::new("b"),
            BibRecord::new("a"),
            BibRecord::new("c"),
        ])
        .unwrap();
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert!(set.contains("a"));
        assert_eq!(set.get("c").unwrap().key, "c");
    }

    #[test]
    fn test_record_set_rejects_duplicate() {
        let err = RecordSet::from_records([BibRecord::new("a"), BibRecord::new("a")]).unwrap_err();
        assert_eq!(
            err,
            MatchError::DuplicateKey {
                key: "a".into(),
                paths: vec![],
            }
        );
    }
}
