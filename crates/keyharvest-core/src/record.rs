//! Records and record sets with last-occurrence-wins deduplication

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::value::Value;

static NULL: Value = Value::Null;

/// An insertion-ordered mapping from field name to scalar value.
///
/// A field missing from the map reads as [`Value::Null`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(IndexMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> &Value {
        self.0.get(field).unwrap_or(&NULL)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Ordered sequence of records sharing a dedup field.
///
/// Tracks the union of field names in first-appearance order so every
/// backend can persist the set as a rectangular table.
#[derive(Debug, Clone)]
pub struct RecordSet {
    dedup_field: String,
    columns: Vec<String>,
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(dedup_field: impl Into<String>) -> Self {
        Self {
            dedup_field: dedup_field.into(),
            columns: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn from_records(
        dedup_field: impl Into<String>,
        records: impl IntoIterator<Item = Record>,
    ) -> Self {
        let mut set = Self::new(dedup_field);
        for record in records {
            set.push(record);
        }
        set
    }

    /// Build a set with a fixed column order (used when decoding artifacts).
    pub fn with_columns(dedup_field: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            dedup_field: dedup_field.into(),
            columns,
            records: Vec::new(),
        }
    }

    /// Re-key the set on another dedup field (records are untouched).
    pub fn with_dedup_field(mut self, dedup_field: impl Into<String>) -> Self {
        self.dedup_field = dedup_field.into();
        self
    }

    pub fn dedup_field(&self) -> &str {
        &self.dedup_field
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn push(&mut self, record: Record) {
        for field in record.fields() {
            if !self.columns.iter().any(|c| c == field) {
                self.columns.push(field.to_string());
            }
        }
        self.records.push(record);
    }

    /// Append all records of `other`, keeping this set's dedup field.
    pub fn extend(&mut self, other: RecordSet) {
        for column in other.columns {
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self.records.extend(other.records);
    }

    /// Values of one column, null where a record lacks the field.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.records.iter().map(move |r| r.get(column))
    }

    /// Drop every record whose dedup value occurs again later in the set.
    ///
    /// Survivors keep their relative order; records with a null dedup value
    /// are never collapsed. Returns the number of records removed.
    pub fn dedup(&mut self) -> usize {
        if !self.columns.iter().any(|c| *c == self.dedup_field) {
            return 0;
        }

        let tokens: Vec<Option<String>> = self
            .records
            .iter()
            .map(|r| r.get(&self.dedup_field).dedup_token())
            .collect();

        let mut last_seen: FxHashMap<&str, usize> = FxHashMap::default();
        for (idx, token) in tokens.iter().enumerate() {
            if let Some(t) = token {
                last_seen.insert(t.as_str(), idx);
            }
        }

        let before = self.records.len();
        let keep: Vec<bool> = tokens
            .iter()
            .enumerate()
            .map(|(idx, token)| match token {
                Some(t) => last_seen.get(t.as_str()) == Some(&idx),
                None => true,
            })
            .collect();
        let mut flags = keep.into_iter();
        self.records.retain(|_| flags.next().unwrap_or(true));

        before - self.records.len()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Logical equality: same dedup field, same columns in the same order and,
/// per column, equal values (a missing field equals null).
impl PartialEq for RecordSet {
    fn eq(&self, other: &Self) -> bool {
        self.dedup_field == other.dedup_field
            && self.columns == other.columns
            && self.records.len() == other.records.len()
            && self.records.iter().zip(&other.records).all(|(a, b)| {
                self.columns
                    .iter()
                    .all(|c| a.get(c) == b.get(c))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(uri: i64, text: &str) -> Record {
        Record::new().with("uri", uri).with("text", text)
    }

    fn texts(set: &RecordSet) -> Vec<String> {
        set.column_values("text").map(|v| v.to_string()).collect()
    }

    #[test]
    fn columns_follow_first_appearance() {
        let set = RecordSet::from_records(
            "uri",
            [
                Record::new().with("uri", 1).with("a", "x"),
                Record::new().with("b", 2).with("uri", 2),
            ],
        );
        assert_eq!(set.columns(), ["uri", "a", "b"]);
    }

    #[test]
    fn missing_field_reads_null() {
        let r = Record::new().with("uri", 1);
        assert_eq!(r.get("text"), &Value::Null);
    }

    #[test]
    fn dedup_keeps_last_occurrence_position() {
        let mut set = RecordSet::from_records(
            "uri",
            [post(1, "x"), post(2, "a"), post(1, "y"), post(3, "z")],
        );
        let removed = set.dedup();
        assert_eq!(removed, 1);
        assert_eq!(texts(&set), ["a", "y", "z"]);
    }

    #[test]
    fn dedup_is_idempotent() {
        let mut set = RecordSet::from_records("uri", [post(1, "x"), post(1, "y")]);
        set.dedup();
        let once = set.clone();
        assert_eq!(set.dedup(), 0);
        assert_eq!(set, once);
    }

    #[test]
    fn dedup_leaves_null_keys_alone() {
        let mut set = RecordSet::from_records(
            "uri",
            [
                Record::new().with("text", "a"),
                Record::new().with("uri", Value::Null).with("text", "b"),
                post(1, "c"),
            ],
        );
        assert_eq!(set.dedup(), 0);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn dedup_without_dedup_column_is_noop() {
        let mut set = RecordSet::from_records(
            "post_id",
            [post(1, "x"), post(1, "x")],
        );
        assert_eq!(set.dedup(), 0);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn dedup_does_not_conflate_kinds() {
        let mut set = RecordSet::from_records(
            "uri",
            [
                Record::new().with("uri", 1),
                Record::new().with("uri", "1"),
            ],
        );
        assert_eq!(set.dedup(), 0);
    }

    #[test]
    fn extend_merges_columns() {
        let mut a = RecordSet::from_records("uri", [post(1, "x")]);
        let b = RecordSet::from_records("uri", [Record::new().with("uri", 2).with("score", 5)]);
        a.extend(b);
        assert_eq!(a.columns(), ["uri", "text", "score"]);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn equality_treats_missing_as_null() {
        let a = RecordSet::from_records(
            "uri",
            [post(1, "x"), Record::new().with("uri", 2)],
        );
        let b = RecordSet::from_records(
            "uri",
            [post(1, "x"), Record::new().with("uri", 2).with("text", Value::Null)],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn equality_respects_order() {
        let a = RecordSet::from_records("uri", [post(1, "x"), post(2, "y")]);
        let b = RecordSet::from_records("uri", [post(2, "y"), post(1, "x")]);
        assert_ne!(a, b);
    }
}
