//! Record, join-key, and columnar batch types.
//!
//! Records are ordered field maps so that matching and pair generation stay
//! scan-order stable across runs. A missing field is an absent key; `null`
//! cells are dropped when flattening so "present" always means "usable".

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use crate::constants::fields;
use crate::errors::PairsetError;
use crate::types::{FieldName, FieldValue};

/// One row of a loaded dataset after column-name canonicalization, or one
/// finished example on the output side of the pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<FieldName, FieldValue>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object, dropping `null` cells.
    pub fn from_value(value: Value) -> Result<Self, PairsetError> {
        let Value::Object(map) = value else {
            return Err(PairsetError::Data(format!(
                "expected a JSON object record, got: {value}"
            )));
        };
        let mut record = Self::new();
        for (name, cell) in map {
            if !cell.is_null() {
                record.fields.insert(name, cell);
            }
        }
        Ok(record)
    }

    /// Convert into a JSON object in field order.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields.into_iter().collect())
    }

    /// Raw cell lookup.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Mutable cell lookup.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldValue> {
        self.fields.get_mut(name)
    }

    /// Cell lookup treating `null` as absent.
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).filter(|cell| !cell.is_null())
    }

    /// Non-empty text cell, or `None` for absent/null/empty/non-string.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
    }

    /// Insert or replace a cell. New keys append at the end, preserving
    /// insertion order.
    pub fn insert(&mut self, name: impl Into<FieldName>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Remove a cell, keeping the order of the remaining fields.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.shift_remove(name)
    }

    /// Whether a cell exists under `name` (including `null` cells).
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldName, &FieldValue)> {
        self.fields.iter()
    }

    /// Field names in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse the join key from the `id` cell.
    pub fn join_id(&self) -> Result<RecordId, PairsetError> {
        self.value(fields::ID)
            .and_then(RecordId::from_value)
            .ok_or_else(|| {
                PairsetError::Data(format!(
                    "record participating in a join has no comparable 'id' field: {:?}",
                    self.field_names().collect::<Vec<_>>()
                ))
            })
    }

    /// Keep only the named fields, in the order given.
    pub fn project(self, names: &[&str]) -> Self {
        let mut projected = Self::new();
        let mut fields = self.fields;
        for name in names {
            if let Some(value) = fields.shift_remove(*name) {
                projected.fields.insert((*name).to_string(), value);
            }
        }
        projected
    }
}

impl FromIterator<(FieldName, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (FieldName, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (FieldName, FieldValue);
    type IntoIter = indexmap::map::IntoIter<FieldName, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Totally ordered join key parsed from a record's `id` cell.
///
/// Integers order numerically and sort before strings, which keeps the merge
/// order total even when joined datasets disagree on id representation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordId {
    /// Numeric id.
    Int(i64),
    /// String id.
    Text(String),
}

impl RecordId {
    /// Parse an id cell; booleans, arrays, objects, and floats are not
    /// usable join keys.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_i64().map(RecordId::Int),
            Value::String(text) => Some(RecordId::Text(text.clone())),
            _ => None,
        }
    }

    /// Convert back into a record cell.
    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Int(id) => Value::from(*id),
            RecordId::Text(id) => Value::String(id.clone()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{id}"),
            RecordId::Text(id) => write!(f, "{id}"),
        }
    }
}

/// Columnar slice of rows: field name mapped to an equal-length column of
/// cells, in column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnarBatch {
    columns: IndexMap<FieldName, Vec<FieldValue>>,
}

impl ColumnarBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a batch from prebuilt columns, validating equal lengths.
    pub fn from_columns(
        columns: IndexMap<FieldName, Vec<FieldValue>>,
    ) -> Result<Self, PairsetError> {
        let mut lengths = columns.values().map(Vec::len);
        if let Some(first) = lengths.next()
            && lengths.any(|len| len != first)
        {
            return Err(PairsetError::Data(format!(
                "columnar batch has unequal column lengths: {:?}",
                columns
                    .iter()
                    .map(|(name, cells)| (name.as_str(), cells.len()))
                    .collect::<Vec<_>>()
            )));
        }
        Ok(Self { columns })
    }

    /// Columnarize rows over the union of their field names, filling fields
    /// missing on a given row with `null`.
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: IndexMap<FieldName, Vec<FieldValue>> = IndexMap::new();
        for record in records {
            for name in record.field_names() {
                columns.entry(name.to_string()).or_default();
            }
        }
        for (idx, record) in records.iter().enumerate() {
            for (name, column) in &mut columns {
                column.push(record.get(name).cloned().unwrap_or(Value::Null));
            }
            debug_assert!(columns.values().all(|column| column.len() == idx + 1));
        }
        Self { columns }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.columns.values().next().map(Vec::len).unwrap_or(0)
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    /// Column names in column order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Whether the batch carries a column named `name`.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Immutable column access.
    pub fn column(&self, name: &str) -> Option<&[FieldValue]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Mutable column access.
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<FieldValue>> {
        self.columns.get_mut(name)
    }

    /// Rename a column only when `from` exists and `to` does not.
    /// Idempotent: returns false (and changes nothing) otherwise.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if !self.columns.contains_key(from) || self.columns.contains_key(to) {
            return false;
        }
        if let Some(index) = self.columns.get_index_of(from) {
            let (_, cells) = self.columns.shift_remove_index(index).unwrap_or_default();
            self.columns.shift_insert(index, to.to_string(), cells);
            return true;
        }
        false
    }

    /// Extract one row as a flat record, dropping `null` cells.
    pub fn row(&self, idx: usize) -> Record {
        let mut record = Record::new();
        for (name, cells) in &self.columns {
            if let Some(cell) = cells.get(idx)
                && !cell.is_null()
            {
                record.insert(name.clone(), cell.clone());
            }
        }
        record
    }

    /// Flatten the whole batch into per-row records, dropping `null` cells.
    pub fn into_records(self) -> Vec<Record> {
        (0..self.rows()).map(|idx| self.row(idx)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_from_value_drops_null_cells() {
        let record =
            Record::from_value(json!({"id": 1, "eng_text": "hi", "speaker_id": null})).unwrap();
        assert_eq!(record.len(), 2);
        assert!(!record.contains("speaker_id"));
        assert_eq!(record.text("eng_text"), Some("hi"));
    }

    #[test]
    fn record_from_value_rejects_non_objects() {
        let err = Record::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, PairsetError::Data(_)));
    }

    #[test]
    fn text_excludes_empty_and_non_string_cells() {
        let record = Record::from_value(json!({"a": "", "b": 7, "c": "ok"})).unwrap();
        assert_eq!(record.text("a"), None);
        assert_eq!(record.text("b"), None);
        assert_eq!(record.text("c"), Some("ok"));
        assert_eq!(record.text("missing"), None);
    }

    #[test]
    fn record_ids_order_ints_before_strings() {
        let one = RecordId::from_value(&json!(1)).unwrap();
        let two = RecordId::from_value(&json!(2)).unwrap();
        let alpha = RecordId::from_value(&json!("alpha")).unwrap();
        let beta = RecordId::from_value(&json!("beta")).unwrap();
        assert!(one < two);
        assert!(alpha < beta);
        assert!(two < alpha);
        assert_eq!(RecordId::from_value(&json!(true)), None);
        assert_eq!(RecordId::from_value(&json!(1.5)), None);
    }

    #[test]
    fn join_id_requires_a_comparable_id_cell() {
        let record = Record::from_value(json!({"eng_text": "hi"})).unwrap();
        assert!(matches!(record.join_id(), Err(PairsetError::Data(_))));

        let record = Record::from_value(json!({"id": 41})).unwrap();
        assert_eq!(record.join_id().unwrap(), RecordId::Int(41));
    }

    #[test]
    fn from_columns_rejects_unequal_lengths() {
        let mut columns = IndexMap::new();
        columns.insert("id".to_string(), vec![json!(1), json!(2)]);
        columns.insert("text".to_string(), vec![json!("a")]);
        assert!(matches!(
            ColumnarBatch::from_columns(columns),
            Err(PairsetError::Data(_))
        ));
    }

    #[test]
    fn columnarize_and_flatten_round_trips_sparse_rows() {
        let left = Record::from_value(json!({"id": 1, "eng_text": "hi"})).unwrap();
        let right = Record::from_value(json!({"id": 2, "lug_text": "ki"})).unwrap();
        let batch = ColumnarBatch::from_records(&[left.clone(), right.clone()]);

        assert_eq!(batch.rows(), 2);
        assert_eq!(
            batch.column_names().collect::<Vec<_>>(),
            vec!["id", "eng_text", "lug_text"]
        );
        // Null fill is dropped again on the way out.
        assert_eq!(batch.into_records(), vec![left, right]);
    }

    #[test]
    fn rename_column_is_idempotent_and_never_overwrites() {
        let mut columns = IndexMap::new();
        columns.insert("ids".to_string(), vec![json!(1)]);
        columns.insert("text".to_string(), vec![json!("a")]);
        let mut batch = ColumnarBatch::from_columns(columns).unwrap();

        assert!(batch.rename_column("ids", "id"));
        assert_eq!(batch.column_names().collect::<Vec<_>>(), vec!["id", "text"]);
        // Synonym gone: second application is a no-op.
        assert!(!batch.rename_column("ids", "id"));
        // Canonical name already present: no overwrite.
        assert!(!batch.rename_column("text", "id"));
        assert_eq!(batch.column("id").unwrap(), &[json!(1)]);
    }

    #[test]
    fn project_keeps_only_named_fields_in_order() {
        let record =
            Record::from_value(json!({"target": "t", "source": "s", "source.language": "eng"}))
                .unwrap();
        let projected = record.project(&["source", "target"]);
        assert_eq!(
            projected.field_names().collect::<Vec<_>>(),
            vec!["source", "target"]
        );
    }
}
