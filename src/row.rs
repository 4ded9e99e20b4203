use crate::{Error, Result, RowLabeled, TableSchema, Value};
use std::{fmt, sync::Arc};

/// Session-scoped identity of a persisted row: table name plus the
/// canonical encoding of its primary key tuple, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    table: String,
    encoded: String,
}

impl IdentityKey {
    pub(crate) fn new(table: &str, key_values: &[Value]) -> Self {
        let mut encoded = String::new();
        for (i, value) in key_values.iter().enumerate() {
            if i > 0 {
                encoded.push('\u{1f}');
            }
            value.write_literal(&mut encoded);
        }
        Self {
            table: table.to_owned(),
            encoded,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.table, self.encoded.replace('\u{1f}', ", "))
    }
}

/// A schema-conformant object holding current column values, the snapshot
/// of their last persisted state, and, once persisted, an identity key.
///
/// Rows start detached; they attach when added to a session and flushed or
/// when materialized from a query result, and detach again on remove. The
/// identity key never changes while attached.
#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<TableSchema>,
    /// Aligned with `schema.columns()`; `None` means never set, which is
    /// distinct from an explicit SQL NULL.
    values: Vec<Option<Value>>,
    snapshot: Vec<Option<Value>>,
    identity: Option<IdentityKey>,
}

impl Row {
    /// A new detached row with every column unset.
    pub fn new(schema: &Arc<TableSchema>) -> Self {
        let width = schema.columns().len();
        Self {
            schema: schema.clone(),
            values: vec![None; width],
            snapshot: vec![None; width],
            identity: None,
        }
    }

    /// Materializes a fetched result row; the returned row is attached when
    /// the result carries all primary key columns.
    pub fn from_fetched(schema: &Arc<TableSchema>, fetched: &RowLabeled) -> Result<Self> {
        let mut row = Self::new(schema);
        for column in schema.columns() {
            if let Some(value) = fetched.get_column(&column.name) {
                row.set(&column.name, value.clone())?;
            }
        }
        row.snapshot = row.values.clone();
        row.identity = row.compute_identity();
        Ok(row)
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn table(&self) -> &str {
        self.schema.name()
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let index = self.column_index(column)?;
        self.values[index] = Some(value.into());
        Ok(self)
    }

    /// Current value of `column`; `Ok(None)` when unset.
    pub fn get(&self, column: &str) -> Result<Option<&Value>> {
        let index = self.column_index(column)?;
        Ok(self.values[index].as_ref())
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.schema.column_index(column).ok_or_else(|| {
            Error::Schema(format!(
                "table {} has no column {}",
                self.schema.name(),
                column
            ))
        })
    }

    /// Explicitly set columns with their values, in schema declaration
    /// order.
    pub fn set_values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .columns()
            .iter()
            .zip(self.values.iter())
            .filter_map(|(column, value)| value.as_ref().map(|v| (column.name.as_str(), v)))
    }

    pub fn identity(&self) -> Option<&IdentityKey> {
        self.identity.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.identity.is_some()
    }

    /// Primary key column/value pairs in key order, `None` when the table
    /// has no key or any key column is unset.
    pub fn primary_key_values(&self) -> Option<Vec<(&str, &Value)>> {
        let pk = self.schema.primary_key()?;
        let mut pairs = Vec::with_capacity(pk.columns.len());
        for name in &pk.columns {
            let index = self.schema.column_index(name)?;
            pairs.push((name.as_str(), self.values[index].as_ref()?));
        }
        Some(pairs)
    }

    pub(crate) fn compute_identity(&self) -> Option<IdentityKey> {
        let pairs = self.primary_key_values()?;
        let values: Vec<Value> = pairs.into_iter().map(|(_, v)| v.clone()).collect();
        Some(IdentityKey::new(self.schema.name(), &values))
    }

    /// Non-key columns whose value differs from `baseline`'s.
    pub(crate) fn dirty_against(&self, baseline: &Row) -> Vec<(String, Value)> {
        let pk = self.schema.primary_key();
        let mut dirty = Vec::new();
        for (index, column) in self.schema.columns().iter().enumerate() {
            if pk.is_some_and(|pk| pk.columns.contains(&column.name)) {
                continue;
            }
            if let Some(value) = &self.values[index] {
                if baseline.values[index].as_ref() != Some(value) {
                    dirty.push((column.name.clone(), value.clone()));
                }
            }
        }
        dirty
    }

    /// Every explicitly set non-key column; the dirty set used when no
    /// baseline instance is loaded in the session.
    pub(crate) fn set_non_key_values(&self) -> Vec<(String, Value)> {
        let pk = self.schema.primary_key();
        self.set_values()
            .filter(|(name, _)| !pk.is_some_and(|pk| pk.columns.iter().any(|c| c == name)))
            .map(|(name, value)| (name.to_owned(), value.clone()))
            .collect()
    }

    pub(crate) fn attach(&mut self, identity: IdentityKey) {
        self.identity = Some(identity);
        self.snapshot = self.values.clone();
    }

    pub(crate) fn mark_clean(&mut self) {
        self.snapshot = self.values.clone();
    }

    pub(crate) fn detach(&mut self) {
        self.identity = None;
        self.snapshot = vec![None; self.values.len()];
    }
}
