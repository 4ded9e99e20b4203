use crate::{Error, Result, Value};
use std::{collections::HashMap, sync::Arc};

/// Semantic column type, mapped to backend-specific SQL type names by the
/// DDL surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Double,
    Decimal(u8, u8),
    Text,
    Blob,
    Date,
    Timestamp,
    Uuid,
    /// 32 bit auto-incrementing integer.
    Serial,
    /// 64 bit auto-incrementing integer.
    BigSerial,
}

impl ColumnType {
    pub fn is_serial(&self) -> bool {
        matches!(self, ColumnType::Serial | ColumnType::BigSerial)
    }

    /// Wraps a backend-generated integer identity into the value shape this
    /// column stores.
    pub fn integer_value(&self, id: i64) -> Option<Value> {
        match self {
            ColumnType::SmallInt => Some(Value::Int16(Some(id as i16))),
            ColumnType::Integer | ColumnType::Serial => Some(Value::Int32(Some(id as i32))),
            ColumnType::BigInt | ColumnType::BigSerial => Some(Value::Int64(Some(id))),
            _ => None,
        }
    }
}

/// Declarative specification of a table column.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub ctype: ColumnType,
    pub primary_key: bool,
    pub unique: bool,
    pub nullable: bool,
    pub autoincrement: bool,
    /// Owning table, filled in at registration.
    pub(crate) table: String,
}

impl Column {
    pub fn new(name: impl Into<String>, ctype: ColumnType) -> Self {
        Self {
            name: name.into(),
            ctype,
            primary_key: false,
            unique: false,
            nullable: true,
            autoincrement: ctype.is_serial(),
            table: String::new(),
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Ordered primary key column names. Order matters for compound key
/// equality and for the WHERE clauses of merge and remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub columns: Vec<String>,
}

/// Source columns on the owning table referencing the target table's
/// primary key columns, in matching order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub target_table: String,
    pub target_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Immutable relational metadata for one declared table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    primary_key: Option<PrimaryKey>,
    foreign_keys: Vec<ForeignKey>,
    indexes: Vec<Index>,
}

impl TableSchema {
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        define_table(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&PrimaryKey> {
        self.primary_key.as_ref()
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.primary_key
            .iter()
            .flat_map(|pk| pk.columns.iter())
            .filter_map(|name| self.column(name))
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.name == name)
    }

    /// All declared foreign keys pointing at `table`.
    pub fn foreign_keys_to<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.target_table == table)
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }
}

/// Accumulates a table declaration before validation. Obtained through
/// [`define_table`], consumed by [`SchemaRegistry::define`].
#[derive(Debug, Default)]
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    primary_key: Option<Vec<String>>,
    foreign_keys: Vec<(Vec<String>, String, Vec<String>)>,
    indexes: Vec<(String, Vec<String>, bool)>,
}

/// Starts a table declaration. The registered table name is the lower-cased
/// `name`.
pub fn define_table(name: impl Into<String>) -> TableBuilder {
    TableBuilder {
        name: name.into(),
        ..Default::default()
    }
}

impl TableBuilder {
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Explicit primary key, overriding the one derived from column flags.
    pub fn primary_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.primary_key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn foreign_key<S: Into<String>, T: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
        target_table: impl Into<String>,
        target_columns: impl IntoIterator<Item = T>,
    ) -> Self {
        self.foreign_keys.push((
            columns.into_iter().map(Into::into).collect(),
            target_table.into(),
            target_columns.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn index<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
        unique: bool,
    ) -> Self {
        self.indexes.push((
            name.into(),
            columns.into_iter().map(Into::into).collect(),
            unique,
        ));
        self
    }
}

/// Explicit schema context shared by sessions and the statement compiler.
///
/// Replaces process-wide mutable state: construct one per application (or
/// per test), register tables into it and pass it around. [`Self::clear`]
/// resets it between test cases.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a table declaration.
    ///
    /// Fails with [`Error::Schema`] on duplicate column names, a primary key
    /// referencing unknown columns, or a foreign key whose target table is
    /// unknown or whose target columns do not form that table's primary key.
    pub fn define(&mut self, builder: TableBuilder) -> Result<Arc<TableSchema>> {
        let name = builder.name.to_lowercase();
        if name.is_empty() {
            return Err(Error::Schema("table name must not be empty".into()));
        }
        let mut columns = builder.columns;
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::Schema(format!(
                    "duplicate column {} in table {}",
                    column.name, name
                )));
            }
        }
        for column in columns.iter_mut() {
            column.table = name.clone();
        }
        let primary_key = match builder.primary_key {
            Some(pk_columns) => {
                for pk_column in &pk_columns {
                    if !columns.iter().any(|c| &c.name == pk_column) {
                        return Err(Error::Schema(format!(
                            "primary key references unknown column {} in table {}",
                            pk_column, name
                        )));
                    }
                }
                for column in columns.iter_mut() {
                    if pk_columns.contains(&column.name) {
                        column.primary_key = true;
                        column.nullable = false;
                    }
                }
                Some(PrimaryKey {
                    columns: pk_columns,
                })
            }
            None => generate_primary_key(&columns),
        };
        let mut foreign_keys = Vec::with_capacity(builder.foreign_keys.len());
        for (fk_columns, target_table, target_columns) in builder.foreign_keys {
            let target_table = target_table.to_lowercase();
            for fk_column in &fk_columns {
                if !columns.iter().any(|c| &c.name == fk_column) {
                    return Err(Error::Schema(format!(
                        "foreign key references unknown column {} in table {}",
                        fk_column, name
                    )));
                }
            }
            // Self references are resolved against the table being defined.
            let target_pk = if target_table == name {
                primary_key.clone()
            } else {
                let target = self.tables.get(&target_table).ok_or_else(|| {
                    Error::Schema(format!(
                        "foreign key in table {} targets unknown table {}",
                        name, target_table
                    ))
                })?;
                target.primary_key.clone()
            };
            match target_pk {
                Some(pk) if pk.columns == target_columns => {}
                _ => {
                    return Err(Error::Schema(format!(
                        "foreign key in table {} targets {} ({}) which is not its primary key",
                        name,
                        target_table,
                        target_columns.join(", ")
                    )));
                }
            }
            foreign_keys.push(ForeignKey {
                name: format!("{}_{}_fkey", name, fk_columns.join("_")),
                columns: fk_columns,
                target_table,
                target_columns,
            });
        }
        let mut indexes = Vec::with_capacity(builder.indexes.len());
        for (index_name, index_columns, unique) in builder.indexes {
            for index_column in &index_columns {
                if !columns.iter().any(|c| &c.name == index_column) {
                    return Err(Error::Schema(format!(
                        "index {} references unknown column {} in table {}",
                        index_name, index_column, name
                    )));
                }
            }
            indexes.push(Index {
                name: index_name,
                table: name.clone(),
                columns: index_columns,
                unique,
            });
        }
        let schema = Arc::new(TableSchema {
            name: name.clone(),
            columns,
            primary_key,
            foreign_keys,
            indexes,
        });
        self.tables.insert(name, schema.clone());
        Ok(schema)
    }

    /// Appends a foreign key to an already registered table, rebuilding its
    /// schema. Mirrors ALTER TABLE ADD CONSTRAINT and is the way to declare
    /// mutually referencing tables, which cannot both name each other up
    /// front.
    pub fn add_foreign_key<S: Into<String>, T: Into<String>>(
        &mut self,
        table: &str,
        columns: impl IntoIterator<Item = S>,
        target_table: impl Into<String>,
        target_columns: impl IntoIterator<Item = T>,
    ) -> Result<Arc<TableSchema>> {
        let table = table.to_lowercase();
        let mut schema = self
            .tables
            .get(&table)
            .ok_or_else(|| Error::Schema(format!("unknown table {}", table)))?
            .as_ref()
            .clone();
        let fk_columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let target_table = target_table.into().to_lowercase();
        let target_columns: Vec<String> = target_columns.into_iter().map(Into::into).collect();
        for fk_column in &fk_columns {
            if !schema.columns.iter().any(|c| &c.name == fk_column) {
                return Err(Error::Schema(format!(
                    "foreign key references unknown column {} in table {}",
                    fk_column, table
                )));
            }
        }
        let target_pk = if target_table == table {
            schema.primary_key.clone()
        } else {
            let target = self.tables.get(&target_table).ok_or_else(|| {
                Error::Schema(format!(
                    "foreign key in table {} targets unknown table {}",
                    table, target_table
                ))
            })?;
            target.primary_key.clone()
        };
        match target_pk {
            Some(pk) if pk.columns == target_columns => {}
            _ => {
                return Err(Error::Schema(format!(
                    "foreign key in table {} targets {} ({}) which is not its primary key",
                    table,
                    target_table,
                    target_columns.join(", ")
                )));
            }
        }
        schema.foreign_keys.push(ForeignKey {
            name: format!("{}_{}_fkey", table, fk_columns.join("_")),
            columns: fk_columns,
            target_table,
            target_columns,
        });
        let schema = Arc::new(schema);
        self.tables.insert(table, schema.clone());
        Ok(schema)
    }

    pub fn table(&self, name: &str) -> Option<&Arc<TableSchema>> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableSchema>> {
        self.tables.values()
    }

    /// Drops every registered table, for test isolation.
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

/// Derives the primary key from columns flagged `primary_key`, composing a
/// compound key in declaration order when several are flagged.
pub fn generate_primary_key(columns: &[Column]) -> Option<PrimaryKey> {
    let pk_columns: Vec<String> = columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.clone())
        .collect();
    if pk_columns.is_empty() {
        None
    } else {
        Some(PrimaryKey {
            columns: pk_columns,
        })
    }
}
