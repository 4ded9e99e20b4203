use crate::{
    Column, ColumnType, CompiledSql, Dialect, Error, Feature, Index, Result, RowLabeled,
    TableBuilder, TableSchema, Value, define_table, separated_by,
};
use std::fmt::Write;

fn write_column_type(out: &mut String, dialect: &Dialect, column: &Column) {
    match column.ctype {
        ColumnType::Boolean => out.push_str("BOOLEAN"),
        ColumnType::SmallInt => out.push_str("SMALLINT"),
        ColumnType::Integer => out.push_str("INTEGER"),
        ColumnType::BigInt => out.push_str("BIGINT"),
        ColumnType::Double => out.push_str("DOUBLE PRECISION"),
        ColumnType::Decimal(precision, scale) => {
            out.push_str("DECIMAL");
            if (precision, scale) != (0, 0) {
                let _ = write!(out, "({},{})", precision, scale);
            }
        }
        ColumnType::Text => out.push_str("TEXT"),
        ColumnType::Blob => out.push_str("BLOB"),
        ColumnType::Date => out.push_str("DATE"),
        ColumnType::Timestamp => out.push_str("TIMESTAMP"),
        ColumnType::Uuid => out.push_str("UUID"),
        ColumnType::Serial => out.push_str(dialect.serial_type(false)),
        ColumnType::BigSerial => out.push_str(dialect.serial_type(true)),
    }
}

fn write_column_fragment(out: &mut String, dialect: &Dialect, schema: &TableSchema, column: &Column) {
    let pk = schema.primary_key();
    let single_pk =
        pk.is_some_and(|pk| pk.columns.len() == 1 && pk.columns[0] == column.name);
    let composite_pk =
        pk.is_some_and(|pk| pk.columns.len() > 1 && pk.columns.contains(&column.name));
    dialect.quote_identifier(&column.name, out);
    out.push(' ');
    write_column_type(out, dialect, column);
    if !column.nullable && !single_pk {
        out.push_str(" NOT NULL");
    }
    if single_pk {
        out.push_str(" PRIMARY KEY");
        if column.autoincrement && !dialect.auto_increment_clause().is_empty() {
            out.push(' ');
            out.push_str(dialect.auto_increment_clause());
        }
    } else if column.autoincrement && !dialect.auto_increment_clause().is_empty() {
        out.push(' ');
        out.push_str(dialect.auto_increment_clause());
    }
    if column.unique && !single_pk && !composite_pk {
        out.push_str(" UNIQUE");
    }
    // Single-column foreign keys render inline; composite ones become a
    // table-level clause.
    for fk in schema.foreign_keys() {
        if fk.columns.len() == 1 && fk.columns[0] == column.name {
            out.push_str(" REFERENCES ");
            dialect.quote_identifier(&fk.target_table, out);
            out.push('(');
            dialect.quote_identifier(&fk.target_columns[0], out);
            out.push(')');
        }
    }
}

/// Emits the CREATE TABLE statement for `schema`.
pub fn create_table(schema: &TableSchema, dialect: &Dialect, if_not_exists: bool) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("CREATE TABLE ");
    if if_not_exists {
        out.push_str("IF NOT EXISTS ");
    }
    dialect.quote_identifier(schema.name(), &mut out);
    out.push_str(" (\n");
    separated_by(
        &mut out,
        schema.columns(),
        |out, column| write_column_fragment(out, dialect, schema, column),
        ",\n",
    );
    if let Some(pk) = schema.primary_key() {
        if pk.columns.len() > 1 {
            out.push_str(",\nPRIMARY KEY (");
            separated_by(
                &mut out,
                &pk.columns,
                |out, name| dialect.quote_identifier(name, out),
                ", ",
            );
            out.push(')');
        }
    }
    for fk in schema.foreign_keys() {
        if fk.columns.len() > 1 {
            out.push_str(",\nFOREIGN KEY (");
            separated_by(
                &mut out,
                &fk.columns,
                |out, name| dialect.quote_identifier(name, out),
                ", ",
            );
            out.push_str(") REFERENCES ");
            dialect.quote_identifier(&fk.target_table, &mut out);
            out.push_str(" (");
            separated_by(
                &mut out,
                &fk.target_columns,
                |out, name| dialect.quote_identifier(name, out),
                ", ",
            );
            out.push(')');
        }
    }
    out.push_str("\n);");
    out
}

/// Emits the CREATE INDEX statement for `index`.
pub fn create_index(index: &Index, dialect: &Dialect, if_not_exists: bool) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("CREATE ");
    if index.unique {
        out.push_str("UNIQUE ");
    }
    out.push_str("INDEX ");
    if if_not_exists {
        out.push_str("IF NOT EXISTS ");
    }
    dialect.quote_identifier(&index.name, &mut out);
    out.push_str(" ON ");
    dialect.quote_identifier(&index.table, &mut out);
    out.push_str(" (");
    separated_by(
        &mut out,
        &index.columns,
        |out, name| dialect.quote_identifier(name, out),
        ", ",
    );
    out.push_str(");");
    out
}

/// Builds the dialect's index-introspection statement for `table`.
///
/// The SQLite variant inlines the identifier because PRAGMA arguments
/// cannot be bound.
pub fn get_indexes(table: &str, dialect: &Dialect) -> Result<CompiledSql> {
    if !dialect.supports(Feature::IndexIntrospection) {
        return Err(Error::UnsupportedFeature {
            feature: Feature::IndexIntrospection,
            dialect: dialect.name(),
        });
    }
    let compiled = match dialect.name() {
        "postgres" => CompiledSql {
            sql: "SELECT indexname, indexdef FROM pg_indexes WHERE tablename = $1;".into(),
            params: vec![Value::Varchar(Some(table.to_owned()))],
        },
        "mysql" => CompiledSql {
            sql: "SELECT index_name, column_name, non_unique FROM \
                  information_schema.statistics WHERE table_name = ? ORDER BY \
                  index_name, seq_in_index;"
                .into(),
            params: vec![Value::Varchar(Some(table.to_owned()))],
        },
        "sqlite" => {
            let mut sql = String::from("PRAGMA index_list(");
            dialect.quote_identifier(table, &mut sql);
            sql.push_str(");");
            CompiledSql {
                sql,
                params: Vec::new(),
            }
        }
        name => {
            return Err(Error::UnsupportedFeature {
                feature: Feature::IndexIntrospection,
                dialect: name,
            });
        }
    };
    Ok(compiled)
}

/// Reflects an introspected column listing back into a table declaration.
///
/// Expects one row per column with labels `column_name`, `data_type`,
/// `nullable` and `primary_key`; the caller registers the returned builder
/// to obtain a validated [`TableSchema`].
pub fn generate_schema(table: &str, rows: &[RowLabeled]) -> Result<TableBuilder> {
    let mut builder = define_table(table);
    for row in rows {
        let name = match row.get_column("column_name") {
            Some(Value::Varchar(Some(name))) => name.clone(),
            _ => {
                return Err(Error::Schema(
                    "introspection row lacks a column_name label".into(),
                ));
            }
        };
        let ctype = match row.get_column("data_type") {
            Some(Value::Varchar(Some(data_type))) => parse_data_type(data_type)?,
            _ => {
                return Err(Error::Schema(format!(
                    "introspection row for {} lacks a data_type label",
                    name
                )));
            }
        };
        let mut column = Column::new(name, ctype);
        if let Some(Value::Boolean(Some(false))) = row.get_column("nullable") {
            column = column.not_null();
        }
        if let Some(Value::Boolean(Some(true))) = row.get_column("primary_key") {
            column = column.primary_key();
        }
        builder = builder.column(column);
    }
    Ok(builder)
}

fn parse_data_type(name: &str) -> Result<ColumnType> {
    let normalized = name.to_lowercase();
    Ok(match normalized.as_str() {
        "bool" | "boolean" => ColumnType::Boolean,
        "smallint" | "int2" => ColumnType::SmallInt,
        "int" | "integer" | "int4" => ColumnType::Integer,
        "bigint" | "int8" => ColumnType::BigInt,
        "real" | "float8" | "double" | "double precision" => ColumnType::Double,
        "numeric" | "decimal" => ColumnType::Decimal(0, 0),
        "text" | "varchar" | "character varying" => ColumnType::Text,
        "blob" | "bytea" => ColumnType::Blob,
        "date" => ColumnType::Date,
        "uuid" => ColumnType::Uuid,
        "serial" => ColumnType::Serial,
        "bigserial" => ColumnType::BigSerial,
        _ if normalized.starts_with("timestamp") => ColumnType::Timestamp,
        _ => {
            return Err(Error::Schema(format!(
                "cannot map reflected data type {}",
                name
            )));
        }
    })
}
