use crate::{
    Dialect, Error, Expr, Feature, Order, Ordered, Result, SchemaRegistry, TableSchema,
    UpsertSyntax, Value, col,
    writer::SqlWriter,
};
use std::fmt::Write;

/// Output of statement compilation: SQL text plus the ordered parameter
/// list matching its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSql {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinType {
    fn keyword(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub kind: JoinType,
    pub table: String,
    /// Explicit join condition; when absent the compiler resolves it from
    /// the declared foreign keys.
    pub on: Option<Expr>,
}

#[derive(Debug, Clone)]
enum StatementKind {
    Select {
        columns: Vec<Expr>,
        joins: Vec<JoinSpec>,
        order_by: Vec<Ordered>,
        limit: Option<u64>,
    },
    Insert {
        values: Vec<(String, Value)>,
        /// `Some` turns the insert into an upsert updating the listed
        /// columns (all inserted non-key columns when empty).
        on_conflict_update: Option<Vec<String>>,
        returning: Vec<String>,
    },
    Update {
        assignments: Vec<(String, Value)>,
    },
    Delete,
    Truncate,
}

/// A declarative query object: immutable once handed to [`Self::compile`],
/// which is pure and deterministic. Build one through the
/// [`Statement::select`], [`Statement::insert`], [`Statement::update`],
/// [`Statement::delete`] or [`Statement::truncate`] constructors.
#[derive(Debug, Clone)]
pub struct Statement {
    table: String,
    kind: StatementKind,
    filter: Option<Expr>,
}

impl Statement {
    pub fn select(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind: StatementKind::Select {
                columns: Vec::new(),
                joins: Vec::new(),
                order_by: Vec::new(),
                limit: None,
            },
            filter: None,
        }
    }

    pub fn insert(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind: StatementKind::Insert {
                values: Vec::new(),
                on_conflict_update: None,
                returning: Vec::new(),
            },
            filter: None,
        }
    }

    pub fn update(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind: StatementKind::Update {
                assignments: Vec::new(),
            },
            filter: None,
        }
    }

    pub fn delete(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind: StatementKind::Delete,
            filter: None,
        }
    }

    pub fn truncate(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind: StatementKind::Truncate,
            filter: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_insert(&self) -> bool {
        matches!(self.kind, StatementKind::Insert { .. })
    }

    /// Column/value pairs of an insert, in the order they were set. Useful
    /// to emulation rewrites that need to rebuild the statement.
    pub fn insert_values(&self) -> Option<&[(String, Value)]> {
        match &self.kind {
            StatementKind::Insert { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Adds a projected column expression; a select without any projects
    /// `*`.
    pub fn column(mut self, expr: Expr) -> Self {
        if let StatementKind::Select { columns, .. } = &mut self.kind {
            columns.push(expr);
        }
        self
    }

    pub fn columns(mut self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        if let StatementKind::Select { columns, .. } = &mut self.kind {
            columns.extend(exprs);
        }
        self
    }

    /// Joins `table`, resolving the condition through declared foreign keys
    /// at compile time.
    pub fn join(self, kind: JoinType, table: impl Into<String>) -> Self {
        self.push_join(JoinSpec {
            kind,
            table: table.into(),
            on: None,
        })
    }

    /// Joins `table` with an explicit ON condition.
    pub fn join_on(self, kind: JoinType, table: impl Into<String>, on: Expr) -> Self {
        self.push_join(JoinSpec {
            kind,
            table: table.into(),
            on: Some(on),
        })
    }

    fn push_join(mut self, spec: JoinSpec) -> Self {
        if let StatementKind::Select { joins, .. } = &mut self.kind {
            joins.push(spec);
        }
        self
    }

    /// Adds a predicate, AND-combined with any previously set one.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(prior) => prior.and(expr),
            None => expr,
        });
        self
    }

    pub fn order_by(mut self, expr: Expr, order: Order) -> Self {
        if let StatementKind::Select { order_by, .. } = &mut self.kind {
            order_by.push(Ordered {
                expression: expr,
                order,
            });
        }
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        if let StatementKind::Select { limit, .. } = &mut self.kind {
            *limit = Some(n);
        }
        self
    }

    /// Sets a column value on an insert or update, kept in call order.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self.kind {
            StatementKind::Insert { values, .. } => values.push((column.into(), value.into())),
            StatementKind::Update { assignments } => {
                assignments.push((column.into(), value.into()))
            }
            _ => {}
        }
        self
    }

    /// Turns an insert into an upsert updating every inserted non-key
    /// column on conflict.
    pub fn upsert(mut self) -> Self {
        if let StatementKind::Insert {
            on_conflict_update, ..
        } = &mut self.kind
        {
            *on_conflict_update = Some(Vec::new());
        }
        self
    }

    /// Turns an insert into an upsert updating only `columns` on conflict.
    pub fn upsert_columns<S: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        if let StatementKind::Insert {
            on_conflict_update, ..
        } = &mut self.kind
        {
            *on_conflict_update = Some(columns.into_iter().map(Into::into).collect());
        }
        self
    }

    pub fn returning<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        if let StatementKind::Insert { returning, .. } = &mut self.kind {
            returning.extend(columns.into_iter().map(Into::into));
        }
        self
    }

    /// Compiles to `(sql, params)` for `dialect`. Pure: no side effects,
    /// identical output for identical input.
    pub fn compile(&self, dialect: &Dialect, registry: &SchemaRegistry) -> Result<CompiledSql> {
        self.compile_inner(dialect, registry, false)
    }

    fn compile_inner(
        &self,
        dialect: &Dialect,
        registry: &SchemaRegistry,
        emulated: bool,
    ) -> Result<CompiledSql> {
        let mut writer = SqlWriter::new(dialect);
        match &self.kind {
            StatementKind::Select {
                columns,
                joins,
                order_by,
                limit,
            } => self.write_select(&mut writer, registry, columns, joins, order_by, *limit)?,
            StatementKind::Insert {
                values,
                on_conflict_update,
                returning,
            } => {
                if let Some(update_columns) = on_conflict_update {
                    if dialect.upsert_syntax() == UpsertSyntax::Unsupported {
                        if emulated {
                            return Err(Error::UnsupportedFeature {
                                feature: Feature::Upsert,
                                dialect: dialect.name(),
                            });
                        }
                        let substitute = dialect.emulate(Feature::Upsert, self)?;
                        return substitute.compile_inner(dialect, registry, true);
                    }
                    self.write_insert(&mut writer, registry, values, Some(update_columns.as_slice()))?;
                } else {
                    self.write_insert(&mut writer, registry, values, None)?;
                }
                if !returning.is_empty() {
                    if !dialect.supports(Feature::Returning) {
                        if emulated {
                            return Err(Error::UnsupportedFeature {
                                feature: Feature::Returning,
                                dialect: dialect.name(),
                            });
                        }
                        let substitute = dialect.emulate(Feature::Returning, self)?;
                        return substitute.compile_inner(dialect, registry, true);
                    }
                    writer.push("\nRETURNING ");
                    let names = returning.iter().map(String::as_str);
                    write_identifier_list(&mut writer, names);
                }
                writer.push(";");
            }
            StatementKind::Update { assignments } => self.write_update(&mut writer, assignments)?,
            StatementKind::Delete => {
                writer.push("DELETE FROM ");
                writer.write_identifier(&self.table);
                self.write_filter(&mut writer, false);
                writer.push(";");
            }
            StatementKind::Truncate => {
                // Mandatory fallback: row removal semantics are preserved on
                // dialects without TRUNCATE even though identity counters
                // are not reset.
                if dialect.supports(Feature::Truncate) {
                    writer.push("TRUNCATE TABLE ");
                } else {
                    writer.push("DELETE FROM ");
                }
                writer.write_identifier(&self.table);
                writer.push(";");
            }
        }
        Ok(writer.finish())
    }

    fn write_select(
        &self,
        writer: &mut SqlWriter,
        registry: &SchemaRegistry,
        columns: &[Expr],
        joins: &[JoinSpec],
        order_by: &[Ordered],
        limit: Option<u64>,
    ) -> Result<()> {
        let qualify = !joins.is_empty();
        writer.push("SELECT ");
        if columns.is_empty() {
            writer.push("*");
        } else {
            let mut first = true;
            for column in columns {
                if !first {
                    writer.push(", ");
                }
                first = false;
                writer.write_expr(column, qualify);
            }
        }
        writer.push("\nFROM ");
        writer.write_identifier(&self.table);
        for join in joins {
            writer.push(" ");
            writer.push(join.kind.keyword());
            writer.push(" ");
            writer.write_identifier(&join.table);
            if join.kind == JoinType::Cross {
                continue;
            }
            writer.push(" ON ");
            match &join.on {
                Some(on) => writer.write_expr(on, true),
                None => {
                    let on = resolve_join(registry, &self.table, &join.table)?;
                    writer.write_expr(&on, true);
                }
            }
        }
        self.write_filter(writer, qualify);
        if !order_by.is_empty() {
            writer.push("\nORDER BY ");
            let mut first = true;
            for ordered in order_by {
                if !first {
                    writer.push(", ");
                }
                first = false;
                writer.write_expr(&ordered.expression, qualify);
                writer.push(match ordered.order {
                    Order::Asc => " ASC",
                    Order::Desc => " DESC",
                });
            }
        }
        if let Some(limit) = limit {
            let _ = write!(writer.sql, "\nLIMIT {}", limit);
        }
        writer.push(";");
        Ok(())
    }

    fn write_insert(
        &self,
        writer: &mut SqlWriter,
        registry: &SchemaRegistry,
        values: &[(String, Value)],
        upsert: Option<&[String]>,
    ) -> Result<()> {
        if values.is_empty() {
            return Err(Error::QueryBuild(format!(
                "insert into {} sets no columns",
                self.table
            )));
        }
        writer.push("INSERT INTO ");
        writer.write_identifier(&self.table);
        writer.push(" (");
        write_identifier_list(writer, values.iter().map(|(name, _)| name.as_str()));
        writer.push(") VALUES\n(");
        let mut first = true;
        for (_, value) in values {
            if !first {
                writer.push(", ");
            }
            first = false;
            writer.write_param(value.clone());
        }
        writer.push(")");
        if let Some(update_columns) = upsert {
            self.write_upsert_fragment(writer, registry, values, update_columns)?;
        }
        Ok(())
    }

    /// Conflict clause in the dialect's native shape. The conflict target
    /// is always the table's primary key.
    fn write_upsert_fragment(
        &self,
        writer: &mut SqlWriter,
        registry: &SchemaRegistry,
        values: &[(String, Value)],
        update_columns: &[String],
    ) -> Result<()> {
        let schema = lookup_table(registry, &self.table)?;
        let pk = schema.primary_key().ok_or_else(|| {
            Error::QueryBuild(format!(
                "upsert on {} requires a primary key to detect conflicts",
                self.table
            ))
        })?;
        let targets: Vec<&str> = if update_columns.is_empty() {
            values
                .iter()
                .map(|(name, _)| name.as_str())
                .filter(|name| !pk.columns.iter().any(|pk_col| pk_col == name))
                .collect()
        } else {
            update_columns.iter().map(String::as_str).collect()
        };
        if targets.is_empty() {
            return Err(Error::QueryBuild(format!(
                "upsert on {} has no non-key columns to update",
                self.table
            )));
        }
        match writer.dialect.upsert_syntax() {
            UpsertSyntax::OnConflict => {
                writer.push("\nON CONFLICT (");
                write_identifier_list(writer, pk.columns.iter().map(String::as_str));
                writer.push(") DO UPDATE SET ");
                let mut first = true;
                for target in &targets {
                    if !first {
                        writer.push(", ");
                    }
                    first = false;
                    writer.write_identifier(target);
                    writer.push(" = EXCLUDED.");
                    writer.write_identifier(target);
                }
            }
            UpsertSyntax::OnDuplicateKey => {
                writer.push("\nON DUPLICATE KEY UPDATE ");
                let mut first = true;
                for target in &targets {
                    if !first {
                        writer.push(", ");
                    }
                    first = false;
                    writer.write_identifier(target);
                    writer.push(" = VALUES(");
                    writer.write_identifier(target);
                    writer.push(")");
                }
            }
            UpsertSyntax::Unsupported => unreachable!("checked before writing the insert"),
        }
        Ok(())
    }

    fn write_update(&self, writer: &mut SqlWriter, assignments: &[(String, Value)]) -> Result<()> {
        if assignments.is_empty() {
            return Err(Error::QueryBuild(format!(
                "update of {} sets no columns",
                self.table
            )));
        }
        writer.push("UPDATE ");
        writer.write_identifier(&self.table);
        writer.push(" SET ");
        let mut first = true;
        for (name, value) in assignments {
            if !first {
                writer.push(", ");
            }
            first = false;
            writer.write_identifier(name);
            writer.push(" = ");
            writer.write_param(value.clone());
        }
        self.write_filter(writer, false);
        writer.push(";");
        Ok(())
    }

    fn write_filter(&self, writer: &mut SqlWriter, qualify: bool) {
        if let Some(filter) = &self.filter {
            writer.push("\nWHERE ");
            writer.write_expr(filter, qualify);
        }
    }
}

fn lookup_table<'r>(
    registry: &'r SchemaRegistry,
    name: &str,
) -> Result<&'r std::sync::Arc<TableSchema>> {
    registry
        .table(name)
        .ok_or_else(|| Error::QueryBuild(format!("unknown table {}", name)))
}

fn write_identifier_list<'a>(writer: &mut SqlWriter, names: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for name in names {
        if !first {
            writer.push(", ");
        }
        first = false;
        writer.write_identifier(name);
    }
}

/// Derives the ON condition for a join without an explicit one from the
/// foreign keys declared between the two tables, in either direction.
/// Exactly one foreign key must connect them.
fn resolve_join(registry: &SchemaRegistry, left: &str, right: &str) -> Result<Expr> {
    let left_schema = lookup_table(registry, left)?;
    let right_schema = lookup_table(registry, right)?;
    let mut candidates = Vec::new();
    for fk in left_schema.foreign_keys_to(right) {
        candidates.push((left.to_owned(), fk));
    }
    for fk in right_schema.foreign_keys_to(left) {
        candidates.push((right.to_owned(), fk));
    }
    match candidates.len() {
        0 => Err(Error::QueryBuild(format!(
            "no foreign key relates {} and {}, provide an explicit ON condition",
            left, right
        ))),
        1 => {
            let (owner, fk) = &candidates[0];
            let mut condition: Option<Expr> = None;
            for (source, target) in fk.columns.iter().zip(fk.target_columns.iter()) {
                let pair = col(owner.clone(), source.clone())
                    .eq(col(fk.target_table.clone(), target.clone()));
                condition = Some(match condition {
                    Some(prior) => prior.and(pair),
                    None => pair,
                });
            }
            condition.ok_or_else(|| {
                Error::QueryBuild(format!(
                    "foreign key {} declares no column pairs",
                    fk.name
                ))
            })
        }
        n => Err(Error::AmbiguousJoin {
            left: left.to_owned(),
            right: right.to_owned(),
            candidates: n,
        }),
    }
}
