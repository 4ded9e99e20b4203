use crate::{
    Connection, Dialect, Error, Expr, Feature, ForeignKey, IdentityKey, Pool, Result, ResultSet,
    Row, RowLabeled, RowsAffected, SchemaRegistry, Statement, TableSchema, Transaction, TxState,
    col, lit,
};
use std::{collections::HashMap, sync::Arc};

/// A temporary window into the database: owns one transaction, tracks the
/// identity of every row it has persisted or loaded, and dispatches
/// add/merge/remove/truncate through the statement compiler.
///
/// The identity map guarantees at most one live persisted state per
/// identity within the session; the relationship cache memoizes foreign
/// key navigation per (row identity, foreign key) so mutually referencing
/// tables cannot recurse.
pub struct Session<C: Connection> {
    dialect: Dialect,
    registry: Arc<SchemaRegistry>,
    transaction: Transaction<C>,
    identity_map: HashMap<IdentityKey, Row>,
    relation_cache: HashMap<(IdentityKey, String), Vec<Row>>,
}

impl<C: Connection> Session<C> {
    /// Checks a connection out of `pool` and begins a transaction on it.
    pub async fn begin(
        pool: &Pool<C>,
        dialect: Dialect,
        registry: Arc<SchemaRegistry>,
    ) -> Result<Self> {
        let conn = pool.acquire().await?;
        let mut transaction = Transaction::new(conn);
        transaction.begin().await?;
        Ok(Self {
            dialect,
            registry,
            transaction,
            identity_map: HashMap::new(),
            relation_cache: HashMap::new(),
        })
    }

    /// Scoped session: commits on `Ok`, rolls back on `Err`, releases the
    /// pooled connection either way.
    pub async fn with<T, F>(
        pool: &Pool<C>,
        dialect: Dialect,
        registry: Arc<SchemaRegistry>,
        f: F,
    ) -> Result<T>
    where
        F: AsyncFnOnce(&mut Session<C>) -> Result<T>,
    {
        let mut session = Self::begin(pool, dialect, registry).await?;
        match f(&mut session).await {
            Ok(value) => {
                session.commit().await?;
                Ok(value)
            }
            Err(e) => {
                // Roll back before surfacing so no partially applied
                // transaction is left open.
                if let Err(rollback_error) = session.rollback().await {
                    log::error!("rollback after failure also failed: {:#}", rollback_error);
                }
                Err(e)
            }
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.transaction.commit().await
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.transaction.rollback().await
    }

    /// Releases the session, rolling back if the transaction is still
    /// active. Uncommitted work dies here.
    pub async fn close(mut self) -> Result<()> {
        if self.transaction.state() == TxState::Active {
            self.transaction.rollback().await?;
        }
        Ok(())
    }

    /// Inserts a detached row and attaches it.
    ///
    /// Database-generated identity values (serial columns) are written back
    /// onto the row, through RETURNING where the dialect supports it and
    /// the driver's last-insert id otherwise.
    pub async fn add(&mut self, row: &mut Row) -> Result<()> {
        if let Some(identity) = row.identity() {
            return Err(Error::AlreadyAttached {
                identity: identity.to_string(),
            });
        }
        let schema = row.schema().clone();
        log::debug!("adding row to {}", schema.name());
        let mut statement = Statement::insert(schema.name());
        for (name, value) in row.set_values() {
            statement = statement.set(name, value.clone());
        }
        let generated: Vec<&str> = schema
            .primary_key_columns()
            .filter(|c| row.get(&c.name).is_ok_and(|v| v.is_none()))
            .map(|c| c.name.as_str())
            .collect();
        if !generated.is_empty() && self.dialect.supports(Feature::Returning) {
            let statement = statement.returning(generated.iter().copied());
            let compiled = statement.compile(&self.dialect, &self.registry)?;
            let mut cursor = self.transaction.cursor(&compiled.sql, &compiled.params).await?;
            let returned = cursor.fetch_row().await?.ok_or_else(|| {
                Error::QueryBuild(format!(
                    "insert into {} returned no generated key row",
                    schema.name()
                ))
            })?;
            drop(cursor);
            for name in &generated {
                if let Some(value) = returned.get_column(name) {
                    row.set(name, value.clone())?;
                }
            }
        } else {
            let compiled = statement.compile(&self.dialect, &self.registry)?;
            let affected = self
                .transaction
                .execute(&compiled.sql, &compiled.params)
                .await?;
            if let ([name], Some(id)) = (generated.as_slice(), affected.last_affected_id) {
                let column = schema.column(name).ok_or_else(|| {
                    Error::Schema(format!("table {} lost column {}", schema.name(), name))
                })?;
                if let Some(value) = column.ctype.integer_value(id) {
                    row.set(name, value)?;
                }
            }
        }
        if let Some(identity) = row.compute_identity() {
            row.attach(identity.clone());
            self.identity_map.insert(identity, row.clone());
        } else {
            log::debug!(
                "row inserted into {} without a recoverable identity, leaving it detached",
                schema.name()
            );
        }
        Ok(())
    }

    /// Updates the dirty fields of a row carrying a primary key value.
    ///
    /// The dirty set is computed against the identity-mapped instance, or
    /// falls back to every set non-key field when none is loaded. An empty
    /// dirty set is a no-op that issues no UPDATE at all.
    pub async fn merge(&mut self, row: &mut Row) -> Result<()> {
        let identity = row.compute_identity().ok_or_else(|| {
            Error::QueryBuild(format!(
                "merge into {} requires a primary key value",
                row.table()
            ))
        })?;
        let dirty = match self.identity_map.get(&identity) {
            Some(baseline) => row.dirty_against(baseline),
            None => row.set_non_key_values(),
        };
        if dirty.is_empty() {
            log::debug!("merge into {} has no dirty fields, skipping", row.table());
            return Ok(());
        }
        let mut statement = Statement::update(row.table());
        for (name, value) in dirty {
            statement = statement.set(name, value);
        }
        statement = statement.filter(primary_key_filter(row)?);
        let compiled = statement.compile(&self.dialect, &self.registry)?;
        let affected = self
            .transaction
            .execute(&compiled.sql, &compiled.params)
            .await?;
        if affected.rows_affected == 0 {
            return Err(Error::NotFound {
                operation: "merge",
                table: row.table().to_owned(),
            });
        }
        row.attach(identity.clone());
        row.mark_clean();
        self.identity_map.insert(identity, row.clone());
        Ok(())
    }

    /// Deletes a row by primary key and detaches it.
    pub async fn remove(&mut self, row: &mut Row) -> Result<()> {
        let identity = row.compute_identity().ok_or_else(|| {
            Error::QueryBuild(format!(
                "remove from {} requires a primary key value",
                row.table()
            ))
        })?;
        let statement = Statement::delete(row.table()).filter(primary_key_filter(row)?);
        let compiled = statement.compile(&self.dialect, &self.registry)?;
        let affected = self
            .transaction
            .execute(&compiled.sql, &compiled.params)
            .await?;
        if affected.rows_affected == 0 {
            return Err(Error::NotFound {
                operation: "remove",
                table: row.table().to_owned(),
            });
        }
        self.identity_map.remove(&identity);
        self.relation_cache
            .retain(|(owner, _), _| owner != &identity);
        row.detach();
        Ok(())
    }

    /// Empties a table through TRUNCATE, or the mandatory DELETE fallback
    /// on dialects without it.
    pub async fn truncate(&mut self, table: &str) -> Result<RowsAffected> {
        let compiled = Statement::truncate(table).compile(&self.dialect, &self.registry)?;
        self.identity_map.retain(|key, _| key.table() != table);
        self.relation_cache
            .retain(|(owner, _), _| owner.table() != table);
        self.transaction.execute(&compiled.sql, &compiled.params).await
    }

    /// Raw SQL pass-through for what the builder cannot express.
    pub async fn execute(&mut self, sql: &str, params: &[crate::Value]) -> Result<RowsAffected> {
        self.transaction.execute(sql, params).await
    }

    /// Raw cursor pass-through.
    pub async fn cursor(&mut self, sql: &str, params: &[crate::Value]) -> Result<ResultSet> {
        self.transaction.cursor(sql, params).await
    }

    /// Fetches the first row of a raw query, closing the cursor afterward.
    pub async fn fetch(&mut self, sql: &str, params: &[crate::Value]) -> Result<Option<RowLabeled>> {
        let mut cursor = self.transaction.cursor(sql, params).await?;
        let row = cursor.fetch_row().await?;
        Ok(row)
    }

    /// Runs a compiled select and materializes the result into attached
    /// rows of `schema`, registering each in the identity map.
    pub async fn query(&mut self, statement: &Statement, schema: &Arc<TableSchema>) -> Result<Vec<Row>> {
        let compiled = statement.compile(&self.dialect, &self.registry)?;
        let cursor = self.transaction.cursor(&compiled.sql, &compiled.params).await?;
        let fetched = cursor.flatten().await?;
        let mut rows = Vec::with_capacity(fetched.len());
        for labeled in &fetched {
            let row = Row::from_fetched(schema, labeled)?;
            if let Some(identity) = row.identity() {
                self.identity_map.insert(identity.clone(), row.clone());
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Resolves the rows `fk` points at from `row`, through a fresh query.
    ///
    /// Results are memoized per (row identity, foreign key); mutually
    /// referencing tables therefore resolve each direction at most once
    /// per row instead of chasing references indefinitely. A NULL foreign
    /// key resolves to no rows.
    pub async fn related(&mut self, row: &Row, fk: &ForeignKey) -> Result<Vec<Row>> {
        let identity = row.identity().ok_or_else(|| {
            Error::QueryBuild(format!(
                "relationship navigation requires an attached row of {}",
                row.table()
            ))
        })?;
        let cache_key = (identity.clone(), fk.name.clone());
        if let Some(cached) = self.relation_cache.get(&cache_key) {
            return Ok(cached.clone());
        }
        let target_schema = self
            .registry
            .table(&fk.target_table)
            .ok_or_else(|| Error::QueryBuild(format!("unknown table {}", fk.target_table)))?
            .clone();
        let mut filter: Option<Expr> = None;
        for (source, target) in fk.columns.iter().zip(fk.target_columns.iter()) {
            let value = match row.get(source)? {
                Some(value) if !value.is_null() => value.clone(),
                _ => {
                    self.relation_cache.insert(cache_key, Vec::new());
                    return Ok(Vec::new());
                }
            };
            let pair = col("", target.clone()).eq(lit(value));
            filter = Some(match filter {
                Some(prior) => prior.and(pair),
                None => pair,
            });
        }
        let filter = filter.ok_or_else(|| {
            Error::QueryBuild(format!("foreign key {} declares no column pairs", fk.name))
        })?;
        let statement = Statement::select(&fk.target_table).filter(filter);
        let rows = self.query(&statement, &target_schema).await?;
        self.relation_cache.insert(cache_key, rows.clone());
        Ok(rows)
    }

    /// Sets a savepoint, on dialects that have them.
    pub async fn checkpoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_statement("SAVEPOINT ", name).await
    }

    /// Releases a savepoint.
    pub async fn uncheckpoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_statement("RELEASE SAVEPOINT ", name).await
    }

    /// Rolls back to a savepoint without ending the transaction.
    pub async fn rollback_to(&mut self, name: &str) -> Result<()> {
        self.savepoint_statement("ROLLBACK TO SAVEPOINT ", name).await
    }

    async fn savepoint_statement(&mut self, prefix: &str, name: &str) -> Result<()> {
        if !self.dialect.supports(Feature::Savepoints) {
            return Err(Error::UnsupportedFeature {
                feature: Feature::Savepoints,
                dialect: self.dialect.name(),
            });
        }
        let mut sql = String::from(prefix);
        self.dialect.quote_identifier(name, &mut sql);
        sql.push(';');
        self.transaction.execute(&sql, &[]).await?;
        Ok(())
    }
}

/// Equality conjunction over the row's primary key columns, in key order.
fn primary_key_filter(row: &Row) -> Result<Expr> {
    let pairs = row.primary_key_values().ok_or_else(|| {
        Error::QueryBuild(format!(
            "table {} has no complete primary key value",
            row.table()
        ))
    })?;
    let mut filter: Option<Expr> = None;
    for (name, value) in pairs {
        let pair = col("", name).eq(lit(value.clone()));
        filter = Some(match filter {
            Some(prior) => prior.and(pair),
            None => pair,
        });
    }
    filter.ok_or_else(|| Error::QueryBuild(format!("table {} has an empty primary key", row.table())))
}

