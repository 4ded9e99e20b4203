use crate::{
    Connection, Error, PooledConnection, RawResult, Result, RowLabeled, RowStream, RowsAffected,
    Value, truncate_long,
};
use futures::StreamExt;
use std::{
    fmt::{self, Display, Formatter},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// Transaction lifecycle: `Unstarted → Active → {Committed, RolledBack}`.
/// Any transition outside that diagram is an [`Error::Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Unstarted,
    Active,
    Committed,
    RolledBack,
}

impl Display for TxState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxState::Unstarted => "unstarted",
            TxState::Active => "active",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled back",
        })
    }
}

/// One driver-native transaction over a pooled connection checkout.
///
/// At most one cursor may be in flight: starting another statement while a
/// prior [`ResultSet`] is unconsumed fails with
/// [`Error::ConcurrentCursor`] (the queueing alternative was rejected to
/// keep suspension points explicit).
pub struct Transaction<C: Connection> {
    conn: PooledConnection<C>,
    state: TxState,
    cursor_open: Arc<AtomicBool>,
}

impl<C: Connection> Transaction<C> {
    pub fn new(conn: PooledConnection<C>) -> Self {
        Self {
            conn,
            state: TxState::Unstarted,
            cursor_open: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != TxState::Active {
            return Err(Error::Transaction(format!(
                "operation requires an active transaction, state is {}",
                self.state
            )));
        }
        Ok(())
    }

    fn ensure_no_cursor(&self) -> Result<()> {
        if self.cursor_open.load(Ordering::Acquire) {
            return Err(Error::ConcurrentCursor);
        }
        Ok(())
    }

    pub async fn begin(&mut self) -> Result<()> {
        if self.state != TxState::Unstarted {
            return Err(Error::Transaction(format!(
                "cannot begin a transaction in state {}",
                self.state
            )));
        }
        log::debug!("beginning transaction");
        self.conn.begin().await?;
        self.state = TxState::Active;
        Ok(())
    }

    /// Runs `sql`, discards any rows and returns the affected-row count.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RowsAffected> {
        self.ensure_active()?;
        self.ensure_no_cursor()?;
        log::debug!("executing: {}", truncate_long!(sql));
        match self.conn.run(sql, params).await? {
            RawResult::Affected(affected) => Ok(affected),
            RawResult::Rows(mut rows) => {
                let mut count = 0;
                while let Some(row) = rows.next().await {
                    row?;
                    count += 1;
                }
                Ok(RowsAffected {
                    rows_affected: count,
                    last_affected_id: None,
                })
            }
        }
    }

    /// Runs `sql` and returns a streaming result set.
    pub async fn cursor(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.ensure_active()?;
        self.ensure_no_cursor()?;
        log::debug!("opening cursor: {}", truncate_long!(sql));
        let stream = match self.conn.run(sql, params).await? {
            RawResult::Rows(stream) => stream,
            RawResult::Affected(_) => futures::stream::empty::<Result<RowLabeled>>().boxed(),
        };
        self.cursor_open.store(true, Ordering::Release);
        Ok(ResultSet {
            stream,
            open: self.cursor_open.clone(),
            exhausted: false,
        })
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        log::debug!("committing transaction");
        self.conn.commit().await?;
        self.state = TxState::Committed;
        self.cursor_open.store(false, Ordering::Release);
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        log::debug!("rolling back transaction");
        self.conn.rollback().await?;
        self.state = TxState::RolledBack;
        self.cursor_open.store(false, Ordering::Release);
        Ok(())
    }
}

impl<C: Connection> Drop for Transaction<C> {
    fn drop(&mut self) {
        // A drop without commit/rollback leaves the backend transaction
        // open; the connection must not be recycled.
        if self.state == TxState::Active {
            log::warn!("transaction dropped while active, discarding its connection");
            self.conn.discard();
        }
    }
}

/// Lazy, forward-only, finite sequence of labeled rows. Not restartable
/// once consumed; dropping it releases the owning transaction's cursor
/// slot.
pub struct ResultSet {
    stream: RowStream,
    open: Arc<AtomicBool>,
    exhausted: bool,
}

impl ResultSet {
    /// Next row, or `None` once the set is exhausted.
    pub async fn fetch_row(&mut self) -> Result<Option<RowLabeled>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.stream.next().await {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => {
                self.close();
                Err(e)
            }
            None => {
                self.close();
                Ok(None)
            }
        }
    }

    /// Eagerly materializes all remaining rows for repeated access.
    pub async fn flatten(mut self) -> Result<Vec<RowLabeled>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn close(&mut self) {
        self.exhausted = true;
        self.open.store(false, Ordering::Release);
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}
