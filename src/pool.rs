use crate::{Connection, Error, Result};
use anyhow::anyhow;
use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed-size connection pool. The only resource shared across concurrent
/// sessions; checkout and return are serialized behind the idle-list mutex
/// while waiters park on the semaphore.
pub struct Pool<C: Connection> {
    idle: Arc<Mutex<Vec<C>>>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl<C: Connection> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            idle: self.idle.clone(),
            permits: self.permits.clone(),
            capacity: self.capacity,
        }
    }
}

impl<C: Connection> Pool<C> {
    /// Builds a pool over already-established connections; drivers call
    /// this from `Connector::connect`.
    pub fn new(connections: Vec<C>) -> Self {
        let capacity = connections.len();
        Self {
            idle: Arc::new(Mutex::new(connections)),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Checks a connection out, waiting until one is idle. The guard
    /// returns it on drop.
    pub async fn acquire(&self) -> Result<PooledConnection<C>> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Connection(anyhow!("pool is closed: {e}")))?;
        let conn = self
            .idle
            .lock()
            .expect("pool mutex poisoned")
            .pop()
            .expect("semaphore permit implies an idle connection");
        Ok(PooledConnection {
            conn: Some(conn),
            idle: self.idle.clone(),
            permit: Some(permit),
            discard: false,
        })
    }
}

/// Checked-out connection guard. Dropping it returns the connection to the
/// pool, unless it was discarded for being in an indeterminate
/// transactional state, in which case the pool permanently shrinks instead
/// of recycling it.
pub struct PooledConnection<C: Connection> {
    conn: Option<C>,
    idle: Arc<Mutex<Vec<C>>>,
    permit: Option<OwnedSemaphorePermit>,
    discard: bool,
}

impl<C: Connection> PooledConnection<C> {
    /// Marks the connection as unreturnable.
    pub(crate) fn discard(&mut self) {
        self.discard = true;
    }
}

impl<C: Connection> Deref for PooledConnection<C> {
    type Target = C;
    fn deref(&self) -> &C {
        self.conn.as_ref().expect("connection taken before drop")
    }
}

impl<C: Connection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("connection taken before drop")
    }
}

impl<C: Connection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let conn = self.conn.take();
        let permit = self.permit.take();
        if self.discard {
            log::warn!("discarding a connection left in an indeterminate state");
            if let Some(permit) = permit {
                permit.forget();
            }
            return;
        }
        if let Some(conn) = conn {
            self.idle.lock().expect("pool mutex poisoned").push(conn);
        }
        drop(permit);
    }
}
