use crate::Feature;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy of the crate.
///
/// Every error surfaces synchronously to the caller of the failing
/// operation. The only sanctioned substitution is the TRUNCATE to DELETE
/// fallback performed by the statement compiler, which is not an error.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed table, column or key declaration. Never retried.
    #[error("schema error: {0}")]
    Schema(String),

    /// The dialect lacks a capability and no emulation is registered.
    #[error("dialect {dialect} does not support {feature} and no emulation is registered")]
    UnsupportedFeature {
        feature: Feature,
        dialect: &'static str,
    },

    /// More than one foreign key connects the joined tables and no explicit
    /// ON condition was given.
    #[error(
        "ambiguous join between {left} and {right}: {candidates} foreign keys connect them, \
         provide an explicit ON condition"
    )]
    AmbiguousJoin {
        left: String,
        right: String,
        candidates: usize,
    },

    /// Local compilation failure, fixable only by changing the query.
    #[error("cannot build query: {0}")]
    QueryBuild(String),

    /// Illegal transaction state transition.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A merge or remove affected zero rows.
    #[error("{operation} on table {table} affected no rows")]
    NotFound {
        operation: &'static str,
        table: String,
    },

    /// `Session::add` was called on a row that already carries an identity.
    #[error("row is already attached with identity {identity}")]
    AlreadyAttached { identity: String },

    /// A second cursor or statement was requested while a prior result set
    /// on the same transaction is still unconsumed.
    #[error("a result set is still open on this transaction")]
    ConcurrentCursor,

    /// Raised by the external connector, propagated unchanged.
    #[error(transparent)]
    Connection(#[from] anyhow::Error),
}
