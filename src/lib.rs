mod connection;
mod ddl;
mod dialect;
mod error;
mod expression;
mod pool;
mod row;
mod schema;
mod session;
mod statement;
mod transaction;
mod util;
mod value;
mod writer;

pub use connection::*;
pub use ddl::*;
pub use dialect::*;
pub use error::*;
pub use expression::*;
pub use pool::*;
pub use row::*;
pub use schema::*;
pub use session::*;
pub use statement::*;
pub use transaction::*;
pub use util::*;
pub use value::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;
