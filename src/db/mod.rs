//! Optional PostgreSQL journal of trades and order states.

mod journal;
mod pool;
mod schema;

pub use journal::spawn_journal;
pub use pool::DatabasePool;
pub use schema::*;
