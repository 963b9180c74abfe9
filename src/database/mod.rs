pub mod manager;
pub mod postgres;

pub use manager::{DatabaseError, DatabaseManager};
pub use postgres::PgLedgerStore;
