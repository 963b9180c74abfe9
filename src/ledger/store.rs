// ledger/store.rs - Persistence seam for the reservation ledger
//
// The ledger drives the reservation protocol; a store only executes the
// individual steps. Everything that touches `disponibilite` goes through a
// UnitOfWork, whose row locks are held until commit or rollback.

use async_trait::async_trait;
use thiserror::Error;

use super::models::{Child, ChildUpdate, ChildWithFacility, Facility, FacilityUpdate, NewChild, NewFacility, SlotCount};

/// Errors raised by a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Waiting for a row lock exceeded the configured bound
    #[error("timed out waiting for a row lock")]
    LockTimeout,

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                // lock_not_available, raised when lock_timeout expires
                Some("55P03") => return StoreError::LockTimeout,
                // foreign_key_violation, check_violation
                Some("23503") | Some("23514") => return StoreError::Constraint(db.message().to_string()),
                _ => {}
            }
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Sqlx(other),
        }
    }
}

/// Non-transactional access plus the entry point for units of work
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Start an all-or-nothing sequence of store operations
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Single write of a child that holds no facility slot
    async fn insert_unbound_child(&self, child: &NewChild) -> Result<Child, StoreError>;

    async fn find_child(&self, id: i32) -> Result<Option<Child>, StoreError>;

    async fn list_children(&self) -> Result<Vec<Child>, StoreError>;

    /// Children of one parent, each with its facility's name and address
    async fn children_of_parent(&self, parent_id: i32) -> Result<Vec<ChildWithFacility>, StoreError>;

    /// Touches only `nom` and `age`; waits for the child row lock
    async fn update_child(&self, id: i32, update: &ChildUpdate) -> Result<Option<Child>, StoreError>;

    async fn insert_facility(&self, facility: &NewFacility) -> Result<Facility, StoreError>;

    async fn find_facility(&self, id: i32) -> Result<Option<Facility>, StoreError>;

    /// All facilities ordered by `nom`
    async fn list_facilities(&self) -> Result<Vec<Facility>, StoreError>;

    /// Lowest-id facility run by the director
    async fn facility_of_director(&self, director_id: i32) -> Result<Option<Facility>, StoreError>;

    /// Descriptive fields only; waits for the facility row lock
    async fn update_facility(&self, id: i32, update: &FacilityUpdate) -> Result<Option<Facility>, StoreError>;

    async fn children_of_facility(&self, facility_id: i32) -> Result<Vec<Child>, StoreError>;
}

/// One open transaction. Dropping it without `commit` discards every write.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Exclusive lock on the facility row; `None` if it does not exist
    async fn lock_facility(&mut self, id: i32) -> Result<Option<SlotCount>, StoreError>;

    /// Exclusive lock on the child row; `None` if it does not exist
    async fn lock_child(&mut self, id: i32) -> Result<Option<Child>, StoreError>;

    /// `disponibilite - 1`; caller must hold the facility lock
    async fn take_slot(&mut self, facility_id: i32) -> Result<(), StoreError>;

    /// `disponibilite + 1`, capped at `nombre_places`; caller must hold the facility lock
    async fn return_slot(&mut self, facility_id: i32) -> Result<(), StoreError>;

    async fn insert_child(&mut self, child: &NewChild) -> Result<Child, StoreError>;

    /// Clears `garderie_id` and returns the updated row
    async fn unbind_child(&mut self, id: i32) -> Result<Child, StoreError>;

    async fn delete_child(&mut self, id: i32) -> Result<Child, StoreError>;

    async fn count_enrolled(&mut self, facility_id: i32) -> Result<i64, StoreError>;

    async fn delete_facility(&mut self, id: i32) -> Result<Facility, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
