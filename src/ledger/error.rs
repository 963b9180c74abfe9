use thiserror::Error;

use super::store::StoreError;

/// Outcomes of ledger operations that are not a granted reservation
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Caller input was incomplete or out of range; nothing was written
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        fields: Vec<&'static str>,
    },

    #[error("facility {0} not found")]
    FacilityNotFound(i32),

    #[error("no facility for director {0}")]
    NoFacilityForDirector(i32),

    #[error("child {0} not found")]
    ChildNotFound(i32),

    /// Business rule, not a fault: the facility has no free slot
    #[error("facility {0} has no available slots")]
    CapacityExhausted(i32),

    #[error("child {0} does not hold a facility slot")]
    NotEnrolled(i32),

    #[error("facility {facility_id} still has {enrolled} enrolled children")]
    FacilityInUse { facility_id: i32, enrolled: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>, fields: Vec<&'static str>) -> Self {
        LedgerError::Validation {
            message: message.into(),
            fields,
        }
    }
}
