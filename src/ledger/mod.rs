// ledger/mod.rs - Facility capacity ledger
//
// Every change to a facility's `disponibilite` happens here, inside a unit of
// work that holds the facility row lock. Concurrent reservations against the
// same facility are serialized by that lock; the available count is always
// read from the store, never remembered in process memory.

pub mod error;
pub mod memory;
pub mod models;
pub mod store;

use std::sync::Arc;

use tracing::{info, warn};

pub use error::LedgerError;
pub use memory::MemoryStore;
pub use models::{
    Child, ChildUpdate, ChildUpdateRequest, ChildWithFacility, EnrollmentRequest, Facility, FacilityRequest,
    FacilityUpdate, FacilityUpdateRequest, NewChild, NewFacility, SlotCount,
};
pub use store::{LedgerStore, StoreError, UnitOfWork};

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Validate and register a child, reserving one slot when `garderie_id` is set.
    ///
    /// Validation runs before any store access. With a facility the lock,
    /// capacity check, decrement and insert commit together or not at all.
    pub async fn reserve_and_register(&self, request: EnrollmentRequest) -> Result<Child, LedgerError> {
        let child = request.validate()?;

        let Some(facility_id) = child.facility_id else {
            let created = self.store.insert_unbound_child(&child).await?;
            info!(child_id = created.id, "registered child without facility");
            return Ok(created);
        };

        let mut uow = self.store.begin().await?;
        let outcome = reserve_in(uow.as_mut(), facility_id, &child).await;
        let created = settle(uow, outcome).await?;

        info!(child_id = created.id, facility_id, "reserved facility slot");
        Ok(created)
    }

    /// Give the child's slot back to its facility and clear the reference.
    pub async fn release(&self, child_id: i32) -> Result<Child, LedgerError> {
        let mut uow = self.store.begin().await?;
        let outcome = release_in(uow.as_mut(), child_id).await;
        let (child, facility_id) = settle(uow, outcome).await?;

        info!(child_id = child.id, facility_id, "released facility slot");
        Ok(child)
    }

    /// Delete a child; a held slot is returned in the same unit of work.
    pub async fn withdraw(&self, child_id: i32) -> Result<Child, LedgerError> {
        let mut uow = self.store.begin().await?;
        let outcome = withdraw_in(uow.as_mut(), child_id).await;
        let removed = settle(uow, outcome).await?;

        info!(child_id = removed.id, facility_id = ?removed.facility_id, "removed child");
        Ok(removed)
    }

    pub async fn open_facility(&self, request: FacilityRequest) -> Result<Facility, LedgerError> {
        let facility = request.validate()?;
        let created = self.store.insert_facility(&facility).await?;
        info!(
            facility_id = created.id,
            total = created.total_capacity,
            available = created.available_slots,
            "opened facility"
        );
        Ok(created)
    }

    /// Delete a facility; refused while any child still holds one of its slots.
    pub async fn close_facility(&self, facility_id: i32) -> Result<Facility, LedgerError> {
        let mut uow = self.store.begin().await?;
        let outcome = close_in(uow.as_mut(), facility_id).await;
        let closed = settle(uow, outcome).await?;

        info!(facility_id = closed.id, "closed facility");
        Ok(closed)
    }

    pub async fn facility(&self, facility_id: i32) -> Result<Facility, LedgerError> {
        self.store
            .find_facility(facility_id)
            .await?
            .ok_or(LedgerError::FacilityNotFound(facility_id))
    }

    /// Facilities ordered by name
    pub async fn facilities(&self) -> Result<Vec<Facility>, LedgerError> {
        Ok(self.store.list_facilities().await?)
    }

    pub async fn facility_of_director(&self, director_id: i32) -> Result<Facility, LedgerError> {
        self.store
            .facility_of_director(director_id)
            .await?
            .ok_or(LedgerError::NoFacilityForDirector(director_id))
    }

    /// Change the descriptive fields; slot counters are never written here.
    pub async fn update_facility(
        &self,
        facility_id: i32,
        request: FacilityUpdateRequest,
    ) -> Result<Facility, LedgerError> {
        let update = request.validate()?;
        let updated = self
            .store
            .update_facility(facility_id, &update)
            .await?
            .ok_or(LedgerError::FacilityNotFound(facility_id))?;
        info!(facility_id, "updated facility");
        Ok(updated)
    }

    pub async fn enrolled_children(&self, facility_id: i32) -> Result<Vec<Child>, LedgerError> {
        self.facility(facility_id).await?;
        Ok(self.store.children_of_facility(facility_id).await?)
    }

    pub async fn children(&self) -> Result<Vec<Child>, LedgerError> {
        Ok(self.store.list_children().await?)
    }

    pub async fn children_of_parent(&self, parent_id: i32) -> Result<Vec<ChildWithFacility>, LedgerError> {
        Ok(self.store.children_of_parent(parent_id).await?)
    }

    pub async fn child(&self, child_id: i32) -> Result<Child, LedgerError> {
        self.store
            .find_child(child_id)
            .await?
            .ok_or(LedgerError::ChildNotFound(child_id))
    }

    /// Change name and age; the facility reference is never touched.
    pub async fn update_child(&self, child_id: i32, request: ChildUpdateRequest) -> Result<Child, LedgerError> {
        let update = request.validate()?;
        self.store
            .update_child(child_id, &update)
            .await?
            .ok_or(LedgerError::ChildNotFound(child_id))
    }

    pub async fn health(&self) -> Result<(), LedgerError> {
        Ok(self.store.ping().await?)
    }
}

async fn reserve_in(uow: &mut dyn UnitOfWork, facility_id: i32, child: &NewChild) -> Result<Child, LedgerError> {
    let slots = uow
        .lock_facility(facility_id)
        .await?
        .ok_or(LedgerError::FacilityNotFound(facility_id))?;

    if slots.available <= 0 {
        warn!(facility_id, total = slots.total, "facility is full");
        return Err(LedgerError::CapacityExhausted(facility_id));
    }

    uow.take_slot(facility_id).await?;
    Ok(uow.insert_child(child).await?)
}

async fn release_in(uow: &mut dyn UnitOfWork, child_id: i32) -> Result<(Child, i32), LedgerError> {
    let child = uow.lock_child(child_id).await?.ok_or(LedgerError::ChildNotFound(child_id))?;
    let facility_id = child.facility_id.ok_or(LedgerError::NotEnrolled(child_id))?;

    // Child before facility, the same order withdraw_in uses
    if uow.lock_facility(facility_id).await?.is_some() {
        uow.return_slot(facility_id).await?;
    }
    let unbound = uow.unbind_child(child_id).await?;
    Ok((unbound, facility_id))
}

async fn withdraw_in(uow: &mut dyn UnitOfWork, child_id: i32) -> Result<Child, LedgerError> {
    let child = uow.lock_child(child_id).await?.ok_or(LedgerError::ChildNotFound(child_id))?;

    if let Some(facility_id) = child.facility_id {
        if uow.lock_facility(facility_id).await?.is_some() {
            uow.return_slot(facility_id).await?;
        }
    }
    Ok(uow.delete_child(child_id).await?)
}

async fn close_in(uow: &mut dyn UnitOfWork, facility_id: i32) -> Result<Facility, LedgerError> {
    uow.lock_facility(facility_id)
        .await?
        .ok_or(LedgerError::FacilityNotFound(facility_id))?;

    let enrolled = uow.count_enrolled(facility_id).await?;
    if enrolled > 0 {
        return Err(LedgerError::FacilityInUse { facility_id, enrolled });
    }
    Ok(uow.delete_facility(facility_id).await?)
}

/// Commit on success; on failure roll back before the error is surfaced.
async fn settle<T>(uow: Box<dyn UnitOfWork>, outcome: Result<T, LedgerError>) -> Result<T, LedgerError> {
    match outcome {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            if let LedgerError::Store(store_err) = &err {
                tracing::error!(error = %store_err, "unit of work aborted");
            }
            Err(err)
        }
    }
}
