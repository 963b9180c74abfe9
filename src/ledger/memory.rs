// ledger/memory.rs - Single-process store backend
//
// Mirrors the Postgres backend's transactional behaviour closely enough to
// run the ledger without a database: row locks are per-row tokio mutexes held
// by the unit of work, writes are staged and only become visible on commit,
// and identifiers behave like SERIAL columns (rolled-back inserts leave gaps).
// Single-row updates outside a unit of work still wait for the row lock, as an
// UPDATE would wait on a `FOR UPDATE` holder.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::models::{
    Child, ChildUpdate, ChildWithFacility, Facility, FacilityUpdate, NewChild, NewFacility, SlotCount,
};
use super::store::{LedgerStore, StoreError, UnitOfWork};

#[derive(Debug, Default)]
struct Tables {
    facilities: BTreeMap<i32, Facility>,
    children: BTreeMap<i32, Child>,
}

#[derive(Debug, Default)]
struct LockTable {
    facilities: HashMap<i32, Arc<RowLock<()>>>,
    children: HashMap<i32, Arc<RowLock<()>>>,
}

#[derive(Debug)]
struct Shared {
    tables: Mutex<Tables>,
    locks: Mutex<LockTable>,
    next_facility_id: AtomicI32,
    next_child_id: AtomicI32,
    lock_timeout: Duration,
}

impl Shared {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))
    }

    fn row_lock(&self, row: Row) -> Result<Arc<RowLock<()>>, StoreError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StoreError::Unavailable("memory lock table poisoned".to_string()))?;
        let slot = match row {
            Row::Facility(id) => locks.facilities.entry(id),
            Row::Child(id) => locks.children.entry(id),
        };
        Ok(slot.or_default().clone())
    }

    /// Forget lock entries nobody holds or waits on
    fn prune(&self, rows: impl IntoIterator<Item = Row>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        for row in rows {
            let (table, id) = match row {
                Row::Facility(id) => (&mut locks.facilities, id),
                Row::Child(id) => (&mut locks.children, id),
            };
            if table.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                table.remove(&id);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Row {
    Facility(i32),
    Child(i32),
}

/// In-process ledger store
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                locks: Mutex::new(LockTable::default()),
                next_facility_id: AtomicI32::new(1),
                next_child_id: AtomicI32::new(1),
                lock_timeout,
            }),
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.shared
            .locks
            .lock()
            .map(|locks| locks.facilities.len() + locks.children.len())
            .unwrap_or_default()
    }

    fn child_from(&self, child: &NewChild) -> Child {
        Child {
            id: self.shared.next_child_id.fetch_add(1, Ordering::SeqCst),
            name: child.name.clone(),
            age: child.age,
            parent_id: child.parent_id,
            facility_id: child.facility_id,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnitOfWork::new(self.clone())))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.shared.tables().map(|_| ())
    }

    async fn insert_unbound_child(&self, child: &NewChild) -> Result<Child, StoreError> {
        if child.facility_id.is_some() {
            return Err(StoreError::Constraint(
                "facility-bound children are inserted inside a unit of work".to_string(),
            ));
        }
        let row = self.child_from(child);
        self.shared.tables()?.children.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_child(&self, id: i32) -> Result<Option<Child>, StoreError> {
        Ok(self.shared.tables()?.children.get(&id).cloned())
    }

    async fn list_children(&self) -> Result<Vec<Child>, StoreError> {
        Ok(self.shared.tables()?.children.values().cloned().collect())
    }

    async fn children_of_parent(&self, parent_id: i32) -> Result<Vec<ChildWithFacility>, StoreError> {
        let tables = self.shared.tables()?;
        Ok(tables
            .children
            .values()
            .filter(|child| child.parent_id == Some(parent_id))
            .map(|child| {
                let facility = child.facility_id.and_then(|id| tables.facilities.get(&id));
                ChildWithFacility {
                    child: child.clone(),
                    garderie_nom: facility.map(|f| f.name.clone()),
                    garderie_adresse: facility.map(|f| f.address.clone()),
                }
            })
            .collect())
    }

    async fn update_child(&self, id: i32, update: &ChildUpdate) -> Result<Option<Child>, StoreError> {
        let mut uow = MemoryUnitOfWork::new(self.clone());
        let Some(mut child) = uow.lock_child(id).await? else {
            return Ok(None);
        };
        child.name = update.name.clone();
        child.age = update.age;
        uow.children.insert(id, Some(child.clone()));
        Box::new(uow).commit().await?;
        Ok(Some(child))
    }

    async fn insert_facility(&self, facility: &NewFacility) -> Result<Facility, StoreError> {
        if facility.available_slots < 0 || facility.available_slots > facility.total_capacity {
            return Err(StoreError::Constraint("disponibilite out of bounds".to_string()));
        }
        let row = Facility {
            id: self.shared.next_facility_id.fetch_add(1, Ordering::SeqCst),
            name: facility.name.clone(),
            address: facility.address.clone(),
            price: facility.price,
            available_slots: facility.available_slots,
            total_capacity: facility.total_capacity,
            description: facility.description.clone(),
            director_id: facility.director_id,
            photo: facility.photo.clone(),
        };
        self.shared.tables()?.facilities.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_facility(&self, id: i32) -> Result<Option<Facility>, StoreError> {
        Ok(self.shared.tables()?.facilities.get(&id).cloned())
    }

    async fn list_facilities(&self) -> Result<Vec<Facility>, StoreError> {
        let mut facilities: Vec<Facility> = self.shared.tables()?.facilities.values().cloned().collect();
        facilities.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(facilities)
    }

    async fn facility_of_director(&self, director_id: i32) -> Result<Option<Facility>, StoreError> {
        Ok(self
            .shared
            .tables()?
            .facilities
            .values()
            .find(|facility| facility.director_id == director_id)
            .cloned())
    }

    async fn update_facility(&self, id: i32, update: &FacilityUpdate) -> Result<Option<Facility>, StoreError> {
        let mut uow = MemoryUnitOfWork::new(self.clone());
        if uow.lock_facility(id).await?.is_none() {
            return Ok(None);
        }
        let mut facility = uow.existing_facility(id)?;
        facility.name = update.name.clone();
        facility.address = update.address.clone();
        facility.price = update.price;
        facility.description = update.description.clone();
        uow.facilities.insert(id, Some(facility.clone()));
        Box::new(uow).commit().await?;
        Ok(Some(facility))
    }

    async fn children_of_facility(&self, facility_id: i32) -> Result<Vec<Child>, StoreError> {
        Ok(self
            .shared
            .tables()?
            .children
            .values()
            .filter(|child| child.facility_id == Some(facility_id))
            .cloned()
            .collect())
    }
}

/// Staged writes: `Some` is an upsert, `None` a delete.
/// Row locks are released when the unit of work is dropped.
struct MemoryUnitOfWork {
    store: MemoryStore,
    held: HashSet<Row>,
    guards: Vec<OwnedMutexGuard<()>>,
    facilities: HashMap<i32, Option<Facility>>,
    children: HashMap<i32, Option<Child>>,
}

impl MemoryUnitOfWork {
    fn new(store: MemoryStore) -> Self {
        Self {
            store,
            held: HashSet::new(),
            guards: Vec::new(),
            facilities: HashMap::new(),
            children: HashMap::new(),
        }
    }

    async fn acquire(&mut self, row: Row) -> Result<(), StoreError> {
        if self.held.contains(&row) {
            return Ok(());
        }
        let lock = self.store.shared.row_lock(row)?;
        match tokio::time::timeout(self.store.shared.lock_timeout, lock.lock_owned()).await {
            Ok(guard) => {
                self.guards.push(guard);
                self.held.insert(row);
                Ok(())
            }
            Err(_) => {
                self.store.shared.prune([row]);
                Err(StoreError::LockTimeout)
            }
        }
    }

    fn facility(&self, id: i32) -> Result<Option<Facility>, StoreError> {
        match self.facilities.get(&id) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(self.store.shared.tables()?.facilities.get(&id).cloned()),
        }
    }

    fn child(&self, id: i32) -> Result<Option<Child>, StoreError> {
        match self.children.get(&id) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(self.store.shared.tables()?.children.get(&id).cloned()),
        }
    }

    fn existing_facility(&self, id: i32) -> Result<Facility, StoreError> {
        self.facility(id)?
            .ok_or_else(|| StoreError::Constraint(format!("garderie {id} does not exist")))
    }

    fn existing_child(&self, id: i32) -> Result<Child, StoreError> {
        self.child(id)?
            .ok_or_else(|| StoreError::Constraint(format!("enfant {id} does not exist")))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_facility(&mut self, id: i32) -> Result<Option<SlotCount>, StoreError> {
        self.acquire(Row::Facility(id)).await?;
        Ok(self.facility(id)?.map(|f| SlotCount {
            available: f.available_slots,
            total: f.total_capacity,
        }))
    }

    async fn lock_child(&mut self, id: i32) -> Result<Option<Child>, StoreError> {
        self.acquire(Row::Child(id)).await?;
        self.child(id)
    }

    async fn take_slot(&mut self, facility_id: i32) -> Result<(), StoreError> {
        let mut facility = self.existing_facility(facility_id)?;
        if facility.available_slots <= 0 {
            return Err(StoreError::Constraint("disponibilite cannot go below zero".to_string()));
        }
        facility.available_slots -= 1;
        self.facilities.insert(facility_id, Some(facility));
        Ok(())
    }

    async fn return_slot(&mut self, facility_id: i32) -> Result<(), StoreError> {
        let mut facility = self.existing_facility(facility_id)?;
        facility.available_slots = (facility.available_slots + 1).min(facility.total_capacity);
        self.facilities.insert(facility_id, Some(facility));
        Ok(())
    }

    async fn insert_child(&mut self, child: &NewChild) -> Result<Child, StoreError> {
        if let Some(facility_id) = child.facility_id {
            self.existing_facility(facility_id)?;
        }
        let row = self.store.child_from(child);
        self.children.insert(row.id, Some(row.clone()));
        Ok(row)
    }

    async fn unbind_child(&mut self, id: i32) -> Result<Child, StoreError> {
        let mut child = self.existing_child(id)?;
        child.facility_id = None;
        self.children.insert(id, Some(child.clone()));
        Ok(child)
    }

    async fn delete_child(&mut self, id: i32) -> Result<Child, StoreError> {
        let child = self.existing_child(id)?;
        self.children.insert(id, None);
        Ok(child)
    }

    async fn count_enrolled(&mut self, facility_id: i32) -> Result<i64, StoreError> {
        let tables = self.store.shared.tables()?;
        let committed = tables
            .children
            .iter()
            .filter(|(id, _)| !self.children.contains_key(id))
            .map(|(_, child)| child);
        let staged = self.children.values().flatten();
        Ok(committed
            .chain(staged)
            .filter(|child| child.facility_id == Some(facility_id))
            .count() as i64)
    }

    async fn delete_facility(&mut self, id: i32) -> Result<Facility, StoreError> {
        let facility = self.existing_facility(id)?;
        if self.count_enrolled(id).await? > 0 {
            return Err(StoreError::Constraint(format!("enfant rows still reference garderie {id}")));
        }
        self.facilities.insert(id, None);
        Ok(facility)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        let facilities = std::mem::take(&mut this.facilities);
        let children = std::mem::take(&mut this.children);
        {
            let mut tables = this.store.shared.tables()?;
            for (id, staged) in facilities {
                match staged {
                    Some(facility) => tables.facilities.insert(id, facility),
                    None => tables.facilities.remove(&id),
                };
            }
            for (id, staged) in children {
                match staged {
                    Some(child) => tables.children.insert(id, child),
                    None => tables.children.remove(&id),
                };
            }
        }
        // Row locks are released only after the writes are visible
        drop(this);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        drop(self);
        Ok(())
    }
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        // Guards first, so pruning only sees the lock table's own reference
        self.guards.clear();
        self.store.shared.prune(self.held.drain());
    }
}
