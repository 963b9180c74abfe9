// database/postgres.rs - Ledger store on PostgreSQL
//
// A unit of work is one sqlx transaction. Row locks come from
// `SELECT ... FOR UPDATE` and are held until commit/rollback; lock waits are
// bounded by `SET LOCAL lock_timeout`, which Postgres reports as 55P03.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::manager::DatabaseManager;
use crate::ledger::{
    Child, ChildUpdate, ChildWithFacility, Facility, FacilityUpdate, LedgerStore, NewChild, NewFacility, SlotCount,
    StoreError, UnitOfWork,
};

const FACILITY_COLUMNS: &str =
    "idgarderie, nom, adresse, tarif, disponibilite, nombre_places, description, directeur_id, photo";
const CHILD_COLUMNS: &str = "idenfant, nom, age, parent_id, garderie_id";

pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

fn lock_timeout_statement(lock_timeout: Duration) -> String {
    // SET takes no bind parameters; the value is an integer we format ourselves.
    // 0 would disable the timeout, so the floor is 1ms.
    format!("SET LOCAL lock_timeout = {}", lock_timeout.as_millis().max(1))
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let statement = lock_timeout_statement(self.lock_timeout);
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        DatabaseManager::health_check(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn insert_unbound_child(&self, child: &NewChild) -> Result<Child, StoreError> {
        let sql = format!(
            "INSERT INTO enfant (nom, age, parent_id, garderie_id) VALUES ($1, $2, $3, NULL) RETURNING {CHILD_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Child>(&sql)
            .bind(&child.name)
            .bind(child.age)
            .bind(child.parent_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_child(&self, id: i32) -> Result<Option<Child>, StoreError> {
        let sql = format!("SELECT {CHILD_COLUMNS} FROM enfant WHERE idenfant = $1");
        let row = sqlx::query_as::<_, Child>(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row)
    }

    async fn list_children(&self) -> Result<Vec<Child>, StoreError> {
        let sql = format!("SELECT {CHILD_COLUMNS} FROM enfant ORDER BY idenfant");
        let rows = sqlx::query_as::<_, Child>(&sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn children_of_parent(&self, parent_id: i32) -> Result<Vec<ChildWithFacility>, StoreError> {
        let rows = sqlx::query_as::<_, ChildWithFacility>(
            "SELECT e.idenfant, e.nom, e.age, e.parent_id, e.garderie_id, \
                    g.nom AS garderie_nom, g.adresse AS garderie_adresse \
             FROM enfant e \
             LEFT JOIN garderie g ON e.garderie_id = g.idgarderie \
             WHERE e.parent_id = $1 \
             ORDER BY e.idenfant",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_child(&self, id: i32, update: &ChildUpdate) -> Result<Option<Child>, StoreError> {
        let sql = format!("UPDATE enfant SET nom = $1, age = $2 WHERE idenfant = $3 RETURNING {CHILD_COLUMNS}");
        let row = sqlx::query_as::<_, Child>(&sql)
            .bind(&update.name)
            .bind(update.age)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_facility(&self, facility: &NewFacility) -> Result<Facility, StoreError> {
        let sql = format!(
            "INSERT INTO garderie (nom, adresse, tarif, disponibilite, nombre_places, description, directeur_id, photo) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {FACILITY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Facility>(&sql)
            .bind(&facility.name)
            .bind(&facility.address)
            .bind(facility.price)
            .bind(facility.available_slots)
            .bind(facility.total_capacity)
            .bind(&facility.description)
            .bind(facility.director_id)
            .bind(&facility.photo)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_facility(&self, id: i32) -> Result<Option<Facility>, StoreError> {
        let sql = format!("SELECT {FACILITY_COLUMNS} FROM garderie WHERE idgarderie = $1");
        let row = sqlx::query_as::<_, Facility>(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row)
    }

    async fn list_facilities(&self) -> Result<Vec<Facility>, StoreError> {
        let sql = format!("SELECT {FACILITY_COLUMNS} FROM garderie ORDER BY nom, idgarderie");
        let rows = sqlx::query_as::<_, Facility>(&sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn facility_of_director(&self, director_id: i32) -> Result<Option<Facility>, StoreError> {
        let sql = format!(
            "SELECT {FACILITY_COLUMNS} FROM garderie WHERE directeur_id = $1 ORDER BY idgarderie LIMIT 1"
        );
        let row = sqlx::query_as::<_, Facility>(&sql)
            .bind(director_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_facility(&self, id: i32, update: &FacilityUpdate) -> Result<Option<Facility>, StoreError> {
        let sql = format!(
            "UPDATE garderie SET nom = $1, adresse = $2, tarif = $3, description = $4 \
             WHERE idgarderie = $5 RETURNING {FACILITY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Facility>(&sql)
            .bind(&update.name)
            .bind(&update.address)
            .bind(update.price)
            .bind(&update.description)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn children_of_facility(&self, facility_id: i32) -> Result<Vec<Child>, StoreError> {
        let sql = format!("SELECT {CHILD_COLUMNS} FROM enfant WHERE garderie_id = $1 ORDER BY idenfant");
        let rows = sqlx::query_as::<_, Child>(&sql).bind(facility_id).fetch_all(&self.pool).await?;
        Ok(rows)
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_facility(&mut self, id: i32) -> Result<Option<SlotCount>, StoreError> {
        let row = sqlx::query_as::<_, SlotCount>(
            "SELECT disponibilite, nombre_places FROM garderie WHERE idgarderie = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn lock_child(&mut self, id: i32) -> Result<Option<Child>, StoreError> {
        let sql = format!("SELECT {CHILD_COLUMNS} FROM enfant WHERE idenfant = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, Child>(&sql).bind(id).fetch_optional(&mut *self.tx).await?;
        Ok(row)
    }

    async fn take_slot(&mut self, facility_id: i32) -> Result<(), StoreError> {
        sqlx::query("UPDATE garderie SET disponibilite = disponibilite - 1 WHERE idgarderie = $1")
            .bind(facility_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn return_slot(&mut self, facility_id: i32) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE garderie SET disponibilite = LEAST(disponibilite + 1, nombre_places) WHERE idgarderie = $1",
        )
        .bind(facility_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_child(&mut self, child: &NewChild) -> Result<Child, StoreError> {
        let sql = format!(
            "INSERT INTO enfant (nom, age, parent_id, garderie_id) VALUES ($1, $2, $3, $4) RETURNING {CHILD_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Child>(&sql)
            .bind(&child.name)
            .bind(child.age)
            .bind(child.parent_id)
            .bind(child.facility_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn unbind_child(&mut self, id: i32) -> Result<Child, StoreError> {
        let sql = format!("UPDATE enfant SET garderie_id = NULL WHERE idenfant = $1 RETURNING {CHILD_COLUMNS}");
        let row = sqlx::query_as::<_, Child>(&sql).bind(id).fetch_one(&mut *self.tx).await?;
        Ok(row)
    }

    async fn delete_child(&mut self, id: i32) -> Result<Child, StoreError> {
        let sql = format!("DELETE FROM enfant WHERE idenfant = $1 RETURNING {CHILD_COLUMNS}");
        let row = sqlx::query_as::<_, Child>(&sql).bind(id).fetch_one(&mut *self.tx).await?;
        Ok(row)
    }

    async fn count_enrolled(&mut self, facility_id: i32) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enfant WHERE garderie_id = $1")
            .bind(facility_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn delete_facility(&mut self, id: i32) -> Result<Facility, StoreError> {
        let sql = format!("DELETE FROM garderie WHERE idgarderie = $1 RETURNING {FACILITY_COLUMNS}");
        let row = sqlx::query_as::<_, Facility>(&sql).bind(id).fetch_one(&mut *self.tx).await?;
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_is_never_disabled() {
        assert_eq!(lock_timeout_statement(Duration::ZERO), "SET LOCAL lock_timeout = 1");
        assert_eq!(lock_timeout_statement(Duration::from_millis(2_000)), "SET LOCAL lock_timeout = 2000");
    }
}
