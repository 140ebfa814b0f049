//! PostgreSQL adapters built on Diesel and the shared r2d2 pool.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::error;
use uuid::Uuid;

use super::{CredentialStore, SlotStore, SlotTransaction, StoreError, UserStore};
use crate::models::{NewRefreshCredential, NewSlot, RefreshCredential, Role, Slot, User};
use crate::reservation::ReservationError;
use crate::schema::{refresh_credentials, slots, users};
use crate::DbPool;

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

diesel::define_sql_function!(fn lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text);

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, info) => {
                StoreError::Conflict {
                    message: info.message().to_string(),
                }
            }
            other => StoreError::query(other.to_string()),
        }
    }
}

impl From<DieselError> for ReservationError {
    fn from(err: DieselError) -> Self {
        StoreError::from(err).into()
    }
}

fn checkout(pool: &DbPool) -> Result<PgPooledConnection, StoreError> {
    pool.get().map_err(|e| {
        error!(error = %e, "Database connection error");
        StoreError::unavailable(e.to_string())
    })
}

#[derive(Clone)]
pub struct PgSlotStore {
    pool: DbPool,
}

impl PgSlotStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

struct PgSlotTransaction<'a> {
    conn: &'a mut PgConnection,
}

impl SlotTransaction for PgSlotTransaction<'_> {
    fn find(&mut self, slot_id: Uuid) -> Result<Option<Slot>, StoreError> {
        slots::table
            .find(slot_id)
            .select(Slot::as_select())
            .first(&mut *self.conn)
            .optional()
            .map_err(StoreError::from)
    }

    fn claimed_by(&mut self, consumer_id: Uuid, owner_id: Uuid) -> Result<Vec<Slot>, StoreError> {
        slots::table
            .filter(slots::claimant_id.eq(consumer_id))
            .filter(slots::owner_id.eq(owner_id))
            .filter(slots::booked.eq(true))
            .order((slots::day.asc(), slots::start_time.asc()))
            .select(Slot::as_select())
            .load(&mut *self.conn)
            .map_err(StoreError::from)
    }

    fn mark_claimed(&mut self, slot_id: Uuid, consumer_id: Uuid) -> Result<usize, StoreError> {
        diesel::update(
            slots::table
                .filter(slots::id.eq(slot_id))
                .filter(slots::booked.eq(false)),
        )
        .set((
            slots::booked.eq(true),
            slots::claimant_id.eq(Some(consumer_id)),
        ))
        .execute(&mut *self.conn)
        .map_err(StoreError::from)
    }

    fn mark_free(&mut self, slot_id: Uuid) -> Result<usize, StoreError> {
        diesel::update(slots::table.filter(slots::id.eq(slot_id)))
            .set((slots::booked.eq(false), slots::claimant_id.eq(None::<Uuid>)))
            .execute(&mut *self.conn)
            .map_err(StoreError::from)
    }
}

impl SlotStore for PgSlotStore {
    fn insert_all(&self, new_slots: &[NewSlot]) -> Result<usize, StoreError> {
        let mut conn = checkout(&self.pool)?;

        conn.transaction::<_, DieselError, _>(|conn| {
            diesel::insert_into(slots::table)
                .values(new_slots)
                .on_conflict((slots::owner_id, slots::day, slots::start_time))
                .do_nothing()
                .execute(conn)
        })
        .map_err(StoreError::from)
    }

    fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Slot>, StoreError> {
        let mut conn = checkout(&self.pool)?;

        slots::table
            .filter(slots::owner_id.eq(owner_id))
            .order((slots::day.asc(), slots::start_time.asc()))
            .select(Slot::as_select())
            .load(&mut conn)
            .map_err(StoreError::from)
    }

    fn atomically(
        &self,
        op: &mut dyn FnMut(&mut dyn SlotTransaction) -> Result<Slot, ReservationError>,
    ) -> Result<Slot, ReservationError> {
        let mut conn = checkout(&self.pool)?;

        conn.build_transaction().serializable().run(|conn| {
            let mut tx = PgSlotTransaction { conn };
            op(&mut tx)
        })
    }

    fn ping(&self) -> Result<(), StoreError> {
        let mut conn = checkout(&self.pool)?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .map(|_| ())
            .map_err(StoreError::from)
    }
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: DbPool,
}

impl PgCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CredentialStore for PgCredentialStore {
    fn insert(&self, credential: NewRefreshCredential) -> Result<RefreshCredential, StoreError> {
        let mut conn = checkout(&self.pool)?;

        diesel::insert_into(refresh_credentials::table)
            .values(&credential)
            .returning(RefreshCredential::as_returning())
            .get_result(&mut conn)
            .map_err(StoreError::from)
    }

    fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshCredential>, StoreError> {
        let mut conn = checkout(&self.pool)?;

        refresh_credentials::table
            .filter(refresh_credentials::user_id.eq(user_id))
            .order(refresh_credentials::issued_at.asc())
            .select(RefreshCredential::as_select())
            .load(&mut conn)
            .map_err(StoreError::from)
    }

    fn delete(&self, credential_id: Uuid) -> Result<bool, StoreError> {
        let mut conn = checkout(&self.pool)?;

        diesel::delete(refresh_credentials::table.find(credential_id))
            .execute(&mut conn)
            .map(|count| count > 0)
            .map_err(StoreError::from)
    }

    fn replace(
        &self,
        credential_id: Uuid,
        replacement: NewRefreshCredential,
    ) -> Result<Option<RefreshCredential>, StoreError> {
        let mut conn = checkout(&self.pool)?;

        conn.transaction::<_, DieselError, _>(|conn| {
            let removed =
                diesel::delete(refresh_credentials::table.find(credential_id)).execute(conn)?;
            if removed == 0 {
                return Ok(None);
            }

            diesel::insert_into(refresh_credentials::table)
                .values(&replacement)
                .returning(RefreshCredential::as_returning())
                .get_result(conn)
                .map(Some)
        })
        .map_err(StoreError::from)
    }

    fn delete_all_for_user(&self, user_id: Uuid) -> Result<usize, StoreError> {
        let mut conn = checkout(&self.pool)?;

        diesel::delete(refresh_credentials::table.filter(refresh_credentials::user_id.eq(user_id)))
            .execute(&mut conn)
            .map_err(StoreError::from)
    }

    fn purge_expired(&self, user_id: Uuid, now: NaiveDateTime) -> Result<usize, StoreError> {
        let mut conn = checkout(&self.pool)?;

        diesel::delete(
            refresh_credentials::table
                .filter(refresh_credentials::user_id.eq(user_id))
                .filter(refresh_credentials::expires_at.lt(now)),
        )
        .execute(&mut conn)
        .map_err(StoreError::from)
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = users)]
struct UserRecord {
    id: Uuid,
    full_name: String,
    email: String,
    password_hash: String,
    role: String,
    verified: bool,
    created_at: NaiveDateTime,
}

impl TryFrom<UserRecord> for User {
    type Error = StoreError;

    fn try_from(record: UserRecord) -> Result<Self, Self::Error> {
        let role = record.role.parse::<Role>().map_err(|e| {
            StoreError::Corrupt {
                message: format!("user {}: {}", record.id, e),
            }
        })?;

        Ok(User {
            id: record.id,
            full_name: record.full_name,
            email: record.email,
            password_hash: record.password_hash,
            role,
            verified: record.verified,
            created_at: record.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl UserStore for PgUserStore {
    fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let mut conn = checkout(&self.pool)?;

        users::table
            .find(user_id)
            .select(UserRecord::as_select())
            .first(&mut conn)
            .optional()
            .map_err(StoreError::from)?
            .map(User::try_from)
            .transpose()
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut conn = checkout(&self.pool)?;

        users::table
            .filter(lower(users::email).eq(email.to_lowercase()))
            .select(UserRecord::as_select())
            .first(&mut conn)
            .optional()
            .map_err(StoreError::from)?
            .map(User::try_from)
            .transpose()
    }
}
