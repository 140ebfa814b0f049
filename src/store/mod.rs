//! Storage ports for slots, refresh credentials and user identities.
//!
//! Each port has a PostgreSQL adapter (`postgres`) used by the server and an
//! in-memory adapter (`memory`) used by tests and embedders. Adapters map their
//! failures into [`StoreError`] so the engines never see driver types.

pub mod memory;
pub mod postgres;

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewRefreshCredential, NewSlot, RefreshCredential, Slot, User};
use crate::reservation::ReservationError;

pub use memory::{MemoryCredentialStore, MemorySlotStore, MemoryUserStore};
pub use postgres::{PgCredentialStore, PgSlotStore, PgUserStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No connection could be obtained.
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },
    /// The transaction lost a serialization conflict and was rolled back.
    #[error("transaction conflict: {message}")]
    Conflict { message: String },
    #[error("storage query failed: {message}")]
    Query { message: String },
    /// A persisted row could not be mapped into a domain type.
    #[error("corrupt row: {message}")]
    Corrupt { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }
}

/// Operations available inside one slot transaction.
pub trait SlotTransaction {
    fn find(&mut self, slot_id: Uuid) -> Result<Option<Slot>, StoreError>;

    /// Slots currently claimed by `consumer_id` against `owner_id`.
    fn claimed_by(&mut self, consumer_id: Uuid, owner_id: Uuid) -> Result<Vec<Slot>, StoreError>;

    /// Sets `booked = true, claimant_id = consumer_id` only where the slot is
    /// still free. Returns the number of rows changed (0 or 1).
    fn mark_claimed(&mut self, slot_id: Uuid, consumer_id: Uuid) -> Result<usize, StoreError>;

    /// Unconditionally resets `booked` and `claimant_id`.
    fn mark_free(&mut self, slot_id: Uuid) -> Result<usize, StoreError>;
}

/// Durable table of reservable slots.
pub trait SlotStore: Send + Sync {
    /// Inserts all rows in a single transaction, skipping units that already
    /// exist for the same owner, day and start time. Returns rows inserted.
    fn insert_all(&self, slots: &[NewSlot]) -> Result<usize, StoreError>;

    /// All slots of an owner ordered by `(day, start_time)`.
    fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Slot>, StoreError>;

    /// Runs `op` inside one serializable transaction. Nothing `op` wrote is
    /// kept unless it returns `Ok`.
    fn atomically(
        &self,
        op: &mut dyn FnMut(&mut dyn SlotTransaction) -> Result<Slot, ReservationError>,
    ) -> Result<Slot, ReservationError>;

    fn ping(&self) -> Result<(), StoreError>;
}

/// Durable table of hashed refresh secrets.
pub trait CredentialStore: Send + Sync {
    fn insert(&self, credential: NewRefreshCredential) -> Result<RefreshCredential, StoreError>;

    fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshCredential>, StoreError>;

    /// Deletes one row. Returns `false` when the row was already gone.
    fn delete(&self, credential_id: Uuid) -> Result<bool, StoreError>;

    /// Atomically deletes `credential_id` and inserts `replacement`. Nothing is
    /// inserted, and `None` is returned, when the row was already gone.
    fn replace(
        &self,
        credential_id: Uuid,
        replacement: NewRefreshCredential,
    ) -> Result<Option<RefreshCredential>, StoreError>;

    fn delete_all_for_user(&self, user_id: Uuid) -> Result<usize, StoreError>;

    fn purge_expired(&self, user_id: Uuid, now: NaiveDateTime) -> Result<usize, StoreError>;
}

/// Read-only view of user identities.
pub trait UserStore: Send + Sync {
    fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}
