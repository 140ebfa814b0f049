//! In-memory adapters.
//!
//! Each store keeps its rows behind one mutex. A slot transaction holds that
//! mutex for its whole duration and writes to an overlay of the rows it
//! touches, which is merged into the live rows only when the operation
//! succeeds.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDateTime, Utc};
use uuid::Uuid;

use super::{CredentialStore, SlotStore, SlotTransaction, StoreError, UserStore};
use crate::models::{NewRefreshCredential, NewSlot, RefreshCredential, Slot, User};
use crate::reservation::ReservationError;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::unavailable("in-memory store lock poisoned"))
}

#[derive(Debug, Default)]
pub struct MemorySlotStore {
    slots: Mutex<HashMap<Uuid, Slot>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemorySlotTransaction<'a> {
    live: &'a HashMap<Uuid, Slot>,
    staged: HashMap<Uuid, Slot>,
}

impl MemorySlotTransaction<'_> {
    fn current(&self, slot_id: Uuid) -> Option<&Slot> {
        self.staged
            .get(&slot_id)
            .or_else(|| self.live.get(&slot_id))
    }

    fn stage(&mut self, slot_id: Uuid, update: impl FnOnce(&mut Slot)) -> bool {
        let Some(mut slot) = self.current(slot_id).cloned() else {
            return false;
        };
        update(&mut slot);
        self.staged.insert(slot_id, slot);
        true
    }
}

impl SlotTransaction for MemorySlotTransaction<'_> {
    fn find(&mut self, slot_id: Uuid) -> Result<Option<Slot>, StoreError> {
        Ok(self.current(slot_id).cloned())
    }

    fn claimed_by(&mut self, consumer_id: Uuid, owner_id: Uuid) -> Result<Vec<Slot>, StoreError> {
        let mut held: Vec<Slot> = self
            .live
            .keys()
            .filter_map(|id| self.current(*id))
            .filter(|s| s.booked && s.owner_id == owner_id && s.claimant_id == Some(consumer_id))
            .cloned()
            .collect();
        held.sort_by_key(|s| (s.day, s.start_time));
        Ok(held)
    }

    fn mark_claimed(&mut self, slot_id: Uuid, consumer_id: Uuid) -> Result<usize, StoreError> {
        if self.current(slot_id).map_or(true, |s| s.booked) {
            return Ok(0);
        }
        self.stage(slot_id, |slot| {
            slot.booked = true;
            slot.claimant_id = Some(consumer_id);
        });
        Ok(1)
    }

    fn mark_free(&mut self, slot_id: Uuid) -> Result<usize, StoreError> {
        let changed = self.stage(slot_id, |slot| {
            slot.booked = false;
            slot.claimant_id = None;
        });
        Ok(usize::from(changed))
    }
}

impl SlotStore for MemorySlotStore {
    fn insert_all(&self, new_slots: &[NewSlot]) -> Result<usize, StoreError> {
        let mut slots = lock(&self.slots)?;
        let now = Utc::now().naive_utc();
        let mut inserted = 0;

        for new_slot in new_slots {
            let exists = slots.values().any(|s| {
                s.owner_id == new_slot.owner_id
                    && s.day == new_slot.day
                    && s.start_time == new_slot.start_time
            });
            if exists {
                continue;
            }

            let id = Uuid::new_v4();
            slots.insert(
                id,
                Slot {
                    id,
                    owner_id: new_slot.owner_id,
                    day: new_slot.day,
                    start_time: new_slot.start_time,
                    end_time: new_slot.end_time,
                    booked: false,
                    claimant_id: None,
                    created_at: now,
                },
            );
            inserted += 1;
        }

        Ok(inserted)
    }

    fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Slot>, StoreError> {
        let slots = lock(&self.slots)?;
        let mut owned: Vec<Slot> = slots
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by_key(|s| (s.day, s.start_time));
        Ok(owned)
    }

    fn atomically(
        &self,
        op: &mut dyn FnMut(&mut dyn SlotTransaction) -> Result<Slot, ReservationError>,
    ) -> Result<Slot, ReservationError> {
        let mut live = lock(&self.slots)?;
        let mut tx = MemorySlotTransaction {
            live: &live,
            staged: HashMap::new(),
        };

        let result = op(&mut tx)?;

        let staged = tx.staged;
        live.extend(staged);
        Ok(result)
    }

    fn ping(&self) -> Result<(), StoreError> {
        lock(&self.slots).map(|_| ())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    rows: Mutex<BTreeMap<Uuid, RefreshCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn materialize(credential: NewRefreshCredential) -> RefreshCredential {
        RefreshCredential {
            id: Uuid::new_v4(),
            user_id: credential.user_id,
            secret_hash: credential.secret_hash,
            issued_at: Utc::now().naive_utc(),
            expires_at: credential.expires_at,
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn insert(&self, credential: NewRefreshCredential) -> Result<RefreshCredential, StoreError> {
        let mut rows = lock(&self.rows)?;
        let row = Self::materialize(credential);
        rows.insert(row.id, row.clone());
        Ok(row)
    }

    fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshCredential>, StoreError> {
        let rows = lock(&self.rows)?;
        let mut owned: Vec<RefreshCredential> = rows
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|r| r.issued_at);
        Ok(owned)
    }

    fn delete(&self, credential_id: Uuid) -> Result<bool, StoreError> {
        let mut rows = lock(&self.rows)?;
        Ok(rows.remove(&credential_id).is_some())
    }

    fn replace(
        &self,
        credential_id: Uuid,
        replacement: NewRefreshCredential,
    ) -> Result<Option<RefreshCredential>, StoreError> {
        let mut rows = lock(&self.rows)?;
        if rows.remove(&credential_id).is_none() {
            return Ok(None);
        }

        let row = Self::materialize(replacement);
        rows.insert(row.id, row.clone());
        Ok(Some(row))
    }

    fn delete_all_for_user(&self, user_id: Uuid) -> Result<usize, StoreError> {
        let mut rows = lock(&self.rows)?;
        let before = rows.len();
        rows.retain(|_, r| r.user_id != user_id);
        Ok(before - rows.len())
    }

    fn purge_expired(&self, user_id: Uuid, now: NaiveDateTime) -> Result<usize, StoreError> {
        let mut rows = lock(&self.rows)?;
        let before = rows.len();
        rows.retain(|_, r| r.user_id != user_id || r.expires_at >= now);
        Ok(before - rows.len())
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) -> Result<(), StoreError> {
        let mut users = lock(&self.users)?;
        users.insert(user.id, user);
        Ok(())
    }

    pub fn remove(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let mut users = lock(&self.users)?;
        Ok(users.remove(&user_id))
    }
}

impl UserStore for MemoryUserStore {
    fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let users = lock(&self.users)?;
        Ok(users.get(&user_id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = lock(&self.users)?;
        let email = email.to_lowercase();
        Ok(users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }
}
