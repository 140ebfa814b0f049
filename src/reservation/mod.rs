//! Slot generation and the claim/release transaction manager.

pub mod expander;
pub mod rules;

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use mockable::Clock;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ReservationConfig;
use crate::models::Slot;
use crate::store::{SlotStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    #[error("invalid availability window")]
    InvalidWindow,
    #[error("slot not found")]
    SlotNotFound,
    #[error("slot is already reserved")]
    AlreadyReserved,
    #[error("at most {limit} slots may be held per owner")]
    QuotaExceeded { limit: usize },
    #[error("all slots held for one owner must be on the same day")]
    MixedDay,
    #[error("slots held for one owner must be consecutive")]
    NonContiguous,
    /// The conditional write found the slot taken by a concurrent claim.
    #[error("slot is already reserved")]
    RaceLost,
    #[error("slot is not reserved by you")]
    NotOwner,
    #[error("reservation can no longer be released")]
    TooLate,
    #[error(transparent)]
    Storage(StoreError),
}

impl ReservationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidWindow => "INVALID_WINDOW",
            Self::SlotNotFound => "SLOT_NOT_FOUND",
            Self::AlreadyReserved | Self::RaceLost => "SLOT_ALREADY_RESERVED",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::MixedDay => "MIXED_DAY",
            Self::NonContiguous => "NON_CONTIGUOUS",
            Self::NotOwner => "NOT_OWNER",
            Self::TooLate => "RELEASE_TOO_LATE",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => Self::RaceLost,
            other => Self::Storage(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReservationPolicy {
    pub max_slots_per_owner: usize,
    /// `None` disables the release cutoff.
    pub release_cutoff: Option<Duration>,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            max_slots_per_owner: 4,
            release_cutoff: Some(Duration::hours(24)),
        }
    }
}

impl From<&ReservationConfig> for ReservationPolicy {
    fn from(config: &ReservationConfig) -> Self {
        Self {
            max_slots_per_owner: config.max_slots_per_owner,
            release_cutoff: config
                .release_cutoff_enabled
                .then(|| Duration::hours(config.release_cutoff_hours)),
        }
    }
}

/// A slot as seen by one viewer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: Slot,
    /// Whether the viewer holds this slot.
    pub mine: bool,
}

pub struct ReservationManager {
    store: Arc<dyn SlotStore>,
    policy: ReservationPolicy,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl ReservationManager {
    pub fn new(
        store: Arc<dyn SlotStore>,
        policy: ReservationPolicy,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn SlotStore> {
        &self.store
    }

    /// Expands the window and stores the resulting slots. Returns the number of
    /// slots actually created.
    pub fn generate_slots(
        &self,
        owner_id: Uuid,
        day: NaiveDate,
        window_start: &str,
        window_end: &str,
    ) -> Result<usize, ReservationError> {
        let slots = expander::expand_raw_window(owner_id, day, window_start, window_end)?;
        let created = self.store.insert_all(&slots)?;

        info!(
            owner_id = %owner_id,
            day = %day,
            expanded = slots.len(),
            created,
            "Slots generated"
        );
        Ok(created)
    }

    pub fn list_slots(
        &self,
        owner_id: Option<Uuid>,
        viewer_id: Uuid,
    ) -> Result<Vec<SlotView>, ReservationError> {
        let Some(owner_id) = owner_id else {
            return Ok(Vec::new());
        };

        let views = self
            .store
            .list_by_owner(owner_id)?
            .into_iter()
            .map(|slot| SlotView {
                mine: slot.claimant_id == Some(viewer_id),
                slot,
            })
            .collect();
        Ok(views)
    }

    pub fn claim(&self, slot_id: Uuid, consumer_id: Uuid) -> Result<Slot, ReservationError> {
        let limit = self.policy.max_slots_per_owner;

        let slot = self.store.atomically(&mut |tx| {
            let target = tx.find(slot_id)?.ok_or(ReservationError::SlotNotFound)?;
            let held = tx.claimed_by(consumer_id, target.owner_id)?;
            rules::validate_claim(&target, held, limit)?;

            if tx.mark_claimed(slot_id, consumer_id)? == 0 {
                debug!(slot_id = %slot_id, "Conditional claim matched no free row");
                return Err(ReservationError::RaceLost);
            }

            tx.find(slot_id)?.ok_or(ReservationError::SlotNotFound)
        })?;

        info!(slot_id = %slot_id, user_id = %consumer_id, "Slot claimed");
        Ok(slot)
    }

    /// Frees a slot held by `consumer_id`. A serialization conflict is retried
    /// once, re-checking ownership; a second conflict is a storage failure.
    pub fn release(&self, slot_id: Uuid, consumer_id: Uuid) -> Result<Slot, ReservationError> {
        let slot = match self.release_once(slot_id, consumer_id) {
            Err(ReservationError::RaceLost) => {
                debug!(slot_id = %slot_id, "Release conflicted with a concurrent transaction, retrying");
                self.release_once(slot_id, consumer_id)
                    .map_err(|e| match e {
                        ReservationError::RaceLost => ReservationError::Storage(StoreError::Conflict {
                            message: "release conflicted with a concurrent transaction".to_string(),
                        }),
                        other => other,
                    })?
            }
            other => other?,
        };

        info!(slot_id = %slot_id, user_id = %consumer_id, "Slot released");
        Ok(slot)
    }

    fn release_once(&self, slot_id: Uuid, consumer_id: Uuid) -> Result<Slot, ReservationError> {
        let cutoff = self.policy.release_cutoff;
        let now = self.clock.local().naive_local();

        self.store.atomically(&mut |tx| {
            let target = tx.find(slot_id)?.ok_or(ReservationError::SlotNotFound)?;

            if target.claimant_id != Some(consumer_id) {
                return Err(ReservationError::NotOwner);
            }

            if let Some(cutoff) = cutoff {
                if target.starts_at() - now < cutoff {
                    return Err(ReservationError::TooLate);
                }
            }

            tx.mark_free(slot_id)?;
            tx.find(slot_id)?.ok_or(ReservationError::SlotNotFound)
        })
    }
}
