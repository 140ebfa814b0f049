//! Claim validation rules.
//!
//! Each rule inspects the slots involved in a claim and either passes or names
//! the violated constraint. They run in order before the conditional write.

use super::ReservationError;
use crate::models::Slot;

pub fn ensure_free(target: &Slot) -> Result<(), ReservationError> {
    if target.booked {
        return Err(ReservationError::AlreadyReserved);
    }
    Ok(())
}

/// `group` is the consumer's current slots for the owner plus the target.
pub fn check_quota(group: &[Slot], limit: usize) -> Result<(), ReservationError> {
    if group.len() > limit {
        return Err(ReservationError::QuotaExceeded { limit });
    }
    Ok(())
}

pub fn check_same_day(group: &[Slot]) -> Result<(), ReservationError> {
    match group.split_first() {
        Some((first, rest)) if rest.iter().any(|s| s.day != first.day) => {
            Err(ReservationError::MixedDay)
        }
        _ => Ok(()),
    }
}

/// Sorts `group` by start time and requires each slot to end where the next
/// one starts.
pub fn check_contiguous(group: &mut [Slot]) -> Result<(), ReservationError> {
    group.sort_by_key(|s| s.start_time);

    if group
        .windows(2)
        .any(|pair| pair[0].end_time != pair[1].start_time)
    {
        return Err(ReservationError::NonContiguous);
    }
    Ok(())
}

/// Runs every rule for claiming `target` on top of `held`.
pub fn validate_claim(target: &Slot, held: Vec<Slot>, limit: usize) -> Result<(), ReservationError> {
    ensure_free(target)?;

    let mut group = held;
    group.push(target.clone());

    check_quota(&group, limit)?;
    check_same_day(&group)?;
    check_contiguous(&mut group)
}
