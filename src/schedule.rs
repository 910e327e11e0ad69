// src/schedule.rs

//! Deterministic load spreading of the expensive per-resource checks.
//!
//! Each resource owns one 10-minute slot per hour, derived from its ARN
//! bytes, and is due only during the first two minutes of that slot.

use chrono::{DateTime, Timelike, Utc};

use crate::types::Arn;

/// Number of 10-minute slots in an hour
pub const SLOT_COUNT: u32 = 6;

/// Width of one slot in minutes
pub const SLOT_MINUTES: u32 = 10;

/// Minutes at the start of a slot during which the resource is due
pub const ACCEPTANCE_MINUTES: u32 = 2;

/// Slot assigned to an ARN, in `0..SLOT_COUNT`
pub fn slot(arn: &Arn) -> u32 {
    let sum: u64 = arn.as_str().bytes().map(u64::from).sum();
    (sum % u64::from(SLOT_COUNT)) as u32
}

/// Whether the resource's slot is open at `now` (UTC minute)
pub fn is_due(arn: &Arn, now: DateTime<Utc>) -> bool {
    let start = slot(arn) * SLOT_MINUTES;
    let minute = now.minute();
    minute >= start && minute < start + ACCEPTANCE_MINUTES
}
