use chrono::NaiveDateTime;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{AppointmentId, AppointmentStatus, BlockId, HierarchyLevel, Money};
use crate::store::StoreError;

use super::lifecycle::StatusAction;

/// Why a proposed appointment cannot take its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("outside working hours")]
    OutsideWorkingHours,
    #[error("overlaps blocked period {0}")]
    BlockedPeriod(BlockId),
    #[error("employee already booked by appointment {0}")]
    DoubleBooking(AppointmentId),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid range {0}: start must be before end")]
    InvalidRange(String),
    #[error("invalid service interval {0}: must be positive")]
    InvalidInterval(u32),
    #[error("duration must be positive")]
    InvalidDuration,
    #[error("invalid weekday {0}: expected 0 (Sunday) to 6 (Saturday)")]
    InvalidWeekday(u8),
    #[error("weekday {0} appears more than once in policy")]
    DuplicateWeekday(u8),
    #[error("expected a {expected:?} policy, got {found:?}")]
    WrongLevel {
        expected: HierarchyLevel,
        found: HierarchyLevel,
    },
    #[error("invalid discount {0}: must not be negative")]
    InvalidDiscount(Money),
    #[error("conflict: {0}")]
    Conflict(#[from] Conflict),
    #[error("appointment has not occurred yet (ends at {ends_at})")]
    NotYetOccurred { ends_at: NaiveDateTime },
    #[error("appointment already started at {starts_at}")]
    AlreadyStarted { starts_at: NaiveDateTime },
    #[error("appointment {id} is {status} and can no longer change")]
    TerminalState { id: AppointmentId, status: AppointmentStatus },
    #[error("cannot {action} a {from} appointment")]
    IllegalTransition {
        from: AppointmentStatus,
        action: StatusAction,
    },
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("an appointment needs at least one service")]
    EmptySelection,
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
