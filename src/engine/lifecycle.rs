use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::model::*;

use super::EngineError;

pub(crate) fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Explicit status changes a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusAction {
    Confirm,
    Complete,
    Cancel,
}

impl StatusAction {
    pub const ALL: [StatusAction; 3] = [StatusAction::Confirm, StatusAction::Complete, StatusAction::Cancel];

    pub fn label(&self) -> &'static str {
        match self {
            StatusAction::Confirm => "confirm",
            StatusAction::Complete => "complete",
            StatusAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for StatusAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Next status for `action`, or why it is not allowed at `now`.
///
/// | from                | confirm          | complete             | cancel   |
/// |---------------------|------------------|----------------------|----------|
/// | pending             | before start     | at/after end         | always   |
/// | confirmed           | illegal          | at/after end         | always   |
/// | completed, canceled | terminal         | terminal             | terminal |
pub fn transition(
    appointment: &Appointment,
    action: StatusAction,
    now: NaiveDateTime,
) -> Result<AppointmentStatus, EngineError> {
    use AppointmentStatus::*;

    match (appointment.status, action) {
        (status @ (Completed | Canceled), _) => Err(EngineError::TerminalState {
            id: appointment.id,
            status,
        }),
        (Pending, StatusAction::Confirm) if now < appointment.start => Ok(Confirmed),
        (Pending, StatusAction::Confirm) => Err(EngineError::AlreadyStarted {
            starts_at: appointment.start,
        }),
        (Confirmed, StatusAction::Confirm) => Err(EngineError::IllegalTransition {
            from: Confirmed,
            action,
        }),
        (Pending | Confirmed, StatusAction::Cancel) => Ok(Canceled),
        (Pending | Confirmed, StatusAction::Complete) if now >= appointment.end() => Ok(Completed),
        (Pending | Confirmed, StatusAction::Complete) => Err(EngineError::NotYetOccurred {
            ends_at: appointment.end(),
        }),
    }
}

/// Date, employee and services can only change while the appointment is live.
pub fn ensure_editable(appointment: &Appointment) -> Result<(), EngineError> {
    if appointment.status.is_terminal() {
        return Err(EngineError::TerminalState {
            id: appointment.id,
            status: appointment.status,
        });
    }
    Ok(())
}
