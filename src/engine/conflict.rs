use std::collections::HashMap;

use crate::model::*;

use super::error::Conflict;
use super::hierarchy::legal_window;

/// Working-hour policies that apply to one employee, read in one go.
#[derive(Debug, Clone)]
pub struct HoursSnapshot {
    pub company: WorkingHoursPolicy,
    pub employee: Option<WorkingHoursPolicy>,
    /// Category overrides for this employee; categories without one inherit.
    pub categories: HashMap<CategoryId, WorkingHoursPolicy>,
}

impl HoursSnapshot {
    pub fn legal_window(&self, category: Option<CategoryId>, day: u8) -> Option<WeekdaySlot> {
        let category_policy = category.and_then(|c| self.categories.get(&c));
        legal_window(&self.company, self.employee.as_ref(), category_policy, day)
    }

    /// Intersection of the legality windows of every involved category.
    /// With no categories the employee-level window applies.
    pub fn combined_window(&self, categories: &[CategoryId], day: u8) -> Option<WeekdaySlot> {
        if categories.is_empty() {
            return self.legal_window(None, day);
        }
        let mut combined: Option<WeekdaySlot> = None;
        for &category in categories {
            let window = self.legal_window(Some(category), day)?;
            combined = Some(match combined {
                Some(acc) => acc.intersect(&window)?,
                None => window,
            });
        }
        combined
    }
}

/// A booking to be checked against the employee's current schedule.
#[derive(Debug, Clone)]
pub struct ProposedAppointment {
    pub employee_id: EmployeeId,
    pub span: Span,
    pub categories: Vec<CategoryId>,
    /// Appointment being edited; its current interval is not a conflict.
    pub exclude: Option<AppointmentId>,
}

/// Check working hours, then blocks, then other appointments. First failure wins.
pub fn validate(
    proposal: &ProposedAppointment,
    hours: &HoursSnapshot,
    blocks: &[Block],
    existing: &[Appointment],
) -> Result<(), Conflict> {
    let date = proposal.span.start.date();
    let window = hours
        .combined_window(&proposal.categories, day_of_week(date))
        .ok_or(Conflict::OutsideWorkingHours)?;
    if !window.on(date).contains_span(&proposal.span) {
        return Err(Conflict::OutsideWorkingHours);
    }

    if let Some(block) = blocks
        .iter()
        .find(|b| b.employee_id == proposal.employee_id && b.span.overlaps(&proposal.span))
    {
        return Err(Conflict::BlockedPeriod(block.id));
    }

    if let Some(other) = existing.iter().find(|a| {
        a.employee_id == proposal.employee_id
            && !a.status.is_terminal()
            && Some(a.id) != proposal.exclude
            && a.span().overlaps(&proposal.span)
    }) {
        return Err(Conflict::DoubleBooking(other.id));
    }

    Ok(())
}
