use crate::model::*;

// ── Working-hours hierarchy ──────────────────────────────────────
//
// company → employee → category. An override policy, when present, replaces
// its parent for every weekday; a weekday it leaves out is closed.

/// The window a settings screen shows as configured for `day`.
///
/// A closed company day stays closed whatever the overrides say.
pub fn effective_window(
    company: &WorkingHoursPolicy,
    employee: Option<&WorkingHoursPolicy>,
    category: Option<&WorkingHoursPolicy>,
    day: u8,
) -> Option<WeekdaySlot> {
    let company_slot = company.slot_for(day)?;
    let base = match employee {
        Some(policy) => policy.slot_for(day),
        None => Some(company_slot),
    };
    match category {
        Some(policy) => policy.slot_for(day),
        None => base,
    }
}

/// The window a booking must fit in: the effective window clipped to every
/// ancestor level that defines hours.
pub fn legal_window(
    company: &WorkingHoursPolicy,
    employee: Option<&WorkingHoursPolicy>,
    category: Option<&WorkingHoursPolicy>,
    day: u8,
) -> Option<WeekdaySlot> {
    let company_slot = company.slot_for(day)?;
    let mut window = effective_window(company, employee, category, day)?.intersect(&company_slot)?;
    if let Some(policy) = employee {
        window = window.intersect(&policy.slot_for(day)?)?;
    }
    Some(window)
}

/// Portions of `child`'s slots that its ancestors do not open.
///
/// `employee` is the policy between the company and a category-level child;
/// pass `None` when `child` is itself the employee policy.
pub fn uncovered(
    child: &WorkingHoursPolicy,
    company: &WorkingHoursPolicy,
    employee: Option<&WorkingHoursPolicy>,
) -> Vec<WeekdaySlot> {
    let mut result = Vec::new();
    for slot in child.slots() {
        let day = slot.day_of_week();
        match legal_window(company, employee, None, day) {
            Some(parent) => result.extend(slot_minus(slot, &parent)),
            None => result.push(*slot),
        }
    }
    result
}

fn slot_minus(slot: &WeekdaySlot, other: &WeekdaySlot) -> Vec<WeekdaySlot> {
    let day = slot.day_of_week();
    let mut pieces = Vec::new();
    if slot.start() < other.start() {
        let end = other.start().min(slot.end());
        pieces.extend(WeekdaySlot::new(day, slot.start(), end).ok());
    }
    if other.end() < slot.end() {
        let start = other.end().max(slot.start());
        pieces.extend(WeekdaySlot::new(day, start, slot.end()).ok());
    }
    pieces
}
