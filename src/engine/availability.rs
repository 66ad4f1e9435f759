use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::model::*;

use super::EngineError;

// ── Availability Algorithm ────────────────────────────────────────

/// Start times at which a `duration`-minute booking fits on `date`.
///
/// Candidates are `window.start + k * step` for as long as the booking still
/// ends inside the window. A candidate is dropped if it overlaps any block or
/// any non-terminal appointment. `blocks` and `appointments` are assumed to
/// belong to the employee being queried.
pub fn bookable_starts(
    date: NaiveDate,
    window: Option<&WeekdaySlot>,
    blocks: &[Block],
    appointments: &[Appointment],
    duration: u32,
    step: u32,
) -> Result<Vec<NaiveDateTime>, EngineError> {
    if step == 0 {
        return Err(EngineError::InvalidInterval(step));
    }
    if duration == 0 {
        return Err(EngineError::InvalidDuration);
    }
    let Some(window) = window else {
        return Ok(Vec::new());
    };

    let busy = busy_spans(blocks, appointments);
    let bounds = window.on(date);
    let length = Duration::minutes(i64::from(duration));
    let step = Duration::minutes(i64::from(step));

    let mut starts = Vec::new();
    let mut candidate = bounds.start;
    while candidate + length <= bounds.end {
        if !overlaps_any(&busy, &Span::new(candidate, candidate + length)) {
            starts.push(candidate);
        }
        candidate += step;
    }
    Ok(starts)
}

/// Contiguous free gaps inside the window on `date`, optionally only those
/// at least `min_duration` minutes long.
pub fn free_spans(
    date: NaiveDate,
    window: Option<&WeekdaySlot>,
    blocks: &[Block],
    appointments: &[Appointment],
    min_duration: Option<u32>,
) -> Vec<Span> {
    let Some(window) = window else {
        return Vec::new();
    };
    let busy = busy_spans(blocks, appointments);
    let mut free = subtract_intervals(&[window.on(date)], &busy);
    if let Some(min) = min_duration {
        free.retain(|span| span.duration_minutes() >= i64::from(min));
    }
    free
}

/// Blocks plus live appointments, sorted and merged.
fn busy_spans(blocks: &[Block], appointments: &[Appointment]) -> Vec<Span> {
    let mut busy: Vec<Span> = blocks
        .iter()
        .map(|b| b.span)
        .chain(
            appointments
                .iter()
                .filter(|a| !a.status.is_terminal())
                .map(|a| a.span()),
        )
        .collect();
    busy.sort_by_key(|s| s.start);
    merge_overlapping(&busy)
}

/// `busy` must be sorted and disjoint.
fn overlaps_any(busy: &[Span], span: &Span) -> bool {
    let first = busy.partition_point(|b| b.end <= span.start);
    busy.get(first).is_some_and(|b| b.start < span.end)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Remove `to_remove` (sorted by start) from `base` (sorted, disjoint).
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
