use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

use crate::engine::{Conflict, StatusAction};

// ── Booking metrics ─────────────────────────────────────────────

/// Counter: appointments created.
pub const APPOINTMENTS_CREATED_TOTAL: &str = "agenda_appointments_created_total";

/// Counter: appointments moved to a new time, employee or service selection.
pub const APPOINTMENTS_RESCHEDULED_TOTAL: &str = "agenda_appointments_rescheduled_total";

/// Counter: proposals rejected by the validator. Labels: reason.
pub const VALIDATION_REJECTIONS_TOTAL: &str = "agenda_validation_rejections_total";

/// Counter: successful status changes. Labels: action.
pub const STATUS_CHANGES_TOTAL: &str = "agenda_status_changes_total";

// ── Availability metrics ────────────────────────────────────────

/// Counter: bookable-start queries answered.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "agenda_availability_queries_total";

/// Histogram: bookable-start query latency in seconds.
pub const AVAILABILITY_DURATION_SECONDS: &str = "agenda_availability_duration_seconds";

// ── Schedule maintenance ────────────────────────────────────────

/// Counter: blocks created.
pub const BLOCKS_TOTAL: &str = "agenda_blocks_total";

/// Counter: working-hour policies replaced. Labels: level.
pub const POLICY_UPDATES_TOTAL: &str = "agenda_policy_updates_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Conflict variant to a short label for metrics.
pub fn conflict_label(conflict: &Conflict) -> &'static str {
    match conflict {
        Conflict::OutsideWorkingHours => "outside_working_hours",
        Conflict::BlockedPeriod(_) => "blocked_period",
        Conflict::DoubleBooking(_) => "double_booking",
    }
}

pub fn action_label(action: StatusAction) -> &'static str {
    action.label()
}
