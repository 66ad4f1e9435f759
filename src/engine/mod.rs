mod availability;
mod conflict;
mod error;
mod hierarchy;
mod lifecycle;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{bookable_starts, free_spans, merge_overlapping, subtract_intervals};
pub use conflict::{validate, HoursSnapshot, ProposedAppointment};
pub use error::{Conflict, EngineError};
pub use hierarchy::{effective_window, legal_window, uncovered};
pub use lifecycle::{ensure_editable, transition, StatusAction};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::store::Stores;

pub type EmployeeLock = Arc<Mutex<()>>;

/// Facade over the pure scheduling components.
///
/// Reads always go to the stores, so an effective window is never cached
/// across writes. Every write that touches an employee's schedule holds that
/// employee's lock while it re-validates against a fresh snapshot.
pub struct Engine {
    pub(super) stores: Stores,
    pub notify: Arc<NotifyHub>,
    locks: DashMap<EmployeeId, EmployeeLock>,
    pub(super) clock: fn() -> NaiveDateTime,
}

/// A service selection resolved against the catalog.
#[derive(Debug, Clone)]
pub(super) struct Selection {
    pub services: Vec<ServiceId>,
    /// Distinct categories, in selection order.
    pub categories: Vec<CategoryId>,
    pub total_duration: u32,
    pub subtotal: Money,
}

impl Engine {
    pub fn new(stores: Stores, notify: Arc<NotifyHub>) -> Self {
        Self {
            stores,
            notify,
            locks: DashMap::new(),
            clock: lifecycle::now,
        }
    }

    /// Replace the wall clock used by status transitions.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    fn employee_lock(&self, employee_id: EmployeeId) -> EmployeeLock {
        self.locks.entry(employee_id).or_default().clone()
    }

    /// Acquire employee locks in sorted order to prevent deadlocks.
    pub(super) async fn lock_employees(&self, ids: &[EmployeeId]) -> Vec<OwnedMutexGuard<()>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.employee_lock(id).lock_owned().await);
        }
        guards
    }

    /// Lock the appointment's current employee (plus `also`, if given) and
    /// return the appointment as read under those locks.
    pub(super) async fn lock_appointment(
        &self,
        id: AppointmentId,
        also: Option<EmployeeId>,
    ) -> Result<(Appointment, Vec<OwnedMutexGuard<()>>), EngineError> {
        loop {
            let seen = self.appointment(id).await?;
            let mut ids = vec![seen.employee_id];
            ids.extend(also);
            let guards = self.lock_employees(&ids).await;
            let current = self.appointment(id).await?;
            // Moved to another employee while we waited; lock again.
            if current.employee_id == seen.employee_id {
                return Ok((current, guards));
            }
        }
    }

    pub(super) async fn appointment(&self, id: AppointmentId) -> Result<Appointment, EngineError> {
        self.stores
            .appointments
            .get(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    pub(super) async fn employee(&self, id: EmployeeId) -> Result<Employee, EngineError> {
        self.stores
            .catalog
            .employee(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// Step between candidate start times for this employee.
    pub(super) async fn step_for(&self, employee: &Employee) -> Result<u32, EngineError> {
        match employee.service_interval {
            Some(step) => Ok(step),
            None => Ok(self.stores.policies.company_schedule().await?.service_interval),
        }
    }

    /// Look up every selected service; fails on an empty or unknown selection.
    pub(super) async fn resolve_selection(&self, services: &[ServiceId]) -> Result<Selection, EngineError> {
        if services.is_empty() {
            return Err(EngineError::EmptySelection);
        }
        if services.len() > MAX_SERVICES_PER_APPOINTMENT {
            return Err(EngineError::LimitExceeded("too many services in one appointment"));
        }
        let mut selection = Selection {
            services: services.to_vec(),
            categories: Vec::new(),
            total_duration: 0,
            subtotal: 0,
        };
        for &id in services {
            let service = self.service(id).await?;
            if !selection.categories.contains(&service.category_id) {
                selection.categories.push(service.category_id);
            }
            selection.total_duration = selection
                .total_duration
                .checked_add(service.duration)
                .filter(|total| *total <= MAX_APPOINTMENT_MINUTES)
                .ok_or(EngineError::LimitExceeded("appointment longer than a day"))?;
            selection.subtotal = selection
                .subtotal
                .checked_add(service.price)
                .ok_or(EngineError::LimitExceeded("appointment price out of range"))?;
        }
        Ok(selection)
    }

    /// Distinct categories of already booked services, in selection order.
    /// Durations and prices are not looked at; the appointment keeps its own.
    pub(super) async fn categories_of(&self, services: &[ServiceId]) -> Result<Vec<CategoryId>, EngineError> {
        let mut categories = Vec::new();
        for &id in services {
            let category = self.service(id).await?.category_id;
            if !categories.contains(&category) {
                categories.push(category);
            }
        }
        Ok(categories)
    }

    async fn service(&self, id: ServiceId) -> Result<Service, EngineError> {
        self.stores
            .catalog
            .service(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// Current policies for `employee_id` and the given categories.
    pub(super) async fn hours_snapshot(
        &self,
        employee_id: EmployeeId,
        categories: &[CategoryId],
    ) -> Result<HoursSnapshot, EngineError> {
        let policies = &self.stores.policies;
        let company = policies.company_policy().await?;
        let employee = policies.employee_policy(employee_id).await?;
        let mut overrides = HashMap::new();
        for &category in categories {
            if let Some(policy) = policies.category_policy(employee_id, category).await? {
                overrides.insert(category, policy);
            }
        }
        Ok(HoursSnapshot {
            company,
            employee,
            categories: overrides,
        })
    }

    /// Run the validator against a fresh read of the employee's schedule.
    /// Callers that go on to write must hold the employee lock.
    pub(super) async fn check_proposal(&self, proposal: &ProposedAppointment) -> Result<(), EngineError> {
        let hours = self.hours_snapshot(proposal.employee_id, &proposal.categories).await?;
        let blocks = self
            .stores
            .blocks
            .list_blocks(proposal.employee_id, proposal.span)
            .await?;
        let existing = self
            .stores
            .appointments
            .list_non_terminal(proposal.employee_id, proposal.span)
            .await?;
        validate(proposal, &hours, &blocks, &existing).map_err(|conflict| {
            debug!(employee = %proposal.employee_id, start = %proposal.span.start, %conflict, "proposal rejected");
            metrics::counter!(
                crate::observability::VALIDATION_REJECTIONS_TOTAL,
                "reason" => crate::observability::conflict_label(&conflict)
            )
            .increment(1);
            EngineError::Conflict(conflict)
        })
    }
}
