use chrono::Duration;
use tracing::{info, warn};

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::ProposedAppointment;
use super::lifecycle::{ensure_editable, transition, StatusAction};
use super::{hierarchy, Engine, EngineError};

impl Engine {
    /// Book a new appointment as `Pending`.
    pub async fn create_appointment(
        &self,
        id: AppointmentId,
        request: AppointmentRequest,
    ) -> Result<Appointment, EngineError> {
        check_discount(request.discount)?;
        self.employee(request.employee_id).await?;
        let selection = self.resolve_selection(&request.services).await?;

        let _guards = self.lock_employees(&[request.employee_id]).await;
        if self.stores.appointments.get(id).await?.is_some() {
            return Err(EngineError::AlreadyExists(id));
        }
        let proposal = ProposedAppointment {
            employee_id: request.employee_id,
            span: Span::starting_at(request.start, selection.total_duration),
            categories: selection.categories,
            exclude: None,
        };
        self.check_proposal(&proposal).await?;

        let appointment = Appointment {
            id,
            employee_id: request.employee_id,
            client_id: request.client_id,
            services: selection.services,
            start: request.start,
            total_duration: selection.total_duration,
            subtotal: selection.subtotal,
            discount: request.discount,
            status: AppointmentStatus::Pending,
        };
        // Another employee's lock may have admitted the same id meanwhile.
        if !self.stores.appointments.insert_new(appointment.clone()).await? {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::AppointmentCreated {
            id,
            employee_id: appointment.employee_id,
            span: proposal.span,
        };
        self.notify.send(appointment.employee_id, &event);
        metrics::counter!(observability::APPOINTMENTS_CREATED_TOTAL).increment(1);
        info!(%id, employee = %appointment.employee_id, start = %appointment.start, "appointment created");
        Ok(appointment)
    }

    /// Change date, employee, services or discount of a live appointment.
    /// Id and status are kept; the service snapshot is taken again.
    pub async fn reschedule_appointment(
        &self,
        id: AppointmentId,
        request: AppointmentRequest,
    ) -> Result<Appointment, EngineError> {
        check_discount(request.discount)?;
        self.employee(request.employee_id).await?;
        let selection = self.resolve_selection(&request.services).await?;

        let (current, _guards) = self.lock_appointment(id, Some(request.employee_id)).await?;
        ensure_editable(&current)?;
        let proposal = ProposedAppointment {
            employee_id: request.employee_id,
            span: Span::starting_at(request.start, selection.total_duration),
            categories: selection.categories,
            exclude: Some(id),
        };
        self.check_proposal(&proposal).await?;

        let updated = Appointment {
            id,
            employee_id: request.employee_id,
            client_id: request.client_id,
            services: selection.services,
            start: request.start,
            total_duration: selection.total_duration,
            subtotal: selection.subtotal,
            discount: request.discount,
            status: current.status,
        };
        self.stores.appointments.save(updated.clone()).await?;

        let event = Event::AppointmentRescheduled {
            id,
            employee_id: updated.employee_id,
            previous_employee_id: current.employee_id,
            span: proposal.span,
        };
        self.notify.send(updated.employee_id, &event);
        if current.employee_id != updated.employee_id {
            self.notify.send(current.employee_id, &event);
        }
        metrics::counter!(observability::APPOINTMENTS_RESCHEDULED_TOTAL).increment(1);
        info!(%id, employee = %updated.employee_id, start = %updated.start, "appointment rescheduled");
        Ok(updated)
    }

    pub async fn confirm_appointment(&self, id: AppointmentId) -> Result<Appointment, EngineError> {
        self.change_status(id, StatusAction::Confirm).await
    }

    pub async fn complete_appointment(&self, id: AppointmentId) -> Result<Appointment, EngineError> {
        self.change_status(id, StatusAction::Complete).await
    }

    pub async fn cancel_appointment(&self, id: AppointmentId) -> Result<Appointment, EngineError> {
        self.change_status(id, StatusAction::Cancel).await
    }

    /// Apply a lifecycle action. Confirming re-runs the validator since hours
    /// or blocks may have changed after the booking was made.
    pub async fn change_status(&self, id: AppointmentId, action: StatusAction) -> Result<Appointment, EngineError> {
        let (current, _guards) = self.lock_appointment(id, None).await?;
        let next = transition(&current, action, (self.clock)())?;

        if action == StatusAction::Confirm {
            let proposal = ProposedAppointment {
                employee_id: current.employee_id,
                span: current.span(),
                categories: self.categories_of(&current.services).await?,
                exclude: Some(id),
            };
            self.check_proposal(&proposal).await?;
        }

        if !self.stores.appointments.update_status(id, next).await? {
            return Err(EngineError::NotFound(id));
        }

        let event = Event::AppointmentStatusChanged {
            id,
            employee_id: current.employee_id,
            from: current.status,
            to: next,
        };
        self.notify.send(current.employee_id, &event);
        metrics::counter!(
            observability::STATUS_CHANGES_TOTAL,
            "action" => observability::action_label(action)
        )
        .increment(1);
        info!(%id, from = %current.status, to = %next, "appointment status changed");
        Ok(Appointment {
            status: next,
            ..current
        })
    }

    /// Store a block. Existing appointments inside it are left alone; the
    /// block only affects future scheduling.
    pub async fn create_block(&self, block: Block) -> Result<(), EngineError> {
        if block.span.end - block.span.start > Duration::days(MAX_BLOCK_DAYS) {
            return Err(EngineError::LimitExceeded("block too long"));
        }
        self.employee(block.employee_id).await?;

        let _guards = self.lock_employees(&[block.employee_id]).await;
        self.stores.blocks.save_block(block.clone()).await?;

        let event = Event::BlockCreated {
            id: block.id,
            employee_id: block.employee_id,
            span: block.span,
        };
        self.notify.send(block.employee_id, &event);
        metrics::counter!(observability::BLOCKS_TOTAL).increment(1);
        info!(id = %block.id, employee = %block.employee_id, start = %block.span.start, end = %block.span.end, "block created");
        Ok(())
    }

    /// Remove a block. Returns false if it was already gone.
    pub async fn delete_block(&self, id: BlockId) -> Result<bool, EngineError> {
        let Some(block) = self.stores.blocks.delete_block(id).await? else {
            return Ok(false);
        };
        let event = Event::BlockDeleted {
            id,
            employee_id: block.employee_id,
        };
        self.notify.send(block.employee_id, &event);
        info!(%id, employee = %block.employee_id, "block deleted");
        Ok(true)
    }

    pub async fn replace_company_schedule(&self, schedule: CompanySchedule) -> Result<(), EngineError> {
        check_level(&schedule.policy, HierarchyLevel::Company)?;
        if schedule.service_interval == 0 {
            return Err(EngineError::InvalidInterval(schedule.service_interval));
        }
        self.stores.policies.put_company_schedule(schedule).await?;

        self.notify.broadcast(&Event::PoliciesChanged { employee_id: None });
        metrics::counter!(observability::POLICY_UPDATES_TOTAL, "level" => "company").increment(1);
        info!("company schedule replaced");
        Ok(())
    }

    /// Set or clear (`None`) an employee's own hours.
    ///
    /// Returns the configured hours the company does not open. They are kept
    /// as configured but can never be booked.
    pub async fn replace_employee_policy(
        &self,
        employee_id: EmployeeId,
        policy: Option<WorkingHoursPolicy>,
    ) -> Result<Vec<WeekdaySlot>, EngineError> {
        if let Some(p) = &policy {
            check_level(p, HierarchyLevel::Employee)?;
        }
        self.employee(employee_id).await?;

        let _guards = self.lock_employees(&[employee_id]).await;
        let company = self.stores.policies.company_policy().await?;
        let gaps = match &policy {
            Some(p) => hierarchy::uncovered(p, &company, None),
            None => Vec::new(),
        };
        if !gaps.is_empty() {
            warn!(employee = %employee_id, uncovered = gaps.len(), "employee hours extend beyond company hours");
        }
        self.stores.policies.put_employee_policy(employee_id, policy).await?;

        self.notify.send(employee_id, &Event::PoliciesChanged { employee_id: Some(employee_id) });
        metrics::counter!(observability::POLICY_UPDATES_TOTAL, "level" => "employee").increment(1);
        info!(employee = %employee_id, "employee policy replaced");
        Ok(gaps)
    }

    /// Set or clear (`None`) an employee's hours for one category.
    pub async fn replace_category_policy(
        &self,
        employee_id: EmployeeId,
        category_id: CategoryId,
        policy: Option<WorkingHoursPolicy>,
    ) -> Result<Vec<WeekdaySlot>, EngineError> {
        if let Some(p) = &policy {
            check_level(p, HierarchyLevel::Category)?;
        }
        self.employee(employee_id).await?;
        self.stores
            .catalog
            .category(category_id)
            .await?
            .ok_or(EngineError::NotFound(category_id))?;

        let _guards = self.lock_employees(&[employee_id]).await;
        let company = self.stores.policies.company_policy().await?;
        let employee_policy = self.stores.policies.employee_policy(employee_id).await?;
        let gaps = match &policy {
            Some(p) => hierarchy::uncovered(p, &company, employee_policy.as_ref()),
            None => Vec::new(),
        };
        if !gaps.is_empty() {
            warn!(
                employee = %employee_id,
                category = %category_id,
                uncovered = gaps.len(),
                "category hours extend beyond employee hours"
            );
        }
        self.stores
            .policies
            .put_category_policy(employee_id, category_id, policy)
            .await?;

        self.notify.send(employee_id, &Event::PoliciesChanged { employee_id: Some(employee_id) });
        metrics::counter!(observability::POLICY_UPDATES_TOTAL, "level" => "category").increment(1);
        info!(employee = %employee_id, category = %category_id, "category policy replaced");
        Ok(gaps)
    }
}

fn check_discount(discount: Money) -> Result<(), EngineError> {
    if discount < 0 {
        return Err(EngineError::InvalidDiscount(discount));
    }
    Ok(())
}

fn check_level(policy: &WorkingHoursPolicy, expected: HierarchyLevel) -> Result<(), EngineError> {
    if policy.level() != expected {
        return Err(EngineError::WrongLevel {
            expected,
            found: policy.level(),
        });
    }
    Ok(())
}
