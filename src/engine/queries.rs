use std::time::Instant;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::limits::*;
use crate::model::*;

use super::availability;
use super::conflict::ProposedAppointment;
use super::{hierarchy, Engine, EngineError};

impl Engine {
    /// The hours a schedule screen shows for an employee on `date`, for one
    /// category or for the employee as a whole.
    pub async fn effective_window(
        &self,
        employee_id: EmployeeId,
        category_id: Option<CategoryId>,
        date: NaiveDate,
    ) -> Result<Option<WeekdaySlot>, EngineError> {
        let categories: Vec<CategoryId> = category_id.into_iter().collect();
        let hours = self.hours_snapshot(employee_id, &categories).await?;
        let category_policy = category_id.and_then(|c| hours.categories.get(&c));
        Ok(hierarchy::effective_window(
            &hours.company,
            hours.employee.as_ref(),
            category_policy,
            day_of_week(date),
        ))
    }

    /// The window a booking of these categories must fit on `date`.
    pub async fn legal_window(
        &self,
        employee_id: EmployeeId,
        categories: &[CategoryId],
        date: NaiveDate,
    ) -> Result<Option<WeekdaySlot>, EngineError> {
        let hours = self.hours_snapshot(employee_id, categories).await?;
        Ok(hours.combined_window(categories, day_of_week(date)))
    }

    /// Start times at which the selected services can be booked with
    /// `employee_id` on `date`, ascending.
    pub async fn bookable_starts(
        &self,
        employee_id: EmployeeId,
        services: &[ServiceId],
        date: NaiveDate,
    ) -> Result<Vec<NaiveDateTime>, EngineError> {
        let started = Instant::now();
        let employee = self.employee(employee_id).await?;
        let selection = self.resolve_selection(services).await?;
        let step = self.step_for(&employee).await?;

        let hours = self.hours_snapshot(employee_id, &selection.categories).await?;
        let window = hours.combined_window(&selection.categories, day_of_week(date));

        let day = Span::day(date);
        let blocks = self.stores.blocks.list_blocks(employee_id, day).await?;
        let appointments = self.stores.appointments.list_non_terminal(employee_id, day).await?;

        let starts = availability::bookable_starts(
            date,
            window.as_ref(),
            &blocks,
            &appointments,
            selection.total_duration,
            step,
        )?;

        metrics::counter!(crate::observability::AVAILABILITY_QUERIES_TOTAL).increment(1);
        metrics::histogram!(crate::observability::AVAILABILITY_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        Ok(starts)
    }

    /// Free gaps in the employee's day, optionally only those at least
    /// `min_duration` minutes long.
    pub async fn free_spans(
        &self,
        employee_id: EmployeeId,
        date: NaiveDate,
        min_duration: Option<u32>,
    ) -> Result<Vec<Span>, EngineError> {
        self.employee(employee_id).await?;
        let hours = self.hours_snapshot(employee_id, &[]).await?;
        let window = hours.legal_window(None, day_of_week(date));
        let day = Span::day(date);
        let blocks = self.stores.blocks.list_blocks(employee_id, day).await?;
        let appointments = self.stores.appointments.list_non_terminal(employee_id, day).await?;
        Ok(availability::free_spans(
            date,
            window.as_ref(),
            &blocks,
            &appointments,
            min_duration,
        ))
    }

    /// Dry run of a booking: `Ok` if it could be created right now.
    /// `exclude` names an appointment being edited.
    pub async fn check_appointment(
        &self,
        request: &AppointmentRequest,
        exclude: Option<AppointmentId>,
    ) -> Result<(), EngineError> {
        self.employee(request.employee_id).await?;
        let selection = self.resolve_selection(&request.services).await?;
        let proposal = ProposedAppointment {
            employee_id: request.employee_id,
            span: Span::starting_at(request.start, selection.total_duration),
            categories: selection.categories,
            exclude,
        };
        self.check_proposal(&proposal).await
    }

    pub async fn get_appointment(&self, id: AppointmentId) -> Result<Appointment, EngineError> {
        self.appointment(id).await
    }

    /// Every appointment of an employee overlapping `range`, any status.
    pub async fn list_appointments(
        &self,
        employee_id: EmployeeId,
        range: Span,
    ) -> Result<Vec<Appointment>, EngineError> {
        check_listing_window(&range)?;
        Ok(self.stores.appointments.list(employee_id, range).await?)
    }

    /// A client's appointments, oldest first.
    pub async fn client_history(&self, client_id: ClientId) -> Result<Vec<Appointment>, EngineError> {
        Ok(self.stores.appointments.list_for_client(client_id).await?)
    }

    pub async fn list_blocks(&self, employee_id: EmployeeId, range: Span) -> Result<Vec<Block>, EngineError> {
        check_listing_window(&range)?;
        Ok(self.stores.blocks.list_blocks(employee_id, range).await?)
    }
}

fn check_listing_window(range: &Span) -> Result<(), EngineError> {
    if range.end - range.start > Duration::days(MAX_LISTING_WINDOW_DAYS) {
        return Err(EngineError::LimitExceeded("listing window too wide"));
    }
    Ok(())
}
