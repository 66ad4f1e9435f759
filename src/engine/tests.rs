use super::*;
use crate::store::{AppointmentStore, MemoryStore, StoreError, Stores};

use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

const MON: u8 = 1;
const TUE: u8 = 2;

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 8).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    monday().and_hms_opt(h, m, 0).unwrap()
}

fn slot(day: u8, start_h: u16, end_h: u16) -> WeekdaySlot {
    WeekdaySlot::new(day, start_h * 60, end_h * 60).unwrap()
}

fn weekdays(level: HierarchyLevel, start_h: u16, end_h: u16) -> WorkingHoursPolicy {
    WorkingHoursPolicy::new(level, (1..=5).map(|d| slot(d, start_h, end_h))).unwrap()
}

/// A salon open Monday to Friday 09:00–18:00 with a 30 minute step.
struct Salon {
    engine: Arc<Engine>,
    store: Arc<MemoryStore>,
    alice: EmployeeId,
    bob: EmployeeId,
    hair: CategoryId,
    nails: CategoryId,
    /// 30 min, hair
    cut: ServiceId,
    /// 60 min, hair
    color: ServiceId,
    /// 30 min, nails
    manicure: ServiceId,
}

impl Salon {
    fn new() -> Self {
        Self::with_clock(lifecycle::now)
    }

    fn with_clock(clock: fn() -> NaiveDateTime) -> Self {
        let store = Arc::new(MemoryStore::new(CompanySchedule {
            service_interval: 30,
            policy: weekdays(HierarchyLevel::Company, 9, 18),
        }));
        let alice = Ulid::new();
        let bob = Ulid::new();
        store.insert_employee(Employee {
            id: alice,
            name: "Alice".into(),
            service_interval: None,
        });
        store.insert_employee(Employee {
            id: bob,
            name: "Bob".into(),
            service_interval: None,
        });

        let hair = Ulid::new();
        let nails = Ulid::new();
        for (id, name) in [(hair, "Hair"), (nails, "Nails")] {
            store.insert_category(Category {
                id,
                name: name.into(),
                description: None,
            });
        }

        let cut = Ulid::new();
        let color = Ulid::new();
        let manicure = Ulid::new();
        store.insert_service(Service::new(cut, hair, "Cut", 30, 5000).unwrap());
        store.insert_service(Service::new(color, hair, "Color", 60, 9000).unwrap());
        store.insert_service(Service::new(manicure, nails, "Manicure", 30, 3000).unwrap());

        let engine = Engine::new(Stores::memory(store.clone()), Arc::new(NotifyHub::new())).with_clock(clock);
        Self {
            engine: Arc::new(engine),
            store,
            alice,
            bob,
            hair,
            nails,
            cut,
            color,
            manicure,
        }
    }

    fn request(&self, employee_id: EmployeeId, services: &[ServiceId], start: NaiveDateTime) -> AppointmentRequest {
        AppointmentRequest {
            employee_id,
            client_id: Ulid::new(),
            services: services.to_vec(),
            start,
            discount: 0,
        }
    }

    async fn book(&self, services: &[ServiceId], start: NaiveDateTime) -> Result<Appointment, EngineError> {
        self.engine
            .create_appointment(Ulid::new(), self.request(self.alice, services, start))
            .await
    }
}

fn conflict(result: Result<Appointment, EngineError>) -> Conflict {
    match result {
        Err(EngineError::Conflict(c)) => c,
        other => panic!("expected a conflict, got {other:?}"),
    }
}

// ── Availability ───────────────────────────────────────────

#[tokio::test]
async fn company_hours_only() {
    let s = Salon::new();
    let starts = s.engine.bookable_starts(s.alice, &[s.color], monday()).await.unwrap();
    assert_eq!(starts.len(), 17);
    assert_eq!(starts.first(), Some(&at(9, 0)));
    assert_eq!(starts.last(), Some(&at(17, 0)));
}

#[tokio::test]
async fn lunch_block_removes_overlapping_starts() {
    let s = Salon::new();
    let lunch = Block::new(Ulid::new(), s.alice, at(12, 0), at(13, 0)).unwrap();
    s.engine.create_block(lunch).await.unwrap();

    let starts = s.engine.bookable_starts(s.alice, &[s.cut], monday()).await.unwrap();
    assert_eq!(starts.len(), 16);
    assert!(!starts.contains(&at(12, 0)));
    assert!(!starts.contains(&at(12, 30)));
    assert!(starts.contains(&at(11, 30)));
    assert!(starts.contains(&at(13, 0)));

    // Bob is not affected by Alice's block
    let bob = s.engine.bookable_starts(s.bob, &[s.cut], monday()).await.unwrap();
    assert_eq!(bob.len(), 18);
}

#[tokio::test]
async fn employee_override_closes_days_it_leaves_out() {
    let s = Salon::new();
    let hours = WorkingHoursPolicy::new(HierarchyLevel::Employee, [slot(MON, 10, 14)]).unwrap();
    s.engine.replace_employee_policy(s.alice, Some(hours)).await.unwrap();

    // Company is open Tuesday, but Alice's own policy has no Tuesday slot
    let tue = s.engine.bookable_starts(s.alice, &[s.color], tuesday()).await.unwrap();
    assert!(tue.is_empty());

    let mon = s.engine.bookable_starts(s.alice, &[s.color], monday()).await.unwrap();
    assert_eq!(mon, vec![at(10, 0), at(10, 30), at(11, 0), at(11, 30), at(12, 0), at(12, 30), at(13, 0)]);

    let result = s
        .engine
        .create_appointment(
            Ulid::new(),
            s.request(s.alice, &[s.cut], tuesday().and_hms_opt(10, 0, 0).unwrap()),
        )
        .await;
    assert_eq!(conflict(result), Conflict::OutsideWorkingHours);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_creates_for_one_slot_admit_exactly_one() {
    let s = Salon::new();
    let n = 8;
    let mut handles = Vec::new();
    for _ in 0..n {
        let engine = s.engine.clone();
        let request = s.request(s.alice, &[s.color], at(10, 0));
        handles.push(tokio::spawn(async move {
            engine.create_appointment(Ulid::new(), request).await
        }));
    }

    let mut created = 0;
    let mut double_booked = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => created += 1,
            Err(EngineError::Conflict(Conflict::DoubleBooking(_))) => double_booked += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(double_booked, n - 1);
    assert_eq!(s.store.appointment_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_overlapping_creates_admit_exactly_one() {
    let s = Salon::new();
    let a = s.request(s.alice, &[s.color], at(10, 0));
    let b = s.request(s.alice, &[s.color], at(10, 30));
    let (e1, e2) = (s.engine.clone(), s.engine.clone());
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { e1.create_appointment(Ulid::new(), a).await }),
        tokio::spawn(async move { e2.create_appointment(Ulid::new(), b).await }),
    );
    let results = [r1.unwrap(), r2.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(EngineError::Conflict(Conflict::DoubleBooking(_))))));
}

fn monday_at_nine() -> NaiveDateTime {
    at(9, 0)
}

fn monday_after_closing() -> NaiveDateTime {
    at(18, 30)
}

#[tokio::test]
async fn completion_waits_for_scheduled_end() {
    let early = Salon::with_clock(monday_at_nine);
    let appt = early.book(&[early.cut], at(10, 0)).await.unwrap();
    assert!(matches!(
        early.engine.complete_appointment(appt.id).await,
        Err(EngineError::NotYetOccurred { ends_at }) if ends_at == at(10, 30)
    ));
    assert_eq!(
        early.engine.get_appointment(appt.id).await.unwrap().status,
        AppointmentStatus::Pending
    );

    let late = Salon::with_clock(monday_after_closing);
    let appt = late.book(&[late.cut], at(10, 0)).await.unwrap();
    let done = late.engine.complete_appointment(appt.id).await.unwrap();
    assert_eq!(done.status, AppointmentStatus::Completed);

    assert!(matches!(
        late.engine.cancel_appointment(appt.id).await,
        Err(EngineError::TerminalState { status: AppointmentStatus::Completed, .. })
    ));
}

// ── Creation ─────────────────────────────────────────────

#[tokio::test]
async fn created_appointment_snapshots_selection() {
    let s = Salon::new();
    let mut request = s.request(s.alice, &[s.cut, s.manicure], at(10, 0));
    request.discount = 1000;
    let appt = s.engine.create_appointment(Ulid::new(), request).await.unwrap();

    assert_eq!(appt.status, AppointmentStatus::Pending);
    assert_eq!(appt.total_duration, 60);
    assert_eq!(appt.subtotal, 8000);
    assert_eq!(appt.total_price(), 7000);
    assert_eq!(appt.end(), at(11, 0));
    assert_eq!(s.engine.get_appointment(appt.id).await.unwrap(), appt);
}

#[tokio::test]
async fn create_reports_each_conflict_kind() {
    let s = Salon::new();
    assert_eq!(conflict(s.book(&[s.color], at(17, 30)).await), Conflict::OutsideWorkingHours);

    let block = Block::new(Ulid::new(), s.alice, at(12, 0), at(13, 0)).unwrap();
    s.engine.create_block(block.clone()).await.unwrap();
    assert_eq!(conflict(s.book(&[s.cut], at(12, 30)).await), Conflict::BlockedPeriod(block.id));

    let first = s.book(&[s.color], at(10, 0)).await.unwrap();
    assert_eq!(conflict(s.book(&[s.cut], at(10, 30)).await), Conflict::DoubleBooking(first.id));

    // Back to back is fine
    assert!(s.book(&[s.cut], at(11, 0)).await.is_ok());
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_validation() {
    let s = Salon::new();
    assert!(matches!(s.book(&[], at(10, 0)).await, Err(EngineError::EmptySelection)));

    let unknown = Ulid::new();
    assert!(matches!(
        s.book(&[unknown], at(10, 0)).await,
        Err(EngineError::NotFound(id)) if id == unknown
    ));

    let mut request = s.request(s.alice, &[s.cut], at(10, 0));
    request.discount = -1;
    assert!(matches!(
        s.engine.create_appointment(Ulid::new(), request).await,
        Err(EngineError::InvalidDiscount(-1))
    ));

    let ghost = s.request(Ulid::new(), &[s.cut], at(10, 0));
    assert!(matches!(
        s.engine.create_appointment(Ulid::new(), ghost).await,
        Err(EngineError::NotFound(_))
    ));

    let too_many = vec![s.cut; crate::limits::MAX_SERVICES_PER_APPOINTMENT + 1];
    assert!(matches!(s.book(&too_many, at(9, 0)).await, Err(EngineError::LimitExceeded(_))));
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
    let s = Salon::new();
    let id = Ulid::new();
    s.engine
        .create_appointment(id, s.request(s.alice, &[s.cut], at(10, 0)))
        .await
        .unwrap();
    let result = s
        .engine
        .create_appointment(id, s.request(s.bob, &[s.cut], at(14, 0)))
        .await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
}

/// Appointment reads that take a while, as against a remote database.
struct SlowReads(Arc<MemoryStore>);

#[async_trait::async_trait]
impl AppointmentStore for SlowReads {
    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.0.get(id).await
    }

    async fn list_non_terminal(&self, employee_id: EmployeeId, range: Span) -> Result<Vec<Appointment>, StoreError> {
        self.0.list_non_terminal(employee_id, range).await
    }

    async fn list(&self, employee_id: EmployeeId, range: Span) -> Result<Vec<Appointment>, StoreError> {
        self.0.list(employee_id, range).await
    }

    async fn list_for_client(&self, client_id: ClientId) -> Result<Vec<Appointment>, StoreError> {
        self.0.list_for_client(client_id).await
    }

    async fn save(&self, appointment: Appointment) -> Result<(), StoreError> {
        self.0.save(appointment).await
    }

    async fn insert_new(&self, appointment: Appointment) -> Result<bool, StoreError> {
        self.0.insert_new(appointment).await
    }

    async fn update_status(&self, id: AppointmentId, status: AppointmentStatus) -> Result<bool, StoreError> {
        self.0.update_status(id, status).await
    }
}

#[tokio::test]
async fn same_id_for_two_employees_books_once() {
    let s = Salon::new();
    let stores = Stores {
        appointments: Arc::new(SlowReads(s.store.clone())),
        ..Stores::memory(s.store.clone())
    };
    let engine = Engine::new(stores, Arc::new(NotifyHub::new()));

    let id = Ulid::new();
    let (for_alice, for_bob) = tokio::join!(
        engine.create_appointment(id, s.request(s.alice, &[s.cut], at(10, 0))),
        engine.create_appointment(id, s.request(s.bob, &[s.cut], at(11, 0))),
    );

    let winner = match (for_alice, for_bob) {
        (Ok(a), Err(EngineError::AlreadyExists(dup))) | (Err(EngineError::AlreadyExists(dup)), Ok(a)) => {
            assert_eq!(dup, id);
            a
        }
        other => panic!("expected one booking and one duplicate, got {other:?}"),
    };
    assert_eq!(s.store.appointment_count(), 1);
    let stored = s.store.get(id).await.unwrap().unwrap();
    assert_eq!(stored, winner);
}

#[tokio::test]
async fn oversized_selections_are_limits_not_overflows() {
    let s = Salon::new();
    let huge_a = Ulid::new();
    let huge_b = Ulid::new();
    s.store.insert_service(Service::new(huge_a, s.hair, "Marathon", 1 << 31, 100).unwrap());
    s.store.insert_service(Service::new(huge_b, s.hair, "Relay", 1 << 31, 100).unwrap());
    assert!(matches!(
        s.engine.bookable_starts(s.alice, &[huge_a, huge_b], monday()).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(matches!(
        s.book(&[huge_a, huge_b], at(10, 0)).await,
        Err(EngineError::LimitExceeded(_))
    ));

    let pricey = Ulid::new();
    s.store.insert_service(Service::new(pricey, s.hair, "Gold", 1, Money::MAX).unwrap());
    assert!(matches!(
        s.book(&[pricey, s.cut], at(10, 0)).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert_eq!(s.store.appointment_count(), 0);
}

#[tokio::test]
async fn check_appointment_is_a_dry_run() {
    let s = Salon::new();
    let request = s.request(s.alice, &[s.cut], at(10, 0));
    s.engine.check_appointment(&request, None).await.unwrap();
    s.engine.check_appointment(&request, None).await.unwrap();
    assert_eq!(s.store.appointment_count(), 0);
}

#[tokio::test]
async fn multi_category_booking_fits_every_category_window() {
    let s = Salon::new();
    let hair_hours = WorkingHoursPolicy::new(HierarchyLevel::Category, [slot(MON, 9, 12)]).unwrap();
    let nail_hours = WorkingHoursPolicy::new(HierarchyLevel::Category, [slot(MON, 11, 18)]).unwrap();
    s.engine
        .replace_category_policy(s.alice, s.hair, Some(hair_hours))
        .await
        .unwrap();
    s.engine
        .replace_category_policy(s.alice, s.nails, Some(nail_hours))
        .await
        .unwrap();

    // Only 11:00–12:00 is open for both
    let starts = s
        .engine
        .bookable_starts(s.alice, &[s.cut, s.manicure], monday())
        .await
        .unwrap();
    assert_eq!(starts, vec![at(11, 0)]);

    assert_eq!(
        conflict(s.book(&[s.cut, s.manicure], at(10, 0)).await),
        Conflict::OutsideWorkingHours
    );
    assert!(s.book(&[s.cut, s.manicure], at(11, 0)).await.is_ok());
}

#[tokio::test]
async fn employee_step_overrides_company_step() {
    let s = Salon::new();
    let carol = Ulid::new();
    s.store.insert_employee(Employee {
        id: carol,
        name: "Carol".into(),
        service_interval: Some(60),
    });
    let starts = s.engine.bookable_starts(carol, &[s.cut], monday()).await.unwrap();
    assert_eq!(starts.len(), 9);
    assert!(starts.iter().all(|t| t.format("%M").to_string() == "00"));
}

// ── Lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn cancel_frees_the_slot() {
    let s = Salon::new();
    let appt = s.book(&[s.color], at(10, 0)).await.unwrap();
    assert!(!s
        .engine
        .bookable_starts(s.alice, &[s.color], monday())
        .await
        .unwrap()
        .contains(&at(10, 0)));

    let canceled = s.engine.cancel_appointment(appt.id).await.unwrap();
    assert_eq!(canceled.status, AppointmentStatus::Canceled);

    assert!(s
        .engine
        .bookable_starts(s.alice, &[s.color], monday())
        .await
        .unwrap()
        .contains(&at(10, 0)));
    assert!(s.book(&[s.color], at(10, 0)).await.is_ok());

    // Never physically deleted
    assert_eq!(s.store.appointment_count(), 2);
}

#[tokio::test]
async fn confirm_once_then_illegal() {
    let s = Salon::new();
    let appt = s.book(&[s.cut], at(10, 0)).await.unwrap();
    let confirmed = s.engine.confirm_appointment(appt.id).await.unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert!(matches!(
        s.engine.confirm_appointment(appt.id).await,
        Err(EngineError::IllegalTransition { .. })
    ));
}

#[tokio::test]
async fn confirm_revalidates_against_current_hours() {
    let s = Salon::new();
    let appt = s.book(&[s.cut], at(10, 0)).await.unwrap();
    let afternoons = weekdays(HierarchyLevel::Employee, 13, 18);
    s.engine.replace_employee_policy(s.alice, Some(afternoons)).await.unwrap();

    assert!(matches!(
        s.engine.confirm_appointment(appt.id).await,
        Err(EngineError::Conflict(Conflict::OutsideWorkingHours))
    ));
    assert_eq!(
        s.engine.get_appointment(appt.id).await.unwrap().status,
        AppointmentStatus::Pending
    );
    // Cancel never needs validation
    assert!(s.engine.cancel_appointment(appt.id).await.is_ok());
}

#[tokio::test]
async fn confirm_uses_the_booked_duration_not_the_catalog() {
    let s = Salon::new();
    let appt = s.book(&[s.cut], at(10, 0)).await.unwrap();
    // The cut is now longer than any appointment may be
    s.store.insert_service(Service::new(s.cut, s.hair, "Cut", 2000, 5000).unwrap());

    let confirmed = s.engine.confirm_appointment(appt.id).await.unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert_eq!(confirmed.total_duration, 30);
    assert_eq!(confirmed.end(), at(10, 30));
}

#[tokio::test]
async fn status_change_on_unknown_appointment() {
    let s = Salon::new();
    let id = Ulid::new();
    for action in StatusAction::ALL {
        assert!(matches!(
            s.engine.change_status(id, action).await,
            Err(EngineError::NotFound(missing)) if missing == id
        ));
    }
}

// ── Rescheduling ─────────────────────────────────────────

#[tokio::test]
async fn reschedule_ignores_own_current_interval() {
    let s = Salon::new();
    let appt = s.book(&[s.color], at(10, 0)).await.unwrap();
    let confirmed = s.engine.confirm_appointment(appt.id).await.unwrap();

    let mut request = s.request(s.alice, &[s.color], at(10, 30));
    request.client_id = appt.client_id;
    let moved = s.engine.reschedule_appointment(appt.id, request).await.unwrap();
    assert_eq!(moved.id, appt.id);
    assert_eq!(moved.start, at(10, 30));
    assert_eq!(moved.status, confirmed.status);
    assert_eq!(s.store.appointment_count(), 1);
}

#[tokio::test]
async fn reschedule_recomputes_snapshot_and_checks_others() {
    let s = Salon::new();
    let appt = s.book(&[s.cut], at(10, 0)).await.unwrap();
    let other = s.book(&[s.cut], at(11, 0)).await.unwrap();

    // Growing to 60 minutes would run into the 11:00 booking
    let grow = s.request(s.alice, &[s.cut, s.manicure], at(10, 30));
    assert_eq!(
        conflict(s.engine.reschedule_appointment(appt.id, grow).await),
        Conflict::DoubleBooking(other.id)
    );

    let grow = s.request(s.alice, &[s.cut, s.manicure], at(9, 0));
    let updated = s.engine.reschedule_appointment(appt.id, grow).await.unwrap();
    assert_eq!(updated.total_duration, 60);
    assert_eq!(updated.subtotal, 8000);
}

#[tokio::test]
async fn reschedule_to_another_employee() {
    let s = Salon::new();
    let appt = s.book(&[s.cut], at(10, 0)).await.unwrap();
    let mut rx_alice = s.engine.notify.subscribe(s.alice);
    let mut rx_bob = s.engine.notify.subscribe(s.bob);

    let moved = s
        .engine
        .reschedule_appointment(appt.id, s.request(s.bob, &[s.cut], at(10, 0)))
        .await
        .unwrap();
    assert_eq!(moved.employee_id, s.bob);

    for rx in [&mut rx_alice, &mut rx_bob] {
        match rx.recv().await.unwrap() {
            Event::AppointmentRescheduled {
                id,
                employee_id,
                previous_employee_id,
                ..
            } => {
                assert_eq!(id, appt.id);
                assert_eq!(employee_id, s.bob);
                assert_eq!(previous_employee_id, s.alice);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    // Alice's 10:00 is free again
    assert!(s.book(&[s.cut], at(10, 0)).await.is_ok());
}

#[tokio::test]
async fn terminal_appointments_cannot_be_rescheduled() {
    let s = Salon::new();
    let appt = s.book(&[s.cut], at(10, 0)).await.unwrap();
    s.engine.cancel_appointment(appt.id).await.unwrap();
    assert!(matches!(
        s.engine
            .reschedule_appointment(appt.id, s.request(s.alice, &[s.cut], at(11, 0)))
            .await,
        Err(EngineError::TerminalState { .. })
    ));
}

// ── Blocks ───────────────────────────────────────────────

#[tokio::test]
async fn block_leaves_existing_appointments_alone() {
    let s = Salon::new();
    let appt = s.book(&[s.cut], at(12, 0)).await.unwrap();
    let block = Block::new(Ulid::new(), s.alice, at(12, 0), at(13, 0)).unwrap();
    s.engine.create_block(block).await.unwrap();

    let still = s.engine.get_appointment(appt.id).await.unwrap();
    assert_eq!(still.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn delete_block_is_idempotent() {
    let s = Salon::new();
    let block = Block::new(Ulid::new(), s.alice, at(12, 0), at(13, 0)).unwrap();
    s.engine.create_block(block.clone()).await.unwrap();
    let day = Span::day(monday());
    assert_eq!(s.engine.list_blocks(s.alice, day).await.unwrap(), vec![block.clone()]);

    assert!(s.engine.delete_block(block.id).await.unwrap());
    assert!(!s.engine.delete_block(block.id).await.unwrap());
    assert!(s.engine.list_blocks(s.alice, day).await.unwrap().is_empty());
    assert!(s.book(&[s.cut], at(12, 0)).await.is_ok());
}

#[tokio::test]
async fn overlapping_blocks_act_as_union() {
    let s = Salon::new();
    for (from, to) in [(at(12, 0), at(13, 0)), (at(12, 30), at(14, 0))] {
        let block = Block::new(Ulid::new(), s.alice, from, to).unwrap();
        s.engine.create_block(block).await.unwrap();
    }
    let starts = s.engine.bookable_starts(s.alice, &[s.cut], monday()).await.unwrap();
    assert!(starts.iter().all(|t| *t < at(12, 0) || *t >= at(14, 0)));
    assert_eq!(starts.len(), 14);
}

#[tokio::test]
async fn vacation_spanning_days_blocks_each_day() {
    let s = Salon::new();
    let vacation = Block::new(
        Ulid::new(),
        s.alice,
        at(0, 0),
        NaiveDate::from_ymd_opt(2030, 1, 12).unwrap().and_hms_opt(0, 0, 0).unwrap(),
    )
    .unwrap();
    s.engine.create_block(vacation).await.unwrap();
    for date in [monday(), tuesday()] {
        assert!(s.engine.bookable_starts(s.alice, &[s.cut], date).await.unwrap().is_empty());
    }
}

// ── Policies ─────────────────────────────────────────────

#[tokio::test]
async fn policies_are_level_checked() {
    let s = Salon::new();
    let wrong = weekdays(HierarchyLevel::Category, 9, 18);
    assert!(matches!(
        s.engine.replace_employee_policy(s.alice, Some(wrong)).await,
        Err(EngineError::WrongLevel {
            expected: HierarchyLevel::Employee,
            found: HierarchyLevel::Category
        })
    ));
    assert!(matches!(
        s.engine
            .replace_company_schedule(CompanySchedule {
                service_interval: 0,
                policy: weekdays(HierarchyLevel::Company, 9, 18),
            })
            .await,
        Err(EngineError::InvalidInterval(0))
    ));
    let unknown_category = Ulid::new();
    assert!(matches!(
        s.engine
            .replace_category_policy(s.alice, unknown_category, None)
            .await,
        Err(EngineError::NotFound(id)) if id == unknown_category
    ));
}

#[tokio::test]
async fn policy_hours_outside_parents_are_reported_not_rejected() {
    let s = Salon::new();
    let long_days = WorkingHoursPolicy::new(HierarchyLevel::Employee, [slot(MON, 8, 19)]).unwrap();
    let gaps = s.engine.replace_employee_policy(s.alice, Some(long_days)).await.unwrap();
    assert_eq!(gaps, vec![slot(MON, 8, 9), slot(MON, 18, 19)]);

    // Display shows the configured hours, booking is clipped to the company
    assert_eq!(
        s.engine.effective_window(s.alice, None, monday()).await.unwrap(),
        Some(slot(MON, 8, 19))
    );
    assert_eq!(
        s.engine.legal_window(s.alice, &[], monday()).await.unwrap(),
        Some(slot(MON, 9, 18))
    );

    let evening = WorkingHoursPolicy::new(HierarchyLevel::Category, [slot(MON, 17, 20)]).unwrap();
    let gaps = s
        .engine
        .replace_category_policy(s.alice, s.hair, Some(evening))
        .await
        .unwrap();
    assert_eq!(gaps, vec![slot(MON, 18, 20)]);
}

#[tokio::test]
async fn clearing_override_restores_inheritance() {
    let s = Salon::new();
    let short = WorkingHoursPolicy::new(HierarchyLevel::Employee, [slot(MON, 10, 11)]).unwrap();
    s.engine.replace_employee_policy(s.alice, Some(short)).await.unwrap();
    assert_eq!(
        s.engine.bookable_starts(s.alice, &[s.color], tuesday()).await.unwrap().len(),
        0
    );
    s.engine.replace_employee_policy(s.alice, None).await.unwrap();
    assert_eq!(
        s.engine.bookable_starts(s.alice, &[s.color], tuesday()).await.unwrap().len(),
        17
    );
}

#[tokio::test]
async fn company_change_is_seen_by_the_next_query() {
    let s = Salon::new();
    let mut rx = s.engine.notify.subscribe(s.alice);
    let shorter = CompanySchedule {
        service_interval: 30,
        policy: WorkingHoursPolicy::new(HierarchyLevel::Company, [slot(MON, 9, 12), slot(TUE, 9, 12)]).unwrap(),
    };
    s.engine.replace_company_schedule(shorter).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), Event::PoliciesChanged { employee_id: None });

    let starts = s.engine.bookable_starts(s.alice, &[s.color], monday()).await.unwrap();
    assert_eq!(starts.last(), Some(&at(11, 0)));
}

// ── Queries ──────────────────────────────────────────────

#[tokio::test]
async fn free_spans_show_gaps_between_bookings() {
    let s = Salon::new();
    s.book(&[s.color], at(10, 0)).await.unwrap();
    let block = Block::new(Ulid::new(), s.alice, at(12, 0), at(13, 0)).unwrap();
    s.engine.create_block(block).await.unwrap();

    let free = s.engine.free_spans(s.alice, monday(), None).await.unwrap();
    assert_eq!(
        free,
        vec![
            Span::new(at(9, 0), at(10, 0)),
            Span::new(at(11, 0), at(12, 0)),
            Span::new(at(13, 0), at(18, 0)),
        ]
    );
    let long = s.engine.free_spans(s.alice, monday(), Some(120)).await.unwrap();
    assert_eq!(long, vec![Span::new(at(13, 0), at(18, 0))]);
}

#[tokio::test]
async fn listings_and_client_history() {
    let s = Salon::new();
    let client = Ulid::new();
    let mut first = s.request(s.alice, &[s.cut], at(10, 0));
    first.client_id = client;
    let mut second = s.request(s.bob, &[s.cut], tuesday().and_hms_opt(9, 0, 0).unwrap());
    second.client_id = client;
    let a = s.engine.create_appointment(Ulid::new(), first).await.unwrap();
    let b = s.engine.create_appointment(Ulid::new(), second).await.unwrap();
    s.engine.cancel_appointment(a.id).await.unwrap();

    let history = s.engine.client_history(client).await.unwrap();
    assert_eq!(history.iter().map(|x| x.id).collect::<Vec<_>>(), vec![a.id, b.id]);

    // Listings include terminal appointments
    let listed = s.engine.list_appointments(s.alice, Span::day(monday())).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, AppointmentStatus::Canceled);

    let year = Span::new(at(0, 0), at(0, 0) + chrono::Duration::days(400));
    assert!(matches!(
        s.engine.list_appointments(s.alice, year).await,
        Err(EngineError::LimitExceeded(_))
    ));
}

#[tokio::test]
async fn notifications_follow_the_lifecycle() {
    let s = Salon::new();
    let mut rx = s.engine.notify.subscribe(s.alice);
    let appt = s.book(&[s.cut], at(10, 0)).await.unwrap();
    s.engine.confirm_appointment(appt.id).await.unwrap();

    assert_eq!(
        rx.recv().await.unwrap(),
        Event::AppointmentCreated {
            id: appt.id,
            employee_id: s.alice,
            span: Span::new(at(10, 0), at(10, 30)),
        }
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        Event::AppointmentStatusChanged {
            id: appt.id,
            employee_id: s.alice,
            from: AppointmentStatus::Pending,
            to: AppointmentStatus::Confirmed,
        }
    );

    // Rejected proposals publish nothing
    assert!(s.book(&[s.cut], at(10, 0)).await.is_err());
    assert!(rx.try_recv().is_err());
}
