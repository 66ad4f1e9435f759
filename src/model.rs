use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Minutes since local midnight. `1440` is only valid as an end bound.
pub type MinuteOfDay = u16;

pub const MINUTES_PER_DAY: MinuteOfDay = 1440;

/// Money in minor units (cents).
pub type Money = i64;

pub type EmployeeId = Ulid;
pub type CategoryId = Ulid;
pub type ServiceId = Ulid;
pub type ClientId = Ulid;
pub type AppointmentId = Ulid;
pub type BlockId = Ulid;

/// Day of week with `0 = Sunday`.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Wall-clock instant `minute` minutes after midnight on `date`.
pub fn at_minute(date: NaiveDate, minute: MinuteOfDay) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(minute))
}

/// Half-open interval `[start, end)` in business-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Span {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for caller-supplied ranges.
    pub fn checked(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidRange(format!("[{start}, {end})")));
        }
        Ok(Self { start, end })
    }

    pub fn starting_at(start: NaiveDateTime, minutes: u32) -> Self {
        Self::new(start, start + Duration::minutes(i64::from(minutes)))
    }

    /// The whole calendar day `[00:00, next 00:00)`.
    pub fn day(date: NaiveDate) -> Self {
        Self::new(at_minute(date, 0), at_minute(date, MINUTES_PER_DAY))
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Working hours ────────────────────────────────────────────────

/// Opening hours for one weekday at one hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWeekdaySlot")]
pub struct WeekdaySlot {
    day_of_week: u8,
    start: MinuteOfDay,
    end: MinuteOfDay,
}

#[derive(Deserialize)]
struct RawWeekdaySlot {
    day_of_week: u8,
    start: MinuteOfDay,
    end: MinuteOfDay,
}

impl TryFrom<RawWeekdaySlot> for WeekdaySlot {
    type Error = EngineError;

    fn try_from(raw: RawWeekdaySlot) -> Result<Self, Self::Error> {
        WeekdaySlot::new(raw.day_of_week, raw.start, raw.end)
    }
}

impl WeekdaySlot {
    pub fn new(day_of_week: u8, start: MinuteOfDay, end: MinuteOfDay) -> Result<Self, EngineError> {
        if day_of_week > 6 {
            return Err(EngineError::InvalidWeekday(day_of_week));
        }
        if start >= end || end > MINUTES_PER_DAY {
            return Err(EngineError::InvalidRange(format!(
                "weekday {day_of_week} [{start}, {end}) minutes"
            )));
        }
        Ok(Self {
            day_of_week,
            start,
            end,
        })
    }

    pub fn day_of_week(&self) -> u8 {
        self.day_of_week
    }

    pub fn start(&self) -> MinuteOfDay {
        self.start
    }

    pub fn end(&self) -> MinuteOfDay {
        self.end
    }

    pub fn duration_minutes(&self) -> u32 {
        u32::from(self.end - self.start)
    }

    /// Overlap of two slots on the same weekday.
    pub fn intersect(&self, other: &WeekdaySlot) -> Option<WeekdaySlot> {
        if self.day_of_week != other.day_of_week {
            return None;
        }
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(WeekdaySlot {
            day_of_week: self.day_of_week,
            start,
            end,
        })
    }

    pub fn contains(&self, other: &WeekdaySlot) -> bool {
        self.day_of_week == other.day_of_week && self.start <= other.start && other.end <= self.end
    }

    /// Concrete span of this slot on `date`.
    pub fn on(&self, date: NaiveDate) -> Span {
        Span::new(at_minute(date, self.start), at_minute(date, self.end))
    }
}

impl fmt::Display for WeekdaySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "day {} {:02}:{:02}-{:02}:{:02}",
            self.day_of_week,
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyLevel {
    Company,
    Employee,
    Category,
}

/// Weekly schedule at one hierarchy level. A weekday without a slot is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy", into = "RawPolicy")]
pub struct WorkingHoursPolicy {
    level: HierarchyLevel,
    slots: BTreeMap<u8, WeekdaySlot>,
}

#[derive(Clone, Serialize, Deserialize)]
struct RawPolicy {
    level: HierarchyLevel,
    #[serde(default)]
    slots: Vec<WeekdaySlot>,
}

impl TryFrom<RawPolicy> for WorkingHoursPolicy {
    type Error = EngineError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        WorkingHoursPolicy::new(raw.level, raw.slots)
    }
}

impl From<WorkingHoursPolicy> for RawPolicy {
    fn from(policy: WorkingHoursPolicy) -> Self {
        RawPolicy {
            level: policy.level,
            slots: policy.slots.into_values().collect(),
        }
    }
}

impl WorkingHoursPolicy {
    /// At most one slot per weekday.
    pub fn new(
        level: HierarchyLevel,
        slots: impl IntoIterator<Item = WeekdaySlot>,
    ) -> Result<Self, EngineError> {
        let mut by_day = BTreeMap::new();
        for slot in slots {
            if by_day.insert(slot.day_of_week, slot).is_some() {
                return Err(EngineError::DuplicateWeekday(slot.day_of_week));
            }
        }
        Ok(Self {
            level,
            slots: by_day,
        })
    }

    /// A policy that is closed every day.
    pub fn closed(level: HierarchyLevel) -> Self {
        Self {
            level,
            slots: BTreeMap::new(),
        }
    }

    pub fn level(&self) -> HierarchyLevel {
        self.level
    }

    pub fn slot_for(&self, day_of_week: u8) -> Option<WeekdaySlot> {
        self.slots.get(&day_of_week).copied()
    }

    pub fn slots(&self) -> impl Iterator<Item = &WeekdaySlot> {
        self.slots.values()
    }
}

/// Company-wide hours plus the step between bookable start times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySchedule {
    /// Minutes between candidate start times.
    pub service_interval: u32,
    pub policy: WorkingHoursPolicy,
}

// ── Catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    /// Overrides the company service interval when set.
    #[serde(default)]
    pub service_interval: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub category_id: CategoryId,
    pub name: String,
    /// Minutes, always > 0.
    pub duration: u32,
    pub price: Money,
}

impl Service {
    pub fn new(
        id: ServiceId,
        category_id: CategoryId,
        name: impl Into<String>,
        duration: u32,
        price: Money,
    ) -> Result<Self, EngineError> {
        if duration == 0 {
            return Err(EngineError::InvalidDuration);
        }
        Ok(Self {
            id,
            category_id,
            name: name.into(),
            duration,
            price,
        })
    }
}

// ── Blocks & appointments ────────────────────────────────────────

/// Manually created period during which an employee takes no bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub employee_id: EmployeeId,
    pub span: Span,
}

impl Block {
    pub fn new(
        id: BlockId,
        employee_id: EmployeeId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            id,
            employee_id,
            span: Span::checked(start, end)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Canceled,
}

impl AppointmentStatus {
    /// Terminal appointments never take part in conflict checks again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Canceled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub employee_id: EmployeeId,
    pub client_id: ClientId,
    /// Service selection as it was at booking time.
    pub services: Vec<ServiceId>,
    pub start: NaiveDateTime,
    /// Sum of the selected services' durations at booking time, in minutes.
    pub total_duration: u32,
    pub subtotal: Money,
    #[serde(default)]
    pub discount: Money,
    pub status: AppointmentStatus,
}

impl Appointment {
    pub fn span(&self) -> Span {
        Span::starting_at(self.start, self.total_duration)
    }

    pub fn end(&self) -> NaiveDateTime {
        self.span().end
    }

    /// Subtotal minus discount, never below zero.
    pub fn total_price(&self) -> Money {
        (self.subtotal - self.discount).max(0)
    }
}

/// Parameters for booking (or re-booking) an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub employee_id: EmployeeId,
    pub client_id: ClientId,
    pub services: Vec<ServiceId>,
    pub start: NaiveDateTime,
    #[serde(default)]
    pub discount: Money,
}

/// Change notifications, published per employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    AppointmentCreated {
        id: AppointmentId,
        employee_id: EmployeeId,
        span: Span,
    },
    AppointmentRescheduled {
        id: AppointmentId,
        employee_id: EmployeeId,
        previous_employee_id: EmployeeId,
        span: Span,
    },
    AppointmentStatusChanged {
        id: AppointmentId,
        employee_id: EmployeeId,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    BlockCreated {
        id: BlockId,
        employee_id: EmployeeId,
        span: Span,
    },
    BlockDeleted {
        id: BlockId,
        employee_id: EmployeeId,
    },
    /// Working hours changed; `None` means the company level.
    PoliciesChanged {
        employee_id: Option<EmployeeId>,
    },
}
