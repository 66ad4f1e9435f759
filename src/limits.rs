/// Services that can be combined in one appointment.
pub const MAX_SERVICES_PER_APPOINTMENT: usize = 16;

/// An appointment must fit inside one day.
pub const MAX_APPOINTMENT_MINUTES: u32 = 24 * 60;

/// Longest single block (vacations included), in days.
pub const MAX_BLOCK_DAYS: i64 = 366;

/// Widest range accepted by listing queries, in days.
pub const MAX_LISTING_WINDOW_DAYS: i64 = 366;

/// Longest name accepted for catalog entries loaded from a snapshot.
pub const MAX_NAME_LEN: usize = 256;
