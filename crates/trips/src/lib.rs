//! Trips domain module.
//!
//! This crate contains the business rules of the trip-report workflow,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage): the inspection checklist and its status classifier, the
//! month-scoped booking-id generator, and the trip entry with its explicit
//! sync-status state machine.

pub mod booking;
pub mod checklist;
pub mod report;

pub use booking::{BOOKING_PREFIX, compose_booking_id, next_booking_id, parse_sequence};
pub use checklist::{ChecklistRating, TripChecklist, TripStatus};
pub use report::{
    SyncSource, SyncStatus, TripAttachment, TripEntry, TripFormSnapshot, TripReportInput,
};
