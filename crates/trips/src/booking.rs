//! Human-readable booking identifiers, `PREFIX-YY-MM-SEQ`.
//!
//! The sequence segment is a 4-digit, zero-padded counter scoped to one
//! calendar month via the `YY-MM` segment. The next sequence is re-derived on
//! every call from the union of known entry ids and queued-but-unsent ids,
//! because both submission and drain can change the maximum.

use chrono::{Datelike, NaiveDate};

/// Default booking prefix.
pub const BOOKING_PREFIX: &str = "TRP";

/// Compose a booking id for the given month and sequence.
pub fn compose_booking_id(prefix: &str, date: NaiveDate, sequence: u32) -> String {
    format!(
        "{}-{:02}-{:02}-{:04}",
        prefix,
        date.year() % 100,
        date.month(),
        sequence
    )
}

/// Parse the sequence out of a booking id, scoped to the given month.
///
/// Total: a malformed id, or an id belonging to a different month, parses to
/// 0 and therefore never contributes a collision.
pub fn parse_sequence(prefix: &str, date: NaiveDate, booking_id: &str) -> u32 {
    let month_prefix = format!("{}-{:02}-{:02}-", prefix, date.year() % 100, date.month());
    let Some(suffix) = booking_id.strip_prefix(&month_prefix) else {
        return 0;
    };
    if suffix.len() != 4 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    suffix.parse().unwrap_or(0)
}

/// Compute the next booking id for `date` from every id already known
/// (persisted entries) and every id still waiting in the offline queue.
///
/// Next sequence is `max(parsed sequences) + 1`, or 1 when no id of the
/// current month exists in either source. Never fails.
pub fn next_booking_id<'a, I, Q>(prefix: &str, date: NaiveDate, known: I, queued: Q) -> String
where
    I: IntoIterator<Item = &'a str>,
    Q: IntoIterator<Item = &'a str>,
{
    let max_seq = known
        .into_iter()
        .chain(queued)
        .map(|id| parse_sequence(prefix, date, id))
        .max()
        .unwrap_or(0);
    compose_booking_id(prefix, date, max_seq + 1)
}
