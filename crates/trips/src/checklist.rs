//! Vehicle inspection checklist and the approved/warning classifier.

use serde::{Deserialize, Serialize};

/// Rating of a single inspected aspect of a trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistRating {
    Bad,
    #[default]
    Normal,
    Good,
}

/// The six independent inspection ratings of one trip.
///
/// Invariant: always fully populated. Every field carries a serde default so
/// a partially-populated payload (e.g. an older remote row) deserializes with
/// the missing keys filled in rather than failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TripChecklist {
    pub external_clean: ChecklistRating,
    pub internal_clean: ChecklistRating,
    pub car_smell: ChecklistRating,
    pub driver_appearance: ChecklistRating,
    pub ac_status: ChecklistRating,
    pub engine_status: ChecklistRating,
}

impl TripChecklist {
    pub fn all_good() -> Self {
        Self {
            external_clean: ChecklistRating::Good,
            internal_clean: ChecklistRating::Good,
            car_smell: ChecklistRating::Good,
            driver_appearance: ChecklistRating::Good,
            ac_status: ChecklistRating::Good,
            engine_status: ChecklistRating::Good,
        }
    }

    pub fn is_all_good(&self) -> bool {
        self.ratings()
            .iter()
            .all(|r| *r == ChecklistRating::Good)
    }

    pub fn ratings(&self) -> [ChecklistRating; 6] {
        [
            self.external_clean,
            self.internal_clean,
            self.car_smell,
            self.driver_appearance,
            self.ac_status,
            self.engine_status,
        ]
    }
}

/// Outcome of a trip inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Approved,
    Warning,
}

impl TripStatus {
    /// Classify a trip from its checklist and supervisor rating.
    ///
    /// `Approved` iff every checklist rating is `good` AND the supervisor
    /// rating is at least 3, otherwise `Warning`. Computed once at submission
    /// time; never recomputed retroactively.
    pub fn classify(checklist: &TripChecklist, supervisor_rating: u8) -> Self {
        if checklist.is_all_good() && supervisor_rating >= 3 {
            TripStatus::Approved
        } else {
            TripStatus::Warning
        }
    }
}
