use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// Opaque identifiers, compared by value only
pub type ClassId = String;
pub type SlotId = String;
pub type StaffId = String;
pub type SubjectId = String;

/// The complete input for the timetabling problem.
///
/// `slots` is order-significant: two slots are consecutive when they are
/// next to each other in this list.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TimetableRequest {
    pub classes: Vec<ClassId>,
    pub slots: Vec<SlotId>,
    pub staff: Vec<StaffId>,
    pub staff_subjects: HashMap<StaffId, Vec<SubjectId>>,
    #[serde(default)]
    pub break_periods: Vec<SlotId>,
    /// Overrides the configured shuffle seed for this request only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// A single realised (class, staff, subject, slot) assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "PascalCase")]
pub struct ScheduleEntry {
    pub class: ClassId,
    pub staff: StaffId,
    pub subject: SubjectId,
    pub slot: SlotId,
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {}: {} ({})",
            self.class, self.slot, self.subject, self.staff
        )
    }
}

/// Body returned to the caller whenever a timetable cannot be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
