//! Structural checks on timetable requests and on produced schedules.
//!
//! [`validate_request`] rejects malformed problems before any model is
//! built. [`check_schedule`] re-derives every hard rule from a finished
//! schedule; the solver runs it on its own output and the tests use it as
//! their oracle.

use std::collections::HashSet;
use std::fmt;

use itertools::Itertools;

use crate::data::{ScheduleEntry, TimetableRequest};

/// A problem found in the request itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// The body could not be decoded at all.
    Malformed,
    /// An identifier appears twice in `classes`, `slots` or `staff`.
    DuplicateId,
    /// An identifier is empty or whitespace only.
    BlankId,
    /// A staff member has no entry in `staff_subjects`.
    MissingStaffSubjects,
    /// A staff member lists the same subject twice.
    DuplicateSubject,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::Malformed, message)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Validates the request, collecting every problem rather than stopping at the first.
///
/// Break periods that are not slots are tolerated, as are blank subjects and
/// `staff_subjects` entries for people not listed in `staff`; all of them are
/// simply never used.
pub fn validate_request(request: &TimetableRequest) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_ids("class", &request.classes, &mut errors);
    check_ids("slot", &request.slots, &mut errors);
    check_ids("staff member", &request.staff, &mut errors);

    for staff in request.staff.iter().unique() {
        match request.staff_subjects.get(staff) {
            None => errors.push(ValidationError::new(
                ValidationErrorKind::MissingStaffSubjects,
                format!("No subject list given for staff member {staff}"),
            )),
            Some(subjects) => {
                let named = subjects.iter().filter(|s| !s.trim().is_empty());
                for subject in named.duplicates() {
                    errors.push(ValidationError::new(
                        ValidationErrorKind::DuplicateSubject,
                        format!("Staff member {staff} lists subject {subject} more than once"),
                    ));
                }
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_ids(label: &str, ids: &[String], errors: &mut Vec<ValidationError>) {
    for id in ids.iter().duplicates() {
        errors.push(ValidationError::new(
            ValidationErrorKind::DuplicateId,
            format!("Duplicate {label}: {id}"),
        ));
    }
    if ids.iter().any(|id| id.trim().is_empty()) {
        errors.push(ValidationError::new(
            ValidationErrorKind::BlankId,
            format!("Blank {label} identifier"),
        ));
    }
}

/// A hard rule broken by a finished schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleViolation {
    /// The entry names a class, staff member or slot the request never mentioned.
    UnknownEntity(ScheduleEntry),
    /// Something was scheduled during a break.
    BreakSlotUsed(ScheduleEntry),
    /// The staff member is not qualified for the subject.
    IneligibleSubject(ScheduleEntry),
    /// A class has zero or several lessons in a teaching slot.
    Coverage {
        class: String,
        slot: String,
        count: usize,
    },
    /// A staff member teaches more than once in the same slot.
    StaffDoubleBooked {
        staff: String,
        slot: String,
        count: usize,
    },
    /// The same class/staff/subject lesson fills two consecutive slots.
    ConsecutiveRepeat {
        class: String,
        staff: String,
        subject: String,
        first: String,
        second: String,
    },
}

impl fmt::Display for ScheduleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleViolation::UnknownEntity(e) => write!(f, "Unknown entity in entry {e}"),
            ScheduleViolation::BreakSlotUsed(e) => write!(f, "Entry {e} falls in a break"),
            ScheduleViolation::IneligibleSubject(e) => {
                write!(f, "{} does not teach {}", e.staff, e.subject)
            }
            ScheduleViolation::Coverage { class, slot, count } => {
                write!(f, "Class {class} has {count} lessons in slot {slot}")
            }
            ScheduleViolation::StaffDoubleBooked { staff, slot, count } => {
                write!(f, "Staff member {staff} teaches {count} lessons in slot {slot}")
            }
            ScheduleViolation::ConsecutiveRepeat {
                class,
                staff,
                subject,
                first,
                second,
            } => write!(
                f,
                "{staff} teaches {subject} to {class} in consecutive slots {first} and {second}"
            ),
        }
    }
}

/// Checks a schedule against every hard rule of the request it answers.
///
/// Returns an empty list when the schedule is valid.
pub fn check_schedule(
    request: &TimetableRequest,
    entries: &[ScheduleEntry],
) -> Vec<ScheduleViolation> {
    let mut violations = Vec::new();

    let classes: HashSet<&str> = request.classes.iter().map(String::as_str).collect();
    let staff: HashSet<&str> = request.staff.iter().map(String::as_str).collect();
    let slots: HashSet<&str> = request.slots.iter().map(String::as_str).collect();
    let breaks: HashSet<&str> = request.break_periods.iter().map(String::as_str).collect();

    for entry in entries {
        if !classes.contains(entry.class.as_str())
            || !staff.contains(entry.staff.as_str())
            || !slots.contains(entry.slot.as_str())
        {
            violations.push(ScheduleViolation::UnknownEntity(entry.clone()));
        }
        if breaks.contains(entry.slot.as_str()) {
            violations.push(ScheduleViolation::BreakSlotUsed(entry.clone()));
        }
        let eligible = request
            .staff_subjects
            .get(&entry.staff)
            .is_some_and(|subjects| subjects.contains(&entry.subject));
        if !eligible {
            violations.push(ScheduleViolation::IneligibleSubject(entry.clone()));
        }
    }

    let per_class_slot = entries
        .iter()
        .map(|e| (e.class.as_str(), e.slot.as_str()))
        .counts();
    let teaching_slots: Vec<&str> = request
        .slots
        .iter()
        .map(String::as_str)
        .filter(|s| !breaks.contains(s))
        .collect();
    for class in request.classes.iter().map(String::as_str) {
        for &slot in &teaching_slots {
            let count = per_class_slot.get(&(class, slot)).copied().unwrap_or(0);
            if count != 1 {
                violations.push(ScheduleViolation::Coverage {
                    class: class.to_string(),
                    slot: slot.to_string(),
                    count,
                });
            }
        }
    }

    let per_staff_slot = entries
        .iter()
        .map(|e| (e.staff.as_str(), e.slot.as_str()))
        .counts();
    for ((staff, slot), count) in per_staff_slot.into_iter().sorted() {
        if count > 1 {
            violations.push(ScheduleViolation::StaffDoubleBooked {
                staff: staff.to_string(),
                slot: slot.to_string(),
                count,
            });
        }
    }

    let lessons: HashSet<(&str, &str, &str, &str)> = entries
        .iter()
        .map(|e| {
            (
                e.class.as_str(),
                e.staff.as_str(),
                e.subject.as_str(),
                e.slot.as_str(),
            )
        })
        .collect();
    for (first, second) in request.slots.iter().tuple_windows() {
        if breaks.contains(first.as_str()) || breaks.contains(second.as_str()) {
            continue;
        }
        for &(class, staff, subject, slot) in &lessons {
            if slot == first && lessons.contains(&(class, staff, subject, second.as_str())) {
                violations.push(ScheduleViolation::ConsecutiveRepeat {
                    class: class.to_string(),
                    staff: staff.to_string(),
                    subject: subject.to_string(),
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }
    }

    violations
}
