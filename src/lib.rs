//! Timetable generation as a binary feasibility model solved with HiGHS.
//!
//! A request lists classes, ordered slots, staff, the subjects each staff
//! member teaches and the break slots. [`solver::solve`] returns one
//! lesson per class and teaching slot with no staff member double-booked
//! and no lesson repeated in adjacent slots.

pub mod config;
pub mod data;
pub mod error;
pub mod server;
pub mod solver;
pub mod validation;
