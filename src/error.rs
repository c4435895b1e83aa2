use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use itertools::Itertools;

use crate::data::ErrorBody;
use crate::validation::ValidationError;

pub const NO_FEASIBLE_SOLUTION: &str = "No feasible solution found.";

/// Every way a timetable request can fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// The request body was malformed or describes an inconsistent problem.
    InvalidInput(Vec<ValidationError>),
    /// The problem is infeasible, or the engine gave up before proving anything.
    NoFeasibleSolution,
}

impl SolveError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SolveError::InvalidInput(vec![ValidationError::malformed(message)])
    }
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::InvalidInput(errors) => {
                write!(f, "Invalid input: {}", errors.iter().join("; "))
            }
            SolveError::NoFeasibleSolution => f.write_str(NO_FEASIBLE_SOLUTION),
        }
    }
}

impl std::error::Error for SolveError {}

impl IntoResponse for SolveError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}
