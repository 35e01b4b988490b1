//! Input validation for scheduling requests.
//!
//! Checks structural integrity of trains against the loaded network
//! before any solving starts. Detects:
//! - Duplicate train IDs
//! - Empty routes
//! - Route elements missing from the network
//! - Current delays outside the accepted range
//!
//! Element-level checks (duplicate element ids, zero capacity) happen when
//! the [`Network`] is built.

use std::collections::HashSet;

use crate::error::Error;
use crate::models::{Network, Train};
use crate::predictor::CURRENT_DELAY_RANGE;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Train the error refers to.
    pub train_id: String,
    /// Offending element id, for route errors.
    pub element_id: Option<String>,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two trains share the same ID.
    DuplicateId,
    /// A train has no route elements.
    EmptyRoute,
    /// A route references an element that doesn't exist.
    UnknownElement,
    /// Current delay outside [`CURRENT_DELAY_RANGE`].
    DelayOutOfRange,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, train_id: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            train_id: train_id.to_string(),
            element_id: None,
            message: message.into(),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        match (err.kind, err.element_id) {
            (ValidationErrorKind::UnknownElement, Some(element_id)) => Error::InvalidRoute {
                train_id: err.train_id,
                element_id,
            },
            _ => Error::InvalidInput(err.message),
        }
    }
}

/// Validates the trains of a scheduling request.
///
/// Checks:
/// 1. No duplicate train IDs
/// 2. Every route has at least one element
/// 3. Every route element exists in the network
/// 4. Every current delay lies in [`CURRENT_DELAY_RANGE`]
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_input(trains: &[Train], network: &Network) -> ValidationResult {
    let mut errors = Vec::new();
    let mut train_ids = HashSet::new();

    for train in trains {
        if !train_ids.insert(train.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                &train.id,
                format!("Duplicate train ID: {}", train.id),
            ));
        }

        if train.route.is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::EmptyRoute,
                &train.id,
                format!("Train '{}' has an empty route", train.id),
            ));
        }

        let delay = train.current_delay_min as f64;
        if delay < CURRENT_DELAY_RANGE.0 || delay > CURRENT_DELAY_RANGE.1 {
            errors.push(ValidationError::new(
                ValidationErrorKind::DelayOutOfRange,
                &train.id,
                format!(
                    "Train '{}' current delay {} min outside [{}, {}]",
                    train.id, train.current_delay_min, CURRENT_DELAY_RANGE.0, CURRENT_DELAY_RANGE.1
                ),
            ));
        }

        for element_id in &train.route {
            if network.index_of(element_id).is_none() {
                let mut err = ValidationError::new(
                    ValidationErrorKind::UnknownElement,
                    &train.id,
                    format!(
                        "Train '{}' references unknown element '{}'",
                        train.id, element_id
                    ),
                );
                err.element_id = Some(element_id.clone());
                errors.push(err);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validates and converts the first error into a crate [`Error`].
///
/// Route errors win over other kinds so callers always learn the
/// offending element id first.
pub fn ensure_valid(trains: &[Train], network: &Network) -> Result<(), Error> {
    validate_input(trains, network).map_err(|errors| {
        let first = errors
            .iter()
            .position(|e| e.kind == ValidationErrorKind::UnknownElement)
            .unwrap_or(0);
        errors
            .into_iter()
            .nth(first)
            .map(Error::from)
            .unwrap_or_else(|| Error::InvalidInput("validation failed".into()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NetworkElement;

    fn sample_network() -> Network {
        Network::new(vec![
            NetworkElement::track("A"),
            NetworkElement::platform("B").with_capacity(2),
            NetworkElement::track("C"),
        ])
        .unwrap()
    }

    fn sample_trains() -> Vec<Train> {
        vec![
            Train::new("EXP-101").with_route(["A", "B", "C"]),
            Train::new("LOC-78").with_route(["A", "B"]),
        ]
    }

    #[test]
    fn test_valid_input() {
        assert!(validate_input(&sample_trains(), &sample_network()).is_ok());
    }

    #[test]
    fn test_duplicate_train_id() {
        let trains = vec![
            Train::new("T1").with_route(["A"]),
            Train::new("T1").with_route(["B"]),
        ];
        let errors = validate_input(&trains, &sample_network()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::DuplicateId));
    }

    #[test]
    fn test_empty_route() {
        let trains = vec![Train::new("T1")];
        let errors = validate_input(&trains, &sample_network()).unwrap_err();
        assert_eq!(errors[0].kind, ValidationErrorKind::EmptyRoute);
    }

    #[test]
    fn test_unknown_element() {
        let trains = vec![Train::new("T1").with_route(["A", "NOWHERE"])];
        let errors = validate_input(&trains, &sample_network()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].element_id.as_deref(), Some("NOWHERE"));
    }

    #[test]
    fn test_multiple_errors() {
        let trains = vec![
            Train::new("empty"),
            Train::new("T1").with_route(["UNKNOWN"]),
        ];
        let errors = validate_input(&trains, &sample_network()).unwrap_err();
        assert!(errors.len() >= 2);
    }

    #[test]
    fn test_ensure_valid_prefers_route_error() {
        let trains = vec![
            Train::new("empty"),
            Train::new("T1").with_route(["A", "X"]),
        ];
        let err = ensure_valid(&trains, &sample_network()).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidRoute {
                train_id: "T1".into(),
                element_id: "X".into()
            }
        );
    }

    #[test]
    fn test_current_delay_bounds() {
        let trains = vec![
            Train::new("T1").with_route(["A"]).with_current_delay(1440),
            Train::new("T2").with_route(["A"]).with_current_delay(-120),
        ];
        assert!(validate_input(&trains, &sample_network()).is_ok());

        let trains = vec![
            Train::new("T1").with_route(["A"]).with_current_delay(i64::MAX - 1),
            Train::new("T2").with_route(["A"]).with_current_delay(i64::MIN),
        ];
        let errors = validate_input(&trains, &sample_network()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| e.kind == ValidationErrorKind::DelayOutOfRange));

        let err = ensure_valid(&trains, &sample_network()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_ensure_valid_other_errors() {
        let trains = vec![Train::new("empty")];
        let err = ensure_valid(&trains, &sample_network()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
