//! Risk error types.

use crate::constraints::ConstraintViolation;
use perpline_core::CoreError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Formula input errors. Always a validation failure, never a crash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("Division by zero: {0} must be non-zero")]
    DivisionByZero(&'static str),

    #[error("Leverage must be positive, got {0}")]
    InvalidLeverage(Decimal),

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),
}

pub type FormulaResult<T> = Result<T, FormulaError>;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Trade cooldown active: {remaining_ms}ms remaining")]
    Cooldown { remaining_ms: u64 },

    #[error("Order violates market constraints: {}", join_violations(.0))]
    Constraints(Vec<ConstraintViolation>),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid position record: {0}")]
    InvalidPosition(String),

    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error(transparent)]
    Amount(#[from] CoreError),
}

impl RiskError {
    /// Human-readable messages, one per problem.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Constraints(violations) => violations.iter().map(ToString::to_string).collect(),
            other => vec![other.to_string()],
        }
    }
}

fn join_violations(violations: &[ConstraintViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type RiskResult<T> = Result<T, RiskError>;
