//! Search and filter operators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Operators a user may choose for a search value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// Equality; a whole day for dates.
    #[default]
    Equals,
    /// Case-insensitive substring match.
    Like,
    /// Membership in a list.
    In,
    /// Non-membership in a list.
    NotIn,
    /// Inclusive range of two values.
    Between,
    /// Strictly greater.
    GreaterThan,
    /// Strictly less.
    LessThan,
    /// Any non-null value.
    NotNull,
}

impl Operator {
    /// All user operators, in display order.
    pub const ALL: [Operator; 8] = [
        Operator::Equals,
        Operator::Like,
        Operator::In,
        Operator::NotIn,
        Operator::Between,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::NotNull,
    ];

    /// Canonical upper-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Equals => "EQUALS",
            Operator::Like => "LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::Between => "BETWEEN",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::LessThan => "LESS_THAN",
            Operator::NotNull => "NOT_NULL",
        }
    }

    /// Returns true for operators taking a list of values.
    pub fn is_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.name() == normalized)
            .ok_or_else(|| ConfigurationError::UnknownOperator(s.to_string()))
    }
}

/// Operators available to immutable term filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    /// Equality.
    Equals,
    /// Inequality.
    NotEquals,
    /// Strictly greater.
    GreaterThan,
    /// Greater or equal.
    GreaterThanEqual,
    /// Strictly less.
    LessThan,
    /// Less or equal.
    LessThanEqual,
    /// Inclusive range.
    Between,
    /// Membership.
    In,
    /// Non-membership.
    NotIn,
    /// Case-insensitive substring.
    Like,
    /// Not null.
    NotNull,
}

impl FilterOperator {
    const ALL: [FilterOperator; 11] = [
        FilterOperator::Equals,
        FilterOperator::NotEquals,
        FilterOperator::GreaterThan,
        FilterOperator::GreaterThanEqual,
        FilterOperator::LessThan,
        FilterOperator::LessThanEqual,
        FilterOperator::Between,
        FilterOperator::In,
        FilterOperator::NotIn,
        FilterOperator::Like,
        FilterOperator::NotNull,
    ];

    /// Canonical upper-case name.
    pub fn name(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "EQUALS",
            FilterOperator::NotEquals => "NOT_EQUALS",
            FilterOperator::GreaterThan => "GREATER_THAN",
            FilterOperator::GreaterThanEqual => "GREATER_THAN_EQUAL",
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::LessThanEqual => "LESS_THAN_EQUAL",
            FilterOperator::Between => "BETWEEN",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT_IN",
            FilterOperator::Like => "LIKE",
            FilterOperator::NotNull => "NOT_NULL",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterOperator {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        FilterOperator::ALL
            .iter()
            .copied()
            .find(|op| op.name() == normalized)
            .ok_or_else(|| ConfigurationError::UnknownOperator(s.to_string()))
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_uppercase().replace([' ', '-'], "_")
}
