// src/graph/condition.rs

//! Dependency conditions.
//!
//! A dependency edge always carries a [`Condition`] describing what the
//! dependent is waiting for. Conditions have a *relevance* ranking used when
//! two declarations target the same ultimate dependency (e.g. through
//! forwarding): the more relevant one wins, and the mutually exclusive
//! success/failure pair is rejected as ambiguous.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// What a dependent requires of a dependency before it may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    ServiceStarted,
    ServiceHealthy,
    ServiceCompletedSuccessfully,
    ServiceFailed,
}

impl Condition {
    /// Relevance rank for override decisions.
    ///
    /// Outcome conditions (success/failure) outrank liveness conditions
    /// (started/healthy). Success and failure share a rank; requiring both of
    /// the same ultimate dependency is an ambiguity, not an override.
    pub fn relevance(self) -> u8 {
        match self {
            Condition::ServiceStarted => 1,
            Condition::ServiceHealthy => 2,
            Condition::ServiceCompletedSuccessfully => 3,
            Condition::ServiceFailed => 3,
        }
    }

    /// Whether the two conditions are the mutually exclusive success/failure
    /// pair.
    pub fn conflicts_with(self, other: Condition) -> bool {
        matches!(
            (self, other),
            (
                Condition::ServiceCompletedSuccessfully,
                Condition::ServiceFailed
            ) | (
                Condition::ServiceFailed,
                Condition::ServiceCompletedSuccessfully
            )
        )
    }

    /// The more relevant of two conditions (`self` wins ties).
    pub fn most_relevant(self, other: Condition) -> Condition {
        if other.relevance() > self.relevance() {
            other
        } else {
            self
        }
    }

    /// Whether this condition only requires the dependency to be alive, not
    /// to have produced an outcome.
    pub fn is_liveness(self) -> bool {
        matches!(self, Condition::ServiceStarted | Condition::ServiceHealthy)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Condition::ServiceStarted => "service_started",
            Condition::ServiceHealthy => "service_healthy",
            Condition::ServiceCompletedSuccessfully => "service_completed_successfully",
            Condition::ServiceFailed => "service_failed",
        };
        f.write_str(s)
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "service_started" => Ok(Condition::ServiceStarted),
            "service_healthy" => Ok(Condition::ServiceHealthy),
            "service_completed_successfully" => Ok(Condition::ServiceCompletedSuccessfully),
            "service_failed" => Ok(Condition::ServiceFailed),
            other => Err(format!("unknown dependency condition: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_conditions_outrank_liveness() {
        assert!(
            Condition::ServiceCompletedSuccessfully.relevance()
                > Condition::ServiceHealthy.relevance()
        );
        assert!(Condition::ServiceFailed.relevance() > Condition::ServiceStarted.relevance());
        assert_eq!(
            Condition::ServiceStarted.most_relevant(Condition::ServiceHealthy),
            Condition::ServiceHealthy
        );
    }

    #[test]
    fn success_and_failure_conflict() {
        assert!(
            Condition::ServiceCompletedSuccessfully.conflicts_with(Condition::ServiceFailed)
        );
        assert!(!Condition::ServiceStarted.conflicts_with(Condition::ServiceHealthy));
    }

    #[test]
    fn parses_wire_strings() {
        assert_eq!(
            "service_healthy".parse::<Condition>(),
            Ok(Condition::ServiceHealthy)
        );
        assert!("service_up".parse::<Condition>().is_err());
    }
}
