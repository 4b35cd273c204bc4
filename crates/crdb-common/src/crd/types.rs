//! Shared status types for CrdbCluster

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kinds of condition the operator reports on a CrdbCluster
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ClusterConditionType {
    /// The cluster has been initialized (`cockroach init` ran)
    Initialized,
    /// A node of the cluster is being or has been decommissioned
    Decommission,
    /// Node and client certificates have been generated
    CertificateGenerated,
    /// The running database version has been checked
    CrdbVersionChecked,
    /// A condition type this crate does not know about
    #[serde(other)]
    Unrecognized,
}

impl std::fmt::Display for ClusterConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "Initialized"),
            Self::Decommission => write!(f, "Decommission"),
            Self::CertificateGenerated => write!(f, "CertificateGenerated"),
            Self::CrdbVersionChecked => write!(f, "CrdbVersionChecked"),
            Self::Unrecognized => write!(f, "Unrecognized"),
        }
    }
}

/// A single entry of `status.conditions`
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    /// Kind of condition
    #[serde(rename = "type")]
    pub type_: ClusterConditionType,

    /// Status of the condition
    pub status: ConditionStatus,

    /// Last time the condition transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl ClusterCondition {
    /// Create a condition with no transition time, as used for expectations
    pub fn new(type_: ClusterConditionType, status: ConditionStatus) -> Self {
        Self {
            type_,
            status,
            last_transition_time: None,
        }
    }

    /// Copy of this condition with the transition time cleared
    ///
    /// Transition times are set by the controller when it observes a change
    /// and are never part of an expectation.
    pub fn without_transition_time(&self) -> Self {
        Self {
            last_transition_time: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_deserializes_from_operator_status() {
        let json = r#"{"type":"Initialized","status":"True","lastTransitionTime":"2021-05-03T10:00:00Z"}"#;
        let cond: ClusterCondition = serde_json::from_str(json).expect("condition should parse");
        assert_eq!(cond.type_, ClusterConditionType::Initialized);
        assert_eq!(cond.status, ConditionStatus::True);
        assert!(cond.last_transition_time.is_some());
    }

    #[test]
    fn clearing_transition_time_makes_conditions_comparable() {
        let observed = ClusterCondition {
            type_: ClusterConditionType::Decommission,
            status: ConditionStatus::True,
            last_transition_time: Some(Utc::now()),
        };
        let expected = ClusterCondition::new(ClusterConditionType::Decommission, ConditionStatus::True);

        assert_ne!(observed, expected);
        assert_eq!(observed.without_transition_time(), expected);
    }

    #[test]
    fn missing_transition_time_is_accepted() {
        let json = r#"{"type":"Decommission","status":"False"}"#;
        let cond: ClusterCondition = serde_json::from_str(json).expect("condition should parse");
        assert_eq!(cond.last_transition_time, None);
        assert_eq!(cond.status.to_string(), "False");
    }

    #[test]
    fn unknown_condition_type_does_not_break_status() {
        let json = r#"{"conditions":[
            {"type":"Decommission","status":"True"},
            {"type":"Failed","status":"False"}
        ]}"#;
        let status: crate::crd::CrdbClusterStatus =
            serde_json::from_str(json).expect("status should parse");
        assert_eq!(status.conditions.len(), 2);
        assert_eq!(status.conditions[0].type_, ClusterConditionType::Decommission);
        assert_eq!(status.conditions[1].type_, ClusterConditionType::Unrecognized);
    }
}
