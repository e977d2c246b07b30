//! Service records — the unit of registration in the service registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of a registered service as tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Passing,
    Warning,
    Critical,
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Passing => "passing",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A registered service endpoint.
///
/// `id` is unique across the registry; `name` is the service class and may
/// be shared by many records. `(address, port)` need not be unique —
/// multiple logical services can share a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default = "d_unknown")]
    pub health: HealthStatus,
    pub last_seen: DateTime<Utc>,
}

fn d_unknown() -> HealthStatus {
    HealthStatus::Unknown
}

/// A single field-level validation problem, surfaced in 400 bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ServiceRecord {
    /// Build a record with `health = passing` and `last_seen = now`.
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            port,
            tags: Vec::new(),
            meta: HashMap::new(),
            health: HealthStatus::Passing,
            last_seen: Utc::now(),
        }
    }

    /// Field-level validation. Empty result means the record is acceptable.
    pub fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        if self.id.trim().is_empty() {
            issues.push(FieldIssue::new("id", "must not be empty"));
        }
        if self.name.trim().is_empty() {
            issues.push(FieldIssue::new("name", "must not be empty"));
        }
        if self.address.trim().is_empty() {
            issues.push(FieldIssue::new("address", "must not be empty"));
        }
        if self.port == 0 {
            issues.push(FieldIssue::new("port", "must be in 1..=65535"));
        }
        issues
    }

    /// Whether the record has gone stale relative to `deadline_secs`.
    pub fn is_stale(&self, now: DateTime<Utc>, deadline_secs: i64) -> bool {
        now.signed_duration_since(self.last_seen).num_seconds() > deadline_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_record_has_no_issues() {
        let r = ServiceRecord::new("svc-1", "aip", "10.0.0.1", 8080);
        assert!(r.validate().is_empty());
        assert_eq!(r.health, HealthStatus::Passing);
    }

    #[test]
    fn empty_fields_are_flagged() {
        let mut r = ServiceRecord::new("", "", "", 0);
        let issues = r.validate();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["id", "name", "address", "port"]);

        r.id = "a".into();
        r.name = "b".into();
        r.address = "c".into();
        r.port = 1;
        assert!(r.validate().is_empty());
    }

    #[test]
    fn staleness_uses_deadline() {
        let mut r = ServiceRecord::new("svc-1", "aip", "10.0.0.1", 8080);
        let now = Utc::now();
        r.last_seen = now - chrono::Duration::seconds(130);
        assert!(r.is_stale(now, 120));
        assert!(!r.is_stale(now, 180));
    }

    #[test]
    fn serde_round_trip() {
        let mut r = ServiceRecord::new("svc-1", "aip", "10.0.0.1", 8080);
        r.tags = vec!["ai".into()];
        r.meta.insert("version".into(), "1.0".into());
        let json = serde_json::to_string(&r).unwrap();
        let back: ServiceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn health_serializes_lowercase() {
        let json = serde_json::to_string(&HealthStatus::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }
}
