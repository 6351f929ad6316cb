use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::privacy::masking::mask_data;

/// Contact fields of a requester. The same shape carries both the private
/// (raw) tier and the public (masked) tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Urgency {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Urgency {
    /// Higher is more severe.
    pub fn severity(self) -> u8 {
        match self {
            Urgency::Critical => 3,
            Urgency::High => 2,
            Urgency::Medium => 1,
            Urgency::Low => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Critical => "critical",
            Urgency::High => "high",
            Urgency::Medium => "medium",
            Urgency::Low => "low",
        }
    }
}

impl FromStr for Urgency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Urgency::Critical),
            "high" => Ok(Urgency::High),
            "medium" => Ok(Urgency::Medium),
            "low" => Ok(Urgency::Low),
            _ => Err(UnknownVariant::new("urgency", s)),
        }
    }
}

impl TryFrom<String> for Urgency {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Help request lifecycle: `open -> in-progress -> closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    Open,
    InProgress,
    Closed,
}

impl RequestStatus {
    fn rank(self) -> u8 {
        match self {
            RequestStatus::Open => 0,
            RequestStatus::InProgress => 1,
            RequestStatus::Closed => 2,
        }
    }

    /// Transitions only move forward; `open -> closed` is allowed.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::InProgress => "in-progress",
            RequestStatus::Closed => "closed",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(RequestStatus::Open),
            "in-progress" | "in_progress" => Ok(RequestStatus::InProgress),
            "closed" => Ok(RequestStatus::Closed),
            _ => Err(UnknownVariant::new("request status", s)),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Pending,
    Accepted,
    Completed,
    Cancelled,
}

impl ResponseStatus {
    pub fn can_transition_to(self, next: ResponseStatus) -> bool {
        matches!(
            (self, next),
            (ResponseStatus::Pending, ResponseStatus::Accepted)
                | (ResponseStatus::Pending, ResponseStatus::Cancelled)
                | (ResponseStatus::Accepted, ResponseStatus::Completed)
                | (ResponseStatus::Accepted, ResponseStatus::Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseStatus::Pending => "pending",
            ResponseStatus::Accepted => "accepted",
            ResponseStatus::Completed => "completed",
            ResponseStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for ResponseStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ResponseStatus::Pending),
            "accepted" => Ok(ResponseStatus::Accepted),
            "completed" => Ok(ResponseStatus::Completed),
            "cancelled" | "canceled" => Ok(ResponseStatus::Cancelled),
            _ => Err(UnknownVariant::new("response status", s)),
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission payload for a new help request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHelpRequest {
    #[serde(flatten)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub help_type: String,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub description: String,
}

/// A help request holding both data tiers.
///
/// The public tier is derived from the private tier when the record is built
/// and neither tier can be replaced afterwards, so the masked copy never
/// drifts from the raw one.
#[derive(Debug, Clone)]
pub struct HelpRequest {
    pub id: String,
    pub owner_id: String,
    pub help_type: String,
    pub urgency: Urgency,
    pub description: String,
    pub status: RequestStatus,
    pub volunteer_count: u32,
    /// Unix milliseconds.
    pub created_at: i64,
    private_data: ContactInfo,
    public_data: ContactInfo,
}

impl HelpRequest {
    /// Build a freshly submitted request (`open`, no volunteers).
    pub fn new(id: String, owner_id: String, draft: NewHelpRequest, created_at: i64) -> Self {
        let public_data = mask_data(&draft.contact);
        Self {
            id,
            owner_id,
            help_type: draft.help_type,
            urgency: draft.urgency,
            description: draft.description,
            status: RequestStatus::Open,
            volunteer_count: 0,
            created_at,
            private_data: draft.contact,
            public_data,
        }
    }

    pub fn private_data(&self) -> &ContactInfo {
        &self.private_data
    }

    pub fn public_data(&self) -> &ContactInfo {
        &self.public_data
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerResponse {
    pub id: String,
    pub request_id: String,
    pub volunteer_id: String,
    pub status: ResponseStatus,
    /// Unix milliseconds.
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_tier_is_derived_from_private_tier() {
        let draft = NewHelpRequest {
            contact: ContactInfo {
                name: "Jane Doe".to_string(),
                address: "42 Harbor Road, Springfield".to_string(),
                phone: "5551234567".to_string(),
                email: "jane@example.org".to_string(),
            },
            help_type: "water".to_string(),
            urgency: Urgency::High,
            description: "Need drinking water".to_string(),
        };
        let request = HelpRequest::new("r1".into(), "u1".into(), draft, 1_000);

        assert_eq!(request.private_data().phone, "5551234567");
        assert_eq!(request.public_data(), &mask_data(request.private_data()));
        assert_eq!(request.status, RequestStatus::Open);
        assert_eq!(request.volunteer_count, 0);
    }

    #[test]
    fn urgency_severity_order() {
        assert!(Urgency::Critical.severity() > Urgency::High.severity());
        assert!(Urgency::High.severity() > Urgency::Medium.severity());
        assert!(Urgency::Medium.severity() > Urgency::Low.severity());
    }

    #[test]
    fn request_status_is_monotonic() {
        assert!(RequestStatus::Open.can_transition_to(RequestStatus::InProgress));
        assert!(RequestStatus::Open.can_transition_to(RequestStatus::Closed));
        assert!(RequestStatus::InProgress.can_transition_to(RequestStatus::Closed));
        assert!(!RequestStatus::Closed.can_transition_to(RequestStatus::Open));
        assert!(!RequestStatus::InProgress.can_transition_to(RequestStatus::Open));
        assert!(!RequestStatus::Open.can_transition_to(RequestStatus::Open));
    }

    #[test]
    fn response_status_transitions() {
        assert!(ResponseStatus::Accepted.can_transition_to(ResponseStatus::Completed));
        assert!(ResponseStatus::Accepted.can_transition_to(ResponseStatus::Cancelled));
        assert!(!ResponseStatus::Completed.can_transition_to(ResponseStatus::Cancelled));
        assert!(!ResponseStatus::Cancelled.can_transition_to(ResponseStatus::Accepted));
    }

    #[test]
    fn enums_use_wire_names() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!(serde_json::to_string(&Urgency::Critical).unwrap(), "\"critical\"");
        assert_eq!("In-Progress".parse::<RequestStatus>(), Ok(RequestStatus::InProgress));
        assert!("urgent".parse::<Urgency>().is_err());
    }

    #[test]
    fn new_request_payload_is_flat() {
        let draft: NewHelpRequest = serde_json::from_str(
            r#"{"name":"Jane Doe","phone":"5551234567","helpType":"food","description":"x"}"#,
        )
        .unwrap();
        assert_eq!(draft.contact.name, "Jane Doe");
        assert_eq!(draft.contact.email, "");
        assert_eq!(draft.help_type, "food");
        assert_eq!(draft.urgency, Urgency::Medium);
    }

    #[test]
    fn body_urgency_matches_query_parsing() {
        let draft: NewHelpRequest =
            serde_json::from_str(r#"{"name":"Jane Doe","urgency":"High"}"#).unwrap();
        assert_eq!(draft.urgency, Urgency::High);

        let err = serde_json::from_str::<NewHelpRequest>(r#"{"urgency":"urgent"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown urgency: urgent"));
    }
}
