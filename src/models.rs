use serde::Serialize;
use std::fmt::{self, Write};
use std::str::FromStr;
use thiserror::Error;

/// Caller input rejected before any remote call was made.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid ad account id: {0} (expected act_<numeric-id>)")]
    InvalidAccount(String),
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("No valid identifiers to upload ({rejected} line(s) rejected)")]
    NoIdentifiers { rejected: usize },
    #[error("Unknown objective: {0}")]
    UnknownObjective(String),
    #[error("{field} must be a positive amount, got {value}")]
    InvalidAmount { field: &'static str, value: f64 },
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AdAccountRef(String);

impl AdAccountRef {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        let digits = raw.strip_prefix("act_").unwrap_or(raw);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidAccount(raw.to_string()));
        }
        Ok(Self(format!("act_{digits}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Relative path of an edge under this account, e.g. `act_1/campaigns`.
    pub fn edge(&self, edge: &str) -> String {
        format!("{}/{}", self.as_str(), edge)
    }
}

impl fmt::Display for AdAccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase SHA-256 hex digest of a normalized phone number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct HashedIdentifier(String);

impl HashedIdentifier {
    pub const LEN: usize = 64;

    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == Self::LEN && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Hex-encodes a 32-byte SHA-256 digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        let mut hex = String::with_capacity(Self::LEN);
        for b in digest {
            let _ = write!(&mut hex, "{:02x}", b);
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Created,
    MembersUploading,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomAudience {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub subtype: String,
    pub member_count: u64,
    pub invalid_entries: u64,
    pub state: UploadState,
}

/// Campaign objective. Both the legacy names and the `OUTCOME_*` names
/// current Graph API versions require are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Objective {
    Reach,
    Traffic,
    Conversions,
    LinkClicks,
    BrandAwareness,
    PostEngagement,
    LeadGeneration,
    VideoViews,
    OutcomeAwareness,
    OutcomeTraffic,
    OutcomeEngagement,
    OutcomeLeads,
    OutcomeSales,
    OutcomeAppPromotion,
}

impl Objective {
    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::Reach => "REACH",
            Objective::Traffic => "TRAFFIC",
            Objective::Conversions => "CONVERSIONS",
            Objective::LinkClicks => "LINK_CLICKS",
            Objective::BrandAwareness => "BRAND_AWARENESS",
            Objective::PostEngagement => "POST_ENGAGEMENT",
            Objective::LeadGeneration => "LEAD_GENERATION",
            Objective::VideoViews => "VIDEO_VIEWS",
            Objective::OutcomeAwareness => "OUTCOME_AWARENESS",
            Objective::OutcomeTraffic => "OUTCOME_TRAFFIC",
            Objective::OutcomeEngagement => "OUTCOME_ENGAGEMENT",
            Objective::OutcomeLeads => "OUTCOME_LEADS",
            Objective::OutcomeSales => "OUTCOME_SALES",
            Objective::OutcomeAppPromotion => "OUTCOME_APP_PROMOTION",
        }
    }

    /// Ad set optimization goal paired with this objective.
    pub fn optimization_goal(&self) -> &'static str {
        match self {
            Objective::Reach | Objective::OutcomeAwareness => "REACH",
            Objective::Traffic | Objective::LinkClicks | Objective::OutcomeTraffic => "LINK_CLICKS",
            Objective::Conversions | Objective::OutcomeSales => "OFFSITE_CONVERSIONS",
            Objective::BrandAwareness => "AD_RECALL_LIFT",
            Objective::PostEngagement | Objective::OutcomeEngagement => "POST_ENGAGEMENT",
            Objective::LeadGeneration | Objective::OutcomeLeads => "LEAD_GENERATION",
            Objective::VideoViews => "THRUPLAY",
            Objective::OutcomeAppPromotion => "APP_INSTALLS",
        }
    }
}

impl FromStr for Objective {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let objective = match s.trim().to_ascii_uppercase().as_str() {
            "REACH" => Objective::Reach,
            "TRAFFIC" => Objective::Traffic,
            "CONVERSIONS" => Objective::Conversions,
            "LINK_CLICKS" => Objective::LinkClicks,
            "BRAND_AWARENESS" => Objective::BrandAwareness,
            "POST_ENGAGEMENT" => Objective::PostEngagement,
            "LEAD_GENERATION" => Objective::LeadGeneration,
            "VIDEO_VIEWS" => Objective::VideoViews,
            "OUTCOME_AWARENESS" => Objective::OutcomeAwareness,
            "OUTCOME_TRAFFIC" => Objective::OutcomeTraffic,
            "OUTCOME_ENGAGEMENT" => Objective::OutcomeEngagement,
            "OUTCOME_LEADS" => Objective::OutcomeLeads,
            "OUTCOME_SALES" => Objective::OutcomeSales,
            "OUTCOME_APP_PROMOTION" => Objective::OutcomeAppPromotion,
            _ => return Err(ValidationError::UnknownObjective(s.to_string())),
        };
        Ok(objective)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub objective: Objective,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Targeting {
    pub custom_audience_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdSet {
    pub id: String,
    pub campaign_id: String,
    pub daily_budget: i64,
    pub targeting: Targeting,
    pub billing_event: String,
    pub optimization_goal: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Creative {
    pub id: String,
    pub page_id: String,
    pub link: String,
    pub message: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ad {
    pub id: String,
    pub adset_id: String,
    pub creative_id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_ref_accepts_prefixed_and_bare_ids() {
        assert_eq!(AdAccountRef::parse("act_123").unwrap().as_str(), "act_123");
        assert_eq!(AdAccountRef::parse(" 456 ").unwrap().as_str(), "act_456");
        assert_eq!(
            AdAccountRef::parse("act_1").unwrap().edge("campaigns"),
            "act_1/campaigns"
        );
    }

    #[test]
    fn account_ref_rejects_non_numeric() {
        assert!(AdAccountRef::parse("act_").is_err());
        assert!(AdAccountRef::parse("act_12a").is_err());
        assert!(AdAccountRef::parse("").is_err());
    }

    #[test]
    fn hashed_identifier_is_lowercased() {
        let upper = "A".repeat(64);
        let id = HashedIdentifier::parse(&upper).unwrap();
        assert_eq!(id.as_str(), "a".repeat(64));
        assert!(HashedIdentifier::parse(&"g".repeat(64)).is_none());
        assert!(HashedIdentifier::parse(&"a".repeat(63)).is_none());
    }

    #[test]
    fn objective_parses_case_insensitively() {
        assert_eq!("reach".parse::<Objective>().unwrap(), Objective::Reach);
        assert_eq!(
            "Link_Clicks".parse::<Objective>().unwrap().optimization_goal(),
            "LINK_CLICKS"
        );
        assert!(matches!(
            "SPEND_IT_ALL".parse::<Objective>(),
            Err(ValidationError::UnknownObjective(_))
        ));
    }

    #[test]
    fn outcome_objectives_are_accepted() {
        let traffic = "outcome_traffic".parse::<Objective>().unwrap();
        assert_eq!(traffic, Objective::OutcomeTraffic);
        assert_eq!(traffic.as_str(), "OUTCOME_TRAFFIC");
        assert_eq!(traffic.optimization_goal(), "LINK_CLICKS");
        assert_eq!(serde_json::to_value(traffic).unwrap(), "OUTCOME_TRAFFIC");

        for name in [
            "OUTCOME_AWARENESS",
            "OUTCOME_ENGAGEMENT",
            "OUTCOME_LEADS",
            "OUTCOME_SALES",
            "OUTCOME_APP_PROMOTION",
        ] {
            assert_eq!(name.parse::<Objective>().unwrap().as_str(), name);
        }
    }
}
