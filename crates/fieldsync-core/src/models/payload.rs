//! Domain payload union
//!
//! Payloads carried by sync items are a tagged union of the domain kinds
//! the conflict engine knows how to compare, plus an opaque fallback for
//! data the engine merely transports.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::sync_item::ItemKind;

/// Workflow status of a report, ordered by signing progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    InReview,
    Reviewed,
    Final,
    Signed,
}

impl ReportStatus {
    /// Monotonic progression rank; higher ranks never regress during resolution
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Draft => 1,
            Self::InReview => 2,
            Self::Reviewed => 3,
            Self::Final => 4,
            Self::Signed => 5,
        }
    }

    /// String representation used in payloads and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InReview => "in_review",
            Self::Reviewed => "reviewed",
            Self::Final => "final",
            Self::Signed => "signed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "in_review" => Ok(Self::InReview),
            "reviewed" => Ok(Self::Reviewed),
            "final" => Ok(Self::Final),
            "signed" => Ok(Self::Signed),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown report status: {other}"
            ))),
        }
    }
}

/// Structured payload of a sync item, tagged by domain kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainPayload {
    /// A diagnostic report
    Report {
        /// Report body sections
        content: Value,
        /// Workflow status
        status: Option<ReportStatus>,
        /// Free-form descriptive fields
        metadata: Map<String, Value>,
    },
    /// A report template
    Template {
        /// Section/field structure definition
        structure: Value,
        /// Free-form descriptive fields
        metadata: Map<String, Value>,
    },
    /// A viewer layout configuration
    Layout {
        /// Per-session display configuration
        configuration: Value,
    },
    /// A dictation session
    VoiceSession {
        /// Transcribed text
        transcription: String,
    },
    /// Data the engine transports without interpreting
    Opaque {
        /// Raw bytes
        data: Vec<u8>,
    },
}

impl DomainPayload {
    /// Domain category of this payload
    #[must_use]
    pub const fn kind(&self) -> ItemKind {
        match self {
            Self::Report { .. } => ItemKind::Report,
            Self::Template { .. } => ItemKind::Template,
            Self::Layout { .. } => ItemKind::Layout,
            Self::VoiceSession { .. } => ItemKind::VoiceSession,
            Self::Opaque { .. } => ItemKind::Opaque,
        }
    }
}

/// A versioned snapshot of an entity, as held locally or fetched remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Last modification timestamp (Unix ms); absent when the source
    /// system did not record one
    pub modified_at: Option<i64>,
    /// The entity data itself
    pub body: DomainPayload,
}

impl EntityState {
    /// Wrap a payload with its modification timestamp
    #[must_use]
    pub const fn new(modified_at: Option<i64>, body: DomainPayload) -> Self {
        Self { modified_at, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_status_rank_order() {
        assert!(ReportStatus::Draft.rank() < ReportStatus::InReview.rank());
        assert!(ReportStatus::InReview.rank() < ReportStatus::Reviewed.rank());
        assert!(ReportStatus::Reviewed.rank() < ReportStatus::Final.rank());
        assert!(ReportStatus::Final.rank() < ReportStatus::Signed.rank());
    }

    #[test]
    fn test_payload_kind() {
        let layout = DomainPayload::Layout {
            configuration: serde_json::json!({"columns": 2}),
        };
        assert_eq!(layout.kind(), ItemKind::Layout);

        let opaque = DomainPayload::Opaque { data: vec![1, 2, 3] };
        assert_eq!(opaque.kind(), ItemKind::Opaque);
    }

    #[test]
    fn test_payload_serde_roundtrip() {
        let state = EntityState::new(
            Some(1_700_000_000_000),
            DomainPayload::Report {
                content: serde_json::json!({"impression": "normal"}),
                status: Some(ReportStatus::Draft),
                metadata: serde_json::Map::new(),
            },
        );
        let json = serde_json::to_string(&state).unwrap();
        let back: EntityState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_payload_tag_names() {
        let json = serde_json::to_value(DomainPayload::VoiceSession {
            transcription: "no acute findings".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "voice_session");
    }
}
