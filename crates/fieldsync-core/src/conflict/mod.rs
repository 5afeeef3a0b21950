//! Conflict detection between local and divergent remote entity state
//!
//! Detection runs only when the remote snapshot is strictly newer than
//! the local one; when either side lacks a modification timestamp the
//! comparison is unsafe and detection defers to the local state.

mod resolver;

pub use resolver::{merge_values, ConflictResolver, ContentPolicy, Resolution, Strategy};

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{DomainPayload, EntityState};

/// Classification of a detected divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Report body content differs
    ContentModified,
    /// Report workflow status differs
    StatusChanged,
    /// Descriptive metadata differs
    MetadataUpdated,
    /// Template structure differs
    TemplateChanged,
    /// Layout configuration differs
    LayoutModified,
    /// Dictation transcription differs
    TranscriptionConflict,
}

impl ConflictKind {
    /// Stable name used in logs and summaries
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContentModified => "content_modified",
            Self::StatusChanged => "status_changed",
            Self::MetadataUpdated => "metadata_updated",
            Self::TemplateChanged => "template_changed",
            Self::LayoutModified => "layout_modified",
            Self::TranscriptionConflict => "transcription_conflict",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much a wrong resolution would hurt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Stable name used in logs and summaries
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A single detected divergence, consumed immediately by the resolver
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDescriptor {
    /// Name of the diverging field
    pub field: &'static str,
    /// Divergence classification
    pub kind: ConflictKind,
    /// Local side of the divergence
    pub local_value: Value,
    /// Remote side of the divergence
    pub remote_value: Value,
    /// Resolution risk
    pub severity: Severity,
}

/// Counts of detected conflicts by kind and severity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictSummary {
    /// Total detected conflicts
    pub total: usize,
    /// Counts by conflict kind
    pub by_kind: BTreeMap<&'static str, usize>,
    /// Counts by severity
    pub by_severity: BTreeMap<&'static str, usize>,
}

/// Detect conflicts between a local entity snapshot and a newer remote one
///
/// Returns an empty list when the remote side is not strictly newer, when
/// either timestamp is missing, or when the payload kinds do not line up.
#[must_use]
pub fn detect_conflicts(local: &EntityState, remote: &EntityState) -> Vec<ConflictDescriptor> {
    let (Some(local_modified), Some(remote_modified)) = (local.modified_at, remote.modified_at)
    else {
        tracing::warn!("Missing modification timestamps, cannot detect conflicts");
        return Vec::new();
    };

    if remote_modified <= local_modified {
        return Vec::new();
    }

    match (&local.body, &remote.body) {
        (
            DomainPayload::Report {
                content: local_content,
                status: local_status,
                metadata: local_metadata,
            },
            DomainPayload::Report {
                content: remote_content,
                status: remote_status,
                metadata: remote_metadata,
            },
        ) => {
            let mut conflicts = Vec::new();

            if local_content != remote_content {
                conflicts.push(ConflictDescriptor {
                    field: "content",
                    kind: ConflictKind::ContentModified,
                    local_value: local_content.clone(),
                    remote_value: remote_content.clone(),
                    severity: Severity::High,
                });
            }

            if local_status != remote_status {
                conflicts.push(ConflictDescriptor {
                    field: "status",
                    kind: ConflictKind::StatusChanged,
                    local_value: status_value(*local_status),
                    remote_value: status_value(*remote_status),
                    severity: Severity::Medium,
                });
            }

            if local_metadata != remote_metadata {
                conflicts.push(ConflictDescriptor {
                    field: "metadata",
                    kind: ConflictKind::MetadataUpdated,
                    local_value: Value::Object(local_metadata.clone()),
                    remote_value: Value::Object(remote_metadata.clone()),
                    severity: Severity::Low,
                });
            }

            conflicts
        }
        (
            DomainPayload::Template {
                structure: local_structure,
                metadata: local_metadata,
            },
            DomainPayload::Template {
                structure: remote_structure,
                metadata: remote_metadata,
            },
        ) => {
            let mut conflicts = Vec::new();

            if local_structure != remote_structure {
                conflicts.push(ConflictDescriptor {
                    field: "structure",
                    kind: ConflictKind::TemplateChanged,
                    local_value: local_structure.clone(),
                    remote_value: remote_structure.clone(),
                    severity: Severity::High,
                });
            }

            if local_metadata != remote_metadata {
                conflicts.push(ConflictDescriptor {
                    field: "metadata",
                    kind: ConflictKind::MetadataUpdated,
                    local_value: Value::Object(local_metadata.clone()),
                    remote_value: Value::Object(remote_metadata.clone()),
                    severity: Severity::Low,
                });
            }

            conflicts
        }
        (
            DomainPayload::Layout {
                configuration: local_configuration,
            },
            DomainPayload::Layout {
                configuration: remote_configuration,
            },
        ) => {
            if local_configuration == remote_configuration {
                Vec::new()
            } else {
                vec![ConflictDescriptor {
                    field: "configuration",
                    kind: ConflictKind::LayoutModified,
                    local_value: local_configuration.clone(),
                    remote_value: remote_configuration.clone(),
                    severity: Severity::Medium,
                }]
            }
        }
        (
            DomainPayload::VoiceSession {
                transcription: local_transcription,
            },
            DomainPayload::VoiceSession {
                transcription: remote_transcription,
            },
        ) => {
            if local_transcription == remote_transcription {
                Vec::new()
            } else {
                vec![ConflictDescriptor {
                    field: "transcription",
                    kind: ConflictKind::TranscriptionConflict,
                    local_value: Value::String(local_transcription.clone()),
                    remote_value: Value::String(remote_transcription.clone()),
                    severity: Severity::High,
                }]
            }
        }
        // Opaque payloads are transported, never interpreted
        (DomainPayload::Opaque { .. }, DomainPayload::Opaque { .. }) => Vec::new(),
        (local_body, remote_body) => {
            tracing::warn!(
                "Payload kind mismatch ({} vs {}), cannot detect conflicts",
                local_body.kind(),
                remote_body.kind()
            );
            Vec::new()
        }
    }
}

/// Counts of conflicts by kind and severity
#[must_use]
pub fn summarize(conflicts: &[ConflictDescriptor]) -> ConflictSummary {
    let mut summary = ConflictSummary {
        total: conflicts.len(),
        ..ConflictSummary::default()
    };

    for conflict in conflicts {
        *summary.by_kind.entry(conflict.kind.as_str()).or_default() += 1;
        *summary
            .by_severity
            .entry(conflict.severity.as_str())
            .or_default() += 1;
    }

    summary
}

fn status_value(status: Option<crate::models::ReportStatus>) -> Value {
    status.map_or(Value::Null, |s| Value::String(s.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn report(
        modified_at: Option<i64>,
        content: Value,
        status: Option<ReportStatus>,
    ) -> EntityState {
        EntityState::new(
            modified_at,
            DomainPayload::Report {
                content,
                status,
                metadata: serde_json::Map::new(),
            },
        )
    }

    #[test]
    fn test_remote_not_newer_detects_nothing() {
        let local = report(Some(2_000), json!({"a": 1}), None);
        let remote = report(Some(1_000), json!({"a": 2}), None);
        assert!(detect_conflicts(&local, &remote).is_empty());
    }

    #[test]
    fn test_missing_timestamp_detects_nothing() {
        let local = report(None, json!({"a": 1}), None);
        let remote = report(Some(2_000), json!({"a": 2}), None);
        assert!(detect_conflicts(&local, &remote).is_empty());
    }

    #[test]
    fn test_report_conflicts_detected_with_severity() {
        let mut local_metadata = serde_json::Map::new();
        local_metadata.insert("technologist".to_string(), json!("M. Dlamini"));
        let local = EntityState::new(
            Some(1_000),
            DomainPayload::Report {
                content: json!({"impression": "clear"}),
                status: Some(ReportStatus::Draft),
                metadata: local_metadata,
            },
        );
        let remote = EntityState::new(
            Some(2_000),
            DomainPayload::Report {
                content: json!({"impression": "opacity in left lobe"}),
                status: Some(ReportStatus::Final),
                metadata: serde_json::Map::new(),
            },
        );

        let conflicts = detect_conflicts(&local, &remote);
        assert_eq!(conflicts.len(), 3);
        assert_eq!(conflicts[0].kind, ConflictKind::ContentModified);
        assert_eq!(conflicts[0].severity, Severity::High);
        assert_eq!(conflicts[1].kind, ConflictKind::StatusChanged);
        assert_eq!(conflicts[1].severity, Severity::Medium);
        assert_eq!(conflicts[2].kind, ConflictKind::MetadataUpdated);
        assert_eq!(conflicts[2].severity, Severity::Low);
    }

    #[test]
    fn test_layout_conflict_detected() {
        let local = EntityState::new(
            Some(1_000),
            DomainPayload::Layout {
                configuration: json!({"columns": 2}),
            },
        );
        let remote = EntityState::new(
            Some(2_000),
            DomainPayload::Layout {
                configuration: json!({"columns": 3}),
            },
        );

        let conflicts = detect_conflicts(&local, &remote);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::LayoutModified);
        assert_eq!(conflicts[0].field, "configuration");
    }

    #[test]
    fn test_kind_mismatch_detects_nothing() {
        let local = report(Some(1_000), json!({}), None);
        let remote = EntityState::new(
            Some(2_000),
            DomainPayload::Layout {
                configuration: json!({}),
            },
        );
        assert!(detect_conflicts(&local, &remote).is_empty());
    }

    #[test]
    fn test_opaque_payloads_never_conflict() {
        let local = EntityState::new(Some(1_000), DomainPayload::Opaque { data: vec![1] });
        let remote = EntityState::new(Some(2_000), DomainPayload::Opaque { data: vec![2] });
        assert!(detect_conflicts(&local, &remote).is_empty());
    }

    #[test]
    fn test_summarize() {
        let local = report(Some(1_000), json!({"a": 1}), Some(ReportStatus::Draft));
        let remote = report(Some(2_000), json!({"a": 2}), Some(ReportStatus::Final));

        let summary = summarize(&detect_conflicts(&local, &remote));
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_kind.get("content_modified"), Some(&1));
        assert_eq!(summary.by_kind.get("status_changed"), Some(&1));
        assert_eq!(summary.by_severity.get("high"), Some(&1));
    }
}
