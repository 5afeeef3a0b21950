//! Multi-strategy conflict resolution
//!
//! Resolution is pure: given identical inputs it always produces the same
//! merged state and log. Conflicts the policy routes to user review keep
//! the local value and are surfaced in `Resolution::needs_review`.

use serde_json::Value;

use super::{ConflictDescriptor, ConflictKind};
use crate::models::{DomainPayload, EntityState, ReportStatus};

/// Configured handling of significant content divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentPolicy {
    /// Newer (remote) content wins
    LatestWins,
    /// Attempt a structural merge
    Merge,
    /// Keep local and ask a human
    #[default]
    UserReview,
}

/// Per-conflict resolution decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    UseLocal,
    UseRemote,
    Merge,
    UserReview,
    Skip,
}

/// Outcome of resolving a set of conflicts
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The reconciled entity state to apply locally
    pub merged: EntityState,
    /// One human-readable line per conflict stating the rule applied
    pub log: Vec<String>,
    /// Conflicts deferred to a human; their local values are preserved
    pub needs_review: Vec<ConflictDescriptor>,
}

/// Applies per-field resolution policies to detected conflicts
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    content_policy: ContentPolicy,
    auto_resolve_minor: bool,
    merge_line_threshold: usize,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self {
            content_policy: ContentPolicy::default(),
            auto_resolve_minor: true,
            merge_line_threshold: 10,
        }
    }
}

impl ConflictResolver {
    /// Create a resolver with explicit policy knobs
    #[must_use]
    pub const fn new(
        content_policy: ContentPolicy,
        auto_resolve_minor: bool,
        merge_line_threshold: usize,
    ) -> Self {
        Self {
            content_policy,
            auto_resolve_minor,
            merge_line_threshold,
        }
    }

    /// Resolve detected conflicts into a merged entity state
    #[must_use]
    pub fn resolve(
        &self,
        conflicts: &[ConflictDescriptor],
        local: &EntityState,
        remote: &EntityState,
    ) -> Resolution {
        let mut merged = local.clone();
        let mut log = Vec::new();
        let mut needs_review = Vec::new();

        for conflict in conflicts {
            let (strategy, message) = self.decide(conflict);

            match strategy {
                Strategy::UseRemote => {
                    apply_value(&mut merged.body, conflict, &conflict.remote_value, remote);
                    log.push(format!(
                        "Used remote value for {}: {message}",
                        conflict.field
                    ));
                }
                Strategy::UseLocal => {
                    log.push(format!("Kept local value for {}: {message}", conflict.field));
                }
                Strategy::Merge => {
                    let value = merge_values(
                        &conflict.local_value,
                        &conflict.remote_value,
                        self.merge_line_threshold,
                    );
                    apply_value(&mut merged.body, conflict, &value, remote);
                    log.push(format!("Merged values for {}: {message}", conflict.field));
                }
                Strategy::UserReview => {
                    log.push(format!(
                        "User review required for {}: {message}",
                        conflict.field
                    ));
                    needs_review.push(conflict.clone());
                }
                Strategy::Skip => {
                    log.push(format!("Skipped conflict for {}: {message}", conflict.field));
                }
            }
        }

        Resolution {
            merged,
            log,
            needs_review,
        }
    }

    /// Pick a strategy for one conflict
    fn decide(&self, conflict: &ConflictDescriptor) -> (Strategy, String) {
        match conflict.kind {
            ConflictKind::ContentModified => {
                self.decide_content(&conflict.local_value, &conflict.remote_value)
            }
            ConflictKind::StatusChanged => {
                Self::decide_status(&conflict.local_value, &conflict.remote_value)
            }
            ConflictKind::MetadataUpdated => {
                (Strategy::Merge, "Merging metadata changes".to_string())
            }
            ConflictKind::TemplateChanged => (
                Strategy::UserReview,
                "Template structure changes require user review".to_string(),
            ),
            ConflictKind::LayoutModified => (
                Strategy::UseLocal,
                "Layout changes are user-specific, keeping local".to_string(),
            ),
            ConflictKind::TranscriptionConflict => (
                Strategy::UserReview,
                "Voice transcription differences require user review".to_string(),
            ),
        }
    }

    fn decide_content(&self, local: &Value, remote: &Value) -> (Strategy, String) {
        if self.auto_resolve_minor && is_minor_change(local, remote) {
            return (
                Strategy::Merge,
                "Minor content changes merged automatically".to_string(),
            );
        }

        if is_empty_value(local) && !is_empty_value(remote) {
            return (
                Strategy::UseRemote,
                "Local content empty, using remote".to_string(),
            );
        }
        if !is_empty_value(local) && is_empty_value(remote) {
            return (
                Strategy::UseLocal,
                "Remote content empty, keeping local".to_string(),
            );
        }

        match self.content_policy {
            ContentPolicy::LatestWins => (
                Strategy::UseRemote,
                "Using latest (remote) content".to_string(),
            ),
            ContentPolicy::Merge => (
                Strategy::Merge,
                "Attempting to merge content changes".to_string(),
            ),
            ContentPolicy::UserReview => (
                Strategy::UserReview,
                "Significant content changes require user review".to_string(),
            ),
        }
    }

    fn decide_status(local: &Value, remote: &Value) -> (Strategy, String) {
        let local_rank = status_rank(local);
        let remote_rank = status_rank(remote);

        if remote_rank > local_rank {
            (
                Strategy::UseRemote,
                format!(
                    "Remote status '{}' has higher priority",
                    status_name(remote)
                ),
            )
        } else if local_rank > remote_rank {
            (
                Strategy::UseLocal,
                format!("Local status '{}' has higher priority", status_name(local)),
            )
        } else {
            (
                Strategy::UseRemote,
                "Same priority, using remote status".to_string(),
            )
        }
    }
}

/// Structural merge of two values
///
/// Maps take the key union with remote winning collisions; lists take the
/// de-duplicated union preserving order; similar strings take a line-based
/// merge; everything else takes remote.
#[must_use]
pub fn merge_values(local: &Value, remote: &Value, line_threshold: usize) -> Value {
    match (local, remote) {
        (Value::Object(local_map), Value::Object(remote_map)) => {
            let mut merged = local_map.clone();
            for (key, value) in remote_map {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (Value::Array(local_items), Value::Array(remote_items)) => {
            let mut merged = local_items.clone();
            for item in remote_items {
                if !merged.contains(item) {
                    merged.push(item.clone());
                }
            }
            Value::Array(merged)
        }
        (Value::String(local_text), Value::String(remote_text)) => {
            Value::String(merge_text(local_text, remote_text, line_threshold))
        }
        _ => remote.clone(),
    }
}

/// Line-based text merge: keep common lines plus remote additions when the
/// changed-line count stays under the threshold, otherwise take remote
fn merge_text(local: &str, remote: &str, line_threshold: usize) -> String {
    let local_lines: Vec<&str> = local.lines().collect();
    let remote_lines: Vec<&str> = remote.lines().collect();

    let (merged, changed) = merge_lines(&local_lines, &remote_lines);
    if changed < line_threshold {
        merged.join("\n")
    } else {
        remote.to_string()
    }
}

/// LCS walk over two line sequences
///
/// Returns the merged sequence (common lines once, remote-only lines kept,
/// local-only lines dropped) and the changed-line count.
fn merge_lines<'a>(local: &[&'a str], remote: &[&'a str]) -> (Vec<&'a str>, usize) {
    let n = local.len();
    let m = remote.len();
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if local[i] == remote[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut merged = Vec::new();
    let mut changed = 0;
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if local[i] == remote[j] {
            merged.push(local[i]);
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            // line only in local: superseded by remote
            changed += 1;
            i += 1;
        } else {
            merged.push(remote[j]);
            changed += 1;
            j += 1;
        }
    }
    changed += n - i;
    while j < m {
        merged.push(remote[j]);
        changed += 1;
        j += 1;
    }

    (merged, changed)
}

/// Whether two values differ only in whitespace/formatting
fn is_minor_change(local: &Value, remote: &Value) -> bool {
    normalized(local) == normalized(remote)
}

/// Canonical representation with all whitespace removed
fn normalized(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.split_whitespace().collect()
}

/// Null, blank string, empty object, or empty array
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn status_name(value: &Value) -> &str {
    value.as_str().unwrap_or("unknown")
}

fn status_rank(value: &Value) -> u8 {
    value
        .as_str()
        .and_then(|s| s.parse::<ReportStatus>().ok())
        .map_or(0, ReportStatus::rank)
}

/// Write a resolved value back into the merged payload
fn apply_value(
    body: &mut DomainPayload,
    conflict: &ConflictDescriptor,
    value: &Value,
    remote: &EntityState,
) {
    match (conflict.kind, body) {
        (ConflictKind::ContentModified, DomainPayload::Report { content, .. }) => {
            *content = value.clone();
        }
        (ConflictKind::StatusChanged, DomainPayload::Report { status, .. }) => {
            if let DomainPayload::Report {
                status: remote_status,
                ..
            } = &remote.body
            {
                *status = *remote_status;
            }
        }
        (ConflictKind::MetadataUpdated, DomainPayload::Report { metadata, .. })
        | (ConflictKind::MetadataUpdated, DomainPayload::Template { metadata, .. }) => {
            if let Value::Object(map) = value {
                *metadata = map.clone();
            }
        }
        (ConflictKind::TemplateChanged, DomainPayload::Template { structure, .. }) => {
            *structure = value.clone();
        }
        (ConflictKind::LayoutModified, DomainPayload::Layout { configuration }) => {
            *configuration = value.clone();
        }
        (ConflictKind::TranscriptionConflict, DomainPayload::VoiceSession { transcription }) => {
            if let Value::String(text) = value {
                *transcription = text.clone();
            }
        }
        _ => {
            tracing::warn!(
                "Cannot apply {} resolution to {} payload",
                conflict.kind,
                conflict.field
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::detect_conflicts;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn report(
        modified_at: i64,
        content: Value,
        status: Option<ReportStatus>,
        metadata: serde_json::Map<String, Value>,
    ) -> EntityState {
        EntityState::new(
            Some(modified_at),
            DomainPayload::Report {
                content,
                status,
                metadata,
            },
        )
    }

    fn resolve_pair(
        resolver: &ConflictResolver,
        local: &EntityState,
        remote: &EntityState,
    ) -> Resolution {
        let conflicts = detect_conflicts(local, remote);
        resolver.resolve(&conflicts, local, remote)
    }

    #[test]
    fn test_status_progression_remote_wins() {
        // Scenario: local draft, remote final
        let local = report(1_000, json!({}), Some(ReportStatus::Draft), serde_json::Map::new());
        let remote = report(2_000, json!({}), Some(ReportStatus::Final), serde_json::Map::new());

        let resolution = resolve_pair(&ConflictResolver::default(), &local, &remote);
        match &resolution.merged.body {
            DomainPayload::Report { status, .. } => assert_eq!(*status, Some(ReportStatus::Final)),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(resolution.needs_review.is_empty());
    }

    #[test]
    fn test_status_local_higher_kept() {
        let local = report(1_000, json!({}), Some(ReportStatus::Signed), serde_json::Map::new());
        let remote = report(2_000, json!({}), Some(ReportStatus::Draft), serde_json::Map::new());

        let resolution = resolve_pair(&ConflictResolver::default(), &local, &remote);
        match &resolution.merged.body {
            DomainPayload::Report { status, .. } => assert_eq!(*status, Some(ReportStatus::Signed)),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_layout_keeps_local() {
        // Scenario: diverged layout configuration stays local
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

        let resolution = resolve_pair(&ConflictResolver::default(), &local, &remote);
        assert_eq!(resolution.merged.body, local.body);
        assert!(resolution
            .log
            .iter()
            .any(|line| line.contains("Layout changes are user-specific, keeping local")));
    }

    #[test]
    fn test_minor_whitespace_change_auto_merged() {
        let local = report(
            1_000,
            json!("no acute findings"),
            None,
            serde_json::Map::new(),
        );
        let remote = report(
            2_000,
            json!("no  acute\nfindings"),
            None,
            serde_json::Map::new(),
        );

        let resolution = resolve_pair(&ConflictResolver::default(), &local, &remote);
        assert!(resolution
            .log
            .iter()
            .any(|line| line.contains("Minor content changes merged automatically")));
        assert!(resolution.needs_review.is_empty());
    }

    #[test]
    fn test_empty_local_content_takes_remote() {
        let local = report(1_000, json!(""), None, serde_json::Map::new());
        let remote = report(2_000, json!("new findings"), None, serde_json::Map::new());

        let resolution = resolve_pair(&ConflictResolver::default(), &local, &remote);
        match &resolution.merged.body {
            DomainPayload::Report { content, .. } => assert_eq!(content, &json!("new findings")),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_significant_content_defers_to_review_by_default() {
        let local = report(1_000, json!("left lung clear"), None, serde_json::Map::new());
        let remote = report(2_000, json!("right lung opacity"), None, serde_json::Map::new());

        let resolution = resolve_pair(&ConflictResolver::default(), &local, &remote);
        assert_eq!(resolution.needs_review.len(), 1);
        // Local state preserved pending a human decision
        match &resolution.merged.body {
            DomainPayload::Report { content, .. } => assert_eq!(content, &json!("left lung clear")),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_latest_wins_policy_uses_remote() {
        let resolver = ConflictResolver::new(ContentPolicy::LatestWins, true, 10);
        let local = report(1_000, json!("old text"), None, serde_json::Map::new());
        let remote = report(2_000, json!("entirely new text"), None, serde_json::Map::new());

        let resolution = resolve_pair(&resolver, &local, &remote);
        match &resolution.merged.body {
            DomainPayload::Report { content, .. } => {
                assert_eq!(content, &json!("entirely new text"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_metadata_union_remote_wins_collisions() {
        let mut local_metadata = serde_json::Map::new();
        local_metadata.insert("modality".to_string(), json!("CR"));
        local_metadata.insert("operator".to_string(), json!("local"));
        let mut remote_metadata = serde_json::Map::new();
        remote_metadata.insert("operator".to_string(), json!("remote"));
        remote_metadata.insert("station".to_string(), json!("A"));

        let local = report(1_000, json!({}), None, local_metadata);
        let remote = report(2_000, json!({}), None, remote_metadata);

        let resolution = resolve_pair(&ConflictResolver::default(), &local, &remote);
        match &resolution.merged.body {
            DomainPayload::Report { metadata, .. } => {
                assert_eq!(metadata.get("modality"), Some(&json!("CR")));
                assert_eq!(metadata.get("operator"), Some(&json!("remote")));
                assert_eq!(metadata.get("station"), Some(&json!("A")));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_template_structure_always_review() {
        let local = EntityState::new(
            Some(1_000),
            DomainPayload::Template {
                structure: json!({"sections": ["history"]}),
                metadata: serde_json::Map::new(),
            },
        );
        let remote = EntityState::new(
            Some(2_000),
            DomainPayload::Template {
                structure: json!({"sections": ["history", "impression"]}),
                metadata: serde_json::Map::new(),
            },
        );

        let resolution = resolve_pair(&ConflictResolver::default(), &local, &remote);
        assert_eq!(resolution.needs_review.len(), 1);
        assert_eq!(resolution.merged.body, local.body);
    }

    #[test]
    fn test_transcription_always_review() {
        let local = EntityState::new(
            Some(1_000),
            DomainPayload::VoiceSession {
                transcription: "no fracture".to_string(),
            },
        );
        let remote = EntityState::new(
            Some(2_000),
            DomainPayload::VoiceSession {
                transcription: "hairline fracture".to_string(),
            },
        );

        let resolution = resolve_pair(&ConflictResolver::default(), &local, &remote);
        assert_eq!(resolution.needs_review.len(), 1);
        assert_eq!(resolution.merged.body, local.body);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let local = report(1_000, json!("left lung clear"), Some(ReportStatus::Draft), serde_json::Map::new());
        let remote = report(2_000, json!("right lung opacity"), Some(ReportStatus::Final), serde_json::Map::new());

        let first = resolve_pair(&ConflictResolver::default(), &local, &remote);
        let second = resolve_pair(&ConflictResolver::default(), &local, &remote);
        assert_eq!(first, second);
    }

    #[test]
    fn test_merge_lists_dedup_preserving_order() {
        let local = json!(["a", "b", "c"]);
        let remote = json!(["b", "d"]);
        let merged = merge_values(&local, &remote, 10);
        assert_eq!(merged, json!(["a", "b", "c", "d"]));
    }

    #[test]
    fn test_merge_maps_remote_wins() {
        let local = json!({"x": 1, "y": 2});
        let remote = json!({"y": 3, "z": 4});
        let merged = merge_values(&local, &remote, 10);
        assert_eq!(merged, json!({"x": 1, "y": 3, "z": 4}));
    }

    #[test]
    fn test_merge_scalar_takes_remote() {
        let merged = merge_values(&json!(1), &json!(2), 10);
        assert_eq!(merged, json!(2));
    }

    #[test]
    fn test_merge_similar_text_keeps_common_and_remote_lines() {
        let local = "line one\nline two\nline three";
        let remote = "line one\nline 2\nline three";
        let merged = merge_text(local, remote, 10);
        assert_eq!(merged, "line one\nline 2\nline three");
    }

    #[test]
    fn test_merge_divergent_text_takes_remote() {
        let local = (0..20).map(|i| format!("local {i}")).collect::<Vec<_>>().join("\n");
        let remote = (0..20).map(|i| format!("remote {i}")).collect::<Vec<_>>().join("\n");
        let merged = merge_text(&local, &remote, 10);
        assert_eq!(merged, remote);
    }
}
