/// Configuration for the scoring engine.
///
/// The per-course `scoring` object arrives as JSON from course data. Every
/// field is optional on the wire; missing fields deserialize to the engine
/// defaults, so a course with no `scoring` block at all behaves identically
/// to one with `{}`.
use serde::{Deserialize, Serialize};

/// Pass thresholds governing `is_passed` on the total set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Passmark {
    /// Whether pass/fail is evaluated at all.
    pub is_enabled: bool,
    /// Require every scoring subset to be passed, in addition to the
    /// score/correctness thresholds.
    pub requires_passed_subsets: bool,
    /// Score threshold. Compared against the scaled score when `is_scaled`
    /// is set, the raw score otherwise.
    pub score: f64,
    /// Correctness threshold, same scaling rule as `score`.
    pub correctness: f64,
    /// Compare scaled (percentage) values rather than raw sums.
    pub is_scaled: bool,
}

impl Default for Passmark {
    fn default() -> Self {
        Self {
            is_enabled: true,
            requires_passed_subsets: false,
            score: 60.0,
            correctness: 60.0,
            is_scaled: true,
        }
    }
}

/// The per-course `scoring` configuration object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringConfig {
    /// Override for the total set's id (defaults to `"total"`).
    pub id: Option<String>,
    /// Title for the total set, surfaced in its objective description.
    pub title: Option<String>,
    /// Pass thresholds for the total set.
    pub passmark: Passmark,
    /// Expose legacy single-assessment shims on the public surface.
    pub is_backward_compatible: bool,
}

impl ScoringConfig {
    /// The id the total set registers under.
    pub fn total_id(&self) -> &str {
        self.id.as_deref().unwrap_or("total")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_passmark_defaults() {
        let passmark = Passmark::default();
        assert!(passmark.is_enabled);
        assert!(!passmark.requires_passed_subsets);
        assert_eq!(passmark.score, 60.0);
        assert_eq!(passmark.correctness, 60.0);
        assert!(passmark.is_scaled);
    }

    #[test]
    fn test_empty_object_deserializes_to_defaults() {
        let config: ScoringConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, ScoringConfig::default());
        assert_eq!(config.total_id(), "total");
    }

    #[test]
    fn test_partial_passmark() {
        let config: ScoringConfig = serde_json::from_value(json!({
            "passmark": { "score": 75, "requiresPassedSubsets": true }
        }))
        .unwrap();
        assert_eq!(config.passmark.score, 75.0);
        assert!(config.passmark.requires_passed_subsets);
        // Untouched fields keep their defaults.
        assert_eq!(config.passmark.correctness, 60.0);
        assert!(config.passmark.is_scaled);
    }

    #[test]
    fn test_total_id_override() {
        let config: ScoringConfig = serde_json::from_value(json!({
            "id": "course-total",
            "title": "Course result"
        }))
        .unwrap();
        assert_eq!(config.total_id(), "course-total");
        assert_eq!(config.title.as_deref(), Some("Course result"));
    }
}
