//! Threshold rules turning a classifier result into a content status.

use crate::domain::model::ContentStatus;
use serde::Serialize;
use std::collections::BTreeMap;

/// Output of a content classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Classification {
    pub flagged: bool,
    pub category_scores: BTreeMap<String, f64>,
}

impl Classification {
    /// Highest scoring category, if any scores were reported.
    pub fn top_category(&self) -> Option<(&str, f64)> {
        self.category_scores
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModerationDecision {
    pub status: ContentStatus,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ModerationPolicy {
    pub flag_threshold: f64,
    pub reject_threshold: f64,
}

impl ModerationPolicy {
    pub fn decide(&self, result: &Classification) -> ModerationDecision {
        let top = result.top_category();
        if let Some((category, score)) = top {
            if score >= self.reject_threshold {
                return ModerationDecision {
                    status: ContentStatus::Rejected,
                    reason: format!("{category} score {score:.3} over reject threshold"),
                };
            }
            if score >= self.flag_threshold {
                return ModerationDecision {
                    status: ContentStatus::Flagged,
                    reason: format!("{category} score {score:.3} over flag threshold"),
                };
            }
        }
        if result.flagged {
            return ModerationDecision {
                status: ContentStatus::Flagged,
                reason: "flagged by classifier".to_string(),
            };
        }
        ModerationDecision {
            status: ContentStatus::Approved,
            reason: "clean".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: ModerationPolicy = ModerationPolicy {
        flag_threshold: 0.5,
        reject_threshold: 0.9,
    };

    fn scores(pairs: &[(&str, f64)], flagged: bool) -> Classification {
        Classification {
            flagged,
            category_scores: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn clean_content_is_approved() {
        let d = POLICY.decide(&scores(&[("hate", 0.01), ("violence", 0.2)], false));
        assert_eq!(d.status, ContentStatus::Approved);
    }

    #[test]
    fn high_score_rejects() {
        let d = POLICY.decide(&scores(&[("hate", 0.95), ("violence", 0.6)], true));
        assert_eq!(d.status, ContentStatus::Rejected);
        assert!(d.reason.starts_with("hate"));
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(POLICY.decide(&scores(&[("spam", 0.5)], false)).status, ContentStatus::Flagged);
        assert_eq!(POLICY.decide(&scores(&[("spam", 0.9)], false)).status, ContentStatus::Rejected);
    }

    #[test]
    fn classifier_flag_alone_flags() {
        let d = POLICY.decide(&scores(&[("harassment", 0.3)], true));
        assert_eq!(d.status, ContentStatus::Flagged);
        assert_eq!(d.reason, "flagged by classifier");
    }

    #[test]
    fn empty_result_is_clean() {
        assert_eq!(POLICY.decide(&Classification::default()).status, ContentStatus::Approved);
    }
}
