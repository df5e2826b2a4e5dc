//! Per-face match resolution — reduces the candidate set for one query
//! face to a single outcome. Pure decision logic, no side effects.

use crate::matcher::MatchCandidate;
use crate::types::Identity;
use serde::{Deserialize, Serialize};

/// Decided result for one query face. Transient; only its consequence
/// (an attendance event) is ever persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchOutcome {
    /// No enrolled identity cleared the threshold. Expected and
    /// non-exceptional; produces no attendance event and no error.
    NoMatch,
    Matched {
        identity: Identity,
        best_distance: f32,
    },
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }
}

/// Which sub-threshold candidate wins for a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionRule {
    /// Smallest distance across all identities, independent of
    /// enumeration order.
    GlobalMinimum,
    /// First candidate in gallery enumeration order. Reproduces the legacy
    /// scanner that stopped at the first sub-threshold identity; kept so
    /// the behavioral difference stays visible under test.
    FirstBelowThreshold,
}

/// Resolution policy for one query face.
pub struct ResolutionPolicy {
    rule: SelectionRule,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self::new(SelectionRule::GlobalMinimum)
    }
}

impl ResolutionPolicy {
    pub fn new(rule: SelectionRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> SelectionRule {
        self.rule
    }

    /// Reduce zero-or-more candidates to exactly one outcome. Candidates
    /// from other faces in the same image never enter this set; faces are
    /// resolved independently.
    pub fn resolve(&self, candidates: &[MatchCandidate]) -> MatchOutcome {
        let winner = match self.rule {
            SelectionRule::GlobalMinimum => candidates.iter().min_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
            SelectionRule::FirstBelowThreshold => candidates.first(),
        };

        match winner {
            Some(candidate) => MatchOutcome::Matched {
                identity: candidate.identity.clone(),
                best_distance: candidate.distance,
            },
            None => MatchOutcome::NoMatch,
        }
    }
}
