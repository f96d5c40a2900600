use std::cmp::Ordering;

use rapidfuzz::distance::jaro_winkler;

/// Ranked column-name matching. Candidates at or above `threshold` are
/// returned highest first; `high_confidence` gates unattended acceptance
/// (a single survivor below it still escalates to the interactive step).
#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatcher {
    pub threshold: f64,
    pub high_confidence: f64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            threshold: 0.72,
            high_confidence: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub name: String,
    pub score: f64,
}

impl FuzzyMatcher {
    /// Rank `candidates` against `target`, keeping those at or above the
    /// threshold. Ties break by shorter candidate, then lexical order, so
    /// the same input set always ranks identically.
    pub fn rank(&self, target: &str, candidates: &[String]) -> Vec<MatchCandidate> {
        let normalized_target = normalize(target);
        let mut matches = candidates
            .iter()
            .map(|candidate| MatchCandidate {
                name: candidate.clone(),
                score: jaro_winkler::similarity(
                    normalized_target.chars(),
                    normalize(candidate).chars(),
                ),
            })
            .filter(|candidate| candidate.score >= self.threshold)
            .collect::<Vec<_>>();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.name.len().cmp(&b.name.len()))
                .then_with(|| a.name.cmp(&b.name))
        });
        matches
    }

    /// The sole unattended acceptance case: exactly one candidate clears
    /// the threshold and it also clears the high-confidence bar.
    pub fn unambiguous<'a>(&self, ranked: &'a [MatchCandidate]) -> Option<&'a MatchCandidate> {
        match ranked {
            [only] if only.score >= self.high_confidence => Some(only),
            _ => None,
        }
    }
}

/// Normalize a column name for comparison: lowercase, drop the MIMARKS
/// `*` marker, split on separators, and sort tokens so word order does
/// not affect the score.
fn normalize(name: &str) -> String {
    let mut tokens = name
        .trim()
        .trim_start_matches('*')
        .to_lowercase()
        .replace(['_', '-', '.'], " ")
        .split_whitespace()
        .map(String::from)
        .collect::<Vec<_>>();
    tokens.sort();
    tokens.join(" ")
}
