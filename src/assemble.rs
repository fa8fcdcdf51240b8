//! Final answer assembly.

use std::collections::HashSet;

use crate::enrich::EnrichedCandidate;
use crate::search::Candidate;

/// Returns at most `limit` texts in rank order, one per fingerprint.
pub fn assemble(enriched: Vec<EnrichedCandidate>, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    enriched
        .into_iter()
        .filter(|item| seen.insert(item.candidate.fingerprint.clone()))
        .take(limit)
        .map(|item| item.text)
        .collect()
}

/// Drops later candidates whose fingerprint already appeared, keeping order.
pub fn distinct(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.fingerprint.clone()))
        .collect()
}
