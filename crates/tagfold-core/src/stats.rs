//! Descriptive statistics over a snapshot.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::normalize::NormalizeOptions;
use crate::rater::RaterKind;
use crate::resolve::Fingerprint;
use crate::snapshot::CorpusSnapshot;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RaterCounts {
    pub automated: usize,
    pub internal: usize,
    pub microtask: usize,
    pub experts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub created_timestamp: i64,
    pub last_updated_timestamp: i64,
    pub tickets: usize,
    pub raters: RaterCounts,
    /// (ticket, rater) pairs with at least one tag.
    pub annotations: usize,
    pub human_annotations: usize,
    pub tickets_with_human_annotation: usize,
    /// Tickets the sampler always selects.
    pub tickets_with_two_human_annotations: usize,
    /// Fingerprints shared by more than one ticket.
    pub duplicate_groups: usize,
    pub tickets_in_duplicate_groups: usize,
}

/// Summarize `snapshot`. Fingerprints use `fingerprint` options.
#[must_use]
pub fn corpus_stats(snapshot: &CorpusSnapshot, fingerprint: NormalizeOptions) -> CorpusStats {
    let raters = snapshot.raters();
    let mut stats = CorpusStats {
        created_timestamp: snapshot.created_timestamp,
        last_updated_timestamp: snapshot.last_updated_timestamp,
        tickets: snapshot.tickets().len(),
        ..CorpusStats::default()
    };

    for rater in raters.iter() {
        match rater.kind {
            RaterKind::Automated => stats.raters.automated += 1,
            RaterKind::Internal => stats.raters.internal += 1,
            RaterKind::Microtask => stats.raters.microtask += 1,
        }
        if rater.is_expert {
            stats.raters.experts += 1;
        }
    }

    for ticket in snapshot.tickets() {
        stats.annotations += ticket.tags.values().filter(|tags| !tags.is_empty()).count();
        let human = raters.human_annotation_count(ticket);
        stats.human_annotations += human;
        if human >= 1 {
            stats.tickets_with_human_annotation += 1;
        }
        if human >= 2 {
            stats.tickets_with_two_human_annotations += 1;
        }
    }

    let digests: Vec<blake3::Hash> = snapshot
        .tickets()
        .par_iter()
        .map(|ticket| Fingerprint::of_ticket(ticket, fingerprint).digest())
        .collect();
    let mut groups: HashMap<blake3::Hash, usize> = HashMap::with_capacity(digests.len());
    for digest in digests {
        *groups.entry(digest).or_default() += 1;
    }
    for size in groups.values().filter(|size| **size > 1) {
        stats.duplicate_groups += 1;
        stats.tickets_in_duplicate_groups += size;
    }

    stats
}
