//! Identity resolution: folding incoming records into the ticket store.
//!
//! Two policies, chosen by the caller per source:
//!
//! - [`ResolvePolicy::FirstById`]: exact-id dedup. The first record with an
//!   id wins and later records with that id are discarded unchanged. Used for
//!   paginated archive fetches, where later pages must never override
//!   already-enriched records.
//! - [`ResolvePolicy::MergeByFingerprint`]: records are matched on their
//!   normalized title + content. On a match each incoming rater's tag list is
//!   merged into the existing ticket, keeping the longer list. Used for
//!   microtask results, which arrive without the canonical id.
//!
//! Fingerprint collisions between genuinely different tickets merge their tag
//! maps. That false-merge risk is accepted, not reported as an error.

use std::collections::HashMap;
use std::collections::btree_map::Entry;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CorpusError;
use crate::normalize::{NormalizeOptions, normalize_with};
use crate::store::TicketStore;
use crate::ticket::{IncomingRecord, RawRecord, RecordOrigin, TagMap, Ticket};

/// Normalized title followed by normalized content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn of(title: &str, content: &str, options: NormalizeOptions) -> Self {
        let mut text = normalize_with(title, options);
        text.push_str(&normalize_with(content, options));
        Self(text)
    }

    #[must_use]
    pub fn of_ticket(ticket: &Ticket, options: NormalizeOptions) -> Self {
        Self::of(&ticket.title, &ticket.content, options)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fixed-size key for the lookup index.
    #[must_use]
    pub fn digest(&self) -> blake3::Hash {
        blake3::hash(self.0.as_bytes())
    }
}

/// Fingerprint → store slot of the first ticket carrying it.
#[derive(Debug, Clone)]
pub struct FingerprintIndex {
    options: NormalizeOptions,
    slots: HashMap<blake3::Hash, usize>,
}

impl FingerprintIndex {
    #[must_use]
    pub fn new(options: NormalizeOptions) -> Self {
        Self {
            options,
            slots: HashMap::new(),
        }
    }

    /// Index every ticket already in `store`. When several tickets share a
    /// fingerprint the earliest one is the merge target.
    #[must_use]
    pub fn build(store: &TicketStore, options: NormalizeOptions) -> Self {
        let digests: Vec<blake3::Hash> = store
            .tickets()
            .par_iter()
            .map(|ticket| Fingerprint::of_ticket(ticket, options).digest())
            .collect();

        let mut index = Self::new(options);
        for (slot, digest) in digests.into_iter().enumerate() {
            index.slots.entry(digest).or_insert(slot);
        }
        index
    }

    #[must_use]
    pub const fn options(&self) -> NormalizeOptions {
        self.options
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn lookup(&self, fingerprint: &Fingerprint) -> Option<usize> {
        self.slots.get(&fingerprint.digest()).copied()
    }

    fn remember(&mut self, fingerprint: &Fingerprint, slot: usize) {
        self.slots.entry(fingerprint.digest()).or_insert(slot);
    }
}

/// How a merge target was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Fingerprint,
    /// No fingerprint match, but the record's own id is already in the store.
    TicketId,
}

/// What a tag-map merge changed on the existing ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub into: String,
    pub matched_by: MatchKind,
    /// Raters new to the ticket.
    pub lists_added: usize,
    /// Raters whose list was replaced by a longer one.
    pub lists_replaced: usize,
    /// Raters whose existing list was kept.
    pub lists_kept: usize,
    /// Kept lists that tied in length but differed in content.
    pub ambiguous_ties: usize,
}

/// Result of resolving one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Inserted,
    /// Duplicate id under first-occurrence-wins; the record was dropped.
    Discarded,
    Merged(MergeOutcome),
}

/// What carrying one earlier ticket into a rebuilt store changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Carried {
    Ticket { slot: usize },
    TagLists(usize),
}

impl TicketStore {
    /// Resolve `record` by exact ticket id, first occurrence wins.
    ///
    /// Raters named by the record are admitted to the registry either way.
    pub fn resolve_by_id(&mut self, record: IncomingRecord) -> Resolution {
        self.admit_raters(&record);

        if self.contains(&record.ticket_id) {
            debug!(ticket_id = %record.ticket_id, "duplicate ticket id discarded");
            return Resolution::Discarded;
        }

        self.insert_new(record.into_ticket());
        Resolution::Inserted
    }

    /// Resolve `record` by content fingerprint, merging tag maps on a match.
    pub fn resolve_by_fingerprint(
        &mut self,
        record: IncomingRecord,
        index: &mut FingerprintIndex,
    ) -> Resolution {
        self.admit_raters(&record);

        let fingerprint = Fingerprint::of(&record.title, &record.content, index.options());
        let target = index
            .lookup(&fingerprint)
            .map(|slot| (slot, MatchKind::Fingerprint))
            .or_else(|| {
                self.slot_of(&record.ticket_id)
                    .map(|slot| (slot, MatchKind::TicketId))
            });

        let Some((slot, matched_by)) = target else {
            let slot = self.insert_new(record.into_ticket());
            index.remember(&fingerprint, slot);
            return Resolution::Inserted;
        };

        let existing = self.ticket_at_mut(slot);
        let mut outcome = MergeOutcome {
            into: existing.ticket_id.clone(),
            matched_by,
            lists_added: 0,
            lists_replaced: 0,
            lists_kept: 0,
            ambiguous_ties: 0,
        };
        debug!(
            incoming = %record.ticket_id,
            into = %outcome.into,
            ?matched_by,
            "merging tag map"
        );
        merge_tag_maps(&mut existing.tags, record.tags, &mut outcome);
        Resolution::Merged(outcome)
    }

    /// Carry `ticket` from an earlier snapshot into a store rebuilt from the
    /// sources. An unknown ticket is appended whole. A known ticket keeps its
    /// rebuilt fields and lists and regains the rater lists it lacks.
    pub(crate) fn carry_forward(&mut self, ticket: Ticket) -> Carried {
        let raters = self.raters_mut();
        for rater_id in ticket.tags.keys() {
            raters.admit(rater_id, RecordOrigin::Snapshot);
        }

        let Some(slot) = self.slot_of(&ticket.ticket_id) else {
            debug!(ticket_id = %ticket.ticket_id, "carried ticket missing from sources");
            return Carried::Ticket {
                slot: self.insert_new(ticket),
            };
        };

        let existing = &mut self.ticket_at_mut(slot).tags;
        let mut restored = 0;
        for (rater_id, tags) in ticket.tags {
            if let Entry::Vacant(entry) = existing.entry(rater_id) {
                entry.insert(tags);
                restored += 1;
            }
        }
        Carried::TagLists(restored)
    }

    fn admit_raters(&mut self, record: &IncomingRecord) {
        let raters = self.raters_mut();
        for rater_id in record.tags.keys() {
            raters.admit(rater_id, record.origin);
        }
    }
}

/// Fold `incoming` into `existing`: new raters are added, shared raters keep
/// the longer list, ties keep the existing list.
fn merge_tag_maps(existing: &mut TagMap, incoming: TagMap, outcome: &mut MergeOutcome) {
    for (rater_id, tags) in incoming {
        match existing.entry(rater_id) {
            Entry::Vacant(slot) => {
                slot.insert(tags);
                outcome.lists_added += 1;
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                if tags.len() > current.len() {
                    slot.insert(tags);
                    outcome.lists_replaced += 1;
                } else {
                    if tags.len() == current.len() && &tags != current {
                        warn!(
                            ticket_id = %outcome.into,
                            rater_id = %slot.key(),
                            kept = ?current,
                            dropped = ?tags,
                            "ambiguous tie between equal-length annotations, keeping first seen"
                        );
                        outcome.ambiguous_ties += 1;
                    }
                    outcome.lists_kept += 1;
                }
            }
        }
    }
}

/// Resolution policy for one consolidation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePolicy {
    FirstById,
    MergeByFingerprint(NormalizeOptions),
}

/// One record skipped during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRecordReport {
    pub locator: String,
    pub reason: String,
}

/// Counters accumulated over one consolidation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationStats {
    pub records_seen: usize,
    pub inserted: usize,
    pub duplicates_discarded: usize,
    pub fingerprint_merges: usize,
    pub id_merges: usize,
    pub tag_lists_added: usize,
    pub tag_lists_replaced: usize,
    pub ambiguous_ties: usize,
    pub raters_admitted: usize,
    /// Tickets only an earlier snapshot held, carried into a rebuild.
    pub carried_tickets: usize,
    /// Rater lists only an earlier snapshot held, restored onto rebuilt tickets.
    pub carried_tag_lists: usize,
    pub malformed: usize,
    pub malformed_records: Vec<MalformedRecordReport>,
}

impl ConsolidationStats {
    fn tally(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Inserted => self.inserted += 1,
            Resolution::Discarded => self.duplicates_discarded += 1,
            Resolution::Merged(outcome) => {
                match outcome.matched_by {
                    MatchKind::Fingerprint => self.fingerprint_merges += 1,
                    MatchKind::TicketId => self.id_merges += 1,
                }
                self.tag_lists_added += outcome.lists_added;
                self.tag_lists_replaced += outcome.lists_replaced;
                self.ambiguous_ties += outcome.ambiguous_ties;
            }
        }
    }
}

/// Drives one consolidation run: validates raw records, resolves them under
/// a single policy, and accumulates statistics. A malformed record is counted
/// and skipped; it never aborts the run.
#[derive(Debug)]
pub struct Consolidator {
    store: TicketStore,
    index: Option<FingerprintIndex>,
    stats: ConsolidationStats,
}

impl Consolidator {
    #[must_use]
    pub fn new(store: TicketStore, policy: ResolvePolicy) -> Self {
        let index = match policy {
            ResolvePolicy::FirstById => None,
            ResolvePolicy::MergeByFingerprint(options) => {
                Some(FingerprintIndex::build(&store, options))
            }
        };
        Self {
            store,
            index,
            stats: ConsolidationStats::default(),
        }
    }

    /// Validate and resolve one raw record.
    pub fn ingest(&mut self, raw: RawRecord) -> Option<Resolution> {
        match raw.validate() {
            Ok(record) => Some(self.ingest_valid(record)),
            Err(CorpusError::MalformedRecord { locator, reason }) => {
                self.reject(locator, reason);
                None
            }
            Err(other) => {
                self.reject(String::from("<unknown>"), other.to_string());
                None
            }
        }
    }

    /// Resolve an entry from a source reader that may already have rejected
    /// it. Recoverable errors are counted; anything else stops the run.
    ///
    /// # Errors
    ///
    /// Returns `entry`'s error when it is not recoverable.
    pub fn ingest_entry(
        &mut self,
        entry: Result<RawRecord, CorpusError>,
    ) -> Result<Option<Resolution>, CorpusError> {
        match entry {
            Ok(raw) => Ok(self.ingest(raw)),
            Err(CorpusError::MalformedRecord { locator, reason }) => {
                self.reject(locator, reason);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn ingest_all(&mut self, records: impl IntoIterator<Item = RawRecord>) {
        for raw in records {
            self.ingest(raw);
        }
    }

    /// Resolve an already-validated record.
    pub fn ingest_valid(&mut self, record: IncomingRecord) -> Resolution {
        self.stats.records_seen += 1;
        let raters_before = self.store.raters().len();

        let resolution = match self.index.as_mut() {
            Some(index) => self.store.resolve_by_fingerprint(record, index),
            None => self.store.resolve_by_id(record),
        };

        self.stats.raters_admitted += self.store.raters().len() - raters_before;
        self.stats.tally(&resolution);
        resolution
    }

    /// Carry a ticket from the snapshot this run rebuilds. Sources resolved
    /// earlier in the run take precedence over it.
    pub fn carry_forward(&mut self, ticket: Ticket) {
        let raters_before = self.store.raters().len();
        match self.store.carry_forward(ticket) {
            Carried::Ticket { slot } => {
                if let Some(index) = self.index.as_mut() {
                    let fingerprint =
                        Fingerprint::of_ticket(&self.store.tickets()[slot], index.options());
                    index.remember(&fingerprint, slot);
                }
                self.stats.carried_tickets += 1;
            }
            Carried::TagLists(restored) => self.stats.carried_tag_lists += restored,
        }
        self.stats.raters_admitted += self.store.raters().len() - raters_before;
    }

    /// Count a record that could not even be read into a [`RawRecord`].
    pub fn reject(&mut self, locator: impl Into<String>, reason: impl Into<String>) {
        let report = MalformedRecordReport {
            locator: locator.into(),
            reason: reason.into(),
        };
        warn!(locator = %report.locator, reason = %report.reason, "skipping malformed record");
        self.stats.records_seen += 1;
        self.stats.malformed += 1;
        self.stats.malformed_records.push(report);
    }

    #[must_use]
    pub const fn store(&self) -> &TicketStore {
        &self.store
    }

    #[must_use]
    pub const fn stats(&self) -> &ConsolidationStats {
        &self.stats
    }

    /// Hand out the statistics gathered so far and start counting afresh.
    pub fn take_stats(&mut self) -> ConsolidationStats {
        std::mem::take(&mut self.stats)
    }

    #[must_use]
    pub fn finish(self) -> (TicketStore, ConsolidationStats) {
        info!(
            seen = self.stats.records_seen,
            inserted = self.stats.inserted,
            discarded = self.stats.duplicates_discarded,
            merged = self.stats.fingerprint_merges + self.stats.id_merges,
            malformed = self.stats.malformed,
            "consolidation finished"
        );
        (self.store, self.stats)
    }
}

/// Rebuild `store` by folding its own tickets through the fingerprint
/// policy, collapsing tickets that already share a fingerprint.
///
/// The registry (and so the column order) is carried over unchanged.
#[must_use]
pub fn refold_by_fingerprint(store: TicketStore, options: NormalizeOptions) -> Consolidator {
    let (tickets, raters) = store.into_parts();
    let mut consolidator = Consolidator::new(
        TicketStore::with_registry(raters),
        ResolvePolicy::MergeByFingerprint(options),
    );
    for ticket in tickets {
        consolidator.ingest_valid(IncomingRecord::from(ticket));
    }
    consolidator
}
