//! Rater registry: the canonical set of annotators and their column order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CorpusError;
use crate::ticket::{AUTOMATED_RATER_ID, RecordOrigin, Ticket};

/// What kind of annotator a rater is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaterKind {
    /// Automated tagging source. Never human.
    Automated,
    /// Internal annotator from the crowdsourcing sheet.
    Internal,
    /// External microtask worker.
    Microtask,
}

impl RaterKind {
    #[must_use]
    pub const fn is_human(self) -> bool {
        !matches!(self, Self::Automated)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Automated => "automated",
            Self::Internal => "internal",
            Self::Microtask => "microtask",
        }
    }

    /// Kind given to a rater first seen in a record from `origin`.
    #[must_use]
    pub fn default_for(rater_id: &str, origin: RecordOrigin) -> Self {
        if rater_id == AUTOMATED_RATER_ID {
            return Self::Automated;
        }
        match origin {
            RecordOrigin::Microtask => Self::Microtask,
            RecordOrigin::Archive | RecordOrigin::Sheet | RecordOrigin::Snapshot => Self::Internal,
        }
    }
}

/// One annotator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rater {
    pub id: String,
    pub kind: RaterKind,
    pub is_expert: bool,
}

impl Rater {
    #[must_use]
    pub const fn is_human(&self) -> bool {
        self.kind.is_human()
    }

    #[must_use]
    pub const fn is_automated(&self) -> bool {
        matches!(self.kind, RaterKind::Automated)
    }
}

/// Registry of every rater seen across all sources.
///
/// Ordering is insertion order and only changes when a new rater is
/// registered, so tabular exports of the same snapshot keep their columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RaterRegistry {
    raters: Vec<Rater>,
    index: HashMap<String, usize>,
}

impl RaterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `rater_id`, or confirm an existing registration.
    ///
    /// # Errors
    ///
    /// [`CorpusError::RaterConflict`] when the id is already registered with a
    /// different kind or expert flag, or when the reserved automated id is
    /// registered as human.
    pub fn register(
        &mut self,
        rater_id: &str,
        kind: RaterKind,
        is_expert: bool,
    ) -> Result<&Rater, CorpusError> {
        if rater_id == AUTOMATED_RATER_ID && kind != RaterKind::Automated {
            return Err(CorpusError::RaterConflict {
                rater_id: rater_id.to_string(),
                detail: format!("id is reserved for the automated source, got {}", kind.as_str()),
            });
        }

        if let Some(&slot) = self.index.get(rater_id) {
            let existing = &self.raters[slot];
            if existing.kind != kind || existing.is_expert != is_expert {
                return Err(CorpusError::RaterConflict {
                    rater_id: rater_id.to_string(),
                    detail: format!(
                        "registered as {} (expert={}), now {} (expert={})",
                        existing.kind.as_str(),
                        existing.is_expert,
                        kind.as_str(),
                        is_expert
                    ),
                });
            }
            return Ok(existing);
        }

        let slot = self.raters.len();
        self.raters.push(Rater {
            id: rater_id.to_string(),
            kind,
            is_expert,
        });
        self.index.insert(rater_id.to_string(), slot);
        tracing::debug!(rater_id, kind = kind.as_str(), is_expert, "registered rater");
        Ok(&self.raters[slot])
    }

    /// Register `rater_id` with origin defaults if it is unknown.
    ///
    /// Returns `true` when the rater was newly admitted.
    pub fn admit(&mut self, rater_id: &str, origin: RecordOrigin) -> bool {
        if let Some(existing) = self.get(rater_id) {
            if origin != RecordOrigin::Snapshot
                && existing.kind != RaterKind::default_for(rater_id, origin)
            {
                tracing::warn!(
                    rater_id,
                    registered = existing.kind.as_str(),
                    ?origin,
                    "record files tags under a rater of another kind"
                );
            }
            return false;
        }
        let kind = RaterKind::default_for(rater_id, origin);
        // Unknown ids cannot conflict, and the default kind for the reserved id
        // is always automated.
        self.register(rater_id, kind, false).is_ok()
    }

    /// Check that tags from a record of `origin` may be filed under
    /// `rater_id`. A microtask worker must not share an id with an internal
    /// annotator or the automated source.
    ///
    /// # Errors
    ///
    /// [`CorpusError::RaterConflict`] when the id is reserved for, or already
    /// registered as, a different kind of rater.
    pub fn check_admission(
        &self,
        rater_id: &str,
        origin: RecordOrigin,
    ) -> Result<(), CorpusError> {
        let wanted = match origin {
            RecordOrigin::Snapshot => return Ok(()),
            RecordOrigin::Microtask => RaterKind::Microtask,
            RecordOrigin::Archive | RecordOrigin::Sheet => {
                RaterKind::default_for(rater_id, origin)
            }
        };
        if rater_id == AUTOMATED_RATER_ID && wanted != RaterKind::Automated {
            return Err(CorpusError::RaterConflict {
                rater_id: rater_id.to_string(),
                detail: format!(
                    "id is reserved for the automated source, got {}",
                    wanted.as_str()
                ),
            });
        }
        match self.get(rater_id) {
            Some(existing) if existing.kind != wanted => Err(CorpusError::RaterConflict {
                rater_id: rater_id.to_string(),
                detail: format!(
                    "registered as {}, now seen as {}",
                    existing.kind.as_str(),
                    wanted.as_str()
                ),
            }),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn get(&self, rater_id: &str) -> Option<&Rater> {
        self.index.get(rater_id).map(|&slot| &self.raters[slot])
    }

    #[must_use]
    pub fn contains(&self, rater_id: &str) -> bool {
        self.index.contains_key(rater_id)
    }

    /// All rater ids in stable registration order.
    #[must_use]
    pub fn ordered_ids(&self) -> Vec<&str> {
        self.raters.iter().map(|rater| rater.id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rater> {
        self.raters.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.raters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raters.is_empty()
    }

    /// True iff the rater is human and put at least one tag on `ticket`.
    #[must_use]
    pub fn is_human_annotation(&self, rater_id: &str, ticket: &Ticket) -> bool {
        if rater_id == AUTOMATED_RATER_ID {
            return false;
        }
        let human = self.get(rater_id).is_some_and(Rater::is_human);
        human && ticket.tags_for(rater_id).is_some_and(|tags| !tags.is_empty())
    }

    /// Number of distinct human raters with at least one tag on `ticket`.
    #[must_use]
    pub fn human_annotation_count(&self, ticket: &Ticket) -> usize {
        ticket
            .tags
            .keys()
            .filter(|rater_id| self.is_human_annotation(rater_id, ticket))
            .count()
    }
}
