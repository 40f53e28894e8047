//! Deterministic batch selection for a new annotation round.
//!
//! Every ticket already annotated by at least two distinct human raters is
//! selected first. The rest of the batch is drawn from recently created
//! tickets: the candidate pool is built once in snapshot order, shuffled with
//! a seeded RNG, and the needed prefix is taken. The same snapshot, target,
//! window and seed always yield the same selection.

use std::collections::HashSet;

use chrono::TimeDelta;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::CorpusError;
use crate::store::TicketStore;

/// Human raters needed before a ticket is always re-sampled.
pub const PRIORITY_HUMAN_RATERS: usize = 2;

/// Parameters of one [`select_batch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRequest {
    pub target_count: usize,
    /// Only tickets created within this window before `now` are drawn.
    pub recency_window: TimeDelta,
    pub seed: u64,
    /// Reference time, seconds since the epoch.
    pub now: i64,
}

impl SampleRequest {
    #[must_use]
    pub fn new(target_count: usize, window_days: u32, seed: u64, now: i64) -> Self {
        Self {
            target_count,
            recency_window: TimeDelta::seconds(i64::from(window_days) * 86_400),
            seed,
            now,
        }
    }

    /// Tickets created strictly after this timestamp are eligible for the draw.
    #[must_use]
    pub fn cutoff_timestamp(&self) -> i64 {
        self.now.saturating_sub(self.recency_window.num_seconds())
    }
}

/// Result of [`select_batch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSelection {
    /// Selected ids in snapshot order.
    pub ticket_ids: Vec<String>,
    /// Tickets taken because they already carry two or more human annotations.
    pub priority_count: usize,
    /// Tickets drawn from the recency pool.
    pub drawn_count: usize,
    /// Size of the recency pool before drawing.
    pub pool_size: usize,
    pub cutoff_timestamp: i64,
}

impl BatchSelection {
    #[must_use]
    pub fn len(&self) -> usize {
        self.ticket_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticket_ids.is_empty()
    }
}

/// Select a batch of ticket ids for annotation.
///
/// Priority tickets are all selected even when they alone exceed
/// `target_count`.
///
/// # Errors
///
/// [`CorpusError::InsufficientCandidates`] when priority tickets plus the
/// whole recency pool still fall short of `target_count`.
pub fn select_batch(
    store: &TicketStore,
    request: &SampleRequest,
) -> Result<BatchSelection, CorpusError> {
    let raters = store.raters();
    let cutoff = request.cutoff_timestamp();

    let mut selected: HashSet<&str> = store
        .tickets()
        .iter()
        .filter(|ticket| raters.human_annotation_count(ticket) >= PRIORITY_HUMAN_RATERS)
        .map(|ticket| ticket.ticket_id.as_str())
        .collect();
    let priority_count = selected.len();

    let mut pool: Vec<&str> = store
        .tickets()
        .iter()
        .filter(|ticket| ticket.timestamp > cutoff && !selected.contains(ticket.ticket_id.as_str()))
        .map(|ticket| ticket.ticket_id.as_str())
        .collect();
    let pool_size = pool.len();

    let needed = request.target_count.saturating_sub(priority_count);
    if needed > pool_size {
        return Err(CorpusError::InsufficientCandidates {
            requested: request.target_count,
            available: priority_count + pool_size,
        });
    }

    let mut rng = StdRng::seed_from_u64(request.seed);
    pool.shuffle(&mut rng);
    selected.extend(pool.iter().take(needed).copied());
    debug!(priority_count, pool_size, needed, cutoff, "drew batch from recency pool");

    let ticket_ids: Vec<String> = store
        .tickets()
        .iter()
        .filter(|ticket| selected.contains(ticket.ticket_id.as_str()))
        .map(|ticket| ticket.ticket_id.clone())
        .collect();

    info!(
        selected = ticket_ids.len(),
        priority_count,
        drawn = needed,
        seed = request.seed,
        "selected annotation batch"
    );

    Ok(BatchSelection {
        ticket_ids,
        priority_count,
        drawn_count: needed,
        pool_size,
        cutoff_timestamp: cutoff,
    })
}
