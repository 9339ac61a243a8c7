//! Batch release over a stored result list.
//!
//! Results are fetched once per search and then handed out `batch_size` at a
//! time. Releasing never re-queries the catalog.

use serde::{Deserialize, Serialize};

use crate::domain::property::Property;

pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    all_results: Vec<Property>,
    shown_count: usize,
    batch_size: usize,
    current_batch_start: Option<usize>,
}

/// A slice of results handed to the user in one reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBatch {
    pub properties: Vec<Property>,
    /// 1-based position of the first property within the full result list.
    pub first_position: usize,
    pub total: usize,
    pub remaining: usize,
}

impl PropertyBatch {
    pub fn last_position(&self) -> usize {
        self.first_position + self.properties.len().saturating_sub(1)
    }

    pub fn is_final(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchRelease {
    Batch(PropertyBatch),
    /// Every stored result has already been shown.
    Exhausted { total: usize },
    /// No search results are stored.
    Empty,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl Pagination {
    pub fn new(batch_size: usize) -> Self {
        Self {
            all_results: Vec::new(),
            shown_count: 0,
            batch_size: batch_size.max(1),
            current_batch_start: None,
        }
    }

    /// Replaces any previous results and resets the cursor.
    pub fn store(&mut self, results: Vec<Property>) {
        self.all_results = results;
        self.shown_count = 0;
        self.current_batch_start = None;
    }

    pub fn clear(&mut self) {
        self.store(Vec::new());
    }

    pub fn next_batch(&mut self) -> BatchRelease {
        if self.all_results.is_empty() {
            return BatchRelease::Empty;
        }
        if self.is_exhausted() {
            return BatchRelease::Exhausted { total: self.all_results.len() };
        }

        let start = self.shown_count;
        let end = (start + self.batch_size).min(self.all_results.len());
        self.shown_count = end;
        self.current_batch_start = Some(start);

        BatchRelease::Batch(PropertyBatch {
            properties: self.all_results[start..end].to_vec(),
            first_position: start + 1,
            total: self.all_results.len(),
            remaining: self.remaining(),
        })
    }

    /// The most recently released batch, empty when nothing has been shown.
    pub fn current_batch(&self) -> &[Property] {
        match self.current_batch_start {
            Some(start) => &self.all_results[start..self.shown_count],
            None => &[],
        }
    }

    /// Resolves a 1-based ordinal against the current batch.
    pub fn resolve_ordinal(&self, ordinal: usize) -> Option<&Property> {
        ordinal.checked_sub(1).and_then(|index| self.current_batch().get(index))
    }

    pub fn total(&self) -> usize {
        self.all_results.len()
    }

    pub fn shown_count(&self) -> usize {
        self.shown_count
    }

    pub fn remaining(&self) -> usize {
        self.all_results.len() - self.shown_count
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn has_results(&self) -> bool {
        !self.all_results.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        !self.all_results.is_empty() && self.shown_count == self.all_results.len()
    }
}
