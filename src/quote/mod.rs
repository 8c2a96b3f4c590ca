//! Candidate routes for a single swap request.

use crate::models::{QuoteCandidate, SwapRequest};
use async_trait::async_trait;

pub mod client;

pub use client::HttpQuoteClient;

/// Source of ranked candidates for a request.
///
/// Failures are not surfaced: an unreachable or misbehaving quoting service
/// simply yields an empty set.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch(&self, request: &SwapRequest) -> QuoteCandidateSet;
}

/// Ranked candidates in trial order plus a cursor over the untried tail.
#[derive(Debug, Clone, Default)]
pub struct QuoteCandidateSet {
    candidates: Vec<QuoteCandidate>,
    cursor: usize,
}

impl QuoteCandidateSet {
    pub fn new(candidates: Vec<QuoteCandidate>) -> Self {
        Self {
            candidates,
            cursor: 0,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_next(&self) -> bool {
        self.cursor < self.candidates.len()
    }

    /// Next untried candidate with its rank, or `None` once exhausted.
    pub fn take_next(&mut self) -> Option<(usize, QuoteCandidate)> {
        let candidate = self.candidates.get(self.cursor)?.clone();
        let index = self.cursor;
        self.cursor += 1;
        Some((index, candidate))
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.candidates.len() - self.cursor
    }

    pub fn candidates(&self) -> &[QuoteCandidate] {
        &self.candidates
    }
}
