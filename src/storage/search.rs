// src/storage/search.rs

//! Partial-text matching shared by every [`VideoStore`](super::VideoStore)
//! backend.
//!
//! A query is split on whitespace into lowercase tokens. A record matches when
//! each token is a substring of its title or its description, so
//! `"tea how"` finds `"How to make tea?"`. Matches are ranked by how many
//! tokens hit the title, then by recency, then by id.

use crate::models::{StoreSlice, VideoRecord};
use std::cmp::Reverse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerms {
    tokens: Vec<String>,
}

impl SearchTerms {
    /// `None` for blank input.
    pub fn parse(text: &str) -> Option<Self> {
        let tokens: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
        if tokens.is_empty() {
            None
        } else {
            Some(Self { tokens })
        }
    }

    /// Number of tokens found in the title, or `None` if the record does not match.
    pub fn score(&self, record: &VideoRecord) -> Option<usize> {
        let title = record.title.to_lowercase();
        let description = record.description.to_lowercase();
        let mut title_hits = 0;
        for token in &self.tokens {
            if title.contains(token.as_str()) {
                title_hits += 1;
            } else if !description.contains(token.as_str()) {
                return None;
            }
        }
        Some(title_hits)
    }

    pub fn matches(&self, record: &VideoRecord) -> bool {
        self.score(record).is_some()
    }

    /// Rank candidates and cut the requested window.
    pub fn select<'a, I>(&self, candidates: I, offset: usize, limit: usize) -> StoreSlice
    where
        I: IntoIterator<Item = &'a VideoRecord>,
    {
        let mut ranked: Vec<(usize, &VideoRecord)> = candidates
            .into_iter()
            .filter_map(|record| self.score(record).map(|hits| (hits, record)))
            .collect();

        ranked.sort_by(|(a_hits, a), (b_hits, b)| {
            (Reverse(a_hits), Reverse(a.published_at), &a.video_id).cmp(&(
                Reverse(b_hits),
                Reverse(b.published_at),
                &b.video_id,
            ))
        });

        let total = ranked.len();
        let items = ranked
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect();
        StoreSlice { items, total }
    }
}
