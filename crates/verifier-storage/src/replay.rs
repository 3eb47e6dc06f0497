//! Causal replay
//!
//! [`SequentialFinder`] walks a record set frontier by frontier: first the
//! records whose previous id equals the start cursor (or every root when
//! starting from nothing), then the records pointing at that frontier, and
//! so on. A record is therefore never yielded before its predecessor.
//!
//! ```text
//!   a1 ◄── a2 ◄── a3            advance() -> [a1, b1]
//!   b1 ◄── b2                   advance() -> [a2, b2]
//!                               advance() -> [a3]
//!                               advance() -> []   (and forever after)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use verifier_core::{OptimismSignature, SignatureId};

use crate::log::SignatureLog;

/// A set of records that can be replayed in causal order
pub trait ReplaySource {
    /// Records with no previous id, or whose previous id is not in the set,
    /// ordered by id
    fn roots(&self) -> Vec<OptimismSignature>;

    /// Records whose previous id is `id`, ordered by id
    fn children(&self, id: &SignatureId) -> Vec<OptimismSignature>;
}

impl ReplaySource for SignatureLog {
    fn roots(&self) -> Vec<OptimismSignature> {
        self.root_records()
    }

    fn children(&self, id: &SignatureId) -> Vec<OptimismSignature> {
        self.child_records(id)
    }
}

/// In-memory set of untrusted records, e.g. one received exchange page
#[derive(Debug, Default, Clone)]
pub struct CausalBatch {
    records: BTreeMap<SignatureId, OptimismSignature>,
    children: HashMap<SignatureId, Vec<SignatureId>>,
}

impl CausalBatch {
    pub fn new(records: impl IntoIterator<Item = OptimismSignature>) -> Self {
        let records: BTreeMap<_, _> = records.into_iter().map(|r| (r.id, r)).collect();
        let mut children: HashMap<SignatureId, Vec<SignatureId>> = HashMap::new();
        // BTreeMap iteration keeps each child list sorted by id
        for record in records.values() {
            if let Some(prev) = record.previous_id {
                children.entry(prev).or_default().push(record.id);
            }
        }
        Self { records, children }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ReplaySource for CausalBatch {
    fn roots(&self) -> Vec<OptimismSignature> {
        self.records
            .values()
            .filter(|r| {
                r.previous_id
                    .map_or(true, |prev| !self.records.contains_key(&prev))
            })
            .cloned()
            .collect()
    }

    fn children(&self, id: &SignatureId) -> Vec<OptimismSignature> {
        self.children
            .get(id)
            .map(|ids| ids.iter().filter_map(|c| self.records.get(c)).cloned().collect())
            .unwrap_or_default()
    }
}

/// Position of a [`SequentialFinder`]; persist it to resume a replay later
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayCursor {
    /// Nothing yielded yet; `None` starts from the roots
    Start(Option<SignatureId>),
    /// Ids of the most recently yielded frontier
    Frontier(Vec<SignatureId>),
    Exhausted,
}

/// Frontier-by-frontier iterator over a [`ReplaySource`]
pub struct SequentialFinder<'a, S: ReplaySource + ?Sized> {
    source: &'a S,
    cursor: ReplayCursor,
}

impl<'a, S: ReplaySource + ?Sized> SequentialFinder<'a, S> {
    pub fn new(source: &'a S, start: Option<SignatureId>) -> Self {
        Self::resume(source, ReplayCursor::Start(start))
    }

    pub fn resume(source: &'a S, cursor: ReplayCursor) -> Self {
        Self { source, cursor }
    }

    pub fn cursor(&self) -> &ReplayCursor {
        &self.cursor
    }

    /// Next frontier sorted by id; empty once exhausted
    pub fn advance(&mut self) -> Vec<OptimismSignature> {
        let mut level = match &self.cursor {
            ReplayCursor::Start(None) => self.source.roots(),
            ReplayCursor::Start(Some(id)) => self.source.children(id),
            ReplayCursor::Frontier(ids) => ids
                .iter()
                .flat_map(|id| self.source.children(id))
                .collect(),
            ReplayCursor::Exhausted => return Vec::new(),
        };
        level.sort_by_key(|r| r.id);
        level.dedup_by_key(|r| r.id);

        self.cursor = if level.is_empty() {
            ReplayCursor::Exhausted
        } else {
            ReplayCursor::Frontier(level.iter().map(|r| r.id).collect())
        };
        level
    }
}

impl<S: ReplaySource + ?Sized> Iterator for SequentialFinder<'_, S> {
    type Item = Vec<OptimismSignature>;

    fn next(&mut self) -> Option<Self::Item> {
        let level = self.advance();
        (!level.is_empty()).then_some(level)
    }
}
