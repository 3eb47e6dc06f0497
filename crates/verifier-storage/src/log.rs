//! Attestation log
//!
//! An arena of records keyed by [`SignatureId`] with secondary indices:
//!
//! ```text
//!   records   : id            -> record          (ordered, the logical clock)
//!   by_tuple  : (signer, scc, batch_index) -> id
//!   by_signer : signer        -> {id}            (ordered)
//!   children  : previous_id   -> {id}
//!   tips      : signer        -> id              (chain head, O(1))
//! ```
//!
//! Every mutation takes the write lock once, checks the tuple and tip,
//! persists through the backend and then updates the indices, so concurrent
//! savers for the same signer can never fork its chain.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use verifier_core::{
    Address, OptimismScc, OptimismSignature, SignatureId, Signer, TupleKey, H256,
};

use crate::backend::{Backend, MemoryBackend};
use crate::error::{LogError, Result};

/// How a newly created record is linked into its signer's chain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Link {
    /// Link to whatever the current tip is (local production)
    Auto,
    /// Use this previous id verbatim; it must equal the current tip
    Explicit(Option<SignatureId>),
}

/// Input to [`SignatureLog::save`]
#[derive(Clone, Debug)]
pub struct NewSignature {
    /// Mint a fresh id when `None`
    pub id: Option<SignatureId>,
    pub link: Link,
    pub signer: Address,
    pub scc: Address,
    pub batch_index: u64,
    pub batch_root: H256,
    pub batch_size: u64,
    pub prev_total_elements: u64,
    pub extra_data: Vec<u8>,
    pub approved: bool,
    pub signature: Vec<u8>,
}

impl NewSignature {
    /// Apply a record received from a peer, keeping its id and previous id
    pub fn from_remote(record: OptimismSignature) -> Self {
        Self {
            id: Some(record.id),
            link: Link::Explicit(record.previous_id),
            signer: record.signer,
            scc: record.scc,
            batch_index: record.batch_index,
            batch_root: record.batch_root,
            batch_size: record.batch_size,
            prev_total_elements: record.prev_total_elements,
            extra_data: record.extra_data,
            approved: record.approved,
            signature: record.signature,
        }
    }

    pub fn tuple(&self) -> TupleKey {
        TupleKey {
            signer: self.signer,
            scc: self.scc,
            batch_index: self.batch_index,
        }
    }

    fn into_record(self, id: SignatureId, previous_id: Option<SignatureId>) -> OptimismSignature {
        OptimismSignature {
            id,
            previous_id,
            signer: self.signer,
            scc: self.scc,
            batch_index: self.batch_index,
            batch_root: self.batch_root,
            batch_size: self.batch_size,
            prev_total_elements: self.prev_total_elements,
            extra_data: self.extra_data,
            approved: self.approved,
            signature: self.signature,
        }
    }
}

/// Filter for [`SignatureLog::find`]; results are ordered by id ascending
#[derive(Clone, Debug, Default)]
pub struct SignatureQuery {
    /// Exclusive lower bound on id
    pub id_after: Option<SignatureId>,
    pub signer: Option<Address>,
    pub scc: Option<Address>,
    pub batch_index: Option<u64>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SignatureQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_after(mut self, id: Option<SignatureId>) -> Self {
        self.id_after = id;
        self
    }

    pub fn signer(mut self, signer: Address) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn scc(mut self, scc: Address) -> Self {
        self.scc = Some(scc);
        self
    }

    pub fn batch_index(mut self, index: u64) -> Self {
        self.batch_index = Some(index);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

#[derive(Default)]
struct LogState {
    records: BTreeMap<SignatureId, OptimismSignature>,
    by_tuple: HashMap<TupleKey, SignatureId>,
    by_signer: HashMap<Address, BTreeSet<SignatureId>>,
    children: HashMap<SignatureId, BTreeSet<SignatureId>>,
    tips: BTreeMap<Address, SignatureId>,
    signers: BTreeMap<Address, Signer>,
    sccs: BTreeMap<Address, OptimismScc>,
}

impl LogState {
    fn index(&mut self, record: OptimismSignature) {
        let id = record.id;
        self.by_tuple.insert(record.tuple(), id);
        self.by_signer.entry(record.signer).or_default().insert(id);
        if let Some(prev) = record.previous_id {
            self.children.entry(prev).or_default().insert(id);
        }
        self.records.insert(id, record);
    }

    fn unindex(&mut self, id: SignatureId) -> Option<OptimismSignature> {
        let record = self.records.remove(&id)?;
        if self.by_tuple.get(&record.tuple()) == Some(&id) {
            self.by_tuple.remove(&record.tuple());
        }
        if let Some(set) = self.by_signer.get_mut(&record.signer) {
            set.remove(&id);
        }
        if let Some(prev) = record.previous_id {
            if let Some(set) = self.children.get_mut(&prev) {
                set.remove(&id);
                if set.is_empty() {
                    self.children.remove(&prev);
                }
            }
        }
        self.children.remove(&id);
        Some(record)
    }

    /// The tip is the newest record no other record names as previous
    fn recompute_tip(&mut self, signer: Address) {
        let tip = self.by_signer.get(&signer).and_then(|ids| {
            ids.iter()
                .rev()
                .find(|id| !self.children.contains_key(id))
                .copied()
        });
        match tip {
            Some(id) => {
                self.tips.insert(signer, id);
            }
            None => {
                self.tips.remove(&signer);
            }
        }
    }
}

/// Per-signer hash-linked attestation store
pub struct SignatureLog {
    state: RwLock<LogState>,
    backend: Box<dyn Backend>,
}

impl SignatureLog {
    /// Volatile log backed by [`MemoryBackend`]
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(LogState::default()),
            backend: Box::new(MemoryBackend),
        }
    }

    /// Open a log over a backend, rebuilding indices from its snapshot
    pub fn open(backend: impl Backend + 'static) -> Result<Self> {
        let snapshot = backend.load()?;
        let mut state = LogState::default();
        for signer in snapshot.signers {
            state.signers.insert(signer.address, signer);
        }
        for scc in snapshot.sccs {
            state.sccs.insert(scc.address, scc);
        }
        let mut signatures = snapshot.signatures;
        signatures.sort_by_key(|r| r.id);
        for record in signatures {
            state.index(record);
        }
        let signers: Vec<Address> = state.by_signer.keys().copied().collect();
        for signer in signers {
            state.recompute_tip(signer);
        }
        tracing::info!(
            "Signature log opened: {} records, {} signers, {} sccs",
            state.records.len(),
            state.tips.len(),
            state.sccs.len()
        );
        Ok(Self {
            state: RwLock::new(state),
            backend: Box::new(backend),
        })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert a record or update the existing record for its tuple.
    ///
    /// An existing tuple keeps its `id` and `previous_id`; only the attested
    /// content is replaced. A new record with [`Link::Explicit`] must name the
    /// signer's current tip as previous, otherwise [`LogError::Overtaking`] is
    /// returned and the log is left untouched.
    pub fn save(&self, new: NewSignature) -> Result<OptimismSignature> {
        let mut state = self.state.write();

        if let Some(id) = state.by_tuple.get(&new.tuple()).copied() {
            let mut updated = state
                .records
                .get(&id)
                .cloned()
                .ok_or_else(|| LogError::Corrupted(format!("tuple index points at missing {}", id)))?;
            updated.batch_root = new.batch_root;
            updated.batch_size = new.batch_size;
            updated.prev_total_elements = new.prev_total_elements;
            updated.extra_data = new.extra_data;
            updated.approved = new.approved;
            updated.signature = new.signature;
            self.backend.put_signature(&updated)?;
            state.records.insert(id, updated.clone());
            tracing::trace!("Updated signature {} in place", id);
            return Ok(updated);
        }

        let tip = state.tips.get(&new.signer).copied();
        let previous_id = match new.link {
            Link::Auto => tip,
            Link::Explicit(previous) if previous == tip => previous,
            Link::Explicit(previous) => {
                return Err(LogError::Overtaking {
                    signer: new.signer,
                    expected: tip,
                    got: previous,
                })
            }
        };

        let id = match new.id {
            Some(id) if state.records.contains_key(&id) => return Err(LogError::DuplicateId(id)),
            Some(id) => id,
            None => {
                let minted = SignatureId::generate();
                // ids must keep increasing along the chain even if the tip
                // came from a peer with a faster clock
                match tip {
                    Some(tip) if minted <= tip => tip.successor(),
                    _ => minted,
                }
            }
        };

        let signer = new.signer;
        let scc = new.scc;
        let record = new.into_record(id, previous_id);

        if !state.signers.contains_key(&signer) {
            let entry = Signer { address: signer };
            self.backend.put_signer(&entry)?;
            state.signers.insert(signer, entry);
        }
        if !state.sccs.contains_key(&scc) {
            let entry = OptimismScc::new(scc);
            self.backend.put_scc(&entry)?;
            state.sccs.insert(scc, entry);
        }

        self.backend.put_signature(&record)?;
        state.index(record.clone());
        state.tips.insert(signer, id);
        Ok(record)
    }

    /// Delete `signer`'s records on `scc` from `from_batch_index` upwards.
    ///
    /// Returns the number of deleted records. The signer's tip becomes its
    /// newest remaining record.
    pub fn delete_signatures(
        &self,
        signer: Address,
        scc: Address,
        from_batch_index: u64,
    ) -> Result<usize> {
        let mut state = self.state.write();
        let ids: Vec<SignatureId> = {
            let st = &*state;
            st.by_signer
                .get(&signer)
                .map(|ids| {
                    ids.iter()
                        .filter(|id| {
                            st.records.get(id).map_or(false, |r| {
                                r.scc == scc && r.batch_index >= from_batch_index
                            })
                        })
                        .copied()
                        .collect()
                })
                .unwrap_or_default()
        };
        if ids.is_empty() {
            return Ok(0);
        }

        self.backend.delete_signatures(&ids)?;
        for id in &ids {
            state.unindex(*id);
        }
        state.recompute_tip(signer);
        tracing::info!(
            "Deleted {} signatures of {} on {} from batch {}",
            ids.len(),
            signer,
            scc,
            from_batch_index
        );
        Ok(ids.len())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn find_by_id(&self, id: &SignatureId) -> Option<OptimismSignature> {
        self.state.read().records.get(id).cloned()
    }

    pub fn contains(&self, id: &SignatureId) -> bool {
        self.state.read().records.contains_key(id)
    }

    pub fn find(&self, query: &SignatureQuery) -> Vec<OptimismSignature> {
        let state = self.state.read();
        let range = (
            query.id_after.map_or(Bound::Unbounded, Bound::Excluded),
            Bound::Unbounded,
        );
        let ids: Box<dyn Iterator<Item = &SignatureId>> = match query.signer {
            Some(signer) => match state.by_signer.get(&signer) {
                Some(ids) => Box::new(ids.range(range)),
                None => return Vec::new(),
            },
            None => Box::new(state.records.range(range).map(|(id, _)| id)),
        };
        ids.filter_map(|id| state.records.get(id))
            .filter(|r| query.scc.map_or(true, |scc| r.scc == scc))
            .filter(|r| query.batch_index.map_or(true, |i| r.batch_index == i))
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Current record for a (signer, scc, batch_index) tuple
    pub fn find_by_tuple(&self, key: &TupleKey) -> Option<OptimismSignature> {
        let state = self.state.read();
        state
            .by_tuple
            .get(key)
            .and_then(|id| state.records.get(id))
            .cloned()
    }

    pub fn tip(&self, signer: &Address) -> Option<OptimismSignature> {
        let state = self.state.read();
        state.tips.get(signer).and_then(|id| state.records.get(id)).cloned()
    }

    /// Tip record of every signer, ordered by signer address
    pub fn latest_per_signer(&self) -> Vec<OptimismSignature> {
        let state = self.state.read();
        state
            .tips
            .values()
            .filter_map(|id| state.records.get(id))
            .cloned()
            .collect()
    }

    /// Walk `signer`'s chain backwards from the tip, newest first
    pub fn latest_by_signer(
        &self,
        signer: &Address,
        limit: usize,
        offset: usize,
    ) -> Vec<OptimismSignature> {
        let state = self.state.read();
        let mut out = Vec::with_capacity(limit.min(1024));
        let mut skipped = 0;
        let mut cursor = state.tips.get(signer).copied();
        while let Some(id) = cursor {
            if out.len() >= limit {
                break;
            }
            let Some(record) = state.records.get(&id) else {
                break;
            };
            if skipped < offset {
                skipped += 1;
            } else {
                out.push(record.clone());
            }
            cursor = record.previous_id;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    // ========================================================================
    // Registry
    // ========================================================================

    pub fn find_or_create_signer(&self, address: Address) -> Result<Signer> {
        let mut state = self.state.write();
        if let Some(signer) = state.signers.get(&address) {
            return Ok(*signer);
        }
        let signer = Signer { address };
        self.backend.put_signer(&signer)?;
        state.signers.insert(address, signer);
        Ok(signer)
    }

    pub fn signers(&self) -> Vec<Signer> {
        self.state.read().signers.values().copied().collect()
    }

    pub fn find_or_create_scc(&self, address: Address) -> Result<OptimismScc> {
        let mut state = self.state.write();
        if let Some(scc) = state.sccs.get(&address) {
            return Ok(*scc);
        }
        let scc = OptimismScc::new(address);
        self.backend.put_scc(&scc)?;
        state.sccs.insert(address, scc);
        Ok(scc)
    }

    pub fn find_sccs(&self) -> Vec<OptimismScc> {
        self.state.read().sccs.values().copied().collect()
    }

    /// Record the lowest batch index still awaiting verification on `scc`
    pub fn save_next_index(&self, address: Address, next_index: u64) -> Result<OptimismScc> {
        let mut state = self.state.write();
        let scc = OptimismScc {
            address,
            next_index,
        };
        self.backend.put_scc(&scc)?;
        state.sccs.insert(address, scc);
        Ok(scc)
    }

    // ========================================================================
    // Replay support
    // ========================================================================

    /// Records whose previous id is absent or unknown, ordered by id
    pub(crate) fn root_records(&self) -> Vec<OptimismSignature> {
        let state = self.state.read();
        state
            .records
            .values()
            .filter(|r| {
                r.previous_id
                    .map_or(true, |prev| !state.records.contains_key(&prev))
            })
            .cloned()
            .collect()
    }

    pub(crate) fn child_records(&self, id: &SignatureId) -> Vec<OptimismSignature> {
        let state = self.state.read();
        state
            .children
            .get(id)
            .map(|ids| ids.iter().filter_map(|c| state.records.get(c)).cloned().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for SignatureLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SignatureLog")
            .field("records", &state.records.len())
            .field("signers", &state.tips.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rocks::RocksBackend;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    fn new_sig(signer: Address, scc: Address, batch_index: u64) -> NewSignature {
        NewSignature {
            id: None,
            link: Link::Auto,
            signer,
            scc,
            batch_index,
            batch_root: H256::digest(&batch_index.to_be_bytes()),
            batch_size: 10,
            prev_total_elements: batch_index * 10,
            extra_data: vec![],
            approved: true,
            signature: vec![batch_index as u8; 64],
        }
    }

    #[test]
    fn test_auto_link_builds_chain_per_signer() {
        let log = SignatureLog::in_memory();
        let a0 = log.save(new_sig(addr(1), addr(10), 0)).unwrap();
        let a1 = log.save(new_sig(addr(1), addr(11), 0)).unwrap();
        let b0 = log.save(new_sig(addr(2), addr(10), 0)).unwrap();

        assert_eq!(a0.previous_id, None);
        assert_eq!(a1.previous_id, Some(a0.id));
        assert_eq!(b0.previous_id, None);
        assert!(a0.id < a1.id);
        assert_eq!(log.tip(&addr(1)).unwrap().id, a1.id);
        assert_eq!(log.signers().len(), 2);
        assert_eq!(log.find_sccs().len(), 2);
    }

    #[test]
    fn test_explicit_previous_must_match_tip() {
        let log = SignatureLog::in_memory();
        let first = log.save(new_sig(addr(1), addr(10), 0)).unwrap();
        let _second = log.save(new_sig(addr(1), addr(10), 1)).unwrap();

        let mut stale = new_sig(addr(1), addr(10), 2);
        stale.link = Link::Explicit(Some(first.id));
        let err = log.save(stale).unwrap_err();
        assert!(err.is_overtaking());
        assert_eq!(log.len(), 2);

        let mut orphan = new_sig(addr(1), addr(10), 2);
        orphan.link = Link::Explicit(None);
        assert!(log.save(orphan).unwrap_err().is_overtaking());
        assert_eq!(log.len(), 2);
        assert_eq!(log.latest_by_signer(&addr(1), 10, 0).len(), 2);
    }

    #[test]
    fn test_explicit_remote_apply_keeps_ids() {
        let log = SignatureLog::in_memory();
        let id0 = SignatureId::from_parts(1_000, 1);
        let id1 = SignatureId::from_parts(2_000, 1);

        let mut first = new_sig(addr(1), addr(10), 0);
        first.id = Some(id0);
        first.link = Link::Explicit(None);
        let mut second = new_sig(addr(1), addr(10), 1);
        second.id = Some(id1);
        second.link = Link::Explicit(Some(id0));

        assert_eq!(log.save(first).unwrap().id, id0);
        let saved = log.save(second).unwrap();
        assert_eq!(saved.id, id1);
        assert_eq!(saved.previous_id, Some(id0));
    }

    #[test]
    fn test_resave_never_moves_id_or_previous() {
        let log = SignatureLog::in_memory();
        let first = log.save(new_sig(addr(1), addr(10), 0)).unwrap();
        let second = log.save(new_sig(addr(1), addr(10), 1)).unwrap();

        let mut again = new_sig(addr(1), addr(10), 0);
        again.id = Some(SignatureId::from_parts(9_999_999, 5));
        again.link = Link::Explicit(Some(second.id));
        again.approved = false;
        again.signature = vec![0xee; 64];
        let updated = log.save(again).unwrap();

        assert_eq!(updated.id, first.id);
        assert_eq!(updated.previous_id, None);
        assert!(!updated.approved);
        assert_eq!(log.find_by_id(&first.id).unwrap().signature, vec![0xee; 64]);
        assert_eq!(log.len(), 2);
        assert_eq!(log.tip(&addr(1)).unwrap().id, second.id);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let log = SignatureLog::in_memory();
        let first = log.save(new_sig(addr(1), addr(10), 0)).unwrap();

        let mut clash = new_sig(addr(2), addr(10), 0);
        clash.id = Some(first.id);
        clash.link = Link::Explicit(None);
        assert!(matches!(log.save(clash), Err(LogError::DuplicateId(_))));
    }

    #[test]
    fn test_find_filters_and_pages() {
        let log = SignatureLog::in_memory();
        let mut saved = Vec::new();
        for i in 0..10 {
            let scc = if i % 2 == 0 { addr(10) } else { addr(11) };
            saved.push(log.save(new_sig(addr(1), scc, i)).unwrap());
        }
        log.save(new_sig(addr(2), addr(10), 0)).unwrap();

        let after = log.find(&SignatureQuery::new().signer(addr(1)).id_after(Some(saved[4].id)));
        assert_eq!(after.len(), 5);
        assert_eq!(after[0].id, saved[5].id);

        let on_scc = log.find(&SignatureQuery::new().signer(addr(1)).scc(addr(10)).limit(2).offset(1));
        let indexes: Vec<_> = on_scc.iter().map(|r| r.batch_index).collect();
        assert_eq!(indexes, vec![2, 4]);

        let exact = log.find(&SignatureQuery::new().scc(addr(10)).batch_index(0));
        assert_eq!(exact.len(), 2);

        assert!(log.find(&SignatureQuery::new().signer(addr(9))).is_empty());
        assert_eq!(log.find(&SignatureQuery::new()).len(), 11);
    }

    #[test]
    fn test_latest_queries() {
        let log = SignatureLog::in_memory();
        for i in 0..5 {
            log.save(new_sig(addr(2), addr(10), i)).unwrap();
            log.save(new_sig(addr(1), addr(11), i)).unwrap();
        }

        let latest = log.latest_per_signer();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].signer, addr(1));
        assert_eq!(latest[1].signer, addr(2));
        assert!(latest.iter().all(|r| r.batch_index == 4));

        let page: Vec<_> = log
            .latest_by_signer(&addr(1), 2, 1)
            .iter()
            .map(|r| r.batch_index)
            .collect();
        assert_eq!(page, vec![3, 2]);
        assert!(log.latest_by_signer(&addr(1), 10, 5).is_empty());
    }

    #[test]
    fn test_delete_signatures_recomputes_tip() {
        let log = SignatureLog::in_memory();
        let mut saved = Vec::new();
        for i in 0..6 {
            saved.push(log.save(new_sig(addr(1), addr(10), i)).unwrap());
        }
        log.save(new_sig(addr(1), addr(11), 0)).unwrap();

        // scc 11 record is newer but lives on another contract
        assert_eq!(log.delete_signatures(addr(1), addr(10), 3).unwrap(), 3);
        assert_eq!(log.len(), 4);
        assert!(log.find_by_id(&saved[3].id).is_none());
        assert_eq!(log.tip(&addr(1)).unwrap().scc, addr(11));

        assert_eq!(log.delete_signatures(addr(1), addr(11), 0).unwrap(), 1);
        assert_eq!(log.tip(&addr(1)).unwrap().id, saved[2].id);
        assert_eq!(log.delete_signatures(addr(1), addr(10), 100).unwrap(), 0);
    }

    #[test]
    fn test_registry() {
        let log = SignatureLog::in_memory();
        let s1 = log.find_or_create_signer(addr(1)).unwrap();
        let s2 = log.find_or_create_signer(addr(1)).unwrap();
        assert_eq!(s1, s2);
        assert_eq!(log.signers().len(), 1);

        assert_eq!(log.find_or_create_scc(addr(10)).unwrap().next_index, 0);
        log.save_next_index(addr(10), 42).unwrap();
        assert_eq!(log.find_or_create_scc(addr(10)).unwrap().next_index, 42);
        log.save_next_index(addr(11), 7).unwrap();
        assert_eq!(log.find_sccs().len(), 2);
    }

    #[test]
    fn test_concurrent_auto_saves_keep_single_chain() {
        let log = Arc::new(SignatureLog::in_memory());
        std::thread::scope(|scope| {
            for t in 0..4u64 {
                let log = log.clone();
                scope.spawn(move || {
                    for i in 0..50 {
                        log.save(new_sig(addr(1), addr(10), t * 1000 + i)).unwrap();
                    }
                });
            }
        });

        assert_eq!(log.len(), 200);
        let chain = log.latest_by_signer(&addr(1), usize::MAX, 0);
        assert_eq!(chain.len(), 200);
        assert_eq!(chain.last().unwrap().previous_id, None);
        let unique: HashSet<_> = chain.iter().map(|r| r.id).collect();
        assert_eq!(unique.len(), 200);
        assert!(chain.windows(2).all(|w| w[0].previous_id == Some(w[1].id)));
    }

    #[test]
    fn test_reopen_rebuilds_indices() {
        let dir = TempDir::new().unwrap();
        let (tip, deleted) = {
            let log = SignatureLog::open(RocksBackend::open(dir.path()).unwrap()).unwrap();
            for i in 0..5 {
                log.save(new_sig(addr(1), addr(10), i)).unwrap();
            }
            log.save_next_index(addr(10), 5).unwrap();
            let deleted = log.delete_signatures(addr(1), addr(10), 4).unwrap();
            (log.tip(&addr(1)).unwrap(), deleted)
        };
        assert_eq!(deleted, 1);

        let log = SignatureLog::open(RocksBackend::open(dir.path()).unwrap()).unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log.tip(&addr(1)).unwrap(), tip);
        assert_eq!(log.find_sccs()[0].next_index, 5);

        let next = log.save(new_sig(addr(1), addr(10), 4)).unwrap();
        assert_eq!(next.previous_id, Some(tip.id));
    }

    #[test]
    fn test_reopen_keeps_tip_of_explicit_chain_with_lower_id() {
        let dir = TempDir::new().unwrap();
        let (head, child) = {
            let log = SignatureLog::open(RocksBackend::open(dir.path()).unwrap()).unwrap();
            let head = log.save(new_sig(addr(1), addr(10), 0)).unwrap();

            // a peer's record may carry an id below the record it links to
            let mut remote = new_sig(addr(1), addr(10), 1);
            remote.id = Some(SignatureId::from_parts(1, 0));
            remote.link = Link::Explicit(Some(head.id));
            let child = log.save(remote).unwrap();
            assert!(child.id < head.id);
            assert_eq!(log.tip(&addr(1)).unwrap().id, child.id);
            (head, child)
        };

        let log = SignatureLog::open(RocksBackend::open(dir.path()).unwrap()).unwrap();
        assert_eq!(log.tip(&addr(1)).unwrap().id, child.id);
        assert_eq!(log.latest_per_signer()[0].id, child.id);

        let next = log.save(new_sig(addr(1), addr(10), 2)).unwrap();
        assert_eq!(next.previous_id, Some(child.id));
        assert_ne!(next.previous_id, Some(head.id));
    }
}
