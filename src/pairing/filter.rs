use rust_htslib::bam::record::Record;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::runtime::Error;

use super::{PairPolicy, ReadPair};

/// The mate-pairing state machine.
///
/// Consumes one alignment at a time from a position-sorted stream and emits a
/// `ReadPair` exactly once per key, on the call that completes it. Partial
/// pairs live only in the internal table; blacklisted keys short-circuit to
/// dropped from any state. One filter instance serves one stream on one
/// thread.
pub struct PairFilter<P: PairPolicy> {
    policy: P,
    waiting: FxHashMap<Vec<u8>, ReadPair>,
    blacklist: FxHashSet<Vec<u8>>,
    whitelist: FxHashSet<Vec<u8>>,
    remove_failed_pairs: bool,
    last_tid: Option<i32>,
}

impl<P: PairPolicy> PairFilter<P> {
    pub fn new(policy: P, remove_failed_pairs: bool) -> PairFilter<P> {
        PairFilter {
            policy,
            waiting: FxHashMap::default(),
            blacklist: FxHashSet::default(),
            whitelist: FxHashSet::default(),
            remove_failed_pairs,
            last_tid: None,
        }
    }

    /// Feed one alignment. Returns the completed pair when this alignment
    /// supplies the missing mate and the pair passes policy, `None` otherwise.
    pub fn try_pair(&mut self, record: Record) -> Result<Option<ReadPair>, Error> {
        self.last_tid = Some(record.tid());

        let key = self.policy.read_key(&record);
        if self.policy.should_blacklist_key(&record) {
            self.blacklist.insert(key.clone());
            self.waiting.remove(&key);
        }

        // blacklist wins over every other rule
        if self.blacklist.contains(&key) {
            return Ok(None);
        }
        if self.policy.should_skip_read(&record) {
            return Ok(None);
        }

        let Some(mut pair) = self.waiting.remove(&key) else {
            self.waiting.insert(key.clone(), ReadPair::new(key, record));
            return Ok(None);
        };

        // two records always complete a pair structurally; only policy can
        // hold it open
        pair.add_alignment(record)?;
        if self.policy.treat_as_incomplete(&pair) {
            // stays pending until a later call completes or blacklists it
            self.waiting.insert(key, pair);
            return Ok(None);
        }

        if self.policy.should_skip_pair(&pair) {
            // once evaluated a pair is never re-evaluated; the entry is
            // dropped whether or not eager removal was requested
            return Ok(None);
        }
        if self.policy.should_whitelist_key(&pair) {
            self.whitelist.insert(key);
        }
        Ok(Some(pair))
    }

    pub fn read_is_blacklisted(&self, record: &Record) -> bool {
        self.blacklist.contains(&self.policy.read_key(record))
    }

    pub fn read_is_whitelisted(&self, record: &Record) -> bool {
        self.whitelist.contains(&self.policy.read_key(record))
    }

    /// Checkpoint query for the rewriter, evaluated against the position
    /// marker of the previously fed alignment.
    pub fn reached_flushing_checkpoint(&self, record: &Record) -> bool {
        self.policy.reached_flushing_checkpoint(record, self.last_tid)
    }

    /// Remove and return the pending entries whose stored read may be
    /// flushed now, per policy. Bounds table memory on long streams where
    /// mates never arrive.
    pub fn flushable_unpaired_reads(&mut self) -> Vec<Record> {
        let last_tid = self.last_tid;
        let keys: Vec<Vec<u8>> = self
            .waiting
            .iter()
            .filter(|(_, pair)| {
                pair.alignments()
                    .next()
                    .map_or(false, |r| self.policy.should_flush_unpaired_read(r, last_tid))
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut flushed = Vec::new();
        for key in keys {
            if let Some(pair) = self.waiting.remove(&key) {
                flushed.extend(pair.into_records());
            }
        }
        flushed
    }

    /// Drain every still-pending alignment, optionally clearing the table.
    pub fn unpaired_alignments(&mut self, clear_waiting: bool) -> Vec<Record> {
        if clear_waiting {
            self.waiting
                .drain()
                .flat_map(|(_, pair)| pair.into_records())
                .collect()
        } else {
            self.waiting
                .values()
                .flat_map(|pair| pair.alignments().cloned())
                .collect()
        }
    }

    pub fn pending_count(&self) -> usize {
        self.waiting.len()
    }

    /// Interface parity with the historical filter; a rejected pair is
    /// removed from the table regardless of this setting.
    pub fn remove_failed_pairs(&self) -> bool {
        self.remove_failed_pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::{PermissivePolicy, ProperPairPolicy};

    const FLAG_PAIRED: u16 = 1;
    const FLAG_PROPER: u16 = 2;
    const FLAG_UNMAP: u16 = 4;
    const FLAG_FIRST: u16 = 64;
    const FLAG_LAST: u16 = 128;

    fn rec(qname: &[u8], tid: i32, pos: i64, flags: u16) -> Record {
        let mut r = Record::new();
        r.set(qname, None, b"", &[]);
        r.set_tid(tid);
        r.set_pos(pos);
        r.set_flags(flags);
        r
    }

    /// Bans the key "evil" the moment its second mate shows up.
    struct BlacklistSecondMate;
    impl PairPolicy for BlacklistSecondMate {
        fn should_blacklist_key(&self, record: &Record) -> bool {
            record.qname() == b"evil" && record.is_last_in_template()
        }
    }

    /// Holds every pair open no matter how many records arrive.
    struct NeverComplete;
    impl PairPolicy for NeverComplete {
        fn treat_as_incomplete(&self, _pair: &ReadPair) -> bool {
            true
        }
    }

    /// Records every accepted pair's key in the whitelist.
    struct WhitelistAccepted;
    impl PairPolicy for WhitelistAccepted {
        fn should_whitelist_key(&self, _pair: &ReadPair) -> bool {
            true
        }
    }

    #[test]
    fn test_pair_completes_on_second_alignment() {
        let mut filter = PairFilter::new(PermissivePolicy, true);
        // interleaved stream: A, B, A-mate, B-mate
        assert!(filter.try_pair(rec(b"a", 0, 100, FLAG_PAIRED | FLAG_FIRST)).unwrap().is_none());
        assert!(filter.try_pair(rec(b"b", 0, 105, FLAG_PAIRED | FLAG_FIRST)).unwrap().is_none());
        let pair_a = filter.try_pair(rec(b"a", 0, 108, FLAG_PAIRED | FLAG_LAST)).unwrap();
        assert_eq!(pair_a.unwrap().key(), b"a");
        let pair_b = filter.try_pair(rec(b"b", 0, 112, FLAG_PAIRED | FLAG_LAST)).unwrap();
        assert_eq!(pair_b.unwrap().key(), b"b");
        assert_eq!(filter.pending_count(), 0);
    }

    #[test]
    fn test_at_most_one_pending_per_key() {
        let mut filter = PairFilter::new(NeverComplete, true);
        filter.try_pair(rec(b"a", 0, 100, FLAG_PAIRED | FLAG_FIRST)).unwrap();
        filter.try_pair(rec(b"b", 0, 101, FLAG_PAIRED | FLAG_FIRST)).unwrap();
        filter.try_pair(rec(b"a", 0, 102, FLAG_PAIRED | FLAG_LAST)).unwrap();
        assert_eq!(filter.pending_count(), 2);
    }

    #[test]
    fn test_third_alignment_is_contract_violation() {
        let mut filter = PairFilter::new(NeverComplete, true);
        filter.try_pair(rec(b"a", 0, 100, FLAG_PAIRED | FLAG_FIRST)).unwrap();
        filter.try_pair(rec(b"a", 0, 102, FLAG_PAIRED | FLAG_LAST)).unwrap();
        let err = filter.try_pair(rec(b"a", 0, 104, FLAG_PAIRED | FLAG_LAST));
        assert!(matches!(err, Err(Error::PairAlreadyComplete { .. })));
    }

    #[test]
    fn test_blacklist_removes_pending_and_drops_future() {
        let mut filter = PairFilter::new(BlacklistSecondMate, true);
        filter.try_pair(rec(b"evil", 0, 100, FLAG_PAIRED | FLAG_FIRST)).unwrap();
        assert_eq!(filter.pending_count(), 1);

        // the mate triggers the blacklist; no pair comes out and the pending
        // entry is gone
        let out = filter.try_pair(rec(b"evil", 0, 108, FLAG_PAIRED | FLAG_LAST)).unwrap();
        assert!(out.is_none());
        assert_eq!(filter.pending_count(), 0);
        assert!(filter.read_is_blacklisted(&rec(b"evil", 0, 108, 0)));

        // every later alignment under the key is dropped too
        let out = filter.try_pair(rec(b"evil", 0, 120, FLAG_PAIRED | FLAG_FIRST)).unwrap();
        assert!(out.is_none());
        assert_eq!(filter.pending_count(), 0);
    }

    #[test]
    fn test_accepted_pair_key_enters_whitelist() {
        let mut filter = PairFilter::new(WhitelistAccepted, true);
        assert!(!filter.read_is_whitelisted(&rec(b"a", 0, 0, 0)));

        filter.try_pair(rec(b"a", 0, 100, FLAG_PAIRED | FLAG_FIRST)).unwrap();
        // a pending first mate is not whitelisted yet
        assert!(!filter.read_is_whitelisted(&rec(b"a", 0, 0, 0)));

        let out = filter.try_pair(rec(b"a", 0, 108, FLAG_PAIRED | FLAG_LAST)).unwrap();
        assert!(out.is_some());
        assert!(filter.read_is_whitelisted(&rec(b"a", 0, 0, 0)));

        // later acceptances accumulate; earlier entries are never evicted
        filter.try_pair(rec(b"b", 0, 110, FLAG_PAIRED | FLAG_FIRST)).unwrap();
        filter.try_pair(rec(b"b", 0, 112, FLAG_PAIRED | FLAG_LAST)).unwrap();
        assert!(filter.read_is_whitelisted(&rec(b"a", 0, 0, 0)));
        assert!(filter.read_is_whitelisted(&rec(b"b", 0, 0, 0)));
    }

    #[test]
    fn test_skipped_reads_never_enter_table() {
        let mut filter = PairFilter::new(ProperPairPolicy::new(), true);
        filter
            .try_pair(rec(b"u", 0, 100, FLAG_PAIRED | FLAG_FIRST | FLAG_UNMAP))
            .unwrap();
        assert_eq!(filter.pending_count(), 0);
    }

    #[test]
    fn test_improper_pair_is_rejected_and_removed() {
        let mut filter = PairFilter::new(ProperPairPolicy::new(), true);
        filter.try_pair(rec(b"a", 0, 100, FLAG_PAIRED | FLAG_FIRST)).unwrap();
        let out = filter.try_pair(rec(b"a", 0, 108, FLAG_PAIRED | FLAG_LAST)).unwrap();
        assert!(out.is_none());
        assert_eq!(filter.pending_count(), 0);
    }

    #[test]
    fn test_proper_pair_is_accepted() {
        let mut filter = PairFilter::new(ProperPairPolicy::new(), true);
        let fl = FLAG_PAIRED | FLAG_PROPER;
        filter.try_pair(rec(b"a", 0, 100, fl | FLAG_FIRST)).unwrap();
        let out = filter.try_pair(rec(b"a", 0, 108, fl | FLAG_LAST)).unwrap();
        assert!(out.unwrap().is_complete());
    }

    #[test]
    fn test_flushable_unpaired_reads_drains_past_chromosomes() {
        let mut filter = PairFilter::new(ProperPairPolicy::new(), true);
        let fl = FLAG_PAIRED | FLAG_PROPER;
        filter.try_pair(rec(b"stale", 0, 100, fl | FLAG_FIRST)).unwrap();
        // stream moves to the next chromosome
        filter.try_pair(rec(b"fresh", 1, 50, fl | FLAG_FIRST)).unwrap();

        let flushed = filter.flushable_unpaired_reads();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].qname(), b"stale");
        // the entry on the current chromosome stays pending
        assert_eq!(filter.pending_count(), 1);
    }

    #[test]
    fn test_unpaired_alignments_drain_and_clear() {
        let mut filter = PairFilter::new(PermissivePolicy, true);
        filter.try_pair(rec(b"a", 0, 100, FLAG_PAIRED | FLAG_FIRST)).unwrap();
        filter.try_pair(rec(b"b", 0, 105, FLAG_PAIRED | FLAG_FIRST)).unwrap();

        let peeked = filter.unpaired_alignments(false);
        assert_eq!(peeked.len(), 2);
        assert_eq!(filter.pending_count(), 2);

        let drained = filter.unpaired_alignments(true);
        assert_eq!(drained.len(), 2);
        assert_eq!(filter.pending_count(), 0);
    }
}
