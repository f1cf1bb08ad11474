use rust_htslib::bam::record::Record;

use super::ReadPair;

/// The acceptance criteria plugged into a `PairFilter`.
///
/// One value bundles every domain decision the pairing state machine defers:
/// which reads enter the table, which completed pairs survive, which keys are
/// black/whitelisted, and when pending entries may be flushed. The two
/// flushing hooks receive the filter's last-seen reference id so they stay
/// pure predicates while still being able to express "the stream has moved
/// past this read".
pub trait PairPolicy {
    /// Key under which mates find each other. Defaults to the read name.
    fn read_key(&self, record: &Record) -> Vec<u8> {
        record.qname().to_vec()
    }

    /// Drop this alignment before it enters the pairing table?
    fn should_skip_read(&self, _record: &Record) -> bool {
        false
    }

    /// Reject this structurally complete pair?
    fn should_skip_pair(&self, _pair: &ReadPair) -> bool {
        false
    }

    /// Ban this alignment's key outright, dropping any pending entry?
    fn should_blacklist_key(&self, _record: &Record) -> bool {
        false
    }

    /// Record the key of an accepted pair in the whitelist?
    fn should_whitelist_key(&self, _pair: &ReadPair) -> bool {
        false
    }

    /// Keep a two-record pair pending as if the mate had not arrived yet?
    fn treat_as_incomplete(&self, _pair: &ReadPair) -> bool {
        false
    }

    /// Has the stream reached a point where stale unpaired entries should be
    /// drained (e.g. a chromosome boundary)?
    fn reached_flushing_checkpoint(&self, _record: &Record, _last_tid: Option<i32>) -> bool {
        false
    }

    /// May this pending first mate be flushed as unpaired now?
    fn should_flush_unpaired_read(&self, _record: &Record, _last_tid: Option<i32>) -> bool {
        false
    }
}

/// Pass-everything policy for plumbing and tests.
pub struct PermissivePolicy;

impl PairPolicy for PermissivePolicy {}

/// Production policy for position-sorted DNA alignments: only mapped primary
/// reads are paired, and a completed pair must be proper, duplicate-free and
/// carry both template roles.
pub struct ProperPairPolicy {
    pub flush_on_chromosome_change: bool,
}

impl ProperPairPolicy {
    pub fn new() -> ProperPairPolicy {
        ProperPairPolicy {
            flush_on_chromosome_change: true,
        }
    }
}

impl Default for ProperPairPolicy {
    fn default() -> Self {
        ProperPairPolicy::new()
    }
}

impl PairPolicy for ProperPairPolicy {
    fn should_skip_read(&self, record: &Record) -> bool {
        record.is_unmapped() || record.is_secondary() || record.is_supplementary()
    }

    fn should_skip_pair(&self, pair: &ReadPair) -> bool {
        match (pair.read1(), pair.read2()) {
            (Some(r1), Some(r2)) => {
                !r1.is_proper_pair()
                    || !r2.is_proper_pair()
                    || r1.is_duplicate()
                    || r2.is_duplicate()
                    || r1.is_first_in_template() == r2.is_first_in_template()
            }
            _ => true,
        }
    }

    fn reached_flushing_checkpoint(&self, record: &Record, last_tid: Option<i32>) -> bool {
        self.flush_on_chromosome_change && matches!(last_tid, Some(tid) if tid != record.tid())
    }

    fn should_flush_unpaired_read(&self, record: &Record, last_tid: Option<i32>) -> bool {
        // the stream has moved on to a later chromosome; no mate can follow
        matches!(last_tid, Some(tid) if record.tid() < tid)
    }
}
