use rust_htslib::bam::record::Record;

use crate::pairing::ReadPair;

/// Turns a completed pair into the records that go to the output. Stitching
/// and realignment handlers plug in here; the core only needs this seam.
pub trait PairHandler {
    fn extract_reads(&self, pair: ReadPair) -> Vec<Record>;
}

/// Emits both mates unchanged, read1 before read2.
pub struct PassthroughHandler;

impl PairHandler for PassthroughHandler {
    fn extract_reads(&self, pair: ReadPair) -> Vec<Record> {
        pair.into_records()
    }
}
