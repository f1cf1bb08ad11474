use anyhow::Result;
use rust_htslib::bam::record::Record;

use crate::pairing::{PairFilter, PairPolicy};

use super::{AlignmentSink, AlignmentSource, PairHandler};

pub const DEFAULT_BUFFER_LIMIT: usize = 100_000;

#[derive(Debug, Default, Clone)]
pub struct RewriteStats {
    pub records_read: usize,
    pub records_written: usize,
    /// Buffered records dropped at flush because their key was blacklisted
    /// after they were buffered.
    pub records_suppressed: usize,
    pub pairs_emitted: usize,
    pub unpaired_flushed: usize,
}

/// Streams a sorted alignment source through a pair filter and writes the
/// surviving records out in batches.
///
/// Output records sit in a soft-bounded buffer between flushes; every flush
/// re-checks the blacklist so that a record buffered long before its mate
/// disqualified the pair is still suppressed. One rewriter serves one
/// (source, sink) on one thread.
pub struct BamRewriter<S, K, P, H>
where
    S: AlignmentSource,
    K: AlignmentSink,
    P: PairPolicy,
    H: PairHandler,
{
    source: S,
    sink: K,
    filter: PairFilter<P>,
    handler: H,
    buffer: Vec<Record>,
    buffer_limit: usize,
    chromosome_filter: Option<i32>,
    keep_unpaired: bool,
    stats: RewriteStats,
}

impl<S, K, P, H> BamRewriter<S, K, P, H>
where
    S: AlignmentSource,
    K: AlignmentSink,
    P: PairPolicy,
    H: PairHandler,
{
    pub fn new(source: S, sink: K, filter: PairFilter<P>, handler: H) -> Self {
        BamRewriter {
            source,
            sink,
            filter,
            handler,
            buffer: Vec::new(),
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            chromosome_filter: None,
            keep_unpaired: false,
            stats: RewriteStats::default(),
        }
    }

    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    /// Restrict the run to one reference id; earlier ids are skipped, the
    /// first later id ends the run (the source is sorted).
    pub fn with_chromosome_filter(mut self, tid: Option<i32>) -> Self {
        self.chromosome_filter = tid;
        self
    }

    /// Also emit reads whose mate never arrives.
    pub fn with_unpaired(mut self, keep_unpaired: bool) -> Self {
        self.keep_unpaired = keep_unpaired;
        self
    }

    pub fn run(mut self) -> Result<RewriteStats> {
        while let Some(record) = self.source.next_record()? {
            self.stats.records_read += 1;
            if self.stats.records_read % 1000000 == 0 {
                println!("Processed {} reads", self.stats.records_read);
            }

            if let Some(tid) = self.chromosome_filter {
                // tid -1 (unmapped, no coordinate) sorts to the tail of a
                // coordinate-sorted stream, so nothing relevant follows
                if record.tid() < 0 || record.tid() > tid {
                    break;
                }
                if record.tid() < tid {
                    continue;
                }
            }

            if self.keep_unpaired && self.filter.reached_flushing_checkpoint(&record) {
                let flushed = self.filter.flushable_unpaired_reads();
                self.stats.unpaired_flushed += flushed.len();
                self.buffer.extend(flushed);
            }

            if let Some(pair) = self.filter.try_pair(record)? {
                self.stats.pairs_emitted += 1;
                self.buffer.extend(self.handler.extract_reads(pair));
            }

            if self.buffer.len() > self.buffer_limit {
                self.flush()?;
            }
        }

        if self.keep_unpaired {
            let remaining = self.filter.unpaired_alignments(true);
            self.stats.unpaired_flushed += remaining.len();
            self.buffer.extend(remaining);
        }
        self.flush()?;

        Ok(self.stats)
    }

    fn flush(&mut self) -> Result<()> {
        for record in self.buffer.drain(..) {
            if self.filter.read_is_blacklisted(&record) {
                self.stats.records_suppressed += 1;
                continue;
            }
            self.sink.write_record(&record)?;
            self.stats.records_written += 1;
        }
        Ok(())
    }
}
