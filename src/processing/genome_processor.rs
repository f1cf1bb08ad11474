use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use itertools::iproduct;
use log::{debug, info, warn};

use crate::genome::GenomeReference;
use crate::pairing::{PairFilter, ProperPairPolicy};
use crate::rewrite::{AlignmentSource, BamRewriter, BamSink, BamSource, PassthroughHandler};
use crate::runtime::Error;
use crate::threading::{ErrorMode, Job, JobPool};

use super::{ChromosomeCache, ChromosomeRef, FileThrottle};

/// One input file to process against every configured chromosome.
pub struct WorkItem {
    /// Diagnostic name, also used for output naming. Usually the file stem.
    pub name: String,
    pub path_in: PathBuf,
}

/// The per-(work item, chromosome) callback. May run a nested rewriter
/// pipeline; errors propagate to the orchestrator.
pub trait ChromosomeTask: Send + Sync {
    fn process(&self, work: &WorkItem, chromosome: &ChromosomeRef) -> anyhow::Result<()>;
}

/// Schedules N work items x M chromosomes onto the job pool.
///
/// Guarantees: each chromosome reference loads once and unloads right after
/// its last job; at most `max_resident` loaded chromosomes coexist; with
/// `throttle_files` one file's chromosomes are visited in configured order
/// while different files stay independent. Job errors are collected, with
/// file and chromosome context, until every job has been attempted; the
/// first recorded error is returned.
pub struct GenomeProcessor<G: GenomeReference, T: ChromosomeTask> {
    pub genome: G,
    pub work_items: Vec<WorkItem>,
    /// Processing (and throttle) order.
    pub chromosomes: Vec<String>,
    pub task: T,
    pub num_threads: usize,
    pub throttle_files: bool,
    pub max_resident: Option<usize>,
}

impl<G, T> GenomeProcessor<G, T>
where
    G: GenomeReference + 'static,
    T: ChromosomeTask + 'static,
{
    pub fn run(self) -> anyhow::Result<()> {
        let GenomeProcessor {
            genome,
            work_items,
            chromosomes,
            task,
            num_threads,
            throttle_files,
            max_resident,
        } = self;

        if work_items.is_empty() {
            return Err(Error::empty_input("Work item list").into());
        }
        if chromosomes.is_empty() {
            return Err(Error::empty_input("Chromosome list").into());
        }
        info!(
            "Scheduling {} jobs ({} files x {} chromosomes)",
            work_items.len() * chromosomes.len(),
            work_items.len(),
            chromosomes.len()
        );

        let cache = Arc::new(ChromosomeCache::new(genome, max_resident));
        let throttle = if throttle_files {
            let plan: Vec<(usize, Vec<String>)> = (0..work_items.len())
                .map(|work| (work, chromosomes.clone()))
                .collect();
            Some(Arc::new(FileThrottle::new(&plan)))
        } else {
            None
        };
        let errors: Arc<Mutex<Vec<anyhow::Error>>> = Arc::new(Mutex::new(Vec::new()));
        let work_items = Arc::new(work_items);
        let task = Arc::new(task);

        for (chromosome, work) in iproduct!(&chromosomes, 0..work_items.len()) {
            cache.register_job(work, chromosome);
        }

        // chromosome-major order keeps each reference hot while its jobs drain
        let mut jobs = Vec::new();
        for (chromosome, work) in iproduct!(&chromosomes, 0..work_items.len()) {
            let chromosome = chromosome.clone();
            let cache = Arc::clone(&cache);
            let throttle = throttle.clone();
            let errors = Arc::clone(&errors);
            let work_items = Arc::clone(&work_items);
            let task = Arc::clone(&task);
            let name = format!("{}:{}", work_items[work].name, chromosome);

            jobs.push(Job::new(name, move || {
                if let Some(throttle) = &throttle {
                    throttle.wait_for_turn(work, &chromosome);
                }
                let result = run_job(&cache, task.as_ref(), &work_items[work], &chromosome);
                // bookkeeping runs on success and failure alike
                cache.release_if_last(work, &chromosome);
                if let Some(throttle) = &throttle {
                    throttle.job_done(work, &chromosome);
                }
                if let Err(e) = result {
                    let e = e.context(format!(
                        "Processing {} chromosome {}",
                        work_items[work].name, chromosome
                    ));
                    log::error!("{:#}", e);
                    errors.lock().unwrap().push(e);
                }
                Ok(())
            }));
        }

        // failures are aggregated here, so the pool itself never trips
        JobPool::new(num_threads, ErrorMode::None).process(jobs)?;

        let mut errors = errors.lock().unwrap();
        if !errors.is_empty() {
            return Err(errors.remove(0));
        }
        Ok(())
    }
}

fn run_job<G: GenomeReference, T: ChromosomeTask>(
    cache: &ChromosomeCache<G>,
    task: &T,
    work: &WorkItem,
    chromosome: &str,
) -> anyhow::Result<()> {
    let (reference, _first_load) = cache.acquire(chromosome)?;
    if reference.is_missing() {
        info!(
            "Chromosome {} missing from the reference, skipping {}",
            chromosome, work.name
        );
        return Ok(());
    }
    task.process(work, &reference)
}

/// Production task: pair-complete rewrite of one input restricted to one
/// chromosome, written to `<dir>/<name>.<chromosome>.bam`.
pub struct RewriteTask {
    pub path_out: PathBuf,
    pub buffer_limit: usize,
    pub keep_unpaired: bool,
    pub remove_failed_pairs: bool,
    pub htslib_threads: usize,
}

impl ChromosomeTask for RewriteTask {
    fn process(&self, work: &WorkItem, chromosome: &ChromosomeRef) -> anyhow::Result<()> {
        let source = BamSource::from_path(&work.path_in, self.htslib_threads)?;
        let Some(tid) = source.reference_index(chromosome.name()) else {
            warn!(
                "{}: chromosome {} not in BAM header, skipping",
                work.name,
                chromosome.name()
            );
            return Ok(());
        };
        debug!(
            "{}: {} bp of {} resident",
            work.name,
            chromosome.sequence().map_or(0, |s| s.bases.len()),
            chromosome.name()
        );

        let path_out = self
            .path_out
            .join(format!("{}.{}.bam", work.name, chromosome.name()));
        let sink = BamSink::from_path(&path_out, source.header(), self.htslib_threads)?;
        let filter = PairFilter::new(ProperPairPolicy::new(), self.remove_failed_pairs);
        let stats = BamRewriter::new(source, sink, filter, PassthroughHandler)
            .with_buffer_limit(self.buffer_limit)
            .with_chromosome_filter(Some(tid))
            .with_unpaired(self.keep_unpaired)
            .run()?;

        info!(
            "{} chromosome {}: {} pairs, {} records written, {} suppressed",
            work.name,
            chromosome.name(),
            stats.pairs_emitted,
            stats.records_written,
            stats.records_suppressed
        );
        Ok(())
    }
}
