use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::Args;
use rustc_hash::FxHashSet;

use crate::pairing::{PairFilter, ProperPairPolicy};
use crate::rewrite::{
    AlignmentSource, BamRewriter, BamSink, BamSource, PassthroughHandler, DEFAULT_BUFFER_LIMIT,
};
use crate::runtime::Error;
use crate::threading::{ErrorMode, Job, JobPool};

use super::{determine_thread_counts_1, determine_thread_counts_2};

#[derive(Args)]
pub struct RewriteCMD {
    #[arg(short = 'i', value_parser, num_args = 1.., required = true)]
    /// Position-sorted BAM file(s)
    pub path_in: Vec<PathBuf>,

    #[arg(short = 'o', value_parser)]
    /// Output BAM (one input) or output directory (several inputs)
    pub path_out: PathBuf,

    #[arg(long = "buffer-limit", value_parser, default_value_t = DEFAULT_BUFFER_LIMIT)]
    /// Soft cap on buffered output records between flushes
    pub buffer_limit: usize,

    #[arg(long = "chr", value_parser)]
    /// Only rewrite this chromosome
    pub chromosome: Option<String>,

    #[arg(long = "keep-unpaired", value_parser, default_value = "false")]
    /// Also emit reads whose mate never arrives
    pub keep_unpaired: bool,

    #[arg(long = "keep-failed-pairs", value_parser, default_value = "false")]
    /// Historical switch; a rejected pair is dropped either way
    pub keep_failed_pairs: bool,

    #[arg(long = "error-mode", value_enum, default_value = "wait")]
    /// What a failing input does to the others (several inputs only)
    pub error_mode: ErrorMode,

    //Thread settings
    #[arg(short = '@', value_parser = clap::value_parser!(usize))]
    num_threads_total: Option<usize>,
}
impl RewriteCMD {
    /// Run the commandline option
    pub fn try_execute(&mut self) -> Result<()> {
        let (num_threads_pool, num_threads_htslib) = if self.path_in.len() == 1 {
            (1, determine_thread_counts_1(self.num_threads_total)?)
        } else {
            determine_thread_counts_2(self.num_threads_total, None)?
        };
        println!(
            "Using {} pool threads, {} htslib threads",
            num_threads_pool, num_threads_htslib
        );

        Rewrite::run(&Rewrite {
            paths_in: self.path_in.clone(),
            path_out: self.path_out.clone(),
            buffer_limit: self.buffer_limit,
            chromosome: self.chromosome.clone(),
            keep_unpaired: self.keep_unpaired,
            remove_failed_pairs: !self.keep_failed_pairs,
            error_mode: self.error_mode,
            num_threads_pool,
            num_threads_htslib,
        })?;

        log::info!("Rewrite has finished succesfully");
        Ok(())
    }
}

pub struct Rewrite {
    pub paths_in: Vec<PathBuf>,
    pub path_out: PathBuf,
    pub buffer_limit: usize,
    pub chromosome: Option<String>,
    pub keep_unpaired: bool,
    pub remove_failed_pairs: bool,
    pub error_mode: ErrorMode,
    pub num_threads_pool: usize,
    pub num_threads_htslib: usize,
}
impl Rewrite {
    /// Run the algorithm
    pub fn run(params: &Rewrite) -> Result<()> {
        if params.paths_in.is_empty() {
            return Err(Error::empty_input("Input file list").into());
        }

        if let [path_in] = params.paths_in.as_slice() {
            return rewrite_one(
                path_in,
                &params.path_out,
                params.buffer_limit,
                params.chromosome.as_deref(),
                params.keep_unpaired,
                params.remove_failed_pairs,
                params.num_threads_htslib,
            );
        }

        // several inputs become jobs on the bounded pool, output lands in a
        // directory under each input's file name
        std::fs::create_dir_all(&params.path_out)?;
        let mut seen_names: FxHashSet<std::ffi::OsString> = FxHashSet::default();
        let mut jobs = Vec::new();
        for path_in in &params.paths_in {
            let file_name = path_in
                .file_name()
                .ok_or_else(|| anyhow!("Input path {:?} has no file name", path_in))?;
            if !seen_names.insert(file_name.to_os_string()) {
                return Err(anyhow!(
                    "Two inputs share the file name {:?}; their outputs in {:?} would overwrite each other",
                    file_name,
                    params.path_out
                ));
            }
            let path_out = params.path_out.join(file_name);
            let path_in = path_in.clone();
            let buffer_limit = params.buffer_limit;
            let chromosome = params.chromosome.clone();
            let keep_unpaired = params.keep_unpaired;
            let remove_failed_pairs = params.remove_failed_pairs;
            let num_threads_htslib = params.num_threads_htslib;

            jobs.push(Job::new(file_name.to_string_lossy(), move || {
                rewrite_one(
                    &path_in,
                    &path_out,
                    buffer_limit,
                    chromosome.as_deref(),
                    keep_unpaired,
                    remove_failed_pairs,
                    num_threads_htslib,
                )
            }));
        }
        JobPool::new(params.num_threads_pool, params.error_mode).process(jobs)
    }
}

fn rewrite_one(
    path_in: &Path,
    path_out: &Path,
    buffer_limit: usize,
    chromosome: Option<&str>,
    keep_unpaired: bool,
    remove_failed_pairs: bool,
    num_threads_htslib: usize,
) -> Result<()> {
    let source = BamSource::from_path(path_in, num_threads_htslib)?;
    let tid = match chromosome {
        Some(name) => Some(
            source
                .reference_index(name)
                .ok_or_else(|| anyhow!("Chromosome {} not found in {:?}", name, path_in))?,
        ),
        None => None,
    };
    let sink = BamSink::from_path(path_out, source.header(), num_threads_htslib)?;

    let filter = PairFilter::new(ProperPairPolicy::new(), remove_failed_pairs);
    let stats = BamRewriter::new(source, sink, filter, PassthroughHandler)
        .with_buffer_limit(buffer_limit)
        .with_chromosome_filter(tid)
        .with_unpaired(keep_unpaired)
        .run()?;

    log::info!(
        "{:?}: {} records read, {} pairs emitted, {} records written, {} suppressed, {} unpaired flushed",
        path_in,
        stats.records_read,
        stats.pairs_emitted,
        stats.records_written,
        stats.records_suppressed,
        stats.unpaired_flushed
    );
    Ok(())
}
