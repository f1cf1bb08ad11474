use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Args;

use crate::genome::{FastaGenome, GenomeReference};
use crate::processing::{GenomeProcessor, RewriteTask, WorkItem};
use crate::rewrite::DEFAULT_BUFFER_LIMIT;

use super::determine_thread_counts_2;

#[derive(Args)]
pub struct ProcessCMD {
    #[arg(short = 'i', value_parser, num_args = 1.., required = true)]
    /// Position-sorted BAM file(s)
    pub path_in: Vec<PathBuf>,

    #[arg(short = 'o', value_parser)]
    /// Output directory; one BAM per (input, chromosome)
    pub path_out: PathBuf,

    #[arg(short = 'g', long = "genome", value_parser)]
    /// Reference FASTA, indexed with samtools faidx
    pub path_genome: PathBuf,

    #[arg(long = "chrs", value_parser, value_delimiter = ',')]
    /// Restrict and order the chromosomes to process (default: all FASTA
    /// sequences in index order)
    pub chromosomes: Option<Vec<String>>,

    #[arg(long = "max-resident", value_parser)]
    /// Cap on chromosome references held in memory at once
    pub max_resident: Option<usize>,

    #[arg(long = "throttle-files", value_parser, default_value = "false")]
    /// Visit each input's chromosomes in the configured order
    pub throttle_files: bool,

    #[arg(long = "buffer-limit", value_parser, default_value_t = DEFAULT_BUFFER_LIMIT)]
    /// Soft cap on buffered output records between flushes
    pub buffer_limit: usize,

    #[arg(long = "keep-unpaired", value_parser, default_value = "false")]
    /// Also emit reads whose mate never arrives
    pub keep_unpaired: bool,

    //Thread settings
    #[arg(short = '@', value_parser = clap::value_parser!(usize))]
    num_threads_total: Option<usize>,

    #[arg(long = "threads-htslib", value_parser = clap::value_parser!(usize))]
    num_threads_htslib: Option<usize>,
}
impl ProcessCMD {
    /// Run the commandline option
    pub fn try_execute(&mut self) -> Result<()> {
        let (num_threads_pool, num_threads_htslib) =
            determine_thread_counts_2(self.num_threads_total, self.num_threads_htslib)?;
        println!(
            "Using {} pool threads, {} htslib threads per job",
            num_threads_pool, num_threads_htslib
        );

        Process::run(&Process {
            paths_in: self.path_in.clone(),
            path_out: self.path_out.clone(),
            path_genome: self.path_genome.clone(),
            chromosomes: self.chromosomes.clone(),
            max_resident: self.max_resident,
            throttle_files: self.throttle_files,
            buffer_limit: self.buffer_limit,
            keep_unpaired: self.keep_unpaired,
            num_threads_pool,
            num_threads_htslib,
        })?;

        log::info!("Process has finished succesfully");
        Ok(())
    }
}

pub struct Process {
    pub paths_in: Vec<PathBuf>,
    pub path_out: PathBuf,
    pub path_genome: PathBuf,
    pub chromosomes: Option<Vec<String>>,
    pub max_resident: Option<usize>,
    pub throttle_files: bool,
    pub buffer_limit: usize,
    pub keep_unpaired: bool,
    pub num_threads_pool: usize,
    pub num_threads_htslib: usize,
}
impl Process {
    /// Run the algorithm
    pub fn run(params: &Process) -> Result<()> {
        let genome = FastaGenome::new(&params.path_genome)?;
        let chromosomes = match &params.chromosomes {
            Some(chrs) if !chrs.is_empty() => chrs.clone(),
            _ => genome.chromosome_names(),
        };

        std::fs::create_dir_all(&params.path_out)?;
        let work_items = params
            .paths_in
            .iter()
            .map(|path| {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(String::from)
                    .ok_or_else(|| anyhow!("Input path {:?} has no file stem", path))?;
                Ok(WorkItem {
                    name,
                    path_in: path.clone(),
                })
            })
            .collect::<Result<Vec<WorkItem>>>()?;

        GenomeProcessor {
            genome,
            work_items,
            chromosomes,
            task: RewriteTask {
                path_out: params.path_out.clone(),
                buffer_limit: params.buffer_limit,
                keep_unpaired: params.keep_unpaired,
                remove_failed_pairs: true,
                htslib_threads: params.num_threads_htslib,
            },
            num_threads: params.num_threads_pool,
            throttle_files: params.throttle_files,
            max_resident: params.max_resident,
        }
        .run()
    }
}
