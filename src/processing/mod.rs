pub mod chrom_cache;
pub mod genome_processor;
pub mod throttle;

pub use chrom_cache::{ChromosomeCache, ChromosomeRef};
pub use genome_processor::{ChromosomeTask, GenomeProcessor, RewriteTask, WorkItem};
pub use throttle::FileThrottle;
