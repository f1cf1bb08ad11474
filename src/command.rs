use clap::Subcommand;

pub mod process;
pub mod rewrite;
pub mod threadcount;

pub use process::{Process, ProcessCMD};
pub use rewrite::{Rewrite, RewriteCMD};
pub use threadcount::{determine_thread_counts_1, determine_thread_counts_2};

///////////////////////////////
/// Possible subcommands to parse
#[derive(Subcommand)]
pub enum Commands {
    Rewrite(RewriteCMD),
    Process(ProcessCMD),
}
