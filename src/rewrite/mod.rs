pub mod handler;
pub mod io;
pub mod rewriter;

pub use handler::{PairHandler, PassthroughHandler};
pub use io::{AlignmentSink, AlignmentSource, BamSink, BamSource};
pub use rewriter::{BamRewriter, RewriteStats, DEFAULT_BUFFER_LIMIT};
