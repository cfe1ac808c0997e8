//! Curation for vidlore: bias scanning and knowledge-base optimization.
//!
//! Both halves run against [`vidlore_storage::Storage`] and talk to the
//! generative service through [`vidlore_ingest::CompletionClient`]. Safe
//! maintenance runs automatically; destructive actions go through the
//! approval queue and are executed only once a reviewer approves them.

pub mod bias;
pub mod optimizer;

pub use bias::{BiasScanner, ScanEvent, ScanSink, ScanSummary, SilentScan};
pub use optimizer::{
    AutoSummary, ExecutionSummary, OptimizeEvent, OptimizeSink, Optimizer, SilentOptimize,
};
