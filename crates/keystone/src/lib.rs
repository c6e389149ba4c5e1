#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/keystone/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod pipeline;

// Re-export main types from sub-crates
pub use keystone_data as data;
pub use keystone_engine as engine;
pub use keystone_output as output;

pub use pipeline::{AnalysisConfig, AnalysisResult, PipelineError, fetch_and_run, run_analysis};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
