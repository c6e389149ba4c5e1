#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/keystone/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod error;
pub mod frame;
pub mod source;
pub mod yahoo;

pub use cache::{CacheStats, SqliteCache};
pub use error::{DataError, Result};
pub use source::{InMemoryPriceSource, PriceSource, YahooPriceSource};
pub use yahoo::YahooQuoteProvider;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
