pub mod config;
pub mod context;
pub mod engines;
pub mod enhance;
pub mod ensemble;
pub mod error;
pub mod fingerprint;
pub mod goal_stats;
pub mod ledger;
pub mod logging;
pub mod markets;
pub mod pipeline;
pub mod sequence;
pub mod store;
pub mod thresholds;
pub mod trends;

pub use error::{PatternError, PatternResult};
