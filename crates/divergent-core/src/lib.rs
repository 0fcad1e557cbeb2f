//! # divergent-core
//!
//! **How far is this data from everything seen before?**
//!
//! `divergent-core` counts fixed-width symbols ("masks") in a byte stream and
//! measures how far their distribution diverges from a reference distribution
//! accumulated over many earlier runs. Every number on that path is a
//! guaranteed-containing interval, so a reported score can be trusted to
//! bracket the exact real value.
//!
//! ## Quick Start
//!
//! ```no_run
//! use divergent_core::{RunConfig, evaluate};
//!
//! let config = RunConfig::default();
//! let outcome = evaluate(&config, b"some bytes to score").unwrap();
//! println!("divergence {:.6}", outcome.report.divergence);
//! ```
//!
//! ## Architecture
//!
//! Bytes → MaskList → DivergenceEngine (reference + needle) → Divergence → Store
//!
//! - [`fracterval`]: fixed-point interval arithmetic with a sticky overflow flag.
//! - [`logarithm`]: rigorous `log2` bounds for counts.
//! - [`mask`]: extraction, deltas, densify, surroundify, channelize.
//! - [`divergence`]: frequency lists, JSD and Leidich divergence, sweep search.
//! - [`store`]: the checksummed on-disk reference and the absorption protocol.
//! - [`run`]: one invocation wired end to end.

mod buffer;
pub mod config;
pub mod divergence;
pub mod error;
pub mod fracterval;
pub mod logarithm;
pub mod mask;
pub mod run;
pub mod store;

pub use config::{
    AbsorbPolicy, DEFAULT_STORE, DEFAULT_THRESHOLD, Geometry, Mode, Polarity, RunConfig,
    parse_bitfield, parse_threshold,
};
pub use divergence::{CapacityMode, Divergence, DivergenceEngine, FreqList, Verdict, Which};
pub use error::{DivergentError, Result};
pub use fracterval::{FixedWord, Fracterval, FractervalU64, FractervalU128, Overflow};
pub use logarithm::{BinaryLog, LogProvider};
pub use mask::MaskList;
pub use run::{DivergenceReport, Outcome, Status, evaluate};
pub use store::StoreRecord;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
