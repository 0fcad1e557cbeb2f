//! One invocation, start to finish: bytes in, report and status bits out.
//!
//! ```text
//! input → masks → (store → reference) + needle → divergence → verdict
//!       → absorb → stamp + persist
//! ```
//!
//! The divergence is always taken against the reference as loaded, before
//! any absorption. Nothing is written unless every earlier step succeeded.

use serde::Serialize;

use crate::config::{AbsorbPolicy, RunConfig};
use crate::divergence::{CapacityMode, Divergence, DivergenceEngine, Verdict, Which};
use crate::error::Result;
use crate::fracterval::FixedWord;
use crate::mask::{self, MaskList};
use crate::store::{self, StoreRecord};

// ---------------------------------------------------------------------------
// Status bits
// ---------------------------------------------------------------------------

/// Process exit status: independent error, warning and alert bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Status(u8);

impl Status {
    pub const ERROR: u8 = 1;
    pub const WARNING: u8 = 2;
    pub const ALERT: u8 = 4;

    pub fn error() -> Self {
        Self(Self::ERROR)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    fn set(&mut self, bit: u8, on: bool) {
        if on {
            self.0 |= bit;
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Everything one run found out, ready for JSON.
///
/// Fixed-point words appear twice: exact as hex and approximate as `f64`.
#[derive(Debug, Clone, Serialize)]
pub struct DivergenceReport {
    /// `"jsd"` or `"ld"`.
    pub measure: &'static str,
    pub polarity: String,
    pub absorb: String,
    pub divergence: f64,
    pub divergence_hex: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub lower_bound_hex: String,
    pub upper_bound_hex: String,
    /// The bounds narrowed to 64-bit words.
    pub narrow_lower_hex: String,
    pub narrow_upper_hex: String,
    pub threshold: f64,
    pub threshold_hex: String,
    /// Byte offset of the extremal sweep window.
    pub offset: Option<u64>,
    pub mask_count: usize,
    pub alphabet_size: u64,
    pub ignored_tail: usize,
    pub baseline_known: bool,
    pub overflow: bool,
    pub alert: bool,
    pub provable_alert: bool,
    pub absorbed: bool,
    pub store_written: bool,
    /// Masks in the reference after absorption.
    pub reference_total: u64,
}

impl DivergenceReport {
    fn new(
        config: &RunConfig,
        policy: AbsorbPolicy,
        masks: &MaskList,
        divergence: &Divergence,
        verdict: &Verdict,
    ) -> Self {
        let value = divergence.value;
        let narrow = value.narrow();
        Self {
            measure: if config.mode.asymmetric { "ld" } else { "jsd" },
            polarity: divergence.polarity.to_string(),
            absorb: policy.to_string(),
            divergence: verdict.mean.to_unit_f64(),
            divergence_hex: format!("{:#034x}", verdict.mean),
            lower_bound: value.lo().to_unit_f64(),
            upper_bound: value.hi().to_unit_f64(),
            lower_bound_hex: format!("{:#034x}", value.lo()),
            upper_bound_hex: format!("{:#034x}", value.hi()),
            narrow_lower_hex: format!("{:#018x}", narrow.lo()),
            narrow_upper_hex: format!("{:#018x}", narrow.hi()),
            threshold: config.threshold.to_unit_f64(),
            threshold_hex: format!("{:#034x}", config.threshold),
            offset: divergence.offset,
            mask_count: masks.len(),
            alphabet_size: masks.alphabet_size(),
            ignored_tail: masks.ignored_tail(),
            baseline_known: divergence.baseline_known,
            overflow: divergence.overflow.is_raised(),
            alert: verdict.alert,
            provable_alert: verdict.provable,
            absorbed: false,
            store_written: false,
            reference_total: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub report: DivergenceReport,
    pub status: Status,
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Score `input` against the store named by `config` and absorb it per the
/// configured policy.
pub fn evaluate(config: &RunConfig, input: &[u8]) -> Result<Outcome> {
    config.mode.validate()?;
    let masks = mask::build(input, &config.geometry)?;
    let alphabet = masks.alphabet_size();

    let (record, existed) = match store::load(&config.store, alphabet)? {
        Some(record) => (record, true),
        None => {
            log::info!(
                "no store at {}; starting from an empty reference",
                config.store.display()
            );
            (StoreRecord::fresh(alphabet)?, false)
        }
    };
    let was_fresh = record.is_fresh();
    let policy = config.mode.absorb.for_store(existed);
    if policy != config.mode.absorb {
        log::info!("store is new; absorbing with {policy} instead of {}", config.mode.absorb);
    }

    let mut engine = DivergenceEngine::from_reference(record.into_freq_list())?;
    engine.capacity_check(Which::Needle, masks.len() as u64, CapacityMode::Compare)?;
    engine.load(Which::Needle, masks.masks())?;

    let polarity = config.mode.polarity;
    let divergence = if config.mode.asymmetric {
        engine.ld(polarity, &masks, config.sweep)?
    } else {
        engine.jsd(polarity, &masks, config.sweep)?
    };
    let verdict = divergence.classify(config.threshold);
    if divergence.overflow.is_raised() {
        log::warn!("fracterval overflow: the reported bounds were clipped");
    }

    let mut report = DivergenceReport::new(config, policy, &masks, &divergence, &verdict);
    report.absorbed = store::absorb(&mut engine, policy, config.mode.reset, verdict.alert)?;

    let reference = engine.into_reference();
    report.reference_total = reference.total();
    if policy.writes_store() {
        let fresh = (was_fresh || config.mode.reset) && reference.total() == 0;
        let record = StoreRecord::stamp(reference, fresh)?;
        store::save(&config.store, &record)?;
        report.store_written = true;
    }

    let mut status = Status::default();
    status.set(Status::WARNING, report.overflow || report.ignored_tail != 0);
    status.set(Status::ALERT, verdict.alert);
    log::debug!("run finished with status {:#x}", status.bits());

    Ok(Outcome { report, status })
}
