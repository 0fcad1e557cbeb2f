//! Divergence engine: two frequency lists over one alphabet, and the
//! interval-bounded divergences between them.
//!
//! The reference list (usually store-backed) and the needle list (freshly
//! counted from the input) share an alphabet. Both divergences are
//! normalized into `[0, 1]`, with 0 meaning the needle looks exactly like
//! the reference and 1 meaning it shares nothing with it.
//!
//! Every quantity is carried as a [`FractervalU128`], and the one
//! [`Overflow`] flag for the computation travels with the result.

use std::collections::BTreeMap;

use crate::buffer::try_zeroed;
use crate::config::Polarity;
use crate::error::{DivergentError, Result};
use crate::fracterval::{FractervalU128, Overflow};
use crate::logarithm::{BinaryLog, LogProvider};
use crate::mask::MaskList;

// ---------------------------------------------------------------------------
// Frequency lists
// ---------------------------------------------------------------------------

/// Which of the engine's two distributions an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Which {
    Reference,
    Needle,
}

impl Which {
    pub fn other(self) -> Self {
        match self {
            Self::Reference => Self::Needle,
            Self::Needle => Self::Reference,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Needle => "needle",
        }
    }
}

impl std::fmt::Display for Which {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How much headroom a capacity check demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityMode {
    /// The list's own total must not overflow.
    Absorb,
    /// The combined total of both lists must not overflow either, so the
    /// mixture can be counted.
    Compare,
}

/// Per-mask occurrence counts plus their sum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreqList {
    counts: Vec<u64>,
    total: u64,
}

impl FreqList {
    /// All-zero list for an alphabet of `alphabet_size` masks.
    pub fn zeroed(alphabet_size: u64) -> Result<Self> {
        Ok(Self {
            counts: try_zeroed(alphabet_size, "frequency list")?,
            total: 0,
        })
    }

    /// Wrap explicit counts, deriving the total.
    pub fn from_counts(counts: Vec<u64>) -> Result<Self> {
        let total = counts
            .iter()
            .try_fold(0u64, |acc, &c| acc.checked_add(c))
            .ok_or_else(|| DivergentError::invalid("frequency counts overflow a 64-bit total"))?;
        Ok(Self { counts, total })
    }

    /// Counts whose total has already been verified by the caller.
    pub(crate) fn from_parts(counts: Vec<u64>, total: u64) -> Self {
        Self { counts, total }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn alphabet_size(&self) -> u64 {
        self.counts.len() as u64
    }

    pub fn reset(&mut self) {
        self.counts.fill(0);
        self.total = 0;
    }

    fn nonzero(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c != 0)
            .map(|(mask, &c)| (mask, c))
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A divergence and everything needed to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    pub value: FractervalU128,
    /// Byte offset of the extremal window in sweep mode.
    pub offset: Option<u64>,
    pub overflow: Overflow,
    /// False when the reference was empty and `value` is the sentinel.
    pub baseline_known: bool,
    pub polarity: Polarity,
}

/// Outcome of testing a divergence against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Floor-mean of the divergence bounds.
    pub mean: u128,
    /// Non-mundane judging by the floor-mean.
    pub alert: bool,
    /// Non-mundane for every value inside the bounds.
    pub provable: bool,
}

impl Divergence {
    fn sentinel(polarity: Polarity, offset: Option<u64>) -> Self {
        let value = match polarity {
            Polarity::MundaneLow => FractervalU128::fractoid(u128::MAX),
            Polarity::MundaneHigh => FractervalU128::zero(),
        };
        Self {
            value,
            offset,
            overflow: Overflow::new(),
            baseline_known: false,
            polarity,
        }
    }

    pub fn classify(&self, threshold: u128) -> Verdict {
        let mean = self.value.mean();
        let (alert, provable) = match self.polarity {
            Polarity::MundaneLow => (mean > threshold, self.value.lo() > threshold),
            Polarity::MundaneHigh => (mean < threshold, self.value.hi() < threshold),
        };
        Verdict {
            mean,
            alert,
            provable,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Measure {
    Jensen,
    Leidich,
}

/// Reference and needle distributions plus the logarithm source.
#[derive(Debug)]
pub struct DivergenceEngine<L = BinaryLog> {
    reference: FreqList,
    needle: FreqList,
    log: L,
}

impl DivergenceEngine<BinaryLog> {
    /// Engine over `reference` with an empty needle of the same alphabet.
    pub fn from_reference(reference: FreqList) -> Result<Self> {
        Self::with_log(reference, BinaryLog::new())
    }
}

impl<L: LogProvider> DivergenceEngine<L> {
    pub fn with_log(reference: FreqList, log: L) -> Result<Self> {
        let needle = FreqList::zeroed(reference.alphabet_size())?;
        Ok(Self {
            reference,
            needle,
            log,
        })
    }

    pub fn freq_list(&self, which: Which) -> &FreqList {
        match which {
            Which::Reference => &self.reference,
            Which::Needle => &self.needle,
        }
    }

    pub fn into_reference(self) -> FreqList {
        self.reference
    }

    /// Destination list mutably and the other list shared.
    fn split(&mut self, which: Which) -> (&mut FreqList, &FreqList) {
        match which {
            Which::Reference => (&mut self.reference, &self.needle),
            Which::Needle => (&mut self.needle, &self.reference),
        }
    }

    /// Verify `which` can take `count` more masks.
    pub fn capacity_check(&self, which: Which, count: u64, mode: CapacityMode) -> Result<()> {
        let total = self.freq_list(which).total;
        let exceeded = || DivergentError::CapacityExceeded {
            which: which.name(),
            total,
            requested: count,
        };
        let grown = total.checked_add(count).ok_or_else(exceeded)?;
        if mode == CapacityMode::Compare {
            self.freq_list(which.other())
                .total
                .checked_add(grown)
                .ok_or_else(exceeded)?;
        }
        Ok(())
    }

    /// Count every mask in `masks` into `which`.
    pub fn load(&mut self, which: Which, masks: &[u32]) -> Result<()> {
        self.capacity_check(which, masks.len() as u64, CapacityMode::Absorb)?;
        let (dest, _) = self.split(which);
        let alphabet = dest.alphabet_size();
        if let Some(&bad) = masks.iter().find(|&&m| m as u64 >= alphabet) {
            return Err(DivergentError::invalid(format!(
                "mask {bad:#x} is outside the {alphabet}-mask alphabet"
            )));
        }
        for &m in masks {
            dest.counts[m as usize] += 1;
        }
        dest.total += masks.len() as u64;
        log::debug!("loaded {} masks into the {which} list", masks.len());
        Ok(())
    }

    /// Add the other list's counts into `which`.
    pub fn freq_list_add(&mut self, which: Which) -> Result<()> {
        self.capacity_check(which, self.freq_list(which.other()).total, CapacityMode::Absorb)?;
        let (dest, src) = self.split(which);
        for (d, &s) in dest.counts.iter_mut().zip(&src.counts) {
            *d += s;
        }
        dest.total += src.total;
        Ok(())
    }

    /// Subtract the other list's counts from `which`. Nothing changes if any
    /// count would go negative.
    pub fn freq_list_subtract(&mut self, which: Which) -> Result<()> {
        let (dest, src) = self.split(which);
        if let Some((mask, _)) = dest
            .counts
            .iter()
            .zip(&src.counts)
            .enumerate()
            .find(|(_, (d, s))| s > d)
        {
            return Err(DivergentError::invalid(format!(
                "subtracting would make the count of mask {mask:#x} negative; \
                 was this input absorbed before?"
            )));
        }
        for (d, &s) in dest.counts.iter_mut().zip(&src.counts) {
            *d -= s;
        }
        dest.total -= src.total;
        Ok(())
    }

    pub fn reset(&mut self, which: Which) {
        self.split(which).0.reset();
    }

    /// Normalized Jensen-Shannon divergence of the needle from the reference.
    ///
    /// With `sweep == 0` the needle list must already hold exactly these
    /// masks (see [`load`](Self::load)). With a nonzero `sweep`, `needle` is
    /// treated as a haystack and the most extreme window of `sweep` masks is
    /// reported.
    pub fn jsd(&mut self, polarity: Polarity, needle: &MaskList, sweep: u64) -> Result<Divergence> {
        self.measure(Measure::Jensen, polarity, needle, sweep)
    }

    /// Normalized asymmetric (Leidich) divergence. Same calling convention as
    /// [`jsd`](Self::jsd).
    pub fn ld(&mut self, polarity: Polarity, needle: &MaskList, sweep: u64) -> Result<Divergence> {
        self.measure(Measure::Leidich, polarity, needle, sweep)
    }

    fn measure(
        &mut self,
        measure: Measure,
        polarity: Polarity,
        needle: &MaskList,
        sweep: u64,
    ) -> Result<Divergence> {
        if needle.alphabet_size() != self.reference.alphabet_size() {
            return Err(DivergentError::invalid(format!(
                "needle alphabet of {} masks does not match the reference's {}",
                needle.alphabet_size(),
                self.reference.alphabet_size()
            )));
        }
        let alphabet = self.reference.alphabet_size();
        if let Some(&bad) = needle.masks().iter().find(|&&m| m as u64 >= alphabet) {
            return Err(DivergentError::invalid(format!(
                "mask {bad:#x} is outside the {alphabet}-mask alphabet"
            )));
        }
        if sweep == 0 {
            if self.needle.total != needle.len() as u64 {
                return Err(DivergentError::invalid(format!(
                    "needle list holds {} masks but {} were passed; load them first",
                    self.needle.total,
                    needle.len()
                )));
            }
            self.whole(measure, polarity)
        } else {
            self.sweep(measure, polarity, needle, sweep)
        }
    }

    fn whole(&mut self, measure: Measure, polarity: Polarity) -> Result<Divergence> {
        let q_total = self.needle.total;
        if q_total == 0 {
            return Err(DivergentError::invalid("needle holds no masks"));
        }
        let p_total = self.reference.total;
        if p_total == 0 {
            log::info!("reference is empty; reporting the unknown-baseline sentinel");
            return Ok(Divergence::sentinel(polarity, None));
        }

        let mut overflow = Overflow::new();
        let norm = normalizer(&mut self.log, measure, p_total, q_total, &mut overflow);
        let value = score(
            &mut self.log,
            &self.reference,
            measure,
            self.needle.nonzero(),
            q_total,
            norm,
            &mut overflow,
        );
        log::debug!("{measure:?} divergence {value} (normalizer {norm})");
        Ok(Divergence {
            value,
            offset: None,
            overflow,
            baseline_known: true,
            polarity,
        })
    }

    fn sweep(
        &mut self,
        measure: Measure,
        polarity: Polarity,
        haystack: &MaskList,
        window: u64,
    ) -> Result<Divergence> {
        let masks = haystack.masks();
        let w = usize::try_from(window)
            .ok()
            .filter(|&w| w <= masks.len())
            .ok_or_else(|| {
                DivergentError::invalid(format!(
                    "sweep window of {window} masks exceeds the {} masks available",
                    masks.len()
                ))
            })?;
        let p_total = self.reference.total;
        if p_total == 0 {
            log::info!("reference is empty; reporting the unknown-baseline sentinel");
            return Ok(Divergence::sentinel(polarity, Some(haystack.byte_offset(0))));
        }
        self.capacity_check(Which::Reference, window, CapacityMode::Absorb)?;

        let mut overflow = Overflow::new();
        let norm = normalizer(&mut self.log, measure, p_total, window, &mut overflow);

        let mut counts: BTreeMap<u32, u64> = BTreeMap::new();
        for &m in &masks[..w] {
            *counts.entry(m).or_default() += 1;
        }

        let mut best: Option<(usize, FractervalU128)> = None;
        for start in 0..=masks.len() - w {
            if start > 0 {
                let leaving = masks[start - 1];
                if let Some(c) = counts.get_mut(&leaving) {
                    *c -= 1;
                    if *c == 0 {
                        counts.remove(&leaving);
                    }
                }
                *counts.entry(masks[start + w - 1]).or_default() += 1;
            }
            let bins = counts.iter().map(|(&m, &c)| (m as usize, c));
            let value = score(
                &mut self.log,
                &self.reference,
                measure,
                bins,
                window,
                norm,
                &mut overflow,
            );
            let better = match best {
                None => true,
                Some((_, held)) => match polarity {
                    Polarity::MundaneLow => value.mean() > held.mean(),
                    Polarity::MundaneHigh => value.mean() < held.mean(),
                },
            };
            if better {
                best = Some((start, value));
            }
        }

        let (start, value) = best.unwrap_or((0, FractervalU128::zero()));
        log::debug!(
            "{measure:?} sweep over {} windows picked mask {start}: {value}",
            masks.len() - w + 1
        );
        Ok(Divergence {
            value,
            offset: Some(haystack.byte_offset(start as u64)),
            overflow,
            baseline_known: true,
            polarity,
        })
    }
}

// ---------------------------------------------------------------------------
// Interval sums
// ---------------------------------------------------------------------------

/// `(x / total) · log2(x) / 64`.
fn weighted_log<L: LogProvider>(
    log: &mut L,
    x: u64,
    total: u64,
    overflow: &mut Overflow,
) -> FractervalU128 {
    FractervalU128::from_ratio(x as u128, total as u128, overflow).multiply(log.log2_scaled(x))
}

/// Largest possible unnormalized divergence for the given totals.
fn normalizer<L: LogProvider>(
    log: &mut L,
    measure: Measure,
    p_total: u64,
    q_total: u64,
    overflow: &mut Overflow,
) -> FractervalU128 {
    let n_total = p_total.saturating_add(q_total);
    let whole = log.log2_scaled(n_total);
    match measure {
        Measure::Jensen => {
            let parts = weighted_log(log, p_total, n_total, overflow)
                .add(weighted_log(log, q_total, n_total, overflow), overflow);
            whole.saturating_sub(parts)
        }
        Measure::Leidich => whole.saturating_sub(log.log2_scaled(q_total)),
    }
}

/// Normalized divergence of the needle bins `(mask, q)` against `reference`.
///
/// Only masks present on both sides contribute to the similarity sum.
fn score<L: LogProvider>(
    log: &mut L,
    reference: &FreqList,
    measure: Measure,
    bins: impl Iterator<Item = (usize, u64)>,
    q_total: u64,
    norm: FractervalU128,
    overflow: &mut Overflow,
) -> FractervalU128 {
    let n_total = reference.total.saturating_add(q_total);
    let mut mixed = FractervalU128::zero();
    let mut parts = FractervalU128::zero();
    for (mask, q) in bins {
        let p = reference.counts[mask];
        if p == 0 {
            continue;
        }
        let m = p + q;
        match measure {
            Measure::Jensen => {
                mixed = mixed.add(weighted_log(log, m, n_total, overflow), overflow);
                parts = parts
                    .add(weighted_log(log, p, n_total, overflow), overflow)
                    .add(weighted_log(log, q, n_total, overflow), overflow);
            }
            Measure::Leidich => {
                let gain = log.log2_scaled(m).saturating_sub(log.log2_scaled(q));
                let weight = FractervalU128::from_ratio(q as u128, q_total as u128, overflow);
                mixed = mixed.add(weight.multiply(gain), overflow);
            }
        }
    }
    let similarity = mixed.saturating_sub(parts);
    similarity.saturating_div(norm).complement()
}
