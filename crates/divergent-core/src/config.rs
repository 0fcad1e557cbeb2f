//! Run configuration: the geometry and mode bitfields plus the threshold.
//!
//! Geometry (one byte):
//!
//! ```text
//! bit 7     6          5..4    3            2        1..0
//!     overlap channelize deltas surroundify densify granularity
//! ```
//!
//! Mode (one byte, bits 5..7 must be clear):
//!
//! ```text
//! bit 4           3        2     1..0
//!     asymmetric  polarity reset absorb
//! ```
//!
//! The geometry must be identical across every invocation that shares a
//! store file. Nothing here can detect a change that preserves the alphabet
//! size.

use std::path::PathBuf;

use crate::error::{DivergentError, Result};

/// Threshold used when the caller does not supply one: one half.
pub const DEFAULT_THRESHOLD: u128 = 1 << 127;

/// Store file used when the caller does not supply one.
pub const DEFAULT_STORE: &str = "divergent.zorb";

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// How a byte stream is cut into masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    /// Mask width in bytes, minus one (0..=3).
    pub granularity: u8,
    pub densify: bool,
    pub surroundify: bool,
    /// Delta passes (0..=3).
    pub deltas: u8,
    pub channelize: bool,
    pub overlap: bool,
}

impl Geometry {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            granularity: bits & 0b11,
            densify: bits & (1 << 2) != 0,
            surroundify: bits & (1 << 3) != 0,
            deltas: (bits >> 4) & 0b11,
            channelize: bits & (1 << 6) != 0,
            overlap: bits & (1 << 7) != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        (self.granularity & 0b11)
            | (self.densify as u8) << 2
            | (self.surroundify as u8) << 3
            | (self.deltas & 0b11) << 4
            | (self.channelize as u8) << 6
            | (self.overlap as u8) << 7
    }

    /// Bytes per mask.
    pub fn mask_width(&self) -> usize {
        self.granularity as usize + 1
    }

    /// Largest mask value before any densification.
    pub fn full_mask_max(&self) -> u32 {
        match self.granularity {
            3 => u32::MAX,
            g => (1u32 << (8 * (g as u32 + 1))) - 1,
        }
    }

    /// Whether the transforms need the input to be a whole number of masks.
    pub fn needs_whole_masks(&self) -> bool {
        self.densify || self.surroundify || self.deltas > 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.granularity > 3 || self.deltas > 3 {
            return Err(DivergentError::invalid(format!(
                "geometry {:#04x} is out of range",
                self.bits()
            )));
        }
        if self.overlap && self.deltas > 0 {
            return Err(DivergentError::invalid(
                "deltas are only defined over non-overlapping masks",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Which side of the threshold counts as unremarkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Small divergence is mundane; large divergence alerts.
    #[default]
    MundaneLow,
    /// Large divergence is mundane; small divergence alerts.
    MundaneHigh,
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MundaneLow => write!(f, "mundane_low"),
            Self::MundaneHigh => write!(f, "mundane_high"),
        }
    }
}

/// How the needle is folded into the stored reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbsorbPolicy {
    /// Report only; the store is never written.
    #[default]
    ReportOnly,
    Add,
    Subtract,
    /// Add only when the divergence just computed was mundane.
    AddIfMundane,
}

impl AbsorbPolicy {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::ReportOnly,
            1 => Self::Add,
            2 => Self::Subtract,
            _ => Self::AddIfMundane,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::ReportOnly => 0,
            Self::Add => 1,
            Self::Subtract => 2,
            Self::AddIfMundane => 3,
        }
    }

    /// Whether the store is rewritten under this policy.
    pub fn writes_store(self) -> bool {
        self != Self::ReportOnly
    }

    /// Policy to enact given whether a store file already existed.
    ///
    /// Without an existing baseline every divergence is the non-mundane
    /// sentinel, so add-if-mundane becomes a plain add for the first record.
    pub fn for_store(self, store_existed: bool) -> Self {
        match self {
            Self::AddIfMundane if !store_existed => Self::Add,
            other => other,
        }
    }
}

impl std::fmt::Display for AbsorbPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReportOnly => write!(f, "report_only"),
            Self::Add => write!(f, "add"),
            Self::Subtract => write!(f, "subtract"),
            Self::AddIfMundane => write!(f, "add_if_mundane"),
        }
    }
}

/// Decoded mode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mode {
    pub absorb: AbsorbPolicy,
    /// Zero the reference before adding.
    pub reset: bool,
    pub polarity: Polarity,
    /// Use the asymmetric (Leidich) divergence instead of JSD.
    pub asymmetric: bool,
}

impl Mode {
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits >> 5 != 0 {
            return Err(DivergentError::invalid(format!(
                "mode {bits:#04x} sets reserved bits"
            )));
        }
        let mode = Self {
            absorb: AbsorbPolicy::from_bits(bits),
            reset: bits & (1 << 2) != 0,
            polarity: if bits & (1 << 3) != 0 {
                Polarity::MundaneHigh
            } else {
                Polarity::MundaneLow
            },
            asymmetric: bits & (1 << 4) != 0,
        };
        mode.validate()?;
        Ok(mode)
    }

    pub fn bits(&self) -> u8 {
        self.absorb.bits()
            | (self.reset as u8) << 2
            | ((self.polarity == Polarity::MundaneHigh) as u8) << 3
            | (self.asymmetric as u8) << 4
    }

    pub fn validate(&self) -> Result<()> {
        if self.reset && self.absorb != AbsorbPolicy::Add {
            return Err(DivergentError::invalid("reset is only valid with absorb=add"));
        }
        // Divergence must not be taken from a distribution about to be mutated.
        if self.asymmetric && self.absorb != AbsorbPolicy::ReportOnly {
            return Err(DivergentError::invalid(
                "asymmetric divergence is only valid with absorb=report-only",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Everything one invocation needs besides the input bytes.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub geometry: Geometry,
    pub mode: Mode,
    /// Fixed-point threshold for the mundane test.
    pub threshold: u128,
    /// Sweep window in masks; 0 scores the whole needle.
    pub sweep: u64,
    pub store: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            geometry: Geometry::default(),
            mode: Mode::default(),
            threshold: DEFAULT_THRESHOLD,
            sweep: 0,
            store: PathBuf::from(DEFAULT_STORE),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse a bitfield byte given as decimal or `0x` hex.
pub fn parse_bitfield(s: &str) -> Result<u8> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|_| DivergentError::invalid(format!("'{s}' is not a byte value")))
}

/// Parse a threshold: a decimal fraction in `[0, 1]` or a `0x` fixed-point word.
pub fn parse_threshold(s: &str) -> Result<u128> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u128::from_str_radix(hex, 16)
            .map_err(|_| DivergentError::invalid(format!("'{s}' is not a 128-bit word")));
    }
    let value: f64 = s
        .parse()
        .map_err(|_| DivergentError::invalid(format!("'{s}' is not a number")))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(DivergentError::invalid(format!(
            "threshold {value} is outside [0, 1]"
        )));
    }
    // The float-to-int cast saturates, so 1.0 lands on the top word.
    Ok((value * 2f64.powi(128)) as u128)
}
