//! Mask pipeline: turns a raw byte stream into the symbol sequence that the
//! divergence engine counts.
//!
//! # Stages
//!
//! ```text
//! bytes → extract → delta × n → densify → surroundify → MaskList
//! ```
//!
//! - **Extract** reads `granularity + 1` little-endian bytes per mask, either
//!   in disjoint chunks or (with overlap) sliding one byte at a time.
//! - **Delta** replaces each mask with its wrapping difference from the
//!   previous one. The first mask is left alone.
//! - **Densify** ranks the distinct masks in use onto `[0, k - 1]`.
//! - **Surroundify** subtracts the minimum and folds each value so that
//!   small distances from either extreme become small codes.
//!
//! With channelize set, delta, densify and surroundify work on each byte
//! lane of the mask independently.

use crate::buffer::try_with_capacity;
use crate::config::Geometry;
use crate::error::{DivergentError, Result};

/// Masks extracted from one input, with the alphabet they live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskList {
    masks: Vec<u32>,
    mask_max: u32,
    width: usize,
    overlap: bool,
    ignored_tail: usize,
}

impl MaskList {
    /// Wrap an already-built mask sequence.
    pub fn from_masks(masks: Vec<u32>, mask_max: u32, width: usize, overlap: bool) -> Self {
        Self {
            masks,
            mask_max,
            width,
            overlap,
            ignored_tail: 0,
        }
    }

    pub fn masks(&self) -> &[u32] {
        &self.masks
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn mask_max(&self) -> u32 {
        self.mask_max
    }

    /// Number of symbols in the alphabet, `mask_max + 1`.
    pub fn alphabet_size(&self) -> u64 {
        self.mask_max as u64 + 1
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Trailing bytes that did not fill a whole mask and were skipped.
    pub fn ignored_tail(&self) -> usize {
        self.ignored_tail
    }

    /// Byte offset in the input where mask `index` starts.
    pub fn byte_offset(&self, index: u64) -> u64 {
        if self.overlap {
            index
        } else {
            index * self.width as u64
        }
    }
}

/// Run the full pipeline over `bytes`.
pub fn build(bytes: &[u8], geometry: &Geometry) -> Result<MaskList> {
    geometry.validate()?;
    let width = geometry.mask_width();
    if geometry.needs_whole_masks() && bytes.len() % width != 0 {
        return Err(DivergentError::invalid(format!(
            "input of {} bytes is not a multiple of the {width}-byte mask width",
            bytes.len()
        )));
    }

    let mut masks = extract(bytes, width, geometry.overlap)?;
    let ignored_tail = if geometry.overlap && bytes.len() >= width {
        0
    } else {
        bytes.len() % width
    };
    if ignored_tail != 0 {
        log::warn!("ignoring {ignored_tail} trailing byte(s) that do not fill a {width}-byte mask");
    }

    for _ in 0..geometry.deltas {
        deltafy(&mut masks, width, geometry.channelize);
    }

    let mut mask_max = geometry.full_mask_max();
    if geometry.densify {
        mask_max = densify(&mut masks, width, geometry.channelize)?;
    }
    if geometry.surroundify {
        surroundify(&mut masks, width, geometry.channelize);
    }

    log::debug!(
        "built {} masks of {width} byte(s), mask_max {mask_max:#x}, geometry {:#04x}",
        masks.len(),
        geometry.bits()
    );

    Ok(MaskList {
        masks,
        mask_max,
        width,
        overlap: geometry.overlap,
        ignored_tail,
    })
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

fn extract(bytes: &[u8], width: usize, overlap: bool) -> Result<Vec<u32>> {
    if bytes.len() < width {
        return Ok(Vec::new());
    }
    let count = if overlap {
        bytes.len() - width + 1
    } else {
        bytes.len() / width
    };
    let mut masks = try_with_capacity(count, "mask list")?;
    if overlap {
        masks.extend(bytes.windows(width).map(read_mask));
    } else {
        masks.extend(bytes.chunks_exact(width).map(read_mask));
    }
    Ok(masks)
}

fn read_mask(chunk: &[u8]) -> u32 {
    chunk.iter().rev().fold(0, |acc, &b| (acc << 8) | b as u32)
}

fn width_mask(width: usize) -> u32 {
    if width >= 4 {
        u32::MAX
    } else {
        (1u32 << (8 * width)) - 1
    }
}

fn lane(mask: u32, l: usize) -> u8 {
    (mask >> (8 * l)) as u8
}

fn with_lane(mask: u32, l: usize, v: u8) -> u32 {
    (mask & !(0xff << (8 * l))) | ((v as u32) << (8 * l))
}

fn deltafy(masks: &mut [u32], width: usize, channelize: bool) {
    let keep = width_mask(width);
    for i in (1..masks.len()).rev() {
        let (prev, cur) = (masks[i - 1], masks[i]);
        masks[i] = if channelize {
            (0..width).fold(cur, |acc, l| {
                with_lane(acc, l, lane(cur, l).wrapping_sub(lane(prev, l)))
            })
        } else {
            cur.wrapping_sub(prev) & keep
        };
    }
}

/// Rank masks onto `[0, k - 1]` and return the new `mask_max`.
fn densify(masks: &mut [u32], width: usize, channelize: bool) -> Result<u32> {
    if masks.is_empty() {
        return Ok(0);
    }
    if channelize {
        let mut mask_max = 0u32;
        for l in 0..width {
            let mut used = [false; 256];
            for &m in masks.iter() {
                used[lane(m, l) as usize] = true;
            }
            let mut remap = [0u8; 256];
            let mut next = 0u32;
            for (v, _) in used.iter().enumerate().filter(|(_, u)| **u) {
                remap[v] = next as u8;
                next += 1;
            }
            for m in masks.iter_mut() {
                *m = with_lane(*m, l, remap[lane(*m, l) as usize]);
            }
            mask_max |= (next - 1) << (8 * l);
        }
        return Ok(mask_max);
    }

    let mut used = try_with_capacity(masks.len(), "densify table")?;
    used.extend_from_slice(masks);
    used.sort_unstable();
    used.dedup();
    for m in masks.iter_mut() {
        let (Ok(rank) | Err(rank)) = used.binary_search(m);
        *m = rank as u32;
    }
    Ok((used.len() - 1) as u32)
}

fn surroundify(masks: &mut [u32], width: usize, channelize: bool) {
    if masks.is_empty() {
        return;
    }
    if channelize {
        for l in 0..width {
            let (lo, hi) = masks
                .iter()
                .map(|&m| lane(m, l))
                .fold((u8::MAX, 0u8), |(lo, hi), v| (lo.min(v), hi.max(v)));
            let span = (hi - lo) as u32;
            for m in masks.iter_mut() {
                let code = surround((lane(*m, l) - lo) as u32, span);
                *m = with_lane(*m, l, code as u8);
            }
        }
        return;
    }
    let (lo, hi) = masks
        .iter()
        .fold((u32::MAX, 0u32), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;
    for m in masks.iter_mut() {
        *m = surround(*m - lo, span);
    }
}

/// Surround code of `v` in `[0, span]`: a bijection onto `[0, span]` that
/// gives even codes to the low half and odd codes to the high half.
pub fn surround(v: u32, span: u32) -> u32 {
    let above = span - v;
    if v <= above { 2 * v } else { 2 * above + 1 }
}
