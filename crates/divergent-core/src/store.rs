//! Checksummed frequency store (the "Zorb" record).
//!
//! # Layout
//!
//! All integers little-endian.
//!
//! ```text
//! offset  size  field
//!      0     8  signature  b"DVRGZORB"
//!      8     8  checksum
//!     16     8  total_mask_count - 1   (wrapping; an empty record stores u64::MAX)
//!     24     4  alphabet_size - 1
//!     28     4  fresh flag             (0 or 1)
//!     32   8·n  counts[0..n]
//! ```
//!
//! The checksum is a seeded multiply-with-carry digest over every field after
//! it, in file order, folded 32 bits at a time. It detects torn or tampered
//! files; it authenticates nothing.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use crate::buffer::{try_with_capacity, try_zeroed};
use crate::config::AbsorbPolicy;
use crate::divergence::{DivergenceEngine, FreqList, Which};
use crate::error::{DivergentError, Result};
use crate::logarithm::LogProvider;

pub const SIGNATURE: [u8; 8] = *b"DVRGZORB";
pub const HEADER_LEN: usize = 32;

const MWC_MULTIPLIER: u64 = 0xFFFF_DA61;
const MWC_SEED: u64 = 0x2B7E_1516_28AE_D2A6;

// ---------------------------------------------------------------------------
// Checksum
// ---------------------------------------------------------------------------

struct Mwc(u64);

impl Mwc {
    fn fold(&mut self, word: u32) {
        self.0 = MWC_MULTIPLIER * ((self.0 as u32 ^ word) as u64) + (self.0 >> 32);
    }

    fn fold_u64(&mut self, value: u64) {
        self.fold(value as u32);
        self.fold((value >> 32) as u32);
    }

    fn finish(mut self) -> u64 {
        for _ in 0..3 {
            self.fold(0);
        }
        self.0 ^ (self.0 >> 31)
    }
}

/// Checksum over the raw header fields and counts, exactly as stored.
pub fn compute_checksum(
    total_minus_one: u64,
    alphabet_minus_one: u32,
    fresh: u32,
    counts: &[u64],
) -> u64 {
    let mut mwc = Mwc(MWC_SEED);
    mwc.fold_u64(total_minus_one);
    mwc.fold(alphabet_minus_one);
    mwc.fold(fresh);
    for &c in counts {
        mwc.fold_u64(c);
    }
    mwc.finish()
}

/// Exact file size of a record for `alphabet_size` masks.
pub fn serialized_len(alphabet_size: u64) -> Option<usize> {
    let body = usize::try_from(alphabet_size).ok()?.checked_mul(8)?;
    body.checked_add(HEADER_LEN)
}

fn alphabet_minus_one(alphabet_size: u64) -> Result<u32> {
    alphabet_size
        .checked_sub(1)
        .and_then(|a| u32::try_from(a).ok())
        .ok_or_else(|| {
            DivergentError::invalid(format!(
                "alphabet of {alphabet_size} masks cannot be stored"
            ))
        })
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A verified (or freshly stamped) store record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    checksum: u64,
    fresh: bool,
    list: FreqList,
}

impl StoreRecord {
    /// Empty record for a store that does not exist yet.
    pub fn fresh(alphabet_size: u64) -> Result<Self> {
        Self::stamp(FreqList::zeroed(alphabet_size)?, true)
    }

    /// Seal `list` as a record, computing the header and checksum.
    pub fn stamp(list: FreqList, fresh: bool) -> Result<Self> {
        if fresh && list.total() != 0 {
            return Err(DivergentError::invalid(
                "a freshly initialized record cannot hold counts",
            ));
        }
        let checksum = compute_checksum(
            list.total().wrapping_sub(1),
            alphabet_minus_one(list.alphabet_size())?,
            fresh as u32,
            list.counts(),
        );
        Ok(Self {
            checksum,
            fresh,
            list,
        })
    }

    /// Parse and verify a serialized record built for `alphabet_size` masks.
    pub fn decode(bytes: &[u8], alphabet_size: u64) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(DivergentError::corrupt(format!(
                "store is {} bytes, shorter than its {HEADER_LEN}-byte header",
                bytes.len()
            )));
        }
        if bytes[..8] != SIGNATURE {
            return Err(DivergentError::corrupt("store signature does not match"));
        }
        let stored_checksum = read_u64(bytes, 8);
        let total_minus_one = read_u64(bytes, 16);
        let stored_alphabet = read_u32(bytes, 24);
        let fresh = read_u32(bytes, 28);

        let expected_alphabet = alphabet_minus_one(alphabet_size)?;
        if stored_alphabet != expected_alphabet {
            return Err(DivergentError::corrupt(format!(
                "store was built for {} masks, not {alphabet_size}",
                stored_alphabet as u64 + 1
            )));
        }
        let expected_len = serialized_len(alphabet_size)
            .ok_or(DivergentError::OutOfMemory { what: "store record" })?;
        if bytes.len() != expected_len {
            return Err(DivergentError::corrupt(format!(
                "store is {} bytes; an alphabet of {alphabet_size} needs {expected_len}",
                bytes.len()
            )));
        }
        if fresh > 1 {
            return Err(DivergentError::corrupt(format!(
                "store fresh flag is {fresh}, expected 0 or 1"
            )));
        }

        let mut counts = try_zeroed::<u64>(alphabet_size, "frequency list")?;
        let mut mwc = Mwc(MWC_SEED);
        mwc.fold_u64(total_minus_one);
        mwc.fold(stored_alphabet);
        mwc.fold(fresh);
        let mut sum = Some(0u64);
        for (slot, chunk) in counts.iter_mut().zip(bytes[HEADER_LEN..].chunks_exact(8)) {
            let c = read_u64(chunk, 0);
            mwc.fold_u64(c);
            sum = sum.and_then(|s| s.checked_add(c));
            *slot = c;
        }
        if mwc.finish() != stored_checksum {
            return Err(DivergentError::corrupt("store checksum does not match"));
        }
        let total = total_minus_one.wrapping_add(1);
        if sum != Some(total) {
            return Err(DivergentError::corrupt(format!(
                "store header claims {total} masks but its counts do not sum to that"
            )));
        }
        if fresh == 1 && total != 0 {
            return Err(DivergentError::corrupt(
                "store is marked fresh but holds counts",
            ));
        }

        Ok(Self {
            checksum: stored_checksum,
            fresh: fresh == 1,
            list: FreqList::from_parts(counts, total),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = serialized_len(self.list.alphabet_size())
            .ok_or(DivergentError::OutOfMemory { what: "store record" })?;
        let mut out = try_with_capacity(len, "store record")?;
        out.extend_from_slice(&SIGNATURE);
        out.extend_from_slice(&self.checksum.to_le_bytes());
        out.extend_from_slice(&self.list.total().wrapping_sub(1).to_le_bytes());
        out.extend_from_slice(&alphabet_minus_one(self.list.alphabet_size())?.to_le_bytes());
        out.extend_from_slice(&(self.fresh as u32).to_le_bytes());
        for &c in self.list.counts() {
            out.extend_from_slice(&c.to_le_bytes());
        }
        Ok(out)
    }

    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn freq_list(&self) -> &FreqList {
        &self.list
    }

    pub fn into_freq_list(self) -> FreqList {
        self.list
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Read and verify the record at `path`. `Ok(None)` when no file exists.
pub fn load(path: &Path, alphabet_size: u64) -> Result<Option<StoreRecord>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let before = file.metadata()?.len();
    let capacity = usize::try_from(before)
        .map_err(|_| DivergentError::OutOfMemory { what: "store buffer" })?;
    let mut bytes = try_with_capacity(capacity, "store buffer")?;
    file.read_to_end(&mut bytes)?;
    let after = file.metadata()?.len();
    if before != after || bytes.len() as u64 != before {
        return Err(DivergentError::corrupt(format!(
            "{} changed size while being read",
            path.display()
        )));
    }
    let record = StoreRecord::decode(&bytes, alphabet_size)?;
    log::info!(
        "verified store {} ({} masks, checksum {:#018x})",
        path.display(),
        record.list.total(),
        record.checksum
    );
    Ok(Some(record))
}

/// Replace the file at `path` with `record` atomically.
pub fn save(path: &Path, record: &StoreRecord) -> Result<()> {
    let bytes = record.encode()?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    log::info!(
        "wrote store {} ({} masks, checksum {:#018x})",
        path.display(),
        record.list.total(),
        record.checksum
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Absorption
// ---------------------------------------------------------------------------

/// Fold the engine's needle into its reference under `policy`.
///
/// `alert` is the verdict just reached for this needle. Returns whether the
/// reference was changed.
pub fn absorb<L: LogProvider>(
    engine: &mut DivergenceEngine<L>,
    policy: AbsorbPolicy,
    reset: bool,
    alert: bool,
) -> Result<bool> {
    if reset && policy != AbsorbPolicy::Add {
        return Err(DivergentError::invalid("reset is only valid with absorb=add"));
    }
    match policy {
        AbsorbPolicy::ReportOnly => Ok(false),
        AbsorbPolicy::Add => {
            if reset {
                log::info!("resetting the reference before absorbing");
                engine.reset(Which::Reference);
            }
            engine.freq_list_add(Which::Reference)?;
            Ok(true)
        }
        AbsorbPolicy::Subtract => {
            engine.freq_list_subtract(Which::Reference)?;
            Ok(true)
        }
        AbsorbPolicy::AddIfMundane if alert => {
            log::info!("needle is not mundane; leaving the reference untouched");
            Ok(false)
        }
        AbsorbPolicy::AddIfMundane => {
            engine.freq_list_add(Which::Reference)?;
            Ok(true)
        }
    }
}
