use std::path::Path;

use divergent_core::{DivergentError, StoreRecord, store};

pub fn run(path: &Path, geometry: &str, force: bool) -> divergent_core::Result<u8> {
    let geometry = super::parse_geometry(geometry)?;
    if geometry.densify {
        return Err(DivergentError::InvalidInput(
            "a densified alphabet depends on the data; let the first absorbing run create the store"
                .into(),
        ));
    }
    if path.exists() && !force {
        return Err(DivergentError::InvalidInput(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    let alphabet = geometry.full_mask_max() as u64 + 1;
    let record = StoreRecord::fresh(alphabet)?;
    store::save(path, &record)?;
    println!(
        "Initialized {} for {alphabet} masks (geometry {:#04x}, checksum {:#018x})",
        path.display(),
        geometry.bits(),
        record.checksum()
    );
    Ok(0)
}
