pub mod init;
pub mod inspect;
pub mod score;

use divergent_core::{DivergentError, Geometry, Mode, Status, parse_bitfield};

/// Print the single categorized failure line and return the error status.
pub fn fail(err: &DivergentError) -> u8 {
    eprintln!("error ({}): {err}", err.category());
    Status::error().bits()
}

pub fn parse_geometry(s: &str) -> divergent_core::Result<Geometry> {
    let geometry = Geometry::from_bits(parse_bitfield(s)?);
    geometry.validate()?;
    Ok(geometry)
}

pub fn parse_mode(s: &str) -> divergent_core::Result<Mode> {
    Mode::from_bits(parse_bitfield(s)?)
}

/// Render a `[0, 1]` fraction with enough digits to tell close scores apart.
pub fn fmt_fraction(value: f64) -> String {
    format!("{value:.9}")
}
