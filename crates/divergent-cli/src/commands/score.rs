use std::path::Path;

use divergent_core::{Outcome, RunConfig, Status, evaluate, parse_threshold};

use super::fmt_fraction;

pub struct ScoreCommandConfig<'a> {
    pub input: &'a Path,
    pub store: &'a Path,
    pub geometry: &'a str,
    pub mode: &'a str,
    pub threshold: &'a str,
    pub sweep: u64,
    pub output_path: Option<&'a Path>,
}

pub fn run(cfg: ScoreCommandConfig<'_>) -> divergent_core::Result<u8> {
    let config = RunConfig {
        geometry: super::parse_geometry(cfg.geometry)?,
        mode: super::parse_mode(cfg.mode)?,
        threshold: parse_threshold(cfg.threshold)?,
        sweep: cfg.sweep,
        store: cfg.store.to_path_buf(),
    };
    let input = std::fs::read(cfg.input)?;
    let outcome = evaluate(&config, &input)?;

    print_summary(cfg.input, &outcome);

    if let Some(path) = cfg.output_path {
        let json = serde_json::to_string_pretty(&outcome.report).map_err(std::io::Error::from)?;
        std::fs::write(path, json)?;
        println!("\nReport saved to {}", path.display());
    }

    Ok(outcome.status.bits())
}

fn print_summary(input: &Path, outcome: &Outcome) {
    let r = &outcome.report;
    println!("{} ({} masks, alphabet {})", input.display(), r.mask_count, r.alphabet_size);
    if r.baseline_known {
        println!(
            "  {:<10} {}  [{}, {}]",
            r.measure,
            fmt_fraction(r.divergence),
            fmt_fraction(r.lower_bound),
            fmt_fraction(r.upper_bound)
        );
    } else {
        println!("  {:<10} {}  (no baseline yet)", r.measure, fmt_fraction(r.divergence));
    }
    if let Some(offset) = r.offset {
        println!("  {:<10} byte {offset}", "window");
    }
    let verdict = match (r.alert, r.provable_alert) {
        (true, true) => "ALERT (provable)",
        (true, false) => "alert",
        _ => "mundane",
    };
    println!(
        "  {:<10} {verdict} against {} ({})",
        "verdict",
        fmt_fraction(r.threshold),
        r.polarity
    );
    let absorbed = if r.absorbed { "absorbed" } else { "not absorbed" };
    let written = if r.store_written { "store updated" } else { "store untouched" };
    println!(
        "  {:<10} {} ({absorbed}, {written}, reference holds {} masks)",
        "absorb", r.absorb, r.reference_total
    );
    if r.ignored_tail > 0 {
        println!("  warning: {} trailing byte(s) ignored", r.ignored_tail);
    }
    if r.overflow {
        println!("  warning: arithmetic overflow clipped the bounds");
    }
    if outcome.status != Status::default() {
        println!("  status {:#x}", outcome.status.bits());
    }
}
