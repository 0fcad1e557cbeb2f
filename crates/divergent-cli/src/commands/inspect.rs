use std::path::Path;

use divergent_core::{DivergentError, store};

pub fn run(path: &Path, alphabet: u64, top: usize) -> divergent_core::Result<u8> {
    let record = store::load(path, alphabet)?.ok_or_else(|| {
        DivergentError::InvalidInput(format!("no store at {}", path.display()))
    })?;
    let list = record.freq_list();

    println!("{}", path.display());
    println!("  {:<12} {:#018x}", "checksum", record.checksum());
    println!("  {:<12} {}", "alphabet", list.alphabet_size());
    println!("  {:<12} {}", "masks", list.total());
    println!("  {:<12} {}", "fresh", record.is_fresh());

    let mut used: Vec<(usize, u64)> = list
        .counts()
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c != 0)
        .map(|(mask, &c)| (mask, c))
        .collect();
    println!("  {:<12} {}", "distinct", used.len());
    if used.is_empty() {
        return Ok(0);
    }

    used.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    println!("\n  {:>12}  {:>20}  {:>9}", "mask", "count", "share");
    for &(mask, count) in used.iter().take(top) {
        let share = count as f64 / list.total() as f64 * 100.0;
        println!("  {mask:>#12x}  {count:>20}  {share:>8.3}%");
    }
    Ok(0)
}
