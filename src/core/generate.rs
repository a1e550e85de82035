//! Synthetic duplicate trees for trying the tool out.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenerateSummary {
    pub first: usize,
    pub second: usize,
}

/// Create `dir/dir1` holding `files` text files `0.txt..` and `dir/dir2`
/// holding a same-named copy of roughly half of them, each 100 to 1000 bytes.
///
/// `dir` must not exist yet.
pub fn generate_dummy_data(dir: &Path, files: usize, seed: Option<u64>) -> io::Result<GenerateSummary> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    fs::create_dir(dir)?;
    let first_dir = dir.join("dir1");
    let second_dir = dir.join("dir2");
    fs::create_dir(&first_dir)?;
    fs::create_dir(&second_dir)?;

    let mut summary = GenerateSummary { first: 0, second: 0 };
    for n in 0..files {
        let first = "A".repeat(rng.gen_range(100..=1000));
        let second = "B".repeat(rng.gen_range(100..=1000));
        let name = format!("{n}.txt");

        fs::write(first_dir.join(&name), first)?;
        summary.first += 1;

        if rng.gen_bool(0.5) {
            fs::write(second_dir.join(&name), second)?;
            summary.second += 1;
        }
    }

    log::info!(
        "Generated {} + {} files under {}",
        summary.first,
        summary.second,
        dir.display()
    );
    Ok(summary)
}
