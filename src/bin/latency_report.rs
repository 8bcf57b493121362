//! Summarise encode latency recorded in framesink output file names

use std::path::PathBuf;

use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use framesink::latency::{self, LatencyReport};

#[derive(Parser, Debug)]
#[command(author, version, about = "Encode latency statistics from framesink output directories")]
struct Cli {
    /// Output directories to analyse
    #[arg(required = true, value_name = "DIR")]
    dirs: Vec<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    for dir in &cli.dirs {
        let names = latency::scan_dir(dir)
            .wrap_err_with(|| format!("failed to read {}", dir.display()))?;

        println!("{}", dir.display());
        match LatencyReport::from_names(&names) {
            Some(report) => {
                println!("  all:      {}", report.all);
                println!("  filtered: {}", report.filtered);
                println!(
                    "  outliers removed: {} ({:.1}%)",
                    report.outliers,
                    report.outliers as f64 * 100.0 / report.all.count as f64
                );
                println!(
                    "  fallback timestamps: {} of {}",
                    report.fallback_frames, report.all.count
                );
            }
            None => println!("  no frames found"),
        }
    }

    Ok(())
}
