//! Encode-latency analysis over a recorder's output directory.
//!
//! Every output file name ends in `_{encode_ms}ms.{ext}`, so a directory
//! listing is enough to characterise writer latency without a sidecar
//! index.

use std::fmt;
use std::io;
use std::path::Path;

use crate::output::{OutputName, TimeSource};

/// Parsed output files in `dir`, sorted by capture time. Files that were
/// not produced by the writer are skipped.
pub fn scan_dir(dir: &Path) -> io::Result<Vec<OutputName>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str().and_then(OutputName::parse) {
            names.push(name);
        }
    }
    names.sort_by_key(|n| (n.capture_time, n.hardware_time_ns));
    Ok(names)
}

/// Descriptive statistics over a set of latencies in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub std_dev: f64,
}

impl Summary {
    pub fn from_samples(samples: &[u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let count = sorted.len();
        let mean = sorted.iter().sum::<u64>() as f64 / count as f64;
        let variance = sorted
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / count as f64;

        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            median: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            std_dev: variance.sqrt(),
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} min={}ms max={}ms mean={:.2}ms median={:.2}ms p95={:.2}ms sd={:.2}ms",
            self.count, self.min, self.max, self.mean, self.median, self.p95, self.std_dev
        )
    }
}

/// Linear-interpolated percentile of an ascending slice.
pub fn percentile(sorted: &[u64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0] as f64,
        n => {
            let rank = (pct.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * frac
        }
    }
}

/// Samples inside `[Q1 - 1.5·IQR, Q3 + 1.5·IQR]`.
pub fn without_outliers(samples: &[u64]) -> Vec<u64> {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let q1 = percentile(&sorted, 25.0);
    let q3 = percentile(&sorted, 75.0);
    let iqr = q3 - q1;
    let (lower, upper) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    sorted
        .into_iter()
        .filter(|&v| (v as f64) >= lower && (v as f64) <= upper)
        .collect()
}

/// Latency report for one output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyReport {
    pub all: Summary,
    pub filtered: Summary,
    pub outliers: usize,
    /// Frames whose hardware timestamp was synthesized (`ERR`).
    pub fallback_frames: usize,
}

impl LatencyReport {
    pub fn from_names(names: &[OutputName]) -> Option<Self> {
        let samples: Vec<u64> = names.iter().map(|n| n.encode_ms).collect();
        let all = Summary::from_samples(&samples)?;
        let kept = without_outliers(&samples);
        let filtered = Summary::from_samples(&kept)?;

        Some(Self {
            outliers: all.count - filtered.count,
            fallback_frames: names
                .iter()
                .filter(|n| n.time_source == TimeSource::Fallback)
                .count(),
            all,
            filtered,
        })
    }
}
