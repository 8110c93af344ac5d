//! Serializers for everything a sweep leaves on disk.

use crate::domain::model::TrialRecord;
use crate::utils::error::{LagError, Result};
use ndarray::Array2;
use serde::Serialize;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

/// `lam{lam}` prefix shared by a trial's files.
pub fn trial_stem(lam: f64) -> String {
    format!("lam{}", lam)
}

/// Regulator × target score table with a header row.
pub fn gc_csv(regulators: &[String], targets: &[String], gc: &Array2<f32>) -> Result<Vec<u8>> {
    if gc.dim() != (regulators.len(), targets.len()) {
        return Err(LagError::shape((regulators.len(), targets.len()), gc.dim()));
    }
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = Vec::with_capacity(targets.len() + 1);
    header.push("regulator".to_string());
    header.extend(targets.iter().cloned());
    writer.write_record(&header)?;

    for (name, row) in regulators.iter().zip(gc.rows()) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(name.clone());
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer
        .into_inner()
        .map_err(|e| LagError::processing(format!("flushing gc table: {}", e)))
}

pub fn loss_csv(trace: &[(usize, f64)]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["iteration", "loss"])?;
    for (iteration, loss) in trace {
        writer.write_record([iteration.to_string(), loss.to_string()])?;
    }
    writer
        .into_inner()
        .map_err(|e| LagError::processing(format!("flushing loss trace: {}", e)))
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

/// Sweep-level summary written next to the trial directory.
#[derive(Debug, Serialize)]
pub struct SweepSummary<'a, C: Serialize> {
    pub dataset: &'a str,
    pub dir_name: &'a str,
    pub config: &'a C,
    pub max_concurrent_trials: usize,
    pub total_secs: f64,
    pub completed: usize,
    pub failed: usize,
    pub trials: &'a [TrialRecord],
}

/// `%.18e`, as numpy's `savetxt` writes floats.
pub fn format_scientific(value: f64) -> String {
    let formatted = format!("{:.18e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exp: i32 = exponent.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => formatted,
    }
}

pub fn time_txt(total_secs: f64) -> Vec<u8> {
    format!("{}\n", format_scientific(total_secs)).into_bytes()
}

/// In-memory zip of `(name, contents)` pairs.
pub fn zip_archive(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in files {
        zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
        zip.write_all(data)?;
    }
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}
