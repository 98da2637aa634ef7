//! Boundary with the upstream bibliographic search client.
//!
//! Raw batches are stored as gzip-compressed JSON lines, one search result per line. The client
//! itself lives outside this crate; anything that can hand over a year's results implements
//! [`RecordSource`].

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::helpers::raw_artifact_name;

/// Produces the raw search results for one publication year.
pub trait RecordSource {
    /// `Ok(None)` means nothing was published that year.
    fn fetch_year(&mut self, year: i32) -> Result<Option<Vec<Value>>>;
}

/// Reads `results_<year>.jsonl` or `results_<year>.jsonl.gz` dumps from a local directory.
#[derive(Debug, Clone)]
pub struct DumpDirectorySource {
    dir: PathBuf,
}

impl DumpDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RecordSource for DumpDirectorySource {
    fn fetch_year(&mut self, year: i32) -> Result<Option<Vec<Value>>> {
        let gz = self.dir.join(raw_artifact_name(year));
        let plain = self.dir.join(format!("results_{}.jsonl", year));

        if gz.exists() {
            read_raw_batch(&gz, year).map(Some)
        } else if plain.exists() {
            let file =
                File::open(&plain).with_context(|| format!("Failed to open {}", plain.display()))?;
            parse_lines(BufReader::new(file), year).map(Some)
        } else {
            debug!("No dump for {} in {}", year, self.dir.display());
            Ok(None)
        }
    }
}

/// Writes one year's batch. Returns the number of records written.
pub fn write_raw_batch(path: &Path, records: &[Value]) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    for record in records {
        serde_json::to_writer(&mut encoder, record)
            .with_context(|| format!("Failed to encode record for {}", path.display()))?;
        encoder.write_all(b"\n")?;
    }
    encoder
        .finish()
        .and_then(|mut w| w.flush())
        .with_context(|| format!("Failed to finish {}", path.display()))?;
    Ok(records.len())
}

pub fn read_raw_batch(path: &Path, year: i32) -> Result<Vec<Value>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let decoder = GzDecoder::new(file);
    parse_lines(BufReader::with_capacity(1024 * 1024, decoder), year)
}

fn parse_lines<R: Read>(reader: BufReader<R>, year: i32) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Value =
            serde_json::from_str(&line).map_err(|e| PipelineError::MalformedRecord {
                year,
                line: idx + 1,
                reason: e.to_string(),
            })?;
        records.push(record);
    }
    Ok(records)
}

/// Pulls every requested year from `source` into `raw_dir`, newest first.
///
/// Years with no results produce no artifact.
pub fn extract_years(
    source: &mut dyn RecordSource,
    years: impl Iterator<Item = i32>,
    raw_dir: &Path,
) -> Result<usize> {
    let mut written = 0;
    for year in years {
        match source.fetch_year(year)? {
            Some(records) if !records.is_empty() => {
                let count = write_raw_batch(&raw_dir.join(raw_artifact_name(year)), &records)?;
                info!("Extracted {} records for {}", count, year);
                written += 1;
            }
            _ => info!("No records published in {}", year),
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_batches_survive_compression() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(raw_artifact_name(2021));
        let records = vec![json!({"eid": "2-s2.0-1"}), json!({"eid": "2-s2.0-2"})];

        write_raw_batch(&path, &records).unwrap();
        assert_eq!(read_raw_batch(&path, 2021).unwrap(), records);
    }

    #[test]
    fn malformed_line_reports_year_and_line() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("results_2020.jsonl"),
            "{\"eid\": \"1\"}\n{not json\n",
        )
        .unwrap();

        let err = DumpDirectorySource::new(tmp.path())
            .fetch_year(2020)
            .unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::MalformedRecord { year, line, .. }) => {
                assert_eq!((*year, *line), (2020, 2));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn years_without_dumps_write_nothing() {
        let dumps = tempfile::tempdir().unwrap();
        let raw = tempfile::tempdir().unwrap();
        std::fs::write(dumps.path().join("results_2021.jsonl"), "{\"eid\": \"1\"}\n").unwrap();

        let mut source = DumpDirectorySource::new(dumps.path());
        let written = extract_years(&mut source, [2021, 2020].into_iter(), raw.path()).unwrap();

        assert_eq!(written, 1);
        assert!(raw.path().join(raw_artifact_name(2021)).exists());
        assert!(!raw.path().join(raw_artifact_name(2020)).exists());
    }
}
