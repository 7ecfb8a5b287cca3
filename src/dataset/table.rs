//! Per-episode frame table (Parquet).
//!
//! Exactly two columns: `timestamp` (Float64, seconds since episode start) and
//! `frame` (Int64, index into the episode's videos).

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::error::{RecorderError, Result};

pub const TABLE_EXTENSION: &str = "parquet";

/// One recorded tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpisodeRow {
    pub timestamp: f64,
    pub frame: u64,
}

pub fn episode_schema() -> Schema {
    Schema::new(vec![
        Field::new("timestamp", DataType::Float64, false),
        Field::new("frame", DataType::Int64, false),
    ])
}

fn to_batch(rows: &[EpisodeRow]) -> Result<RecordBatch> {
    let timestamps = Float64Array::from(rows.iter().map(|row| row.timestamp).collect::<Vec<_>>());
    let frames = rows
        .iter()
        .map(|row| {
            i64::try_from(row.frame)
                .map_err(|_| RecorderError::Table(format!("frame index {} exceeds i64", row.frame)))
        })
        .collect::<Result<Vec<_>>>()?;
    let columns: Vec<ArrayRef> = vec![Arc::new(timestamps), Arc::new(Int64Array::from(frames))];
    let batch = RecordBatch::try_new(Arc::new(episode_schema()), columns)?;
    Ok(batch)
}

fn write_batch(batch: &RecordBatch, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Write `rows` to `path`. An empty slice yields a valid zero-row table.
///
/// The table is written next to `path` and renamed into place only once the
/// Parquet footer has been written.
pub fn write_episode_table(rows: &[EpisodeRow], path: &Path) -> Result<()> {
    let batch = to_batch(rows)?;
    let partial = {
        let mut name = path.as_os_str().to_owned();
        name.push(".part");
        PathBuf::from(name)
    };

    if let Err(err) = write_batch(&batch, &partial) {
        let _ = std::fs::remove_file(&partial);
        return Err(err);
    }
    if let Err(err) = std::fs::rename(&partial, path) {
        let _ = std::fs::remove_file(&partial);
        return Err(err.into());
    }
    log::debug!("episode table: {} rows -> {}", rows.len(), path.display());
    Ok(())
}
