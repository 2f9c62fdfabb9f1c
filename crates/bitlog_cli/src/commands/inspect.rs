//! Inspect command implementation.

use crate::Format;
use bitlog_core::{inspect_directory, SegmentReport, SegmentStatus};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Total size of all segment files.
    pub total_size: u64,
    /// Records across all segments, superseded ones included.
    pub record_count: u64,
    /// Tombstones across all segments.
    pub tombstone_count: u64,
    /// Per-segment details in replay order.
    pub segments: Vec<SegmentReport>,
}

impl InspectResult {
    /// Summarises `segments`.
    pub fn new(path: &Path, segments: Vec<SegmentReport>) -> Self {
        Self {
            path: path.display().to_string(),
            total_size: segments.iter().map(|s| s.size).sum(),
            record_count: segments.iter().map(|s| s.records).sum(),
            tombstone_count: segments.iter().map(|s| s.tombstones).sum(),
            segments,
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let result = InspectResult::new(path, inspect_directory(path)?);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Segments:   {}", result.segments.len());
    println!("  Total size: {} bytes", result.total_size);
    println!("  Records:    {}", result.record_count);
    println!("  Tombstones: {}", result.tombstone_count);
    println!();
    println!("Segments:");
    for segment in &result.segments {
        println!(
            "  {:<16} {:>10} bytes  {:>8} records  {}",
            segment.file_name,
            segment.size,
            segment.records,
            describe(&segment.status)
        );
    }
}

fn describe(status: &SegmentStatus) -> String {
    match status {
        SegmentStatus::Ok => "ok".to_string(),
        SegmentStatus::TornTail { discarded } => format!("torn tail ({discarded} bytes)"),
        SegmentStatus::Corrupt { message } => format!("CORRUPT: {message}"),
    }
}
