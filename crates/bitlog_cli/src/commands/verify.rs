//! Verify command implementation.

use bitlog_core::{inspect_directory, SegmentStatus};
use std::path::Path;

/// Runs the verify command.
///
/// Fails if any segment would prevent the store from opening. A torn tail
/// on the active segment is reported but is not a failure.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {}", path.display());
    println!();

    let reports = inspect_directory(path)?;
    let mut corrupt = 0;
    for report in &reports {
        match &report.status {
            SegmentStatus::Ok => {
                println!("  ✓ {} ({} records)", report.file_name, report.records);
            }
            SegmentStatus::TornTail { discarded } => {
                println!(
                    "  ! {} ({} records, {discarded} trailing bytes will be discarded)",
                    report.file_name, report.records
                );
            }
            SegmentStatus::Corrupt { message } => {
                corrupt += 1;
                println!(
                    "  ✗ {} corrupt after {} valid bytes: {message}",
                    report.file_name, report.valid_bytes
                );
            }
        }
    }

    println!();
    if corrupt > 0 {
        return Err(format!("{corrupt} of {} segments are corrupt", reports.len()).into());
    }
    println!("✓ All {} segments verified", reports.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn garbage_segment_fails() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("0.seg"), [0xFFu8; 32]).unwrap();
        assert!(run(temp.path()).is_err());
    }

    #[test]
    fn empty_store_passes() {
        let temp = tempdir().unwrap();
        assert!(run(temp.path()).is_ok());
    }
}
