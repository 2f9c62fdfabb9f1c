//! Compact command implementation.

use crate::Format;
use bitlog_core::{CompactionResult, Engine};
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::open(path)?;
    let result = engine.compact()?;
    engine.close()?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(path, &result),
    }
    Ok(())
}

fn print_text_output(path: &Path, result: &CompactionResult) {
    println!("Compacting segments at {}", path.display());
    println!();

    let Some(output) = result.output_segment else {
        println!("No compaction needed - nothing to merge");
        return;
    };

    let inputs: Vec<String> = result.input_segments.iter().map(ToString::to_string).collect();
    println!("Compaction Result:");
    println!("  Inputs:            {}", inputs.join(", "));
    println!("  Output:            {output}");
    println!("  Input records:     {}", result.input_records);
    println!("  Output records:    {}", result.output_records);
    println!("  Tombstones:        {}", result.tombstones_removed);
    println!("  Obsolete versions: {}", result.obsolete_versions_removed);
    println!();
    println!("  Size before: {} bytes", result.bytes_before);
    println!("  Size after:  {} bytes", result.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        result.bytes_saved(),
        if result.bytes_before > 0 {
            (result.bytes_saved() as f64 / result.bytes_before as f64) * 100.0
        } else {
            0.0
        }
    );
}
