//! Single-key commands.

use bitlog_core::Engine;
use std::io::Write;
use std::path::Path;

/// Writes the value of `key` to stdout, or fails if it is missing.
pub fn get(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::open(path)?;
    let value = engine
        .get(key.as_bytes())?
        .ok_or_else(|| format!("Key not found: {key}"))?;
    engine.close()?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&value)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

/// Stores `value` under `key`.
pub fn put(path: &Path, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::open(path)?;
    engine.put(key.as_bytes(), value.as_bytes())?;
    engine.close()?;
    Ok(())
}

/// Deletes `key`. Deleting a missing key is not an error.
pub fn delete(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::open(path)?;
    engine.delete(key.as_bytes())?;
    engine.close()?;
    Ok(())
}
