//! JSON output.
//!
//! Results go to stdout by default. With `--json-output <path>` they are
//! written to that file instead, creating parent directories as needed.

use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Pretty-printed JSON for `value`.
pub fn to_pretty<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Write `value` as pretty JSON to `path`.
///
/// # Errors
///
/// Returns an error if serialisation fails, the parent directory cannot be
/// created, or the file cannot be written.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), Box<dyn Error>> {
    let json = to_pretty(value)?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(path, json).await?;
    info!("Wrote JSON output");
    Ok(())
}
