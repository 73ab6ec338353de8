use std::fs::{self};
use std::path::Path;

use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Writes `contents` as pretty-printed JSON, creating parent directories.
pub fn write_json(path: &Path, contents: &Value) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_contents = serde_json::to_string_pretty(contents)?;
    fs::write(path, file_contents)?;

    Ok(())
}
