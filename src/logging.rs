use std::fs::{self, File};
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use crate::error::ChairsError;

/// Sets up one-JSON-line-per-event logging to `./logs/{role}_{name}_{HH-MM-SS}.jsonl`,
/// matching the original's one-file-per-run convention in `logs.py` (§6 [EXPANDED]).
pub fn init(role: &str, name: &str, timestamp: &str) -> Result<(), ChairsError> {
    let log_dir = PathBuf::from("./logs");
    fs::create_dir_all(&log_dir)?;
    let path = log_dir.join(format!("{role}_{name}_{timestamp}.jsonl"));
    let file = File::create(&path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(move || file.try_clone().expect("duplicate log file handle"))
        .init();

    Ok(())
}
