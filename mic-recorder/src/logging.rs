//! env_logger setup: `info` unless `RUST_LOG` says otherwise.

use std::fs::OpenOptions;
use std::path::Path;

fn builder() -> env_logger::Builder {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    builder.format_timestamp_secs();
    builder
}

/// Install the global logger, appending to `log_file` when given.
///
/// If the file cannot be opened the logger falls back to stderr and the
/// error is returned so the caller can report it.
pub fn init(log_file: Option<&Path>) -> Result<(), String> {
    let mut builder = builder();

    let file_error = match log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
                None
            }
            Err(e) => Some(format!("cannot open log file {}: {}", path.display(), e)),
        },
        None => None,
    };

    builder
        .try_init()
        .map_err(|e| format!("logger already initialised: {}", e))?;

    match file_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
