//! Markdown conversation logs.
//!
//! Every session writes to `conversation_<timestamp>.md` in the output
//! directory. Each completed exchange appends a `**User:**` line, a
//! `**Model:**` line and a blank line.

use crate::llm::types::Turn;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOG_PREFIX: &str = "conversation";
const LOG_EXTENSION: &str = "md";

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("'{0}' is not a conversation log")]
    NotALog(String),

    #[error("'{0}' is the active conversation log")]
    ActiveLog(String),

    #[error("failed to delete '{name}': {source}")]
    Delete {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Append-only log for the current session.
#[derive(Debug)]
pub struct TranscriptLog {
    path: PathBuf,
    file: File,
}

impl TranscriptLog {
    /// Create a new log named after the current local time. A log that
    /// already exists is never reopened; `_1`, `_2`, ... is appended instead.
    pub fn create_timestamped(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let mut attempt = 0u32;
        loop {
            let name = match attempt {
                0 => format!("{}_{}.{}", LOG_PREFIX, stamp, LOG_EXTENSION),
                n => format!("{}_{}_{}.{}", LOG_PREFIX, stamp, n, LOG_EXTENSION),
            };
            let path = dir.join(name);
            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => return Ok(Self { path, file }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to create conversation log {}", path.display())
                    })
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn append_exchange(&mut self, user: &Turn, model: &Turn) -> Result<()> {
        write_exchange(&mut self.file, user, model)
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        self.file.flush()?;
        Ok(())
    }
}

/// Render one exchange in the log format.
pub fn write_exchange<W: Write>(out: &mut W, user: &Turn, model: &Turn) -> io::Result<()> {
    writeln!(out, "**User:** {}", user.text())?;
    writeln!(out, "**Model:** {}", model.text())?;
    writeln!(out)
}

/// A bare file name that looks like one of our logs.
pub fn is_log_name(name: &str) -> bool {
    !name.contains(['/', '\\'])
        && name.starts_with(LOG_PREFIX)
        && Path::new(name).extension().is_some_and(|ext| ext == LOG_EXTENSION)
}

/// Conversation logs in `dir`, sorted by name, excluding `active`.
pub fn list_logs(dir: &Path, active: &Path) -> Result<Vec<String>> {
    let active_name = active.file_name();
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| Some(entry.file_name().as_os_str()) != active_name)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_log_name(name))
        .collect();
    names.sort();
    Ok(names)
}

/// Delete a log by bare name. Refuses anything that isn't a log, and the
/// active log.
pub fn delete_log(dir: &Path, name: &str, active: &Path) -> Result<PathBuf, TranscriptError> {
    let name = name.trim();
    if !is_log_name(name) {
        return Err(TranscriptError::NotALog(name.to_string()));
    }
    if active.file_name().is_some_and(|n| n == name) {
        return Err(TranscriptError::ActiveLog(name.to_string()));
    }

    let path = dir.join(name);
    std::fs::remove_file(&path).map_err(|source| TranscriptError::Delete {
        name: name.to_string(),
        source,
    })?;
    Ok(path)
}
