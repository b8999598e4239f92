// Export progress reporting
// Checkpoint entries handed to the progress callback, optionally appended to a JSONL log

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Export checkpoints in the order they are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStage {
    Preparing,
    Scheduling,
    Rendering,
    Encoding,
    Complete,
    Failed,
}

impl ExportStage {
    /// Progress fraction reported at this checkpoint
    pub fn progress(&self) -> f32 {
        match self {
            ExportStage::Preparing => 0.05,
            ExportStage::Scheduling => 0.2,
            ExportStage::Rendering => 0.4,
            ExportStage::Encoding => 0.8,
            ExportStage::Complete | ExportStage::Failed => 1.0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStage::Complete | ExportStage::Failed)
    }
}

/// One progress report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportProgress {
    /// RFC 3339 timestamp
    pub timestamp: String,

    pub stage: ExportStage,

    /// Progress fraction [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// Optional structured data (voice counts, file size)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ExportProgress {
    pub fn new(stage: ExportStage, message: impl Into<String>) -> Self {
        ExportProgress {
            timestamp: Utc::now().to_rfc3339(),
            stage,
            progress: stage.progress(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Append-only JSONL progress log
pub struct ProgressWriter {
    file_path: PathBuf,
}

impl ProgressWriter {
    pub fn new(file_path: PathBuf) -> Self {
        ProgressWriter { file_path }
    }

    /// Append one entry, creating the file if needed
    pub fn write(&self, entry: &ExportProgress) -> Result<(), ProgressError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        file.write_all(entry.to_json_line()?.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read progress entries from a JSONL file
pub fn read_progress_file(path: &Path) -> Result<Vec<ExportProgress>, ProgressError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_progress_is_monotonic() {
        let stages = [
            ExportStage::Preparing,
            ExportStage::Scheduling,
            ExportStage::Rendering,
            ExportStage::Encoding,
            ExportStage::Complete,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].progress() < pair[1].progress());
        }
        assert_eq!(ExportStage::Failed.progress(), 1.0);
        assert!(ExportStage::Failed.is_terminal());
        assert!(!ExportStage::Encoding.is_terminal());
    }

    #[test]
    fn test_progress_with_data() {
        let entry = ExportProgress::new(ExportStage::Encoding, "Encoding WAV")
            .with_data(serde_json::json!({ "frames": 44100 }));
        assert_eq!(entry.progress, 0.8);
        assert_eq!(entry.data.unwrap()["frames"], 44100);
    }

    #[test]
    fn test_progress_writer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("export.jsonl");
        let writer = ProgressWriter::new(path.clone());

        writer.write(&ExportProgress::new(ExportStage::Preparing, "Start")).unwrap();
        writer.write(&ExportProgress::new(ExportStage::Complete, "Done")).unwrap();

        let entries = read_progress_file(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stage, ExportStage::Preparing);
        assert_eq!(entries[1].progress, 1.0);
    }

    #[test]
    fn test_json_line_format() {
        let line = ExportProgress::new(ExportStage::Rendering, "Rendering")
            .to_json_line()
            .unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"stage\":\"rendering\""));
    }
}
