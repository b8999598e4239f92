// Project Export - Offline render to WAV/MP3 and JSON project export
// Voices, render and encoding run on one blocking task; files land through a download target

use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::arranger::{resolve_playback_schedules, PlaybackMode, ResolvedPlayback, ScheduleKind};
use crate::graph::GraphError;
use crate::packs::PackCatalog;
use crate::project::Project;
use crate::settings::EngineSettings;
use crate::state::{create_stored_project_payload, write_file_atomic, StorageError};

use super::driver::OfflineRender;
use super::progress::{ExportProgress, ExportStage};
use super::wav::encode_wav;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Download target not available: {0}")]
    NoDownloadTarget(PathBuf),

    #[error("Render failed: {0}")]
    Render(#[from] GraphError),

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("MP3 encoding failed: {0}")]
    Mp3(String),

    #[error("MP3 export is not available in this build")]
    Mp3Disabled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Export task failed: {0}")]
    Task(String),
}

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Wav,
    Mp3,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(ExportFormat::Wav),
            "mp3" => Ok(ExportFormat::Mp3),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportOptions {
    /// Name used for the output file; the project name when empty
    pub project_name: String,
    pub format: ExportFormat,
    pub mode: PlaybackMode,
    pub settings: EngineSettings,
}

/// Where exported files are written
pub trait DownloadTarget {
    /// Fails with `NoDownloadTarget` when nothing can be written
    fn check(&self) -> ExportResult<()>;

    /// Write `bytes` as `filename`, returning the final path and SHA-256 digest
    fn write(&self, filename: &str, bytes: &[u8]) -> ExportResult<(PathBuf, String)>;
}

/// Writes into an existing directory via temp file + rename
#[derive(Debug, Clone)]
pub struct DirectoryTarget {
    dir: PathBuf,
}

impl DirectoryTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectoryTarget { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadTarget for DirectoryTarget {
    fn check(&self) -> ExportResult<()> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(ExportError::NoDownloadTarget(self.dir.clone()))
        }
    }

    fn write(&self, filename: &str, bytes: &[u8]) -> ExportResult<(PathBuf, String)> {
        self.check()?;
        Ok(write_file_atomic(&self.dir, filename, bytes)?)
    }
}

/// A file produced by an export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
    pub path: PathBuf,
    pub filename: String,
    pub bytes: usize,
    pub sha256: String,
    /// Audio length in seconds (0 for non-audio exports)
    pub duration: f64,
}

/// `<sanitized name>-YYYYMMDD-HHMM.<ext>`
pub fn export_filename(name: &str, extension: &str, now: DateTime<Local>) -> String {
    let mut base: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if base.is_empty() {
        base = "project".to_string();
    }
    format!("{}-{}.{}", base, now.format("%Y%m%d-%H%M"), extension)
}

fn display_name<'a>(options: &'a ExportOptions, project: &'a Project) -> &'a str {
    if options.project_name.is_empty() {
        &project.name
    } else {
        &options.project_name
    }
}

#[cfg(feature = "mp3")]
fn encode_mp3_buffer(buffer: &crate::graph::AudioBuffer, kbps: u32) -> ExportResult<Vec<u8>> {
    super::mp3::encode_mp3(buffer, kbps).map_err(ExportError::Mp3)
}

#[cfg(not(feature = "mp3"))]
fn encode_mp3_buffer(_buffer: &crate::graph::AudioBuffer, _kbps: u32) -> ExportResult<Vec<u8>> {
    Err(ExportError::Mp3Disabled)
}

/// Render `project` offline, encode it and write it to `target`
///
/// `on_progress` is called at each checkpoint; the last call always has
/// progress 1.0 (complete or failed). Nothing is written unless every step succeeds.
pub async fn export_project_audio<F>(
    project: &Project,
    catalog: &PackCatalog,
    options: &ExportOptions,
    target: &dyn DownloadTarget,
    mut on_progress: F,
) -> ExportResult<ExportedFile>
where
    F: FnMut(&ExportProgress),
{
    target.check()?;
    if options.format == ExportFormat::Mp3 && !cfg!(feature = "mp3") {
        return Err(ExportError::Mp3Disabled);
    }

    let result = run_export(project, catalog, options, target, &mut on_progress).await;
    match &result {
        Ok(file) => {
            log::info!("Exported {} ({} bytes)", file.path.display(), file.bytes);
            on_progress(
                &ExportProgress::new(ExportStage::Complete, format!("Saved {}", file.filename))
                    .with_data(serde_json::json!({
                        "path": file.path,
                        "bytes": file.bytes,
                        "sha256": file.sha256,
                    })),
            );
        }
        Err(e) => {
            log::error!("Export failed: {}", e);
            on_progress(&ExportProgress::new(ExportStage::Failed, e.to_string()));
        }
    }
    result
}

async fn run_export<F>(
    project: &Project,
    catalog: &PackCatalog,
    options: &ExportOptions,
    target: &dyn DownloadTarget,
    on_progress: &mut F,
) -> ExportResult<ExportedFile>
where
    F: FnMut(&ExportProgress),
{
    let settings = options.settings.normalized();
    let mut rng = StdRng::seed_from_u64(settings.humanize_seed);
    let playback = resolve_playback_schedules(project, catalog, options.mode, &mut rng);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let render_catalog = catalog.clone();
    let format = options.format;
    let task = tokio::task::spawn_blocking(move || {
        let mut report = |progress: ExportProgress| {
            // Receiver only goes away when the export future is dropped
            let _ = tx.send(progress);
        };
        render_and_encode(&playback, &render_catalog, &settings, format, &mut report)
    });

    while let Some(progress) = rx.recv().await {
        on_progress(&progress);
    }
    let (bytes, duration) = task.await.map_err(|e| ExportError::Task(e.to_string()))??;

    let filename = export_filename(display_name(options, project), format.extension(), Local::now());
    let (path, sha256) = target.write(&filename, &bytes)?;

    Ok(ExportedFile {
        path,
        filename,
        bytes: bytes.len(),
        sha256,
        duration,
    })
}

/// Build voices, schedule, render and encode, reporting each stage as it starts
///
/// Voices are released only once the encoded bytes exist. Returns the bytes and
/// the rendered length in seconds.
fn render_and_encode(
    playback: &ResolvedPlayback,
    catalog: &PackCatalog,
    settings: &EngineSettings,
    format: ExportFormat,
    report: &mut dyn FnMut(ExportProgress),
) -> ExportResult<(Vec<u8>, f64)> {
    let mut render = OfflineRender::new(playback, settings);

    report(ExportProgress::new(ExportStage::Preparing, "Preparing instruments"));
    let voices = render.prepare(catalog);

    report(
        ExportProgress::new(ExportStage::Scheduling, "Scheduling notes").with_data(serde_json::json!({
            "voices": voices,
            "schedules": playback.schedules.len(),
            "patterns": playback.count(ScheduleKind::Pattern),
            "performances": playback.count(ScheduleKind::Performance),
            "notes": playback.note_count(),
            "duration": playback.duration,
        })),
    );
    let callbacks = render.schedule();

    report(
        ExportProgress::new(ExportStage::Rendering, "Rendering audio")
            .with_data(serde_json::json!({ "callbacks": callbacks })),
    );
    let buffer = render.render()?;

    report(
        ExportProgress::new(ExportStage::Encoding, "Encoding")
            .with_data(serde_json::json!({ "liveVoices": render.session().voices().len() })),
    );
    let bytes = match format {
        ExportFormat::Wav => encode_wav(&buffer)?,
        ExportFormat::Mp3 => encode_mp3_buffer(&buffer, settings.mp3_bitrate)?,
    };

    let released = render.finish();
    log::debug!("Released {} nodes after encoding", released);
    Ok((bytes, buffer.duration()))
}

/// Write the project as a pretty-printed stored payload
pub fn export_project_as_json(
    project: &Project,
    name: &str,
    target: &dyn DownloadTarget,
) -> ExportResult<ExportedFile> {
    target.check()?;
    let payload = create_stored_project_payload(project);
    let bytes = serde_json::to_vec_pretty(&payload)?;

    let name = if name.is_empty() { project.name.as_str() } else { name };
    let filename = export_filename(name, "json", Local::now());
    let (path, sha256) = target.write(&filename, &bytes)?;
    log::info!("Exported project JSON to {}", path.display());

    Ok(ExportedFile {
        path,
        filename,
        bytes: bytes.len(),
        sha256,
        duration: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Chunk, SoundSource, Track};
    use crate::state::{calculate_sha256, deserialize_project};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn project() -> Project {
        let mut project = Project::new("My Song!", 240.0);
        project.tracks.push(Track::new(
            "Kick",
            SoundSource::new("core", "kick"),
            Chunk::with_steps("kick", vec![true, false, false, false]),
        ));
        project
    }

    fn options(format: ExportFormat) -> ExportOptions {
        ExportOptions {
            project_name: String::new(),
            format,
            mode: PlaybackMode::Song,
            settings: EngineSettings {
                sample_rate: 8000,
                render_tail: 0.1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_export_filename() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 0).unwrap();
        assert_eq!(export_filename("My Song!", "wav", now), "MySong-20240309-0705.wav");
        assert_eq!(export_filename("lo-fi_beat", "mp3", now), "lo-fi_beat-20240309-0705.mp3");
        assert_eq!(export_filename("??", "json", now), "project-20240309-0705.json");
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("WAV".parse::<ExportFormat>().unwrap(), ExportFormat::Wav);
        assert_eq!("mp3".parse::<ExportFormat>().unwrap(), ExportFormat::Mp3);
        assert!("ogg".parse::<ExportFormat>().is_err());
    }

    #[tokio::test]
    async fn test_export_wav() {
        let dir = TempDir::new().unwrap();
        let target = DirectoryTarget::new(dir.path());
        let mut stages = Vec::new();

        let file = export_project_audio(
            &project(),
            PackCatalog::builtin(),
            &options(ExportFormat::Wav),
            &target,
            |p| stages.push((p.stage, p.progress)),
        )
        .await
        .unwrap();

        let kinds: Vec<ExportStage> = stages.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            kinds,
            vec![
                ExportStage::Preparing,
                ExportStage::Scheduling,
                ExportStage::Rendering,
                ExportStage::Encoding,
                ExportStage::Complete,
            ]
        );
        assert_eq!(stages.last().unwrap().1, 1.0);

        assert!(file.filename.starts_with("MySong-"));
        assert!(file.filename.ends_with(".wav"));
        let written = std::fs::read(&file.path).unwrap();
        assert_eq!(written.len(), file.bytes);
        assert_eq!(calculate_sha256(&written), file.sha256);
        assert!(file.duration > 1.0);

        let reader = hound::WavReader::new(std::io::Cursor::new(written)).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().channels, 2);
    }

    #[tokio::test]
    async fn test_scheduling_progress_reports_counts() {
        let dir = TempDir::new().unwrap();
        let target = DirectoryTarget::new(dir.path());
        let mut scheduling = None;

        export_project_audio(
            &project(),
            PackCatalog::builtin(),
            &options(ExportFormat::Wav),
            &target,
            |p| {
                if p.stage == ExportStage::Scheduling {
                    scheduling = p.data.clone();
                }
            },
        )
        .await
        .unwrap();

        let data = scheduling.unwrap();
        assert_eq!(data["schedules"], 1);
        assert_eq!(data["patterns"], 1);
        assert_eq!(data["performances"], 0);
        assert_eq!(data["notes"], 1);
        assert_eq!(data["voices"], 1);
        assert!(data["duration"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_voices_outlive_encoding() {
        let settings = options(ExportFormat::Wav).settings;
        let mut rng = StdRng::seed_from_u64(settings.humanize_seed);
        let playback =
            resolve_playback_schedules(&project(), PackCatalog::builtin(), PlaybackMode::Song, &mut rng);
        let mut reports = Vec::new();

        let (bytes, duration) = render_and_encode(
            &playback,
            PackCatalog::builtin(),
            &settings,
            ExportFormat::Wav,
            &mut |p: ExportProgress| reports.push(p),
        )
        .unwrap();

        let kinds: Vec<ExportStage> = reports.iter().map(|p| p.stage).collect();
        assert_eq!(
            kinds,
            vec![
                ExportStage::Preparing,
                ExportStage::Scheduling,
                ExportStage::Rendering,
                ExportStage::Encoding,
            ]
        );
        // Voices were built before scheduling and were still held while encoding
        assert_eq!(reports[1].data.as_ref().unwrap()["voices"], 1);
        assert_eq!(reports[3].data.as_ref().unwrap()["liveVoices"], 1);
        assert!(!bytes.is_empty());
        assert!((duration - 1.1).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_missing_target_fails_immediately() {
        let dir = TempDir::new().unwrap();
        let target = DirectoryTarget::new(dir.path().join("missing"));
        let mut calls = 0;

        let result = export_project_audio(
            &project(),
            PackCatalog::builtin(),
            &options(ExportFormat::Wav),
            &target,
            |_| calls += 1,
        )
        .await;

        assert!(matches!(result, Err(ExportError::NoDownloadTarget(_))));
        assert_eq!(calls, 0);
    }

    #[cfg(not(feature = "mp3"))]
    #[tokio::test]
    async fn test_mp3_disabled() {
        let dir = TempDir::new().unwrap();
        let target = DirectoryTarget::new(dir.path());
        let result = export_project_audio(
            &project(),
            PackCatalog::builtin(),
            &options(ExportFormat::Mp3),
            &target,
            |_| {},
        )
        .await;
        assert!(matches!(result, Err(ExportError::Mp3Disabled)));
    }

    #[test]
    fn test_export_json() {
        let dir = TempDir::new().unwrap();
        let target = DirectoryTarget::new(dir.path());
        let original = project();

        let file = export_project_as_json(&original, "", &target).unwrap();
        assert!(file.filename.ends_with(".json"));

        let json = std::fs::read_to_string(&file.path).unwrap();
        assert!(json.contains("\n  \"version\": 1"));
        assert_eq!(deserialize_project(&json), original);
    }
}
