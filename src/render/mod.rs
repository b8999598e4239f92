// Render Engine - Drives resolved schedules into voices, offline or live
// Offline renders are mastered and encoded to WAV/MP3 for export

pub mod driver;
pub mod export;
pub mod live;
pub mod mixer;
#[cfg(feature = "mp3")]
pub mod mp3;
pub mod progress;
pub mod transport;
pub mod wav;

// Re-export main types
pub use driver::{render_offline, OfflineRender, RenderSession, VoiceCache};
pub use export::{
    export_filename, export_project_as_json, export_project_audio, DirectoryTarget,
    DownloadTarget, ExportError, ExportFormat, ExportOptions, ExportResult, ExportedFile,
};
pub use live::LivePlayer;
pub use mixer::{apply_master, MasterSettings};
pub use progress::{ExportProgress, ExportStage, ProgressWriter};
pub use transport::{Clock, LiveTransport, ManualClock, OfflineTransport, SystemClock, Transport};
pub use wav::encode_wav;
