// chunkseq - Step/pattern sequencer engine
// Module declarations

pub mod arranger;
pub mod graph;
pub mod groove;
pub mod macros;
pub mod packs;
pub mod project;
pub mod render;
pub mod settings;
pub mod state;
pub mod voice;

pub use arranger::{resolve_playback_schedules, PlaybackMode, ResolvedPlayback};
pub use packs::PackCatalog;
pub use project::Project;
pub use render::{export_project_as_json, export_project_audio, render_offline, ExportOptions};
pub use settings::EngineSettings;
