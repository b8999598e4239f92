// chunkseq CLI - Render, inspect and store sequencer projects
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chunkseq::arranger::{export_midi, MidiExportOptions};
use chunkseq::packs::PackCatalog;
use chunkseq::project::Project;
use chunkseq::render::{
    export_filename, export_project_as_json, export_project_audio, DirectoryTarget, DownloadTarget,
    ExportFormat, ExportOptions, ProgressWriter,
};
use chunkseq::state::{self, deserialize_project};
use chunkseq::{resolve_playback_schedules, EngineSettings, PlaybackMode};

#[derive(Parser)]
#[command(name = "chunkseq")]
#[command(author, version, about = "Step/pattern sequencer engine", long_about = None)]
struct Cli {
    /// Engine settings JSON (defaults when omitted)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Extra sound packs JSON, added to the built-in core pack
    #[arg(long, global = true)]
    packs: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a project to WAV or MP3
    Export {
        /// Project JSON (stored payload or bare project)
        project: PathBuf,

        #[arg(long, default_value = "wav")]
        format: ExportFormat,

        /// Output directory (user download directory when omitted)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Play the flat track list instead of the arrangement
        #[arg(long = "loop")]
        looped: bool,

        /// Append progress entries to this JSONL file
        #[arg(long)]
        trace: Option<PathBuf>,
    },

    /// Print the resolved playback schedules as JSON
    Schedule {
        project: PathBuf,

        #[arg(long = "loop")]
        looped: bool,
    },

    /// Export the resolved schedules as a Standard MIDI File
    Midi {
        project: PathBuf,

        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Export a project as a pretty-printed stored payload
    Json {
        project: PathBuf,

        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Saved projects in the local database
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// Save a project file under a name
    Save { name: String, project: PathBuf },
    /// Print a saved project as JSON
    Load { name: String },
    /// List saved projects
    List,
    /// Delete a saved project
    Delete { name: String },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let settings = match &cli.settings {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::default(),
    };
    let catalog = match &cli.packs {
        Some(path) => PackCatalog::load_with_builtin(path)?,
        None => PackCatalog::builtin().clone(),
    };

    match cli.command {
        Commands::Export {
            project,
            format,
            out,
            looped,
            trace,
        } => {
            let project = read_project(&project)?;
            let target = DirectoryTarget::new(output_dir(out)?);
            let options = ExportOptions {
                project_name: project.name.clone(),
                format,
                mode: playback_mode(looped),
                settings,
            };
            let writer = trace.map(ProgressWriter::new);

            let file = export_project_audio(&project, &catalog, &options, &target, |progress| {
                log::info!("[{:>3.0}%] {}", progress.progress * 100.0, progress.message);
                if let Some(writer) = &writer {
                    if let Err(e) = writer.write(progress) {
                        log::warn!("Failed to write progress entry: {}", e);
                    }
                }
            })
            .await?;
            println!("{}", file.path.display());
        }
        Commands::Schedule { project, looped } => {
            let project = read_project(&project)?;
            let mut rng = StdRng::seed_from_u64(settings.humanize_seed);
            let playback = resolve_playback_schedules(&project, &catalog, playback_mode(looped), &mut rng);
            println!("{}", serde_json::to_string_pretty(&playback)?);
        }
        Commands::Midi { project, out } => {
            let project = read_project(&project)?;
            let mut rng = StdRng::seed_from_u64(settings.humanize_seed);
            let playback = resolve_playback_schedules(&project, &catalog, PlaybackMode::Song, &mut rng);
            let bytes = export_midi(&playback, &MidiExportOptions::default())?;

            let target = DirectoryTarget::new(output_dir(out)?);
            let filename = export_filename(&project.name, "mid", chrono::Local::now());
            let (path, _) = target.write(&filename, &bytes)?;
            println!("{}", path.display());
        }
        Commands::Json { project, out } => {
            let project = read_project(&project)?;
            let target = DirectoryTarget::new(output_dir(out)?);
            let file = export_project_as_json(&project, &project.name, &target)?;
            println!("{}", file.path.display());
        }
        Commands::Store { action } => {
            let db = state::init_db()?;
            match action {
                StoreAction::Save { name, project } => {
                    let project = read_project(&project)?;
                    state::save_project(&db, &name, &project)?;
                    log::info!("Saved project {}", name);
                }
                StoreAction::Load { name } => match state::load_project(&db, &name)? {
                    Some(project) => println!("{}", serde_json::to_string_pretty(&project)?),
                    None => return Err(format!("No saved project named {}", name).into()),
                },
                StoreAction::List => {
                    for entry in state::list_projects(&db)? {
                        println!("{}\t{}", entry.name, entry.updated_at);
                    }
                }
                StoreAction::Delete { name } => {
                    if !state::delete_project(&db, &name)? {
                        log::warn!("No saved project named {}", name);
                    }
                }
            }
        }
    }

    Ok(())
}

fn read_project(path: &Path) -> CliResult<Project> {
    let json = std::fs::read_to_string(path)?;
    Ok(deserialize_project(&json))
}

fn output_dir(out: Option<PathBuf>) -> CliResult<PathBuf> {
    match out {
        Some(dir) => Ok(dir),
        None => Ok(state::get_exports_dir()?),
    }
}

fn playback_mode(looped: bool) -> PlaybackMode {
    if looped {
        PlaybackMode::Loop
    } else {
        PlaybackMode::Song
    }
}
