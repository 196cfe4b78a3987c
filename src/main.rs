#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level as TraceLevel, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

use aestiv_layout::config::Settings;
use aestiv_layout::constants::config::ENV_LOG_LEVEL;
use aestiv_layout::{
    DefaultPresets, FileBackend, FlushOutcome, LayoutBackend, LayoutMode, LayoutStore, LocalSnapshot,
    PersistenceCoordinator, PresetUpdate,
};

#[derive(Parser, Debug)]
#[command(name = "aestiv-layout", version, about = "Inspect and edit per-node-type dashboard layouts")]
struct Args {
    /// Backend directory (overrides settings and environment)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Local snapshot directory (overrides settings and environment)
    #[arg(long, global = true)]
    snapshot_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored node types
    List,
    /// Print the render items of a node type
    Show {
        node_type: String,
        #[arg(long)]
        mode: Option<LayoutMode>,
    },
    /// Create a node type's layout from its default presets if it has none
    Init { node_type: String },
    /// Print a node type's config as JSON
    Export {
        node_type: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Replace a node type's config with an exported one (any format generation)
    Import { node_type: String, file: PathBuf },
    /// Stack blocks as tabs; the first block becomes the group id
    Group {
        node_type: String,
        mode: LayoutMode,
        #[arg(required = true, num_args = 2..)]
        block_ids: Vec<String>,
    },
    /// Dissolve a tab group
    Ungroup {
        node_type: String,
        mode: LayoutMode,
        group_id: String,
    },
    /// Add a block to an existing tab group
    AddMember {
        node_type: String,
        mode: LayoutMode,
        group_id: String,
        block_id: String,
    },
    /// Take a block out of a tab group
    RemoveMember {
        node_type: String,
        mode: LayoutMode,
        group_id: String,
        block_id: String,
    },
    /// Reorder the tabs of a group
    Reorder {
        node_type: String,
        mode: LayoutMode,
        group_id: String,
        #[arg(required = true, num_args = 2..)]
        order: Vec<String>,
    },
    /// Select the visible tab of a group
    Activate {
        node_type: String,
        mode: LayoutMode,
        group_id: String,
        index: usize,
    },
    /// Reset one mode, or drop the node type entirely
    Reset {
        node_type: String,
        #[arg(long)]
        mode: Option<LayoutMode>,
    },
    /// Drop every stored layout
    Clear {
        #[arg(long)]
        yes: bool,
    },
    #[command(subcommand)]
    Preset(PresetCommand),
    #[command(subcommand)]
    Defaults(DefaultsCommand),
}

#[derive(Subcommand, Debug)]
enum PresetCommand {
    List {
        #[arg(long)]
        node_type: Option<String>,
    },
    /// Save one mode of a node type as a preset
    Save {
        node_type: String,
        mode: LayoutMode,
        id: String,
        name: String,
    },
    Apply {
        node_type: String,
        mode: LayoutMode,
        id: String,
    },
    Rename { id: String, name: String },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum DefaultsCommand {
    Show {
        node_type: String,
    },
    /// Choose the presets a new node type starts from; modes not given keep their current default
    Set {
        node_type: String,
        #[arg(long)]
        fullscreen: Option<String>,
        #[arg(long)]
        normal: Option<String>,
    },
}

type Coordinator = PersistenceCoordinator<FileBackend>;

fn parse_level(level: &str) -> TraceLevel {
    match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

fn subscriber<W>(level: TraceLevel, writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(writer)
        .finish()
}

/// Run `load` under a provisional subscriber so parse and clamp warnings are not lost
fn load_settings<W>(writer: W, load: impl FnOnce() -> Settings) -> Settings
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let level = std::env::var(ENV_LOG_LEVEL).map_or(TraceLevel::INFO, |level| parse_level(&level));
    tracing::subscriber::with_default(subscriber(level, writer), load)
}

fn init_tracing(settings: &Settings) -> Result<()> {
    let level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| settings.log_level.clone());
    tracing::subscriber::set_global_default(subscriber(parse_level(&level), std::io::stderr))
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(std::io::stderr, Settings::load);
    if let Some(dir) = args.data_dir {
        settings.data_dir = dir;
    }
    if let Some(dir) = args.snapshot_dir {
        settings.snapshot_dir = dir;
    }
    init_tracing(&settings)?;

    let coordinator = PersistenceCoordinator::start(
        LayoutStore::new().into_shared(),
        Arc::new(FileBackend::new(&settings.data_dir)),
        Arc::new(LocalSnapshot::new(&settings.snapshot_dir, settings.snapshot_quota_bytes)),
        settings.flush_quiet(),
    );
    let report = coordinator.ensure_hydrated().await;
    info!(data_dir = %settings.data_dir.display(), source = ?report.source, loaded = report.loaded, "layout store ready");

    let result = execute(&coordinator, args.cmd).await;
    if coordinator.shutdown().await == FlushOutcome::Failed {
        warn!("final flush failed; changes are kept in the local snapshot");
    }
    result
}

async fn execute(coordinator: &Coordinator, cmd: Command) -> Result<()> {
    match cmd {
        Command::List => coordinator.with_store(|store| {
            for node_type in store.node_types() {
                let counts: Vec<String> = LayoutMode::ALL
                    .iter()
                    .map(|&mode| {
                        format!(
                            "{mode}: {} blocks, {} groups",
                            store.grid_layout(node_type, mode).len(),
                            store.tab_groups(node_type, mode).len()
                        )
                    })
                    .collect();
                println!("{node_type}\t{}", counts.join("\t"));
            }
        }),
        Command::Show { node_type, mode } => {
            let rendered = coordinator.with_store(|store| -> Result<String> {
                if !store.contains(&node_type) {
                    bail!("no layout stored for node type '{node_type}'");
                }
                let modes: Vec<LayoutMode> = mode.map_or_else(|| LayoutMode::ALL.to_vec(), |m| vec![m]);
                let mut out = serde_json::Map::new();
                for mode in modes {
                    let items = serde_json::to_value(store.effective_items(&node_type, mode))?;
                    out.insert(mode.to_string(), items);
                }
                serde_json::to_string_pretty(&out).context("Failed to render layout")
            })?;
            println!("{rendered}");
        }
        Command::Init { node_type } => {
            let config = coordinator.get_or_create(&node_type).await;
            println!("{}", serde_json::to_string_pretty(&config.compacted())?);
        }
        Command::Export { node_type, output } => {
            let Some(json) = coordinator.with_store(|store| store.export_node_config(&node_type)) else {
                bail!("no layout stored for node type '{node_type}'");
            };
            match output {
                Some(path) => fs::write(&path, json).context(format!("Failed to write export to {}", path.display()))?,
                None => println!("{json}"),
            }
        }
        Command::Import { node_type, file } => {
            let contents = fs::read_to_string(&file).context(format!("Failed to read {}", file.display()))?;
            if !coordinator.with_store(|store| store.import_node_config(&node_type, &contents)) {
                bail!("{} does not contain a JSON object", file.display());
            }
            println!("imported {node_type}");
        }
        Command::Group { node_type, mode, block_ids } => {
            match coordinator.with_store(|store| store.create_group(&node_type, mode, &block_ids)) {
                Some(group_id) => println!("created group {group_id}"),
                None => bail!("blocks could not be grouped"),
            }
        }
        Command::Ungroup { node_type, mode, group_id } => {
            require(coordinator.with_store(|store| store.dissolve_group(&node_type, mode, &group_id)), "no such group")?;
        }
        Command::AddMember { node_type, mode, group_id, block_id } => {
            require(
                coordinator.with_store(|store| store.add_member(&node_type, mode, &group_id, &block_id)),
                "block could not be added",
            )?;
        }
        Command::RemoveMember { node_type, mode, group_id, block_id } => {
            match coordinator.with_store(|store| store.remove_member(&node_type, mode, &group_id, &block_id)) {
                Some(outcome) => println!("{outcome:?}"),
                None => bail!("block is not a member of that group"),
            }
        }
        Command::Reorder { node_type, mode, group_id, order } => {
            match coordinator.with_store(|store| store.reorder_members(&node_type, mode, &group_id, &order)) {
                Some(new_id) => println!("group is now {new_id}"),
                None => bail!("order must be a permutation of the group's members"),
            }
        }
        Command::Activate { node_type, mode, group_id, index } => {
            require(
                coordinator.with_store(|store| store.set_active_tab(&node_type, mode, &group_id, index)),
                "no such group or tab",
            )?;
        }
        Command::Reset { node_type, mode } => {
            let done = coordinator.with_store(|store| match mode {
                Some(mode) => store.reset_mode(&node_type, mode),
                None => store.reset(&node_type),
            });
            require(done, "no layout stored for that node type")?;
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to clear every layout without --yes");
            }
            let removed = coordinator.with_store(|store| store.clear());
            println!("removed {removed} layouts");
        }
        Command::Preset(cmd) => execute_preset(coordinator, cmd).await?,
        Command::Defaults(cmd) => execute_defaults(coordinator, cmd).await?,
    }
    Ok(())
}

async fn execute_preset(coordinator: &Coordinator, cmd: PresetCommand) -> Result<()> {
    match cmd {
        PresetCommand::List { node_type } => {
            for preset in coordinator.list_presets(node_type.as_deref()).await {
                let builtin = if preset.is_builtin { "builtin" } else { "user" };
                println!("{}\t{}\t{}\t{builtin}\t{} blocks", preset.id, preset.node_type, preset.name, preset.layout.len());
            }
        }
        PresetCommand::Save { node_type, mode, id, name } => {
            let preset = coordinator.save_preset(&node_type, mode, &id, &name).await?;
            println!("saved preset {} ({} blocks)", preset.id, preset.layout.len());
        }
        PresetCommand::Apply { node_type, mode, id } => {
            require(coordinator.apply_preset(&node_type, mode, &id).await, "preset could not be applied")?;
        }
        PresetCommand::Rename { id, name } => {
            let update = PresetUpdate {
                name: Some(name),
                ..Default::default()
            };
            coordinator.backend().update_preset(&id, update).await?;
        }
        PresetCommand::Delete { id } => {
            if !coordinator.backend().delete_preset(&id).await? {
                println!("preset {id} did not exist");
            }
        }
    }
    Ok(())
}

async fn execute_defaults(coordinator: &Coordinator, cmd: DefaultsCommand) -> Result<()> {
    match cmd {
        DefaultsCommand::Show { node_type } => {
            let defaults = coordinator.backend().get_defaults(&node_type).await?.unwrap_or_else(|| DefaultPresets {
                node_type: node_type.clone(),
                ..Default::default()
            });
            println!("{}", serde_json::to_string_pretty(&defaults)?);
        }
        DefaultsCommand::Set { node_type, fullscreen, normal } => {
            let known = coordinator.list_presets(Some(&node_type)).await;
            for id in fullscreen.iter().chain(normal.iter()) {
                if !known.iter().any(|p| &p.id == id) {
                    bail!("no preset '{id}' for node type '{node_type}'");
                }
            }
            let mut defaults = coordinator.backend().get_defaults(&node_type).await?.unwrap_or_else(|| DefaultPresets {
                node_type: node_type.clone(),
                ..Default::default()
            });
            for (mode, preset_id) in [(LayoutMode::Fullscreen, fullscreen), (LayoutMode::Normal, normal)] {
                if preset_id.is_some() {
                    defaults.set_preset_id(mode, preset_id);
                }
            }
            coordinator.backend().set_defaults(&defaults).await?;
        }
    }
    Ok(())
}

fn require(done: bool, failure: &str) -> Result<()> {
    if !done {
        bail!("{failure}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), TraceLevel::DEBUG);
        assert_eq!(parse_level("warn"), TraceLevel::WARN);
        assert_eq!(parse_level("chatty"), TraceLevel::INFO);
    }

    #[test]
    fn test_settings_errors_are_logged_before_global_subscriber() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layout-store.json");
        fs::write(&path, "{ not json").unwrap();

        let captured = Captured::default();
        let writer = captured.clone();
        let settings = load_settings(move || writer.clone(), || Settings::load_from(&path));

        assert_eq!(settings, Settings::default());
        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("failed to parse settings file"), "{output}");
    }
}
