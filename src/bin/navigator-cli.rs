use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use filenavigator_lib::classifier::Classifier;
use filenavigator_lib::logging::init_tracing;
use filenavigator_lib::media::{FsMediaIndex, MediaIndex};
use filenavigator_lib::move_engine::{DetectedFile, MoveDestination, MoveOperation};
use filenavigator_lib::notification::{
    ChannelNotificationSink, NotificationEvent, NotificationKind, PendingMove,
};
use filenavigator_lib::permissions::{DestinationPicker, StaticPicker};
use filenavigator_lib::{ConfigStore, NavigatorConfig, NavigatorService, ServiceMessage, WatchEndpoint};

#[derive(Parser)]
#[command(name = "navigator-cli")]
#[command(about = "Watches shared storage for new files and moves them", long_about = None)]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, default_value = "filenavigator.yaml")]
    config: PathBuf,

    /// Overrides the storage root from the configuration
    #[arg(short, long)]
    storage_root: Option<PathBuf>,

    /// Grant access to destinations without a stored grant
    #[arg(short, long)]
    grant: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch for new files. Notifications are printed as JSON lines; service
    /// messages are read as JSON lines from stdin.
    Watch,
    /// Move one file into a directory
    Move { file: PathBuf, destination: PathBuf },
    /// Move files (directories are walked) into one directory
    BatchMove {
        destination: PathBuf,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Delete one file
    Delete { file: PathBuf },
    /// Print the effective configuration
    Config,
}

struct CliService {
    service: Arc<NavigatorService>,
    events: mpsc::UnboundedReceiver<NotificationEvent>,
    rx: mpsc::UnboundedReceiver<ServiceMessage>,
}

fn start_service(config: ConfigStore, grant: bool) -> CliService {
    let (sink, events) = ChannelNotificationSink::new();
    let picker: Arc<dyn DestinationPicker> = if grant {
        Arc::new(StaticPicker::GrantRequested)
    } else {
        Arc::new(StaticPicker::Deny)
    };
    let (service, rx) = NavigatorService::new(config, Arc::new(sink), picker);
    CliService {
        service,
        events,
        rx,
    }
}

/// Looks the file up and classifies it the way an observer would.
fn detect(path: &Path, config: &NavigatorConfig) -> anyhow::Result<DetectedFile> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Cannot resolve {}", path.display()))?;
    let record = FsMediaIndex::new(config.storage_root.clone())
        .query(&path)
        .with_context(|| format!("Not a regular file: {}", path.display()))?;

    for endpoint in WatchEndpoint::ALL {
        let classifier = Classifier::for_endpoint(endpoint, config)?;
        if let Some(classification) = classifier.classify(&record) {
            return Ok(DetectedFile {
                record,
                classification,
            });
        }
    }
    bail!("{} is not a watched file type or source", path.display())
}

fn absolute(dir: &Path) -> anyhow::Result<PathBuf> {
    dir.canonicalize()
        .with_context(|| format!("Destination does not exist: {}", dir.display()))
}

/// Returns how many toasts were printed.
fn print_toasts(events: &mut mpsc::UnboundedReceiver<NotificationEvent>) -> usize {
    let mut printed = 0;
    while let Ok(event) = events.try_recv() {
        if let NotificationEvent::Toast(message) = event {
            println!("{message}");
            printed += 1;
        }
    }
    printed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut store = ConfigStore::load(cli.config.clone())
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(root) = cli.storage_root.clone() {
        // One-off override, not written back.
        store = ConfigStore::in_memory(NavigatorConfig {
            storage_root: root,
            ..store.snapshot()
        });
    }
    let config = store.snapshot();

    match cli.command {
        Command::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
            for warning in config.validate()? {
                eprintln!("warning: {warning}");
            }
        }

        Command::Move { file, destination } => {
            let file = detect(&file, &config)?;
            let destination = absolute(&destination)?;
            let mut cli_service = start_service(store, cli.grant);
            cli_service
                .service
                .dispatch(MoveOperation::picked(file, destination.clone()).into())
                .await;
            if print_toasts(&mut cli_service.events) == 0 {
                bail!(
                    "No access to {}; rerun with --grant",
                    destination.display()
                );
            }
        }

        Command::Delete { file } => {
            let file = detect(&file, &config)?;
            let mut cli_service = start_service(store, cli.grant);
            cli_service
                .service
                .dispatch(ServiceMessage::DeleteFile {
                    file,
                    resources: None,
                })
                .await;
            print_toasts(&mut cli_service.events);
        }

        Command::BatchMove { destination, paths } => {
            let destination = absolute(&destination)?;
            let cli_service = start_service(store, cli.grant);
            let ids = cli_service.service.resource_ids().clone();

            let mut moves = Vec::new();
            for root in &paths {
                for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    match detect(entry.path(), &config) {
                        Ok(file) => moves.push(PendingMove {
                            file,
                            resources: ids.allocate(0),
                        }),
                        Err(e) => eprintln!("skipping: {e}"),
                    }
                }
            }
            if moves.is_empty() {
                bail!("No movable files found");
            }

            let pb = ProgressBar::new(moves.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                    .progress_chars("#>-"),
            );

            let mut events = cli_service.events;
            let progress_bar = pb.clone();
            let printer = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if let NotificationEvent::Posted(n) = event {
                        if let NotificationKind::BatchProgress(p) = n.kind {
                            progress_bar.set_position(p.current as u64);
                        }
                    }
                }
            });

            let results = cli_service
                .service
                .batch_move(
                    "cli".to_string(),
                    MoveDestination::Directory(destination),
                    moves,
                )
                .await;
            pb.finish_with_message(results.summary_message());
            drop(cli_service.service);
            drop(cli_service.rx);
            printer.abort();

            for (kind, count) in &results.counts {
                println!("   {kind:?}: {count}");
            }
            if results.failures() > 0 {
                std::process::exit(1);
            }
        }

        Command::Watch => {
            let CliService {
                service,
                mut events,
                rx,
            } = start_service(store, cli.grant);
            if service.rebuild_observers() == 0 {
                bail!("Nothing to watch under {}", config.storage_root.display());
            }

            tokio::spawn(service.clone().run(rx));
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match serde_json::to_string(&event_json(&event)) {
                        Ok(line) => println!("{line}"),
                        Err(e) => eprintln!("cannot encode event: {e}"),
                    }
                }
            });

            let handle = service.handle();
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    line = lines.next_line() => match line? {
                        Some(line) if line.trim().is_empty() => {}
                        Some(line) => {
                            handle.send_json(line.as_bytes());
                        }
                        None => {
                            tokio::signal::ctrl_c().await?;
                            break;
                        }
                    },
                }
            }
            service.shutdown().await;
        }
    }

    Ok(())
}

fn event_json(event: &NotificationEvent) -> serde_json::Value {
    match event {
        NotificationEvent::Posted(n) => serde_json::json!({ "event": "posted", "notification": n }),
        NotificationEvent::Cancelled(id) => serde_json::json!({ "event": "cancelled", "id": id }),
        NotificationEvent::Toast(message) => serde_json::json!({ "event": "toast", "message": message }),
    }
}
