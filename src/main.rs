use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use marshal_gateway::config::{Config, Profile};
use marshal_gateway::events::{ChannelSink, FanoutSink, JsonLinesSink, LogSink};
use marshal_gateway::gesture::{GestureEvent, GestureLabel};
use marshal_gateway::replay::{RecordedSession, ReplaySummary, replay};

/// Capacity of the channel feeding the announcer
const ANNOUNCE_BUFFER: usize = 64;

/// Marshal - adaptive gesture confirmation for aircraft marshaling signals
#[derive(Parser)]
#[command(name = "marshal", version, about)]
struct Cli {
    /// Confirmation profile (precision or simple)
    #[arg(short, long, env = "MARSHAL_PROFILE", global = true)]
    profile: Option<Profile>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded session through the recognition loop
    Replay {
        /// JSON-lines recording
        file: PathBuf,
        /// Also write confirmed events here, one JSON object per line
        #[arg(long)]
        events_out: Option<PathBuf>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved engine configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,marshal_gateway=info",
        1 => "info,marshal_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.profile)?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Command::Replay {
            file,
            events_out,
            json,
        } => cmd_replay(config, &file, events_out.as_deref(), json).await,
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config.engine)?);
            Ok(())
        }
    }
}

/// Replay a recording; events stream to an announcer task as they are confirmed
async fn cmd_replay(
    config: Config,
    file: &Path,
    events_out: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let file = resolve_recording(&config, file);
    let session = RecordedSession::load(&file)?;
    tracing::info!(
        path = %file.display(),
        frames = session.len(),
        profile = %config.engine.profile,
        "replaying recording"
    );

    let (tx, rx) = mpsc::channel(ANNOUNCE_BUFFER);
    let announcer = tokio::spawn(announce(rx));

    let mut sink = FanoutSink::new().with(ChannelSink::new(tx));
    if let Some(path) = events_out {
        let writer = BufWriter::new(File::create(path)?);
        sink = sink.with(JsonLinesSink::new(writer));
        tracing::info!(path = %path.display(), "writing events");
    } else {
        sink = sink.with(LogSink);
    }

    let engine = config.engine;
    let summary =
        tokio::task::spawn_blocking(move || replay(&session, engine, sink)).await??;

    // the sink (and its sender) is gone once replay returns
    let announced = announcer.await?;
    tracing::debug!(announced, "announcer finished");

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// Relative paths that do not exist fall back to `<data_dir>/recordings/`
fn resolve_recording(config: &Config, file: &Path) -> PathBuf {
    if file.is_relative() && !file.exists() {
        let candidate = config.data_dir.join("recordings").join(file);
        if candidate.exists() {
            return candidate;
        }
    }
    file.to_path_buf()
}

/// Speak each confirmed gesture (logged; audio output lives elsewhere)
async fn announce(mut rx: mpsc::Receiver<GestureEvent>) -> usize {
    let mut count = 0;
    while let Some(event) = rx.recv().await {
        count += 1;
        tracing::info!(
            announcement = event.label.announcement(),
            command = event.command(),
            confidence = event.confidence,
            "announce"
        );
    }
    count
}

fn print_summary(summary: &ReplaySummary) {
    let stats = &summary.stats;
    println!(
        "Frames:      {} ({} processed, {} without pose, {} disabled)",
        stats.frames, stats.processed, stats.without_pose, stats.while_disabled
    );
    println!(
        "Events:      {} ({} dropped)",
        stats.events_emitted, stats.events_dropped
    );
    println!("---");

    for event in &summary.events {
        let truth = event.truth.map_or("-", GestureLabel::as_str);
        println!(
            "[{:8.3}s] {:<13} conf {:.2}  truth {}",
            event.t,
            event.event.command(),
            event.event.confidence,
            truth
        );
    }

    println!("---");
    for (label, count) in summary.per_label.iter() {
        println!("{:<13} {count}", label.command());
    }
    match summary.accuracy() {
        Some(accuracy) => println!(
            "Accuracy:    {:.1}% ({} matched, {} mismatched, {} unannotated)",
            accuracy * 100.0,
            summary.matched,
            summary.mismatched,
            summary.unannotated
        ),
        None => println!("Accuracy:    n/a (no annotated events)"),
    }
}
