use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use winssim::image::io::load_rgb_image;
use winssim::{
    scan_results, Aggregator, BatchCollector, BatchCommand, BatchEvent, BatchSession, Command,
    CompareConfig, Comparator, ControlLoop, Countdown, EngineEvent, FolderPatternLibrary,
    FsRecordSink, ImageFileFrameSource, JsonConfigStore, Pattern, PatternId, Region,
    RegionSynchronizer, Settings,
};

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "WinSSIM CLI (JSON settings driven)")]
struct Cli {
    /// Path to the JSON settings file.
    #[arg(short, long, value_name = "FILE", default_value = "settings.json")]
    config: PathBuf,
    /// Log at debug level regardless of the configured level.
    #[arg(long)]
    trace: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score every configured region of a capture against a pattern.
    Probe {
        #[arg(long, value_name = "FILE")]
        image: PathBuf,
        #[arg(long, value_name = "FILE")]
        pattern: PathBuf,
        /// Score rows in parallel.
        #[arg(long)]
        parallel: bool,
        /// Write the JSON report here instead of stdout.
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Run the capture loop against a snapshot file.
    Run {
        /// Snapshot file refreshed by the capture tool.
        #[arg(long, value_name = "FILE")]
        frame: PathBuf,
        #[arg(long, default_value = winssim::run::DEFAULT_COLLECTION_NAME)]
        collection: String,
        /// Stop after this many scored triggers.
        #[arg(long, default_value_t = 1)]
        cycles: usize,
        /// Stop automation at the end of the current run.
        #[arg(long)]
        single_run: bool,
        /// Override the configured countdown length in seconds.
        #[arg(long)]
        timer: Option<u32>,
    },
    /// Collect new patterns from a snapshot file, one per countdown.
    Batch {
        /// Snapshot file refreshed by the capture tool.
        #[arg(long, value_name = "FILE")]
        frame: PathBuf,
        /// Target folder; defaults to the configured pattern folder.
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,
        /// Stop after this many patterns.
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Override the configured countdown length in seconds.
        #[arg(long)]
        timer: Option<u32>,
    },
    /// Summarize persisted runs as JSON.
    Summary {
        /// Results folder; defaults to the configured one.
        #[arg(long, value_name = "DIR")]
        results: Option<PathBuf>,
    },
    /// Print an example settings file and exit.
    PrintExample,
}

#[derive(Debug, Serialize)]
struct ProbeRecord {
    region_id: usize,
    image_region: Region,
    pattern_region: Region,
    score: Option<f64>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CycleLine {
    run: usize,
    cursor: usize,
    pattern_total: usize,
    scores: Vec<f64>,
    running_average: f64,
    collection_average: f64,
}

#[derive(Debug, Serialize)]
struct BatchLine {
    id: String,
    path: PathBuf,
}

#[derive(Debug, Serialize)]
struct SummaryLine {
    date: String,
    collection: String,
    run: String,
    comparisons: usize,
    final_average: Option<f64>,
}

fn init_logging(level: &str, trace: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if trace {
        "debug".to_string()
    } else {
        level.to_ascii_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("winssim={level}").parse()?),
        )
        .with_target(false)
        .init();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::PrintExample = cli.command {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let store = JsonConfigStore::new(&cli.config);
    let settings = store.load()?;
    init_logging(&settings.log_level, cli.trace)?;

    match cli.command {
        Commands::Probe {
            image,
            pattern,
            parallel,
            output,
        } => probe(&settings, image, pattern, parallel, output),
        Commands::Run {
            frame,
            collection,
            cycles,
            single_run,
            timer,
        } => run(settings, frame, &collection, cycles, single_run, timer),
        Commands::Batch {
            frame,
            folder,
            count,
            timer,
        } => {
            let folder = folder.unwrap_or_else(|| settings.pattern_folder.clone());
            let seconds = timer.unwrap_or(settings.timer_seconds);
            batch(frame, folder, count, seconds)
        }
        Commands::Summary { results } => {
            let root = results.unwrap_or_else(|| settings.results_folder.clone());
            let lines: Vec<SummaryLine> = scan_results(&root)?
                .into_iter()
                .map(|s| SummaryLine {
                    comparisons: s.comparisons(),
                    final_average: s.final_average(),
                    date: s.date,
                    collection: s.collection,
                    run: s.run,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&lines)?);
            Ok(())
        }
        Commands::PrintExample => Ok(()),
    }
}

fn probe(
    settings: &Settings,
    image: PathBuf,
    pattern: PathBuf,
    parallel: bool,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let frame = load_rgb_image(&image)?;
    let pattern_id = pattern
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(PatternId::from_file_name)
        .unwrap_or(PatternId::new(0));
    let pattern = Pattern::new(pattern_id, load_rgb_image(&pattern)?);
    let comparator = Comparator::new().with_config(CompareConfig {
        parallel,
        ..CompareConfig::default()
    });

    let mut sync = RegionSynchronizer::new(settings.region_set.clone());
    let ids: Vec<usize> = sync.region_set().iter().map(|(id, _)| id).collect();
    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        let pair = sync.region_set().get(id)?;
        let result = sync.test_region(id, frame.view(), Some(&pattern), &comparator);
        records.push(ProbeRecord {
            region_id: id,
            image_region: pair.image_region,
            pattern_region: pair.pattern_region,
            score: result.as_ref().ok().map(|c| c.score),
            error: result.err().map(|e| e.to_string()),
        });
    }

    let json = serde_json::to_string_pretty(&records)?;
    match output {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn run(
    settings: Settings,
    frame: PathBuf,
    collection: &str,
    cycles: usize,
    single_run: bool,
    timer: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut run_settings = settings.run_settings();
    if let Some(seconds) = timer {
        run_settings.timer_seconds = seconds;
    }
    let library = FolderPatternLibrary::open(settings.library_folders())?;
    let sink = FsRecordSink::new(&settings.results_folder);
    let aggregator = Aggregator::open(sink, collection, settings.region_set.clone(), run_settings)?;
    let frames = ImageFileFrameSource::new(frame);
    let mut control = ControlLoop::new(aggregator, frames, library, Countdown::new());

    let start = if single_run {
        Command::SingleRun
    } else {
        Command::Start
    };
    let mut events = control.handle(start);
    let mut scored = 0usize;
    let budget = Duration::from_secs(u64::from(run_settings.timer_seconds.max(1)) + 5);
    let mut last_progress = Instant::now();

    loop {
        for event in events.drain(..) {
            match event {
                EngineEvent::Tick { remaining } => {
                    tracing::debug!(remaining = remaining.as_str(), "tick");
                    last_progress = Instant::now();
                }
                EngineEvent::Scored(report) => {
                    scored += 1;
                    let line = CycleLine {
                        run: report.run_ordinal,
                        cursor: report.cursor,
                        pattern_total: report.pattern_total,
                        scores: report.comparisons.iter().map(|c| c.score).collect(),
                        running_average: report.running_average,
                        collection_average: report.collection_average,
                    };
                    println!("{}", serde_json::to_string(&line)?);
                }
                EngineEvent::RunSealed(sealed) => {
                    tracing::info!(
                        run = sealed.ordinal,
                        average = sealed.average,
                        path = %sealed.storage_path.display(),
                        "run sealed"
                    );
                }
                EngineEvent::Stopped => tracing::info!("automation stopped"),
                EngineEvent::Notice(notice) => tracing::warn!("{notice}"),
            }
        }
        if scored >= cycles || control.is_idle() {
            break;
        }
        if last_progress.elapsed() > budget {
            return Err("countdown stalled".into());
        }
        events = control.pump();
    }

    control.handle(Command::Stop);
    Ok(())
}

fn batch(
    frame: PathBuf,
    folder: PathBuf,
    count: usize,
    timer_seconds: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let collector = BatchCollector::open(folder)?;
    let frames = ImageFileFrameSource::new(frame);
    let mut session = BatchSession::new(collector, frames, Countdown::new(), timer_seconds);

    let mut events = session.handle(BatchCommand::Start);
    let mut saved = 0usize;
    let budget = Duration::from_secs(u64::from(timer_seconds.max(1)) + 5);
    let mut last_progress = Instant::now();

    loop {
        for event in events.drain(..) {
            match event {
                BatchEvent::Tick { remaining } => {
                    tracing::debug!(remaining = remaining.as_str(), "tick");
                    last_progress = Instant::now();
                }
                BatchEvent::Captured(capture) => {
                    saved += 1;
                    let line = BatchLine {
                        id: capture.id.to_string(),
                        path: capture.path,
                    };
                    println!("{}", serde_json::to_string(&line)?);
                }
                BatchEvent::Stopped => tracing::info!("batch stopped"),
                BatchEvent::Notice(notice) => tracing::warn!("{notice}"),
            }
        }
        if saved >= count || !session.is_collecting() {
            break;
        }
        if last_progress.elapsed() > budget {
            return Err("countdown stalled".into());
        }
        events = session.pump();
    }

    session.handle(BatchCommand::Stop);
    Ok(())
}
