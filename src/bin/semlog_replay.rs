//! SemLog Replay - Rebuild an episode document from a recorded signal trace
//!
//! Replays a JSON-lines signal trace through a logging session and writes
//! the resulting OWL document (plus JSON and timeline when configured).
//!
//! Usage:
//!   cargo run --bin semlog-replay -- run.jsonl
//!   cargo run --bin semlog-replay -- run.jsonl --out SemLog --episode kitchen_01
//!   cargo run --bin semlog-replay -- run.jsonl --config config/semlog.toml --json

use std::path::PathBuf;
use std::process::ExitCode;

use bevy::log::{Level, LogPlugin};
use bevy::prelude::*;

use semlog::config::{CONFIG_FILE, SemLogConfig};
use semlog::session::SemLogSession;
use semlog::trace::{parse_trace, replay};

fn main() -> ExitCode {
    let args = ReplayArgs::from_args();

    if args.show_help {
        print_help();
        return ExitCode::SUCCESS;
    }
    let Some(trace_path) = args.trace.clone() else {
        eprintln!("Missing trace file. Run with --help for usage.");
        return ExitCode::FAILURE;
    };

    // Headless app only to install the log subscriber
    let mut app = App::new();
    app.add_plugins(LogPlugin {
        level: if args.verbose { Level::DEBUG } else { Level::INFO },
        ..default()
    });

    let mut config = match &args.config {
        Some(path) => match SemLogConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => SemLogConfig::load_or_default(&PathBuf::from(CONFIG_FILE)),
    };
    args.apply(&mut config);

    let parsed = match parse_trace(&trace_path) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Failed to read trace {}: {}", trace_path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    for skipped in &parsed.skipped {
        warn!("{}:{}: skipped ({})", trace_path.display(), skipped.line, skipped.reason);
    }
    println!(
        "Replaying {} signals from {}...",
        parsed.entries.len(),
        trace_path.display()
    );

    let mut session = match SemLogSession::new(config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Invalid config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    session.begin_play();
    let stats = replay(&mut session, &parsed.entries);

    if !session.is_running() {
        println!(
            "Session never started (start mode {:?}), nothing to export",
            session.config().session.start
        );
    }
    let Some(report) = session.finish() else {
        return ExitCode::FAILURE;
    };

    println!("============================================================");
    println!("Episode:        {}", session.episode_id());
    println!("Duration:       {:.3}s", session.now().secs());
    println!("Signals:        {} applied, {} rejected", stats.applied, stats.rejected);
    println!(
        "Furniture:      {} transitions, {} close impulses",
        stats.transitions, stats.impulses
    );
    println!(
        "Events:         {} ({} force-closed at finish)",
        report.finished_events, report.force_closed
    );
    for path in [&report.owl_path, &report.json_path, &report.timeline_path]
        .into_iter()
        .flatten()
    {
        println!("Written:        {}", path.display());
    }
    ExitCode::SUCCESS
}

/// Command line options
#[derive(Default)]
struct ReplayArgs {
    trace: Option<PathBuf>,
    config: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    episode: Option<String>,
    json: bool,
    no_timeline: bool,
    sequential: bool,
    verbose: bool,
    show_help: bool,
}

impl ReplayArgs {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut parsed = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    if i + 1 < args.len() {
                        parsed.config = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--out" | "-o" => {
                    if i + 1 < args.len() {
                        parsed.out_dir = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--episode" => {
                    if i + 1 < args.len() {
                        parsed.episode = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--json" => parsed.json = true,
                "--no-timeline" => parsed.no_timeline = true,
                "--sequential" => parsed.sequential = true,
                "--verbose" | "-v" => parsed.verbose = true,
                "--help" | "-h" => parsed.show_help = true,
                arg if !arg.starts_with('-') => {
                    parsed.trace = Some(PathBuf::from(arg));
                }
                other => eprintln!("Ignoring unknown option {}", other),
            }
            i += 1;
        }

        parsed
    }

    /// Command line overrides on top of the config file
    fn apply(&self, config: &mut SemLogConfig) {
        if let Some(dir) = &self.out_dir {
            config.session.log_directory = Some(dir.clone());
        }
        if let Some(episode) = &self.episode {
            config.session.episode_id = episode.clone();
        }
        if self.json {
            config.session.write_json = true;
        }
        if self.no_timeline {
            config.session.write_timelines = false;
        }
        if self.sequential {
            config.session.sequential_ids = true;
        }
        // Replays never reach a live knowledge base
        config.knowrob.enabled = false;
    }
}

fn print_help() {
    println!(
        r#"SemLog Replay - Rebuild an episode document from a signal trace

USAGE:
    cargo run --bin semlog-replay -- <TRACE> [OPTIONS]

ARGUMENTS:
    TRACE                   JSON-lines signal trace

OPTIONS:
    --config, -c <FILE>     Load config from TOML (default: {CONFIG_FILE} if present)
    --out, -o <DIR>         Write documents into DIR
    --episode <ID>          Episode id (default: from config or generated)
    --json                  Also write <episode>_ED.json
    --no-timeline           Skip <episode>_TL.html
    --sequential            Counter-based event ids (reproducible output)
    --verbose, -v           Debug logging
    --help, -h              Show this help

TRACE FORMAT:
    {{"t":0.0,"signal":"register_item","id":"Cup","class":"Cup"}}
    {{"t":1.0,"signal":"contact_begin","a":"Cup","b":"Table"}}
    {{"t":3.5,"signal":"contact_end","a":"Cup","b":"Table"}}
"#
    );
}
