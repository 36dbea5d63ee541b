//! Replays recorded keypoint frames through the engine.
//!
//! Usage: jump_replay <frames.jsonl> [config.toml]
//!
//! Each input line is `{"t": <seconds>, "people": [[[x, y], ...], ...]}`.
//! A line with `"reset": true` resets the engine before its frame is applied.
//! One FrameReport JSON is written to stdout per frame; a summary goes to the log.

use std::io::{BufRead, BufReader, BufWriter, Write};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use sync_jump::config::Config;
use sync_jump::logging;
use sync_jump::pose::PersonKeypoints;
use sync_jump::round::RoundPhase;
use sync_jump::JumpEngine;

const DEFAULT_CONFIG_PATH: &str = "jump_server.toml";

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    #[serde(alias = "t")]
    timestamp: f64,
    #[serde(default)]
    people: Vec<PersonKeypoints>,
    #[serde(default)]
    reset: bool,
}

#[derive(Debug, Default, PartialEq)]
struct ReplaySummary {
    frames: usize,
    rejected: usize,
    group_jumps: u32,
    rounds_succeeded: u32,
    rounds_failed: u32,
}

fn replay<R: BufRead, W: Write>(
    engine: &mut JumpEngine,
    input: R,
    out: &mut W,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (lineno, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let frame: RecordedFrame = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid frame", lineno + 1))?;

        if frame.reset {
            engine.reset();
        }
        let previous_phase = engine.round().phase();
        match engine.update(frame.timestamp, &frame.people) {
            Ok(report) => {
                summary.frames += 1;
                if previous_phase != RoundPhase::Result
                    && report.round.phase == RoundPhase::Result
                {
                    match report.round.outcome {
                        Some(outcome) if outcome.is_success() => summary.rounds_succeeded += 1,
                        Some(_) => summary.rounds_failed += 1,
                        None => {}
                    }
                }
                serde_json::to_writer(&mut *out, &report)?;
                writeln!(out)?;
            }
            Err(e) => {
                summary.rejected += 1;
                warn!("line {}: {}", lineno + 1, e);
            }
        }
    }

    summary.group_jumps = engine.group_jumps();
    out.flush()?;
    Ok(summary)
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        bail!("usage: {} <frames.jsonl> [config.toml]", args[0]);
    }
    let input_path = &args[1];
    let config_path = args.get(2).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);

    logging::init_stderr(false)?;
    info!("Jump Replay ({})", env!("GIT_VERSION"));
    let config = Config::load_or_default(config_path);
    let mut engine = JumpEngine::new(config)?;

    let file = std::fs::File::open(input_path)
        .with_context(|| format!("failed to open {}", input_path))?;
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let summary = replay(&mut engine, BufReader::new(file), &mut out)?;

    info!(
        "{} frames ({} rejected), group jumps {}, rounds {} succeeded / {} failed",
        summary.frames,
        summary.rejected,
        summary.group_jumps,
        summary.rounds_succeeded,
        summary.rounds_failed
    );
    Ok(())
}
