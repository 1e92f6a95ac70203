use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use talk_envelope::audio::{SyntheticMic, ThreadTimer};
use talk_envelope::config::{AppConfig, EnvelopeConfig, EnvelopeProfile, SamplingStrategy};
use talk_envelope::fixtures::{ExpectationDiff, FixtureCatalog, FixtureReplayer};
use talk_envelope::frame::{FrameLoop, FrameReport};
use talk_envelope::mic::{Mic, MicLevel};
use talk_envelope::telemetry::CounterSnapshot;

#[derive(Parser, Debug)]
#[command(
    name = "talk_cli",
    about = "Talk activity envelope harness: replay recordings, simulate, or listen live"
)]
struct Cli {
    /// Override directory containing fixture assets (defaults to the crate's fixtures/)
    #[arg(long, global = true)]
    fixtures_dir: Option<PathBuf>,
    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    /// Standard deviation of the raw window
    Direct,
    /// Rate-of-change envelope with noise floor removal
    Envelope,
}

impl From<StrategyArg> for SamplingStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Direct => SamplingStrategy::DirectStatistic,
            StrategyArg::Envelope => SamplingStrategy::FilteredEnvelope,
        }
    }
}

#[derive(clap::Args, Debug)]
struct TuningArgs {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Envelope calibration: amplified or unscaled
    #[arg(long)]
    profile: Option<EnvelopeProfile>,
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a WAV recording and optionally compare against expectations
    Replay {
        /// Fixture name (under --fixtures-dir) or path to a WAV file
        #[arg(long)]
        wav: String,
        #[arg(long)]
        expect: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        tuning: TuningArgs,
        /// Include every frame report in the output
        #[arg(long)]
        trace: bool,
    },
    /// Run the sampler on a synthetic microphone in real time
    Simulate {
        #[arg(long, default_value_t = 5.0)]
        seconds: f32,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Queue samples in the timer thread and filter them per frame
        #[arg(long)]
        mailbox: bool,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Run the sampler on the default input device
    Live {
        #[arg(long, default_value_t = 10.0)]
        seconds: f32,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// List available fixtures on disk
    DumpFixtures,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let catalog = cli
        .fixtures_dir
        .map(FixtureCatalog::new)
        .unwrap_or_default();

    match cli.command {
        Commands::Replay {
            wav,
            expect,
            output,
            tuning,
            trace,
        } => run_replay(&catalog, &wav, expect, output, &tuning, trace),
        Commands::Simulate {
            seconds,
            seed,
            mailbox,
            tuning,
        } => run_simulate(seconds, seed, mailbox, &tuning),
        Commands::Live { seconds, tuning } => run_live(seconds, &tuning),
        Commands::Config { tuning } => {
            let config = load_config(&tuning)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
        Commands::DumpFixtures => run_dump(&catalog),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Defaults (or `--config`), then `--profile` and `--strategy` on top.
fn load_config(tuning: &TuningArgs) -> Result<AppConfig> {
    let mut config = match &tuning.config {
        Some(path) => AppConfig::try_load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(profile) = tuning.profile {
        config.envelope = EnvelopeConfig::from_profile(profile);
    }
    if let Some(strategy) = tuning.strategy {
        config.sampler.strategy = strategy.into();
    }
    config.validate()?;
    Ok(config)
}

fn run_replay(
    catalog: &FixtureCatalog,
    wav: &str,
    override_expect: Option<PathBuf>,
    output_path: Option<PathBuf>,
    tuning: &TuningArgs,
    trace: bool,
) -> Result<ExitCode> {
    let config = load_config(tuning)?;
    let data = catalog.load(wav, override_expect)?;
    let level_trace = FixtureReplayer::new(config)
        .run(&data)
        .with_context(|| format!("replaying fixture {}", wav))?;

    let frames: &[FrameReport] = if trace { &level_trace.frames } else { &[] };
    let report = ReplayReportPayload {
        fixture: &level_trace.fixture,
        sample_rate: level_trace.sample_rate,
        sampler_hz: level_trace.sampler_hz,
        fps: level_trace.fps,
        frame_count: level_trace.frames.len(),
        talking_ratio: level_trace.talking_ratio(),
        peak_level: level_trace.peak_level(),
        counters: level_trace.counters,
        frames,
    };
    emit_report(&report, output_path.as_deref())?;

    if let Some(expectations) = data.expectations {
        match expectations.verify(&level_trace) {
            Ok(()) => Ok(ExitCode::from(0)),
            Err(diff) => {
                emit_diff(&diff)?;
                Ok(ExitCode::from(2))
            }
        }
    } else {
        Ok(ExitCode::from(0))
    }
}

fn run_simulate(seconds: f32, seed: u64, mailbox: bool, tuning: &TuningArgs) -> Result<ExitCode> {
    let config = load_config(tuning)?;
    let source = SyntheticMic::new(config.sampler.frequency_hz, seed);
    let mic = Mic::from_config("synthetic", source, &config)?;
    let mut timer = ThreadTimer::new();

    let counters = if mailbox {
        let (sampler, mut pump, level) = mic.split_mailbox(config.sampler.mailbox_capacity);
        sampler.attach(&mut timer, config.sampler.frequency_hz)?;
        stream_frames(level, &config, seconds, || {
            pump.drain();
        })?
    } else {
        let (sampler, level) = mic.split();
        sampler.attach(&mut timer, config.sampler.frequency_hz)?;
        stream_frames(level, &config, seconds, || {})?
    };

    timer.stop();
    tracing::info!(
        ticks = counters.ticks,
        zero_elapsed = counters.zero_elapsed,
        mailbox_overruns = counters.mailbox_overruns,
        missed_deadlines = timer.missed(),
        "simulation finished"
    );
    Ok(ExitCode::from(0))
}

#[cfg(feature = "live")]
fn run_live(seconds: f32, tuning: &TuningArgs) -> Result<ExitCode> {
    let config = load_config(tuning)?;
    let (input, source) = talk_envelope::audio::open_default_input(config.sampler.adc_bits)?;
    tracing::info!(
        device = input.device_name(),
        sample_rate = input.sample_rate(),
        "listening"
    );

    let mic = Mic::from_config("default-input", source, &config)?;
    let (sampler, level) = mic.split();
    let mut timer = ThreadTimer::new();
    sampler.attach(&mut timer, config.sampler.frequency_hz)?;
    stream_frames(level, &config, seconds, || {})?;
    timer.stop();
    drop(input);
    Ok(ExitCode::from(0))
}

#[cfg(not(feature = "live"))]
fn run_live(_seconds: f32, _tuning: &TuningArgs) -> Result<ExitCode> {
    bail!("talk_cli was built without the `live` feature; rebuild with --features live")
}

/// Run the frame loop for `seconds`, printing one JSON line per frame and
/// calling `after_frame` once each line is out.
fn stream_frames<F: FnMut()>(
    level: MicLevel,
    config: &AppConfig,
    seconds: f32,
    mut after_frame: F,
) -> Result<CounterSnapshot> {
    if !(seconds > 0.0) {
        bail!("--seconds must be positive (got {})", seconds);
    }
    let frames = (seconds * config.frame.fps as f32).ceil() as u64;
    let mut frame_loop = FrameLoop::new(level.clone(), config.frame.clone());
    let mut write_error = None;

    frame_loop.run(frames, |report: &FrameReport| {
        if write_error.is_none() {
            if let Err(err) = serde_json::to_string(report).map(|line| println!("{line}")) {
                write_error = Some(err);
            }
        }
        after_frame();
    });

    if let Some(err) = write_error {
        return Err(err.into());
    }
    Ok(level.counters())
}

fn run_dump(catalog: &FixtureCatalog) -> Result<ExitCode> {
    let fixtures = catalog.discover()?;
    if fixtures.is_empty() {
        println!("No fixtures found under {}", catalog.root().display());
        return Ok(ExitCode::from(0));
    }

    for metadata in fixtures {
        if let Some(expect) = metadata.expect_path {
            println!("{} -> {}", metadata.name, expect.display());
        } else {
            println!("{}", metadata.name);
        }
    }
    Ok(ExitCode::from(0))
}

fn emit_report(report: &ReplayReportPayload<'_>, output_path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;

    if let Some(path) = output_path {
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }

    Ok(())
}

fn emit_diff(diff: &ExpectationDiff) -> Result<()> {
    let json = serde_json::to_string_pretty(&diff.to_json())?;
    eprintln!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct ReplayReportPayload<'a> {
    fixture: &'a str,
    sample_rate: u32,
    sampler_hz: u32,
    fps: u32,
    frame_count: usize,
    talking_ratio: f32,
    peak_level: f32,
    counters: CounterSnapshot,
    #[serde(skip_serializing_if = "slice_empty")]
    frames: &'a [FrameReport],
}

fn slice_empty(frames: &&[FrameReport]) -> bool {
    frames.is_empty()
}
