use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use press_core::batch::{self, CleanupRegistry};
use press_core::codecs::{AUDIO_BITRATE_RECOMMENDED_MAX, CRF_MAX, CRF_RECOMMENDED_MAX};
use press_core::engine::{CancelFlag, FfmpegEngine};
use press_core::orchestrate::{ConversionRequest, TrimWindow};
use press_core::retry::{TerminalPrompts, RESOLUTION_LADDER};

#[derive(Parser)]
#[command(name = "vid-press")]
#[command(version, about = "Size-driven video compressor built on ffmpeg", long_about = None)]
struct Cli {
    /// Input video files
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory (must exist)
    #[arg(short, long)]
    output: PathBuf,

    /// Constant rate factor, 0-63
    #[arg(long, default_value_t = press_core::CRF_DEFAULT)]
    crf: u32,

    /// Target resolution, e.g. 720p
    #[arg(short, long)]
    resolution: Option<String>,

    /// Video codec (h264, h265, vp8, vp9, av1 or an encoder name)
    #[arg(short, long)]
    codec: Option<String>,

    /// Audio bitrate in kbps
    #[arg(long, value_name = "KBPS")]
    audio_bitrate: Option<u32>,

    /// Name outputs randomly instead of after the input
    #[arg(long)]
    random_filename: bool,

    /// Let the encoder use all CPU cores
    #[arg(long)]
    multithread: bool,

    /// Exact encoder thread count, overrides --multithread
    #[arg(long)]
    threads: Option<usize>,

    /// Trim start offset in seconds
    #[arg(long, value_name = "SECS")]
    trim_start: Option<f64>,

    /// Trim duration in seconds
    #[arg(long, value_name = "SECS")]
    trim_duration: Option<f64>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = press_core::logging::init_logging(
        "vid_press",
        press_core::logging::LogConfig::default().with_level(level),
    );

    validate_args(&cli)?;

    press_core::engine::require_tools().map_err(|e| {
        anyhow::anyhow!("{}; install ffmpeg (e.g. `brew install ffmpeg` or `apt install ffmpeg`)", e)
    })?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            warn!("Interrupt received; finishing up");
            cancel.cancel();
        })?;
    }

    let trim = match (cli.trim_start, cli.trim_duration) {
        (_, None) if cli.trim_start.is_some() => {
            anyhow::bail!("--trim-start requires --trim-duration")
        }
        (start, Some(duration)) => Some(TrimWindow {
            start_secs: start.unwrap_or(0.0),
            duration_secs: duration,
        }),
        _ => None,
    };

    let mut requests = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        if !input.is_file() {
            anyhow::bail!("Input does not exist: {}", input.display());
        }
        let source_timestamp = std::fs::metadata(input).and_then(|m| m.modified()).ok();

        let mut request = ConversionRequest::new(input.clone(), cli.output.clone());
        request.crf = cli.crf;
        request.resolution = cli.resolution.clone();
        request.codec = cli.codec.clone();
        request.audio_bitrate_kbps = cli.audio_bitrate;
        request.random_filename = cli.random_filename;
        request.multithread = cli.multithread;
        request.threads = cli.threads;
        request.trim = trim;
        request.source_timestamp = source_timestamp;
        requests.push(request);
    }

    info!("🎬 vid-press: {} file(s), crf={}", requests.len(), cli.crf);

    let engine = FfmpegEngine::new(cancel.clone());
    let mut prompts = TerminalPrompts::new();
    let mut cleanup = CleanupRegistry::new();

    let report = batch::run_batch(&engine, &mut prompts, &mut requests, &cancel, &mut cleanup);

    batch::print_report(&report);

    if !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_args(cli: &Cli) -> anyhow::Result<()> {
    if !cli.output.is_dir() {
        anyhow::bail!(
            "Output directory does not exist: {}",
            cli.output.display()
        );
    }

    if cli.crf > CRF_MAX {
        anyhow::bail!("--crf must be between 0 and {}", CRF_MAX);
    }
    if cli.crf > CRF_RECOMMENDED_MAX {
        warn!(
            "CRF {} exceeds the recommended maximum of {}; expect visible quality loss",
            cli.crf, CRF_RECOMMENDED_MAX
        );
    }

    if let Some(res) = &cli.resolution {
        let token = res.trim_end_matches('p');
        let valid = token
            .parse::<u32>()
            .map(|h| RESOLUTION_LADDER.contains(&h))
            .unwrap_or(false);
        if !valid {
            let rungs: Vec<String> = RESOLUTION_LADDER.iter().map(|r| format!("{}p", r)).collect();
            anyhow::bail!(
                "Invalid resolution '{}'; choose one of: {}",
                res,
                rungs.join(", ")
            );
        }
    }

    if let Some(kbps) = cli.audio_bitrate {
        if kbps == 0 {
            anyhow::bail!("--audio-bitrate must be greater than zero");
        }
        if kbps > AUDIO_BITRATE_RECOMMENDED_MAX {
            warn!(
                "Audio bitrate {} kbps exceeds the recommended maximum of {} kbps",
                kbps, AUDIO_BITRATE_RECOMMENDED_MAX
            );
        }
    }

    if let Some(duration) = cli.trim_duration {
        if duration <= 0.0 {
            anyhow::bail!("--trim-duration must be positive");
        }
    }
    if let Some(start) = cli.trim_start {
        if start < 0.0 {
            anyhow::bail!("--trim-start cannot be negative");
        }
    }

    if let Some(threads) = cli.threads {
        if threads == 0 {
            anyhow::bail!("--threads must be at least 1");
        }
    }

    Ok(())
}
