//! Conversion pipeline.
//!
//! Drives one file through probe -> configure -> execute -> finalize ->
//! evaluate-size, looping back through the retry advisor while the output
//! keeps coming out larger than the source and the user keeps accepting
//! stronger settings. Codec and output path are fixed once per request;
//! stream descriptions and parameter snapshots are rebuilt on every attempt.

use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::codecs;
use crate::engine::MediaEngine;
use crate::errors::Result;
use crate::params;
use crate::paths;
use crate::retry::{self, DecisionProvider};
use crate::ui;

#[derive(Debug, Clone, Copy)]
pub struct TrimWindow {
    pub start_secs: f64,
    pub duration_secs: f64,
}

/// One file's conversion settings. `resolution` and `crf` may be rewritten by
/// the retry advisor; everything else is fixed for the request's lifetime.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub crf: u32,
    pub resolution: Option<String>,
    pub codec: Option<String>,
    pub audio_bitrate_kbps: Option<u32>,
    pub random_filename: bool,
    pub multithread: bool,
    pub threads: Option<usize>,
    pub trim: Option<TrimWindow>,
    pub source_timestamp: Option<SystemTime>,
}

impl ConversionRequest {
    pub fn new(input: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            input,
            output_dir,
            crf: codecs::CRF_DEFAULT,
            resolution: None,
            codec: None,
            audio_bitrate_kbps: None,
            random_filename: false,
            multithread: false,
            threads: None,
            trim: None,
            source_timestamp: None,
        }
    }

    pub fn effective_threads(&self) -> usize {
        match self.threads {
            Some(n) if n > 0 => n,
            _ if self.multithread => num_cpus::get(),
            _ => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub output: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl ConversionOutcome {
    /// Positive when the output shrank.
    pub fn saved_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_size as f64 / self.original_size as f64) * 100.0
    }

    pub fn is_oversized(&self) -> bool {
        self.compressed_size > self.original_size
    }
}

pub fn convert(
    engine: &dyn MediaEngine,
    decisions: &mut dyn DecisionProvider,
    request: &mut ConversionRequest,
) -> Result<ConversionOutcome> {
    let resolved = codecs::resolve(request.codec.as_deref());
    if let Some(token) = &request.codec {
        if !resolved.matched {
            warn!(
                "Unknown codec '{}'; encoding with {} instead",
                token,
                resolved.codec.as_str()
            );
        }
    }

    let compress = paths::compress_path(&request.input, resolved.codec.container());
    let output = paths::final_output_path(&request.output_dir, &compress, request.random_filename)?;
    let original_size = fs::metadata(&request.input)?.len();

    info!(
        "🎬 {} -> {} ({})",
        request.input.display(),
        output.display(),
        resolved.codec.as_str()
    );

    loop {
        // A stream description, once turned into a plan, is stale; re-probe
        // on every attempt.
        let streams = engine.probe(&request.input)?;
        let plan = params::build_plan(request, &streams, resolved.codec, &output)?;

        let bar = encode_progress_bar(&request.input);
        let executed = engine.execute(&plan, &mut |fraction| {
            bar.set_position((fraction * 100.0).round() as u64);
        });
        bar.finish_and_clear();

        if let Err(e) = executed {
            error!(command = %engine.command_line(&plan), "Engine execution failed: {}", e);
            return Err(e);
        }

        finalize_timestamps(request, &output);

        let compressed_size = fs::metadata(&output)?.len();
        let outcome = ConversionOutcome {
            output: output.clone(),
            original_size,
            compressed_size,
        };

        info!(
            "   {} -> {} ({})",
            ui::format_size(original_size),
            ui::format_size(compressed_size),
            ui::format_size_change(original_size, compressed_size)
        );

        if !outcome.is_oversized() {
            return Ok(outcome);
        }

        warn!(
            "Compressed file ({}) is larger than the source ({})",
            ui::format_size(compressed_size),
            ui::format_size(original_size)
        );

        let decision = retry::advise(request, &streams, decisions)?;
        if !decision.should_retry() {
            return Ok(outcome);
        }

        if let Err(e) = fs::remove_file(&output) {
            warn!("Failed to remove oversized output: {}", e);
        }
        info!(
            "🔁 Retrying with crf={} resolution={}",
            request.crf,
            request.resolution.as_deref().unwrap_or("source")
        );
    }
}

/// Best-effort: carry the source timestamp onto the output. Failure is a
/// warning, never fatal.
fn finalize_timestamps(request: &ConversionRequest, output: &std::path::Path) {
    let Some(ts) = request.source_timestamp else {
        return;
    };
    let ft = filetime::FileTime::from_system_time(ts);
    if let Err(e) = filetime::set_file_times(output, ft, ft) {
        warn!("Failed to set output timestamps: {}", e);
    }
}

fn encode_progress_bar(input: &std::path::Path) -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{bar:40.cyan/blue}] {pos}%")
            .expect("Invalid progress bar template")
            .progress_chars("=>-"),
    );
    bar.set_prefix(
        input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecutionPlan;
    use crate::errors::PressError;
    use crate::probe::{AudioStream, MediaStreamSet, VideoStream};
    use crate::retry::testing::ScriptedDecisions;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::Path;

    /// Scripted engine: fixed probe result, scripted per-attempt output sizes.
    struct MockEngine {
        streams: MediaStreamSet,
        output_sizes: RefCell<VecDeque<u64>>,
        plans: RefCell<Vec<ExecutionPlan>>,
        fail_execute: bool,
    }

    impl MockEngine {
        fn new(streams: MediaStreamSet, output_sizes: &[u64]) -> Self {
            Self {
                streams,
                output_sizes: RefCell::new(output_sizes.iter().copied().collect()),
                plans: RefCell::new(Vec::new()),
                fail_execute: false,
            }
        }

        fn executions(&self) -> usize {
            self.plans.borrow().len()
        }

        fn crf_of_attempt(&self, idx: usize) -> String {
            let plans = self.plans.borrow();
            let args = &plans[idx].args;
            let pos = args.iter().position(|a| a == "-crf").unwrap();
            args[pos + 1].clone()
        }
    }

    impl MediaEngine for MockEngine {
        fn probe(&self, _path: &Path) -> crate::errors::Result<MediaStreamSet> {
            Ok(self.streams.clone())
        }

        fn execute(
            &self,
            plan: &ExecutionPlan,
            on_progress: &mut dyn FnMut(f64),
        ) -> crate::errors::Result<()> {
            self.plans.borrow_mut().push(plan.clone());
            if self.fail_execute {
                return Err(PressError::Execution("scripted failure".into()));
            }
            let size = self
                .output_sizes
                .borrow_mut()
                .pop_front()
                .expect("unexpected execute");
            std::fs::write(&plan.output, vec![0u8; size as usize]).unwrap();
            on_progress(0.5);
            on_progress(1.0);
            Ok(())
        }

        fn command_line(&self, plan: &ExecutionPlan) -> String {
            format!("ffmpeg {}", plan.args.join(" "))
        }
    }

    fn streams_1080p() -> MediaStreamSet {
        MediaStreamSet {
            video: Some(VideoStream {
                width: 1920,
                height: 1080,
                frame_rate: 30.0,
            }),
            audio: Some(AudioStream {
                codec: "aac".into(),
                bit_rate: Some(128_000),
            }),
            duration_secs: Some(30.0),
        }
    }

    fn setup(input_bytes: usize) -> (tempfile::TempDir, ConversionRequest) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mkv");
        std::fs::write(&input, vec![1u8; input_bytes]).unwrap();
        let out_dir = dir.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();
        let req = ConversionRequest::new(input, out_dir);
        (dir, req)
    }

    #[test]
    fn test_successful_720p_h264_conversion() {
        let (_dir, mut req) = setup(1000);
        req.resolution = Some("720p".into());

        let engine = MockEngine::new(streams_1080p(), &[400]);
        let mut decisions = ScriptedDecisions::new(&[], &[], &[]);

        let outcome = convert(&engine, &mut decisions, &mut req).unwrap();

        assert_eq!(outcome.original_size, 1000);
        assert_eq!(outcome.compressed_size, 400);
        assert!((outcome.saved_percent() - 60.0).abs() < 0.01);
        assert!(outcome.output.exists());
        assert_eq!(
            outcome.output.extension().and_then(|e| e.to_str()),
            Some("mp4")
        );

        // Default CRF 29, scaled to even aspect-preserving 1280x720.
        assert_eq!(engine.crf_of_attempt(0), "29");
        let plans = engine.plans.borrow();
        assert!(plans[0].args.iter().any(|a| a == "scale=1280:720"));
    }

    #[test]
    fn test_oversized_declined_retry_keeps_file() {
        let (_dir, mut req) = setup(1000);
        let engine = MockEngine::new(streams_1080p(), &[2000]);
        let mut decisions = ScriptedDecisions::new(&[false], &[], &[]);

        let outcome = convert(&engine, &mut decisions, &mut req).unwrap();

        assert!(outcome.is_oversized());
        assert_eq!(outcome.compressed_size, 2000);
        assert!(outcome.output.exists());
        assert_eq!(engine.executions(), 1);
    }

    #[test]
    fn test_oversized_retry_with_higher_crf() {
        let (_dir, mut req) = setup(1000);
        let engine = MockEngine::new(streams_1080p(), &[2000, 600]);
        // retry yes, resolution no, crf yes -> 40
        let mut decisions = ScriptedDecisions::new(&[true, false, true], &[], &[40]);

        let outcome = convert(&engine, &mut decisions, &mut req).unwrap();

        assert_eq!(engine.executions(), 2);
        assert_eq!(engine.crf_of_attempt(0), "29");
        assert_eq!(engine.crf_of_attempt(1), "40");
        assert_eq!(outcome.compressed_size, 600);
        assert_eq!(req.crf, 40);
    }

    #[test]
    fn test_oversized_retry_with_lower_resolution() {
        let (_dir, mut req) = setup(1000);
        let engine = MockEngine::new(streams_1080p(), &[2000, 700]);
        let mut decisions = ScriptedDecisions::new(&[true, true, false], &[Some(480)], &[]);

        let outcome = convert(&engine, &mut decisions, &mut req).unwrap();

        assert_eq!(engine.executions(), 2);
        let plans = engine.plans.borrow();
        assert!(!plans[0].args.iter().any(|a| a.starts_with("scale=")));
        assert!(plans[1].args.iter().any(|a| a == "scale=852:480"));
        assert_eq!(outcome.compressed_size, 700);
    }

    #[test]
    fn test_unmatched_codec_falls_back_to_mp4() {
        let (_dir, mut req) = setup(1000);
        req.codec = Some("VP9".into()); // wrong case: no match

        let engine = MockEngine::new(streams_1080p(), &[400]);
        let mut decisions = ScriptedDecisions::new(&[], &[], &[]);

        let outcome = convert(&engine, &mut decisions, &mut req).unwrap();
        assert_eq!(
            outcome.output.extension().and_then(|e| e.to_str()),
            Some("mp4")
        );
    }

    #[test]
    fn test_matched_vp9_goes_to_webm() {
        let (_dir, mut req) = setup(1000);
        req.codec = Some("vp9".into());

        let engine = MockEngine::new(streams_1080p(), &[400]);
        let mut decisions = ScriptedDecisions::new(&[], &[], &[]);

        let outcome = convert(&engine, &mut decisions, &mut req).unwrap();
        assert_eq!(
            outcome.output.extension().and_then(|e| e.to_str()),
            Some("webm")
        );
    }

    #[test]
    fn test_execution_failure_is_fatal_for_file() {
        let (_dir, mut req) = setup(1000);
        let mut engine = MockEngine::new(streams_1080p(), &[400]);
        engine.fail_execute = true;
        let mut decisions = ScriptedDecisions::new(&[], &[], &[]);

        let err = convert(&engine, &mut decisions, &mut req).unwrap_err();
        assert!(matches!(err, PressError::Execution(_)));
        assert_eq!(engine.executions(), 1);
    }

    #[test]
    fn test_no_stream_is_configuration_error() {
        let (_dir, mut req) = setup(1000);
        let engine = MockEngine::new(
            MediaStreamSet {
                video: None,
                audio: None,
                duration_secs: None,
            },
            &[],
        );
        let mut decisions = ScriptedDecisions::new(&[], &[], &[]);

        let err = convert(&engine, &mut decisions, &mut req).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(engine.executions(), 0);
    }

    #[test]
    fn test_source_timestamp_applied() {
        let (_dir, mut req) = setup(1000);
        let ts = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_600_000_000);
        req.source_timestamp = Some(ts);

        let engine = MockEngine::new(streams_1080p(), &[400]);
        let mut decisions = ScriptedDecisions::new(&[], &[], &[]);

        let outcome = convert(&engine, &mut decisions, &mut req).unwrap();
        let mtime = std::fs::metadata(&outcome.output)
            .unwrap()
            .modified()
            .unwrap();
        let delta = mtime
            .duration_since(ts)
            .unwrap_or_else(|e| e.duration())
            .as_secs();
        assert!(delta < 2, "mtime not applied (off by {}s)", delta);
    }

    #[test]
    fn test_retry_deletes_oversized_output_first() {
        let (_dir, mut req) = setup(1000);
        req.random_filename = false;

        // Second attempt writes a fresh, smaller file at the same path.
        let engine = MockEngine::new(streams_1080p(), &[2000, 100]);
        let mut decisions = ScriptedDecisions::new(&[true, false, true], &[], &[45]);

        let outcome = convert(&engine, &mut decisions, &mut req).unwrap();
        assert_eq!(std::fs::metadata(&outcome.output).unwrap().len(), 100);
    }
}
