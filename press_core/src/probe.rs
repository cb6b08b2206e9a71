//! FFprobe wrapper.
//!
//! Probes an input into a [`MediaStreamSet`]: at most one video and one audio
//! stream description. A set is re-derived fresh for every encode attempt;
//! nothing here is reused or mutated across retries.

use serde::Deserialize;
use std::path::Path;
use std::process::Command;

use crate::errors::{PressError, Result};

#[derive(Debug, Clone)]
pub struct VideoStream {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

#[derive(Debug, Clone)]
pub struct AudioStream {
    pub codec: String,
    pub bit_rate: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MediaStreamSet {
    pub video: Option<VideoStream>,
    pub audio: Option<AudioStream>,
    /// Container duration in seconds, used only as a progress hint.
    pub duration_secs: Option<f64>,
}

impl MediaStreamSet {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

pub fn probe(path: &Path) -> Result<MediaStreamSet> {
    if !path.is_file() {
        return Err(PressError::Probe(format!(
            "Not a file: {}",
            path.display()
        )));
    }

    let path_str = path.to_str().ok_or_else(|| {
        PressError::Probe(format!("Invalid path encoding: {}", path.display()))
    })?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "--",
            path_str,
        ])
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PressError::Probe(format!(
            "ffprobe error for '{}': {}",
            path.display(),
            stderr.trim()
        )));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    /// ffprobe reports bitrates as decimal strings.
    #[serde(default)]
    bit_rate: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

/// Parse ffprobe's `-print_format json` output. Split out of [`probe`] so the
/// JSON handling is testable without an ffprobe binary.
pub fn parse_probe_output(json_str: &str) -> Result<MediaStreamSet> {
    let parsed: FfprobeOutput = serde_json::from_str(json_str)
        .map_err(|e| PressError::Probe(format!("Unparseable ffprobe output: {}", e)))?;

    let duration_secs = parsed
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| *d > 0.0);

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .map(|s| VideoStream {
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            frame_rate: parse_frame_rate(s.r_frame_rate.as_deref().unwrap_or("0/1")),
        });

    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| AudioStream {
            codec: s.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
            bit_rate: s.bit_rate.as_deref().and_then(|b| b.parse::<u64>().ok()),
        });

    Ok(MediaStreamSet {
        video,
        audio,
        duration_secs,
    })
}

const FALLBACK_FRAME_RATE: f64 = 24.0;

/// FFprobe reports frame rates as rationals ("30000/1001"). Bad or missing
/// values fall back to 24 fps rather than failing the probe.
pub fn parse_frame_rate(s: &str) -> f64 {
    if s.contains('/') {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() == 2 {
            let num = parts[0].parse::<f64>().unwrap_or(0.0);
            let den = parts[1].parse::<f64>().unwrap_or(0.0);
            if den > 0.0 {
                let rate = num / den;
                if rate > 0.0 {
                    return rate;
                }
            }
        }
        return FALLBACK_FRAME_RATE;
    }

    match s.parse::<f64>() {
        Ok(v) if v > 0.0 => v,
        _ => FALLBACK_FRAME_RATE,
    }
}
