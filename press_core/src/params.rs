//! Per-attempt encode parameter construction.
//!
//! Each attempt builds an immutable [`ExecutionPlan`] from a freshly probed,
//! read-only stream description and the (possibly retry-mutated) request.
//! Nothing built here is reused across attempts.

use std::path::Path;

use crate::codecs::{ContainerFamily, VideoCodec};
use crate::engine::ExecutionPlan;
use crate::errors::{PressError, Result};
use crate::orchestrate::ConversionRequest;
use crate::probe::MediaStreamSet;

/// libaom `-cpu-used` tiers chosen by source framerate.
pub const AV1_SPEED_SLOW: &str = "2";
pub const AV1_SPEED_MIDDLE: &str = "4";
pub const AV1_SPEED_FAST: &str = "8";

/// Scale to the target height, preserving aspect ratio and forcing both
/// dimensions even (4:2:0 chroma subsampling requires it).
pub fn scaled_dimensions(src_width: u32, src_height: u32, target_height: u32) -> (u32, u32) {
    let aspect = src_width as f64 / src_height as f64;
    let mut width = (target_height as f64 * aspect).round() as u32;
    let mut height = target_height;
    width -= width % 2;
    height -= height % 2;
    (width, height)
}

/// Numeric prefix of a resolution label ("720p" → 720).
pub fn parse_target_height(label: &str) -> Option<u32> {
    let digits: String = label.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Framerate-tiered AV1 speed: slow below 24 fps, fastest above 60 fps,
/// middle otherwise.
pub fn av1_speed_for_framerate(frame_rate: f64) -> &'static str {
    if frame_rate < 24.0 {
        AV1_SPEED_SLOW
    } else if frame_rate > 60.0 {
        AV1_SPEED_FAST
    } else {
        AV1_SPEED_MIDDLE
    }
}

pub fn build_plan(
    request: &ConversionRequest,
    streams: &MediaStreamSet,
    codec: VideoCodec,
    output: &Path,
) -> Result<ExecutionPlan> {
    if streams.is_empty() {
        return Err(PressError::NoStream(request.input.clone()));
    }

    let mut args: Vec<String> = Vec::new();

    // Trim applies before any filter or tuning parameter.
    if let Some(trim) = &request.trim {
        args.push("-ss".into());
        args.push(format!("{}", trim.start_secs));
        args.push("-t".into());
        args.push(format!("{}", trim.duration_secs));
    }

    args.push("-i".into());
    args.push(request.input.display().to_string());

    if let Some(video) = &streams.video {
        args.push("-c:v".into());
        args.push(codec.encoder().into());
        args.push("-crf".into());
        args.push(request.crf.to_string());

        if let Some(target_height) = request
            .resolution
            .as_deref()
            .and_then(parse_target_height)
        {
            let (w, h) = scaled_dimensions(video.width, video.height, target_height);
            args.push("-vf".into());
            args.push(format!("scale={}:{}", w, h));
        }

        match codec {
            VideoCodec::Vp9 => {
                args.extend(
                    ["-b:v", "0", "-row-mt", "1", "-deadline", "good", "-cpu-used", "2"]
                        .map(String::from),
                );
            }
            VideoCodec::Av1 => {
                args.extend(["-b:v", "0", "-row-mt", "1", "-tiles", "2x2"].map(String::from));
                args.push("-cpu-used".into());
                args.push(av1_speed_for_framerate(video.frame_rate).into());
                args.push("-pix_fmt".into());
                args.push("yuv420p10le".into());
            }
            VideoCodec::H264 | VideoCodec::Hevc | VideoCodec::Vp8 => {
                args.push("-threads".into());
                args.push(request.effective_threads().to_string());
            }
        }
    }

    if streams.audio.is_some() {
        args.push("-c:a".into());
        args.push(codec.audio_encoder().into());
        if let Some(kbps) = request.audio_bitrate_kbps {
            args.push("-b:a".into());
            args.push((u64::from(kbps) * 1000).to_string());
        }
    } else {
        args.push("-an".into());
    }

    if wants_faststart(output, codec) {
        args.push("-movflags".into());
        args.push("+faststart".into());
    }

    args.push(output.display().to_string());

    Ok(ExecutionPlan {
        input: request.input.clone(),
        output: output.to_path_buf(),
        args,
        duration_hint: request
            .trim
            .as_ref()
            .map(|t| t.duration_secs)
            .or(streams.duration_secs),
    })
}

/// Web-playback containers get progressive metadata up front.
fn wants_faststart(output: &Path, codec: VideoCodec) -> bool {
    let ext_is_web = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mp4") || e.eq_ignore_ascii_case("mov"))
        .unwrap_or(false);

    ext_is_web || codec.container() == Some(ContainerFamily::Mp4)
}
