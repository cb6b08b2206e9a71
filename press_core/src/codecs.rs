//! Codec alias resolution and per-codec characteristics.
//!
//! User-supplied codec tokens are matched exactly (case-sensitive) against a
//! fixed alias table; the first alias set containing the token wins. Anything
//! else falls back to H.264 and the caller is expected to warn.

/// CRF domain shared by every supported encoder.
pub const CRF_MIN: u32 = 0;
pub const CRF_MAX: u32 = 63;
pub const CRF_DEFAULT: u32 = 29;

/// CRF values above this encode fine but rarely look acceptable.
pub const CRF_RECOMMENDED_MAX: u32 = 51;

/// Audio bitrates above this (kbit/s) buy nothing for lossy sources.
pub const AUDIO_BITRATE_RECOMMENDED_MAX: u32 = 320;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Hevc,
    Vp8,
    Vp9,
    Av1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFamily {
    Mp4,
    Webm,
}

/// Declaration order is the tie-break order: the first alias set containing
/// the exact token wins.
const ALIAS_TABLE: &[(&[&str], VideoCodec)] = &[
    (&["h264", "libx264"], VideoCodec::H264),
    (&["h265", "libx265", "hevc"], VideoCodec::Hevc),
    (&["vp8", "libvpx"], VideoCodec::Vp8),
    (&["vp9", "libvpx-vp9"], VideoCodec::Vp9),
    (&["av1", "libaom-av1"], VideoCodec::Av1),
];

pub const DEFAULT_CODEC: VideoCodec = VideoCodec::H264;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCodec {
    pub codec: VideoCodec,
    /// False when the token was absent or matched no alias set and the
    /// default was substituted.
    pub matched: bool,
}

pub fn resolve(token: Option<&str>) -> ResolvedCodec {
    let Some(token) = token else {
        return ResolvedCodec {
            codec: DEFAULT_CODEC,
            matched: false,
        };
    };

    for (aliases, codec) in ALIAS_TABLE {
        if aliases.contains(&token) {
            return ResolvedCodec {
                codec: *codec,
                matched: true,
            };
        }
    }

    ResolvedCodec {
        codec: DEFAULT_CODEC,
        matched: false,
    }
}

impl VideoCodec {
    /// FFmpeg encoder name passed to `-c:v`.
    pub fn encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::Hevc => "libx265",
            VideoCodec::Vp8 => "libvpx",
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Av1 => "libaom-av1",
        }
    }

    pub fn container(&self) -> Option<ContainerFamily> {
        match self {
            VideoCodec::H264 | VideoCodec::Hevc => Some(ContainerFamily::Mp4),
            VideoCodec::Vp8 | VideoCodec::Vp9 | VideoCodec::Av1 => Some(ContainerFamily::Webm),
        }
    }

    /// VP8/VP9/AV1 pair with Opus; the mp4 family pairs with AAC.
    pub fn is_open_family(&self) -> bool {
        matches!(self, VideoCodec::Vp8 | VideoCodec::Vp9 | VideoCodec::Av1)
    }

    pub fn audio_encoder(&self) -> &'static str {
        if self.is_open_family() {
            "libopus"
        } else {
            "aac"
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H.264/AVC",
            VideoCodec::Hevc => "H.265/HEVC",
            VideoCodec::Vp8 => "VP8",
            VideoCodec::Vp9 => "VP9",
            VideoCodec::Av1 => "AV1",
        }
    }
}

impl ContainerFamily {
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFamily::Mp4 => "mp4",
            ContainerFamily::Webm => "webm",
        }
    }
}
