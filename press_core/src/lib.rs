//! Core library for vid_press: size-driven video compression on top of
//! ffmpeg/ffprobe.
//!
//! The pipeline lives in [`orchestrate::convert`]: probe the source, build an
//! encode plan, run ffmpeg, then compare sizes and, if the output grew,
//! negotiate stronger settings with the user and try again. [`batch`] runs
//! that pipeline over many files with per-file failure isolation.

pub mod batch;
pub mod codecs;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod orchestrate;
pub mod params;
pub mod paths;
pub mod probe;
pub mod retry;
pub mod ui;

pub use batch::{run_batch, BatchReport, CleanupRegistry};
pub use codecs::{ResolvedCodec, VideoCodec, CRF_DEFAULT, CRF_MAX, CRF_MIN};
pub use engine::{CancelFlag, ExecutionPlan, FfmpegEngine, MediaEngine};
pub use errors::{PressError, Result};
pub use orchestrate::{convert, ConversionOutcome, ConversionRequest, TrimWindow};
pub use probe::MediaStreamSet;
pub use retry::{DecisionProvider, TerminalPrompts, RESOLUTION_LADDER};
