//! Size-based quality back-off.
//!
//! Consulted only when a finished encode came out larger than its source.
//! Every step is user-gated: retry at all, then optionally a lower ladder
//! rung, then optionally a higher CRF. Prompts sit behind
//! [`DecisionProvider`] so the branching is testable without a terminal.

use console::Term;
use tracing::{info, warn};

use crate::codecs::CRF_MAX;
use crate::errors::Result;
use crate::orchestrate::ConversionRequest;
use crate::probe::MediaStreamSet;

/// Supported output heights, ascending.
pub const RESOLUTION_LADDER: [u32; 8] = [144, 240, 360, 480, 720, 1080, 1440, 2160];

/// Index of the nearest rung at or below `max_dimension`, or `None` when the
/// source is smaller than the lowest rung.
pub fn nearest_rung_index(max_dimension: u32) -> Option<usize> {
    RESOLUTION_LADDER.iter().rposition(|r| *r <= max_dimension)
}

pub trait DecisionProvider {
    fn confirm(&mut self, prompt: &str) -> Result<bool>;

    /// Pick one of the offered rungs, or decline.
    fn choose_rung(&mut self, choices: &[u32]) -> Result<Option<u32>>;

    /// One CRF candidate; the advisor re-asks until the value qualifies.
    fn read_crf(&mut self) -> Result<u32>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryDecision {
    pub accepted: bool,
    pub resolution_changed: bool,
    pub crf_changed: bool,
}

impl RetryDecision {
    /// A retry only makes sense when something actually changed.
    pub fn should_retry(&self) -> bool {
        self.accepted && (self.resolution_changed || self.crf_changed)
    }
}

/// Walk the user through the back-off dialogue, mutating the request's
/// resolution and/or CRF. The caller deletes the oversized output and
/// re-enters the pipeline iff [`RetryDecision::should_retry`].
pub fn advise(
    request: &mut ConversionRequest,
    streams: &MediaStreamSet,
    provider: &mut dyn DecisionProvider,
) -> Result<RetryDecision> {
    let mut decision = RetryDecision::default();

    if !provider.confirm("Compressed file is larger than the source. Retry with stronger settings?")? {
        return Ok(decision);
    }
    decision.accepted = true;

    if provider.confirm("Lower the output resolution?")? {
        decision.resolution_changed = offer_lower_rung(request, streams, provider)?;
    }

    if provider.confirm("Raise the CRF (higher value = smaller, lower quality)?")? {
        loop {
            let candidate = provider.read_crf()?;
            if candidate <= request.crf {
                warn!(
                    "CRF must be greater than the current value ({}) to shrink the output",
                    request.crf
                );
                continue;
            }
            if candidate > CRF_MAX {
                warn!("CRF must be at most {}", CRF_MAX);
                continue;
            }
            info!("CRF {} -> {}", request.crf, candidate);
            request.crf = candidate;
            decision.crf_changed = true;
            break;
        }
    }

    if decision.accepted && !decision.should_retry() {
        info!("No settings changed; keeping the oversized output");
    }

    Ok(decision)
}

fn offer_lower_rung(
    request: &mut ConversionRequest,
    streams: &MediaStreamSet,
    provider: &mut dyn DecisionProvider,
) -> Result<bool> {
    let Some(video) = &streams.video else {
        warn!("No video stream; resolution cannot be lowered");
        return Ok(false);
    };

    let max_dimension = video.width.max(video.height);
    let current = match nearest_rung_index(max_dimension) {
        Some(0) | None => {
            info!(
                "Source ({}px) is already at or below the lowest rung; resolution cannot be lowered",
                max_dimension
            );
            return Ok(false);
        }
        Some(idx) => idx,
    };

    let choices = &RESOLUTION_LADDER[..current];
    match provider.choose_rung(choices)? {
        Some(rung) => {
            info!(
                "Resolution {} -> {}p",
                request.resolution.as_deref().unwrap_or("source"),
                rung
            );
            request.resolution = Some(format!("{}p", rung));
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Interactive provider reading from the terminal.
pub struct TerminalPrompts {
    term: Term,
}

impl TerminalPrompts {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl Default for TerminalPrompts {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionProvider for TerminalPrompts {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        loop {
            self.term.write_str(&format!("{} [y/N] ", prompt))?;
            let line = self.term.read_line()?;
            match line.trim().to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "" | "n" | "no" => return Ok(false),
                _ => continue,
            }
        }
    }

    fn choose_rung(&mut self, choices: &[u32]) -> Result<Option<u32>> {
        let menu: Vec<String> = choices.iter().map(|r| format!("{}p", r)).collect();
        self.term
            .write_line(&format!("Available resolutions: {}", menu.join(", ")))?;
        loop {
            self.term.write_str("Pick one (empty to skip): ")?;
            let line = self.term.read_line()?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let token = trimmed.trim_end_matches('p');
            if let Ok(rung) = token.parse::<u32>() {
                if choices.contains(&rung) {
                    return Ok(Some(rung));
                }
            }
            self.term.write_line("Not one of the offered rungs")?;
        }
    }

    fn read_crf(&mut self) -> Result<u32> {
        loop {
            self.term.write_str("New CRF: ")?;
            let line = self.term.read_line()?;
            if let Ok(value) = line.trim().parse::<u32>() {
                return Ok(value);
            }
            self.term.write_line("Enter a number")?;
        }
    }
}
