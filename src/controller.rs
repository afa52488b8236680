//! Generation cycle state machine.
//!
//! `Idle -> Generating -> Idle`, forever. The controller owns no widgets; the
//! window feeds it the prompt text and the engine result and applies the
//! returned [`CycleOutcome`] to its grid.

use rand::Rng;
use tracing::{error, info, warn};

use crate::config::GenerationSettings;
use crate::models::{AppendOutcome, GeneratedImage, GenerationRequest, ImageSink};
use crate::pipeline::worker::GenerationOutcome;
use crate::pipeline::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Generating { id: u64 },
}

/// What a trigger activation turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Submit this request and report back with [`GenerationController::complete`].
    Start(GenerationRequest),
    /// A generation is already in flight; the activation is ignored.
    Busy,
}

/// Result of one finished cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed {
        images: Vec<GeneratedImage>,
        /// Absent engine entries that were removed before display.
        dropped: usize,
    },
    Failed {
        message: String,
    },
    Cancelled,
    /// The result belonged to a request that is no longer in flight.
    Stale,
}

impl CycleOutcome {
    /// Update `sink` for this outcome. Only a completed cycle touches the
    /// grid: it is cleared and refilled with every image in result order.
    /// Failures leave the previous contents on screen.
    pub fn apply<S: ImageSink + ?Sized>(self, sink: &mut S) -> Option<AppendOutcome> {
        match self {
            CycleOutcome::Completed { images, .. } => {
                sink.clear();
                Some(sink.append(images))
            }
            _ => None,
        }
    }
}

pub struct GenerationController {
    settings: GenerationSettings,
    state: ControllerState,
    next_id: u64,
    /// Absent entries of the last completed cycle.
    filtered: usize,
    status: String,
}

impl GenerationController {
    pub fn new(settings: GenerationSettings) -> Self {
        Self {
            settings,
            state: ControllerState::Idle,
            next_id: 1,
            filtered: 0,
            status: "> Ready".to_string(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    #[cfg(test)]
    pub fn is_generating(&self) -> bool {
        matches!(self.state, ControllerState::Generating { .. })
    }

    /// Id of the request in flight, if any.
    pub fn in_flight(&self) -> Option<u64> {
        match self.state {
            ControllerState::Generating { id } => Some(id),
            ControllerState::Idle => None,
        }
    }

    /// Status line for the window.
    pub fn status_text(&self) -> &str {
        &self.status
    }

    /// Handle a trigger activation with the current prompt text.
    pub fn trigger<R: Rng + ?Sized>(&mut self, prompt: &str, rng: &mut R) -> (u64, TriggerDecision) {
        if let ControllerState::Generating { id } = self.state {
            warn!(id, "Generation already running, ignoring trigger");
            return (id, TriggerDecision::Busy);
        }

        let id = self.next_id;
        self.next_id += 1;
        let request = GenerationRequest::new(prompt, &self.settings, rng);
        info!(
            id,
            seed = request.seed,
            prompt_len = request.prompt.len(),
            "Starting generation"
        );
        self.state = ControllerState::Generating { id };
        self.status = format!("> Generating (seed {})...", request.seed);
        (id, TriggerDecision::Start(request))
    }

    /// Finish the cycle `id` with the engine's answer.
    pub fn complete(&mut self, id: u64, outcome: GenerationOutcome) -> CycleOutcome {
        if self.in_flight() != Some(id) {
            warn!(id, in_flight = ?self.in_flight(), "Ignoring stale generation result");
            return CycleOutcome::Stale;
        }
        self.state = ControllerState::Idle;

        match outcome {
            Ok(result) => {
                let (images, dropped) = result.into_present();
                info!(id, produced = images.len(), dropped, "Generation finished");
                self.filtered = dropped;
                self.status = completed_status(images.len(), dropped, 0);
                CycleOutcome::Completed { images, dropped }
            }
            Err(PipelineError::Cancelled) => {
                info!(id, "Generation cancelled");
                self.status = "> Cancelled".to_string();
                CycleOutcome::Cancelled
            }
            Err(err) => {
                error!(id, error = ?err, "Generation failed");
                let message = err.to_string();
                self.status = format!("> Error: {message}");
                CycleOutcome::Failed { message }
            }
        }
    }

    /// Rewrite the status line with what the grid actually shows after a
    /// completed cycle was applied. Images past capacity are reported apart
    /// from filtered ones.
    pub fn record_placement(&mut self, placement: AppendOutcome) {
        self.status = completed_status(placement.placed, self.filtered, placement.dropped);
    }
}

fn completed_status(shown: usize, filtered: usize, overflow: usize) -> String {
    match (filtered, overflow) {
        (0, 0) => format!("> {shown} image(s)"),
        (filtered, 0) => format!("> {shown} image(s) ({filtered} filtered)"),
        (0, overflow) => format!("> {shown} image(s) ({overflow} over capacity)"),
        (filtered, overflow) => {
            format!("> {shown} image(s) ({filtered} filtered, {overflow} over capacity)")
        }
    }
}
