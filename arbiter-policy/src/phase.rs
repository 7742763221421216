//! Per-call state machine of a resolution.

use tracing::debug;

use crate::resolver::{ResolveError, ResolveResult};

/// Phases a single resolution passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPhase {
    /// Request accepted, nothing evaluated yet.
    Start,
    /// Conflicts are being detected.
    Detection,
    /// Context weights are being computed.
    Weighting,
    /// A strategy is being chosen.
    Selection,
    /// The chosen strategy is being applied.
    Application,
    /// The outcome is being recorded.
    Logging,
    /// Resolution completed normally.
    Done,
    /// Resolution degraded to the fallback decision.
    FallbackDone,
}

impl ResolutionPhase {
    /// Returns `true` once no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::FallbackDone)
    }
}

/// Tracks the current phase and rejects out-of-order transitions.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTracker {
    phase: ResolutionPhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    /// Creates a tracker in [`ResolutionPhase::Start`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: ResolutionPhase::Start,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> ResolutionPhase {
        self.phase
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidPhaseTransition`] when `next` does not
    /// follow the current phase.
    pub fn advance(&mut self, next: ResolutionPhase) -> ResolveResult<ResolutionPhase> {
        use ResolutionPhase::{Application, Detection, Done, Logging, Selection, Start, Weighting};

        let allowed = matches!(
            (self.phase, next),
            (Start, Detection)
                | (Detection, Weighting | Done)
                | (Weighting, Selection)
                | (Selection, Application)
                | (Application, Logging)
                | (Logging, Done)
        );
        if !allowed {
            return Err(ResolveError::InvalidPhaseTransition {
                from: self.phase,
                to: next,
            });
        }

        debug!(from = ?self.phase, to = ?next, "resolution phase transition");
        self.phase = next;
        Ok(next)
    }

    /// Jumps to [`ResolutionPhase::FallbackDone`] from any phase, returning
    /// the phase that failed.
    pub fn fail(&mut self) -> ResolutionPhase {
        let failed = self.phase;
        debug!(from = ?failed, "resolution falling back");
        self.phase = ResolutionPhase::FallbackDone;
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_pipeline_is_accepted() {
        let mut tracker = PhaseTracker::new();
        for next in [
            ResolutionPhase::Detection,
            ResolutionPhase::Weighting,
            ResolutionPhase::Selection,
            ResolutionPhase::Application,
            ResolutionPhase::Logging,
            ResolutionPhase::Done,
        ] {
            tracker.advance(next).unwrap();
        }
        assert!(tracker.phase().is_terminal());
    }

    #[test]
    fn detection_may_finish_early() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(ResolutionPhase::Detection).unwrap();
        assert_eq!(
            tracker.advance(ResolutionPhase::Done).unwrap(),
            ResolutionPhase::Done
        );
    }

    #[test]
    fn skipping_a_phase_is_rejected() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(ResolutionPhase::Detection).unwrap();
        let err = tracker.advance(ResolutionPhase::Application).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::InvalidPhaseTransition {
                from: ResolutionPhase::Detection,
                to: ResolutionPhase::Application,
            }
        ));
        assert_eq!(tracker.phase(), ResolutionPhase::Detection);
    }

    #[test]
    fn fail_reports_the_interrupted_phase() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(ResolutionPhase::Detection).unwrap();
        tracker.advance(ResolutionPhase::Weighting).unwrap();
        assert_eq!(tracker.fail(), ResolutionPhase::Weighting);
        assert_eq!(tracker.phase(), ResolutionPhase::FallbackDone);
        assert!(tracker.advance(ResolutionPhase::Done).is_err());
    }
}
