//! Step sequencer: decides which step is displayed and navigable.
//!
//! Pure synchronous logic over the progress mirror. All mutations come from
//! confirmed server responses; the sequencer never computes a successor step
//! locally. An ambiguous server response (success without `next_step`) is a
//! retryable error, not a guess.

use crate::client::SubmitOutcome;
use crate::error::{ApiError, Error, SequencerError};
use crate::progress::{OnboardingProgress, OnboardingStep, StepStatus};

/// Sequencing state for one onboarding session.
#[derive(Debug, Clone)]
pub struct StepSequencer {
    mirror: OnboardingProgress,
    /// The step the UI currently displays. May sit behind the mirror's
    /// `current_step` after a backward navigation.
    view_step: OnboardingStep,
    /// Set while the final step's submission is in flight, to keep the
    /// terminal redirect from racing the completion transition.
    finalizing: bool,
    /// The terminal redirect fires at most once per session.
    redirect_emitted: bool,
}

impl StepSequencer {
    pub fn new(mirror: OnboardingProgress) -> Self {
        let view_step = OnboardingStep::from_number(mirror.current_step)
            .unwrap_or(OnboardingStep::PdfUpload);
        Self {
            mirror,
            view_step,
            finalizing: false,
            redirect_emitted: false,
        }
    }

    pub fn mirror(&self) -> &OnboardingProgress {
        &self.mirror
    }

    pub fn view_step(&self) -> OnboardingStep {
        self.view_step
    }

    /// A step is reachable iff it is step 1, every prior step is completed,
    /// or the server's `current_step` has already passed it.
    pub fn is_step_accessible(&self, step: OnboardingStep) -> bool {
        step == OnboardingStep::PdfUpload
            || step.prior().all(|s| self.mirror.status_of(s).is_completed())
            || step.number() <= self.mirror.current_step
    }

    pub fn is_step_completed(&self, step: OnboardingStep) -> bool {
        self.mirror.status_of(step).is_completed()
    }

    /// Apply a confirmed step submission.
    ///
    /// Marks the submitted step completed and adopts the server-returned
    /// `next_step` verbatim. A success response that carries neither
    /// `next_step` nor the completion flag is rejected as ambiguous.
    pub fn apply_submission(
        &mut self,
        step: OnboardingStep,
        outcome: &SubmitOutcome,
    ) -> Result<(), Error> {
        if !outcome.success {
            return Err(ApiError::InvalidResponse {
                endpoint: format!("step/{}", step.number()),
                reason: "success=false in a 2xx response".into(),
            }
            .into());
        }

        if outcome.onboarding_completed {
            // Server invariant: completed implies every step is completed.
            for s in OnboardingStep::ALL {
                self.mirror.set_status(s, StepStatus::Completed);
            }
            self.mirror.completed = true;
            return Ok(());
        }

        // Resolve the successor before mutating anything: an ambiguous
        // response must leave the mirror untouched so the caller can retry.
        let next = outcome
            .next_step
            .ok_or(ApiError::AmbiguousResponse {
                step: step.number(),
            })
            .map_err(Error::from)
            .and_then(|n| OnboardingStep::from_number(n).map_err(Error::from))?;

        self.mirror.set_status(step, StepStatus::Completed);
        self.mirror.current_step = next.number();
        self.view_step = next;
        Ok(())
    }

    /// Adopt the server-confirmed progress after a resume-from-step call.
    pub fn apply_rewind(&mut self, progress: OnboardingProgress) -> Result<(), Error> {
        let view = OnboardingStep::from_number(progress.current_step)?;
        self.mirror = progress;
        self.view_step = view;
        Ok(())
    }

    /// Move only the displayed step, leaving the mirror untouched.
    ///
    /// Used when a resume-from-step call fails: the UI still shows the
    /// earlier step, but no mirror field reflects an unconfirmed transition.
    pub fn set_view_step(&mut self, step: OnboardingStep) -> Result<(), Error> {
        if !self.is_step_accessible(step) {
            return Err(SequencerError::StepNotAccessible {
                step: step.number(),
            }
            .into());
        }
        self.view_step = step;
        Ok(())
    }

    /// Replace the mirror wholesale from the progress query endpoint.
    pub fn apply_refetch(&mut self, progress: OnboardingProgress) {
        self.mirror = progress;
        if !self.is_step_accessible(self.view_step) {
            self.view_step = OnboardingStep::from_number(self.mirror.current_step)
                .unwrap_or(OnboardingStep::PdfUpload);
        }
    }

    pub fn set_finalizing(&mut self, finalizing: bool) {
        self.finalizing = finalizing;
    }

    /// One-shot terminal redirect. Returns true exactly once after the
    /// mirror reports completion, and never while a finalization submission
    /// is still in flight.
    pub fn take_redirect(&mut self) -> bool {
        if self.mirror.completed && !self.finalizing && !self.redirect_emitted {
            self.redirect_emitted = true;
            return true;
        }
        false
    }
}

impl Default for StepSequencer {
    fn default() -> Self {
        Self::new(OnboardingProgress::default())
    }
}
