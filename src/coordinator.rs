//! Onboarding coordinator: ties the sequencer, form aggregator, remote
//! service client, and extraction notifier into one session.
//!
//! Step submissions are serialized: a per-step busy flag rejects the
//! double-click case up front, and a session-wide submission lock keeps
//! rapid back-then-forward navigation from putting two submissions in
//! flight at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::auth::UserId;
use crate::client::{OnboardingService, QaInfo};
use crate::config::CoordinatorConfig;
use crate::error::{ApiError, ChannelError, Error, Result, SequencerError};
use crate::forms::{OnboardingForm, StepPayload};
use crate::notifier::{ExtractionEvent, ExtractionNotifier, ReconnectPolicy};
use crate::progress::{OnboardingProgress, OnboardingStep};
use crate::sequencer::StepSequencer;

/// Result of a confirmed step submission.
#[derive(Debug, Clone)]
pub struct StepAdvance {
    /// The step that was submitted.
    pub step: OnboardingStep,
    /// Where the server moved the wizard, `None` when onboarding completed.
    pub next_step: Option<OnboardingStep>,
    pub completed: bool,
    pub qa_info: Option<QaInfo>,
}

impl StepAdvance {
    /// Whether the review modal should be shown before advancing.
    pub fn needs_review(&self) -> bool {
        self.qa_info.as_ref().is_some_and(QaInfo::needs_review)
    }
}

/// Result of a backward navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewindOutcome {
    /// True when the server confirmed the rewind and the mirror adopted it.
    /// False when the remote call failed: the view still moved back, but no
    /// mirror field reflects the unconfirmed transition.
    pub confirmed: bool,
}

/// How extraction completion was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSource {
    /// A `completion` push message arrived.
    Push,
    /// The push channel went quiet; the progress poll confirmed step 1.
    Poll,
}

/// Outcome of waiting for the resume extraction.
#[derive(Debug, Clone)]
pub struct ExtractionSummary {
    pub source: CompletionSource,
    /// Present only when completion arrived by push message.
    pub qa_info: Option<QaInfo>,
}

impl ExtractionSummary {
    pub fn needs_review(&self) -> bool {
        self.qa_info.as_ref().is_some_and(QaInfo::needs_review)
    }
}

/// One user's onboarding session.
pub struct OnboardingCoordinator {
    service: Arc<dyn OnboardingService>,
    user: UserId,
    config: CoordinatorConfig,
    sequencer: RwLock<StepSequencer>,
    form: RwLock<OnboardingForm>,
    /// Per-step busy flags, indexed by step number - 1.
    busy: [AtomicBool; 4],
    /// Serializes all step submissions within the session.
    submission_lock: Mutex<()>,
}

impl OnboardingCoordinator {
    pub fn new(
        service: Arc<dyn OnboardingService>,
        user: UserId,
        initial: OnboardingProgress,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            service,
            user,
            config,
            sequencer: RwLock::new(StepSequencer::new(initial)),
            form: RwLock::new(OnboardingForm::new()),
            busy: Default::default(),
            submission_lock: Mutex::new(()),
        }
    }

    /// Construct by fetching the current progress record first, so a user
    /// returning mid-wizard resumes where the server says they left off.
    pub async fn resume(
        service: Arc<dyn OnboardingService>,
        user: UserId,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        let initial = service.fetch_progress(user).await?;
        Ok(Self::new(service, user, initial, config))
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    /// Open the extraction push channel for this session.
    pub fn connect_notifier(&self) -> ExtractionNotifier {
        ExtractionNotifier::connect(
            &self.config.ws_base_url,
            self.user,
            ReconnectPolicy::from(&self.config),
        )
    }

    // ── Read accessors ──────────────────────────────────────────────

    pub async fn view_step(&self) -> OnboardingStep {
        self.sequencer.read().await.view_step()
    }

    pub async fn progress(&self) -> OnboardingProgress {
        self.sequencer.read().await.mirror().clone()
    }

    pub async fn is_step_accessible(&self, step: OnboardingStep) -> bool {
        self.sequencer.read().await.is_step_accessible(step)
    }

    pub async fn is_step_completed(&self, step: OnboardingStep) -> bool {
        self.sequencer.read().await.is_step_completed(step)
    }

    pub fn is_step_busy(&self, step: OnboardingStep) -> bool {
        self.busy[(step.number() - 1) as usize].load(Ordering::Acquire)
    }

    /// One-shot terminal redirect check.
    pub async fn take_redirect(&self) -> bool {
        self.sequencer.write().await.take_redirect()
    }

    // ── Form access ─────────────────────────────────────────────────

    /// Mutate the form aggregate (bind this to form controls).
    pub async fn update_form<F>(&self, f: F)
    where
        F: FnOnce(&mut OnboardingForm),
    {
        let mut form = self.form.write().await;
        f(&mut form);
    }

    pub async fn form_snapshot(&self) -> OnboardingForm {
        self.form.read().await.clone()
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Submit one step.
    ///
    /// Local validation runs before anything touches the network; a
    /// validation failure leaves the busy flag clear and the mirror
    /// untouched. On confirmed success the submitted step's form fields are
    /// cleared and the mirror adopts the server-returned next step.
    pub async fn submit_step(&self, step: OnboardingStep) -> Result<StepAdvance> {
        {
            let seq = self.sequencer.read().await;
            if seq.mirror().completed {
                return Err(SequencerError::AlreadyComplete.into());
            }
            if !seq.is_step_accessible(step) {
                return Err(SequencerError::StepNotAccessible {
                    step: step.number(),
                }
                .into());
            }
        }

        // Validation first: a missing or invalid file never reaches the
        // network and never flips the busy flag.
        let payload = {
            let form = self.form.read().await;
            for warning in form.advisory_warnings() {
                warn!(step = %step, "{warning}");
            }
            form.build_payload(step)?
        };

        let flag = &self.busy[(step.number() - 1) as usize];
        if flag.swap(true, Ordering::AcqRel) {
            return Err(ApiError::SubmissionInFlight {
                step: step.number(),
            }
            .into());
        }

        let result = self.submit_locked(step, payload).await;
        flag.store(false, Ordering::Release);
        result
    }

    async fn submit_locked(
        &self,
        step: OnboardingStep,
        payload: StepPayload,
    ) -> Result<StepAdvance> {
        let _guard = self.submission_lock.lock().await;

        if step.is_final() {
            self.sequencer.write().await.set_finalizing(true);
        }

        let outcome = self.service.submit_step(self.user, payload).await;

        let advance = match outcome {
            Ok(outcome) => {
                let applied = {
                    let mut seq = self.sequencer.write().await;
                    seq.apply_submission(step, &outcome)
                };
                match applied {
                    Ok(()) => {
                        self.form.write().await.clear_step(step);
                        let seq = self.sequencer.read().await;
                        let completed = seq.mirror().completed;
                        info!(
                            step = %step,
                            next = ?outcome.next_step,
                            completed,
                            "Step submission confirmed"
                        );
                        Ok(StepAdvance {
                            step,
                            next_step: if completed { None } else { Some(seq.view_step()) },
                            completed,
                            qa_info: outcome.qa_info,
                        })
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => {
                warn!(step = %step, error = %e, "Step submission failed");
                Err(Error::from(e))
            }
        };

        if step.is_final() {
            self.sequencer.write().await.set_finalizing(false);
        }
        advance
    }

    /// Navigate backward to `target` via the resume-from-step endpoint.
    ///
    /// On remote failure the displayed step still moves back (the UI shows
    /// the earlier step either way), but the mirror keeps the server's last
    /// confirmed state. The returned outcome says which happened.
    pub async fn go_back(&self, target: OnboardingStep) -> Result<RewindOutcome> {
        {
            let seq = self.sequencer.read().await;
            if !seq.is_step_accessible(target) {
                return Err(SequencerError::StepNotAccessible {
                    step: target.number(),
                }
                .into());
            }
        }

        match self.service.resume_from_step(self.user, target).await {
            Ok(progress) => {
                self.sequencer.write().await.apply_rewind(progress)?;
                debug!(target = %target, "Rewind confirmed by server");
                Ok(RewindOutcome { confirmed: true })
            }
            Err(e) => {
                warn!(target = %target, error = %e, "Rewind call failed; moving view only");
                self.sequencer.write().await.set_view_step(target)?;
                Ok(RewindOutcome { confirmed: false })
            }
        }
    }

    /// Mark onboarding complete without the remaining steps.
    pub async fn skip_to_profile(&self) -> Result<OnboardingProgress> {
        let progress = self.service.skip_to_profile(self.user).await?;
        let mut seq = self.sequencer.write().await;
        seq.apply_refetch(progress);
        Ok(seq.mirror().clone())
    }

    /// Refetch the authoritative progress record and replace the mirror.
    pub async fn refresh_progress(&self) -> Result<OnboardingProgress> {
        let progress = self.service.fetch_progress(self.user).await?;
        let mut seq = self.sequencer.write().await;
        seq.apply_refetch(progress);
        Ok(seq.mirror().clone())
    }

    /// Wait for the resume extraction to finish.
    ///
    /// Completion is confirmed by a push message when one arrives. If the
    /// channel drops or stays silent, the progress endpoint is polled until
    /// step 1 reads completed, never assumed from a blind timer. Progress
    /// events are logged and skipped; callers that render a progress bar
    /// consume the receiver themselves before handing it here.
    pub async fn await_extraction(
        &self,
        events: &mut mpsc::UnboundedReceiver<ExtractionEvent>,
    ) -> Result<ExtractionSummary> {
        let deadline = tokio::time::Instant::now() + self.config.extraction_deadline;
        let mut poll = tokio::time::interval(self.config.extraction_poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first interval tick fires immediately; consume it.
        poll.tick().await;
        let mut channel_open = true;

        loop {
            tokio::select! {
                event = events.recv(), if channel_open => match event {
                    Some(ExtractionEvent::Progress { progress, ref message, .. }) => {
                        debug!(progress, message = %message, "Extraction progress");
                    }
                    Some(ExtractionEvent::Completion { confidence_score, missing_sections }) => {
                        info!(confidence_score, "Extraction completion pushed");
                        return Ok(ExtractionSummary {
                            source: CompletionSource::Push,
                            qa_info: Some(QaInfo { confidence_score, missing_sections }),
                        });
                    }
                    None => {
                        warn!("Extraction channel closed; relying on progress polls");
                        channel_open = false;
                    }
                },
                _ = poll.tick() => {
                    match self.service.fetch_progress(self.user).await {
                        Ok(progress) => {
                            let done = progress
                                .status_of(OnboardingStep::PdfUpload)
                                .is_completed();
                            self.sequencer.write().await.apply_refetch(progress);
                            if done {
                                info!("Extraction completion confirmed by poll");
                                return Ok(ExtractionSummary {
                                    source: CompletionSource::Poll,
                                    qa_info: None,
                                });
                            }
                        }
                        Err(e) => warn!(error = %e, "Completion poll failed"),
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(ChannelError::CompletionTimeout {
                        deadline: self.config.extraction_deadline,
                    }
                    .into());
                }
            }
        }
    }
}
