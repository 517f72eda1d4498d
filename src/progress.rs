//! Progress mirror: a local copy of the server's per-step completion record.
//!
//! The server owns this record; the mirror is replaced or patched only from
//! confirmed server responses, never from locally-guessed transitions.

use serde::{Deserialize, Serialize};

use crate::error::SequencerError;

/// The four onboarding steps.
///
/// Wire numbering is 1-based: PdfUpload = 1 … SalaryAvailability = 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    PdfUpload,
    ProfileInfo,
    WorkPreferences,
    SalaryAvailability,
}

impl OnboardingStep {
    pub const ALL: [OnboardingStep; 4] = [
        Self::PdfUpload,
        Self::ProfileInfo,
        Self::WorkPreferences,
        Self::SalaryAvailability,
    ];

    /// 1-based wire number for this step.
    pub fn number(&self) -> u8 {
        match self {
            Self::PdfUpload => 1,
            Self::ProfileInfo => 2,
            Self::WorkPreferences => 3,
            Self::SalaryAvailability => 4,
        }
    }

    /// Parse a 1-based wire number.
    pub fn from_number(n: u8) -> Result<Self, SequencerError> {
        match n {
            1 => Ok(Self::PdfUpload),
            2 => Ok(Self::ProfileInfo),
            3 => Ok(Self::WorkPreferences),
            4 => Ok(Self::SalaryAvailability),
            other => Err(SequencerError::InvalidStep(other)),
        }
    }

    /// Steps strictly before this one, in order.
    pub fn prior(&self) -> impl Iterator<Item = OnboardingStep> {
        let n = self.number();
        Self::ALL.into_iter().filter(move |s| s.number() < n)
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::SalaryAvailability)
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PdfUpload => "pdf_upload",
            Self::ProfileInfo => "profile_info",
            Self::WorkPreferences => "work_preferences",
            Self::SalaryAvailability => "salary_availability",
        };
        write!(f, "{s}")
    }
}

/// Completion status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl StepStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Mirror of the server's onboarding progress record.
///
/// Field names match the wire format of the progress query endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProgress {
    #[serde(default)]
    pub step_1_pdf_upload: StepStatus,
    #[serde(default)]
    pub step_2_profile_info: StepStatus,
    #[serde(default)]
    pub step_3_work_preferences: StepStatus,
    #[serde(default)]
    pub step_4_salary_availability: StepStatus,
    /// Server-authoritative current step, 1..=4.
    pub current_step: u8,
    #[serde(default)]
    pub completed: bool,
}

impl Default for OnboardingProgress {
    fn default() -> Self {
        Self {
            step_1_pdf_upload: StepStatus::NotStarted,
            step_2_profile_info: StepStatus::NotStarted,
            step_3_work_preferences: StepStatus::NotStarted,
            step_4_salary_availability: StepStatus::NotStarted,
            current_step: 1,
            completed: false,
        }
    }
}

impl OnboardingProgress {
    pub fn status_of(&self, step: OnboardingStep) -> StepStatus {
        match step {
            OnboardingStep::PdfUpload => self.step_1_pdf_upload,
            OnboardingStep::ProfileInfo => self.step_2_profile_info,
            OnboardingStep::WorkPreferences => self.step_3_work_preferences,
            OnboardingStep::SalaryAvailability => self.step_4_salary_availability,
        }
    }

    pub fn set_status(&mut self, step: OnboardingStep, status: StepStatus) {
        match step {
            OnboardingStep::PdfUpload => self.step_1_pdf_upload = status,
            OnboardingStep::ProfileInfo => self.step_2_profile_info = status,
            OnboardingStep::WorkPreferences => self.step_3_work_preferences = status,
            OnboardingStep::SalaryAvailability => self.step_4_salary_availability = status,
        }
    }

    pub fn all_completed(&self) -> bool {
        OnboardingStep::ALL
            .iter()
            .all(|s| self.status_of(*s).is_completed())
    }

    /// Invariant from the server contract: `completed` implies every step
    /// status is `Completed`.
    pub fn is_consistent(&self) -> bool {
        !self.completed || self.all_completed()
    }
}
