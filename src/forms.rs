//! Form data aggregator: accumulates user input across steps and builds
//! per-step submission payloads.
//!
//! File validation happens here, before any network call: an oversized or
//! wrong-type file short-circuits submission with a local error.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::progress::OnboardingStep;

/// Maximum resume document size: 10 MiB.
pub const RESUME_MAX_BYTES: u64 = 10 * 1024 * 1024;
/// Maximum profile photo size: 5 MiB.
pub const PHOTO_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// MIME types accepted for the resume document.
pub const RESUME_ALLOWED_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// MIME types accepted for the profile photo.
pub const PHOTO_ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s]+$").expect("valid url regex"));

/// An in-memory file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Load a file from disk, inferring the content type from its extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let content_type = content_type_for(&file_name).to_string();
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Infer a MIME type from a file name's extension.
fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Validate the resume document against the allow-list and size ceiling.
pub fn validate_resume(file: &FileUpload) -> Result<(), ValidationError> {
    validate_file(file, "resume", RESUME_ALLOWED_TYPES, RESUME_MAX_BYTES)
}

/// Validate the profile photo against the allow-list and size ceiling.
pub fn validate_photo(file: &FileUpload) -> Result<(), ValidationError> {
    validate_file(file, "photo", PHOTO_ALLOWED_TYPES, PHOTO_MAX_BYTES)
}

fn validate_file(
    file: &FileUpload,
    kind: &str,
    allowed: &[&str],
    limit: u64,
) -> Result<(), ValidationError> {
    if !allowed.contains(&file.content_type.as_str()) {
        return Err(ValidationError::UnsupportedFileType {
            kind: kind.into(),
            content_type: file.content_type.clone(),
        });
    }
    if file.size() > limit {
        return Err(ValidationError::FileTooLarge {
            kind: kind.into(),
            size: file.size(),
            limit,
        });
    }
    Ok(())
}

/// Work arrangements the user will consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkMode {
    Remote,
    Hybrid,
    OnSite,
}

/// When the user can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Immediately,
    WithinMonth,
    WithinQuarter,
    NotLooking,
}

impl Default for Availability {
    fn default() -> Self {
        Self::NotLooking
    }
}

/// Step 1 payload: the resume document.
#[derive(Debug, Clone)]
pub struct Step1Payload {
    pub resume: FileUpload,
}

/// Step 2 payload: basic profile info plus an optional photo.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Step2Payload {
    pub full_name: String,
    pub headline: String,
    pub location: String,
    pub bio: String,
    pub contact_email: String,
    pub linkedin_url: String,
    #[serde(skip)]
    pub photo: Option<FileUpload>,
}

/// Step 3 payload: work preferences.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Step3Payload {
    pub desired_roles: Vec<String>,
    pub industries: Vec<String>,
    pub work_modes: Vec<WorkMode>,
    pub open_to_opportunities: bool,
}

/// Step 4 payload: salary expectation and availability.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Step4Payload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary_expectation: Option<Decimal>,
    pub salary_currency: String,
    pub availability: Availability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice_period_weeks: Option<u8>,
}

/// One step's submission payload.
#[derive(Debug, Clone)]
pub enum StepPayload {
    PdfUpload(Step1Payload),
    ProfileInfo(Step2Payload),
    WorkPreferences(Step3Payload),
    SalaryAvailability(Step4Payload),
}

impl StepPayload {
    pub fn step(&self) -> OnboardingStep {
        match self {
            Self::PdfUpload(_) => OnboardingStep::PdfUpload,
            Self::ProfileInfo(_) => OnboardingStep::ProfileInfo,
            Self::WorkPreferences(_) => OnboardingStep::WorkPreferences,
            Self::SalaryAvailability(_) => OnboardingStep::SalaryAvailability,
        }
    }
}

/// Transient aggregate of all four steps' inputs.
///
/// Created empty when the wizard opens, mutated by form controls, cleared
/// per-step only on confirmed submission, and dropped with the coordinator.
#[derive(Debug, Clone, Default)]
pub struct OnboardingForm {
    pub resume: Option<FileUpload>,
    pub profile: Step2Payload,
    pub preferences: Step3Payload,
    pub salary: Step4Payload,
}

impl OnboardingForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the submission payload for one step, running that step's local
    /// validation. Steps 2–4 have no required fields; only files are
    /// validated.
    pub fn build_payload(&self, step: OnboardingStep) -> Result<StepPayload, ValidationError> {
        match step {
            OnboardingStep::PdfUpload => {
                let resume = self.resume.clone().ok_or(ValidationError::MissingFile {
                    kind: "resume".into(),
                })?;
                validate_resume(&resume)?;
                Ok(StepPayload::PdfUpload(Step1Payload { resume }))
            }
            OnboardingStep::ProfileInfo => {
                if let Some(ref photo) = self.profile.photo {
                    validate_photo(photo)?;
                }
                Ok(StepPayload::ProfileInfo(self.profile.clone()))
            }
            OnboardingStep::WorkPreferences => {
                Ok(StepPayload::WorkPreferences(self.preferences.clone()))
            }
            OnboardingStep::SalaryAvailability => {
                Ok(StepPayload::SalaryAvailability(self.salary.clone()))
            }
        }
    }

    /// Clear one step's fields after its submission is confirmed.
    pub fn clear_step(&mut self, step: OnboardingStep) {
        match step {
            OnboardingStep::PdfUpload => self.resume = None,
            OnboardingStep::ProfileInfo => self.profile = Step2Payload::default(),
            OnboardingStep::WorkPreferences => self.preferences = Step3Payload::default(),
            OnboardingStep::SalaryAvailability => self.salary = Step4Payload::default(),
        }
    }

    /// Advisory checks on profile fields. These warn, they never block a
    /// submission.
    pub fn advisory_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let p = &self.profile;
        if !p.contact_email.is_empty() && !EMAIL_RE.is_match(&p.contact_email) {
            warnings.push(format!("contact_email does not look like an email: {}", p.contact_email));
        }
        if !p.linkedin_url.is_empty() && !URL_RE.is_match(&p.linkedin_url) {
            warnings.push(format!("linkedin_url does not look like a URL: {}", p.linkedin_url));
        }
        warnings
    }
}
