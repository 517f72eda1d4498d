//! Remote onboarding service client.
//!
//! The service itself (persistence, PDF parsing, AI extraction) is external;
//! this module is its typed client. The `OnboardingService` trait is the
//! seam the coordinator depends on, so tests can substitute a stub.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::auth::UserId;
use crate::error::ApiError;
use crate::forms::{Step1Payload, Step2Payload, StepPayload};
use crate::progress::{OnboardingProgress, OnboardingStep};

/// Data-quality report attached to a completed extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaInfo {
    /// Extraction confidence, 0.0..=1.0.
    pub confidence_score: f32,
    /// Profile sections the extraction could not fill.
    #[serde(default)]
    pub missing_sections: Vec<String>,
}

impl QaInfo {
    /// Whether the user should review the profile before moving on.
    pub fn needs_review(&self) -> bool {
        !self.missing_sections.is_empty()
    }
}

/// Server response to a step submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub success: bool,
    /// The server-authoritative next step. The client adopts this verbatim
    /// and never computes a successor locally.
    #[serde(default)]
    pub next_step: Option<u8>,
    #[serde(default)]
    pub onboarding_completed: bool,
    #[serde(default)]
    pub qa_info: Option<QaInfo>,
}

/// Seam over the remote onboarding service.
#[async_trait]
pub trait OnboardingService: Send + Sync {
    /// Submit one step's payload. The server decides the next step.
    async fn submit_step(
        &self,
        user: UserId,
        payload: StepPayload,
    ) -> Result<SubmitOutcome, ApiError>;

    /// Fetch the authoritative progress record.
    async fn fetch_progress(&self, user: UserId) -> Result<OnboardingProgress, ApiError>;

    /// Rewind `current_step` to `step`. Returns the confirmed record.
    async fn resume_from_step(
        &self,
        user: UserId,
        step: OnboardingStep,
    ) -> Result<OnboardingProgress, ApiError>;

    /// Mark onboarding complete without the remaining steps.
    async fn skip_to_profile(&self, user: UserId) -> Result<OnboardingProgress, ApiError>;
}

/// HTTP implementation of [`OnboardingService`].
pub struct HttpOnboardingService {
    base_url: String,
    token: Option<SecretString>,
    client: reqwest::Client,
}

impl HttpOnboardingService {
    pub fn new(base_url: impl Into<String>, token: Option<SecretString>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, user: UserId, path: &str) -> String {
        format!("{}/api/onboarding/{user}/{path}", self.base_url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        endpoint: &str,
        resp: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::ServerRejected {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>().await.map_err(|e| ApiError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    fn send_error(endpoint: &str, e: reqwest::Error) -> ApiError {
        ApiError::RequestFailed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    }

    fn step1_form(payload: &Step1Payload) -> Form {
        let resume = &payload.resume;
        let part = Part::bytes(resume.bytes.clone())
            .file_name(resume.file_name.clone())
            .mime_str(&resume.content_type)
            .unwrap_or_else(|_| {
                Part::bytes(resume.bytes.clone()).file_name(resume.file_name.clone())
            });
        Form::new().part("resume", part)
    }

    fn step2_form(payload: &Step2Payload) -> Result<Form, ApiError> {
        let data = serde_json::to_string(payload).map_err(|e| ApiError::InvalidResponse {
            endpoint: "step/2".into(),
            reason: format!("payload serialization failed: {e}"),
        })?;
        let mut form = Form::new().text("data", data);
        if let Some(ref photo) = payload.photo {
            let part = Part::bytes(photo.bytes.clone())
                .file_name(photo.file_name.clone())
                .mime_str(&photo.content_type)
                .unwrap_or_else(|_| {
                    Part::bytes(photo.bytes.clone()).file_name(photo.file_name.clone())
                });
            form = form.part("photo", part);
        }
        Ok(form)
    }
}

#[async_trait]
impl OnboardingService for HttpOnboardingService {
    async fn submit_step(
        &self,
        user: UserId,
        payload: StepPayload,
    ) -> Result<SubmitOutcome, ApiError> {
        let step = payload.step();
        let endpoint = format!("step/{}", step.number());
        let url = self.api_url(user, &endpoint);

        let req = self.authorize(self.client.post(&url));
        let req = match &payload {
            StepPayload::PdfUpload(p) => req.multipart(Self::step1_form(p)),
            StepPayload::ProfileInfo(p) => req.multipart(Self::step2_form(p)?),
            StepPayload::WorkPreferences(p) => req.json(p),
            StepPayload::SalaryAvailability(p) => req.json(p),
        };

        let resp = req.send().await.map_err(|e| Self::send_error(&endpoint, e))?;
        Self::parse_response(&endpoint, resp).await
    }

    async fn fetch_progress(&self, user: UserId) -> Result<OnboardingProgress, ApiError> {
        let url = self.api_url(user, "progress");
        let resp = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| Self::send_error("progress", e))?;
        Self::parse_response("progress", resp).await
    }

    async fn resume_from_step(
        &self,
        user: UserId,
        step: OnboardingStep,
    ) -> Result<OnboardingProgress, ApiError> {
        let url = self.api_url(user, "resume");
        let resp = self
            .authorize(self.client.post(&url))
            .json(&serde_json::json!({ "step": step.number() }))
            .send()
            .await
            .map_err(|e| Self::send_error("resume", e))?;
        Self::parse_response("resume", resp).await
    }

    async fn skip_to_profile(&self, user: UserId) -> Result<OnboardingProgress, ApiError> {
        let url = self.api_url(user, "skip");
        let resp = self
            .authorize(self.client.post(&url))
            .send()
            .await
            .map_err(|e| Self::send_error("skip", e))?;
        Self::parse_response("skip", resp).await
    }
}
