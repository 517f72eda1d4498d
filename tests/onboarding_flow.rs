//! Integration tests for the onboarding coordinator against a mock of the
//! remote CVChatter service.
//!
//! Each test spins up an Axum server on a random port exposing the step
//! submission, progress, resume, skip, and extraction-WS endpoints, then
//! exercises the real HTTP client and push-channel consumer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, broadcast};
use tokio::time::timeout;
use uuid::Uuid;

use cvchatter_onboarding::auth::UserId;
use cvchatter_onboarding::client::{HttpOnboardingService, OnboardingService, SubmitOutcome};
use cvchatter_onboarding::config::CoordinatorConfig;
use cvchatter_onboarding::coordinator::{CompletionSource, OnboardingCoordinator};
use cvchatter_onboarding::error::{ApiError, Error};
use cvchatter_onboarding::forms::FileUpload;
use cvchatter_onboarding::notifier::ExtractionEvent;
use cvchatter_onboarding::progress::{OnboardingProgress, OnboardingStep, StepStatus};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// What the mock saw of a step-1 upload.
#[derive(Debug, Clone)]
struct CapturedUpload {
    content_type: String,
    body_len: usize,
}

/// Shared state of the mock onboarding service.
#[derive(Clone)]
struct MockState {
    progress: Arc<RwLock<OnboardingProgress>>,
    submit_calls: Arc<AtomicUsize>,
    /// When set, submissions answer with this next_step instead of n + 1.
    next_step_override: Arc<RwLock<Option<u8>>>,
    fail_resume: Arc<AtomicBool>,
    reject_submit: Arc<AtomicBool>,
    /// When set, the first extraction-WS connection is closed immediately.
    drop_first_ws: Arc<AtomicBool>,
    captured_upload: Arc<RwLock<Option<CapturedUpload>>>,
    /// Pre-serialized extraction events pushed to connected WS clients.
    push: broadcast::Sender<String>,
}

impl MockState {
    fn new() -> Self {
        let (push, _) = broadcast::channel(32);
        Self {
            progress: Arc::new(RwLock::new(OnboardingProgress::default())),
            submit_calls: Arc::new(AtomicUsize::new(0)),
            next_step_override: Arc::new(RwLock::new(None)),
            fail_resume: Arc::new(AtomicBool::new(false)),
            reject_submit: Arc::new(AtomicBool::new(false)),
            drop_first_ws: Arc::new(AtomicBool::new(false)),
            captured_upload: Arc::new(RwLock::new(None)),
            push,
        }
    }

    fn push_event(&self, event: &ExtractionEvent) {
        let json = serde_json::to_string(event).unwrap();
        let _ = self.push.send(json);
    }
}

async fn submit_step(
    State(state): State<MockState>,
    Path((_user, n)): Path<(Uuid, u8)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.submit_calls.fetch_add(1, Ordering::SeqCst);

    if state.reject_submit.load(Ordering::SeqCst) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"error": "server-side validation failed"})),
        )
            .into_response();
    }

    if n == 1 {
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        *state.captured_upload.write().await = Some(CapturedUpload {
            content_type,
            body_len: body.len(),
        });
    }

    let step = match OnboardingStep::from_number(n) {
        Ok(s) => s,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let mut progress = state.progress.write().await;
    progress.set_status(step, StepStatus::Completed);

    if step.is_final() {
        for s in OnboardingStep::ALL {
            progress.set_status(s, StepStatus::Completed);
        }
        progress.completed = true;
        return Json(SubmitOutcome {
            success: true,
            next_step: None,
            onboarding_completed: true,
            qa_info: None,
        })
        .into_response();
    }

    let next = state.next_step_override.read().await.unwrap_or(n + 1);
    progress.current_step = next;
    Json(SubmitOutcome {
        success: true,
        next_step: Some(next),
        onboarding_completed: false,
        qa_info: None,
    })
    .into_response()
}

async fn get_progress(
    State(state): State<MockState>,
    Path(_user): Path<Uuid>,
) -> Json<OnboardingProgress> {
    Json(state.progress.read().await.clone())
}

async fn resume_from_step(
    State(state): State<MockState>,
    Path(_user): Path<Uuid>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if state.fail_resume.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "resume unavailable"})),
        )
            .into_response();
    }
    let step = body.get("step").and_then(|v| v.as_u64()).unwrap_or(1) as u8;
    let mut progress = state.progress.write().await;
    progress.current_step = step;
    Json(progress.clone()).into_response()
}

async fn skip_to_profile(
    State(state): State<MockState>,
    Path(_user): Path<Uuid>,
) -> Json<OnboardingProgress> {
    let mut progress = state.progress.write().await;
    for s in OnboardingStep::ALL {
        progress.set_status(s, StepStatus::Completed);
    }
    progress.current_step = 4;
    progress.completed = true;
    Json(progress.clone())
}

async fn extraction_ws(
    ws: WebSocketUpgrade,
    State(state): State<MockState>,
    Path(_user): Path<Uuid>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| forward_push(socket, state))
}

async fn forward_push(mut socket: WebSocket, state: MockState) {
    if state.drop_first_ws.swap(false, Ordering::SeqCst) {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    let mut rx = state.push.subscribe();
    loop {
        tokio::select! {
            result = rx.recv() => match result {
                Ok(json) => {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                _ => {}
            },
        }
    }
}

/// Start the mock service on a random port, return (port, state).
async fn start_mock() -> (u16, MockState) {
    let state = MockState::new();
    let app = Router::new()
        .route("/api/onboarding/{user}/step/{n}", post(submit_step))
        .route("/api/onboarding/{user}/progress", get(get_progress))
        .route("/api/onboarding/{user}/resume", post(resume_from_step))
        .route("/api/onboarding/{user}/skip", post(skip_to_profile))
        .route("/ws/extraction/{user}", get(extraction_ws))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, state)
}

async fn coordinator_for(port: u16) -> OnboardingCoordinator {
    let config = CoordinatorConfig {
        api_base_url: format!("http://127.0.0.1:{port}"),
        ws_base_url: format!("ws://127.0.0.1:{port}"),
        extraction_poll_interval: Duration::from_millis(100),
        extraction_deadline: Duration::from_secs(3),
        reconnect_initial_backoff: Duration::from_millis(50),
        reconnect_max_backoff: Duration::from_millis(200),
        ..Default::default()
    };
    let service = Arc::new(HttpOnboardingService::new(config.api_base_url.clone(), None));
    OnboardingCoordinator::resume(service, UserId::new(), config)
        .await
        .unwrap()
}

fn small_pdf() -> FileUpload {
    FileUpload::new("cv.pdf", "application/pdf", vec![0x25; 4096])
}

// ── Wizard flow ──────────────────────────────────────────────────────

#[tokio::test]
async fn full_wizard_walkthrough() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        let coord = coordinator_for(port).await;

        coord.update_form(|f| f.resume = Some(small_pdf())).await;
        for step in OnboardingStep::ALL {
            assert!(coord.is_step_accessible(step).await || step.number() == 1);
            let advance = coord.submit_step(step).await.unwrap();
            assert_eq!(advance.completed, step.is_final());
        }

        let progress = coord.progress().await;
        assert!(progress.completed);
        assert!(progress.is_consistent());
        assert!(coord.take_redirect().await);
        assert!(!coord.take_redirect().await);
        assert_eq!(state.submit_calls.load(Ordering::SeqCst), 4);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn step_one_upload_reaches_server_as_multipart() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        let coord = coordinator_for(port).await;

        coord.update_form(|f| f.resume = Some(small_pdf())).await;
        coord.submit_step(OnboardingStep::PdfUpload).await.unwrap();

        let captured = state.captured_upload.read().await.clone().unwrap();
        assert!(
            captured.content_type.starts_with("multipart/form-data"),
            "expected multipart upload, got {}",
            captured.content_type
        );
        // The body carries at least the file bytes.
        assert!(captured.body_len >= 4096);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_file_never_reaches_the_network() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        let coord = coordinator_for(port).await;

        assert!(coord.submit_step(OnboardingStep::PdfUpload).await.is_err());
        assert_eq!(state.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(coord.progress().await.current_step, 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn server_next_step_is_adopted_verbatim() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        // Server routes past step 2 entirely.
        *state.next_step_override.write().await = Some(3);
        let coord = coordinator_for(port).await;

        coord.update_form(|f| f.resume = Some(small_pdf())).await;
        let advance = coord.submit_step(OnboardingStep::PdfUpload).await.unwrap();

        assert_eq!(advance.next_step, Some(OnboardingStep::WorkPreferences));
        assert_eq!(coord.view_step().await, OnboardingStep::WorkPreferences);
        assert_eq!(coord.progress().await.current_step, 3);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn server_rejection_surfaces_as_api_error() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        state.reject_submit.store(true, Ordering::SeqCst);
        let coord = coordinator_for(port).await;

        coord.update_form(|f| f.resume = Some(small_pdf())).await;
        let err = coord.submit_step(OnboardingStep::PdfUpload).await.unwrap_err();
        match err {
            Error::Api(ApiError::ServerRejected { status, .. }) => assert_eq!(status, 422),
            other => panic!("expected ServerRejected, got {other:?}"),
        }
        // Step remains unadvanced and retryable.
        assert_eq!(coord.progress().await.current_step, 1);
        assert!(!coord.is_step_busy(OnboardingStep::PdfUpload));
    })
    .await
    .expect("test timed out");
}

// ── Backward navigation ──────────────────────────────────────────────

#[tokio::test]
async fn back_from_step_two_rewinds_via_server() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state) = start_mock().await;
        let coord = coordinator_for(port).await;

        coord.update_form(|f| f.resume = Some(small_pdf())).await;
        coord.submit_step(OnboardingStep::PdfUpload).await.unwrap();
        assert_eq!(coord.view_step().await, OnboardingStep::ProfileInfo);

        let outcome = coord.go_back(OnboardingStep::PdfUpload).await.unwrap();
        assert!(outcome.confirmed);
        assert_eq!(coord.progress().await.current_step, 1);
        assert_eq!(coord.view_step().await, OnboardingStep::PdfUpload);
        assert!(coord.is_step_completed(OnboardingStep::PdfUpload).await);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn back_failure_moves_view_only() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        let coord = coordinator_for(port).await;

        coord.update_form(|f| f.resume = Some(small_pdf())).await;
        coord.submit_step(OnboardingStep::PdfUpload).await.unwrap();
        let mirror_before = coord.progress().await;

        state.fail_resume.store(true, Ordering::SeqCst);
        let outcome = coord.go_back(OnboardingStep::PdfUpload).await.unwrap();
        assert!(!outcome.confirmed);
        // The view shows step 1, but no mirror field reflects the
        // unconfirmed transition.
        assert_eq!(coord.view_step().await, OnboardingStep::PdfUpload);
        assert_eq!(coord.progress().await, mirror_before);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn resubmit_after_rewind_keeps_server_frontier() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        let coord = coordinator_for(port).await;

        coord.update_form(|f| f.resume = Some(small_pdf())).await;
        coord.submit_step(OnboardingStep::PdfUpload).await.unwrap();
        coord.submit_step(OnboardingStep::ProfileInfo).await.unwrap();

        coord.go_back(OnboardingStep::PdfUpload).await.unwrap();

        // The server keeps the frontier at step 3 when step 1 is redone.
        *state.next_step_override.write().await = Some(3);
        coord.update_form(|f| f.resume = Some(small_pdf())).await;
        coord.submit_step(OnboardingStep::PdfUpload).await.unwrap();

        assert_eq!(coord.progress().await.current_step, 3);
        assert!(coord.is_step_completed(OnboardingStep::PdfUpload).await);
    })
    .await
    .expect("test timed out");
}

// ── Skip ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn skip_to_profile_completes_onboarding() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state) = start_mock().await;
        let coord = coordinator_for(port).await;

        let progress = coord.skip_to_profile().await.unwrap();
        assert!(progress.completed);
        assert!(progress.all_completed());
        assert!(coord.take_redirect().await);
    })
    .await
    .expect("test timed out");
}

// ── Extraction push channel ──────────────────────────────────────────

#[tokio::test]
async fn extraction_completion_arrives_by_push() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        let coord = coordinator_for(port).await;
        let mut notifier = coord.connect_notifier();

        // Let the WS connect before pushing.
        tokio::time::sleep(Duration::from_millis(150)).await;
        state.push_event(&ExtractionEvent::Progress {
            step: 1,
            progress: 40,
            message: "Extracting work history".into(),
            details: None,
        });
        state.push_event(&ExtractionEvent::Completion {
            confidence_score: 0.78,
            missing_sections: vec!["education".into()],
        });

        let summary = coord.await_extraction(notifier.events_mut()).await.unwrap();
        assert_eq!(summary.source, CompletionSource::Push);
        assert!(summary.needs_review());
        let qa = summary.qa_info.unwrap();
        assert_eq!(qa.missing_sections, vec!["education".to_string()]);

        notifier.shutdown().await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn extraction_progress_events_stream_in_order() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        let coord = coordinator_for(port).await;
        let mut notifier = coord.connect_notifier();
        tokio::time::sleep(Duration::from_millis(150)).await;

        for pct in [10u8, 60, 100] {
            state.push_event(&ExtractionEvent::Progress {
                step: 1,
                progress: pct,
                message: format!("{pct}%"),
                details: None,
            });
        }

        for expected in [10u8, 60, 100] {
            match notifier.recv().await.unwrap() {
                ExtractionEvent::Progress { progress, .. } => assert_eq!(progress, expected),
                other => panic!("expected progress event, got {other:?}"),
            }
        }

        notifier.shutdown().await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn events_resume_after_server_drops_the_channel() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        state.drop_first_ws.store(true, Ordering::SeqCst);
        let coord = coordinator_for(port).await;
        let mut notifier = coord.connect_notifier();

        // The first connection is closed by the server; wait for the
        // reconnected subscription before pushing anything.
        while state.push.receiver_count() == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        state.push_event(&ExtractionEvent::Completion {
            confidence_score: 0.81,
            missing_sections: vec![],
        });

        let summary = coord.await_extraction(notifier.events_mut()).await.unwrap();
        assert_eq!(summary.source, CompletionSource::Push);
        assert!(!summary.needs_review());

        notifier.shutdown().await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn silent_channel_falls_back_to_progress_poll() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        let coord = coordinator_for(port).await;
        let mut notifier = coord.connect_notifier();

        // The channel stays silent; the server-side record flips to
        // completed shortly after.
        {
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                let mut progress = state.progress.write().await;
                progress.set_status(OnboardingStep::PdfUpload, StepStatus::Completed);
                progress.current_step = 2;
            });
        }

        let summary = coord.await_extraction(notifier.events_mut()).await.unwrap();
        assert_eq!(summary.source, CompletionSource::Poll);
        assert!(summary.qa_info.is_none());
        assert_eq!(coord.progress().await.current_step, 2);

        notifier.shutdown().await;
    })
    .await
    .expect("test timed out");
}

// ── Service client against the mock ──────────────────────────────────

#[tokio::test]
async fn fetch_progress_roundtrip() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_mock().await;
        {
            let mut progress = state.progress.write().await;
            progress.set_status(OnboardingStep::PdfUpload, StepStatus::Completed);
            progress.current_step = 2;
        }

        let service = HttpOnboardingService::new(format!("http://127.0.0.1:{port}"), None);
        let fetched = service.fetch_progress(UserId::new()).await.unwrap();
        assert_eq!(fetched.current_step, 2);
        assert_eq!(
            fetched.status_of(OnboardingStep::PdfUpload),
            StepStatus::Completed
        );
    })
    .await
    .expect("test timed out");
}
