//! Headless onboarding console: drives the coordinator against a running
//! CVChatter backend. Useful for poking at a deployment without the web UI.

use std::sync::Arc;
use std::time::Duration;

use cvchatter_onboarding::auth::{AuthWatcher, UserId};
use cvchatter_onboarding::client::HttpOnboardingService;
use cvchatter_onboarding::config::CoordinatorConfig;
use cvchatter_onboarding::coordinator::OnboardingCoordinator;
use cvchatter_onboarding::forms::FileUpload;
use cvchatter_onboarding::notifier::{ExtractionEvent, ExtractionNotifier};
use cvchatter_onboarding::progress::OnboardingStep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let api_base =
        std::env::var("CVCHATTER_API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let ws_base =
        std::env::var("CVCHATTER_WS_URL").unwrap_or_else(|_| "ws://localhost:8000".to_string());
    let token = std::env::var("CVCHATTER_API_TOKEN")
        .ok()
        .map(secrecy::SecretString::from);

    let user: UserId = match std::env::var("CVCHATTER_USER_ID") {
        Ok(raw) => UserId(raw.parse()?),
        Err(_) => {
            eprintln!("Error: CVCHATTER_USER_ID not set");
            eprintln!("  export CVCHATTER_USER_ID=<uuid>");
            std::process::exit(1);
        }
    };

    eprintln!("CVChatter onboarding console v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: {api_base}");
    eprintln!("   WS:  {ws_base}");
    eprintln!("   User: {user}\n");

    let config = CoordinatorConfig {
        api_base_url: api_base.clone(),
        ws_base_url: ws_base,
        ..Default::default()
    };

    // Auth is already resolved here (the user id came from the environment),
    // but the wait still goes through the tri-state watcher the web frontend
    // uses.
    let mut auth = AuthWatcher::ready(user);
    let user = auth.wait_ready(config.auth_wait_timeout).await?;

    let service = Arc::new(HttpOnboardingService::new(api_base, token));
    let coordinator = OnboardingCoordinator::resume(service, user, config).await?;

    print_progress(&coordinator).await;

    // Optionally submit a resume and follow the extraction.
    if let Ok(path) = std::env::var("CVCHATTER_RESUME_PATH") {
        let resume = FileUpload::from_path(std::path::Path::new(&path)).await?;
        eprintln!(
            "Uploading {} ({} bytes, {})...",
            resume.file_name,
            resume.size(),
            resume.content_type
        );
        coordinator.update_form(|f| f.resume = Some(resume)).await;

        let mut notifier = coordinator.connect_notifier();
        let advance = coordinator.submit_step(OnboardingStep::PdfUpload).await?;
        eprintln!("Submitted; server says next step = {:?}", advance.next_step);

        follow_extraction(&coordinator, &mut notifier).await?;
        notifier.shutdown().await;
        print_progress(&coordinator).await;
    }

    Ok(())
}

/// Print progress events as they arrive, then wait for completion.
async fn follow_extraction(
    coordinator: &OnboardingCoordinator,
    notifier: &mut ExtractionNotifier,
) -> anyhow::Result<()> {
    // Drain progress events for display until the stream quiets down, then
    // hand the receiver to the coordinator for completion detection.
    loop {
        match tokio::time::timeout(Duration::from_millis(750), notifier.recv()).await {
            Ok(Some(ExtractionEvent::Progress {
                progress, message, ..
            })) => {
                eprintln!("  [{progress:>3}%] {message}");
            }
            Ok(Some(ExtractionEvent::Completion {
                confidence_score,
                missing_sections,
            })) => {
                eprintln!("  Extraction complete (confidence {confidence_score:.2})");
                if !missing_sections.is_empty() {
                    eprintln!("  Missing sections: {}", missing_sections.join(", "));
                    eprintln!("  Review your profile before continuing.");
                }
                return Ok(());
            }
            Ok(None) | Err(_) => break,
        }
    }

    let summary = coordinator.await_extraction(notifier.events_mut()).await?;
    eprintln!("  Extraction finished (source: {:?})", summary.source);
    if summary.needs_review() {
        eprintln!("  Review your profile before continuing.");
    }
    Ok(())
}

async fn print_progress(coordinator: &OnboardingCoordinator) {
    let progress = coordinator.progress().await;
    eprintln!("Progress (current step {}):", progress.current_step);
    for step in OnboardingStep::ALL {
        let marker = if progress.status_of(step).is_completed() {
            "x"
        } else if coordinator.is_step_accessible(step).await {
            " "
        } else {
            "-"
        };
        eprintln!("  [{marker}] step {}: {step}", step.number());
    }
    if progress.completed {
        eprintln!("Onboarding complete.");
    }
    eprintln!();
}
