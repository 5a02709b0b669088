//! Escalation behaviour of the direct → rendered strategy, with scripted tiers

use kodegen_tools_webfetch::{
    Escalation, FetchError, FetchMethod, FetchOptions, PageAction, RetryPolicy,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod common;
use common::{ScriptedDirect, ScriptedRendered, ok_page};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
    }
}

async fn run(
    direct: Vec<Result<kodegen_tools_webfetch::FetchResult, FetchError>>,
    rendered: Vec<Result<kodegen_tools_webfetch::FetchResult, FetchError>>,
    options: &FetchOptions,
) -> (
    Result<kodegen_tools_webfetch::StrategyOutcome, FetchError>,
    Escalation<ScriptedDirect, ScriptedRendered>,
) {
    common::init_tracing();
    let escalation = Escalation::new(
        ScriptedDirect::new(direct),
        ScriptedRendered::new(rendered),
        fast_retry(),
    );
    let outcome = escalation
        .run("https://example.com/article", options, &CancellationToken::new())
        .await;
    (outcome, escalation)
}

#[tokio::test]
async fn test_always_blocked_direct_invokes_renderer_once() {
    let (outcome, escalation) = run(
        vec![Err(FetchError::blocked("HTTP 403", Some(403)))],
        vec![ok_page("rendered article")],
        &FetchOptions::default(),
    )
    .await;

    let outcome = outcome.expect("rendered tier succeeds");
    assert_eq!(outcome.method, FetchMethod::Browser);
    assert!(outcome.result.html_body().unwrap().contains("rendered article"));
    assert_eq!(escalation.simple().calls(), 1);
    assert_eq!(escalation.rendered().calls(), 1);
}

#[tokio::test]
async fn test_timeout_is_attempted_once_and_not_escalated() {
    let (outcome, escalation) = run(
        vec![Err(FetchError::timeout("30000 ms elapsed"))],
        vec![ok_page("unused")],
        &FetchOptions::default(),
    )
    .await;

    assert!(matches!(outcome, Err(FetchError::Timeout(_))));
    assert_eq!(escalation.simple().calls(), 1);
    assert_eq!(escalation.rendered().calls(), 0);
}

#[tokio::test]
async fn test_transient_network_error_retried_then_served() {
    let (outcome, escalation) = run(
        vec![Err(FetchError::network("HTTP 500")), ok_page("second try")],
        vec![],
        &FetchOptions::default(),
    )
    .await;

    let outcome = outcome.expect("retry succeeds");
    assert_eq!(outcome.method, FetchMethod::Simple);
    assert_eq!(escalation.simple().calls(), 2);
}

#[tokio::test]
async fn test_security_error_propagates_unchanged() {
    let (outcome, escalation) = run(
        vec![Err(FetchError::security("Redirect loop detected"))],
        vec![ok_page("unused")],
        &FetchOptions::default(),
    )
    .await;

    assert_eq!(
        outcome.unwrap_err(),
        FetchError::security("Redirect loop detected")
    );
    assert_eq!(escalation.rendered().calls(), 0);
}

#[tokio::test]
async fn test_actions_force_the_browser() {
    let options = FetchOptions::builder()
        .action(PageAction::ScrollToBottom)
        .build()
        .unwrap();
    let (outcome, escalation) = run(vec![ok_page("unused")], vec![ok_page("after scroll")], &options).await;

    assert_eq!(outcome.unwrap().method, FetchMethod::Browser);
    assert_eq!(escalation.simple().calls(), 0);
    assert_eq!(escalation.rendered().calls(), 1);
}

#[tokio::test]
async fn test_cloudflare_reset_retried_with_longer_settle() {
    let options = FetchOptions::builder().render(true).wait_ms(1_000).build().unwrap();
    let (outcome, escalation) = run(
        vec![],
        vec![
            Err(FetchError::network(
                "Connection failed for https://example.com/article: net::ERR_CONNECTION_RESET",
            )),
            ok_page("settled"),
        ],
        &options,
    )
    .await;

    assert!(outcome.is_ok());
    let seen = escalation.rendered().seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].wait_ms(), 1_000);
    assert_eq!(seen[1].wait_ms(), 5_000);
}

#[tokio::test]
async fn test_plain_rendered_network_error_is_not_retried() {
    let options = FetchOptions::builder().render(true).build().unwrap();
    let (outcome, escalation) = run(
        vec![],
        vec![Err(FetchError::network("net::ERR_NAME_NOT_RESOLVED")), ok_page("unused")],
        &options,
    )
    .await;

    assert!(matches!(outcome, Err(FetchError::Network(_))));
    assert_eq!(escalation.rendered().calls(), 1);
}

#[tokio::test]
async fn test_cancelled_request_is_aborted() {
    let escalation = Escalation::new(
        ScriptedDirect::new(vec![Err(FetchError::network("reset"))]),
        ScriptedRendered::new(vec![]),
        fast_retry(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = escalation
        .run("https://example.com/", &FetchOptions::default(), &cancel)
        .await;
    assert_eq!(outcome.unwrap_err(), FetchError::Aborted);
    assert_eq!(escalation.simple().calls(), 0);
}
