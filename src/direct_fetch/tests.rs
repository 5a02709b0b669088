use super::*;
use mockito::Server;
use std::io::Write;

/// Same policy as production, except the mock server's loopback address is allowed
fn allow_mock_server(input: &str) -> Result<Url> {
    let url = Url::parse(input).map_err(|e| FetchError::security(e.to_string()))?;
    if url.host_str() == Some("127.0.0.1") {
        Ok(url)
    } else {
        validate_url(input)
    }
}

fn fetcher() -> DirectFetcher {
    DirectFetcher::new()
        .expect("client should build")
        .with_url_validator(allow_mock_server)
}

fn page(text: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Test</title></head><body><main><p>{text}</p><p>{}</p></main></body></html>",
        "Lorem ipsum dolor sit amet. ".repeat(4)
    )
}

async fn fetch(server: &Server, path: &str) -> Result<FetchResult> {
    fetcher()
        .simple_fetch(
            &format!("{}{path}", server.url()),
            None,
            Duration::from_secs(10),
            &CancellationToken::new(),
        )
        .await
}

#[tokio::test]
async fn returns_html_page() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/article")
        .with_status(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body(page("hello"))
        .create_async()
        .await;

    let result = fetch(&server, "/article").await.expect("fetch should succeed");
    mock.assert_async().await;
    assert_eq!(result.status_code, Some(200));
    assert!(result.final_url.ends_with("/article"));
    assert!(result.html_body().is_some_and(|h| h.contains("hello")));
}

#[tokio::test]
async fn sends_caller_user_agent() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .match_header("user-agent", "ResearchBot/1.0")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page("ua"))
        .create_async()
        .await;

    fetcher()
        .simple_fetch(
            &format!("{}/", server.url()),
            Some("ResearchBot/1.0"),
            Duration::from_secs(10),
            &CancellationToken::new(),
        )
        .await
        .expect("fetch should succeed");
    mock.assert_async().await;
}

#[tokio::test]
async fn follows_relative_redirects() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/old")
        .with_status(301)
        .with_header("location", "/new")
        .create_async()
        .await;
    server
        .mock("GET", "/new")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page("moved"))
        .create_async()
        .await;

    let result = fetch(&server, "/old").await.expect("redirect should be followed");
    assert!(result.final_url.ends_with("/new"));
}

#[tokio::test]
async fn detects_redirect_loop() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/a")
        .with_status(302)
        .with_header("location", "/b")
        .create_async()
        .await;
    server
        .mock("GET", "/b")
        .with_status(302)
        .with_header("location", "/a")
        .create_async()
        .await;

    let err = fetch(&server, "/a").await.unwrap_err();
    match err {
        FetchError::Security(msg) => assert!(msg.contains("loop"), "unexpected message: {msg}"),
        other => panic!("expected Security, got {other:?}"),
    }
}

#[tokio::test]
async fn fragment_only_change_is_a_loop() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/self")
        .with_status(302)
        .with_header("location", "/self#again")
        .expect(1)
        .create_async()
        .await;

    let err = fetch(&server, "/self").await.unwrap_err();
    match err {
        FetchError::Security(msg) => assert!(msg.contains("loop"), "unexpected message: {msg}"),
        other => panic!("expected Security, got {other:?}"),
    }
    mock.assert_async().await;
}

/// `/r0` → `/r1` → … → `/r{hops}`, which serves the page
async fn redirect_chain(server: &mut Server, hops: usize) {
    for i in 0..hops {
        server
            .mock("GET", format!("/r{i}").as_str())
            .with_status(302)
            .with_header("location", &format!("/r{}", i + 1))
            .create_async()
            .await;
    }
    server
        .mock("GET", format!("/r{hops}").as_str())
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page("end of chain"))
        .create_async()
        .await;
}

#[tokio::test]
async fn ten_redirects_are_followed() {
    let mut server = Server::new_async().await;
    redirect_chain(&mut server, MAX_REDIRECTS).await;

    let result = fetch(&server, "/r0").await.expect("chain within limit");
    assert!(result.final_url.ends_with(&format!("/r{MAX_REDIRECTS}")));
}

#[tokio::test]
async fn eleventh_redirect_is_rejected() {
    let mut server = Server::new_async().await;
    redirect_chain(&mut server, MAX_REDIRECTS + 1).await;

    let err = fetch(&server, "/r0").await.unwrap_err();
    match err {
        FetchError::Security(msg) => {
            assert!(msg.contains("Too many redirects"), "unexpected message: {msg}");
        }
        other => panic!("expected Security, got {other:?}"),
    }
}

#[tokio::test]
async fn redirect_to_private_address_is_rejected() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/hop")
        .with_status(302)
        .with_header("location", "http://169.254.169.254/latest/meta-data/")
        .create_async()
        .await;

    let err = fetch(&server, "/hop").await.unwrap_err();
    assert!(matches!(err, FetchError::Security(_)), "got {err:?}");
}

#[tokio::test]
async fn forbidden_is_blocked() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/")
        .with_status(403)
        .with_header("content-type", "text/html")
        .with_body(page("denied"))
        .create_async()
        .await;

    let err = fetch(&server, "/").await.unwrap_err();
    assert!(
        matches!(err, FetchError::Blocked { status: Some(403), .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn not_found_is_network_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/missing")
        .with_status(404)
        .with_header("content-type", "text/html")
        .with_body(page("missing"))
        .create_async()
        .await;

    let err = fetch(&server, "/missing").await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn non_html_content_is_rejected() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": true}"#)
        .create_async()
        .await;

    let err = fetch(&server, "/api").await.unwrap_err();
    assert!(matches!(err, FetchError::Security(_)), "got {err:?}");
}

#[tokio::test]
async fn tiny_body_is_blocked() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html></html>")
        .create_async()
        .await;

    let err = fetch(&server, "/").await.unwrap_err();
    assert!(matches!(err, FetchError::Blocked { .. }), "got {err:?}");
}

#[tokio::test]
async fn challenge_interstitial_is_blocked() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page("<title>Just a moment...</title>"))
        .create_async()
        .await;

    let err = fetch(&server, "/").await.unwrap_err();
    assert!(matches!(err, FetchError::Blocked { .. }), "got {err:?}");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/huge")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(vec![b'a'; MAX_RESPONSE_BYTES + 1])
        .create_async()
        .await;

    let err = fetch(&server, "/huge").await.unwrap_err();
    assert!(matches!(err, FetchError::Security(_)), "got {err:?}");
}

#[tokio::test]
async fn streamed_body_over_cap_is_rejected() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/stream")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_chunked_body(|w| {
            let chunk = vec![b'a'; 1024 * 1024];
            for _ in 0..11 {
                w.write_all(&chunk)?;
            }
            Ok(())
        })
        .create_async()
        .await;

    let err = fetch(&server, "/stream").await.unwrap_err();
    match err {
        FetchError::Security(msg) => {
            assert!(msg.contains("during download"), "unexpected message: {msg}");
        }
        other => panic!("expected Security, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_before_start_is_aborted() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fetcher()
        .simple_fetch("https://example.com/", None, Duration::from_secs(5), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Aborted);
}

#[tokio::test]
async fn production_policy_rejects_loopback() {
    let err = DirectFetcher::new()
        .expect("client should build")
        .simple_fetch(
            "http://127.0.0.1:9/",
            None,
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Security(_)));
}

#[tokio::test]
async fn invalid_user_agent_is_rejected() {
    let err = fetcher()
        .simple_fetch(
            "https://example.com/",
            Some("bad\nagent"),
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Security(_)));
}
