//! Search adapters against a local one-shot HTTP server.
//!
//! The server answers a single request with a canned response and hands the
//! raw request text back so the tests can check method, path and body.

use scholar_core::config::SearchConfig;
use scholar_core::error::ProviderError;
use scholar_core::search::SearchProvider;
use scholar_tools::{SerpApiProvider, TavilyProvider};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serve one request; returns the base URL and a receiver for the raw request.
async fn serve_once(status: &'static str, body: String) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + content_length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });

    (format!("http://{addr}"), rx)
}

#[tokio::test]
async fn test_tavily_search_roundtrip() {
    let body = r#"{"results": [
        {"title": "Tokio", "url": "https://tokio.rs", "content": "Async runtime.", "score": 0.8},
        {"title": "Async book", "url": "https://rust-lang.github.io/async-book/", "content": "Guide.", "score": 0.6}
    ]}"#;
    let (base_url, request) = serve_once("200 OK", body.to_string()).await;
    let config = SearchConfig {
        tavily_base_url: base_url,
        ..Default::default()
    };

    let provider = TavilyProvider::new(&config, "tvly-secret").unwrap();
    let records = provider.search("rust async runtime", 2).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].url, "https://tokio.rs");

    let raw = request.await.unwrap();
    assert!(raw.starts_with("POST /search HTTP/1.1"));
    assert!(raw.to_ascii_lowercase().contains("authorization: bearer tvly-secret"));
    assert!(raw.contains(r#""query":"rust async runtime""#));
    assert!(raw.contains(r#""max_results":2"#));
}

#[tokio::test]
async fn test_serpapi_search_roundtrip() {
    let body = r#"{"organic_results": [
        {"title": "One", "link": "https://one.example", "snippet": "first"},
        {"title": "Two", "link": "https://two.example", "snippet": "second"}
    ]}"#;
    let (base_url, request) = serve_once("200 OK", body.to_string()).await;
    let config = SearchConfig {
        serpapi_base_url: base_url,
        ..Default::default()
    };

    let provider = SerpApiProvider::new(&config, "serp-key").unwrap();
    let records = provider.search("quantum computing", 5).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].relevance, 1.0);
    assert_eq!(records[1].relevance, 0.5);

    let raw = request.await.unwrap();
    let request_line = raw.lines().next().unwrap();
    assert!(request_line.starts_with("GET /search.json?"));
    assert!(request_line.contains("engine=google"));
    assert!(request_line.contains("q=quantum+computing"));
    assert!(request_line.contains("num=5"));
    assert!(request_line.contains("api_key=serp-key"));
}

#[tokio::test]
async fn test_unauthorized_is_mapped() {
    let (base_url, _request) =
        serve_once("401 Unauthorized", r#"{"detail": "invalid key"}"#.to_string()).await;
    let config = SearchConfig {
        tavily_base_url: base_url,
        ..Default::default()
    };

    let provider = TavilyProvider::new(&config, "bad").unwrap();
    let err = provider.search("anything", 3).await.unwrap_err();
    assert!(matches!(err, ProviderError::Unauthorized { ref provider } if provider == "tavily"));
}

#[tokio::test]
async fn test_rate_limit_is_mapped() {
    let (base_url, _request) = serve_once("429 Too Many Requests", "{}".to_string()).await;
    let config = SearchConfig {
        serpapi_base_url: base_url,
        ..Default::default()
    };

    let provider = SerpApiProvider::new(&config, "key").unwrap();
    let err = provider.search("anything", 3).await.unwrap_err();
    assert!(matches!(err, ProviderError::RateLimited { .. }));
}

#[tokio::test]
async fn test_non_json_body_is_parse_error() {
    let (base_url, _request) = serve_once("200 OK", "<html>maintenance</html>".to_string()).await;
    let config = SearchConfig {
        tavily_base_url: base_url,
        ..Default::default()
    };

    let provider = TavilyProvider::new(&config, "key").unwrap();
    let err = provider.search("anything", 3).await.unwrap_err();
    assert!(matches!(err, ProviderError::ResponseParse { .. }));
}

#[tokio::test]
async fn test_connection_refused_is_request_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = SearchConfig {
        tavily_base_url: format!("http://{addr}"),
        timeout_secs: 2,
        ..Default::default()
    };
    let provider = TavilyProvider::new(&config, "key").unwrap();
    let err = provider.search("anything", 3).await.unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Request { .. } | ProviderError::Timeout { .. }
    ));
}
