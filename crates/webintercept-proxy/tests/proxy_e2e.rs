//! End-to-end proxy tests against local fixture servers

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use webintercept_core::model::{
    ActionType, ExchangeFilter, MatchType, Page, Rule, RuleScope,
};
use webintercept_core::tls::CertificateAuthority;
use webintercept_core::wire;
use webintercept_core::{EventBus, HttpLimits, MemoryRepository, ProxyConfig, Repository};
use webintercept_proxy::{InterceptDecision, ProxyManager};

async fn spawn_upstream(app: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve upstream");
    });
    port
}

fn proxy_config() -> ProxyConfig {
    ProxyConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls_mitm: false,
        cert_dir: std::env::temp_dir(),
        intercept_timeout_secs: 5,
        upstream_timeout_secs: 5,
    }
}

async fn start_proxy(
    repo: Arc<MemoryRepository>,
    events: EventBus,
    authority: Option<Arc<CertificateAuthority>>,
) -> (Arc<ProxyManager>, u16) {
    let mut config = proxy_config();
    config.tls_mitm = authority.is_some();
    let proxy = Arc::new(
        ProxyManager::new(config, HttpLimits::default(), repo, events, authority)
            .expect("build proxy"),
    );
    let port = proxy.start().await.expect("start proxy");
    (proxy, port)
}

/// Send one absolute-form request through the proxy and read the response.
async fn send_through_proxy(proxy_port: u16, raw: &str) -> wire::ParsedResponse {
    let stream = TcpStream::connect(("127.0.0.1", proxy_port)).await.expect("connect proxy");
    let mut reader = BufReader::new(stream);
    reader.get_mut().write_all(raw.as_bytes()).await.expect("write request");
    wire::read_response(&mut reader, &HttpLimits::default(), false)
        .await
        .expect("read response")
}

/// Receive events until one of the wanted type arrives (lifecycle events
/// like `proxy_status` interleave freely).
async fn next_event_of(
    rx: &mut tokio::sync::broadcast::Receiver<webintercept_core::Event>,
    event_type: &str,
) -> webintercept_core::Event {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event in time")
            .expect("event");
        if event.event_type == event_type {
            return event;
        }
    }
}

async fn wait_for_exchanges(repo: &MemoryRepository, count: usize) -> Vec<webintercept_core::model::Exchange> {
    for _ in 0..100 {
        let exchanges = repo
            .list_exchanges(&ExchangeFilter::default(), Page::new(100, 0))
            .await
            .expect("list");
        if exchanges.len() >= count {
            return exchanges;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("exchange was not persisted in time");
}

#[tokio::test]
async fn plain_http_capture_records_exchange_and_event() {
    let upstream_port = spawn_upstream(Router::new().route("/", get(|| async { "hello" }))).await;

    let repo = Arc::new(MemoryRepository::new());
    let events = EventBus::default();
    let mut event_rx = events.subscribe();
    let (proxy, proxy_port) = start_proxy(repo.clone(), events, None).await;

    let raw = format!(
        "GET http://127.0.0.1:{upstream_port}/ HTTP/1.1\r\nHost: 127.0.0.1:{upstream_port}\r\nConnection: close\r\n\r\n"
    );
    let response = send_through_proxy(proxy_port, &raw).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"hello");

    let exchanges = wait_for_exchanges(&repo, 1).await;
    let exchange = &exchanges[0];
    assert_eq!(exchange.method, "GET");
    assert_eq!(exchange.host, "127.0.0.1");
    assert_eq!(exchange.path, "/");
    assert_eq!(exchange.response_status, Some(200));
    assert_eq!(exchange.response_body.as_deref(), Some(b"hello".as_slice()));
    assert!(exchange.timestamp <= chrono::Utc::now());

    let event = next_event_of(&mut event_rx, "new_request").await;
    assert_eq!(event.data["response_status"], 200);

    proxy.stop().await;
}

#[tokio::test]
async fn rule_rewrites_url_before_forwarding() {
    let upstream_port =
        spawn_upstream(Router::new().route("/path", get(|| async { "rewritten" }))).await;

    let repo = Arc::new(MemoryRepository::new());

    let mut rule = Rule::new(
        "redirect old host",
        MatchType::Url,
        "old.test",
        ActionType::Replace,
        RuleScope::Request,
    );
    rule.priority = 10;
    rule.action_target = Some("old.test".to_string());
    rule.action_value = Some(format!("127.0.0.1:{upstream_port}"));
    repo.put_rule(rule).await.expect("store rule");

    let (proxy, proxy_port) = start_proxy(repo.clone(), EventBus::default(), None).await;

    let raw =
        "GET http://old.test/path HTTP/1.1\r\nHost: old.test\r\nConnection: close\r\n\r\n";
    let response = send_through_proxy(proxy_port, raw).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"rewritten");

    let exchanges = wait_for_exchanges(&repo, 1).await;
    assert!(exchanges[0].modified);
    assert!(exchanges[0].url.contains(&format!("127.0.0.1:{upstream_port}")));

    proxy.stop().await;
}

#[tokio::test]
async fn block_rule_answers_403_without_forwarding() {
    let repo = Arc::new(MemoryRepository::new());

    let mut rule = Rule::new(
        "block tracker",
        MatchType::Url,
        "blocked.test",
        ActionType::Block,
        RuleScope::Request,
    );
    rule.priority = 100;
    repo.put_rule(rule).await.expect("store rule");

    let (proxy, proxy_port) = start_proxy(repo.clone(), EventBus::default(), None).await;

    // No upstream exists for this host; the block must answer regardless.
    let raw = "GET http://blocked.test/ HTTP/1.1\r\nHost: blocked.test\r\nConnection: close\r\n\r\n";
    let response = send_through_proxy(proxy_port, raw).await;
    assert_eq!(response.status, 403);

    let exchanges = wait_for_exchanges(&repo, 1).await;
    assert!(exchanges[0].modified);
    assert_eq!(exchanges[0].response_status, Some(403));

    proxy.stop().await;
}

#[tokio::test]
async fn unreachable_upstream_yields_502() {
    let repo = Arc::new(MemoryRepository::new());
    let (proxy, proxy_port) = start_proxy(repo.clone(), EventBus::default(), None).await;

    // Port 1 is essentially guaranteed closed.
    let raw = "GET http://127.0.0.1:1/ HTTP/1.1\r\nHost: 127.0.0.1:1\r\nConnection: close\r\n\r\n";
    let response = send_through_proxy(proxy_port, raw).await;
    assert_eq!(response.status, 502);

    let exchanges = wait_for_exchanges(&repo, 1).await;
    assert_eq!(exchanges[0].response_status, Some(502));
    assert!(exchanges[0].error.is_some());

    proxy.stop().await;
}

#[tokio::test]
async fn intercept_hold_forward_modified_and_idempotent_decisions() {
    let upstream_port = spawn_upstream(Router::new().route(
        "/",
        get(|headers: axum::http::HeaderMap| async move {
            headers
                .get("x-injected")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("absent")
                .to_string()
        }),
    ))
    .await;

    let repo = Arc::new(MemoryRepository::new());
    let events = EventBus::default();
    let mut event_rx = events.subscribe();
    let (proxy, proxy_port) = start_proxy(repo.clone(), events, None).await;
    assert!(proxy.toggle_intercept());

    let raw = format!(
        "GET http://127.0.0.1:{upstream_port}/ HTTP/1.1\r\nHost: 127.0.0.1:{upstream_port}\r\nConnection: close\r\n\r\n"
    );
    let client = tokio::spawn(async move { send_through_proxy(proxy_port, &raw).await });

    // Wait for the hold announcement, then modify the request.
    let event = next_event_of(&mut event_rx, "intercept").await;
    assert_eq!(event.data["phase"], "request");
    let intercept_id: uuid::Uuid =
        serde_json::from_value(event.data["intercept_id"].clone()).expect("id");

    let mut headers = webintercept_core::model::HeaderList::new();
    headers.append("Host", format!("127.0.0.1:{upstream_port}"));
    headers.append("X-Injected", "by-operator");
    let registry = proxy.intercepts();
    assert!(registry.decide(
        intercept_id,
        InterceptDecision::ForwardModified {
            headers: Some(headers),
            body: None,
            status: None,
        },
    ));
    // Delivering the same decision again changes nothing.
    assert!(!registry.decide(intercept_id, InterceptDecision::Drop));

    // Intercept also holds the response; forward it unchanged.
    let event = next_event_of(&mut event_rx, "intercept").await;
    assert_eq!(event.data["phase"], "response");
    let response_intercept: uuid::Uuid =
        serde_json::from_value(event.data["intercept_id"].clone()).expect("id");
    assert!(registry.decide(response_intercept, InterceptDecision::Forward));

    let response = client.await.expect("client task");
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"by-operator");

    let exchanges = wait_for_exchanges(&repo, 1).await;
    assert!(exchanges[0].intercepted);
    assert!(exchanges[0].modified);

    proxy.stop().await;
}

#[tokio::test]
async fn connect_passthrough_pipes_bytes_and_records_tunnel() {
    // A raw TCP echo upstream: not HTTP at all, proving opacity.
    let echo_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind echo");
    let echo_port = echo_listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match echo_listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 || socket.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    let repo = Arc::new(MemoryRepository::new());
    let (proxy, proxy_port) = start_proxy(repo.clone(), EventBus::default(), None).await;

    let mut stream = TcpStream::connect(("127.0.0.1", proxy_port)).await.expect("connect");
    stream
        .write_all(format!("CONNECT 127.0.0.1:{echo_port} HTTP/1.1\r\n\r\n").as_bytes())
        .await
        .expect("write connect");

    let mut buf = [0u8; 256];
    let n = stream.read(&mut buf).await.expect("read established");
    assert!(String::from_utf8_lossy(&buf[..n]).contains("200 Connection established"));

    stream.write_all(b"ping").await.expect("write tunnel bytes");
    let mut echoed = [0u8; 4];
    stream.read_exact(&mut echoed).await.expect("read echo");
    assert_eq!(&echoed, b"ping");

    let exchanges = wait_for_exchanges(&repo, 1).await;
    assert!(exchanges[0].is_tunnel);
    assert_eq!(exchanges[0].method, "CONNECT");

    proxy.stop().await;
}

#[tokio::test]
async fn connect_mitm_decrypts_and_records_inner_exchange() {
    let cert_dir = tempfile::tempdir().expect("tempdir");
    let authority =
        Arc::new(CertificateAuthority::load_or_create(cert_dir.path()).expect("authority"));

    // TLS upstream serving 204 with a certificate forged by the same CA; the
    // proxy's upstream client does not verify, so any identity works.
    let upstream_identity = authority.identity_for("127.0.0.1").expect("identity");
    let upstream_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let upstream_port = upstream_listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let acceptor = tokio_rustls::TlsAcceptor::from(upstream_identity.server_config.clone());
        while let Ok((socket, _)) = upstream_listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(tls) = acceptor.accept(socket).await else {
                    return;
                };
                let mut reader = BufReader::new(tls);
                while let Ok(Some(_)) =
                    wire::read_request(&mut reader, &HttpLimits::default()).await
                {
                    let response = wire::ParsedResponse {
                        version: "HTTP/1.1".to_string(),
                        status: 204,
                        reason: String::new(),
                        headers: Default::default(),
                        body: Vec::new(),
                    };
                    if wire::write_response(reader.get_mut(), &response).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    let repo = Arc::new(MemoryRepository::new());
    let (proxy, proxy_port) =
        start_proxy(repo.clone(), EventBus::default(), Some(authority.clone())).await;

    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::all(format!("http://127.0.0.1:{proxy_port}")).expect("proxy"))
        .add_root_certificate(
            reqwest::Certificate::from_pem(authority.ca_cert_pem().as_bytes()).expect("ca"),
        )
        .build()
        .expect("client");

    let response = client
        .get(format!("https://127.0.0.1:{upstream_port}/"))
        .send()
        .await
        .expect("request through mitm");
    assert_eq!(response.status().as_u16(), 204);

    let exchanges = wait_for_exchanges(&repo, 1).await;
    let exchange = &exchanges[0];
    assert_eq!(exchange.scheme, "https");
    assert_eq!(exchange.host, "127.0.0.1");
    assert_eq!(exchange.path, "/");
    assert_eq!(exchange.response_status, Some(204));
    assert!(!exchange.is_tunnel);

    proxy.stop().await;
}
