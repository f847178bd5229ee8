//! Per-connection request lifecycle
//!
//! Each accepted client runs one task through here. Plain HTTP requests flow
//! request → rules → intercept → forward → rules → intercept → record; a
//! CONNECT either becomes a TLS-terminated tunnel whose decrypted requests
//! take the same path, or an opaque byte pipe when forging is disabled.

use crate::forward::error_status;
use crate::intercept::{await_decision, InterceptDecision};
use crate::rules::{RequestDraft, ResponseDraft, RuleEngine, RuleOutcome};
use crate::server::{protocol_error_status, ProxyShared};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;
use webintercept_core::model::Exchange;
use webintercept_core::wire::{self, ParsedRequest, ParsedResponse};
use webintercept_core::{Error, Result};

pub(crate) async fn handle_connection(shared: Arc<ProxyShared>, stream: TcpStream, peer: SocketAddr) {
    if let Err(err) = run(shared, stream).await {
        debug!(%peer, error = %err, "connection closed");
    }
}

async fn run(shared: Arc<ProxyShared>, stream: TcpStream) -> Result<()> {
    let mut reader = BufReader::new(stream);
    loop {
        let request = match wire::read_request(&mut reader, &shared.limits).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(err) => {
                let status = protocol_error_status(&err);
                let _ = wire::write_simple_response(reader.get_mut(), status, b"").await;
                return Err(err);
            }
        };

        if request.method.eq_ignore_ascii_case("CONNECT") {
            return handle_connect(&shared, reader, &request).await;
        }

        let keep_alive = request.wants_keep_alive();
        let may_continue = serve_exchange(&shared, &mut reader, request, "http", None).await?;
        if !keep_alive || !may_continue {
            return Ok(());
        }
    }
}

/// Drive one exchange over any buffered stream (plain socket or decrypted
/// tunnel). Returns whether the connection may serve another request.
async fn serve_exchange<S>(
    shared: &Arc<ProxyShared>,
    reader: &mut BufReader<S>,
    request: ParsedRequest,
    scheme: &str,
    default_host: Option<&str>,
) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    shared.requests_total.fetch_add(1, Ordering::Relaxed);

    let url = match resolve_url(&request, scheme, default_host) {
        Ok(url) => url,
        Err(err) => {
            wire::write_simple_response(reader.get_mut(), 400, b"").await?;
            return Err(err);
        }
    };

    let host = url.host_str().unwrap_or_default().to_string();
    let mut exchange = Exchange::new(
        request.method.clone(),
        url.to_string(),
        host,
        path_with_query(&url),
        url.scheme(),
    );
    exchange.request_headers = request.headers.clone();
    exchange.request_content_type = request.headers.content_type();
    if !request.body.is_empty() {
        exchange.request_body = Some(request.body.clone());
    }

    let rules = shared.repo.list_rules().await.unwrap_or_default();

    // Stage 1: request-side rules.
    let mut draft = RequestDraft {
        method: request.method.clone(),
        url: url.to_string(),
        headers: request.headers.clone(),
        body: request.body.clone(),
    };
    match RuleEngine::apply_request(&rules, &mut draft)? {
        RuleOutcome::Blocked => {
            exchange.modified = true;
            exchange.response_status = Some(403);
            wire::write_simple_response(reader.get_mut(), 403, b"").await?;
            record(shared, exchange).await;
            return Ok(true);
        }
        RuleOutcome::Continue { modified } => {
            if modified {
                exchange.modified = true;
                sync_request_side(&mut exchange, &draft);
            }
        }
    }

    // Stage 2: operator hold on the request.
    if shared.intercept_enabled.load(Ordering::Relaxed) {
        shared.requests_intercepted.fetch_add(1, Ordering::Relaxed);
        exchange.intercepted = true;

        let intercept_id = Uuid::new_v4();
        let receiver = shared.intercepts.register(intercept_id);
        shared.events.intercept(json!({
            "intercept_id": intercept_id,
            "exchange_id": exchange.id,
            "phase": "request",
            "method": draft.method,
            "url": draft.url,
            "headers": draft.headers,
            "body_b64": BASE64.encode(&draft.body),
        }));

        let timeout = Duration::from_secs(shared.config.intercept_timeout_secs);
        match await_decision(&shared.intercepts, intercept_id, receiver, timeout).await {
            InterceptDecision::Forward => {}
            InterceptDecision::ForwardModified { headers, body, .. } => {
                if let Some(headers) = headers {
                    draft.headers = headers;
                }
                if let Some(body) = body {
                    draft.body = body;
                }
                exchange.modified = true;
                sync_request_side(&mut exchange, &draft);
            }
            InterceptDecision::Drop => {
                exchange.response_status = Some(502);
                exchange.error = Some("dropped by operator".to_string());
                wire::write_simple_response(reader.get_mut(), 502, b"").await?;
                record(shared, exchange).await;
                return Ok(true);
            }
        }
    }

    // Forward upstream.
    let forwarded = match shared
        .client
        .send(&draft.method, &draft.url, &draft.headers, Some(&draft.body))
        .await
    {
        Ok(forwarded) => forwarded,
        Err(err) => {
            let status = error_status(&err);
            exchange.response_status = Some(status);
            exchange.error = Some(err.to_string());
            wire::write_simple_response(reader.get_mut(), status, b"").await?;
            record(shared, exchange).await;
            return Ok(true);
        }
    };

    let mut response = ResponseDraft {
        status: forwarded.status,
        headers: forwarded.headers,
        body: forwarded.body,
    };

    // Response-side rules.
    match RuleEngine::apply_response(&rules, &mut response)? {
        RuleOutcome::Blocked => {
            exchange.modified = true;
            response = ResponseDraft {
                status: 403,
                headers: Default::default(),
                body: Vec::new(),
            };
        }
        RuleOutcome::Continue { modified } => {
            if modified {
                exchange.modified = true;
            }
        }
    }

    // Response-side operator hold.
    if shared.intercept_enabled.load(Ordering::Relaxed) {
        exchange.intercepted = true;
        let intercept_id = Uuid::new_v4();
        let receiver = shared.intercepts.register(intercept_id);
        shared.events.intercept(json!({
            "intercept_id": intercept_id,
            "exchange_id": exchange.id,
            "phase": "response",
            "url": draft.url,
            "status": response.status,
            "headers": response.headers,
            "body_b64": BASE64.encode(&response.body),
        }));

        let timeout = Duration::from_secs(shared.config.intercept_timeout_secs);
        match await_decision(&shared.intercepts, intercept_id, receiver, timeout).await {
            InterceptDecision::Forward => {}
            InterceptDecision::ForwardModified {
                headers,
                body,
                status,
            } => {
                if let Some(headers) = headers {
                    response.headers = headers;
                }
                if let Some(body) = body {
                    response.body = body;
                }
                if let Some(status) = status {
                    response.status = status;
                }
                exchange.modified = true;
            }
            InterceptDecision::Drop => {
                exchange.error = Some("response dropped by operator".to_string());
                record(shared, exchange).await;
                // Closing without a response is the drop semantics for the
                // response side.
                return Ok(false);
            }
        }
    }

    exchange.response_status = Some(response.status);
    exchange.response_content_type = response.headers.content_type();
    exchange.response_headers = Some(response.headers.clone());
    exchange.duration_ms = Some(forwarded.duration_ms);
    if !response.body.is_empty() {
        exchange.response_body = Some(response.body.clone());
    }

    let parsed = ParsedResponse {
        version: "HTTP/1.1".to_string(),
        status: response.status,
        reason: String::new(),
        headers: response.headers,
        body: response.body,
    };
    wire::write_response(reader.get_mut(), &parsed).await?;

    record(shared, exchange).await;
    Ok(true)
}

async fn handle_connect(
    shared: &Arc<ProxyShared>,
    reader: BufReader<TcpStream>,
    request: &ParsedRequest,
) -> Result<()> {
    shared.requests_total.fetch_add(1, Ordering::Relaxed);

    let (host, port) = split_authority(&request.target)?;
    let mut stream = reader.into_inner();

    if let Some(authority) = shared.authority.as_ref().filter(|_| shared.config.tls_mitm) {
        // Variant A: terminate TLS with a forged identity and treat each
        // decrypted request as a plain exchange.
        let identity = match authority.identity_for(&host) {
            Ok(identity) => identity,
            Err(err) => {
                let _ = wire::write_simple_response(&mut stream, 502, b"").await;
                return Err(err);
            }
        };
        stream.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n").await?;

        let acceptor = TlsAcceptor::from(identity.server_config.clone());
        let tls = acceptor
            .accept(stream)
            .await
            .map_err(|err| Error::protocol(format!("client TLS handshake failed: {err}")))?;

        let mut tls_reader = BufReader::new(tls);
        loop {
            let inner = match wire::read_request(&mut tls_reader, &shared.limits).await {
                Ok(Some(inner)) => inner,
                Ok(None) => return Ok(()),
                Err(err) => {
                    let status = protocol_error_status(&err);
                    let _ = wire::write_simple_response(tls_reader.get_mut(), status, b"").await;
                    return Err(err);
                }
            };
            let keep_alive = inner.wants_keep_alive();
            let may_continue =
                serve_exchange(shared, &mut tls_reader, inner, "https", Some(&host)).await?;
            if !keep_alive || !may_continue {
                return Ok(());
            }
        }
    }

    // Variant B: opaque passthrough. Only a synthetic CONNECT exchange is
    // recorded; the tunnel bytes are invisible.
    let exchange = Exchange::connect_tunnel(&host, port);
    record(shared, exchange).await;

    match TcpStream::connect((host.as_str(), port)).await {
        Ok(mut upstream) => {
            stream.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n").await?;
            let _ = tokio::io::copy_bidirectional(&mut stream, &mut upstream).await;
            Ok(())
        }
        Err(err) => {
            let _ = wire::write_simple_response(&mut stream, 502, b"").await;
            Err(Error::upstream(format!("CONNECT to {host}:{port} failed: {err}")))
        }
    }
}

/// Resolve the request target to an absolute URL. Proxy requests arrive in
/// absolute-form; tunnelled requests are origin-form plus a Host header.
fn resolve_url(request: &ParsedRequest, scheme: &str, default_host: Option<&str>) -> Result<Url> {
    if request.target.starts_with("http://") || request.target.starts_with("https://") {
        return Ok(Url::parse(&request.target)?);
    }
    let host = request
        .headers
        .get("host")
        .or(default_host)
        .ok_or_else(|| Error::protocol("no host for origin-form request target"))?;
    Ok(Url::parse(&format!("{scheme}://{host}{}", request.target))?)
}

fn path_with_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

fn split_authority(target: &str) -> Result<(String, u16)> {
    match target.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| Error::protocol(format!("malformed CONNECT target: {target}")))?;
            Ok((host.to_string(), port))
        }
        None => Ok((target.to_string(), 443)),
    }
}

/// Persist and announce an exchange. Repository failures are logged, never
/// propagated: a storage hiccup must not take the connection down.
async fn record(shared: &Arc<ProxyShared>, exchange: Exchange) {
    let summary = json!({
        "id": exchange.id,
        "timestamp": exchange.timestamp,
        "method": exchange.method,
        "url": exchange.url,
        "host": exchange.host,
        "path": exchange.path,
        "response_status": exchange.response_status,
        "duration_ms": exchange.duration_ms,
        "intercepted": exchange.intercepted,
        "modified": exchange.modified,
    });
    if let Err(err) = shared.repo.put_exchange(exchange).await {
        warn!(error = %err, "failed to persist exchange");
        return;
    }
    shared.events.new_request(summary);
}

fn sync_request_side(exchange: &mut Exchange, draft: &RequestDraft) {
    exchange.method = draft.method.clone();
    exchange.url = draft.url.clone();
    if let Ok(url) = Url::parse(&draft.url) {
        exchange.host = url.host_str().unwrap_or_default().to_string();
        exchange.path = path_with_query(&url);
        exchange.scheme = url.scheme().to_string();
    }
    exchange.request_headers = draft.headers.clone();
    exchange.request_body = if draft.body.is_empty() {
        None
    } else {
        Some(draft.body.clone())
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use webintercept_core::model::HeaderList;

    fn request(target: &str, host: Option<&str>) -> ParsedRequest {
        let mut headers = HeaderList::new();
        if let Some(host) = host {
            headers.append("Host", host);
        }
        ParsedRequest {
            method: "GET".to_string(),
            target: target.to_string(),
            version: "HTTP/1.1".to_string(),
            headers,
            body: Vec::new(),
        }
    }

    #[test]
    fn absolute_form_target_resolves_directly() {
        let url = resolve_url(&request("http://example.test/a?b=1", None), "http", None).unwrap();
        assert_eq!(url.as_str(), "http://example.test/a?b=1");
        assert_eq!(path_with_query(&url), "/a?b=1");
    }

    #[test]
    fn origin_form_uses_host_header_then_default() {
        let url = resolve_url(&request("/x", Some("a.test")), "https", None).unwrap();
        assert_eq!(url.as_str(), "https://a.test/x");

        let url = resolve_url(&request("/x", None), "https", Some("tunnel.test")).unwrap();
        assert_eq!(url.host_str(), Some("tunnel.test"));

        assert!(resolve_url(&request("/x", None), "http", None).is_err());
    }

    #[test]
    fn connect_authority_splits_host_and_port() {
        assert_eq!(
            split_authority("secure.test:8443").unwrap(),
            ("secure.test".to_string(), 8443)
        );
        assert_eq!(split_authority("secure.test").unwrap().1, 443);
        assert!(split_authority("secure.test:nope").is_err());
    }
}
