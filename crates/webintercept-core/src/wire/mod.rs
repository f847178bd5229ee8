//! HTTP/1.1 wire codec
//!
//! Parses and serialises HTTP/1.1 messages on asynchronous byte streams. The
//! proxy cannot lean on a server framework here: it must capture messages it
//! did not originate and re-emit them byte-faithfully.
//!
//! Framing precedence: `Transfer-Encoding: chunked` wins over
//! `Content-Length`; absent both, a request has no body and a response marked
//! `Connection: close` is read until EOF. Bare LF line endings are tolerated
//! on input; output is always CRLF.

use crate::config::HttpLimits;
use crate::model::HeaderList;
use crate::{Error, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A fully read HTTP/1.1 request
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: String,
    /// Request target exactly as sent: absolute-form for proxy requests,
    /// origin-form inside tunnels
    pub target: String,
    pub version: String,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    /// True when both peers may keep the connection open
    pub fn wants_keep_alive(&self) -> bool {
        match self.headers.get("connection").map(str::to_ascii_lowercase) {
            Some(v) if v.contains("close") => false,
            Some(v) if v.contains("keep-alive") => true,
            _ => self.version == "HTTP/1.1",
        }
    }
}

/// A fully read HTTP/1.1 response
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

/// Read one request off the stream.
///
/// Returns `Ok(None)` on a clean EOF before the first byte (the peer closed
/// an idle keep-alive connection).
pub async fn read_request<R>(reader: &mut R, limits: &HttpLimits) -> Result<Option<ParsedRequest>>
where
    R: AsyncBufRead + Unpin,
{
    let line = match read_line(reader, limits.max_request_line_bytes).await? {
        Some(line) => line,
        None => return Ok(None),
    };
    if line.is_empty() {
        return Err(Error::protocol("empty request line"));
    }

    let mut parts = line.splitn(3, ' ');
    let method = parts
        .next()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| Error::protocol("missing method"))?
        .to_string();
    let target = parts
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::protocol("missing request target"))?
        .to_string();
    let version = parts
        .next()
        .unwrap_or("HTTP/1.0")
        .trim()
        .to_string();

    let headers = read_headers(reader, limits).await?;
    let body = read_body(reader, &headers, limits, false).await?;

    Ok(Some(ParsedRequest {
        method,
        target,
        version,
        headers,
        body,
    }))
}

/// Read one response off the stream.
///
/// `head_request` suppresses body reading for responses to HEAD, and 1xx/204/
/// 304 responses never carry one.
pub async fn read_response<R>(
    reader: &mut R,
    limits: &HttpLimits,
    head_request: bool,
) -> Result<ParsedResponse>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader, limits.max_request_line_bytes)
        .await?
        .ok_or_else(|| Error::protocol("connection closed before status line"))?;

    let mut parts = line.splitn(3, ' ');
    let version = parts
        .next()
        .filter(|v| v.starts_with("HTTP/"))
        .ok_or_else(|| Error::protocol("malformed status line"))?
        .to_string();
    let status: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::protocol("malformed status code"))?;
    let reason = parts.next().unwrap_or("").trim().to_string();

    let headers = read_headers(reader, limits).await?;

    let bodyless = head_request || (100..200).contains(&status) || status == 204 || status == 304;
    let body = if bodyless {
        Vec::new()
    } else {
        read_body(reader, &headers, limits, true).await?
    };

    Ok(ParsedResponse {
        version,
        status,
        reason,
        headers,
        body,
    })
}

/// Serialise a request. `Content-Length` is rewritten to match the body;
/// hop-framing headers are dropped since the body is emitted verbatim.
pub async fn write_request<W>(writer: &mut W, request: &ParsedRequest) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("{} {} {}\r\n", request.method, request.target, request.version).as_bytes())
        .await?;
    write_headers(writer, &request.headers, request.body.len(), !request.body.is_empty()).await?;
    writer.write_all(&request.body).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialise a response with explicit `Content-Length` framing
pub async fn write_response<W>(writer: &mut W, response: &ParsedResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let reason = if response.reason.is_empty() {
        canonical_reason(response.status)
    } else {
        &response.reason
    };
    writer
        .write_all(format!("{} {} {}\r\n", response.version, response.status, reason).as_bytes())
        .await?;
    write_headers(writer, &response.headers, response.body.len(), true).await?;
    writer.write_all(&response.body).await?;
    writer.flush().await?;
    Ok(())
}

/// Write a minimal synthetic response (block/502/504 paths)
pub async fn write_simple_response<W>(writer: &mut W, status: u16, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = ParsedResponse {
        version: "HTTP/1.1".to_string(),
        status,
        reason: canonical_reason(status).to_string(),
        headers: HeaderList::new(),
        body: body.to_vec(),
    };
    write_response(writer, &response).await
}

async fn write_headers<W>(
    writer: &mut W,
    headers: &HeaderList,
    body_len: usize,
    force_length: bool,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut wrote_length = false;
    for (name, value) in headers.iter() {
        if name.eq_ignore_ascii_case("transfer-encoding") {
            continue;
        }
        if name.eq_ignore_ascii_case("content-length") {
            if wrote_length {
                continue;
            }
            writer.write_all(format!("Content-Length: {body_len}\r\n").as_bytes()).await?;
            wrote_length = true;
            continue;
        }
        writer.write_all(format!("{name}: {value}\r\n").as_bytes()).await?;
    }
    if !wrote_length && (force_length || body_len > 0) {
        writer.write_all(format!("Content-Length: {body_len}\r\n").as_bytes()).await?;
    }
    writer.write_all(b"\r\n").await?;
    Ok(())
}

async fn read_headers<R>(reader: &mut R, limits: &HttpLimits) -> Result<HeaderList>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = HeaderList::new();
    let mut total = 0usize;
    loop {
        let line = read_line(reader, limits.max_header_bytes)
            .await?
            .ok_or_else(|| Error::protocol("connection closed inside headers"))?;
        if line.is_empty() {
            return Ok(headers);
        }
        total += line.len() + 2;
        if total > limits.max_header_bytes {
            return Err(Error::protocol("header block exceeds size limit"));
        }
        match line.split_once(':') {
            Some((name, value)) => {
                // Values are trimmed of leading whitespace only.
                headers.append(name.trim_end(), value.trim_start());
            }
            None => return Err(Error::protocol(format!("malformed header line: {line}"))),
        }
    }
}

async fn read_body<R>(
    reader: &mut R,
    headers: &HeaderList,
    limits: &HttpLimits,
    read_to_close: bool,
) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    if headers.is_chunked() {
        return read_chunked_body(reader, limits).await;
    }
    if let Some(length) = headers.content_length() {
        if length > limits.max_body_bytes {
            return Err(Error::protocol("body exceeds size limit"));
        }
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await?;
        return Ok(body);
    }
    if read_to_close
        && headers
            .get("connection")
            .map(|v| v.to_ascii_lowercase().contains("close"))
            .unwrap_or(false)
    {
        let mut body = Vec::new();
        reader
            .take(limits.max_body_bytes as u64 + 1)
            .read_to_end(&mut body)
            .await?;
        if body.len() > limits.max_body_bytes {
            return Err(Error::protocol("body exceeds size limit"));
        }
        return Ok(body);
    }
    Ok(Vec::new())
}

async fn read_chunked_body<R>(reader: &mut R, limits: &HttpLimits) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let line = read_line(reader, limits.max_request_line_bytes)
            .await?
            .ok_or_else(|| Error::protocol("connection closed inside chunked body"))?;
        // Chunk extensions after ';' are ignored.
        let size_str = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| Error::protocol(format!("malformed chunk size: {size_str}")))?;

        if size == 0 {
            // Consume optional trailers up to the blank line.
            loop {
                let trailer = read_line(reader, limits.max_request_line_bytes)
                    .await?
                    .ok_or_else(|| Error::protocol("connection closed inside trailers"))?;
                if trailer.is_empty() {
                    return Ok(body);
                }
            }
        }

        if body.len() + size > limits.max_body_bytes {
            return Err(Error::protocol("body exceeds size limit"));
        }
        let start = body.len();
        body.resize(start + size, 0);
        reader.read_exact(&mut body[start..]).await?;

        // Chunk data is followed by CRLF (or bare LF).
        let mut sep = [0u8; 1];
        reader.read_exact(&mut sep).await?;
        if sep[0] == b'\r' {
            reader.read_exact(&mut sep).await?;
        }
        if sep[0] != b'\n' {
            return Err(Error::protocol("missing chunk terminator"));
        }
    }
}

/// Read a line up to `max` bytes, stripping the terminator. Tolerates bare LF.
/// Returns `None` on EOF before any byte.
async fn read_line<R>(reader: &mut R, max: usize) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if line.is_empty() {
                return Ok(None);
            }
            return Err(Error::protocol("connection closed mid-line"));
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                line.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                if line.len() > max {
                    return Err(Error::protocol("line exceeds size limit"));
                }
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            None => {
                let len = available.len();
                line.extend_from_slice(available);
                reader.consume(len);
                if line.len() > max {
                    return Err(Error::protocol("line exceeds size limit"));
                }
            }
        }
    }
}

/// Canonical reason phrase for common status codes
pub fn canonical_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    fn limits() -> HttpLimits {
        HttpLimits::default()
    }

    async fn parse_request(raw: &[u8]) -> Result<Option<ParsedRequest>> {
        let mut reader = BufReader::new(Cursor::new(raw.to_vec()));
        read_request(&mut reader, &limits()).await
    }

    #[tokio::test]
    async fn parses_simple_get() {
        let request = parse_request(
            b"GET http://example.test/ HTTP/1.1\r\nHost: example.test\r\nAccept: */*\r\n\r\n",
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.target, "http://example.test/");
        assert_eq!(request.version, "HTTP/1.1");
        assert_eq!(request.headers.get("host"), Some("example.test"));
        assert!(request.body.is_empty());
        assert!(request.wants_keep_alive());
    }

    #[tokio::test]
    async fn parses_content_length_body() {
        let request = parse_request(
            b"POST /submit HTTP/1.1\r\nHost: a.test\r\nContent-Length: 5\r\n\r\nhello",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(request.body, b"hello");
    }

    #[tokio::test]
    async fn tolerates_bare_lf_lines() {
        let request = parse_request(b"GET / HTTP/1.1\nHost: a.test\n\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.headers.get("host"), Some("a.test"));
    }

    #[tokio::test]
    async fn eof_before_first_byte_is_none() {
        assert!(parse_request(b"").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunked_wins_over_content_length() {
        let raw = b"POST /u HTTP/1.1\r\nHost: a.test\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let request = parse_request(raw).await.unwrap().unwrap();
        assert_eq!(request.body, b"Wikipedia");
    }

    #[tokio::test]
    async fn chunk_extensions_are_ignored() {
        let raw = b"POST /u HTTP/1.1\r\nHost: a.test\r\nTransfer-Encoding: chunked\r\n\r\n5;ext=1\r\nhello\r\n0\r\n\r\n";
        let request = parse_request(raw).await.unwrap().unwrap();
        assert_eq!(request.body, b"hello");
    }

    #[tokio::test]
    async fn oversize_request_line_is_protocol_error() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat_n(b'a', 9000));
        raw.extend_from_slice(b" HTTP/1.1\r\n\r\n");
        let err = parse_request(&raw).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn oversize_declared_body_is_protocol_error() {
        let mut custom = limits();
        custom.max_body_bytes = 4;
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789";
        let mut reader = BufReader::new(Cursor::new(raw.to_vec()));
        let err = read_request(&mut reader, &custom).await.unwrap_err();
        assert!(err.to_string().contains("body exceeds"));
    }

    #[tokio::test]
    async fn response_round_trip_uses_crlf_and_length() {
        let response = ParsedResponse {
            version: "HTTP/1.1".to_string(),
            status: 200,
            reason: String::new(),
            headers: {
                let mut h = HeaderList::new();
                h.append("Content-Type", "text/plain");
                h.append("Transfer-Encoding", "chunked");
                h
            },
            body: b"hello".to_vec(),
        };

        let mut out = Vec::new();
        write_response(&mut out, &response).await.unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        // Chunked framing never survives serialisation.
        assert!(!text.to_ascii_lowercase().contains("transfer-encoding"));

        let mut reader = BufReader::new(Cursor::new(out));
        let parsed = read_response(&mut reader, &limits(), false).await.unwrap();
        assert_eq!(parsed.status, 200);
        assert_eq!(parsed.body, b"hello");
    }

    #[tokio::test]
    async fn response_read_until_close() {
        let raw = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nstream-until-eof";
        let mut reader = BufReader::new(Cursor::new(raw.to_vec()));
        let parsed = read_response(&mut reader, &limits(), false).await.unwrap();
        assert_eq!(parsed.body, b"stream-until-eof");
    }

    #[tokio::test]
    async fn head_response_has_no_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n";
        let mut reader = BufReader::new(Cursor::new(raw.to_vec()));
        let parsed = read_response(&mut reader, &limits(), true).await.unwrap();
        assert!(parsed.body.is_empty());
    }

    #[tokio::test]
    async fn connection_close_disables_keep_alive() {
        let request = parse_request(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert!(!request.wants_keep_alive());

        let request = parse_request(b"GET / HTTP/1.0\r\n\r\n").await.unwrap().unwrap();
        assert!(!request.wants_keep_alive());
    }

    #[tokio::test]
    async fn duplicate_headers_round_trip_in_order() {
        let request = parse_request(
            b"GET / HTTP/1.1\r\nSet-Thing: one\r\nHost: a.test\r\nSet-Thing: two\r\n\r\n",
        )
        .await
        .unwrap()
        .unwrap();
        let values: Vec<_> = request.headers.get_all("set-thing").collect();
        assert_eq!(values, vec!["one", "two"]);

        let mut out = Vec::new();
        write_request(&mut out, &request).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        let first = text.find("Set-Thing: one").unwrap();
        let second = text.find("Set-Thing: two").unwrap();
        assert!(first < second);
    }
}
