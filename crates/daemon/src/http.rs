// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal HTTP/1.1 ingestion for tracker webhooks.
//!
//! The tracker treats slow responses as delivery failures, so the
//! acknowledgement is written as soon as the payload parses; all handler
//! work happens afterwards on a supervised task. Anything that is not a
//! reasonable `POST` with a JSON object body is rejected before touching
//! the router.

use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Bodies above this are rejected outright.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// The whole request must arrive within this bound.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// What to answer, and whether a payload made it through.
#[derive(Debug, PartialEq)]
pub enum Ingested {
    /// Ack with `200 ok`; run the handler with this payload.
    Payload(Value),
    BadRequest(&'static str),
    MethodNotAllowed,
}

/// Read and validate one webhook request from `reader`.
pub async fn read_request<R>(reader: &mut BufReader<R>) -> std::io::Result<Ingested>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let method = request_line.split_whitespace().next().unwrap_or("");
    let is_post = method.eq_ignore_ascii_case("POST");

    // Drain headers even for rejected methods so the response is readable.
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok();
            }
        }
    }

    if !is_post {
        return Ok(Ingested::MethodNotAllowed);
    }

    let Some(length) = content_length else {
        return Ok(Ingested::BadRequest("missing content-length"));
    };
    if length > MAX_BODY_BYTES {
        return Ok(Ingested::BadRequest("body too large"));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => return Ok(Ingested::BadRequest("invalid JSON")),
    };
    let well_formed = value.is_object()
        && value.get("type").map(|t| t.is_string()).unwrap_or(false);
    if !well_formed {
        return Ok(Ingested::BadRequest("payload must be an object with a string `type`"));
    }

    Ok(Ingested::Payload(value))
}

/// Write the HTTP response for an ingestion outcome.
pub async fn write_response<W>(writer: &mut W, outcome: &Ingested) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = match outcome {
        Ingested::Payload(_) => {
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".to_string()
        }
        Ingested::BadRequest(reason) => format!(
            "HTTP/1.1 400 Bad Request\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            reason.len(),
            reason
        ),
        Ingested::MethodNotAllowed => {
            "HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 18\r\nConnection: close\r\n\r\nMethod Not Allowed"
                .to_string()
        }
    };
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
