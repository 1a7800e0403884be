//! Managed transport: hands each request to a remote scraping service.

use super::{Transport, header_map};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::types::{Request, RequestBody, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use std::io;
use std::time::Duration;

/// Fetches pages through a scraping service that runs the request for us
///
/// The service receives a JSON instruction naming the target URL and method
/// and answers with the target's status and body, which are returned as the
/// [`Response`] for the target URL.
pub struct ManagedTransport {
    client: reqwest::Client,
    endpoint: String,
    authorization: String,
    advanced: bool,
    timeout: Duration,
}

impl std::fmt::Debug for ManagedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keep the credential out of logs
        f.debug_struct("ManagedTransport")
            .field("endpoint", &self.endpoint)
            .field("advanced", &self.advanced)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ManagedTransport {
    /// Create a managed transport
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no API key is set.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::config(
                    "managed transport requires a non-empty API key",
                    "transport.api_key",
                )
            })?;

        let authorization = if key.starts_with("Basic ") {
            key.to_string()
        } else {
            format!("Basic {}", key)
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            authorization,
            advanced: config.advanced,
            timeout: config.timeout,
        })
    }

    /// Build the instruction document sent to the service
    pub(crate) fn instruction(&self, request: &Request) -> Value {
        let mut payload = Map::new();
        payload.insert("url".into(), Value::String(request.url.clone()));
        payload.insert(
            "http_method".into(),
            Value::String(request.method.as_str().to_ascii_uppercase()),
        );
        if self.advanced {
            payload.insert("headless".into(), Value::String("html".into()));
        }
        match &request.body {
            Some(RequestBody::Json(value)) => {
                let encoded = STANDARD.encode(spaced_ascii_json(value));
                payload.insert("payload".into(), Value::String(encoded));
            }
            Some(RequestBody::Text(text)) => {
                payload.insert("payload".into(), Value::String(text.clone()));
            }
            None => {}
        }
        Value::Object(payload)
    }
}

/// JSON with `", "` and `": "` separators and every character outside
/// printable ASCII written as a `\uXXXX` escape
struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for c in fragment.chars() {
            if (' '..='~').contains(&c) {
                let mut utf8 = [0u8; 4];
                writer.write_all(c.encode_utf8(&mut utf8).as_bytes())?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Payload bytes in the layout the scraping service's own clients send
fn spaced_ascii_json(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedAsciiFormatter);
    match value.serialize(&mut serializer) {
        Ok(()) => out,
        Err(e) => {
            tracing::warn!(error = %e, "Falling back to compact JSON payload");
            value.to_string().into_bytes()
        }
    }
}

#[async_trait]
impl Transport for ManagedTransport {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            advanced = self.advanced,
            "Managed fetch"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .header("authorization", &self.authorization)
            .timeout(request.timeout.unwrap_or(self.timeout))
            .body(self.instruction(request).to_string())
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, &request.url))?;

        let status = response.status().as_u16();
        if let Some(err) = TransportError::from_status(status, &request.url) {
            tracing::warn!(status, url = %request.url, "Scraping service rejected request");
            return Err(err);
        }

        let headers = header_map(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, &request.url))?;

        Ok(Response {
            url: request.url.clone(),
            status,
            headers,
            body,
        })
    }
}
