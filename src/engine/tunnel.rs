//! engine::tunnel
//!
//! Engines that forward work to a remote service over its HTTP API.
//!
//! # Design
//!
//! The destination URI picks the transport. `tcp://host:port` and
//! `http(s)://` URIs are served over plain HTTP(S); socket and SSH
//! transports are rejected when the engine is built, so pre-run fails
//! before the command body runs.
//!
//! An exec is three calls against the compat API:
//!
//! 1. `POST /containers/{id}/exec` creates the exec session
//! 2. `POST /exec/{session}/start` runs it and returns the output
//! 3. `GET /exec/{session}/json` reports the exit code
//!
//! Transport failures become [`EngineError::Connection`] so the CLI can
//! print its connection hint.

use std::io::Write;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    ContainerEngine, EngineError, EngineInfo, EngineMode, EngineOptions, ExecOptions, ExecReport,
    ImageEngine,
};

/// API version prefix for every request.
pub const API_PREFIX: &str = "/v1.41";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = concat!("berth/", env!("CARGO_PKG_VERSION"));

/// Map a destination URI to the HTTP base URL.
pub fn base_url(uri: &str) -> Result<String, EngineError> {
    let trimmed = uri.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("tcp://") {
        return Ok(format!("http://{}", rest));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Ok(trimmed.to_string());
    }
    Err(EngineError::UnsupportedUri(uri.to_string()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExecCreateRequest<'a> {
    cmd: &'a [String],
    env: &'a [String],
    tty: bool,
    attach_stdin: bool,
    attach_stdout: bool,
    attach_stderr: bool,
    privileged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    working_dir: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExecStartRequest {
    detach: bool,
    tty: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExecInspect {
    exit_code: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Split a multiplexed output stream into `(stream, payload)` frames.
///
/// Each frame is an 8-byte header (stream id, three zero bytes, big-endian
/// length) followed by the payload. Returns `None` if `data` is not a
/// well-formed stream.
pub fn demux(data: &[u8]) -> Option<Vec<(u8, &[u8])>> {
    let mut frames = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        if rest.len() < 8 || rest[0] > 2 || rest[1..4] != [0, 0, 0] {
            return None;
        }
        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let end = 8usize.checked_add(len)?;
        if rest.len() < end {
            return None;
        }
        frames.push((rest[0], &rest[8..end]));
        rest = &rest[end..];
    }
    Some(frames)
}

fn write_output(data: &[u8], tty: bool) {
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();

    let frames = if tty { None } else { demux(data) };
    let result = match frames {
        Some(frames) => frames.into_iter().try_for_each(|(stream, payload)| {
            if stream == 2 {
                stderr.write_all(payload)
            } else {
                stdout.write_all(payload)
            }
        }),
        None => stdout.write_all(data),
    };
    if let Err(e) = result.and_then(|_| stdout.flush()) {
        tracing::warn!("failed to write exec output: {}", e);
    }
}

/// HTTP client bound to one service.
#[derive(Debug, Clone)]
struct ApiClient {
    client: Client,
    uri: String,
    base: String,
}

impl ApiClient {
    fn new(uri: &str) -> Result<Self, EngineError> {
        let base = base_url(uri)?;
        let client = Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| EngineError::Setup(format!("building http client: {}", e)))?;
        Ok(Self {
            client,
            uri: uri.to_string(),
            base,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base, API_PREFIX, path)
    }

    fn connection_error(&self, e: reqwest::Error) -> EngineError {
        EngineError::Connection {
            uri: self.uri.clone(),
            message: e.to_string(),
        }
    }

    /// Map a non-success response to an error.
    async fn error_response(&self, response: Response, not_found: &str) -> EngineError {
        let status = response.status();
        let message = match response.json::<ApiErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        match status {
            StatusCode::NOT_FOUND => EngineError::NoSuchContainer(not_found.to_string()),
            _ => EngineError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    async fn json<T: for<'de> Deserialize<'de>>(
        &self,
        response: Response,
        not_found: &str,
    ) -> Result<T, EngineError> {
        let status = response.status();
        if !status.is_success() {
            return Err(self.error_response(response, not_found).await);
        }
        response.json().await.map_err(|e| EngineError::Api {
            status: status.as_u16(),
            message: format!("failed to parse response: {}", e),
        })
    }

    async fn ping(&self) -> Result<(), EngineError> {
        let response = self
            .client
            .get(self.url("/_ping"))
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.error_response(response, "").await)
        }
    }
}

/// Container engine for remote mode.
#[derive(Debug, Clone)]
pub struct TunnelContainerEngine {
    api: ApiClient,
}

impl TunnelContainerEngine {
    /// Create the engine. No request is made until the first operation.
    pub fn new(options: &EngineOptions) -> Result<Self, EngineError> {
        if !options.identity.is_empty() {
            tracing::debug!("identity {} ignored for {}", options.identity, options.uri);
        }
        Ok(Self {
            api: ApiClient::new(&options.uri)?,
        })
    }

    /// Check that the service answers.
    pub async fn ping(&self) -> Result<(), EngineError> {
        self.api.ping().await
    }
}

#[async_trait]
impl ContainerEngine for TunnelContainerEngine {
    fn info(&self) -> EngineInfo {
        EngineInfo {
            mode: EngineMode::Tunnel,
            endpoint: self.api.uri.clone(),
        }
    }

    async fn exec(
        &self,
        name_or_id: Option<&str>,
        options: &ExecOptions,
    ) -> Result<ExecReport, EngineError> {
        if options.preserve_fds > 0 {
            return Err(EngineError::RemoteUnsupported("--preserve-fds"));
        }

        let container = match name_or_id {
            Some(id) if !options.latest => id.to_string(),
            _ => return Err(EngineError::RemoteUnsupported("--latest")),
        };

        let request = ExecCreateRequest {
            cmd: &options.cmd,
            env: &options.env,
            tty: options.tty,
            attach_stdin: options.interactive,
            attach_stdout: true,
            attach_stderr: true,
            privileged: options.privileged,
            user: options.user.as_deref(),
            working_dir: options.workdir.as_deref(),
        };
        let response = self
            .api
            .client
            .post(self.api.url(&format!("/containers/{}/exec", container)))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.api.connection_error(e))?;
        let session: IdResponse = self.api.json(response, &container).await?;
        tracing::debug!("exec session {} created in {}", session.id, container);

        let response = self
            .api
            .client
            .post(self.api.url(&format!("/exec/{}/start", session.id)))
            .json(&ExecStartRequest {
                detach: false,
                tty: options.tty,
            })
            .send()
            .await
            .map_err(|e| self.api.connection_error(e))?;
        if !response.status().is_success() {
            return Err(self.api.error_response(response, &container).await);
        }
        let output = response
            .bytes()
            .await
            .map_err(|e| self.api.connection_error(e))?;
        write_output(&output, options.tty);

        let response = self
            .api
            .client
            .get(self.api.url(&format!("/exec/{}/json", session.id)))
            .send()
            .await
            .map_err(|e| self.api.connection_error(e))?;
        let inspect: ExecInspect = self.api.json(response, &container).await?;

        Ok(ExecReport {
            exit_code: inspect.exit_code.unwrap_or(0),
        })
    }

    async fn setup_rootless(&self, _no_move_process: bool) -> Result<(), EngineError> {
        Ok(())
    }

    async fn shutdown(&self, _force: bool) -> Result<(), EngineError> {
        tracing::debug!("closing connection to {}", self.api.uri);
        Ok(())
    }
}

/// Image engine for remote mode.
#[derive(Debug, Clone)]
pub struct TunnelImageEngine {
    uri: String,
}

impl TunnelImageEngine {
    /// Create the engine.
    pub fn new(options: &EngineOptions) -> Result<Self, EngineError> {
        base_url(&options.uri)?;
        Ok(Self {
            uri: options.uri.clone(),
        })
    }
}

#[async_trait]
impl ImageEngine for TunnelImageEngine {
    fn info(&self) -> EngineInfo {
        EngineInfo {
            mode: EngineMode::Tunnel,
            endpoint: self.uri.clone(),
        }
    }

    async fn shutdown(&self, _force: bool) -> Result<(), EngineError> {
        Ok(())
    }
}
