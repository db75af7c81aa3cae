//! Markdown to HTML through a running `pandoc-server`.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RenderSettings;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("renderer at {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },
    #[error("renderer at {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to decode renderer response: {message}")]
    Decode { message: String },
}

/// Turns Markdown source into an HTML fragment.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> Result<String, RenderError>;
}

#[derive(Debug, Serialize)]
struct PandocRequest<'a> {
    text: &'a str,
    from: &'static str,
    to: &'static str,
    #[serde(rename = "toc-depth")]
    toc_depth: u8,
    #[serde(rename = "highlight-style")]
    highlight_style: &'static str,
    #[serde(rename = "html-math-method")]
    html_math_method: &'static str,
    standalone: bool,
}

impl<'a> PandocRequest<'a> {
    fn html(text: &'a str) -> Self {
        Self {
            text,
            from: "markdown",
            to: "html",
            toc_depth: 6,
            highlight_style: "pygments",
            html_math_method: "mathml",
            standalone: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PandocResponse {
    output: String,
    #[serde(default)]
    base64: bool,
    #[serde(default)]
    messages: Vec<PandocMessage>,
}

#[derive(Debug, Deserialize)]
struct PandocMessage {
    #[serde(default)]
    verbosity: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct PandocClient {
    client: Client,
    url: String,
    timeout: Duration,
    retries: usize,
    retry_delay: Duration,
}

impl PandocClient {
    pub fn new(settings: &RenderSettings) -> Result<Self, RenderError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| RenderError::Request {
                url: settings.pandoc_url.clone(),
                message: format!("failed to build HTTP client: {error}"),
            })?;
        Ok(Self {
            client,
            url: settings.pandoc_url.clone(),
            timeout: settings.timeout,
            retries: settings.retries,
            retry_delay: settings.retry_delay,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Readiness probe: `GET /version`.
    pub fn version(&self) -> Result<String, RenderError> {
        let url = format!("{}/version", self.url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|error| self.transport_error(&url, &error))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let version = response.text().map_err(|error| RenderError::Decode {
            message: error.to_string(),
        })?;
        let version = version.trim().to_string();
        info!(url = %self.url, %version, "renderer ready");
        Ok(version)
    }

    fn transport_error(&self, url: &str, error: &reqwest::Error) -> RenderError {
        if error.is_timeout() {
            RenderError::Timeout {
                url: url.to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            RenderError::Request {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    fn backoff(&self, attempt: usize) {
        sleep(self.retry_delay.saturating_mul(attempt as u32 + 1));
    }
}

impl MarkdownRenderer for PandocClient {
    fn render(&self, markdown: &str) -> Result<String, RenderError> {
        let payload = PandocRequest::html(markdown);
        let mut last_error = None::<RenderError>;
        for attempt in 0..=self.retries {
            let response = self
                .client
                .post(&self.url)
                .header("Accept", "application/json")
                .json(&payload)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        last_error = Some(RenderError::Status {
                            url: self.url.clone(),
                            status: status.as_u16(),
                        });
                        // Only server-side failures are worth another attempt.
                        if status.is_server_error() && attempt < self.retries {
                            self.backoff(attempt);
                            continue;
                        }
                        break;
                    }
                    let body = response.text().map_err(|error| RenderError::Decode {
                        message: error.to_string(),
                    })?;
                    return parse_response(&body);
                }
                Err(error) => {
                    last_error = Some(self.transport_error(&self.url, &error));
                    if attempt < self.retries {
                        debug!(attempt, %error, "retrying renderer request");
                        self.backoff(attempt);
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RenderError::Request {
            url: self.url.clone(),
            message: "renderer request failed".to_string(),
        }))
    }
}

/// A `pandoc-server` child started for the duration of a build. The process is
/// killed when this is dropped.
#[derive(Debug)]
pub struct PandocServer {
    child: Child,
    version: String,
}

impl PandocServer {
    /// Spawn `program` and poll `client`'s `/version` every `retry_delay` until
    /// it answers. Gives up when the process exits or the client timeout
    /// elapses.
    pub fn start(program: &Path, client: &PandocClient) -> anyhow::Result<Self> {
        let mut child = Command::new(program)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {}", program.display()))?;
        let started = Instant::now();
        let poll = client.retry_delay.max(Duration::from_millis(10));

        loop {
            match client.version() {
                Ok(version) => {
                    info!(
                        program = %program.display(),
                        elapsed_ms = started.elapsed().as_millis(),
                        "pandoc server started"
                    );
                    return Ok(Self { child, version });
                }
                Err(error) => {
                    if let Some(status) = child
                        .try_wait()
                        .with_context(|| format!("failed to poll {}", program.display()))?
                    {
                        bail!(
                            "{} exited with {status} before becoming ready: {error}",
                            program.display()
                        );
                    }
                    if started.elapsed() >= client.timeout {
                        stop(&mut child);
                        bail!(
                            "{} did not answer at {} within {}s: {error}",
                            program.display(),
                            client.url,
                            client.timeout.as_secs()
                        );
                    }
                    debug!(%error, "waiting for pandoc server");
                    sleep(poll);
                }
            }
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Drop for PandocServer {
    fn drop(&mut self) {
        stop(&mut self.child);
    }
}

fn stop(child: &mut Child) {
    if let Err(error) = child.kill() {
        debug!(%error, "pandoc server already stopped");
    }
    let _ = child.wait();
}

/// Extract the HTML fragment from a pandoc-server JSON response, logging any
/// diagnostics it carries.
fn parse_response(body: &str) -> Result<String, RenderError> {
    let response: PandocResponse =
        serde_json::from_str(body).map_err(|error| RenderError::Decode {
            message: error.to_string(),
        })?;
    for message in &response.messages {
        match message.verbosity.as_str() {
            "ERROR" | "WARNING" => warn!(verbosity = %message.verbosity, "pandoc: {}", message.message),
            _ => debug!(verbosity = %message.verbosity, "pandoc: {}", message.message),
        }
    }
    if response.base64 {
        return Err(RenderError::Decode {
            message: "unexpected base64 output for html target".to_string(),
        });
    }
    Ok(response.output)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_payload_matches_pandoc_server_fields() {
        let payload = serde_json::to_value(PandocRequest::html("# Title")).expect("json");
        assert_eq!(payload["text"], "# Title");
        assert_eq!(payload["to"], "html");
        assert_eq!(payload["toc-depth"], 6);
        assert_eq!(payload["highlight-style"], "pygments");
        assert_eq!(payload["html-math-method"], "mathml");
        assert_eq!(payload["standalone"], false);
    }

    #[test]
    fn parse_response_returns_output() {
        let html = parse_response(
            r#"{"output":"<h1>Title</h1>","base64":false,"messages":[{"verbosity":"WARNING","message":"odd"}]}"#,
        )
        .expect("parse");
        assert_eq!(html, "<h1>Title</h1>");
    }

    #[test]
    fn parse_response_rejects_garbage() {
        let error = parse_response("Pandoc failed").expect_err("must fail");
        assert!(matches!(error, RenderError::Decode { .. }));
    }

    fn unreachable_client() -> PandocClient {
        PandocClient::new(&RenderSettings {
            pandoc_url: "http://127.0.0.1:9/".to_string(),
            timeout: Duration::from_secs(5),
            retries: 0,
            retry_delay: Duration::from_millis(10),
            workers: 1,
        })
        .expect("client")
    }

    #[test]
    fn server_start_reports_missing_program() {
        let error = PandocServer::start(
            Path::new("notesweb-no-such-pandoc-server"),
            &unreachable_client(),
        )
        .expect_err("missing program");
        assert!(error.to_string().contains("failed to start"));
    }

    #[cfg(unix)]
    #[test]
    fn server_start_stops_when_process_exits_early() {
        let error = PandocServer::start(Path::new("true"), &unreachable_client())
            .expect_err("exits");
        assert!(error.to_string().contains("exited with"));
    }

    #[test]
    fn unreachable_renderer_reports_request_error() {
        let client = PandocClient::new(&RenderSettings {
            pandoc_url: "http://127.0.0.1:9/".to_string(),
            timeout: Duration::from_secs(2),
            retries: 0,
            retry_delay: Duration::from_millis(1),
            workers: 1,
        })
        .expect("client");
        let error = client.render("text").expect_err("must fail");
        assert!(matches!(
            error,
            RenderError::Request { .. } | RenderError::Timeout { .. }
        ));
    }
}
