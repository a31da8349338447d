//! Smart-HTTP git protocol
//!
//! Serves the stateless-RPC flavour of the git HTTP protocol for a single
//! bare repository by running `git upload-pack` / `git receive-pack`.
//! Paths are relative to the repository (`/info/refs`, `/git-receive-pack`).

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

pub const UPLOAD_PACK: &str = "git-upload-pack";
pub const RECEIVE_PACK: &str = "git-receive-pack";

/// Opaque git protocol handler wrapped by the webhook
#[async_trait]
pub trait GitProtocol: Send + Sync {
    /// Handles one request whose path is relative to the repository
    async fn serve(&self, request: Request<Body>) -> Response;
}

/// [`GitProtocol`] running the local git binary
#[derive(Debug, Clone)]
pub struct GitHttpBackend {
    bin: PathBuf,
    repository: PathBuf,
}

impl GitHttpBackend {
    pub fn new(bin: PathBuf, repository: PathBuf) -> Self {
        Self { bin, repository }
    }

    async fn advertise_refs(&self, service: &str) -> Response {
        let output = Command::new(&self.bin)
            .arg(subcommand(service))
            .args(["--stateless-rpc", "--advertise-refs"])
            .arg(&self.repository)
            .output()
            .await;

        let output = match output {
            Ok(output) if output.status.success() => output.stdout,
            Ok(output) => {
                error!(
                    "{} --advertise-refs failed: {}",
                    service,
                    String::from_utf8_lossy(&output.stderr)
                );
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            Err(e) => {
                error!("Failed to run {}: {}", service, e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let mut body = pkt_line(&format!("# service={service}\n")).into_bytes();
        body.extend_from_slice(b"0000");
        body.extend_from_slice(&output);

        git_response(format!("application/x-{service}-advertisement"), body)
    }

    async fn rpc(&self, service: &str, input: Bytes) -> Response {
        let child = Command::new(&self.bin)
            .arg(subcommand(service))
            .arg("--stateless-rpc")
            .arg(&self.repository)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to run {}: {}", service, e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        // Feed stdin while stdout is drained, git may answer before reading everything
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    warn!("Failed to write git request body: {}", e);
                }
            });
        }

        match child.wait_with_output().await {
            Ok(output) if output.status.success() => {
                debug!("{} served {} bytes", service, output.stdout.len());
                git_response(format!("application/x-{service}-result"), output.stdout)
            }
            Ok(output) => {
                error!(
                    "{} failed: {}",
                    service,
                    String::from_utf8_lossy(&output.stderr)
                );
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Err(e) => {
                error!("Failed to wait for {}: {}", service, e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[async_trait]
impl GitProtocol for GitHttpBackend {
    async fn serve(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path();

        match (&parts.method, path) {
            (&Method::GET, "/info/refs") => {
                let service = parts.uri.query().and_then(service_param);
                match service {
                    Some(service) if is_service(service) => self.advertise_refs(service).await,
                    _ => StatusCode::FORBIDDEN.into_response(),
                }
            }
            (&Method::POST, "/git-upload-pack") | (&Method::POST, "/git-receive-pack") => {
                let service = &path[1..];
                let gzip = parts
                    .headers
                    .get(header::CONTENT_ENCODING)
                    .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"gzip"));

                let input = match axum::body::to_bytes(body, usize::MAX).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Failed to read git request body: {}", e);
                        return StatusCode::BAD_REQUEST.into_response();
                    }
                };
                let input = if gzip {
                    match gunzip(&input) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!("Invalid gzip request body: {}", e);
                            return StatusCode::BAD_REQUEST.into_response();
                        }
                    }
                } else {
                    input
                };

                self.rpc(service, input).await
            }
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }
}

fn subcommand(service: &str) -> &str {
    service.strip_prefix("git-").unwrap_or(service)
}

fn is_service(service: &str) -> bool {
    service == UPLOAD_PACK || service == RECEIVE_PACK
}

fn service_param(query: &str) -> Option<&str> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("service="))
}

fn pkt_line(line: &str) -> String {
    format!("{:04x}{}", line.len() + 4, line)
}

fn gunzip(input: &[u8]) -> std::io::Result<Bytes> {
    let mut decoded = Vec::new();
    GzDecoder::new(input).read_to_end(&mut decoded)?;
    Ok(Bytes::from(decoded))
}

fn git_response(content_type: String, body: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}
