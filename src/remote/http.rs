//! HTTP implementation of [`JobService`] using reqwest's blocking client
//!
//! Endpoints:
//! - `POST {base}/upload/` multipart `file` -> asset descriptor
//! - `POST {base}/job/` JSON `{assetId, metadata, callbackUrl?}` -> `{job}`
//! - `GET {base}/job/{id}` -> `{job}`
//! - output links are pre-signed and fetched with a plain GET

use crate::error::{Result, StemflowError};
use crate::remote::metadata::JobMetadata;
use crate::remote::service::JobService;
use crate::remote::types::{Asset, CreateJobRequest, Job, JobEnvelope};
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default service endpoint
pub const DEFAULT_BASE_URL: &str = "https://groovy.audioshake.ai";

/// Limit on establishing a connection, for every request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Limit on the small JSON calls (job creation and status)
const API_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest response body echoed back in error messages
const MAX_ERROR_BODY: usize = 512;

/// Bearer-token client for the separation service
///
/// Uploads and downloads have no overall deadline unless one is set with
/// [`HttpJobService::with_transfer_timeout`]; stems of long inputs can take
/// many minutes to move.
pub struct HttpJobService {
    client: Client,
    base_url: String,
    token: String,
    transfer_timeout: Option<Duration>,
}

impl HttpJobService {
    /// Build a client for `base_url` authenticating with `token`
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(StemflowError::ConfigError(
                "API token is empty. Set AUDIOSHAKE_TOKEN or pass --token".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| StemflowError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            transfer_timeout: None,
        })
    }

    /// Bound each upload and download, body included
    pub fn with_transfer_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn with_transfer_limit(&self, request: RequestBuilder) -> RequestBuilder {
        match self.transfer_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}

/// Turn a non-2xx response into a `Remote` error
fn check_status(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }

    Err(StemflowError::Remote {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T> {
    response.json::<T>().map_err(|e| StemflowError::Remote {
        status: 0,
        url: url.to_string(),
        body: format!("Malformed response: {}", e),
    })
}

impl JobService for HttpJobService {
    fn upload_asset(&self, file_path: &Path) -> Result<Asset> {
        let url = self.url("/upload/");
        // Reading the file up front surfaces unreadable input as an IO error
        let form = multipart::Form::new().file("file", file_path)?;

        debug!("Uploading {} to {}", file_path.display(), url);
        let request = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer())
            .multipart(form);
        let response = self
            .with_transfer_limit(request)
            .send()
            .map_err(|e| StemflowError::transport(&url, e))?;

        parse_json(check_status(response, &url)?, &url)
    }

    fn create_job(
        &self,
        asset_id: &str,
        metadata: &JobMetadata,
        callback_url: Option<&str>,
    ) -> Result<Job> {
        let url = self.url("/job/");
        let body = CreateJobRequest {
            asset_id,
            metadata,
            callback_url,
        };

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer())
            .timeout(API_TIMEOUT)
            .json(&body)
            .send()
            .map_err(|e| StemflowError::transport(&url, e))?;

        let envelope: JobEnvelope = parse_json(check_status(response, &url)?, &url)?;
        Ok(envelope.job)
    }

    fn get_job(&self, job_id: &str) -> Result<Job> {
        let url = self.url(&format!("/job/{}", job_id));
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, self.bearer())
            .timeout(API_TIMEOUT)
            .send()
            .map_err(|e| StemflowError::transport(&url, e))?;

        let envelope: JobEnvelope = parse_json(check_status(response, &url)?, &url)?;
        Ok(envelope.job)
    }

    fn download_asset(&self, link: &str, destination: &Path) -> Result<u64> {
        let response = self
            .with_transfer_limit(self.client.get(link))
            .send()
            .map_err(|e| StemflowError::transport(link, e))?;
        let mut reader = check_status(response, link)?;

        let mut file =
            fs::File::create(destination).map_err(|e| StemflowError::output_error(destination, e))?;

        // Stream to disk in fixed-size chunks
        let mut downloaded: u64 = 0;
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| StemflowError::transport(link, e))?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(&buffer[..bytes_read])
                .map_err(|e| StemflowError::output_error(destination, e))?;

            downloaded += bytes_read as u64;
        }

        file.flush()
            .map_err(|e| StemflowError::output_error(destination, e))?;

        debug!("Downloaded {} bytes to {}", downloaded, destination.display());
        Ok(downloaded)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::TempDir;

    /// Serve one GET whose body arrives in two halves, `stall` apart
    ///
    /// Returns the link and a receiver for the raw request head.
    fn serve_slow_body(body: &'static [u8], stall: Duration) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let link = format!("http://{}/stems/vocals.wav", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut byte = [0u8; 1];
            while !head.ends_with(b"\r\n\r\n") && stream.read(&mut byte).unwrap_or(0) == 1 {
                head.push(byte[0]);
            }
            let _ = tx.send(String::from_utf8_lossy(&head).to_string());

            let (first, second) = body.split_at(body.len() / 2);
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(first);
            let _ = stream.flush();
            thread::sleep(stall);
            let _ = stream.write_all(second);
        });

        (link, rx)
    }

    #[test]
    fn test_rejects_empty_token() {
        let err = HttpJobService::new(DEFAULT_BASE_URL, "  ").err().unwrap();
        assert!(matches!(err, StemflowError::ConfigError(_)));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let service = HttpJobService::new("https://example.test/", "token").unwrap();
        assert_eq!(service.url("/job/abc"), "https://example.test/job/abc");
        assert_eq!(service.bearer(), "Bearer token");
    }

    #[test]
    fn test_download_waits_for_slow_body() {
        let body: &'static [u8] = b"RIFF-stem-bytes-streamed-in-two-halves";
        let (link, requests) = serve_slow_body(body, Duration::from_millis(300));
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("vocals.wav");

        let service = HttpJobService::new("http://127.0.0.1:9", "secret").unwrap();
        assert_eq!(service.transfer_timeout(), None);

        let bytes = service.download_asset(&link, &destination).unwrap();
        assert_eq!(bytes, body.len() as u64);
        assert_eq!(fs::read(&destination).unwrap(), body);

        // Pre-signed links carry their own credentials
        let head = requests.recv().unwrap().to_lowercase();
        assert!(head.starts_with("get /stems/vocals.wav"));
        assert!(!head.contains("authorization"));
    }

    #[test]
    fn test_transfer_timeout_bounds_download() {
        let (link, _requests) =
            serve_slow_body(b"RIFF-stem-bytes-streamed-in-two-halves", Duration::from_secs(2));
        let dir = TempDir::new().unwrap();

        let service = HttpJobService::new("http://127.0.0.1:9", "secret")
            .unwrap()
            .with_transfer_timeout(Some(Duration::from_millis(200)));
        assert_eq!(service.transfer_timeout(), Some(Duration::from_millis(200)));

        let err = service
            .download_asset(&link, &dir.path().join("vocals.wav"))
            .unwrap_err();
        assert!(matches!(err, StemflowError::Remote { status: 0, .. }));
    }

    #[test]
    fn test_upload_missing_file_is_io_error() {
        let service = HttpJobService::new("http://127.0.0.1:9", "token").unwrap();
        let err = service
            .upload_asset(Path::new("/no/such/input.wav"))
            .unwrap_err();
        assert!(matches!(err, StemflowError::Io(_)));
    }
}
