//! HTTP client for the note service's wire surface (§6.2): initial
//! revision fetch, delta polling, and note PATCH with retry/backoff.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const BASE_URL: &str = "https://cloud-api.yandex.ru/yadisk_web/v1";
const PATCH_RETRIES: u32 = 3;
const PATCH_BACKOFF_BASE_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum NotesClientError {
    #[error("transient failure after {0} retries: {1}")]
    Transient(u32, String),

    #[error("permanent failure (HTTP {0}): {1}")]
    Permanent(u16, String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
pub struct RevisionResponse {
    pub revision: u64,
}

#[derive(Debug, Deserialize)]
pub struct DeltasResponse {
    pub revision: u64,
    #[serde(default)]
    pub items: Vec<DeltaItem>,
}

#[derive(Debug, Deserialize)]
pub struct DeltaItem {
    #[serde(default)]
    pub changes: Vec<DeltaChange>,
}

#[derive(Debug, Deserialize)]
pub struct DeltaChange {
    pub change_type: String,
    pub record_id: String,
    #[serde(default)]
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Deserialize)]
pub struct FieldChange {
    pub field_id: String,
    pub value: FieldValue,
}

#[derive(Debug, Deserialize)]
pub struct FieldValue {
    #[serde(default)]
    pub string: Option<String>,
}

#[derive(Debug, Serialize)]
struct PatchBody<'a> {
    title: &'a str,
    snippet: &'a str,
}

/// Parse a Netscape-format cookie file (as exported by browser extensions)
/// into a `reqwest::cookie::Jar`. Comment lines (`#`) and blank lines are
/// skipped; malformed lines are skipped with a warning rather than
/// failing the whole load.
pub fn load_netscape_cookie_jar(path: &std::path::Path) -> std::io::Result<reqwest::cookie::Jar> {
    let text = std::fs::read_to_string(path)?;
    let jar = reqwest::cookie::Jar::default();
    let base_url: reqwest::Url = BASE_URL.parse().expect("BASE_URL is a valid URL");

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 7 {
            tracing::warn!(line, "skipping malformed Netscape cookie line");
            continue;
        }
        let name = fields[5];
        let value = fields[6];
        jar.add_cookie_str(&format!("{name}={value}"), &base_url);
    }

    Ok(jar)
}

/// Thin wrapper over one shared `reqwest::Client`, carrying the
/// browser-shaped headers the note service expects.
pub struct NotesClient {
    http: reqwest::Client,
    base_url: String,
}

impl NotesClient {
    pub fn new(cookie_jar: reqwest::cookie::Jar) -> Self {
        Self::with_base_url(cookie_jar, BASE_URL)
    }

    /// Same as `new`, pointed at a different base URL. Exists so tests can
    /// aim this client at a local `wiremock` server instead of the real
    /// note service.
    pub fn with_base_url(cookie_jar: reqwest::cookie::Jar, base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .cookie_provider(std::sync::Arc::new(cookie_jar))
            .user_agent(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/120.0.0.0 Safari/537.36",
            )
            .build()
            .expect("reqwest client builder should not fail with static config");
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Origin", "https://disk.yandex.ru")
            .header("Referer", "https://disk.yandex.ru/")
    }

    pub async fn fetch_revision(&self) -> Result<u64, NotesClientError> {
        let url = format!("{}/data/app/databases/.ext.yanotes@notes", self.base_url);
        let resp: RevisionResponse = self
            .request(self.http.get(&url))
            .send()
            .await?
            .json()
            .await?;
        Ok(resp.revision)
    }

    pub async fn fetch_deltas(
        &self,
        base_revision: u64,
        limit: u32,
    ) -> Result<DeltasResponse, NotesClientError> {
        let url = format!(
            "{}/data/app/databases/.ext.yanotes@notes/deltas?base_revision={base_revision}&limit={limit}",
            self.base_url
        );
        let resp = self.request(self.http.get(&url)).send().await?.json().await?;
        Ok(resp)
    }

    /// Create a note for initial pool provisioning, returning its id. The
    /// service sometimes wraps the created object in a single-element
    /// array rather than returning it bare.
    pub async fn create_note(&self, title: &str) -> Result<String, NotesClientError> {
        #[derive(Serialize)]
        struct CreateBody<'a> {
            title: &'a str,
            snippet: &'a str,
            tags: &'a [&'a str],
        }

        let url = format!("{}/notes/notes", self.base_url);
        let resp = self
            .request(self.http.post(&url))
            .json(&CreateBody {
                title,
                snippet: "",
                tags: &[],
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(NotesClientError::Permanent(
                resp.status().as_u16(),
                resp.text().await.unwrap_or_default(),
            ));
        }

        let body: serde_json::Value = resp.json().await?;
        let obj = match &body {
            serde_json::Value::Array(items) => items.first().unwrap_or(&body),
            other => other,
        };
        obj.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| NotesClientError::Permanent(200, "response missing id".to_string()))
    }

    /// Verify read/write access to a note by performing a harmless PATCH,
    /// mirroring the setup wizard's access check.
    pub async fn check_note_access(&self, note_id: &str) -> bool {
        self.patch_note(note_id, "access_check", "").await.is_ok()
    }

    /// PATCH a note's title/snippet, retrying transient failures with
    /// exponential backoff and jitter. HTTP 4xx is permanent.
    pub async fn patch_note(
        &self,
        note_id: &str,
        title: &str,
        snippet: &str,
    ) -> Result<(), NotesClientError> {
        let url = format!("{}/notes/notes/{note_id}", self.base_url);
        let body = PatchBody { title, snippet };

        let mut attempt = 0;
        loop {
            let result = self
                .request(self.http.patch(&url))
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) if resp.status().is_client_error() => {
                    return Err(NotesClientError::Permanent(
                        resp.status().as_u16(),
                        resp.text().await.unwrap_or_default(),
                    ));
                }
                Ok(resp) => {
                    let status = resp.status();
                    if attempt >= PATCH_RETRIES {
                        return Err(NotesClientError::Transient(
                            attempt,
                            format!("last status: {status}"),
                        ));
                    }
                    backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) if is_network_error(&e) => {
                    if attempt >= PATCH_RETRIES {
                        return Err(NotesClientError::Transient(attempt, e.to_string()));
                    }
                    backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_network_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}

async fn backoff(attempt: u32) {
    let base = PATCH_BACKOFF_BASE_MS * 2u64.pow(attempt);
    let jitter_ms = rand::thread_rng().gen_range(0..=(base / 5));
    tokio::time::sleep(Duration::from_millis(base + jitter_ms)).await;
}
