//! Google Drive v3 backend, authenticated as a service account.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use md5::{Digest, Md5};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::remote::{RemoteBlob, RemoteError, RemoteStore};

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const BLOB_FIELDS: &str = "id,name,md5Checksum";
const BOUNDARY: &str = "standfast-upload-boundary";
const TOKEN_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the token actually expires.
const TOKEN_MARGIN_SECS: i64 = 60;

/// The subset of a service account key file we need.
#[derive(Clone, Deserialize)]
pub struct DriveCredentials {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for DriveCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveCredentials")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl DriveCredentials {
    /// Decode a base64-encoded service account JSON key.
    pub fn from_base64(encoded: &str) -> Result<Self, RemoteError> {
        let json = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| RemoteError::Credentials(format!("not base64: {}", e)))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &[u8]) -> Result<Self, RemoteError> {
        serde_json::from_slice(json)
            .map_err(|e| RemoteError::Credentials(format!("not a service account key: {}", e)))
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    value: String,
    expires_at: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    md5_checksum: Option<String>,
}

impl From<DriveFile> for RemoteBlob {
    fn from(file: DriveFile) -> Self {
        RemoteBlob {
            id: file.id,
            name: file.name,
            checksum: file.md5_checksum,
        }
    }
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

pub struct DriveStore {
    client: Client,
    folder_id: String,
    credentials: DriveCredentials,
    key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl DriveStore {
    pub fn new(folder_id: String, credentials: DriveCredentials) -> Result<Self, RemoteError> {
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
            .map_err(|e| RemoteError::Credentials(format!("bad private key: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        Ok(Self {
            client,
            folder_id,
            credentials,
            key,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, RemoteError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - TOKEN_MARGIN_SECS > now {
                return Ok(token.value.clone());
            }
        }

        let claims = Claims {
            iss: &self.credentials.client_email,
            scope: SCOPE,
            aud: &self.credentials.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| RemoteError::Credentials(e.to_string()))?;

        let response = self
            .client
            .post(&self.credentials.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(request_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Auth(format!("token exchange {}: {}", status, body)));
        }

        let token: TokenResponse = response.json().await.map_err(request_error)?;
        debug!("Obtained Drive access token for {}", self.credentials.client_email);
        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: now + token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS),
        });
        Ok(value)
    }

    fn multipart_body(&self, name: &str, bytes: &[u8], mime: &str) -> Vec<u8> {
        let metadata = serde_json::json!({ "name": name, "parents": [self.folder_id] });
        let mut body = Vec::with_capacity(bytes.len() + 512);
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
                b = BOUNDARY,
                m = metadata,
                mime = mime
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }
}

#[async_trait]
impl RemoteStore for DriveStore {
    fn describe(&self) -> String {
        format!("Drive folder {}", self.folder_id)
    }

    fn checksum(&self, bytes: &[u8]) -> String {
        hex::encode(Md5::digest(bytes))
    }

    async fn find(&self, name: &str) -> Result<Vec<RemoteBlob>, RemoteError> {
        let token = self.access_token().await?;
        let query = name_query(name, &self.folder_id);
        let fields = format!("files({})", BLOB_FIELDS);
        let response = self
            .client
            .get(FILES_URL)
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("fields", fields.as_str())])
            .send()
            .await
            .map_err(request_error)?;

        let list: FileList = check(response, name)
            .await?
            .json()
            .await
            .map_err(request_error)?;
        Ok(list.files.into_iter().map(RemoteBlob::from).collect())
    }

    async fn create(&self, name: &str, bytes: &[u8], mime: &str) -> Result<RemoteBlob, RemoteError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", BLOB_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", BOUNDARY),
            )
            .body(self.multipart_body(name, bytes, mime))
            .send()
            .await
            .map_err(request_error)?;

        let file: DriveFile = check(response, name)
            .await?
            .json()
            .await
            .map_err(request_error)?;
        Ok(file.into())
    }

    async fn update(
        &self,
        blob: &RemoteBlob,
        bytes: &[u8],
        mime: &str,
    ) -> Result<RemoteBlob, RemoteError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .patch(format!("{}/{}", UPLOAD_URL, blob.id))
            .bearer_auth(token)
            .query(&[("uploadType", "media"), ("fields", BLOB_FIELDS)])
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(request_error)?;

        let file: DriveFile = check(response, &blob.id)
            .await?
            .json()
            .await
            .map_err(request_error)?;
        Ok(file.into())
    }

    async fn delete(&self, blob: &RemoteBlob) -> Result<(), RemoteError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .delete(format!("{}/{}", FILES_URL, blob.id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(request_error)?;
        check(response, &blob.id).await?;
        Ok(())
    }
}

fn request_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Request(e.to_string())
}

async fn check(response: Response, subject: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, subject, &body))
}

/// Map a failed Drive response onto the remote error taxonomy.
fn classify_status(status: StatusCode, subject: &str, body: &str) -> RemoteError {
    let quota = body.contains("rateLimitExceeded")
        || body.contains("userRateLimitExceeded")
        || body.contains("quotaExceeded")
        || body.contains("storageQuotaExceeded");

    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(subject.to_string()),
        StatusCode::TOO_MANY_REQUESTS => RemoteError::Quota(format!("{}: {}", status, body)),
        StatusCode::FORBIDDEN if quota => RemoteError::Quota(format!("{}: {}", status, body)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteError::Auth(format!("{}: {}", status, body))
        }
        _ => RemoteError::Request(format!("{} for {}: {}", status, subject, body)),
    }
}

/// Drive search query for a live file called `name` directly in `folder_id`.
fn name_query(name: &str, folder_id: &str) -> String {
    format!(
        "name = '{}' and trashed = false and '{}' in parents",
        escape_literal(name),
        escape_literal(folder_id)
    )
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
