//! Chart API Client
//!
//! Thin typed wrapper over the extraction service's HTTP surface. It shapes
//! requests and responses and turns failures into [`ApiError`]; it holds no
//! job state of its own.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use cx_core::{ExportFilter, ExportFormat, Job, JobId};
use log::{debug, info};
use reqwest::cookie::Jar;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::schemas::{Credentials, Token, User};
use crate::upload::UploadFile;

pub const SESSION_COOKIE: &str = "access_token";

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub token: Option<String>,
}

pub struct ApiClient {
    http: Client,
    base: Url,
    jar: Arc<Jar>,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(options: ClientOptions) -> Result<Self, ApiError> {
        let base = parse_base(&options.base_url)?;
        let jar = Arc::new(Jar::default());

        let http = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(options.timeout)
            .user_agent(concat!("chartex/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let client = Self {
            http,
            base,
            jar,
            token: RwLock::new(None),
        };
        if let Some(token) = options.token {
            client.set_token(token);
        }
        Ok(client)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    /// Installs a session token both as the session cookie and as a bearer header.
    pub fn set_token(&self, token: String) {
        self.jar
            .add_cookie_str(&format!("{SESSION_COOKIE}={token}; Path=/"), &self.base);
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token);
        }
    }

    fn clear_token(&self) {
        if let Ok(mut slot) = self.token.write() {
            *slot = None;
        }
    }

    // --- auth -----------------------------------------------------------

    pub async fn register(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let url = self.endpoint(["auth", "register"]);
        let response = self.send(self.request(Method::POST, url).json(credentials)).await?;
        read_json(response).await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Token, ApiError> {
        let url = self.endpoint(["auth", "login"]);
        let response = self.send(self.request(Method::POST, url).json(credentials)).await?;
        let token: Token = read_json(response).await?;

        info!("logged in as {}", credentials.email);
        self.set_token(token.access_token.clone());
        Ok(token)
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        let url = self.endpoint(["auth", "me"]);
        let response = self.send(self.request(Method::GET, url)).await?;
        read_json(response).await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let url = self.endpoint(["auth", "logout"]);
        let result = self.send(self.request(Method::POST, url)).await;
        self.clear_token();
        result.map(|_| ())
    }

    // --- charts ---------------------------------------------------------

    pub async fn upload(&self, file: &UploadFile) -> Result<Job, ApiError> {
        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(file.mime_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = self.endpoint(["charts", "upload"]);
        let response = self.send(self.request(Method::POST, url).multipart(form)).await?;
        let job: Job = read_json(response).await?;

        info!("uploaded {} as job {}", file.file_name, job.id);
        Ok(job)
    }

    pub async fn get_job(&self, id: JobId) -> Result<Job, ApiError> {
        let response = self.send(self.request(Method::GET, self.job_url(id))).await?;
        read_json(response).await
    }

    pub async fn list_jobs(&self, skip: u32, limit: u32) -> Result<Vec<Job>, ApiError> {
        let url = self.endpoint(["charts"]);
        let request = self
            .request(Method::GET, url)
            .query(&[("skip", skip), ("limit", limit)]);
        let response = self.send(request).await?;
        read_json(response).await
    }

    pub async fn delete_job(&self, id: JobId) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, self.job_url(id))).await?;
        info!("deleted job {}", id);
        Ok(())
    }

    pub async fn artifact(&self, id: JobId, key: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.send(self.request(Method::GET, self.artifact_url(id, key))).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn original(&self, id: JobId) -> Result<Vec<u8>, ApiError> {
        let response = self.send(self.request(Method::GET, self.original_url(id))).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn export(&self, id: JobId, format: ExportFormat) -> Result<String, ApiError> {
        self.export_with(id, format, &ExportFilter::default()).await
    }

    /// Server-side export, optionally limited to one series via `series_id`.
    pub async fn export_with(
        &self,
        id: JobId,
        format: ExportFormat,
        filter: &ExportFilter,
    ) -> Result<String, ApiError> {
        let mut request = self.request(Method::GET, self.export_url(id, format));
        if let Some(series) = &filter.series {
            request = request.query(&[("series_id", series)]);
        }
        let response = self.send(request).await?;
        Ok(response.text().await?)
    }

    // --- urls -----------------------------------------------------------

    pub fn job_url(&self, id: JobId) -> Url {
        self.endpoint(["charts".to_string(), id.to_string()])
    }

    pub fn artifact_url(&self, id: JobId, key: &str) -> Url {
        let id = id.to_string();
        self.endpoint(["charts", id.as_str(), "artifact", key])
    }

    pub fn original_url(&self, id: JobId) -> Url {
        let id = id.to_string();
        self.endpoint(["charts", id.as_str(), "original"])
    }

    pub fn export_url(&self, id: JobId, format: ExportFormat) -> Url {
        self.endpoint([
            "charts".to_string(),
            id.to_string(),
            format!("export.{}", format.extension()),
        ])
    }

    /// Appends percent-encoded path segments to the base URL, keeping its prefix.
    fn endpoint<I>(&self, segments: I) -> Url
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("{} {}", method, url);
        let builder = self.http.request(method, url);
        match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        Ok(response)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

fn parse_base(raw: &str) -> Result<Url, ApiError> {
    let url = Url::parse(raw.trim()).map_err(|e| ApiError::Url(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ApiError::Url(format!("{raw}: expected an http(s) URL")));
    }
    Ok(url)
}
