use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use cx_client::{ApiClient, ApiError, ClientOptions, Credentials, UploadFile, image_dimensions};
use cx_core::{CanonicalResult, ExportFilter, ExportFormat, Job, JobId, JobStatus, export, normalize, series_labels};
use tracing::{debug, info, warn};

use crate::cli::Command;
use crate::config::ClientConfig;
use crate::error::AppError;
use crate::poller::{JobFetcher, PollEvent, Poller};
use crate::session::SessionStore;
use crate::view::{self, plot};

const PLOT_WIDTH: usize = 64;
const PLOT_HEIGHT: usize = 16;

pub struct ChartApp {
    config: ClientConfig,
    client: Arc<ApiClient>,
    session: SessionStore,
}

impl ChartApp {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let session = SessionStore::new(config.session_file.clone());
        let token = session.load().map(|s| s.access_token);
        debug!(
            "api {} (session {})",
            config.api_url,
            if token.is_some() { "present" } else { "absent" }
        );

        let client = ApiClient::new(ClientOptions {
            base_url: config.api_url.clone(),
            timeout: config.request_timeout,
            token,
        })?;

        Ok(Self {
            config,
            client: Arc::new(client),
            session,
        })
    }

    pub async fn run(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Register { email, password } => self.register(Credentials { email, password }).await,
            Command::Login { email, password } => self.login(Credentials { email, password }).await,
            Command::Logout => self.logout().await,
            Command::Me => self.me().await,
            Command::Upload { file, no_wait } => self.upload(&file, no_wait).await,
            Command::Watch { id } => self.watch(id).await.map(|_| ()),
            Command::Show { id } => self.show(id).await,
            Command::List { skip, limit } => self.list(skip, limit).await,
            Command::Delete { id, yes } => self.delete(id, yes).await,
            Command::Artifact { id, key, output } => self.artifact(id, &key, output).await,
            Command::Original { id, output } => self.original(id, output).await,
            Command::Export {
                id,
                format,
                local,
                series,
                output,
            } => self.export(id, format, local, ExportFilter { series }, output).await,
        }
    }

    /// Turns a 401/403 into a login hint when no session is stored.
    fn api_error(&self, err: ApiError) -> anyhow::Error {
        if err.is_unauthorized() && self.client.token().is_none() {
            return AppError::NotLoggedIn.into();
        }
        AppError::Api(err).into()
    }

    async fn register(&self, credentials: Credentials) -> anyhow::Result<()> {
        let user = self.client.register(&credentials).await.map_err(|e| self.api_error(e))?;
        println!("Registered {} (user #{})", user.email, user.id);
        Ok(())
    }

    async fn login(&self, credentials: Credentials) -> anyhow::Result<()> {
        let token = self.client.login(&credentials).await.map_err(|e| self.api_error(e))?;
        self.session
            .save(&token)
            .with_context(|| format!("saving session to {}", self.session.path().display()))?;
        println!("Logged in as {}", credentials.email);
        Ok(())
    }

    async fn logout(&self) -> anyhow::Result<()> {
        let result = self.client.logout().await;
        self.session
            .clear()
            .with_context(|| format!("removing {}", self.session.path().display()))?;

        if let Err(e) = result {
            warn!("server logout failed: {}", e);
        }
        println!("Logged out");
        Ok(())
    }

    async fn me(&self) -> anyhow::Result<()> {
        let user = self.client.me().await.map_err(|e| self.api_error(e))?;
        let state = if user.is_active { "active" } else { "inactive" };
        println!("#{} {} ({})", user.id, user.email, state);
        Ok(())
    }

    async fn upload(&self, path: &Path, no_wait: bool) -> anyhow::Result<()> {
        let file = UploadFile::from_path(path).await?;
        let job = match self.client.upload(&file).await {
            Ok(job) => job,
            Err(e) => {
                print!("{}", view::failure_alert("Upload failed", &e.to_string()));
                return Err(self.api_error(e));
            }
        };

        print!("{}", view::job_card(&job, Utc::now()));
        if no_wait || job.status.is_terminal() {
            if job.status.is_terminal() {
                self.print_outcome(&job);
            }
            return Ok(());
        }
        self.watch(job.id).await.map(|_| ())
    }

    /// Polls `id` until it finishes, printing status changes. Ctrl-C stops polling.
    pub async fn watch(&self, id: JobId) -> anyhow::Result<Option<Job>> {
        let fetcher: Arc<dyn JobFetcher> = self.client.clone();
        let (mut poller, mut events) = Poller::new(fetcher, self.config.request_timeout);
        poller.start(id, self.config.poll_interval);

        let mut last_status: Option<JobStatus> = None;
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = tokio::signal::ctrl_c() => {
                    poller.stop();
                    println!("Stopped watching job {id}");
                    return Ok(poller.last_snapshot());
                }
            };
            let Some(event) = event else {
                bail!("poller for job {id} went away");
            };

            match event {
                PollEvent::Updated(job) => {
                    if last_status != Some(job.status) {
                        println!("{}  {}", view::status_badge(job.status), job.display_name());
                        last_status = Some(job.status);
                    }
                }
                PollEvent::Done { job, result } => {
                    print!("{}", view::job_card(&job, Utc::now()));
                    self.print_result(&job, &result);
                    return Ok(Some(job));
                }
                PollEvent::PipelineFailed { job, message } => {
                    print!("{}", view::job_card(&job, Utc::now()));
                    print!("{}", view::artifact_list(&job, &self.client));
                    info!("job {} failed in the pipeline", job.id);
                    bail!("processing failed: {message}");
                }
                PollEvent::TransportFailed { message, .. } => {
                    print!("{}", view::failure_alert("Polling stopped", &message));
                    bail!("lost contact with the server while watching job {id}");
                }
            }
        }
    }

    fn print_outcome(&self, job: &Job) {
        if job.status == JobStatus::Done {
            let result = job.result_payload().map(|p| normalize(&p)).unwrap_or_default();
            self.print_result(job, &result);
        } else {
            print!("{}", view::artifact_list(job, &self.client));
        }
    }

    fn print_result(&self, job: &Job, result: &CanonicalResult) {
        print!("{}", view::result_summary(result));
        if !result.is_empty() {
            let labels = job.result_payload().map(|p| series_labels(&p)).unwrap_or_default();
            print!("{}", plot::render_labelled(result, &labels, PLOT_WIDTH, PLOT_HEIGHT));
        }
        print!("{}", view::artifact_list(job, &self.client));
    }

    async fn show(&self, id: JobId) -> anyhow::Result<()> {
        let job = self.client.get_job(id).await.map_err(|e| self.api_error(e))?;
        print!("{}", view::job_card(&job, Utc::now()));
        if job.status.is_terminal() {
            self.print_outcome(&job);
        }
        Ok(())
    }

    async fn list(&self, skip: u32, limit: u32) -> anyhow::Result<()> {
        let jobs = self.client.list_jobs(skip, limit).await.map_err(|e| self.api_error(e))?;
        print!("{}", view::job_table(&jobs));
        Ok(())
    }

    async fn delete(&self, id: JobId, confirmed: bool) -> anyhow::Result<()> {
        if !confirmed {
            return Err(AppError::DeleteNotConfirmed(id).into());
        }
        self.client.delete_job(id).await.map_err(|e| self.api_error(e))?;
        println!("Deleted job {id}");
        Ok(())
    }

    async fn artifact(&self, id: JobId, key: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
        let bytes = self.client.artifact(id, key).await.map_err(|e| self.api_error(e))?;
        let path = output.unwrap_or_else(|| PathBuf::from(format!("chart_{id}_{key}.png").replace('/', "_")));
        save_image(&path, &bytes).await
    }

    async fn original(&self, id: JobId, output: Option<PathBuf>) -> anyhow::Result<()> {
        let bytes = self.client.original(id).await.map_err(|e| self.api_error(e))?;
        let path = output.unwrap_or_else(|| PathBuf::from(format!("chart_{id}_original")));
        save_image(&path, &bytes).await
    }

    async fn export(
        &self,
        id: JobId,
        format: ExportFormat,
        local: bool,
        filter: ExportFilter,
        output: Option<PathBuf>,
    ) -> anyhow::Result<()> {
        let job = self.client.get_job(id).await.map_err(|e| self.api_error(e))?;
        if !job.can_export() {
            return Err(AppError::NotExportable(id).into());
        }

        let body = if local {
            let result = job.result_payload().map(|p| normalize(&p)).unwrap_or_default();
            if let Some(series) = &filter.series {
                if result.get(series).is_none() {
                    warn!("job {} has no series '{}'", id, series);
                }
            }
            export::render(&result, format, &filter)
        } else {
            self.client
                .export_with(id, format, &filter)
                .await
                .map_err(|e| self.api_error(e))?
        };

        let path = output.unwrap_or_else(|| PathBuf::from(export::default_filename(id, format, local)));
        if path.as_os_str() == "-" {
            print!("{body}");
            return Ok(());
        }

        tokio::fs::write(&path, body.as_bytes())
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Saved {} ({})", path.display(), format.mime());
        Ok(())
    }
}

async fn save_image(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    match image_dimensions(bytes) {
        Some((w, h)) => println!("Saved {} ({}x{}, {} bytes)", path.display(), w, h, bytes.len()),
        None => println!("Saved {} ({} bytes)", path.display(), bytes.len()),
    }
    Ok(())
}
