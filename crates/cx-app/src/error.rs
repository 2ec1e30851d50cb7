use cx_client::ApiError;
use cx_core::JobId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Config {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("no configuration directory available; set CHARTEX_SESSION_FILE")]
    NoConfigDir,
    #[error("not logged in; run `chartex login` first")]
    NotLoggedIn,
    #[error("job {0} is not ready for export")]
    NotExportable(JobId),
    #[error("refusing to delete job {0} without --yes")]
    DeleteNotConfirmed(JobId),
    #[error("{0}")]
    Api(#[from] ApiError),
}
