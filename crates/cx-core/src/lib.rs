pub mod export;
pub mod job;
pub mod result;

pub use export::{ExportFilter, ExportFormat};
pub use job::{ArtifactKey, Job, JobId, JobStatus};
pub use result::{normalize, series_labels, CanonicalResult, Point, SeriesLabels};
