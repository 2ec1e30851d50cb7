pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod poller;
pub mod session;
pub mod view;

pub use app::ChartApp;
pub use config::ClientConfig;
pub use error::AppError;
pub use poller::{JobFetcher, Outcome, PollEvent, PollEvents, PollState, Poller};
