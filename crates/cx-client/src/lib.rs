pub mod client;
pub mod error;
pub mod schemas;
pub mod upload;

pub use client::{ApiClient, ClientOptions, SESSION_COOKIE};
pub use error::{extract_error_message, ApiError};
pub use schemas::{Credentials, Token, User};
pub use upload::{image_dimensions, UploadFile};
