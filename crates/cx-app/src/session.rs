use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use cx_client::Token;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Login token persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    pub saved_at: DateTime<Utc>,
}

fn bearer() -> String {
    "bearer".to_string()
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the saved session. A missing or unreadable file counts as logged out.
    pub fn load(&self) -> Option<StoredSession> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("could not read session file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(session) if !session.access_token.trim().is_empty() => Some(session),
            Ok(_) => None,
            Err(e) => {
                warn!("ignoring corrupt session file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, token: &Token) -> io::Result<StoredSession> {
        let session = StoredSession {
            access_token: token.access_token.clone(),
            token_type: token.token_type.clone(),
            saved_at: Utc::now(),
        };

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let body = serde_json::to_vec_pretty(&session).map_err(io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, &body)?;
        fs::rename(&tmp, &self.path)?;

        debug!("saved session to {}", self.path.display());
        Ok(session)
    }

    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Writes `body` to a file only the owner can read.
fn write_private(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // mode() only applies on creation; a leftover temp file keeps its old bits
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(body)?;
    file.sync_all()
}
