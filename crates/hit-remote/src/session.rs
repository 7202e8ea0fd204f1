use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const SESSION_FILE: &str = ".hit_session";

/// Login credentials persisted in the user's home directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub email: String,
    pub token: String,
}

pub fn session_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot locate home directory"))?;
    Ok(home.join(SESSION_FILE))
}

pub fn load() -> anyhow::Result<Option<Session>> {
    let path = session_path()?;
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let session: Session = serde_json::from_slice(&data)
        .map_err(|err| anyhow::anyhow!("invalid session file {}: {err}", path.display()))?;
    if session.token.is_empty() {
        return Ok(None);
    }
    Ok(Some(session))
}

pub fn save(session: &Session) -> anyhow::Result<()> {
    let data = serde_json::to_vec(session)?;
    fs::write(session_path()?, data)?;
    Ok(())
}

pub fn delete() -> anyhow::Result<()> {
    let path = session_path()?;
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
