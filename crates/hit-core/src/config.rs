use std::collections::BTreeMap;
use std::fs;

use serde::{Deserialize, Serialize};

use crate::repo::{Repo, RepoError};
use crate::util::atomic_write;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

/// `.hit/config`. Only `remotes` is interpreted; any other key a foreign
/// tool wrote is carried through a rewrite untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub remotes: BTreeMap<String, Remote>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RemoteConfig {
    pub fn load(repo: &Repo) -> anyhow::Result<Self> {
        let path = repo.config_path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&data)
            .map_err(|err| RepoError::Corrupt(format!("config: {err}")).into())
    }

    pub fn save(&self, repo: &Repo) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        atomic_write(&repo.config_path(), &data)
    }

    pub fn url(&self, name: &str) -> anyhow::Result<&str> {
        self.remotes
            .get(name)
            .map(|remote| remote.url.as_str())
            .ok_or_else(|| RepoError::NotFound(format!("remote '{name}'")).into())
    }
}

pub fn add_remote(repo: &Repo, name: &str, url: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        return Err(RepoError::InvalidArg("remote name cannot be empty".into()).into());
    }
    if !is_valid_remote_url(url) {
        return Err(RepoError::InvalidArg(format!("remote url '{url}'")).into());
    }

    let mut config = RemoteConfig::load(repo)?;
    if config.remotes.contains_key(name) {
        return Err(RepoError::AlreadyExists(format!("remote '{name}'")).into());
    }
    config.remotes.insert(
        name.to_string(),
        Remote {
            name: name.to_string(),
            url: url.to_string(),
        },
    );
    config.save(repo)
}

pub fn remove_remote(repo: &Repo, name: &str) -> anyhow::Result<()> {
    let mut config = RemoteConfig::load(repo)?;
    if config.remotes.remove(name).is_none() {
        return Err(RepoError::NotFound(format!("remote '{name}'")).into());
    }
    config.save(repo)
}

/// http(s) URLs and scp-like `user@host:path` specs are accepted.
fn is_valid_remote_url(url: &str) -> bool {
    if url.starts_with("http://") || url.starts_with("https://") {
        return true;
    }
    if let Some((user, host_path)) = url.split_once('@') {
        return !user.is_empty() && host_path.contains(':');
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Repo) {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        (temp, repo)
    }

    #[test]
    fn add_and_remove_remote() {
        let (_temp, repo) = setup();
        add_remote(&repo, "origin", "https://hit.example.com/me/repo.hit").expect("add");

        let config = RemoteConfig::load(&repo).expect("load");
        assert_eq!(
            config.url("origin").expect("url"),
            "https://hit.example.com/me/repo.hit"
        );

        remove_remote(&repo, "origin").expect("remove");
        let config = RemoteConfig::load(&repo).expect("reload");
        assert!(config.remotes.is_empty());
    }

    #[test]
    fn duplicate_remote_is_rejected() {
        let (_temp, repo) = setup();
        add_remote(&repo, "origin", "https://a.example.com/r").expect("add");
        let err = add_remote(&repo, "origin", "https://b.example.com/r").expect_err("dup");
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::AlreadyExists(_))
        ));
    }

    #[test]
    fn bad_urls_are_rejected() {
        let (_temp, repo) = setup();
        for bad in ["", "ftp://x", "just-words", "@host:path"] {
            let err = add_remote(&repo, "origin", bad).expect_err("bad url");
            assert!(matches!(
                err.downcast_ref::<RepoError>(),
                Some(RepoError::InvalidArg(_))
            ));
        }
        add_remote(&repo, "scp", "git@host.example.com:me/repo").expect("scp form");
    }

    #[test]
    fn unknown_config_keys_survive_rewrite() {
        let (_temp, repo) = setup();
        std::fs::write(
            repo.config_path(),
            br#"{"remotes":{},"editor":"vi","hooks":{"pre":"x"}}"#,
        )
        .expect("write");

        add_remote(&repo, "origin", "https://a.example.com/r").expect("add");

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(repo.config_path()).expect("read"))
                .expect("parse");
        assert_eq!(raw["editor"], "vi");
        assert_eq!(raw["hooks"]["pre"], "x");
        assert!(raw["remotes"]["origin"]["url"].is_string());
    }
}
