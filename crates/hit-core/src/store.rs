use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::debug;

use crate::hash::{hash_bytes, ObjectHash};
use crate::repo::{Repo, RepoError};
use crate::util::atomic_write;

/// Content-addressed object store under `.hit/objects/<hh>/<rest>`.
/// Objects are zlib-compressed on disk and immutable once written.
pub struct Store {
    repo: Repo,
}

impl Store {
    pub fn new(repo: Repo) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    /// Hash `content`, persist it compressed, return the hash. Writing an
    /// object that already exists is a no-op.
    pub fn write(&self, content: &[u8]) -> anyhow::Result<ObjectHash> {
        let hash = hash_bytes(content);
        let path = self.object_path(&hash);
        if path.exists() {
            return Ok(hash);
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content)?;
        let compressed = encoder.finish()?;

        atomic_write(&path, &compressed)?;
        debug!(hash = %hash, len = content.len(), "stored object");
        Ok(hash)
    }

    /// Store bytes that are already zlib-compressed (fetched off the wire)
    /// under a caller-supplied hash.
    pub fn write_compressed(&self, hash: &ObjectHash, compressed: &[u8]) -> anyhow::Result<()> {
        let path = self.object_path(hash);
        if path.exists() {
            return Ok(());
        }
        atomic_write(&path, compressed)?;
        Ok(())
    }

    pub fn load(&self, hash: &ObjectHash) -> anyhow::Result<Vec<u8>> {
        let path = self.object_path(hash);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepoError::NotFound(format!("object {hash}")).into());
            }
            Err(err) => return Err(err.into()),
        };

        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut content = Vec::new();
        decoder
            .read_to_end(&mut content)
            .map_err(|err| RepoError::Corrupt(format!("object {hash}: {err}")))?;

        if hash_bytes(&content) != *hash {
            return Err(RepoError::Corrupt(format!("object {hash}: digest mismatch")).into());
        }
        Ok(content)
    }

    pub fn exists(&self, hash: &ObjectHash) -> bool {
        self.object_path(hash).exists()
    }

    pub fn object_path(&self, hash: &ObjectHash) -> PathBuf {
        object_path(&self.repo.objects_dir(), hash)
    }

    /// Enumerate every object hash currently on disk.
    pub fn list_objects(&self) -> anyhow::Result<Vec<ObjectHash>> {
        list_objects(&self.repo.objects_dir())
    }
}

pub fn object_path(objects_dir: &Path, hash: &ObjectHash) -> PathBuf {
    let hex = hash.to_hex();
    let (shard, rest) = hex.split_at(2);
    objects_dir.join(shard).join(rest)
}

pub fn list_objects(objects_dir: &Path) -> anyhow::Result<Vec<ObjectHash>> {
    let mut out = Vec::new();
    if !objects_dir.exists() {
        return Ok(out);
    }
    for shard_entry in fs::read_dir(objects_dir)? {
        let shard_entry = shard_entry?;
        if !shard_entry.file_type()?.is_dir() {
            continue;
        }
        let shard = shard_entry.file_name().to_string_lossy().to_string();
        if shard.len() != 2 {
            continue;
        }
        for file_entry in fs::read_dir(shard_entry.path())? {
            let file_entry = file_entry?;
            if !file_entry.file_type()?.is_file() {
                continue;
            }
            let rest = file_entry.file_name().to_string_lossy().to_string();
            if rest.len() != 38 {
                continue;
            }
            if let Some(hash) = ObjectHash::from_hex(&format!("{shard}{rest}")) {
                out.push(hash);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::Repo;

    fn store() -> (tempfile::TempDir, Store) {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        (temp, Store::new(repo))
    }

    #[test]
    fn write_then_load_roundtrips() {
        let (_temp, store) = store();
        let hash = store.write(b"hello\n").expect("write");
        assert_eq!(hash.to_hex(), "f572d396fae9206628714fb2ce00f72e94f2258f");
        let loaded = store.load(&hash).expect("load");
        assert_eq!(loaded, b"hello\n");
    }

    #[test]
    fn objects_are_sharded_by_hash_prefix() {
        let (temp, store) = store();
        let hash = store.write(b"hello\n").expect("write");
        let hex = hash.to_hex();
        let path = temp
            .path()
            .join(".hit")
            .join("objects")
            .join(&hex[..2])
            .join(&hex[2..]);
        assert!(path.is_file());
    }

    #[test]
    fn rewrite_is_a_noop() {
        let (_temp, store) = store();
        let first = store.write(b"same").expect("write");
        let second = store.write(b"same").expect("rewrite");
        assert_eq!(first, second);
    }

    #[test]
    fn load_missing_object_is_not_found() {
        let (_temp, store) = store();
        let absent = hash_bytes(b"never written");
        let err = store.load(&absent).expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::NotFound(_))
        ));
    }

    #[test]
    fn load_garbage_is_corrupt() {
        let (_temp, store) = store();
        let hash = hash_bytes(b"payload");
        let path = store.object_path(&hash);
        fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
        fs::write(&path, b"not zlib at all").expect("write");
        let err = store.load(&hash).expect_err("should fail");
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::Corrupt(_))
        ));
    }

    #[test]
    fn list_objects_sees_every_write() {
        let (_temp, store) = store();
        let a = store.write(b"a").expect("write");
        let b = store.write(b"b").expect("write");
        let mut listed = store.list_objects().expect("list");
        listed.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(listed, expected);
    }
}
