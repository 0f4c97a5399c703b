//! The on-disk vault directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use securelink::envelope::MasterKey;
use securelink::store::SqliteStore;
use securelink::{Vault, VaultConfig};

pub const APP_NAME: &str = "securelink";
pub const DB_FILE_NAME: &str = "vault.db";
pub const KEY_FILE_NAME: &str = "master.key";

/// Paths of an initialized vault directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    pub root: PathBuf,
}

impl DataDir {
    /// The given directory, or `<data dir>/securelink`.
    pub fn resolve(custom: Option<PathBuf>) -> Result<Self> {
        let root = match custom {
            Some(path) => path,
            None => dirs::data_dir()
                .context("no data directory on this platform; pass --data-dir")?
                .join(APP_NAME),
        };
        Ok(Self { root })
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(DB_FILE_NAME)
    }

    pub fn key_path(&self) -> PathBuf {
        self.root.join(KEY_FILE_NAME)
    }

    pub fn is_initialized(&self) -> bool {
        self.key_path().exists()
    }

    /// Create the directory, a fresh master key and an empty database.
    pub fn init(&self) -> Result<()> {
        if self.is_initialized() {
            bail!("vault already initialized at {}", self.root.display());
        }
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating {}", self.root.display()))?;

        write_secret(&self.key_path(), MasterKey::generate().to_hex().as_bytes())?;
        SqliteStore::open(self.db_path()).context("creating vault database")?;
        Ok(())
    }

    pub fn master_key(&self) -> Result<MasterKey> {
        let path = self.key_path();
        let hex = fs::read_to_string(&path).with_context(|| {
            format!(
                "reading {} (run `securelink init` first)",
                path.display()
            )
        })?;
        MasterKey::from_hex(&hex).with_context(|| format!("parsing {}", path.display()))
    }

    /// Open the vault in this directory.
    pub fn open(&self) -> Result<Vault<SqliteStore>> {
        let master = self.master_key()?;
        let store = SqliteStore::open(self.db_path()).context("opening vault database")?;
        let config = VaultConfig::from_env()?;
        Ok(Vault::new(store, master, config))
    }
}

#[cfg(unix)]
fn write_secret(path: &Path, contents: &[u8]) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_secret(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::resolve(Some(dir.path().join("vault"))).unwrap();

        assert!(!data.is_initialized());
        data.init().unwrap();
        assert!(data.is_initialized());
        assert!(data.db_path().exists());

        let key = data.master_key().unwrap();
        assert_eq!(key.to_hex().len(), 64);
        assert!(data.open().is_ok());
    }

    #[test]
    fn test_init_refuses_to_overwrite_key() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::resolve(Some(dir.path().to_path_buf())).unwrap();

        data.init().unwrap();
        let key = data.master_key().unwrap();

        assert!(data.init().is_err());
        assert_eq!(data.master_key().unwrap(), key);
    }

    #[test]
    fn test_open_without_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::resolve(Some(dir.path().to_path_buf())).unwrap();
        assert!(data.open().is_err());
    }
}
