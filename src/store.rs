//! File-backed persistence for a [`Ledger`].
//!
//! The ledger lives in a single pretty-printed JSON snapshot. A deposit
//! holds `<ledger>.lock` for its whole load/append/commit cycle and commits
//! through a temp file renamed over the original, so the file on disk is
//! always either the previous snapshot or the new one.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{
    identity::Identity,
    ledger::{Ledger, LedgerError, LedgerSnapshot},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("ledger {path} is locked by another writer (remove {lock} if stale)")]
    Locked { path: PathBuf, lock: PathBuf },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed ledger file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the ledger, or an empty one if nothing was ever committed.
    pub fn load(&self) -> Result<Ledger, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no ledger file yet, starting empty");
                return Ok(Ledger::new());
            }
            Err(err) => return Err(StoreError::io(&self.path, err)),
        };
        let snapshot: LedgerSnapshot =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;
        let ledger = Ledger::from_snapshot(snapshot)?;
        debug!(
            path = %self.path.display(),
            total_letters = ledger.total_letters(),
            "ledger loaded"
        );
        Ok(ledger)
    }

    /// Deposits one letter and persists it. On any error the file on disk is
    /// left as it was.
    pub fn deposit(
        &self,
        sender: Identity,
        content: impl Into<String>,
    ) -> Result<u64, StoreError> {
        let _lock = WriteLock::acquire(&self.path)?;
        let mut ledger = self.load()?;
        ledger.deposit(sender, content);
        self.commit(&ledger)?;
        let total = ledger.total_letters();
        info!(%sender, total_letters = total, "letter deposited");
        Ok(total)
    }

    fn commit(&self, ledger: &Ledger) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
        }
        let json = serde_json::to_vec_pretty(&ledger.snapshot()).map_err(|source| {
            StoreError::Json {
                path: self.path.clone(),
                source,
            }
        })?;

        let tmp = sibling(&self.path, "tmp");
        let written = File::create(&tmp).and_then(|mut f| {
            f.write_all(&json)?;
            f.sync_all()
        });
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::io(&tmp, err));
        }
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::io(&self.path, err));
        }
        sync_parent_dir(&self.path)
    }
}

/// Flushes the directory entry so a committed rename survives a crash.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|err| StoreError::io(dir, err))
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Exclusive writer lock, released on drop.
struct WriteLock {
    path: PathBuf,
}

impl WriteLock {
    fn acquire(ledger: &Path) -> Result<Self, StoreError> {
        let path = sibling(ledger, "lock");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                debug!(lock = %path.display(), "write lock acquired");
                Ok(Self { path })
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(StoreError::Locked {
                path: ledger.to_path_buf(),
                lock: path,
            }),
            Err(err) => Err(StoreError::io(&path, err)),
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
