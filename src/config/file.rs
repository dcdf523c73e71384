//! A [`ConfigNode`] bound to a file on disk.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use fs2::FileExt;
use log::debug;

use super::tree::{ConfigNode, ConfigType};
use crate::errors::DataError;

#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    node: ConfigNode,
}

impl ConfigFile {
    /// Load `path`, or start empty when it does not exist yet. Nothing is
    /// written until [`save`](Self::save).
    pub fn load_or_empty(path: impl Into<PathBuf>, kind: ConfigType) -> Result<Self, DataError> {
        let path = path.into();
        let node = match fs::read_to_string(&path) {
            Ok(text) => ConfigNode::parse(kind, &text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigNode::new(kind),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, node })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Discard in-memory state and re-read the file.
    pub fn reload(&mut self) -> Result<(), DataError> {
        let fresh = Self::load_or_empty(self.path.clone(), self.node.kind())?;
        self.node = fresh.node;
        Ok(())
    }

    pub fn save(&self) -> Result<(), DataError> {
        let text = self.node.to_plaintext()?;
        write_file_locked(&self.path, &text)?;
        debug!("Saved {} ({} bytes)", self.path.display(), text.len());
        Ok(())
    }
}

impl Deref for ConfigFile {
    type Target = ConfigNode;

    fn deref(&self) -> &ConfigNode {
        &self.node
    }
}

impl DerefMut for ConfigFile {
    fn deref_mut(&mut self) -> &mut ConfigNode {
        &mut self.node
    }
}

/// Sidecar guarding writes to `path`. The target itself is replaced by
/// rename on every save, so it cannot carry the lock.
pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let base = path.file_name().and_then(|s| s.to_str()).unwrap_or("data");
    path.with_file_name(format!(".{}.lock", base))
}

/// Replace `path` with `content` atomically. Concurrent writers, in this
/// process or another, serialize on the [`lock_path`] sidecar.
pub(crate) fn write_file_locked(path: &Path, content: &str) -> Result<(), DataError> {
    static TMP_COUNTER: AtomicU32 = AtomicU32::new(0);

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let guard = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))?;
    FileExt::lock_exclusive(&guard)?;

    let base = path.file_name().and_then(|s| s.to_str()).unwrap_or("data");
    let (tmp_path, mut tmp) = loop {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = dir.join(format!(".{}.{}-{}.tmp", base, std::process::id(), n));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(tmp) => break (candidate, tmp),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    };
    let written = tmp.write_all(content.as_bytes()).and_then(|_| tmp.sync_all());
    drop(tmp);
    if let Err(e) = written.and_then(|_| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    FileExt::unlock(&guard)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty_and_saves() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("data.json");
        let mut file = ConfigFile::load_or_empty(&path, ConfigType::Json).unwrap();
        assert!(file.get_keys(false).is_empty());
        file.set("previous-handler", "sled");
        file.save().unwrap();

        let reread = ConfigFile::load_or_empty(&path, ConfigType::Json).unwrap();
        assert_eq!(reread.get_string("previous-handler").as_deref(), Some("sled"));
    }

    #[test]
    fn concurrent_saves_leave_one_complete_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.json");
        std::thread::scope(|scope| {
            for writer in 0..8 {
                let path = &path;
                scope.spawn(move || {
                    for round in 0..10 {
                        let mut file = ConfigFile::load_or_empty(path, ConfigType::Json).unwrap();
                        file.set("writer", writer);
                        file.set("round", round);
                        file.set("padding", "x".repeat(4096));
                        file.save().unwrap();
                    }
                });
            }
        });

        let text = fs::read_to_string(&path).unwrap();
        let node = ConfigNode::parse(ConfigType::Json, &text).unwrap();
        assert!(node.get_int("writer").is_some());
        assert_eq!(node.get_int("round"), Some(9));
        assert!(lock_path(&path).exists());

        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{:?}", leftovers);
    }

    #[test]
    fn writer_waits_for_sidecar_lock_holder() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.json");
        write_file_locked(&path, "{\"v\": 1}").unwrap();

        let holder = File::open(lock_path(&path)).unwrap();
        FileExt::lock_exclusive(&holder).unwrap();

        let writer = {
            let path = path.clone();
            std::thread::spawn(move || write_file_locked(&path, "{\"v\": 2}"))
        };
        std::thread::sleep(std::time::Duration::from_millis(150));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"v\": 1}");

        FileExt::unlock(&holder).unwrap();
        writer.join().unwrap().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"v\": 2}");
    }
}
