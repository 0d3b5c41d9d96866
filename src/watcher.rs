use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::handler::SavedImage;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s)))
}

/// Polls an output directory and reports images that finished writing.
///
/// A file is reported once its size is unchanged across two polls. Files
/// present when the watcher starts are never reported.
pub struct DirectoryWatcher {
    root: PathBuf,
    interval: Duration,
    seen: HashSet<PathBuf>,
    pending: HashMap<PathBuf, u64>,
}

impl DirectoryWatcher {
    pub async fn new(root: &Path, interval: Duration) -> Result<Self> {
        let existing = scan(root)
            .await
            .with_context(|| format!("Failed to read watch directory: {}", root.display()))?;
        info!(
            "Watching {} ({} existing files skipped)",
            root.display(),
            existing.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            interval,
            seen: existing.into_iter().map(|(path, _)| path).collect(),
            pending: HashMap::new(),
        })
    }

    /// Run one poll; returns newly completed images.
    pub async fn poll(&mut self) -> Result<Vec<PathBuf>> {
        let files = scan(&self.root).await?;
        let mut ready = Vec::new();
        let mut still_pending = HashMap::new();

        // Forget deleted files so a new file under the same name is reported
        let present: HashSet<&PathBuf> = files.iter().map(|(path, _)| path).collect();
        self.seen.retain(|path| present.contains(path));

        for (path, size) in files {
            if self.seen.contains(&path) || !is_supported_image(&path) {
                continue;
            }
            if self.pending.get(&path) == Some(&size) {
                debug!("New image ready: {}", path.display());
                self.seen.insert(path.clone());
                ready.push(path);
            } else {
                still_pending.insert(path, size);
            }
        }

        self.pending = still_pending;
        Ok(ready)
    }

    /// Poll forever, forwarding completed images to `tx`.
    pub async fn run(mut self, tx: mpsc::Sender<SavedImage>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            let ready = match self.poll().await {
                Ok(ready) => ready,
                Err(e) => {
                    warn!("Failed to scan {}: {:#}", self.root.display(), e);
                    continue;
                }
            };
            for path in ready {
                if tx.send(SavedImage::new(path)).await.is_err() {
                    info!("Event receiver closed, stopping watcher");
                    return;
                }
            }
        }
    }
}

/// Recursively list regular files under `root` with their sizes.
async fn scan(root: &Path) -> Result<Vec<(PathBuf, u64)>> {
    let mut files = Vec::new();
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if dir.as_path() == root => return Err(e.into()),
            Err(e) => {
                warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                continue;
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(_) => continue,
            };
            let path = entry.path();
            if file_type.is_dir() {
                dirs.push(path);
            } else if file_type.is_file() {
                let size = match entry.metadata().await {
                    Ok(meta) => meta.len(),
                    Err(_) => continue,
                };
                files.push((path, size));
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported_image() {
        assert!(is_supported_image(Path::new("a.png")));
        assert!(is_supported_image(Path::new("a.JPG")));
        assert!(is_supported_image(Path::new("dir/a.webp")));
        assert!(!is_supported_image(Path::new("a.txt")));
        assert!(!is_supported_image(Path::new("noext")));
    }

    #[tokio::test]
    async fn test_skips_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.png"), b"old").unwrap();

        let mut watcher = DirectoryWatcher::new(dir.path(), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(watcher.poll().await.unwrap().is_empty());
        assert!(watcher.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reports_new_file_once_size_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = DirectoryWatcher::new(dir.path(), Duration::from_millis(10))
            .await
            .unwrap();

        let nested = dir.path().join("txt2img-images").join("2026-10-14");
        std::fs::create_dir_all(&nested).unwrap();
        let file = nested.join("0001-lora x.png");
        std::fs::write(&file, b"partial").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        // First sighting only records the size
        assert!(watcher.poll().await.unwrap().is_empty());

        // Still growing
        std::fs::write(&file, b"partial plus more").unwrap();
        assert!(watcher.poll().await.unwrap().is_empty());

        assert_eq!(watcher.poll().await.unwrap(), vec![file.clone()]);
        assert!(watcher.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recreated_file_is_reported_again() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("00005-lora x.png");
        std::fs::write(&file, b"first").unwrap();

        let mut watcher = DirectoryWatcher::new(dir.path(), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(watcher.seen.contains(&file));

        std::fs::remove_file(&file).unwrap();
        assert!(watcher.poll().await.unwrap().is_empty());
        assert!(watcher.seen.is_empty());

        std::fs::write(&file, b"second").unwrap();
        assert!(watcher.poll().await.unwrap().is_empty());
        assert_eq!(watcher.poll().await.unwrap(), vec![file]);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = DirectoryWatcher::new(&dir.path().join("nope"), Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_forwards_events() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = DirectoryWatcher::new(dir.path(), Duration::from_millis(10))
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let task = tokio::spawn(watcher.run(tx));

        let file = dir.path().join("0002.png");
        std::fs::write(&file, b"done").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.path, file);

        drop(rx);
        task.abort();
    }
}
