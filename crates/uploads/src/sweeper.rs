//! Background scratch deletion.

use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bounded queue feeding a single deletion worker.
///
/// Scratch cleanup is best-effort: scheduling never blocks a request, and
/// a full queue drops the job with a warning. Dropped directories are
/// reclaimed on the next server start or by the operator.
#[derive(Clone)]
pub struct Sweeper {
    tx: mpsc::Sender<PathBuf>,
}

impl Sweeper {
    /// Spawn the deletion worker. The worker exits once every clone of the
    /// returned `Sweeper` has been dropped and the queue drained.
    pub fn spawn(queue_depth: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<PathBuf>(queue_depth.max(1));
        let handle = tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                match tokio::fs::remove_dir_all(&path).await {
                    Ok(()) => {
                        tracing::debug!(path = %path.display(), "removed scratch directory");
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(error) => {
                        tracing::warn!(
                            path = %path.display(),
                            %error,
                            "failed to remove scratch directory"
                        );
                    }
                }
            }
        });
        (Self { tx }, handle)
    }

    /// Queue a directory for deletion.
    pub fn schedule(&self, path: PathBuf) {
        if let Err(e) = self.tx.try_send(path) {
            let path = match &e {
                mpsc::error::TrySendError::Full(p) | mpsc::error::TrySendError::Closed(p) => p,
            };
            tracing::warn!(
                path = %path.display(),
                "deletion queue unavailable, dropping scratch cleanup"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deletes_scheduled_directories() {
        let dir = tempfile::tempdir().unwrap();
        let victim = dir.path().join("scratch-1");
        tokio::fs::create_dir_all(victim.join("nested"))
            .await
            .unwrap();

        let (sweeper, handle) = Sweeper::spawn(4);
        sweeper.schedule(victim.clone());
        drop(sweeper);
        handle.await.unwrap();
        assert!(!victim.exists());
    }

    #[tokio::test]
    async fn missing_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (sweeper, handle) = Sweeper::spawn(4);
        sweeper.schedule(dir.path().join("never-existed"));
        drop(sweeper);
        handle.await.unwrap();
    }
}
