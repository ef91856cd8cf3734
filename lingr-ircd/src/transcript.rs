//! Per-room, per-day chat transcripts.
//!
//! Connections hand entries to a [`TranscriptSink`], which queues them for
//! a single background writer. Recording never waits on disk: when the
//! queue is full the entry is dropped with a warning.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, Timelike};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

const QUEUE_DEPTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub time: DateTime<Local>,
    pub speaker: String,
    pub room: String,
    /// Network label, e.g. `lingr.com`.
    pub network: String,
    pub text: String,
}

impl TranscriptEntry {
    /// `<root>/<year>/<network>/#<room>.<month>-<day>.log`
    pub fn path(&self, root: &Path) -> PathBuf {
        root.join(self.time.year().to_string())
            .join(&self.network)
            .join(format!(
                "#{}.{}-{}.log",
                self.room,
                self.time.month(),
                self.time.day()
            ))
    }

    /// `HH:MM (speaker) text`
    pub fn line(&self) -> String {
        format!(
            "{:02}:{:02} ({}) {}\n",
            self.time.hour(),
            self.time.minute(),
            self.speaker,
            self.text
        )
    }
}

#[derive(Clone)]
pub struct TranscriptSink {
    tx: mpsc::Sender<TranscriptEntry>,
}

impl TranscriptSink {
    /// Start the writer task for transcripts under `root`.
    pub fn spawn(root: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::channel::<TranscriptEntry>(QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(e) = append(&root, &entry).await {
                    tracing::warn!(room = %entry.room, "Transcript write failed: {e}");
                }
            }
        });
        Self { tx }
    }

    pub fn record(&self, entry: TranscriptEntry) {
        if let Err(e) = self.tx.try_send(entry) {
            tracing::warn!("Transcript entry dropped: {e}");
        }
    }
}

async fn append(root: &Path, entry: &TranscriptEntry) -> std::io::Result<()> {
    let path = entry.path(root);
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(entry.line().as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn entry(text: &str) -> TranscriptEntry {
        TranscriptEntry {
            time: Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap(),
            speaker: "bob".to_string(),
            room: "vim".to_string(),
            network: "lingr.com".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn path_and_line_layout() {
        let e = entry("hello");
        assert_eq!(
            e.path(Path::new("/logs")),
            PathBuf::from("/logs/2024/lingr.com/#vim.3-7.log")
        );
        assert_eq!(e.line(), "09:05 (bob) hello\n");
    }

    #[tokio::test]
    async fn sink_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = TranscriptSink::spawn(dir.path().to_path_buf());
        sink.record(entry("one"));
        sink.record(entry("two"));

        let path = entry("").path(dir.path());
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(content) = tokio::fs::read_to_string(&path).await
                && content.lines().count() == 2
            {
                assert_eq!(content, "09:05 (bob) one\n09:05 (bob) two\n");
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "transcript not written");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
