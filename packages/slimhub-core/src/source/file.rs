//! Plays a local audio file as-is.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::{AudioProvider, ProviderSink, SourceError};
use crate::events::SourceEvent;
use crate::protocol_constants::DEFAULT_READ_CHUNK_BYTES;
use crate::utils::now_millis;

/// Streams the bytes of an already-encoded file. No transcoding happens; the
/// file must be in the format the players were told to expect.
#[derive(Debug, Clone)]
pub struct FileAudioProvider {
    path: PathBuf,
    chunk_bytes: usize,
}

impl FileAudioProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
        }
    }

    #[must_use]
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn title(&self) -> Option<String> {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    }
}

impl AudioProvider for FileAudioProvider {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn run(&mut self, sink: &mut ProviderSink) -> Result<(), SourceError> {
        let mut file = File::open(&self.path).map_err(|source| SourceError::Open {
            path: self.path.display().to_string(),
            source,
        })?;

        let session_id = sink.session_id().to_string();
        sink.emit(SourceEvent::MetadataUpdated {
            session_id: session_id.clone(),
            title: self.title(),
            timestamp: now_millis(),
        });

        let mut buf = vec![0u8; self.chunk_bytes];
        loop {
            let read = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if !sink.deliver(Bytes::copy_from_slice(&buf[..read])) {
                return Ok(());
            }
        }

        sink.emit(SourceEvent::EndOfTrack {
            session_id,
            timestamp: now_millis(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceMessage, SourceWorker};
    use std::io::Write;
    use std::time::Duration;

    async fn collect(worker: &SourceWorker, provider: FileAudioProvider) -> Vec<SourceMessage> {
        let mut feed = worker.start("file-test", Box::new(provider)).unwrap();
        let mut out = Vec::new();
        while let Some(message) = tokio::time::timeout(Duration::from_secs(5), feed.recv())
            .await
            .expect("timed out")
        {
            out.push(message);
        }
        out
    }

    #[tokio::test]
    async fn streams_file_in_chunks() {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(&[7u8; 10]).unwrap();
        file.flush().unwrap();

        let worker = SourceWorker::spawn(8).unwrap();
        let provider = FileAudioProvider::new(file.path()).with_chunk_bytes(4);
        let messages = collect(&worker, provider).await;

        assert!(matches!(
            &messages[0],
            SourceMessage::Event(SourceEvent::MetadataUpdated { title: Some(_), .. })
        ));
        let sizes: Vec<usize> = messages
            .iter()
            .filter_map(|m| match m {
                SourceMessage::Chunk(c) => Some(c.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(matches!(
            messages[messages.len() - 2],
            SourceMessage::Event(SourceEvent::EndOfTrack { .. })
        ));
        assert!(matches!(messages.last(), Some(SourceMessage::Finished)));
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let worker = SourceWorker::spawn(8).unwrap();
        let provider = FileAudioProvider::new(dir.path().join("absent.ogg"));
        let messages = collect(&worker, provider).await;

        assert!(matches!(
            messages.last(),
            Some(SourceMessage::Failed(reason)) if reason.contains("absent.ogg")
        ));
    }
}
