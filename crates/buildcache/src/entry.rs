//! # Cache Entries
//!
//! Sinks that receive a loaded artifact and sources that produce an
//! artifact to store.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Consumer of a loaded artifact
#[async_trait]
pub trait ArtifactReader: Send {
    /// Drain `source` into this sink. Errors fail the load.
    async fn read_from(&mut self, source: &mut (dyn AsyncRead + Send + Unpin)) -> io::Result<()>;
}

/// Producer of an artifact to store
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Exact number of bytes `write_to` will produce
    fn size(&self) -> u64;

    /// Write the artifact into `sink`
    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> io::Result<()>;
}

#[async_trait]
impl ArtifactReader for Vec<u8> {
    async fn read_from(&mut self, source: &mut (dyn AsyncRead + Send + Unpin)) -> io::Result<()> {
        tokio::io::copy(source, self).await?;
        Ok(())
    }
}

/// In-memory artifact
#[derive(Debug, Clone)]
pub struct BytesArtifact(Bytes);

impl BytesArtifact {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }
}

#[async_trait]
impl ArtifactWriter for BytesArtifact {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }

    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> io::Result<()> {
        sink.write_all(&self.0).await
    }
}

/// Writes a loaded artifact to a file.
///
/// Content goes to a sibling temporary file that is renamed into place
/// once fully drained, so a failed load never leaves a partial file.
#[derive(Debug, Clone)]
pub struct FileArtifactReader {
    path: PathBuf,
}

impl FileArtifactReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ArtifactReader for FileArtifactReader {
    async fn read_from(&mut self, source: &mut (dyn AsyncRead + Send + Unpin)) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.temp_path();
        let result = async {
            let mut file = File::create(&temp_path).await?;
            let written = tokio::io::copy(source, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, io::Error>(written)
        }
        .await;

        match result {
            Ok(written) => {
                tokio::fs::rename(&temp_path, &self.path).await?;
                debug!(path = %self.path.display(), bytes = written, "Wrote cache entry to file");
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }
}

/// Reads an artifact to store from a file
#[derive(Debug, Clone)]
pub struct FileArtifactWriter {
    path: PathBuf,
    size: u64,
}

impl FileArtifactWriter {
    /// Open `path`, capturing its size
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self {
            path,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ArtifactWriter for FileArtifactWriter {
    fn size(&self) -> u64 {
        self.size
    }

    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> io::Result<()> {
        use tokio::io::AsyncReadExt;

        // Never send more than the declared length, even if the file grew
        let mut file = File::open(&self.path).await?.take(self.size);
        let copied = tokio::io::copy(&mut file, sink).await?;
        if copied != self.size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{} shrank while being stored: expected {} bytes, read {copied}",
                    self.path.display(),
                    self.size
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "buildcache-entry-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn test_vec_reader_appends() {
        let mut sink = Vec::new();
        let mut source: &[u8] = b"artifact";
        sink.read_from(&mut source).await.unwrap();
        assert_eq!(sink, b"artifact");
    }

    #[tokio::test]
    async fn test_bytes_artifact() {
        let artifact = BytesArtifact::new(vec![1u8, 2, 3]);
        assert_eq!(artifact.size(), 3);
        let mut out: Vec<u8> = Vec::new();
        artifact.write_to(&mut out).await.unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = temp_dir("round-trip");
        let path = dir.join("nested").join("entry.bin");

        let mut reader = FileArtifactReader::new(&path);
        let mut source: &[u8] = b"cached bytes";
        reader.read_from(&mut source).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"cached bytes");
        assert!(!reader.temp_path().exists());

        let writer = FileArtifactWriter::open(&path).await.unwrap();
        assert_eq!(writer.size(), 12);
        let mut out: Vec<u8> = Vec::new();
        writer.write_to(&mut out).await.unwrap();
        assert_eq!(out, b"cached bytes");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_file_reader_failure_leaves_no_file() {
        struct FailingSource;

        impl AsyncRead for FailingSource {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<io::Result<()>> {
                std::task::Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "reset",
                )))
            }
        }

        let dir = temp_dir("failure");
        let path = dir.join("entry.bin");
        let mut reader = FileArtifactReader::new(&path);
        let err = reader.read_from(&mut FailingSource).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(!path.exists());
        assert!(!reader.temp_path().exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_writer_rejects_directory() {
        let dir = temp_dir("dir-writer");
        std::fs::create_dir_all(&dir).unwrap();
        let err = FileArtifactWriter::open(&dir).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
