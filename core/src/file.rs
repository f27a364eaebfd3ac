//! The pipeline's unit of data.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt};

/// A live byte source backing [`Contents::Streamed`].
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// File contents: either fully buffered or a live stream.
pub enum Contents {
    /// The whole payload, already in memory.
    Buffered(Vec<u8>),
    /// A reader yielding the payload as it becomes available.
    Streamed(ByteStream),
}

impl Contents {
    /// Wrap any async reader as streamed contents.
    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Contents::Streamed(Box::pin(reader))
    }

    pub fn is_streamed(&self) -> bool {
        matches!(self, Contents::Streamed(_))
    }

    /// Drain the contents into memory.
    pub async fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self {
            Contents::Buffered(bytes) => Ok(bytes),
            Contents::Streamed(mut stream) => {
                let mut bytes = Vec::new();
                stream.read_to_end(&mut bytes).await?;
                Ok(bytes)
            }
        }
    }
}

impl Default for Contents {
    fn default() -> Self {
        Contents::Buffered(Vec::new())
    }
}

impl From<Vec<u8>> for Contents {
    fn from(bytes: Vec<u8>) -> Self {
        Contents::Buffered(bytes)
    }
}

impl From<&str> for Contents {
    fn from(text: &str) -> Self {
        Contents::Buffered(text.as_bytes().to_vec())
    }
}

impl fmt::Debug for Contents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contents::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Contents::Streamed(_) => f.write_str("Streamed(..)"),
        }
    }
}

/// A path plus contents, flowing between pipeline steps.
///
/// `base` is the directory that [`File::relative`] is computed from; it
/// defaults to the file's parent directory.
#[derive(Debug)]
pub struct File {
    pub path: PathBuf,
    pub base: PathBuf,
    pub cwd: PathBuf,
    pub contents: Contents,
}

impl File {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Contents>) -> Self {
        let path = path.into();
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            path,
            base,
            cwd,
            contents: contents.into(),
        }
    }

    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Path relative to [`File::base`], or the full path when it lies outside.
    pub fn relative(&self) -> &Path {
        self.path.strip_prefix(&self.base).unwrap_or(&self.path)
    }

    pub fn basename(&self) -> &str {
        self.path.file_name().and_then(|name| name.to_str()).unwrap_or_default()
    }

    pub fn stem(&self) -> &str {
        self.path.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default()
    }

    /// Extension with its leading dot, or an empty string.
    pub fn extname(&self) -> String {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default()
    }

    pub fn dirname(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}
