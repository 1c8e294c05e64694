use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use super::error::{ChunkError, Result};
use super::types::ByteRange;

#[derive(Debug, Clone)]
enum Backing {
    Path(PathBuf),
    Memory(Bytes),
}

/// Read-only handle to the bytes of a file submitted for upload.
///
/// Name, size and MIME type are known up front; the content is assumed not
/// to change while the upload runs.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    size: u64,
    mime_type: Option<String>,
    backing: Backing,
}

impl SourceFile {
    /// Open a file on disk. Only metadata is read here.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        Ok(Self {
            name,
            size: metadata.len(),
            mime_type: None,
            backing: Backing::Path(path.to_path_buf()),
        })
    }

    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            mime_type: None,
            backing: Backing::Memory(data),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Lowercased extension including the dot, e.g. `.png`.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Path(path) => Some(path),
            Backing::Memory(_) => None,
        }
    }

    /// Sequential reader over the whole content, used for hashing.
    pub async fn open(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        match &self.backing {
            Backing::Path(path) => Ok(Box::new(File::open(path).await?)),
            Backing::Memory(data) => Ok(Box::new(std::io::Cursor::new(data.clone()))),
        }
    }

    /// Read the bytes of one planned range.
    pub async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
        if range.end > self.size {
            return Err(ChunkError::ShortRead {
                file: self.name.clone(),
                expected: range.end,
                actual: self.size,
            });
        }

        match &self.backing {
            Backing::Memory(data) => Ok(data.slice(range.start as usize..range.end as usize)),
            Backing::Path(path) => {
                let mut file = File::open(path).await?;
                file.seek(std::io::SeekFrom::Start(range.start)).await?;

                let mut buffer = vec![0u8; range.len() as usize];
                let mut filled = 0;
                while filled < buffer.len() {
                    let n = file.read(&mut buffer[filled..]).await?;
                    if n == 0 {
                        return Err(ChunkError::ShortRead {
                            file: self.name.clone(),
                            expected: range.len(),
                            actual: filled as u64,
                        });
                    }
                    filled += n;
                }
                Ok(Bytes::from(buffer))
            }
        }
    }
}
