use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::api::error::{ApiError, ApiResult};
use crate::integrity::{Digest, HashAlgorithm, StreamingHasher};

/// A file assembled from its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub size: u64,
}

/// Disk layout:
///
/// ```text
/// <root>/chunks/<digest>/<index>      uploaded chunks
/// <root>/files/<digest>/<filename>    merged files
/// ```
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
    algorithm: HashAlgorithm,
}

impl ChunkStore {
    pub async fn open(root: impl Into<PathBuf>, algorithm: HashAlgorithm) -> ApiResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("chunks")).await?;
        fs::create_dir_all(root.join("files")).await?;

        Ok(Self { root, algorithm })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn chunk_dir(&self, digest: &Digest) -> PathBuf {
        self.root.join("chunks").join(digest.as_str())
    }

    fn chunk_path(&self, digest: &Digest, index: u32) -> PathBuf {
        self.chunk_dir(digest).join(index.to_string())
    }

    fn file_dir(&self, digest: &Digest) -> PathBuf {
        self.root.join("files").join(digest.as_str())
    }

    /// Indices stored for `digest`, ascending.
    pub async fn stored_chunks(&self, digest: &Digest) -> ApiResult<Vec<u32>> {
        let mut entries = match fs::read_dir(self.chunk_dir(digest)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut indices = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // In-progress writes end in `.part` and do not parse.
            if let Some(index) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    /// Write one chunk. Re-uploading an index overwrites it.
    pub async fn store_chunk(&self, digest: &Digest, index: u32, data: &[u8]) -> ApiResult<()> {
        let dir = self.chunk_dir(digest);
        fs::create_dir_all(&dir).await?;

        let final_path = self.chunk_path(digest, index);
        let temp_path = dir.join(format!("{index}.part"));

        let mut file = File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        drop(file);

        fs::rename(&temp_path, &final_path).await?;
        Ok(())
    }

    /// Drop a stored chunk. Returns `false` if it was not there.
    pub async fn evict_chunk(&self, digest: &Digest, index: u32) -> ApiResult<bool> {
        match fs::remove_file(self.chunk_path(digest, index)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Assemble chunks `0..total_chunks` into the final file, verify the
    /// digest and remove the chunk directory.
    ///
    /// Merging an already merged digest returns the existing file.
    pub async fn merge(
        &self,
        digest: &Digest,
        filename: &str,
        total_chunks: u32,
    ) -> ApiResult<MergedFile> {
        let file_dir = self.file_dir(digest);
        let final_path = file_dir.join(filename);
        let relative_path = format!("files/{digest}/{filename}");

        let stored = self.stored_chunks(digest).await?;
        if stored.is_empty() {
            if let Ok(metadata) = fs::metadata(&final_path).await {
                return Ok(MergedFile {
                    path: final_path,
                    relative_path,
                    size: metadata.len(),
                });
            }
        }

        let missing: Vec<u32> = (0..total_chunks)
            .filter(|index| stored.binary_search(index).is_err())
            .collect();
        if !missing.is_empty() {
            return Err(ApiError::MissingChunks { missing });
        }

        fs::create_dir_all(&file_dir).await?;
        let temp_path = file_dir.join(format!(".{filename}.part"));

        let mut output = File::create(&temp_path).await?;
        let mut size = 0;
        for index in 0..total_chunks {
            let mut chunk = File::open(self.chunk_path(digest, index)).await?;
            size += tokio::io::copy(&mut chunk, &mut output).await?;
        }
        output.flush().await?;
        drop(output);

        let actual = StreamingHasher::digest_file(self.algorithm, &temp_path)
            .await
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        if &actual != digest {
            fs::remove_file(&temp_path).await?;
            return Err(ApiError::DigestMismatch {
                expected: digest.to_string(),
                actual: actual.to_string(),
            });
        }

        fs::rename(&temp_path, &final_path).await?;
        match fs::remove_dir_all(self.chunk_dir(digest)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(MergedFile {
            path: final_path,
            relative_path,
            size,
        })
    }
}
