use futures::future::BoxFuture;
use futures::FutureExt;
use md5::Digest as _;
use tokio::io::AsyncReadExt;

use crate::chunk::SourceFile;
use crate::integrity::error::{IntegrityError, IntegrityResult};
use crate::integrity::types::{Digest, HashAlgorithm};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Computes the whole-file digest used as the resume key.
pub trait ContentHasher: Send + Sync {
    fn algorithm(&self) -> HashAlgorithm;

    fn hash<'a>(&'a self, source: &'a SourceFile) -> BoxFuture<'a, IntegrityResult<Digest>>;
}

enum Incremental {
    Md5(md5::Md5),
    Blake3(Box<blake3::Hasher>),
}

impl Incremental {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Incremental::Md5(md5::Md5::new()),
            HashAlgorithm::Blake3 => Incremental::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Incremental::Md5(hasher) => hasher.update(data),
            Incremental::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    fn finalize(self) -> Digest {
        match self {
            Incremental::Md5(hasher) => Digest::from_bytes(&hasher.finalize()),
            Incremental::Blake3(hasher) => Digest::from_bytes(hasher.finalize().as_bytes()),
        }
    }
}

/// Streams a source through the configured algorithm in fixed-size reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingHasher {
    algorithm: HashAlgorithm,
}

impl StreamingHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Digest of an in-memory buffer.
    pub fn digest_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Digest {
        let mut hasher = Incremental::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    /// Digest of a file on disk (streaming).
    pub async fn digest_file(
        algorithm: HashAlgorithm,
        path: &std::path::Path,
    ) -> IntegrityResult<Digest> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Incremental::new(algorithm);
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize())
    }

    async fn hash_source(&self, source: &SourceFile) -> IntegrityResult<Digest> {
        let failed = |reason: String| IntegrityError::HashingFailed {
            file: source.name().to_string(),
            reason,
        };

        let mut reader = source.open().await.map_err(|e| failed(e.to_string()))?;
        let mut hasher = Incremental::new(self.algorithm);
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(|e| failed(e.to_string()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            total += n as u64;
        }

        if total != source.size() {
            return Err(failed(format!(
                "read {total} bytes, expected {}",
                source.size()
            )));
        }

        let digest = hasher.finalize();
        if digest.is_empty() {
            return Err(failed("empty digest".into()));
        }
        Ok(digest)
    }
}

impl ContentHasher for StreamingHasher {
    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn hash<'a>(&'a self, source: &'a SourceFile) -> BoxFuture<'a, IntegrityResult<Digest>> {
        self.hash_source(source).boxed()
    }
}
