pub mod error;
pub mod hasher;
pub mod types;

pub use error::{IntegrityError, IntegrityResult};
pub use hasher::{ContentHasher, StreamingHasher};
pub use types::{Digest, HashAlgorithm};
