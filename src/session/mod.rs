pub mod admission;
pub mod registry;
pub mod types;

pub use admission::{AcceptFilter, Admission, AdmissionRejection, BeforeUpload};
pub use registry::{CancelRegistry, TaskRegistry};
pub use types::{ChunkState, TaskId, UploadSnapshot, UploadStatus, UploadTask};
