#[allow(clippy::module_inception)]
pub mod coordinator;
pub mod error;
pub mod merge;
pub mod scheduler;
pub mod state_machine;
pub mod types;

pub use coordinator::UploadSessionManager;
pub use error::{UploadError, UploadResult};
pub use merge::MergeCoordinator;
pub use scheduler::ConcurrencyScheduler;
pub use state_machine::UploadStateMachine;
pub use types::{
    ChannelObserver, DrainReport, NoopObserver, UploadEvent, UploadNotification, UploadObserver,
};
