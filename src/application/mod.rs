pub mod download_coordinator;
pub mod progress;
pub mod session;

pub use download_coordinator::{
    fallback_filename, DownloadCoordinator, DownloadEvent, DownloadUpdate,
};
pub use session::{DownloadSession, TerminalReport};
