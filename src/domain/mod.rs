pub mod error;
pub mod model;

pub use error::AppError;
pub use model::{
    Artifact, DownloadPhase, DownloadRequest, FormatCatalog, MediaFormat, ProgressEvent, TaskId,
    TaskStatus, Variant, VariantChoice, VariantKind, VariantSelector,
};
