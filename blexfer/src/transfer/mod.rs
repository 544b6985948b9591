//! File transfer: chunking, session state and the upload driver.

pub mod chunk;
pub mod session;
pub mod upload;

pub use chunk::{Block, BlockSession, FileType, chunk};
pub use session::{
    Generation, OffsetSession, OffsetSummary, SharedTransferSession, TransferSession,
};
pub use upload::{PackageNumbering, UploadConfig, UploadReport, Uploader};
