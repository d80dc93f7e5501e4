//! Multipart transfer engines and their shared lifecycle machinery.

mod control;
pub mod download;
mod handle;
mod part;
mod pool;
mod status;
pub mod upload;
mod window;

pub use control::Progress;
pub use download::{Download, DownloadOptions};
pub use handle::TransferHandle;
pub use part::{Part, partition};
pub use pool::TransferPool;
pub use status::TransferStatus;
pub use upload::{Upload, UploadOptions, UploadTarget};

const MIB: u64 = 1024 * 1024;

/// Smallest part the storage service accepts.
pub const MIN_PART_SIZE: u64 = 5 * MIB;
pub const DEFAULT_PART_SIZE: u64 = 32 * MIB;
/// Largest file an upload accepts (5 TiB, inclusive).
pub const MAX_TOTAL_SIZE: u64 = 5 * 1024 * 1024 * MIB;
/// Parts of a single transfer in flight at once.
pub const PARTS_IN_FLIGHT: usize = 4;
/// Buffer size for streaming part bodies to disk.
pub const CHUNK_SIZE: usize = 32 * 1024;
