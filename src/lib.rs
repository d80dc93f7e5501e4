pub mod collection;
pub mod config;
pub mod error;
pub mod http;
pub mod resource;
pub mod resources;
pub mod retry;
pub mod transfer;
pub mod types;

pub use collection::{Collection, ListQuery, PageMode};
pub use config::Config;
pub use error::{ApiError, Error, Result};
pub use http::{Api, ApiBuilder};
pub use resource::{Record, Resource};
pub use transfer::{
    Download, DownloadOptions, Progress, TransferStatus, Upload, UploadOptions, UploadTarget,
};
