//! Rust client for the FastDFS distributed file storage system.
//!
//! Speaks FastDFS wire protocol v3.08: a tracker cluster locates storage
//! servers, and the client then transacts directly with the chosen storage
//! server for uploads, downloads, metadata, and appender-file operations.
//!
//! # Features
//!
//! - File upload (normal, appender, slave files)
//! - File download (full and partial, to memory or to disk)
//! - File deletion
//! - Metadata get/set (overwrite or merge)
//! - Appender file append / truncate / modify
//! - Cluster introspection (list groups, list storage servers)
//! - Fork-safe, bounded connection pooling
//!
//! # Example
//!
//! ```no_run
//! use fdfs_client::{Client, ClientConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_file("/etc/fdfs/client.conf")?;
//!     let client = Client::new(config)?;
//!
//!     let uploaded = client.upload_by_filename("photo.jpg", None)?;
//!     let file_id = uploaded.file_id();
//!     let downloaded = client.download_to_buffer(&file_id, 0, 0)?;
//!     client.delete_file(&file_id)?;
//!
//!     println!("downloaded {} bytes", downloaded.content.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod client;
mod config;
mod connection;
mod errors;
pub mod protocol;
mod storage;
mod tracker;
pub mod types;

pub use client::Client;
pub use config::ClientConfig;
pub use errors::{FastDfsError, Result};
pub use types::{
    AppendOutcome, DeleteOutcome, DownloadOutcome, GroupInfo, GroupListing, MetaDataOutcome,
    Metadata, MetadataFlag, ModifyOutcome, PayloadSource, ServerListing, StorageCommand,
    StorageInfo, StorageServer, StorageStatus, TrackerCommand, TruncateOutcome, UploadOutcome,
};
