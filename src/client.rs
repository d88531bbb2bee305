//! The stateless facade: validates input, resolves a storage endpoint via the
//! tracker, and dispatches the matching storage command.

use std::path::Path;

use bytes::Bytes;

use crate::config::ClientConfig;
use crate::connection::ConnectionPool;
use crate::errors::{FastDfsError, Result};
use crate::protocol;
use crate::storage::StorageClient;
use crate::tracker::TrackerClient;
use crate::types::{
    AppendOutcome, DeleteOutcome, DownloadOutcome, GroupListing, MetaDataOutcome, Metadata,
    MetadataFlag, ModifyOutcome, PayloadSource, ServerListing, StorageServer, TruncateOutcome,
    UploadOutcome,
};

/// Entry point for FastDFS operations.
///
/// Holds one long-lived pool of tracker connections; storage connections are
/// transient, created fresh for each operation after the tracker resolves an
/// endpoint, matching the upstream client's per-operation storage dialog.
pub struct Client {
    tracker_pool: ConnectionPool,
    network_timeout: std::time::Duration,
    storage_max_conns: usize,
}

impl Client {
    /// Builds a client directly from a resolved [`ClientConfig`].
    pub fn new(config: ClientConfig) -> Result<Self> {
        let tracker_addrs: Vec<(String, u16)> = config
            .tracker_hosts
            .iter()
            .map(|h| (h.clone(), config.tracker_port))
            .collect();

        Ok(Client {
            tracker_pool: ConnectionPool::new("Tracker Pool", tracker_addrs, config.network_timeout, config.max_conns),
            network_timeout: config.network_timeout,
            storage_max_conns: if config.max_conns == 0 { 1 } else { config.max_conns },
        })
    }

    /// Loads `client.conf` from `path` and builds a client from it.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(ClientConfig::from_file(path)?)
    }

    fn tracker(&self) -> TrackerClient<'_> {
        TrackerClient::new(&self.tracker_pool)
    }

    fn storage_pool_for(&self, server: &StorageServer) -> ConnectionPool {
        ConnectionPool::new(
            "Storage Pool",
            vec![(server.ip_addr.clone(), server.port)],
            self.network_timeout,
            self.storage_max_conns,
        )
    }

    fn check_file(path: &Path) -> Result<()> {
        let meta = std::fs::metadata(path)
            .map_err(|e| FastDfsError::DataError(format!("{} is not a file: {}", path.display(), e)))?;
        if !meta.is_file() {
            return Err(FastDfsError::DataError(format!("{} is not a regular file", path.display())));
        }
        Ok(())
    }

    fn split_id<'a>(&self, file_id: &'a str) -> Result<(String, String)> {
        protocol::split_file_id(file_id)
            .ok_or_else(|| FastDfsError::DataError(format!("invalid file id: {}", file_id)))
    }

    // ---- upload ----

    /// Uploads a local file as a new, normal file.
    pub fn upload_by_filename(&self, filename: impl AsRef<Path>, metadata: Option<&Metadata>) -> Result<UploadOutcome> {
        let path = filename.as_ref();
        Self::check_file(path)?;
        let ext = protocol::get_file_ext_name(&path.to_string_lossy());
        let server = self.tracker().query_store_without_group()?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, "", &server);
        storage.upload(&PayloadSource::Path(path.to_path_buf()), &ext, None, None, metadata, false)
    }

    /// Uploads an in-memory buffer as a new, normal file.
    pub fn upload_by_buffer(&self, data: Bytes, ext_name: &str, metadata: Option<&Metadata>) -> Result<UploadOutcome> {
        let server = self.tracker().query_store_without_group()?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, "", &server);
        storage.upload(&PayloadSource::Bytes(data), ext_name, None, None, metadata, false)
    }

    /// Uploads a local file as a slave of `master_file_id`, with `prefix_name` inserted
    /// into the generated remote name.
    pub fn upload_slave_by_filename(
        &self,
        filename: impl AsRef<Path>,
        master_file_id: &str,
        prefix_name: &str,
        metadata: Option<&Metadata>,
    ) -> Result<UploadOutcome> {
        let path = filename.as_ref();
        Self::check_file(path)?;
        let (group, master_name) = self.split_id(master_file_id)?;
        let ext = protocol::get_file_ext_name(&path.to_string_lossy());
        let server = self.tracker().query_store_with_group(&group)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.upload(&PayloadSource::Path(path.to_path_buf()), &ext, Some(&master_name), Some(prefix_name), metadata, false)
    }

    /// Uploads an in-memory buffer as a slave of `master_file_id`. Per the upstream
    /// client, slave-by-buffer uploads resolve their storage server via the
    /// update locator rather than the group-store locator.
    pub fn upload_slave_by_buffer(
        &self,
        data: Bytes,
        master_file_id: &str,
        prefix_name: &str,
        ext_name: &str,
        metadata: Option<&Metadata>,
    ) -> Result<UploadOutcome> {
        let (group, master_name) = self.split_id(master_file_id)?;
        let server = self.tracker().query_update(&group, &master_name)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.upload(&PayloadSource::Bytes(data), ext_name, Some(&master_name), Some(prefix_name), metadata, false)
    }

    /// Uploads a local file as an appender file, eligible for later append/truncate/modify.
    pub fn upload_appender_by_filename(&self, filename: impl AsRef<Path>, metadata: Option<&Metadata>) -> Result<UploadOutcome> {
        let path = filename.as_ref();
        Self::check_file(path)?;
        let ext = protocol::get_file_ext_name(&path.to_string_lossy());
        let server = self.tracker().query_store_without_group()?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, "", &server);
        storage.upload(&PayloadSource::Path(path.to_path_buf()), &ext, None, None, metadata, true)
    }

    /// Uploads an in-memory buffer as an appender file.
    pub fn upload_appender_by_buffer(&self, data: Bytes, ext_name: &str, metadata: Option<&Metadata>) -> Result<UploadOutcome> {
        let server = self.tracker().query_store_without_group()?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, "", &server);
        storage.upload(&PayloadSource::Bytes(data), ext_name, None, None, metadata, true)
    }

    // ---- delete / download ----

    /// Deletes a file identified by `file_id` (`"group/remote_path"`).
    pub fn delete_file(&self, file_id: &str) -> Result<DeleteOutcome> {
        let (group, name) = self.split_id(file_id)?;
        let server = self.tracker().query_update(&group, &name)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.delete(&name)
    }

    /// Downloads the whole file (or, if `offset`/`size` are non-zero, a byte range)
    /// into memory.
    pub fn download_to_buffer(&self, file_id: &str, offset: u64, size: u64) -> Result<DownloadOutcome> {
        let (group, name) = self.split_id(file_id)?;
        let server = self.tracker().query_fetch(&group, &name)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.download(&name, offset, size)
    }

    /// Downloads the whole file (or a byte range) directly to a local path.
    pub fn download_to_file(&self, file_id: &str, local_path: impl AsRef<Path>, offset: u64, size: u64) -> Result<DownloadOutcome> {
        let (group, name) = self.split_id(file_id)?;
        let server = self.tracker().query_fetch(&group, &name)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.download_to_file(&name, local_path.as_ref(), offset, size)
    }

    // ---- metadata ----

    /// Sets (overwrite or merge) metadata for `file_id`.
    pub fn set_metadata(&self, file_id: &str, metadata: &Metadata, flag: MetadataFlag) -> Result<MetaDataOutcome> {
        let (group, name) = self.split_id(file_id)?;
        let server = self.tracker().query_update(&group, &name)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.set_metadata(&name, metadata, flag)
    }

    /// Fetches metadata for `file_id`.
    pub fn get_metadata(&self, file_id: &str) -> Result<MetaDataOutcome> {
        let (group, name) = self.split_id(file_id)?;
        let server = self.tracker().query_update(&group, &name)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.get_metadata(&name)
    }

    // ---- appender operations ----

    /// Appends a local file's contents onto an existing appender file.
    pub fn append_by_filename(&self, appender_file_id: &str, filename: impl AsRef<Path>) -> Result<AppendOutcome> {
        let path = filename.as_ref();
        Self::check_file(path)?;
        let (group, name) = self.split_id(appender_file_id)?;
        let server = self.tracker().query_update(&group, &name)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.append(&name, &PayloadSource::Path(path.to_path_buf()))
    }

    /// Appends an in-memory buffer onto an existing appender file.
    pub fn append_by_buffer(&self, appender_file_id: &str, data: Bytes) -> Result<AppendOutcome> {
        let (group, name) = self.split_id(appender_file_id)?;
        let server = self.tracker().query_update(&group, &name)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.append(&name, &PayloadSource::Bytes(data))
    }

    /// Truncates an appender file to `new_size` bytes.
    pub fn truncate_file(&self, appender_file_id: &str, new_size: u64) -> Result<TruncateOutcome> {
        let (group, name) = self.split_id(appender_file_id)?;
        let server = self.tracker().query_update(&group, &name)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.truncate(&name, new_size)
    }

    /// Overwrites part of an appender file with a local file's contents.
    pub fn modify_by_filename(&self, appender_file_id: &str, offset: u64, filename: impl AsRef<Path>) -> Result<ModifyOutcome> {
        let path = filename.as_ref();
        Self::check_file(path)?;
        let (group, name) = self.split_id(appender_file_id)?;
        let server = self.tracker().query_update(&group, &name)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.modify(&name, offset, &PayloadSource::Path(path.to_path_buf()))
    }

    /// Overwrites part of an appender file with an in-memory buffer.
    pub fn modify_by_buffer(&self, appender_file_id: &str, offset: u64, data: Bytes) -> Result<ModifyOutcome> {
        let (group, name) = self.split_id(appender_file_id)?;
        let server = self.tracker().query_update(&group, &name)?;
        let pool = self.storage_pool_for(&server);
        let storage = StorageClient::new(&pool, group, &server);
        storage.modify(&name, offset, &PayloadSource::Bytes(data))
    }

    // ---- cluster listing ----

    /// Lists every group in the cluster.
    pub fn list_all_groups(&self) -> Result<GroupListing> {
        Ok(GroupListing { groups: self.tracker().list_all_groups()? })
    }

    /// Lists a single group's stats.
    pub fn list_one_group(&self, group_name: &str) -> Result<crate::types::GroupInfo> {
        self.tracker().list_one_group(group_name)
    }

    /// Lists every storage server in `group_name`, optionally filtered to one IP.
    pub fn list_servers(&self, group_name: &str, storage_ip: Option<&str>) -> Result<ServerListing> {
        Ok(ServerListing { servers: self.tracker().list_servers(group_name, storage_ip)? })
    }
}
