//! Wire-level constants, command codes, and record types shared across the crate.

/// Default network ports for FastDFS servers.
pub const TRACKER_DEFAULT_PORT: u16 = 22122;
pub const STORAGE_DEFAULT_PORT: u16 = 23000;

/// Protocol header size.
pub const FDFS_PROTO_HEADER_LEN: usize = 10;

/// Field size limits.
pub const FDFS_GROUP_NAME_MAX_LEN: usize = 16;
pub const FDFS_FILE_EXT_NAME_MAX_LEN: usize = 6;
pub const FDFS_MAX_META_NAME_LEN: usize = 64;
pub const FDFS_MAX_META_VALUE_LEN: usize = 256;
pub const FDFS_FILE_PREFIX_MAX_LEN: usize = 16;
pub const FDFS_STORAGE_ID_MAX_SIZE: usize = 16;
pub const FDFS_VERSION_SIZE: usize = 6;
pub const IP_ADDRESS_SIZE: usize = 16;
pub const FDFS_DOMAIN_NAME_MAX_LEN: usize = 128;
pub const FDFS_STORAGE_ID_MAX_LEN: usize = 16;

/// Protocol separators used by the metadata codec.
pub const FDFS_RECORD_SEPARATOR: u8 = 0x01;
pub const FDFS_FIELD_SEPARATOR: u8 = 0x02;

/// Tracker protocol commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackerCommand {
    ServiceQueryStoreWithoutGroupOne = 101,
    ServiceQueryFetchOne = 102,
    ServiceQueryUpdate = 103,
    ServiceQueryStoreWithGroupOne = 104,
    ServerListOneGroup = 90,
    ServerListAllGroups = 91,
    ServerListStorage = 92,
}

impl From<TrackerCommand> for u8 {
    fn from(cmd: TrackerCommand) -> u8 {
        cmd as u8
    }
}

/// Storage protocol commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StorageCommand {
    UploadFile = 11,
    DeleteFile = 12,
    SetMetadata = 13,
    DownloadFile = 14,
    GetMetadata = 15,
    UploadSlaveFile = 21,
    UploadAppenderFile = 23,
    AppendFile = 24,
    ModifyFile = 34,
    TruncateFile = 36,
}

impl From<StorageCommand> for u8 {
    fn from(cmd: StorageCommand) -> u8 {
        cmd as u8
    }
}

/// Storage server status codes, as reported in `Storage record`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StorageStatus {
    Init = 0,
    WaitSync = 1,
    Syncing = 2,
    IpChanged = 3,
    Deleted = 4,
    Offline = 5,
    Online = 6,
    Active = 7,
    Recovery = 9,
    None = 99,
}

impl StorageStatus {
    /// Maps a raw status byte to its known variant, falling back to `None`.
    pub fn from_raw(value: u8) -> StorageStatus {
        match value {
            0 => StorageStatus::Init,
            1 => StorageStatus::WaitSync,
            2 => StorageStatus::Syncing,
            3 => StorageStatus::IpChanged,
            4 => StorageStatus::Deleted,
            5 => StorageStatus::Offline,
            6 => StorageStatus::Online,
            7 => StorageStatus::Active,
            9 => StorageStatus::Recovery,
            _ => StorageStatus::None,
        }
    }

    /// Human-readable label, matching the original client's status strings.
    pub fn label(self) -> &'static str {
        match self {
            StorageStatus::Init => "INIT",
            StorageStatus::WaitSync => "WAIT_SYNC",
            StorageStatus::Syncing => "SYNCING",
            StorageStatus::IpChanged => "IP_CHANGED",
            StorageStatus::Deleted => "DELETED",
            StorageStatus::Offline => "OFFLINE",
            StorageStatus::Online => "ONLINE",
            StorageStatus::Active => "ACTIVE",
            StorageStatus::Recovery => "RECOVERY",
            StorageStatus::None => "NONE",
        }
    }
}

/// Metadata operation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MetadataFlag {
    /// Replace all existing metadata with new values.
    Overwrite = b'O',
    /// Merge new metadata with existing metadata.
    Merge = b'M',
}

impl From<MetadataFlag> for u8 {
    fn from(flag: MetadataFlag) -> u8 {
        flag as u8
    }
}

/// A resolved endpoint to talk to, plus the storage-side context a caller needs
/// to build an upload/slave/append request.
#[derive(Debug, Clone)]
pub struct StorageServer {
    pub ip_addr: String,
    pub port: u16,
    pub store_path_index: u8,
}

/// The 10-byte frame header shared by tracker and storage conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u64,
    pub cmd: u8,
    pub status: u8,
}

/// Result of a successful group-listing query (`ServerListAllGroups` / `ServerListOneGroup`).
#[derive(Debug, Clone)]
pub struct GroupInfo {
    pub group_name: String,
    pub total_mb: u64,
    pub free_mb: u64,
    pub trunk_free_mb: u64,
    pub storage_count: u64,
    pub storage_port: u64,
    pub storage_http_port: u64,
    pub active_count: u64,
    pub current_write_server: u64,
    pub store_path_count: u64,
    pub subdir_count_per_path: u64,
    pub current_trunk_file_id: u64,
}

/// Result of a successful server-listing query (`ServerListStorage`).
#[derive(Debug, Clone)]
pub struct StorageInfo {
    pub status: StorageStatus,
    pub id: String,
    pub ip_addr: String,
    pub domain_name: String,
    pub src_ip_addr: String,
    pub version: String,
    pub total_upload_count: u64,
    pub success_upload_count: u64,
    pub total_append_count: u64,
    pub success_append_count: u64,
    pub total_modify_count: u64,
    pub success_modify_count: u64,
    pub total_truncate_count: u64,
    pub success_truncate_count: u64,
    pub total_set_meta_count: u64,
    pub success_set_meta_count: u64,
    pub total_delete_count: u64,
    pub success_delete_count: u64,
    pub total_download_count: u64,
    pub success_download_count: u64,
    pub total_get_meta_count: u64,
    pub success_get_meta_count: u64,
    pub total_create_link_count: u64,
    pub success_create_link_count: u64,
    pub total_delete_link_count: u64,
    pub success_delete_link_count: u64,
    pub total_upload_bytes: u64,
    pub success_upload_bytes: u64,
    pub total_append_bytes: u64,
    pub success_append_bytes: u64,
    pub total_modify_bytes: u64,
    pub success_modify_bytes: u64,
    pub total_download_bytes: u64,
    pub success_download_bytes: u64,
    pub total_sync_in_bytes: u64,
    pub success_sync_in_bytes: u64,
    pub total_sync_out_bytes: u64,
    pub success_sync_out_bytes: u64,
    pub total_file_open_count: u64,
    pub success_file_open_count: u64,
    pub total_file_read_count: u64,
    pub success_file_read_count: u64,
    pub total_file_write_count: u64,
    pub success_file_write_count: u64,
    pub last_source_sync_timestamp: u64,
    pub last_sync_update_timestamp: u64,
    pub last_synced_timestamp: u64,
    pub last_heartbeat_time: u64,
    pub join_time: u64,
    pub up_time: u64,
    pub is_trunk_server: bool,
}

/// Metadata dictionary type. Insertion order is preserved; duplicate keys
/// overwrite the earlier value in place, matching the wire format which has
/// no sort requirement but for which deterministic output is convenient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(Vec<(String, String)>);

impl Metadata {
    pub fn new() -> Self {
        Metadata(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut m = Metadata::new();
        for (k, v) in iter {
            m.insert(k, v);
        }
        m
    }
}

impl IntoIterator for Metadata {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Source of upload/append/modify payload bytes.
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// Stream the contents of a local file.
    Path(std::path::PathBuf),
    /// Send an in-memory buffer directly.
    Bytes(bytes::Bytes),
}

impl PayloadSource {
    /// Resolves the payload's byte length without necessarily reading it all into memory.
    pub fn len(&self) -> crate::errors::Result<u64> {
        match self {
            PayloadSource::Path(path) => Ok(std::fs::metadata(path)?.len()),
            PayloadSource::Bytes(bytes) => Ok(bytes.len() as u64),
        }
    }
}

/// Outcome of an upload (normal, slave, or appender) operation.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub group_name: String,
    pub remote_filename: String,
    pub status: String,
}

impl UploadOutcome {
    pub fn file_id(&self) -> String {
        format!("{}/{}", self.group_name, self.remote_filename)
    }
}

/// Outcome of a delete operation.
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub status: String,
    pub file_id: String,
    pub storage_ip: String,
}

/// Outcome of a download operation.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub content: bytes::Bytes,
    pub download_size: String,
    pub storage_ip: String,
}

/// Outcome of a metadata get/set operation.
#[derive(Debug, Clone)]
pub struct MetaDataOutcome {
    pub status: String,
    pub metadata: Metadata,
}

/// Outcome of an append operation.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub status: String,
    pub storage_ip: String,
}

/// Outcome of a truncate operation.
#[derive(Debug, Clone)]
pub struct TruncateOutcome {
    pub status: String,
    pub storage_ip: String,
}

/// Outcome of a modify operation.
#[derive(Debug, Clone)]
pub struct ModifyOutcome {
    pub status: String,
    pub storage_ip: String,
}

/// Outcome of listing every group in the cluster.
#[derive(Debug, Clone)]
pub struct GroupListing {
    pub groups: Vec<GroupInfo>,
}

/// Outcome of listing every storage server within a group.
#[derive(Debug, Clone)]
pub struct ServerListing {
    pub servers: Vec<StorageInfo>,
}
