//! Storage-side protocol: upload/download/delete/append/truncate/modify/metadata dialogs.

use bytes::{Bytes, BytesMut};

use crate::connection::{ConnectionPool, PooledConnection};
use crate::errors::{FastDfsError, Result};
use crate::protocol;
use crate::types::{
    AppendOutcome, DeleteOutcome, DownloadOutcome, MetaDataOutcome, Metadata, ModifyOutcome,
    PayloadSource, StorageCommand, StorageServer, TruncateOutcome, UploadOutcome,
    FDFS_FILE_EXT_NAME_MAX_LEN, FDFS_FILE_PREFIX_MAX_LEN, FDFS_GROUP_NAME_MAX_LEN,
    FDFS_PROTO_HEADER_LEN, MetadataFlag,
};

const TRANSFER_CHUNK: usize = 64 * 1024;

/// A transient client bound to one storage server, constructed after a tracker
/// resolution and dropped once the caller's operation completes.
pub struct StorageClient<'a> {
    pool: &'a ConnectionPool,
    group_name: String,
    server: &'a StorageServer,
}

impl<'a> StorageClient<'a> {
    pub fn new(pool: &'a ConnectionPool, group_name: impl Into<String>, server: &'a StorageServer) -> Self {
        StorageClient { pool, group_name: group_name.into(), server }
    }

    fn with_connection<T>(&self, f: impl FnOnce(&mut PooledConnection) -> Result<T>) -> Result<T> {
        let conn = self.pool.acquire()?;
        let mut pooled = PooledConnection::new(conn, self.pool);
        match f(&mut pooled) {
            Ok(v) => Ok(v),
            Err(e) => {
                pooled.mark_broken();
                Err(e)
            }
        }
    }

    fn recv_status(&self, conn: &mut PooledConnection) -> Result<u64> {
        let header_bytes = conn.recv_exact(FDFS_PROTO_HEADER_LEN)?;
        let header = protocol::decode_header(&header_bytes)?;
        if let Some(err) = crate::errors::status_to_error(header.status) {
            log::warn!("storage server returned non-zero status {}: {}", header.status, err);
            return Err(err);
        }
        Ok(header.length)
    }

    /// Uploads a normal, slave, or appender file depending on `master_filename`/`prefix_name`.
    ///
    /// Slave mode is selected iff the storage server's group name is non-empty
    /// *and* a master filename is supplied.
    pub fn upload(
        &self,
        source: &PayloadSource,
        ext_name: &str,
        master_filename: Option<&str>,
        prefix_name: Option<&str>,
        metadata: Option<&Metadata>,
        appender: bool,
    ) -> Result<UploadOutcome> {
        let file_size = source.len()?;
        let upload_slave = !self.group_name.is_empty() && master_filename.map(|s| !s.is_empty()).unwrap_or(false);
        let ext = protocol::pad_string(ext_name, FDFS_FILE_EXT_NAME_MAX_LEN);

        let cmd: u8 = if upload_slave {
            StorageCommand::UploadSlaveFile.into()
        } else if appender {
            StorageCommand::UploadAppenderFile.into()
        } else {
            StorageCommand::UploadFile.into()
        };

        let mut header_body = BytesMut::new();
        if upload_slave {
            let master = master_filename.unwrap_or("");
            let prefix = protocol::pad_string(prefix_name.unwrap_or(""), FDFS_FILE_PREFIX_MAX_LEN);
            header_body.extend_from_slice(&protocol::encode_u64(master.len() as u64));
            header_body.extend_from_slice(&protocol::encode_u64(file_size));
            header_body.extend_from_slice(&prefix);
            header_body.extend_from_slice(&ext);
            header_body.extend_from_slice(master.as_bytes());
        } else {
            header_body.extend_from_slice(&[self.server.store_path_index]);
            header_body.extend_from_slice(&protocol::encode_u64(file_size));
            header_body.extend_from_slice(&ext);
        }

        let pkg_len = header_body.len() as u64 + file_size;

        let (group_name, remote_filename) = self.with_connection(|conn| {
            conn.send_all(&protocol::encode_header(pkg_len, cmd, 0))?;
            conn.send_all(&header_body)?;
            match source {
                PayloadSource::Path(path) => {
                    let mut file = std::fs::File::open(path)?;
                    conn.send_from_reader(&mut file, file_size, TRANSFER_CHUNK)?;
                }
                PayloadSource::Bytes(bytes) => {
                    conn.send_all(bytes)?;
                }
            }

            let resp_len = self.recv_status(conn)? as usize;
            if resp_len <= FDFS_GROUP_NAME_MAX_LEN {
                return Err(FastDfsError::ResponseError(format!(
                    "storage upload response too short: {} bytes",
                    resp_len
                )));
            }
            let body = conn.recv_exact(resp_len)?;
            let group_name = protocol::unpad_string(&body[..FDFS_GROUP_NAME_MAX_LEN]);
            let remote_filename = protocol::unpad_string(&body[FDFS_GROUP_NAME_MAX_LEN..]);
            Ok((group_name, remote_filename))
        })?;

        if let Some(meta) = metadata {
            if !meta.is_empty() {
                let target = StorageClient::new(self.pool, group_name.clone(), self.server);
                let status = target.set_metadata_raw(&remote_filename, meta, MetadataFlag::Overwrite);
                if let Err(e) = status {
                    log::error!(
                        "set_metadata failed for {}/{} after upload, rolling back: {}",
                        group_name, remote_filename, e
                    );
                    let _ = target.delete_raw(&remote_filename);
                    return Err(e);
                }
            }
        }

        Ok(UploadOutcome {
            group_name,
            remote_filename,
            status: "Upload successed.".to_string(),
        })
    }

    fn delete_raw(&self, remote_filename: &str) -> Result<()> {
        self.with_connection(|conn| {
            let mut body = Vec::with_capacity(FDFS_GROUP_NAME_MAX_LEN + remote_filename.len());
            body.extend_from_slice(&protocol::pad_string(&self.group_name, FDFS_GROUP_NAME_MAX_LEN));
            body.extend_from_slice(remote_filename.as_bytes());
            conn.send_all(&protocol::encode_header(body.len() as u64, StorageCommand::DeleteFile.into(), 0))?;
            conn.send_all(&body)?;
            self.recv_status(conn)?;
            Ok(())
        })
    }

    /// Deletes `remote_filename` from this storage server.
    pub fn delete(&self, remote_filename: &str) -> Result<DeleteOutcome> {
        self.delete_raw(remote_filename)?;
        Ok(DeleteOutcome {
            status: "Delete file successed.".to_string(),
            file_id: protocol::join_file_id(&self.group_name, remote_filename),
            storage_ip: self.server.ip_addr.clone(),
        })
    }

    /// Downloads `remote_filename`. `offset == 0 && size == 0` means the whole file.
    pub fn download(&self, remote_filename: &str, offset: u64, size: u64) -> Result<DownloadOutcome> {
        let content = self.with_connection(|conn| {
            let mut body = Vec::with_capacity(16 + FDFS_GROUP_NAME_MAX_LEN + remote_filename.len());
            body.extend_from_slice(&protocol::encode_u64(offset));
            body.extend_from_slice(&protocol::encode_u64(size));
            body.extend_from_slice(&protocol::pad_string(&self.group_name, FDFS_GROUP_NAME_MAX_LEN));
            body.extend_from_slice(remote_filename.as_bytes());
            conn.send_all(&protocol::encode_header(body.len() as u64, StorageCommand::DownloadFile.into(), 0))?;
            conn.send_all(&body)?;
            let resp_len = self.recv_status(conn)?;
            let mut buf = Vec::with_capacity(resp_len as usize);
            conn.recv_to_writer(&mut buf, resp_len, TRANSFER_CHUNK)?;
            Ok(Bytes::from(buf))
        })?;

        Ok(DownloadOutcome {
            download_size: protocol::human_size(content.len() as u64),
            content,
            storage_ip: self.server.ip_addr.clone(),
        })
    }

    /// Downloads `remote_filename` directly to a local file path, streaming the response.
    pub fn download_to_file(&self, remote_filename: &str, local_path: &std::path::Path, offset: u64, size: u64) -> Result<DownloadOutcome> {
        let downloaded = self.with_connection(|conn| {
            let mut body = Vec::with_capacity(16 + FDFS_GROUP_NAME_MAX_LEN + remote_filename.len());
            body.extend_from_slice(&protocol::encode_u64(offset));
            body.extend_from_slice(&protocol::encode_u64(size));
            body.extend_from_slice(&protocol::pad_string(&self.group_name, FDFS_GROUP_NAME_MAX_LEN));
            body.extend_from_slice(remote_filename.as_bytes());
            conn.send_all(&protocol::encode_header(body.len() as u64, StorageCommand::DownloadFile.into(), 0))?;
            conn.send_all(&body)?;
            let resp_len = self.recv_status(conn)?;
            let mut file = std::fs::File::create(local_path)?;
            conn.recv_to_writer(&mut file, resp_len, TRANSFER_CHUNK)?;
            Ok(resp_len)
        })?;

        Ok(DownloadOutcome {
            content: Bytes::new(),
            download_size: protocol::human_size(downloaded),
            storage_ip: self.server.ip_addr.clone(),
        })
    }

    fn set_metadata_raw(&self, remote_filename: &str, metadata: &Metadata, flag: MetadataFlag) -> Result<()> {
        self.with_connection(|conn| {
            let meta_buffer = protocol::encode_metadata(metadata);
            let mut body = Vec::with_capacity(17 + FDFS_GROUP_NAME_MAX_LEN + remote_filename.len() + meta_buffer.len());
            body.extend_from_slice(&protocol::encode_u64(remote_filename.len() as u64));
            body.extend_from_slice(&protocol::encode_u64(meta_buffer.len() as u64));
            body.push(flag.into());
            body.extend_from_slice(&protocol::pad_string(&self.group_name, FDFS_GROUP_NAME_MAX_LEN));
            body.extend_from_slice(remote_filename.as_bytes());
            body.extend_from_slice(&meta_buffer);
            conn.send_all(&protocol::encode_header(body.len() as u64, StorageCommand::SetMetadata.into(), 0))?;
            conn.send_all(&body)?;
            self.recv_status(conn)?;
            Ok(())
        })
    }

    /// Sets or merges metadata for `remote_filename`.
    pub fn set_metadata(&self, remote_filename: &str, metadata: &Metadata, flag: MetadataFlag) -> Result<MetaDataOutcome> {
        self.set_metadata_raw(remote_filename, metadata, flag)?;
        Ok(MetaDataOutcome {
            status: "Set meta data success.".to_string(),
            metadata: metadata.clone(),
        })
    }

    /// Fetches metadata for `remote_filename`.
    pub fn get_metadata(&self, remote_filename: &str) -> Result<MetaDataOutcome> {
        let metadata = self.with_connection(|conn| {
            let mut body = Vec::with_capacity(FDFS_GROUP_NAME_MAX_LEN + remote_filename.len());
            body.extend_from_slice(&protocol::pad_string(&self.group_name, FDFS_GROUP_NAME_MAX_LEN));
            body.extend_from_slice(remote_filename.as_bytes());
            conn.send_all(&protocol::encode_header(body.len() as u64, StorageCommand::GetMetadata.into(), 0))?;
            conn.send_all(&body)?;
            let resp_len = self.recv_status(conn)?;
            if resp_len == 0 {
                return Ok(Metadata::new());
            }
            let body = conn.recv_exact(resp_len as usize)?;
            Ok(protocol::decode_metadata(&body))
        })?;

        Ok(MetaDataOutcome { status: "Get meta data success.".to_string(), metadata })
    }

    /// Appends `source`'s contents to an existing appender file.
    pub fn append(&self, appended_filename: &str, source: &PayloadSource) -> Result<AppendOutcome> {
        let file_size = source.len()?;
        self.with_connection(|conn| {
            let mut header_body = Vec::with_capacity(16 + appended_filename.len());
            header_body.extend_from_slice(&protocol::encode_u64(appended_filename.len() as u64));
            header_body.extend_from_slice(&protocol::encode_u64(file_size));
            header_body.extend_from_slice(appended_filename.as_bytes());

            let pkg_len = header_body.len() as u64 + file_size;
            conn.send_all(&protocol::encode_header(pkg_len, StorageCommand::AppendFile.into(), 0))?;
            conn.send_all(&header_body)?;
            match source {
                PayloadSource::Path(path) => {
                    let mut file = std::fs::File::open(path)?;
                    conn.send_from_reader(&mut file, file_size, TRANSFER_CHUNK)?;
                }
                PayloadSource::Bytes(bytes) => conn.send_all(bytes)?,
            }
            self.recv_status(conn)?;
            Ok(())
        })?;

        Ok(AppendOutcome {
            status: "Append file successed.".to_string(),
            storage_ip: self.server.ip_addr.clone(),
        })
    }

    /// Truncates an appender file to `new_size` bytes.
    pub fn truncate(&self, appender_filename: &str, new_size: u64) -> Result<TruncateOutcome> {
        self.with_connection(|conn| {
            let mut body = Vec::with_capacity(16 + appender_filename.len());
            body.extend_from_slice(&protocol::encode_u64(appender_filename.len() as u64));
            body.extend_from_slice(&protocol::encode_u64(new_size));
            body.extend_from_slice(appender_filename.as_bytes());
            conn.send_all(&protocol::encode_header(body.len() as u64, StorageCommand::TruncateFile.into(), 0))?;
            conn.send_all(&body)?;
            self.recv_status(conn)?;
            Ok(())
        })?;

        Ok(TruncateOutcome {
            status: "Truncate successed.".to_string(),
            storage_ip: self.server.ip_addr.clone(),
        })
    }

    /// Overwrites `size` bytes of an appender file starting at `offset` with `source`'s contents.
    pub fn modify(&self, appender_filename: &str, offset: u64, source: &PayloadSource) -> Result<ModifyOutcome> {
        let file_size = source.len()?;
        self.with_connection(|conn| {
            let mut header_body = Vec::with_capacity(24 + appender_filename.len());
            header_body.extend_from_slice(&protocol::encode_u64(appender_filename.len() as u64));
            header_body.extend_from_slice(&protocol::encode_u64(offset));
            header_body.extend_from_slice(&protocol::encode_u64(file_size));
            header_body.extend_from_slice(appender_filename.as_bytes());

            let pkg_len = header_body.len() as u64 + file_size;
            conn.send_all(&protocol::encode_header(pkg_len, StorageCommand::ModifyFile.into(), 0))?;
            conn.send_all(&header_body)?;
            match source {
                PayloadSource::Path(path) => {
                    let mut file = std::fs::File::open(path)?;
                    conn.send_from_reader(&mut file, file_size, TRANSFER_CHUNK)?;
                }
                PayloadSource::Bytes(bytes) => conn.send_all(bytes)?,
            }
            self.recv_status(conn)?;
            Ok(())
        })?;

        Ok(ModifyOutcome {
            status: "Modify successed.".to_string(),
            storage_ip: self.server.ip_addr.clone(),
        })
    }
}
