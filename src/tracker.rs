//! Tracker-side protocol: storage locator queries and cluster listing commands.

use crate::connection::{ConnectionPool, PooledConnection};
use crate::errors::{FastDfsError, Result};
use crate::protocol;
use crate::types::{
    FrameHeader, GroupInfo, StorageInfo, StorageServer, StorageStatus, TrackerCommand,
    FDFS_DOMAIN_NAME_MAX_LEN, FDFS_GROUP_NAME_MAX_LEN, FDFS_PROTO_HEADER_LEN,
    FDFS_STORAGE_ID_MAX_SIZE, FDFS_VERSION_SIZE, IP_ADDRESS_SIZE,
};

const QUERY_STORE_BODY_LEN: usize = FDFS_GROUP_NAME_MAX_LEN + (IP_ADDRESS_SIZE - 1) + 8 + 1;
const QUERY_FETCH_BODY_LEN: usize = FDFS_GROUP_NAME_MAX_LEN + (IP_ADDRESS_SIZE - 1) + 8;
const GROUP_RECORD_LEN: usize = (FDFS_GROUP_NAME_MAX_LEN + 1) + 11 * 8;
const STORAGE_RECORD_LEN: usize = 1
    + FDFS_STORAGE_ID_MAX_SIZE
    + IP_ADDRESS_SIZE
    + FDFS_DOMAIN_NAME_MAX_LEN
    + IP_ADDRESS_SIZE
    + FDFS_VERSION_SIZE
    + 52 * 8
    + 1;

/// Talks to the tracker cluster: resolves storage endpoints and lists cluster state.
pub struct TrackerClient<'a> {
    pool: &'a ConnectionPool,
}

impl<'a> TrackerClient<'a> {
    pub fn new(pool: &'a ConnectionPool) -> Self {
        TrackerClient { pool }
    }

    fn send_request(&self, conn: &mut PooledConnection, cmd: u8, body: &[u8]) -> Result<()> {
        conn.send_all(&protocol::encode_header(body.len() as u64, cmd, 0))?;
        if !body.is_empty() {
            conn.send_all(body)?;
        }
        Ok(())
    }

    fn recv_response(&self, conn: &mut PooledConnection) -> Result<(FrameHeader, Vec<u8>)> {
        let header_bytes = conn.recv_exact(FDFS_PROTO_HEADER_LEN)?;
        let header = protocol::decode_header(&header_bytes)?;
        if let Some(err) = crate::errors::status_to_error(header.status) {
            log::warn!("tracker returned non-zero status {}: {}", header.status, err);
            return Err(err);
        }
        let body = conn.recv_exact(header.length as usize)?;
        Ok((header, body))
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

    fn decode_storage_server(body: &[u8], with_path_index: bool) -> Result<StorageServer> {
        let expected = if with_path_index { QUERY_STORE_BODY_LEN } else { QUERY_FETCH_BODY_LEN };
        if body.len() != expected {
            return Err(FastDfsError::ResponseError(format!(
                "tracker response length mismatch: expected {}, got {}",
                expected,
                body.len()
            )));
        }
        let ip_field_len = IP_ADDRESS_SIZE - 1;
        let mut offset = FDFS_GROUP_NAME_MAX_LEN;
        let ip_addr = protocol::unpad_string(&body[offset..offset + ip_field_len]);
        offset += ip_field_len;
        let port = protocol::decode_u64(&body[offset..offset + 8]) as u16;
        offset += 8;
        let store_path_index = if with_path_index { body[offset] } else { 0 };

        Ok(StorageServer { ip_addr, port, store_path_index })
    }

    /// `ServiceQueryStoreWithoutGroupOne` — resolve a storage server for a fresh upload.
    pub fn query_store_without_group(&self) -> Result<StorageServer> {
        self.with_connection(|conn| {
            self.send_request(conn, TrackerCommand::ServiceQueryStoreWithoutGroupOne.into(), &[])?;
            let (_, body) = self.recv_response(conn)?;
            Self::decode_storage_server(&body, true)
        })
    }

    /// `ServiceQueryStoreWithGroupOne` — resolve a storage server within `group_name`,
    /// used for slave uploads and per-group fetch.
    pub fn query_store_with_group(&self, group_name: &str) -> Result<StorageServer> {
        self.with_connection(|conn| {
            let body = protocol::pad_string(group_name, FDFS_GROUP_NAME_MAX_LEN);
            self.send_request(conn, TrackerCommand::ServiceQueryStoreWithGroupOne.into(), &body)?;
            let (_, resp) = self.recv_response(conn)?;
            Self::decode_storage_server(&resp, true)
        })
    }

    fn do_query_storage(&self, group_name: &str, filename: &str, cmd: u8) -> Result<StorageServer> {
        self.with_connection(|conn| {
            let mut body = Vec::with_capacity(FDFS_GROUP_NAME_MAX_LEN + filename.len());
            body.extend_from_slice(&protocol::pad_string(group_name, FDFS_GROUP_NAME_MAX_LEN));
            body.extend_from_slice(filename.as_bytes());
            self.send_request(conn, cmd, &body)?;
            let (_, resp) = self.recv_response(conn)?;
            Self::decode_storage_server(&resp, false)
        })
    }

    /// `ServiceQueryUpdate` — resolve the storage server that owns an existing file,
    /// for delete / set-metadata / append / truncate / modify.
    pub fn query_update(&self, group_name: &str, filename: &str) -> Result<StorageServer> {
        self.do_query_storage(group_name, filename, TrackerCommand::ServiceQueryUpdate.into())
    }

    /// `ServiceQueryFetchOne` — resolve a storage server to download an existing file from.
    pub fn query_fetch(&self, group_name: &str, filename: &str) -> Result<StorageServer> {
        self.do_query_storage(group_name, filename, TrackerCommand::ServiceQueryFetchOne.into())
    }

    /// `ServerListOneGroup`.
    pub fn list_one_group(&self, group_name: &str) -> Result<GroupInfo> {
        self.with_connection(|conn| {
            let body = protocol::pad_string(group_name, FDFS_GROUP_NAME_MAX_LEN);
            self.send_request(conn, TrackerCommand::ServerListOneGroup.into(), &body)?;
            let (_, resp) = self.recv_response(conn)?;
            if resp.len() != GROUP_RECORD_LEN {
                return Err(FastDfsError::ResponseError(format!(
                    "group record length mismatch: expected {}, got {}",
                    GROUP_RECORD_LEN,
                    resp.len()
                )));
            }
            decode_group_record(&resp)
        })
    }

    /// `ServerListAllGroups`.
    pub fn list_all_groups(&self) -> Result<Vec<GroupInfo>> {
        self.with_connection(|conn| {
            self.send_request(conn, TrackerCommand::ServerListAllGroups.into(), &[])?;
            let (_, resp) = self.recv_response(conn)?;
            decode_records(&resp, GROUP_RECORD_LEN, decode_group_record)
        })
    }

    /// `ServerListStorage` — list every storage server in `group_name`, optionally
    /// filtered to a specific storage IP.
    pub fn list_servers(&self, group_name: &str, storage_ip: Option<&str>) -> Result<Vec<StorageInfo>> {
        self.with_connection(|conn| {
            let ip = storage_ip.unwrap_or("");
            let ip_len = ip.len().min(IP_ADDRESS_SIZE - 1);
            let mut body = Vec::with_capacity(FDFS_GROUP_NAME_MAX_LEN + ip_len);
            body.extend_from_slice(&protocol::pad_string(group_name, FDFS_GROUP_NAME_MAX_LEN));
            body.extend_from_slice(&protocol::pad_string(ip, ip_len));
            self.send_request(conn, TrackerCommand::ServerListStorage.into(), &body)?;
            let (_, resp) = self.recv_response(conn)?;
            decode_records(&resp, STORAGE_RECORD_LEN, decode_storage_record)
        })
    }
}

fn decode_records<T>(
    data: &[u8],
    record_len: usize,
    decode_one: impl Fn(&[u8]) -> Result<T>,
) -> Result<Vec<T>> {
    if data.len() % record_len != 0 {
        return Err(FastDfsError::ResponseError(format!(
            "response size {} is not a multiple of record size {}",
            data.len(),
            record_len
        )));
    }
    data.chunks(record_len).map(decode_one).collect()
}

fn decode_group_record(data: &[u8]) -> Result<GroupInfo> {
    use bytes::Buf;
    let name_field_len = FDFS_GROUP_NAME_MAX_LEN + 1;
    let group_name = protocol::unpad_string(&data[..name_field_len]);
    let mut buf = &data[name_field_len..];
    Ok(GroupInfo {
        group_name,
        total_mb: buf.get_u64(),
        free_mb: buf.get_u64(),
        trunk_free_mb: buf.get_u64(),
        storage_count: buf.get_u64(),
        storage_port: buf.get_u64(),
        storage_http_port: buf.get_u64(),
        active_count: buf.get_u64(),
        current_write_server: buf.get_u64(),
        store_path_count: buf.get_u64(),
        subdir_count_per_path: buf.get_u64(),
        current_trunk_file_id: buf.get_u64(),
    })
}

fn decode_storage_record(data: &[u8]) -> Result<StorageInfo> {
    use bytes::Buf;
    let mut buf = data;
    let status = StorageStatus::from_raw(buf.get_u8());

    let id = protocol::unpad_string(&buf[..FDFS_STORAGE_ID_MAX_SIZE]);
    buf.advance(FDFS_STORAGE_ID_MAX_SIZE);
    let ip_addr = protocol::unpad_string(&buf[..IP_ADDRESS_SIZE]);
    buf.advance(IP_ADDRESS_SIZE);
    let domain_name = protocol::unpad_string(&buf[..FDFS_DOMAIN_NAME_MAX_LEN]);
    buf.advance(FDFS_DOMAIN_NAME_MAX_LEN);
    let src_ip_addr = protocol::unpad_string(&buf[..IP_ADDRESS_SIZE]);
    buf.advance(IP_ADDRESS_SIZE);
    let version = protocol::unpad_string(&buf[..FDFS_VERSION_SIZE]);
    buf.advance(FDFS_VERSION_SIZE);

    let join_time = buf.get_u64();
    let up_time = buf.get_u64();
    let _total_mb = buf.get_u64();
    let _free_mb = buf.get_u64();
    let _upload_prio = buf.get_u64();
    let _store_path_count = buf.get_u64();
    let _subdir_count_per_path = buf.get_u64();
    let _storage_port = buf.get_u64();
    let _storage_http_port = buf.get_u64();
    let _curr_write_path = buf.get_u64();

    let total_upload_count = buf.get_u64();
    let success_upload_count = buf.get_u64();
    let total_append_count = buf.get_u64();
    let success_append_count = buf.get_u64();
    let total_modify_count = buf.get_u64();
    let success_modify_count = buf.get_u64();
    let total_truncate_count = buf.get_u64();
    let success_truncate_count = buf.get_u64();
    let total_set_meta_count = buf.get_u64();
    let success_set_meta_count = buf.get_u64();
    let total_delete_count = buf.get_u64();
    let success_delete_count = buf.get_u64();
    let total_download_count = buf.get_u64();
    let success_download_count = buf.get_u64();
    let total_get_meta_count = buf.get_u64();
    let success_get_meta_count = buf.get_u64();
    let total_create_link_count = buf.get_u64();
    let success_create_link_count = buf.get_u64();
    let total_delete_link_count = buf.get_u64();
    let success_delete_link_count = buf.get_u64();
    let total_upload_bytes = buf.get_u64();
    let success_upload_bytes = buf.get_u64();
    let total_append_bytes = buf.get_u64();
    let success_append_bytes = buf.get_u64();
    let total_modify_bytes = buf.get_u64();
    let success_modify_bytes = buf.get_u64();
    let total_download_bytes = buf.get_u64();
    let success_download_bytes = buf.get_u64();
    let total_sync_in_bytes = buf.get_u64();
    let success_sync_in_bytes = buf.get_u64();
    let total_sync_out_bytes = buf.get_u64();
    let success_sync_out_bytes = buf.get_u64();
    let total_file_open_count = buf.get_u64();
    let success_file_open_count = buf.get_u64();
    let total_file_read_count = buf.get_u64();
    let success_file_read_count = buf.get_u64();
    let total_file_write_count = buf.get_u64();
    let success_file_write_count = buf.get_u64();
    let last_source_sync_timestamp = buf.get_u64();
    let last_sync_update_timestamp = buf.get_u64();
    let last_synced_timestamp = buf.get_u64();
    let last_heartbeat_time = buf.get_u64();
    let is_trunk_server = buf.get_u8() != 0;

    Ok(StorageInfo {
        status,
        id,
        ip_addr,
        domain_name,
        src_ip_addr,
        version,
        total_upload_count,
        success_upload_count,
        total_append_count,
        success_append_count,
        total_modify_count,
        success_modify_count,
        total_truncate_count,
        success_truncate_count,
        total_set_meta_count,
        success_set_meta_count,
        total_delete_count,
        success_delete_count,
        total_download_count,
        success_download_count,
        total_get_meta_count,
        success_get_meta_count,
        total_create_link_count,
        success_create_link_count,
        total_delete_link_count,
        success_delete_link_count,
        total_upload_bytes,
        success_upload_bytes,
        total_append_bytes,
        success_append_bytes,
        total_modify_bytes,
        success_modify_bytes,
        total_download_bytes,
        success_download_bytes,
        total_sync_in_bytes,
        success_sync_in_bytes,
        total_sync_out_bytes,
        success_sync_out_bytes,
        total_file_open_count,
        success_file_open_count,
        total_file_read_count,
        success_file_read_count,
        total_file_write_count,
        success_file_write_count,
        last_source_sync_timestamp,
        last_sync_update_timestamp,
        last_synced_timestamp,
        last_heartbeat_time,
        join_time,
        up_time,
        is_trunk_server,
    })
}
