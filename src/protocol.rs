//! Frame header codec, file-id helpers, metadata codec, and padding utilities
//! shared by the tracker and storage clients.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{FastDfsError, Result};
use crate::types::*;

/// Packs a frame header into its wire form: `pkg_len:u64 | cmd:u8 | status:u8`, big-endian.
pub fn encode_header(length: u64, cmd: u8, status: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(FDFS_PROTO_HEADER_LEN);
    buf.put_u64(length);
    buf.put_u8(cmd);
    buf.put_u8(status);
    buf.freeze()
}

/// Unpacks a frame header. `data` must contain at least `FDFS_PROTO_HEADER_LEN` bytes.
pub fn decode_header(data: &[u8]) -> Result<FrameHeader> {
    if data.len() < FDFS_PROTO_HEADER_LEN {
        return Err(FastDfsError::ResponseError(format!(
            "header too short: {} bytes",
            data.len()
        )));
    }

    let mut buf = &data[..FDFS_PROTO_HEADER_LEN];
    let length = buf.get_u64();
    let cmd = buf.get_u8();
    let status = buf.get_u8();

    Ok(FrameHeader { length, cmd, status })
}

/// Splits a remote file-id of the form `"group/path/to/file"` into its two parts.
pub fn split_file_id(file_id: &str) -> Option<(String, String)> {
    let idx = file_id.find('/')?;
    if idx == file_id.len() - 1 {
        return None;
    }
    Some((file_id[..idx].to_string(), file_id[idx + 1..].to_string()))
}

/// Joins a group name and remote filename into a file-id.
pub fn join_file_id(group_name: &str, remote_filename: &str) -> String {
    format!("{}/{}", group_name, remote_filename)
}

/// Encodes a metadata map into FastDFS wire format:
/// `key1<FIELD>value1<RECORD>key2<FIELD>value2<RECORD>...` with no trailing separator.
pub fn encode_metadata(metadata: &Metadata) -> Bytes {
    if metadata.is_empty() {
        return Bytes::new();
    }

    let mut buf = BytesMut::new();
    let mut first = true;
    for (key, value) in metadata.iter() {
        if !first {
            buf.put_u8(FDFS_RECORD_SEPARATOR);
        }
        first = false;
        buf.put_slice(key.as_bytes());
        buf.put_u8(FDFS_FIELD_SEPARATOR);
        buf.put_slice(value.as_bytes());
    }

    buf.freeze()
}

/// Decodes FastDFS wire-format metadata. Records that do not split into exactly
/// two fields are skipped.
pub fn decode_metadata(data: &[u8]) -> Metadata {
    if data.is_empty() {
        return Metadata::new();
    }

    let mut metadata = Metadata::new();
    for record in data.split(|&b| b == FDFS_RECORD_SEPARATOR) {
        if record.is_empty() {
            continue;
        }
        let fields: Vec<&[u8]> = record.splitn(2, |&b| b == FDFS_FIELD_SEPARATOR).collect();
        if fields.len() != 2 {
            continue;
        }
        let key = String::from_utf8_lossy(fields[0]).to_string();
        let value = String::from_utf8_lossy(fields[1]).to_string();
        metadata.insert(key, value);
    }

    metadata
}

/// Extracts a FastDFS-style file extension, honoring the double-extension rule:
/// for `"a.b.tar.gz"` this returns `"tar.gz"`, not just `"gz"`.
///
/// Rule: split the filename's last path component on `.`; if there are at
/// least 3 dot-separated parts and the penultimate part is itself a plain
/// name (no further path separator), join the last two parts with `.`.
/// Otherwise return the last part alone, or empty if there is no dot.
pub fn get_file_ext_name(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let parts: Vec<&str> = base.split('.').collect();
    if parts.len() < 2 {
        return String::new();
    }

    let ext = if parts.len() >= 3 {
        let penultimate = parts[parts.len() - 2];
        if !penultimate.is_empty() && !penultimate.contains(['/', '\\']) {
            format!("{}.{}", penultimate, parts[parts.len() - 1])
        } else {
            parts[parts.len() - 1].to_string()
        }
    } else {
        parts[parts.len() - 1].to_string()
    };

    if ext.len() > FDFS_FILE_EXT_NAME_MAX_LEN {
        ext[..FDFS_FILE_EXT_NAME_MAX_LEN].to_string()
    } else {
        ext
    }
}

/// Renders a byte count the way the original client's `appromix` helper does:
/// steps through B, KB, MB, GB, TB, PB, EB, ZB, YB at a factor of 1024.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
    let mut value = bytes as f64;
    let mut unit_idx = 0;
    while value >= 1024.0 && unit_idx < UNITS.len() - 1 {
        value /= 1024.0;
        unit_idx += 1;
    }
    if unit_idx == 0 {
        format!("{}{}", bytes, UNITS[0])
    } else {
        format!("{:.2}{}", value, UNITS[unit_idx])
    }
}

/// Pads `s` to exactly `length` bytes with trailing NUL, truncating if too long.
pub fn pad_string(s: &str, length: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(length);
    let bytes = s.as_bytes();
    let copy_len = bytes.len().min(length);
    buf.put_slice(&bytes[..copy_len]);
    buf.resize(length, 0);
    buf.freeze()
}

/// Strips trailing NUL bytes, the inverse of [`pad_string`].
pub fn unpad_string(data: &[u8]) -> String {
    let end = data.iter().rposition(|&b| b != 0).map(|i| i + 1).unwrap_or(0);
    String::from_utf8_lossy(&data[..end]).to_string()
}

/// Encodes a `u64` as 8 big-endian bytes.
pub fn encode_u64(n: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(n);
    buf.freeze()
}

/// Decodes 8 big-endian bytes into a `u64`. Returns 0 if `data` is too short.
pub fn decode_u64(data: &[u8]) -> u64 {
    if data.len() < 8 {
        return 0;
    }
    let mut buf = &data[..8];
    buf.get_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let encoded = encode_header(1024, 11, 0);
        assert_eq!(encoded.len(), FDFS_PROTO_HEADER_LEN);

        let decoded = decode_header(&encoded).unwrap();
        assert_eq!(decoded.length, 1024);
        assert_eq!(decoded.cmd, 11);
        assert_eq!(decoded.status, 0);
    }

    #[test]
    fn split_file_id_parses_group_and_path() {
        let (group, path) = split_file_id("group1/M00/00/00/test.jpg").unwrap();
        assert_eq!(group, "group1");
        assert_eq!(path, "M00/00/00/test.jpg");
    }

    #[test]
    fn split_file_id_rejects_missing_separator() {
        assert!(split_file_id("nogroup").is_none());
    }

    #[test]
    fn split_file_id_allows_empty_group() {
        let (group, path) = split_file_id("/leading").unwrap();
        assert_eq!(group, "");
        assert_eq!(path, "leading");
    }

    #[test]
    fn join_file_id_is_inverse_of_split() {
        assert_eq!(join_file_id("group1", "M00/00/00/test.jpg"), "group1/M00/00/00/test.jpg");
    }

    #[test]
    fn metadata_round_trips() {
        let mut metadata = Metadata::new();
        metadata.insert("author", "John Doe");
        metadata.insert("date", "2025-01-15");

        let encoded = encode_metadata(&metadata);
        assert!(!encoded.is_empty());
        assert!(!encoded.ends_with(&[FDFS_RECORD_SEPARATOR]));

        let decoded = decode_metadata(&encoded);
        assert_eq!(decoded.len(), metadata.len());
        assert_eq!(decoded.get("author"), Some("John Doe"));
        assert_eq!(decoded.get("date"), Some("2025-01-15"));
    }

    #[test]
    fn ext_name_handles_double_extension() {
        assert_eq!(get_file_ext_name("a.b.tar.gz"), "tar.gz");
        assert_eq!(get_file_ext_name("a.txt"), "txt");
        assert_eq!(get_file_ext_name("a"), "");
        assert_eq!(get_file_ext_name("dir.x/file"), "");
    }

    #[test]
    fn pad_unpad_round_trip() {
        let padded = pad_string("test", 16);
        assert_eq!(padded.len(), 16);
        assert_eq!(unpad_string(&padded), "test");
    }

    #[test]
    fn human_size_steps_units() {
        assert_eq!(human_size(7), "7B");
        assert_eq!(human_size(1024), "1.00KB");
        assert_eq!(human_size(10 * 1024 * 1024 + 256 * 1024), "10.25MB");
    }
}
