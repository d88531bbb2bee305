//! Black-box tests that drive the real wire protocol against a mock
//! tracker/storage server (`support::spawn_scripted_server`), rather than a
//! live FastDFS cluster. Scenarios mirror the loopback-address upload,
//! download, delete, metadata, and group-listing exchanges a real cluster
//! would produce, with addresses resolved to `127.0.0.1` test ports instead
//! of the illustrative `10.0.0.2` used for documentation elsewhere.

mod support;

use fdfs_client::types::{FDFS_GROUP_NAME_MAX_LEN, StorageCommand, TrackerCommand};
use fdfs_client::{protocol, Client, ClientConfig, FastDfsError, Metadata, MetadataFlag};

fn test_client(tracker_port: u16) -> Client {
    let config = ClientConfig::parse(&support::tracker_conf(tracker_port)).unwrap();
    Client::new(config).unwrap()
}

#[test]
fn scenario_upload_by_filename() {
    let storage_port = support::spawn_scripted_server(vec![Box::new(|stream: &mut std::net::TcpStream| {
        let req = support::read_frame(stream);
        assert_eq!(req.cmd, StorageCommand::UploadFile as u8);

        let file_size = protocol::decode_u64(&req.body[1..9]);
        let ext = protocol::unpad_string(&req.body[9..15]);
        assert_eq!(ext, "jpg");
        let payload = &req.body[15..15 + file_size as usize];
        assert_eq!(payload, b"hello-jpg-body");

        let mut resp = protocol::pad_string("group1", FDFS_GROUP_NAME_MAX_LEN).to_vec();
        resp.extend_from_slice(b"M00/00/AB.jpg");
        support::write_frame(stream, 0, &resp);
    })]);

    let tracker_port = support::spawn_scripted_server(vec![Box::new(move |stream: &mut std::net::TcpStream| {
        let req = support::read_frame(stream);
        assert_eq!(req.cmd, TrackerCommand::ServiceQueryStoreWithoutGroupOne as u8);
        let resp = support::storage_server_response("127.0.0.1", storage_port, true);
        support::write_frame(stream, 0, &resp);
    })]);

    let client = test_client(tracker_port);
    let temp = std::env::temp_dir().join("fdfs-wire-scenario-upload.jpg");
    std::fs::write(&temp, b"hello-jpg-body").unwrap();

    let uploaded = client
        .upload_by_filename(&temp, None)
        .expect("upload by filename should succeed against the mock storage server");
    assert_eq!(uploaded.group_name, "group1");
    assert_eq!(uploaded.remote_filename, "M00/00/AB.jpg");
    assert_eq!(uploaded.file_id(), "group1/M00/00/AB.jpg");

    std::fs::remove_file(&temp).ok();
}

#[test]
fn scenario_upload_rollback_on_metadata_failure() {
    let storage_port = support::spawn_scripted_server(vec![
        Box::new(|stream: &mut std::net::TcpStream| {
            // Connection #1: upload succeeds, then the reused pooled
            // connection is handed a SET_METADATA that fails.
            let upload_req = support::read_frame(stream);
            assert_eq!(upload_req.cmd, StorageCommand::UploadFile as u8);
            let mut resp = protocol::pad_string("group1", FDFS_GROUP_NAME_MAX_LEN).to_vec();
            resp.extend_from_slice(b"M00/00/AB.jpg");
            support::write_frame(stream, 0, &resp);

            let meta_req = support::read_frame(stream);
            assert_eq!(meta_req.cmd, StorageCommand::SetMetadata as u8);
            support::write_frame(stream, 28, &[]); // ENOSPC
        }),
        Box::new(|stream: &mut std::net::TcpStream| {
            // Connection #2: the rollback delete, on a fresh connection
            // since the failed metadata call discarded the first one.
            let delete_req = support::read_frame(stream);
            assert_eq!(delete_req.cmd, StorageCommand::DeleteFile as u8);
            support::write_frame(stream, 0, &[]);
        }),
    ]);

    let tracker_port = support::spawn_scripted_server(vec![Box::new(move |stream: &mut std::net::TcpStream| {
        let _req = support::read_frame(stream);
        let resp = support::storage_server_response("127.0.0.1", storage_port, true);
        support::write_frame(stream, 0, &resp);
    })]);

    let client = test_client(tracker_port);
    let temp = std::env::temp_dir().join("fdfs-wire-scenario-rollback.jpg");
    std::fs::write(&temp, b"payload").unwrap();

    let mut metadata = Metadata::new();
    metadata.insert("author", "tester");

    let result = client.upload_by_filename(&temp, Some(&metadata));
    assert!(
        matches!(result, Err(FastDfsError::DataError(_))),
        "a failed metadata set should surface as a data error with the server's errno"
    );

    std::fs::remove_file(&temp).ok();
}

#[test]
fn scenario_download_whole_file_to_buffer() {
    let storage_port = support::spawn_scripted_server(vec![Box::new(|stream: &mut std::net::TcpStream| {
        let req = support::read_frame(stream);
        assert_eq!(req.cmd, StorageCommand::DownloadFile as u8);
        let offset = protocol::decode_u64(&req.body[0..8]);
        let size = protocol::decode_u64(&req.body[8..16]);
        assert_eq!((offset, size), (0, 0));
        let group = protocol::unpad_string(&req.body[16..16 + FDFS_GROUP_NAME_MAX_LEN]);
        assert_eq!(group, "group1");
        let filename =
            String::from_utf8(req.body[16 + FDFS_GROUP_NAME_MAX_LEN..].to_vec()).unwrap();
        assert_eq!(filename, "M00/00/AB.jpg");

        support::write_frame(stream, 0, b"hello\r\n");
    })]);

    let tracker_port = support::spawn_scripted_server(vec![Box::new(move |stream: &mut std::net::TcpStream| {
        let req = support::read_frame(stream);
        assert_eq!(req.cmd, TrackerCommand::ServiceQueryFetchOne as u8);
        let resp = support::storage_server_response("127.0.0.1", storage_port, false);
        support::write_frame(stream, 0, &resp);
    })]);

    let client = test_client(tracker_port);
    let downloaded = client
        .download_to_buffer("group1/M00/00/AB.jpg", 0, 0)
        .expect("whole-file download should succeed against the mock storage server");
    assert_eq!(downloaded.content.as_ref(), b"hello\r\n".as_slice());
    assert_eq!(downloaded.download_size, "7B");
}

#[test]
fn scenario_delete() {
    let storage_port = support::spawn_scripted_server(vec![Box::new(|stream: &mut std::net::TcpStream| {
        let req = support::read_frame(stream);
        assert_eq!(req.cmd, StorageCommand::DeleteFile as u8);
        support::write_frame(stream, 0, &[]);
    })]);

    let tracker_port = support::spawn_scripted_server(vec![Box::new(move |stream: &mut std::net::TcpStream| {
        let req = support::read_frame(stream);
        assert_eq!(req.cmd, TrackerCommand::ServiceQueryUpdate as u8);
        let resp = support::storage_server_response("127.0.0.1", storage_port, false);
        support::write_frame(stream, 0, &resp);
    })]);

    let client = test_client(tracker_port);
    let outcome = client
        .delete_file("group1/M00/00/AB.jpg")
        .expect("delete should succeed against the mock storage server");
    assert_eq!(outcome.status, "Delete file successed.");
    assert_eq!(outcome.file_id, "group1/M00/00/AB.jpg");
    assert_eq!(outcome.storage_ip, "127.0.0.1");
}

#[test]
fn scenario_set_metadata_merge() {
    let storage_port = support::spawn_scripted_server(vec![Box::new(|stream: &mut std::net::TcpStream| {
        let req = support::read_frame(stream);
        assert_eq!(req.cmd, StorageCommand::SetMetadata as u8);
        // op_flag sits right after the two 8-byte length fields.
        assert_eq!(req.body[16], b'M');
        support::write_frame(stream, 0, &[]);
    })]);

    let tracker_port = support::spawn_scripted_server(vec![Box::new(move |stream: &mut std::net::TcpStream| {
        let req = support::read_frame(stream);
        assert_eq!(req.cmd, TrackerCommand::ServiceQueryUpdate as u8);
        let resp = support::storage_server_response("127.0.0.1", storage_port, false);
        support::write_frame(stream, 0, &resp);
    })]);

    let client = test_client(tracker_port);
    let mut metadata = Metadata::new();
    metadata.insert("author", "tester");
    let outcome = client
        .set_metadata("group1/M00/00/AB.jpg", &metadata, MetadataFlag::Merge)
        .expect("merge set_metadata should succeed against the mock storage server");
    assert_eq!(outcome.status, "Set meta data success.");
}

#[test]
fn scenario_list_all_groups() {
    let tracker_port = support::spawn_scripted_server(vec![Box::new(|stream: &mut std::net::TcpStream| {
        let req = support::read_frame(stream);
        assert_eq!(req.cmd, TrackerCommand::ServerListAllGroups as u8);

        let mut body = Vec::new();
        for name in ["group1", "group2"] {
            body.extend_from_slice(&protocol::pad_string(name, FDFS_GROUP_NAME_MAX_LEN + 1));
            for v in [100u64, 50, 10, 2, 23000, 80, 2, 0, 1, 2, 0] {
                body.extend_from_slice(&protocol::encode_u64(v));
            }
        }
        support::write_frame(stream, 0, &body);
    })]);

    let client = test_client(tracker_port);
    let listing = client
        .list_all_groups()
        .expect("list_all_groups should succeed against the mock tracker");
    assert_eq!(listing.groups.len(), 2);
    assert_eq!(listing.groups[0].group_name, "group1");
    assert_eq!(listing.groups[0].total_mb, 100);
    assert_eq!(listing.groups[1].group_name, "group2");
}
