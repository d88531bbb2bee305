//! Shared test fixture: a minimal TCP mock that speaks the FastDFS wire
//! protocol well enough to drive black-box scenarios end to end without a
//! live tracker/storage cluster.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

use fdfs_client::protocol;
use fdfs_client::types::{FDFS_GROUP_NAME_MAX_LEN, FDFS_PROTO_HEADER_LEN, IP_ADDRESS_SIZE};

/// One request frame read off the wire.
pub struct Frame {
    pub cmd: u8,
    pub body: Vec<u8>,
}

/// Reads one request frame (header + body) from `stream`.
pub fn read_frame(stream: &mut TcpStream) -> Frame {
    let mut header = [0u8; FDFS_PROTO_HEADER_LEN];
    stream.read_exact(&mut header).expect("read frame header");
    let decoded = protocol::decode_header(&header).expect("decode frame header");
    let mut body = vec![0u8; decoded.length as usize];
    if decoded.length > 0 {
        stream.read_exact(&mut body).expect("read frame body");
    }
    Frame { cmd: decoded.cmd, body }
}

/// Writes one response frame with the given status and body.
pub fn write_frame(stream: &mut TcpStream, status: u8, body: &[u8]) {
    stream
        .write_all(&protocol::encode_header(body.len() as u64, 0, status))
        .expect("write frame header");
    stream.write_all(body).expect("write frame body");
}

/// Spawns a mock server on an OS-assigned loopback port. `connection_scripts`
/// holds one closure per expected TCP connection, run in order; a client op
/// that discards a pooled connection after an error and reconnects shows up
/// here as a second script entry.
pub fn spawn_scripted_server(
    mut connection_scripts: Vec<Box<dyn FnOnce(&mut TcpStream) + Send>>,
) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        for script in connection_scripts.drain(..) {
            match listener.accept() {
                Ok((mut stream, _)) => script(&mut stream),
                Err(_) => break,
            }
        }
    });
    port
}

/// Builds a tracker "resolve storage server" response body: a discarded
/// group-name field, an ip address, a port, and (for the `*_store_*`
/// commands only) a trailing store-path-index byte.
pub fn storage_server_response(ip: &str, port: u16, with_path_index: bool) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&protocol::pad_string("", FDFS_GROUP_NAME_MAX_LEN));
    body.extend_from_slice(&protocol::pad_string(ip, IP_ADDRESS_SIZE - 1));
    body.extend_from_slice(&protocol::encode_u64(port as u64));
    if with_path_index {
        body.push(0);
    }
    body
}

/// Builds a `client.conf`-formatted string pointing at a mock tracker on loopback.
pub fn tracker_conf(tracker_port: u16) -> String {
    format!("connect_timeout=5\ntracker_server=127.0.0.1:{}\n", tracker_port)
}
