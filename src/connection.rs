//! Blocking TCP connections and the fork-safe connection pool that manages them.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use rand::seq::SliceRandom;

use crate::errors::{FastDfsError, Result};

const MAX_CONNECT_ATTEMPTS: usize = 10;

/// One TCP endpoint, bound to a tracker or storage address, with a timeout
/// applied to every syscall.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: String,
}

impl Connection {
    /// Connects to a uniformly-random candidate from `addrs`, applying `timeout`
    /// to the connect attempt and to every subsequent send/recv.
    pub fn connect(addrs: &[(String, u16)], timeout: Duration) -> Result<Connection> {
        if addrs.is_empty() {
            return Err(FastDfsError::ConnectionError(
                "no candidate addresses configured".to_string(),
            ));
        }

        let mut rng = rand::thread_rng();
        let (host, port) = addrs
            .choose(&mut rng)
            .expect("addrs checked non-empty above");

        let peer = format!("{}:{}", host, port);
        log::debug!("connecting to {}", peer);

        use std::net::ToSocketAddrs;
        let addr = (host.as_str(), *port)
            .to_socket_addrs()
            .map_err(|e| FastDfsError::ConnectionError(format!("resolve {} failed: {}", peer, e)))?
            .next()
            .ok_or_else(|| FastDfsError::ConnectionError(format!("{} resolved to no addresses", peer)))?;

        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| FastDfsError::ConnectionError(format!("connect to {} failed: {}", peer, e)))?;
        stream.set_read_timeout(Some(timeout)).ok();
        stream.set_write_timeout(Some(timeout)).ok();
        stream.set_nodelay(true).ok();

        Ok(Connection { stream, peer })
    }

    /// Sends `data` in full, bubbling up any I/O error.
    pub fn send_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).map_err(|e| {
            FastDfsError::ConnectionError(format!("send to {} failed: {}", self.peer, e))
        })
    }

    /// Streams `len` bytes from `reader` directly onto the socket, in chunks.
    pub fn send_from_reader<R: Read>(&mut self, reader: &mut R, len: u64, chunk_size: usize) -> Result<()> {
        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            reader
                .read_exact(&mut buf[..want])
                .map_err(|e| FastDfsError::ConnectionError(format!("read payload failed: {}", e)))?;
            self.send_all(&buf[..want])?;
            remaining -= want as u64;
        }
        Ok(())
    }

    /// Reads exactly `n` bytes, treating EOF before `n` bytes as a connection error.
    pub fn recv_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.stream.read_exact(&mut buf).map_err(|e| {
            FastDfsError::ConnectionError(format!("recv from {} failed: {}", self.peer, e))
        })?;
        Ok(buf)
    }

    /// Reads exactly `len` bytes from the socket and writes them to `writer` in chunks.
    pub fn recv_to_writer<W: Write>(&mut self, writer: &mut W, len: u64, chunk_size: usize) -> Result<()> {
        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            self.stream.read_exact(&mut buf[..want]).map_err(|e| {
                FastDfsError::ConnectionError(format!("recv from {} failed: {}", self.peer, e))
            })?;
            writer
                .write_all(&buf[..want])
                .map_err(|e| FastDfsError::ConnectionError(format!("write payload failed: {}", e)))?;
            remaining -= want as u64;
        }
        Ok(())
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer
    }

    pub fn close(self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

struct PoolState {
    idle: Vec<Connection>,
    in_use_count: usize,
    pid: u32,
}

/// A bounded, fork-safe pool of connections to one set of interchangeable
/// endpoints (typically the tracker cluster, or a single storage server).
pub struct ConnectionPool {
    name: String,
    addrs: Vec<(String, u16)>,
    timeout: Duration,
    max_conn: usize,
    state: parking_lot::Mutex<PoolState>,
}

impl ConnectionPool {
    pub fn new(name: impl Into<String>, addrs: Vec<(String, u16)>, timeout: Duration, max_conn: usize) -> Self {
        ConnectionPool {
            name: name.into(),
            addrs,
            timeout,
            max_conn,
            state: parking_lot::Mutex::new(PoolState {
                idle: Vec::new(),
                in_use_count: 0,
                pid: std::process::id(),
            }),
        }
    }

    /// Checks out a connection: reuses an idle one if available, otherwise
    /// creates a new one (bounded by `max_conn` and a bounded connect retry).
    pub fn acquire(&self) -> Result<Connection> {
        let mut state = self.state.lock();
        if state.pid != std::process::id() {
            log::warn!("pool {} detected fork, resetting connections", self.name);
            state.idle.clear();
            state.in_use_count = 0;
            state.pid = std::process::id();
        }

        if let Some(conn) = state.idle.pop() {
            state.in_use_count += 1;
            return Ok(conn);
        }

        if self.max_conn > 0 && state.in_use_count >= self.max_conn {
            log::warn!(
                "pool {} exhausted: {} connections in use, max {}",
                self.name, state.in_use_count, self.max_conn
            );
            return Err(FastDfsError::ConnectionError(format!(
                "pool {} exhausted: {} connections in use",
                self.name, state.in_use_count
            )));
        }

        let mut last_err = None;
        for attempt in 1..=MAX_CONNECT_ATTEMPTS {
            match Connection::connect(&self.addrs, self.timeout) {
                Ok(conn) => {
                    state.in_use_count += 1;
                    return Ok(conn);
                }
                Err(e) => {
                    log::warn!("pool {} connect attempt {} failed: {}", self.name, attempt, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            FastDfsError::ConnectionError(format!("pool {} failed to connect", self.name))
        }))
    }

    /// Returns a healthy connection to the idle queue.
    pub fn release(&self, conn: Connection) {
        let mut state = self.state.lock();
        if state.pid != std::process::id() {
            conn.close();
            return;
        }
        state.in_use_count = state.in_use_count.saturating_sub(1);
        state.idle.push(conn);
    }

    /// Discards a broken connection without returning it to the idle queue.
    pub fn discard(&self, conn: Connection) {
        let mut state = self.state.lock();
        state.in_use_count = state.in_use_count.saturating_sub(1);
        conn.close();
    }

    /// Closes every idle connection and resets the in-use counter.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        for conn in state.idle.drain(..) {
            conn.close();
        }
        state.in_use_count = 0;
    }

    #[cfg(test)]
    pub(crate) fn live_count(&self) -> usize {
        let state = self.state.lock();
        state.idle.len() + state.in_use_count
    }

    #[cfg(test)]
    pub(crate) fn set_pid_for_test(&self, pid: u32) {
        self.state.lock().pid = pid;
    }
}

/// RAII guard returning a connection to its pool on drop unless it was
/// explicitly consumed as broken via [`PooledConnection::mark_broken`].
pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    pool: &'a ConnectionPool,
}

impl<'a> PooledConnection<'a> {
    pub fn new(conn: Connection, pool: &'a ConnectionPool) -> Self {
        PooledConnection { conn: Some(conn), pool }
    }

    pub fn mark_broken(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard(conn);
        }
    }
}

impl<'a> std::ops::Deref for PooledConnection<'a> {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken")
    }
}

impl<'a> std::ops::DerefMut for PooledConnection<'a> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken")
    }
}

impl<'a> Drop for PooledConnection<'a> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
