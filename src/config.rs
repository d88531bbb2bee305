//! Parser for the FastDFS `client.conf` text format.
//!
//! The format predates INI proper: files may omit section headers entirely, in
//! which case every key/value belongs to an implicit `[__config__]` section.

use std::time::Duration;

use crate::errors::{FastDfsError, Result};

/// A resolved client configuration, ready to build a [`crate::client::Client`] from.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Tracker hostnames (or IPs), in file order. All share `tracker_port`.
    pub tracker_hosts: Vec<String>,
    /// TCP port shared by every tracker host; taken from the *last* `tracker_server` line.
    pub tracker_port: u16,
    /// Per-syscall network timeout applied to connect/send/recv.
    pub network_timeout: Duration,
    /// Maximum live connections per pool; 0 means unbounded.
    pub max_conns: usize,
}

impl ClientConfig {
    /// Parses a `client.conf`-formatted string.
    pub fn parse(text: &str) -> Result<ClientConfig> {
        let entries = parse_entries(text)?;

        let mut tracker_hosts = Vec::new();
        let mut tracker_port: Option<u16> = None;
        let mut connect_timeout: Option<u64> = None;
        let mut max_conns = 0usize;

        for (key, value) in &entries {
            match key.as_str() {
                "tracker_server" => {
                    let (host, port) = value.split_once(':').ok_or_else(|| {
                        FastDfsError::ConfigError(format!(
                            "tracker_server must be host:port, got {:?}",
                            value
                        ))
                    })?;
                    tracker_hosts.push(host.to_string());
                    let port: u16 = port.trim().parse().map_err(|_| {
                        FastDfsError::ConfigError(format!("invalid tracker_server port: {:?}", port))
                    })?;
                    tracker_port = Some(port);
                }
                "connect_timeout" => {
                    connect_timeout = Some(value.trim().parse().map_err(|_| {
                        FastDfsError::ConfigError(format!(
                            "connect_timeout must be an integer, got {:?}",
                            value
                        ))
                    })?);
                }
                "max_conns" => {
                    max_conns = value.trim().parse().unwrap_or(0);
                }
                _ => {}
            }
        }

        if tracker_hosts.is_empty() {
            return Err(FastDfsError::ConfigError(
                "client.conf must specify at least one tracker_server".to_string(),
            ));
        }
        let tracker_port = tracker_port.ok_or_else(|| {
            FastDfsError::ConfigError("client.conf missing tracker_server port".to_string())
        })?;
        let connect_timeout = connect_timeout.ok_or_else(|| {
            FastDfsError::ConfigError("client.conf missing connect_timeout".to_string())
        })?;

        Ok(ClientConfig {
            tracker_hosts,
            tracker_port,
            network_timeout: Duration::from_secs(connect_timeout),
            max_conns,
        })
    }

    /// Reads and parses a `client.conf` file from disk.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<ClientConfig> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }
}

/// Parses the body of a client.conf file into an ordered list of key/value pairs,
/// following `Fdfs_ConfigParser`'s comment and continuation rules. Section headers
/// other than the implicit `[__config__]` are not meaningful to this client and
/// their contents are skipped.
fn parse_entries(text: &str) -> Result<Vec<(String, String)>> {
    let mut entries: Vec<(String, String)> = Vec::new();
    let mut in_default_section = true;
    let mut last_key: Option<String> = None;

    for raw_line in text.lines() {
        if raw_line.trim().is_empty() {
            continue;
        }

        let first = raw_line.as_bytes()[0] as char;
        if first == '#' || first == ';' {
            continue;
        }

        let trimmed_start = raw_line.trim_start();
        if !first.is_whitespace() {
            let mut words = trimmed_start.splitn(2, char::is_whitespace);
            if let Some(first_word) = words.next() {
                if first_word.eq_ignore_ascii_case("rem") {
                    continue;
                }
            }
        }

        // continuation line: leading whitespace, inside an option, non-empty after trim
        if first.is_whitespace() {
            let value = raw_line.trim();
            if !value.is_empty() {
                if let Some(key) = &last_key {
                    if in_default_section {
                        if let Some(entry) = entries.iter_mut().find(|(k, _)| k == key) {
                            entry.1 = format!("{}\n{}", entry.1, value);
                        }
                    }
                }
            }
            continue;
        }

        if trimmed_start.starts_with('[') {
            if let Some(end) = trimmed_start.find(']') {
                let name = &trimmed_start[1..end];
                in_default_section = name == "__config__";
            }
            last_key = None;
            continue;
        }

        if !in_default_section {
            continue;
        }

        let (key, rest) = match trimmed_start.split_once('=').or_else(|| trimmed_start.split_once(':')) {
            Some(parts) => parts,
            None => continue,
        };

        let mut value = rest;
        if let Some(pos) = value.find(';') {
            if pos > 0 && value.as_bytes()[pos - 1].is_ascii_whitespace() {
                value = &value[..pos];
            }
        }
        let key = key.trim().to_lowercase();
        let value = value.trim().to_string();

        entries.push((key.clone(), value));
        last_key = Some(key);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sectionless_file() {
        let cfg = ClientConfig::parse(
            "connect_timeout=30\ntracker_server=10.0.0.1:22122\ntracker_server=10.0.0.2:22122\n",
        )
        .unwrap();
        assert_eq!(cfg.tracker_hosts, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(cfg.tracker_port, 22122);
        assert_eq!(cfg.network_timeout, Duration::from_secs(30));
    }

    #[test]
    fn skips_comments_and_rem_lines() {
        let cfg = ClientConfig::parse(
            "# a comment\n; also a comment\nrem legacy comment\nconnect_timeout = 10\ntracker_server = host:1111\n",
        )
        .unwrap();
        assert_eq!(cfg.tracker_port, 1111);
    }

    #[test]
    fn multiple_tracker_lines_share_last_port() {
        let cfg = ClientConfig::parse(
            "connect_timeout=5\ntracker_server=a:1\ntracker_server=b:2\ntracker_server=c:3\n",
        )
        .unwrap();
        assert_eq!(cfg.tracker_hosts, vec!["a", "b", "c"]);
        assert_eq!(cfg.tracker_port, 3);
    }

    #[test]
    fn missing_connect_timeout_is_config_error() {
        let err = ClientConfig::parse("tracker_server=a:1\n").unwrap_err();
        assert!(matches!(err, FastDfsError::ConfigError(_)));
    }

    #[test]
    fn semicolon_after_space_is_comment() {
        let cfg = ClientConfig::parse(
            "connect_timeout = 10 ; inline comment\ntracker_server = host:1111\n",
        )
        .unwrap();
        assert_eq!(cfg.network_timeout, Duration::from_secs(10));
    }
}
