//! Unit tests for the FastDFS client configuration and construction.
//!
//! These tests verify configuration parsing and client construction without
//! requiring a running FastDFS cluster; see `integration_tests.rs` for tests
//! that exercise a real tracker and storage server.

use fdfs_client::{Client, ClientConfig, FastDfsError};
use std::io::Write;

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_client_creation_valid_config() {
        let config = ClientConfig::parse(
            "connect_timeout=30\ntracker_server=127.0.0.1:22122\n",
        )
        .unwrap();

        // Building a client never dials out; the pool connects lazily.
        let result = Client::new(config);
        assert!(result.is_ok(), "client construction should not require a live tracker");
    }

    #[test]
    fn test_client_creation_empty_trackers() {
        let result = ClientConfig::parse("connect_timeout=30\n");
        assert!(result.is_err(), "missing tracker_server should be a config error");
    }

    #[test]
    fn test_client_creation_missing_connect_timeout() {
        let result = ClientConfig::parse("tracker_server=127.0.0.1:22122\n");
        assert!(
            matches!(result, Err(FastDfsError::ConfigError(_))),
            "missing connect_timeout should be a config error"
        );
    }

    #[test]
    fn test_client_creation_invalid_tracker_address() {
        let result = ClientConfig::parse("connect_timeout=30\ntracker_server=notanaddress\n");
        assert!(result.is_err(), "tracker_server without a port should fail to parse");
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::parse(
            "connect_timeout=5\ntracker_server=127.0.0.1:22122\n",
        )
        .unwrap();
        assert_eq!(config.max_conns, 0, "max_conns defaults to unbounded (0)");
        assert_eq!(config.network_timeout, std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_config_custom_max_conns() {
        let config = ClientConfig::parse(
            "connect_timeout=5\ntracker_server=127.0.0.1:22122\nmax_conns=20\n",
        )
        .unwrap();
        assert_eq!(config.max_conns, 20);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "connect_timeout=10").unwrap();
        writeln!(file, "tracker_server=127.0.0.1:22122").unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.tracker_port, 22122);
    }

    #[test]
    fn test_config_from_missing_file() {
        let result = ClientConfig::from_file("/nonexistent/path/client.conf");
        assert!(matches!(result, Err(FastDfsError::Io(_))));
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_upload_nonexistent_file_is_data_error() {
        let config = ClientConfig::parse(
            "connect_timeout=1\ntracker_server=127.0.0.1:1\n",
        )
        .unwrap();
        let client = Client::new(config).unwrap();

        let result = client.upload_by_filename("/nonexistent/does-not-exist.bin", None);
        assert!(
            matches!(result, Err(FastDfsError::DataError(_))),
            "uploading a nonexistent path should fail before any network I/O"
        );
    }

    #[test]
    fn test_operation_on_malformed_file_id() {
        let config = ClientConfig::parse(
            "connect_timeout=1\ntracker_server=127.0.0.1:1\n",
        )
        .unwrap();
        let client = Client::new(config).unwrap();

        let result = client.delete_file("no-separator-here");
        assert!(
            matches!(result, Err(FastDfsError::DataError(_))),
            "a file id with no group separator should fail before any network I/O"
        );
    }
}
