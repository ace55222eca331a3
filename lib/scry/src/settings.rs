//! Server construction settings. Deserializable so embedders can keep them
//! in TOML alongside their logging configuration.

use crate::collate::CompressionLevel;
use serde_derive::{Deserialize, Serialize};

// Server behaviour flags.
/// Collate messages into collated packets before sending.
pub const SF_COLLATE: u32 = 1;
/// Compress collated packets. Only meaningful with `SF_COLLATE`.
pub const SF_COMPRESS: u32 = 2;
/// The frame control message bypasses collation and compression.
pub const SF_NAKED_FRAME_MESSAGE: u32 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// First port to try listening on.
    pub listen_port: u16,
    /// Ports tried run up to `listen_port + port_range` inclusive.
    pub port_range: u16,
    pub flags: u32,
    /// How long an asynchronous monitor start waits for the thread.
    pub async_timeout_ms: u32,
    /// Per connection packet assembly buffer size.
    pub client_buffer_size: u16,
    pub compression_level: CompressionLevel,
    /// Asynchronous monitor accept tick.
    pub monitor_tick_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> ServerSettings {
        ServerSettings {
            listen_port: 33_500,
            port_range: 0,
            flags: SF_NAKED_FRAME_MESSAGE | SF_COLLATE,
            async_timeout_ms: 5_000,
            client_buffer_size: 65_504,
            compression_level: CompressionLevel::default(),
            monitor_tick_ms: 50,
        }
    }
}

impl ServerSettings {
    #[inline]
    pub fn collate(&self) -> bool {
        self.flags & SF_COLLATE != 0
    }

    #[inline]
    pub fn compress(&self) -> bool {
        self.flags & SF_COMPRESS != 0
    }

    #[inline]
    pub fn naked_frame_message(&self) -> bool {
        self.flags & SF_NAKED_FRAME_MESSAGE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.listen_port, 33_500);
        assert_eq!(settings.client_buffer_size, 65_504);
        assert!(settings.collate());
        assert!(settings.naked_frame_message());
        assert!(!settings.compress());
        assert_eq!(settings.compression_level, CompressionLevel::Medium);
    }

    #[test]
    fn test_load_from_toml() {
        let settings: ServerSettings = serdeconv::from_toml_str(
            r#"
listen_port = 4700
port_range = 4
flags = 3
compression_level = "high"
"#,
        )
        .unwrap();
        assert_eq!(settings.listen_port, 4700);
        assert_eq!(settings.port_range, 4);
        assert!(settings.collate());
        assert!(settings.compress());
        assert!(!settings.naked_frame_message());
        assert_eq!(settings.compression_level, CompressionLevel::High);
        // Unlisted fields keep their defaults.
        assert_eq!(settings.async_timeout_ms, 5_000);
    }
}
