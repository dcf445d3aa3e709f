use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Largest PSI section accepted before it is dropped as malformed
pub const DEFAULT_MAX_SECTION_SIZE: usize = 4096;
/// Buffer capacity for PES packets that declare a length of zero
pub const DEFAULT_UNIT_CAPACITY: usize = 200 * 1024;
/// Depth of each bounded queue in the pipelined demuxer
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

const CONFIG_PATHS: [&str; 2] = ["./tsdemux.toml", "./tsdemux_config.toml"];

/// Tunables for a demux session.
#[derive(Debug, Clone, PartialEq)]
pub struct DemuxConfig {
    pub max_section_size: usize,
    pub default_unit_capacity: usize,
    /// Upper bound on any single source read; `None` waits indefinitely
    pub read_timeout: Option<Duration>,
    pub queue_depth: usize,
    /// Check CRC_32 on complete PSI sections and drop those that fail
    pub verify_crc: bool,
    /// Emit in-flight partial units when the source is exhausted
    pub flush_on_eof: bool,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            max_section_size: DEFAULT_MAX_SECTION_SIZE,
            default_unit_capacity: DEFAULT_UNIT_CAPACITY,
            read_timeout: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            verify_crc: false,
            flush_on_eof: false,
        }
    }
}

impl DemuxConfig {
    /// Loads the configuration: defaults, then `TSDEMUX_*` environment
    /// variables, then the first config file found in the working directory.
    pub fn load() -> Self {
        let mut config = Self::from_env();
        for path in &CONFIG_PATHS {
            if config.apply_file(path) {
                break;
            }
        }
        config
    }

    /// Defaults overridden by `TSDEMUX_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        for (key, value) in env::vars() {
            if let Some(name) = key.strip_prefix("TSDEMUX_") {
                config.set(&name.to_ascii_lowercase(), &value);
            }
        }
        config
    }

    /// Applies `key = value` lines from a file. Returns false if the file
    /// could not be read.
    pub fn apply_file<P: AsRef<Path>>(&mut self, path: P) -> bool {
        let Ok(mut file) = File::open(path.as_ref()) else {
            return false;
        };
        let mut content = String::new();
        if file.read_to_string(&mut content).is_err() {
            return false;
        }
        self.apply_str(&content);
        true
    }

    /// Applies `key = value` lines; `#` starts a comment.
    pub fn apply_str(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                self.set(key.trim(), value);
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        let applied = match key {
            "max_section_size" => value.parse().map(|v| self.max_section_size = v).is_ok(),
            "default_unit_capacity" => value
                .parse()
                .map(|v| self.default_unit_capacity = v)
                .is_ok(),
            "read_timeout_ms" => value
                .parse::<u64>()
                .map(|ms| {
                    self.read_timeout = (ms > 0).then(|| Duration::from_millis(ms));
                })
                .is_ok(),
            "queue_depth" => value
                .parse::<usize>()
                .map(|v| self.queue_depth = v.max(1))
                .is_ok(),
            "verify_crc" => value.parse().map(|v| self.verify_crc = v).is_ok(),
            "flush_on_eof" => value.parse().map(|v| self.flush_on_eof = v).is_ok(),
            _ => return,
        };
        if !applied {
            log::warn!("ignoring invalid config value {} = {:?}", key, value);
        }
    }
}
