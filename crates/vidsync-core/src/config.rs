use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub watch_paths: Vec<String>,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,
    #[serde(default = "default_sidecar_extensions")]
    pub sidecar_extensions: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// Size of the scan/probe pool. Zero means one thread per available core.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Directory depth walked below each watched path. 1 lists only direct children.
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    #[serde(default = "default_auto_write_back")]
    pub auto_write_back: bool,
}

fn default_database_path() -> String {
    "vidsync.db".to_string()
}

fn default_media_extensions() -> Vec<String> {
    ["mp4", "avi", "mkv", "mov"].iter().map(|s| s.to_string()).collect()
}

fn default_sidecar_extensions() -> Vec<String> {
    ["csv", "h5", "txt", "json"].iter().map(|s| s.to_string()).collect()
}

fn default_worker_threads() -> usize {
    4
}

fn default_scan_depth() -> usize {
    1
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_auto_write_back() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watch_paths: Vec::new(),
            database_path: default_database_path(),
            media_extensions: default_media_extensions(),
            sidecar_extensions: default_sidecar_extensions(),
            ignore_patterns: Vec::new(),
            worker_threads: default_worker_threads(),
            scan_depth: default_scan_depth(),
            ffprobe_path: default_ffprobe_path(),
            auto_write_back: default_auto_write_back(),
        }
    }
}

impl AppConfig {
    /// Thread count for the worker pool, resolving zero to the machine's parallelism.
    pub fn effective_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("VIDSYNC")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("watch_paths")
                .with_list_parse_key("media_extensions")
                .with_list_parse_key("sidecar_extensions")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Lower-case an extension list and strip leading dots so lookups compare cleanly.
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut result: Vec<String> = extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    result.sort();
    result.dedup();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_common_video_containers() {
        let config = AppConfig::default();
        assert!(config.media_extensions.contains(&"mp4".to_string()));
        assert!(config.sidecar_extensions.contains(&"csv".to_string()));
        assert_eq!(config.scan_depth, 1);
        assert!(config.auto_write_back);
    }

    #[test]
    fn test_normalize_extensions() {
        let exts = vec![
            ".MP4".to_string(),
            "avi".to_string(),
            " mp4 ".to_string(),
            "".to_string(),
        ];
        assert_eq!(normalize_extensions(&exts), vec!["avi", "mp4"]);
    }

    #[test]
    fn test_effective_worker_threads_resolves_zero() {
        let config = AppConfig {
            worker_threads: 0,
            ..AppConfig::default()
        };
        assert!(config.effective_worker_threads() >= 1);

        let config = AppConfig {
            worker_threads: 3,
            ..AppConfig::default()
        };
        assert_eq!(config.effective_worker_threads(), 3);
    }
}
