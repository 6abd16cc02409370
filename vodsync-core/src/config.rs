use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Optional defaults file for `vodsyncctl`. Every key can also be supplied
/// (and is overridden) by a command-line flag, so all sections and fields
/// are optional here; requiredness is enforced at the CLI boundary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VodsyncConfig {
    pub cluster: ClusterSection,
    pub library: LibrarySection,
    pub transcode: TranscodeSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Base URL of the scheduler's batch API, e.g. https://cluster:6443/apis/batch/v1
    pub api_url: Option<String>,
    pub namespace: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LibrarySection {
    /// Base URL of the catalog server, e.g. http://192.168.0.105:32400
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub name: Option<String>,
    /// Root of the published share the catalog indexes.
    pub share: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TranscodeSection {
    pub preset: Option<String>,
    /// Alternative job manifest template; the built-in one is used otherwise.
    pub template_path: Option<String>,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<VodsyncConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vodsync.toml");
        std::fs::write(
            &path,
            "[library]\nserver_url = \"http://catalog:32400\"\nname = \"Movies\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            config.library.server_url.as_deref(),
            Some("http://catalog:32400")
        );
        assert_eq!(config.library.name.as_deref(), Some("Movies"));
        assert!(config.cluster.api_url.is_none());
        assert!(config.transcode.preset.is_none());
    }

    #[test]
    fn unreadable_config_reports_the_path() {
        let err = load_config("/nonexistent/vodsync.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/vodsync.toml"));
    }
}
