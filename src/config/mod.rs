use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub index: IndexConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory count above which moderate memory pressure trims directories.
    pub directory_soft_limit: usize,
    /// Run the consistency checker after every reconciliation pass.
    pub check_consistency_after_passes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Hide excluded directories; when false only ignored names are hidden.
    pub hide_excluded_files: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { directory_soft_limit: 4096, check_consistency_after_passes: false }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { hide_excluded_files: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "fileview=debug,info".to_string(), json: false }
    }
}

impl Config {
    /// Load configuration from an optional file, then `FILEVIEW__*` environment variables.
    ///
    /// Without an explicit path, `fileview.{toml,yaml,json}` in the working directory is
    /// picked up when present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("fileview").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("FILEVIEW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.cache.directory_soft_limit, 4096);
        assert!(!config.cache.check_consistency_after_passes);
        assert!(config.index.hide_excluded_files);
        assert_eq!(config.logging.filter, "fileview=debug,info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"cache": {"directory_soft_limit": 16}}"#).unwrap();

        assert_eq!(config.cache.directory_soft_limit, 16);
        assert!(!config.cache.check_consistency_after_passes);
        assert!(config.index.hide_excluded_files);
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"cache": {{"check_consistency_after_passes": true}}, "logging": {{"json": true}}}}"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert!(config.cache.check_consistency_after_passes);
        assert!(config.logging.json);
        assert_eq!(config.cache.directory_soft_limit, 4096);
    }

    #[test]
    #[serial]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        unsafe {
            env::set_var("FILEVIEW__CACHE__DIRECTORY_SOFT_LIMIT", "12");
            env::set_var("FILEVIEW__INDEX__HIDE_EXCLUDED_FILES", "false");
        }

        let config = Config::load(None);

        unsafe {
            env::remove_var("FILEVIEW__CACHE__DIRECTORY_SOFT_LIMIT");
            env::remove_var("FILEVIEW__INDEX__HIDE_EXCLUDED_FILES");
        }

        let config = config.unwrap();
        assert_eq!(config.cache.directory_soft_limit, 12);
        assert!(!config.index.hide_excluded_files);
    }
}
