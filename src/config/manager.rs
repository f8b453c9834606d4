//! Configuration source wrangling
// (c) 2024 Ross Younger

use std::{fmt::Debug, path::Path};

use figment::{
    Figment, Provider,
    providers::{Env, Format as _, Toml},
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ConfigFileError, SimulatorConfiguration, SystemDefault};

/// Environment variable prefix for configuration overrides, e.g. `SIMCAM_MODEL`.
///
/// Nested fields are separated by a double underscore, e.g. `SIMCAM_CUSTOM_LATENCY__SMALL`.
pub const ENV_PREFIX: &str = "SIMCAM_";

/// Processes and merges all configuration sources.
///
/// In order of increasing priority:
/// 1. Hard-wired defaults
/// 2. A TOML configuration file, if given
/// 3. Environment variables with the [`ENV_PREFIX`] prefix
/// 4. Anything merged in by the caller via [`Manager::merge_provider`]
#[derive(Debug, Default)]
pub struct Manager {
    /// Configuration data
    data: Figment,
}

impl Manager {
    fn new(config_file: Option<&Path>, apply_env: bool) -> Self {
        let mut new1 = Self::empty();
        new1.apply_system_default();
        if let Some(path) = config_file {
            new1.add_config_file(path);
        }
        if apply_env {
            new1.merge_provider(Env::prefixed(ENV_PREFIX).split("__"));
        }
        new1
    }

    /// General constructor for production use.
    ///
    /// Reads the given configuration file (if any) and applies the environment.
    #[must_use]
    pub fn standard(config_file: Option<&Path>) -> Self {
        Self::new(config_file, true)
    }

    /// Testing/internal constructor: does not read files or the environment, DOES apply system defaults.
    #[must_use]
    pub fn without_files() -> Self {
        Self::new(None, false)
    }

    /// Constructor that contains no data at all, not even the system defaults
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: Figment::new(),
        }
    }

    fn add_config_file(&mut self, path: &Path) {
        if !path.exists() {
            warn!("configuration file {path:?} not present");
            return;
        }
        debug!("reading configuration file {path:?}");
        self.merge_provider(Toml::file_exact(path));
    }

    /// Merges in a data set, which is some sort of [figment::Provider](https://docs.rs/figment/latest/figment/trait.Provider.html).
    /// This uses figment's `merge` operation, which prefers to _replace_ existing items.
    pub fn merge_provider<T>(&mut self, provider: T)
    where
        T: Provider,
    {
        let f = std::mem::take(&mut self.data);
        self.data = f.merge(provider); // in the error case, this leaves the provider in a fused state
    }

    /// Merges in TOML text, such as might be embedded in a test or an application bundle
    pub fn merge_toml_str(&mut self, toml: &str) {
        self.merge_provider(Toml::string(toml));
    }

    /// Applies the system default settings, at a lower priority than everything else
    pub fn apply_system_default(&mut self) {
        let f = std::mem::take(&mut self.data);
        self.data = f.join(SystemDefault {});
    }

    /// Attempts to extract a particular struct from the data.
    ///
    /// `T` is usually [`SimulatorConfiguration`], but it isn't intrinsically required to be.
    pub fn get<'de, T>(&self) -> Result<T, ConfigFileError>
    where
        T: Deserialize<'de>,
    {
        self.data.extract_lossy::<T>().map_err(ConfigFileError::from)
    }

    /// Extracts and validates a [`SimulatorConfiguration`]
    pub fn configuration(&self) -> anyhow::Result<SimulatorConfiguration> {
        let cfg = self.get::<SimulatorConfiguration>()?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::Manager;
    use crate::config::{
        Authentication, ConnectionSpeed, FileSystemAccess, LatencyModel, SimulatorConfiguration,
    };
    use pretty_assertions::assert_eq;
    use std::{io::Write as _, path::PathBuf, time::Duration};

    #[test]
    fn defaults() {
        let mgr = Manager::without_files();
        let result = mgr.configuration().unwrap();
        assert_eq!(&result, SimulatorConfiguration::system_default());
    }

    #[test]
    fn toml_overrides_defaults() {
        let mut mgr = Manager::without_files();
        mgr.merge_toml_str(
            r#"
            model = "Test Camera"
            connection_speed = "Instant"
            file_system_access = "exclusive"
            storage_root = "/tmp/card"
            pair_on_device_delay = 0.5

            [authentication]
            type = "username-password"
            username = "user"
            password = "hunter2"
            "#,
        );
        let cfg = mgr.configuration().unwrap();
        assert_eq!(cfg.model, "Test Camera");
        assert_eq!(cfg.manufacturer, "Cascable");
        assert_eq!(cfg.connection_speed, ConnectionSpeed::Instant);
        assert_eq!(cfg.file_system_access, FileSystemAccess::Exclusive);
        assert_eq!(cfg.storage_root, Some(PathBuf::from("/tmp/card")));
        assert_eq!(cfg.pair_on_device_delay, Duration::from_millis(500));
        assert_eq!(
            cfg.authentication,
            Authentication::UsernamePassword {
                username: "user".into(),
                password: "hunter2".into()
            }
        );
    }

    #[test]
    fn custom_latency() {
        let mut mgr = Manager::without_files();
        mgr.merge_toml_str(
            r#"
            connection_speed = "custom"
            [custom_latency]
            small = 0.01
            medium = 0.02
            large = 0.03
            "#,
        );
        let cfg = mgr.configuration().unwrap();
        assert_eq!(
            cfg.latency(),
            LatencyModel::new(
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30)
            )
        );
    }

    #[test]
    fn config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "identifier = \"from-file\"").unwrap();
        let mgr = Manager::standard(Some(file.path()));
        let cfg = mgr.configuration().unwrap();
        assert_eq!(cfg.identifier, "from-file");
    }

    #[test]
    fn missing_config_file_is_not_fatal() {
        let mgr = Manager::standard(Some(std::path::Path::new("/no/such/simcam.toml")));
        let _ = mgr.configuration().unwrap();
    }

    #[test]
    fn bad_enum_value() {
        let mut mgr = Manager::without_files();
        mgr.merge_toml_str(r#"file_system_access = "sometimes""#);
        let err = mgr.get::<SimulatorConfiguration>().unwrap_err();
        assert!(err.to_string().contains("sometimes"), "{err}");
    }

    #[test]
    fn validation_failure() {
        let mut mgr = Manager::without_files();
        mgr.merge_toml_str("live_view_frame_rate = 0");
        let err = mgr.configuration().unwrap_err();
        assert!(err.to_string().contains("live_view_frame_rate"));
    }
}
