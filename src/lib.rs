pub mod capture;
pub mod error;
pub mod save;
pub mod snapshot;
#[cfg(target_os = "linux")]
pub mod utils;

use std::path::{Path, PathBuf};

use capture::frame::PixelFormat;
use capture::poll::PollConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use error::{Error, Result};

/// Prefix for environment overrides, e.g. `ALCAM__CAMERA__WIDTH=640`
pub const ENV_PREFIX: &str = "ALCAM";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    pub poll: PollConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// `None` lets the camera pick from the formats we can decode
    pub format: Option<PixelFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub save: bool,
    pub path: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 720,
            format: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save: true,
            path: None,
        }
    }
}

impl Config {
    /// Load defaults, then `file` (TOML) if given, then `ALCAM__*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = file {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};

    // Environment variables are process-wide; tests that load config take this
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets variables and restores their previous values on drop
    struct EnvVars(Vec<(&'static str, Option<OsString>)>);

    impl EnvVars {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            let saved = vars
                .iter()
                .map(|(key, value)| {
                    let old = std::env::var_os(key);
                    std::env::set_var(key, value);
                    (*key, old)
                })
                .collect();
            Self(saved)
        }
    }

    impl Drop for EnvVars {
        fn drop(&mut self) {
            for (key, old) in &self.0 {
                match old {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn defaults_without_file() {
        let _lock = env_lock();
        let config = Config::load(None).unwrap();
        assert_eq!(config.camera.index, 0);
        assert_eq!((config.camera.width, config.camera.height), (1280, 720));
        assert_eq!(config.camera.format, None);
        assert_eq!(config.poll.interval_ms, 5);
        assert_eq!(config.poll.timeout_ms, 10_000);
        assert!(config.output.save);
        assert!(config.output.path.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let _lock = env_lock();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[camera]
index = 2
width = 640
format = "mjpeg"

[poll]
timeout_ms = 0

[output]
save = false
path = "shots/first.png"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.camera.index, 2);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 720);
        assert_eq!(config.camera.format, Some(PixelFormat::Mjpeg));
        assert_eq!(config.poll.interval_ms, 5);
        assert_eq!(config.poll.policy().timeout, None);
        assert!(!config.output.save);
        assert_eq!(config.output.path, Some(PathBuf::from("shots/first.png")));
    }

    #[test]
    fn environment_overrides_defaults() {
        let _lock = env_lock();
        let _vars = EnvVars::set(&[
            ("ALCAM__CAMERA__WIDTH", "640"),
            ("ALCAM__CAMERA__FORMAT", "mjpeg"),
            ("ALCAM__POLL__TIMEOUT_MS", "250"),
        ]);

        let config = Config::load(None).unwrap();
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 720);
        assert_eq!(config.camera.format, Some(PixelFormat::Mjpeg));
        assert_eq!(config.poll.timeout_ms, 250);
    }

    #[test]
    fn environment_overrides_file() {
        let _lock = env_lock();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[camera]\nwidth = 320\nheight = 240").unwrap();
        let _vars = EnvVars::set(&[("ALCAM__CAMERA__HEIGHT", "200")]);

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!((config.camera.width, config.camera.height), (320, 200));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
