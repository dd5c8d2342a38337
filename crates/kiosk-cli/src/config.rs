//! Configuration Vault – reads/writes `~/.kiosk/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kiosk_runtime::{AdminPin, SupervisorConfig};
use kiosk_types::{SessionConfig, SurfaceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Persisted kiosk configuration stored in `~/.kiosk/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Surface the watchdog keeps in front.
    #[serde(default = "default_target_surface")]
    pub target_surface: String,

    /// URL the kiosk surface loads.
    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// Diagnostic heartbeat period; `0` disables it.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Admin PIN that releases surface pinning.  Stored as plain text, so
    /// the file is created owner-only.
    #[serde(default = "default_admin_pin")]
    pub admin_pin: String,

    #[serde(default = "default_background_grace_secs")]
    pub background_grace_secs: u64,

    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    /// Run the cold-start boot sequence next to the boot profile.
    #[serde(default = "default_redundant_boot_sequence")]
    pub redundant_boot_sequence: bool,

    #[serde(default = "default_repin_delay_ms")]
    pub repin_delay_ms: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("target_surface", &self.target_surface)
            .field("target_url", &self.target_url)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field(
                "admin_pin",
                if self.admin_pin.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("background_grace_secs", &self.background_grace_secs)
            .field("inactivity_timeout_secs", &self.inactivity_timeout_secs)
            .field("redundant_boot_sequence", &self.redundant_boot_sequence)
            .field("repin_delay_ms", &self.repin_delay_ms)
            .finish()
    }
}

fn default_target_surface() -> String {
    "com.example.kiosk".to_string()
}
fn default_target_url() -> String {
    "https://www.techstern.com/".to_string()
}
fn default_heartbeat_interval_secs() -> u64 {
    30
}
fn default_admin_pin() -> String {
    "1234".to_string()
}
fn default_background_grace_secs() -> u64 {
    30
}
fn default_inactivity_timeout_secs() -> u64 {
    30
}
fn default_redundant_boot_sequence() -> bool {
    true
}
fn default_repin_delay_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_surface: default_target_surface(),
            target_url: default_target_url(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            admin_pin: default_admin_pin(),
            background_grace_secs: default_background_grace_secs(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            redundant_boot_sequence: default_redundant_boot_sequence(),
            repin_delay_ms: default_repin_delay_ms(),
        }
    }
}

impl Config {
    /// Session settings handed to the watchdog through its session store.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            target_url: self.target_url.clone(),
            heartbeat_interval_secs: self.heartbeat_interval_secs,
        }
    }

    /// Timing tunables and credentials for the supervisor.  Anything not
    /// persisted keeps its built-in default.
    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            target: SurfaceId::from(self.target_surface.as_str()),
            background_grace: Duration::from_secs(self.background_grace_secs),
            inactivity_timeout: Duration::from_secs(self.inactivity_timeout_secs),
            redundant_boot_sequence: self.redundant_boot_sequence,
            repin_delay: Duration::from_millis(self.repin_delay_ms),
            admin_pin: AdminPin::new(self.admin_pin.as_str()),
            ..SupervisorConfig::default()
        }
    }
}

/// Return the path to `~/.kiosk/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".kiosk").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
///
/// Environment overrides are not applied here; see [`apply_env_overrides`].
pub fn load() -> Result<Option<Config>, ConfigError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let cfg: Config = toml::from_str(&raw)?;
    Ok(Some(cfg))
}

/// Apply `KIOSK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `KIOSK_TARGET_URL` | `target_url` |
/// | `KIOSK_TARGET_SURFACE` | `target_surface` |
/// | `KIOSK_HEARTBEAT_SECS` | `heartbeat_interval_secs` |
/// | `KIOSK_ADMIN_PIN` | `admin_pin` |
/// | `KIOSK_INACTIVITY_SECS` | `inactivity_timeout_secs` |
///
/// Numbers that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("KIOSK_TARGET_URL") {
        cfg.target_url = v;
    }
    if let Ok(v) = std::env::var("KIOSK_TARGET_SURFACE") {
        cfg.target_surface = v;
    }
    if let Ok(v) = std::env::var("KIOSK_ADMIN_PIN") {
        cfg.admin_pin = v;
    }
    if let Ok(v) = std::env::var("KIOSK_HEARTBEAT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.heartbeat_interval_secs = secs;
    }
    if let Ok(v) = std::env::var("KIOSK_INACTIVITY_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.inactivity_timeout_secs = secs;
    }
}

/// Save the config to disk, creating `~/.kiosk/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| ConfigError::io(parent, e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| ConfigError::io(path, e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| ConfigError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_admin_pin() {
        let cfg = Config {
            admin_pin: "908172".to_string(),
            ..Config::default()
        };
        let debug_str = format!("{cfg:?}");
        assert!(!debug_str.contains("908172"), "PIN must not appear in debug output");
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn config_debug_shows_not_set_for_empty_pin() {
        let cfg = Config {
            admin_pin: String::new(),
            ..Config::default()
        };
        assert!(format!("{cfg:?}").contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.target_surface, "com.example.kiosk");
        assert_eq!(loaded.background_grace_secs, 30);
        assert_eq!(loaded.repin_delay_ms, 1000);
        assert!(loaded.redundant_boot_sequence);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "background_grace_secs = 10\n").expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.background_grace_secs, 10);
        assert_eq!(loaded.target_surface, "com.example.kiosk");
        assert_eq!(loaded.repin_delay_ms, 1000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "heartbeat_interval_secs = \"soon\"\n").expect("write");

        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn config_path_points_to_kiosk_dir() {
        let p = config_path_for_home("/home/operator");
        assert!(p.to_string_lossy().contains(".kiosk"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn converts_into_watchdog_settings() {
        let cfg = Config {
            target_surface: "org.museum.guide".to_string(),
            heartbeat_interval_secs: 0,
            background_grace_secs: 12,
            repin_delay_ms: 250,
            admin_pin: "4321".to_string(),
            ..Config::default()
        };

        let session = cfg.session();
        assert_eq!(session.heartbeat_interval(), Duration::ZERO);
        assert_eq!(session.target_url, cfg.target_url);

        let sup = cfg.supervisor();
        assert_eq!(sup.target, SurfaceId::from("org.museum.guide"));
        assert_eq!(sup.background_grace, Duration::from_secs(12));
        assert_eq!(sup.repin_delay, Duration::from_millis(250));
        assert!(sup.admin_pin.matches("4321"));
        assert!(!sup.admin_pin.matches("1234"));
    }

    #[test]
    fn apply_env_overrides_changes_target_url() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("KIOSK_TARGET_URL", "https://lobby.local/") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.target_url, "https://lobby.local/");
        unsafe { std::env::remove_var("KIOSK_TARGET_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_heartbeat() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("KIOSK_HEARTBEAT_SECS", "90") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.heartbeat_interval_secs, 90);
        unsafe { std::env::remove_var("KIOSK_HEARTBEAT_SECS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_inactivity() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("KIOSK_INACTIVITY_SECS", "half a minute") };
        let mut cfg = Config::default();
        let original = cfg.inactivity_timeout_secs;
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.inactivity_timeout_secs, original);
        unsafe { std::env::remove_var("KIOSK_INACTIVITY_SECS") };
    }

    #[test]
    fn apply_env_overrides_changes_admin_pin() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("KIOSK_ADMIN_PIN", "5555") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.admin_pin, "5555");
        unsafe { std::env::remove_var("KIOSK_ADMIN_PIN") };
    }
}
