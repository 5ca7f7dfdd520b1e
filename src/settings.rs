use crate::remote::DEFAULT_API_URL;
use dirs_next as dirs;
use serde::{Deserialize, Serialize};

pub const API_URL_ENV: &str = "HR_ZONES_API_URL";

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Dashboard preferences, stored next to the zone cache.
///
/// Fields missing from an older file fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSettings {
    #[serde(default = "default_api_url")]
    pub api_base_url: String,
    /// Average heart rate shown on the dashboard, e.g. `"142.5 bpm"`.
    #[serde(default)]
    pub average_hr: Option<String>,
}

impl AppSettings {
    const FILE: &'static str = "hr_zone_dashboard_settings.json";

    pub fn path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|p| p.join(Self::FILE))
    }

    pub fn load() -> Self {
        if let Some(path) = Self::path() {
            if let Ok(data) = std::fs::read_to_string(&path) {
                match serde_json::from_str(&data) {
                    Ok(cfg) => return cfg,
                    Err(e) => log::warn!("Ignoring {}: {e}", path.display()),
                }
            }
        }
        Self::default()
    }

    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, data)
    }

    /// Base URL of the settings server.
    ///
    /// The `HR_ZONES_API_URL` environment variable takes precedence over the stored value.
    pub fn resolve_api_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.api_base_url.clone())
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_url(),
            average_hr: None,
        }
    }
}

#[cfg(test)]
pub(crate) static ENV_MUTEX: once_cell::sync::Lazy<std::sync::Mutex<()>> =
    once_cell::sync::Lazy::new(|| std::sync::Mutex::new(()));

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn settings_persist_in_config_dir() {
        let _guard = ENV_MUTEX.lock().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let prev_config = env::var_os("XDG_CONFIG_HOME");
        unsafe {
            env::set_var("XDG_CONFIG_HOME", dir.path());
        }

        let mut s = AppSettings::default();
        s.average_hr = Some("142.5 bpm".into());
        s.api_base_url = "http://localhost:8080".into();
        s.save().unwrap();
        assert_eq!(AppSettings::load(), s);

        let path = AppSettings::path().unwrap();
        std::fs::write(&path, "{}").unwrap();
        assert_eq!(AppSettings::load(), AppSettings::default());

        if let Some(val) = prev_config {
            unsafe {
                env::set_var("XDG_CONFIG_HOME", val);
            }
        } else {
            unsafe {
                env::remove_var("XDG_CONFIG_HOME");
            }
        }
    }

    #[test]
    fn env_var_overrides_stored_url() {
        let _guard = ENV_MUTEX.lock().unwrap();

        let s = AppSettings {
            api_base_url: "http://stored".into(),
            average_hr: None,
        };
        unsafe {
            env::set_var(API_URL_ENV, "http://forced");
        }
        assert_eq!(s.resolve_api_url(), "http://forced");

        unsafe {
            env::remove_var(API_URL_ENV);
        }
        assert_eq!(s.resolve_api_url(), "http://stored");
    }
}
