//! Application configuration: named route profiles persisted as JSON.
//!
//! The document is camelCase with a required `version` field. Loading is
//! forgiving: a file that fails to parse is backed up with a timestamped
//! `.corrupt-*.bak` suffix and replaced by defaults, and a version-1
//! document (flat route list, no profiles) is folded into a `Default`
//! profile on load. Saves are atomic (tmp-then-rename).

use crate::error::ConfigError;
use chrono::Utc;
use ostinato_midi::MessageType;
use ostinato_routing::{RouteDefinition, RouteFilter, RouteId};
use ostinato_telemetry::{DEFAULT_LOG_CAPACITY, MAX_LOG_CAPACITY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

/// Current schema version. Version 1 is the only accepted older shape.
pub const CONFIG_VERSION: u32 = 2;

pub const DEFAULT_PROFILE_NAME: &str = "Default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub version: u32,
    #[serde(default)]
    pub active_profile_name: String,
    #[serde(default = "default_log_buffer_size")]
    pub log_buffer_size: usize,
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileConfig {
    pub name: String,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    /// Assigned fresh when missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source_endpoint_id: String,
    pub target_endpoint_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Channel list; out-of-range values are dropped on conversion.
    #[serde(default)]
    pub channels: Vec<i64>,
    /// Message-type names; unknown names are dropped on conversion.
    #[serde(default)]
    pub message_types: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_log_buffer_size() -> usize {
    DEFAULT_LOG_CAPACITY
}

/// Version-1 shape: a flat route list with no profile layer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyConfig {
    #[serde(default = "default_log_buffer_size")]
    log_buffer_size: usize,
    #[serde(default)]
    routes: Vec<RouteConfig>,
}

#[derive(Debug, Deserialize)]
struct VersionProbe {
    version: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            active_profile_name: DEFAULT_PROFILE_NAME.to_string(),
            log_buffer_size: DEFAULT_LOG_CAPACITY,
            profiles: vec![ProfileConfig {
                name: DEFAULT_PROFILE_NAME.to_string(),
                routes: Vec::new(),
            }],
        }
    }
}

impl AppConfig {
    /// Load from `path`. Missing file yields defaults; a malformed file
    /// is backed up and replaced by defaults; a version beyond
    /// [`CONFIG_VERSION`] is an error the operator has to resolve.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        let version = match serde_json::from_str::<VersionProbe>(&raw) {
            Ok(probe) => probe.version,
            Err(e) => return Self::recover_corrupt(path, &e.to_string()),
        };

        match version {
            1 => match serde_json::from_str::<LegacyConfig>(&raw) {
                Ok(legacy) => Ok(Self::upgrade_from_v1(legacy)),
                Err(e) => Self::recover_corrupt(path, &e.to_string()),
            },
            CONFIG_VERSION => match serde_json::from_str::<AppConfig>(&raw) {
                Ok(mut config) => {
                    config.normalize();
                    Ok(config)
                }
                Err(e) => Self::recover_corrupt(path, &e.to_string()),
            },
            other => Err(ConfigError::UnsupportedVersion(other)),
        }
    }

    /// Atomic save: write a sibling tmp file, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn recover_corrupt(path: &Path, reason: &str) -> Result<Self, ConfigError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config.json".to_string());
        let backup = path.with_file_name(format!("{file_name}.corrupt-{stamp}.bak"));
        warn!(
            path = %path.display(),
            backup = %backup.display(),
            reason,
            "config is corrupt; backing up and loading defaults"
        );
        fs::rename(path, &backup)?;
        Ok(Self::default())
    }

    fn upgrade_from_v1(legacy: LegacyConfig) -> Self {
        let mut config = Self {
            version: CONFIG_VERSION,
            active_profile_name: DEFAULT_PROFILE_NAME.to_string(),
            log_buffer_size: legacy.log_buffer_size,
            profiles: vec![ProfileConfig {
                name: DEFAULT_PROFILE_NAME.to_string(),
                routes: legacy.routes,
            }],
        };
        config.normalize();
        config
    }

    fn normalize(&mut self) {
        self.log_buffer_size = self.log_buffer_size.clamp(1, MAX_LOG_CAPACITY);
        if self.active_profile_name.trim().is_empty() {
            self.active_profile_name = DEFAULT_PROFILE_NAME.to_string();
        }
        if self.profiles.is_empty() {
            self.profiles.push(ProfileConfig {
                name: DEFAULT_PROFILE_NAME.to_string(),
                routes: Vec::new(),
            });
        }
    }

    /// The profile selected by `active_profile_name`, falling back to the
    /// first profile.
    pub fn active_profile(&self) -> &ProfileConfig {
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(&self.active_profile_name))
            .unwrap_or(&self.profiles[0])
    }

    pub fn active_profile_mut(&mut self) -> &mut ProfileConfig {
        let index = self
            .profiles
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(&self.active_profile_name))
            .unwrap_or(0);
        &mut self.profiles[index]
    }
}

impl ProfileConfig {
    /// Convert to validated route definitions. Individually invalid
    /// routes are skipped with a warning rather than failing the load.
    pub fn to_routes(&self) -> Vec<RouteDefinition> {
        self.routes
            .iter()
            .filter_map(|route| match route.to_definition() {
                Ok(definition) => Some(definition),
                Err(e) => {
                    warn!(
                        source = route.source_endpoint_id,
                        target = route.target_endpoint_id,
                        error = %e,
                        "skipping invalid configured route"
                    );
                    None
                }
            })
            .collect()
    }
}

impl RouteConfig {
    pub fn to_definition(&self) -> ostinato_routing::Result<RouteDefinition> {
        let channels = self
            .channels
            .iter()
            .filter(|&&ch| (1..=16).contains(&ch))
            .map(|&ch| ch as u8);
        let message_types = self
            .message_types
            .iter()
            .filter_map(|name| MessageType::from_name(name));
        let filter = RouteFilter::new(channels, message_types)?;

        let id = match &self.id {
            Some(id) if !id.trim().is_empty() => RouteId::from(id.as_str()),
            _ => RouteId::fresh(),
        };
        Ok(RouteDefinition::with_id(
            id,
            self.source_endpoint_id.clone(),
            self.target_endpoint_id.clone(),
            filter,
        )?
        .with_enabled(self.enabled))
    }

    pub fn from_definition(route: &RouteDefinition) -> Self {
        Self {
            id: Some(route.id.to_string()),
            source_endpoint_id: route.source.clone(),
            target_endpoint_id: route.target.clone(),
            enabled: route.enabled,
            channels: route.filter.channels().map(i64::from).collect(),
            message_types: route
                .filter
                .message_types()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}
