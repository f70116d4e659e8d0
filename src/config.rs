use crate::error::ConfigurationError;
use crate::masterlist::MasterlistPolicy;
use crate::roster::{ActivityDeletePolicy, RosterPolicy, StudentCollisionPolicy};
use crate::util;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongodb,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StoreBackend::Mongodb),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigurationError::InvalidValue {
                setting: "STORE_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

/// Parses `var` when set. Values that don't parse are logged and replaced by
/// `fallback`.
fn env_or<T: FromStr>(var: &str, fallback: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            tracing::warn!("Ignoring {}: {}", var, e);
            fallback
        }),
        Err(_) => fallback,
    }
}

fn default_store() -> StoreBackend {
    env_or("STORE_BACKEND", StoreBackend::Mongodb)
}

fn default_mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or("mongodb://localhost:27017".to_string())
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or("scribemark".to_string())
}

fn default_ai_endpoint() -> String {
    env::var("AI_SERVER_URL").unwrap_or("http://localhost:8000".to_string())
}

fn default_ai_timeout_secs() -> u64 {
    env_or("AI_TIMEOUT_SECS", 120)
}

fn default_masterlist_policy() -> MasterlistPolicy {
    env_or("MASTERLIST_POLICY", MasterlistPolicy::default())
}

fn default_student_collision() -> StudentCollisionPolicy {
    env_or("STUDENT_COLLISION_POLICY", StudentCollisionPolicy::default())
}

fn default_activity_delete() -> ActivityDeletePolicy {
    env_or("ACTIVITY_DELETE_POLICY", ActivityDeletePolicy::default())
}

fn default_live_channel_capacity() -> usize {
    env_or("LIVE_CHANNEL_CAPACITY", 256)
}

fn default_upload_limit_mib() -> u64 {
    env_or("UPLOAD_LIMIT_MIB", 16)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    #[serde(default = "default_store")]
    pub store: StoreBackend,
    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,

    /// Base URL of the exam processing server.
    #[serde(default = "default_ai_endpoint")]
    pub ai_endpoint: String,
    #[serde(default = "default_ai_timeout_secs")]
    pub ai_timeout_secs: u64,

    #[serde(default = "default_masterlist_policy")]
    pub masterlist_policy: MasterlistPolicy,
    #[serde(default = "default_student_collision")]
    pub student_collision_policy: StudentCollisionPolicy,
    #[serde(default = "default_activity_delete")]
    pub activity_delete_policy: ActivityDeletePolicy,

    #[serde(default = "default_live_channel_capacity")]
    pub live_channel_capacity: usize,
    #[serde(default = "default_upload_limit_mib")]
    pub upload_limit_mib: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            store: default_store(),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            ai_endpoint: default_ai_endpoint(),
            ai_timeout_secs: default_ai_timeout_secs(),
            masterlist_policy: default_masterlist_policy(),
            student_collision_policy: default_student_collision(),
            activity_delete_policy: default_activity_delete(),
            live_channel_capacity: default_live_channel_capacity(),
            upload_limit_mib: default_upload_limit_mib(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or("./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        let config_file = util::find_first_subpath(
            config_dir(),
            &["settings.yml", "settings.yaml"],
            Path::exists,
        )
        .ok_or_else(|| ConfigurationError::NotFound(config_dir()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(dir) = self.file_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    pub fn roster_policy(&self) -> RosterPolicy {
        RosterPolicy {
            masterlist: self.masterlist_policy,
            student_collision: self.student_collision_policy,
            activity_delete: self.activity_delete_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_fill_missing_fields() {
        let config: Config = serde_yaml::from_str(
            "store: memory\nai_endpoint: http://ai.local:9000\nmasterlist_policy: legacy\n",
        )
        .unwrap();

        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.ai_endpoint, "http://ai.local:9000");
        assert_eq!(config.roster_policy().masterlist, MasterlistPolicy::Legacy);
        assert!(config.live_channel_capacity > 0);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(matches!(
            "sqlite".parse::<StoreBackend>(),
            Err(ConfigurationError::InvalidValue { setting: "STORE_BACKEND", .. })
        ));
    }
}
