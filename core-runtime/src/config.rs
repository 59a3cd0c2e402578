//! # Core Configuration Module
//!
//! Configuration for the ingestion pipeline: named profiles, synchronizer
//! tuning, naming policies and connector credentials.
//!
//! ## Overview
//!
//! A `CoreConfig` is built either with [`CoreConfig::builder`] or from a TOML
//! document ([`CoreConfig::from_toml_str`], [`CoreConfig::load`]). Both paths
//! end in [`CoreConfig::validate`], which fails fast with actionable messages.
//!
//! Secrets never live in the configuration. Profiles and connector sections
//! name the environment variables that hold them; `core-service` resolves
//! those at bootstrap.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::from_toml_str(r#"
//!     [profiles.hr]
//!     index_id = "vs_hr"
//!     bucket = "company-docs"
//!     folder_prefixes = ["policies/hr"]
//!
//!     [sync]
//!     poll_timeout_ms = 120000
//! "#)?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // A configuration without profiles has nothing to ingest
//! CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - no profiles configured");
//! ```

use crate::error::{Error, Result};
use crate::logging::LogFormat;
use bridge_traits::index::MAX_BATCH_SIZE;
use bridge_traits::log::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default environment variable holding the document store API key
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Finished ingestion jobs kept in memory by default
pub const DEFAULT_JOB_HISTORY: usize = 100;

/// Resolved ingestion source of a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    /// Flat object store: bucket plus key prefixes to keep
    Flat {
        bucket: String,
        folder_prefixes: Vec<String>,
    },
    /// Hierarchical tree rooted at a folder, optionally inside a shared drive
    Tree {
        root_id: String,
        drive_id: Option<String>,
    },
}

/// Tree source section of a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeSourceConfig {
    pub root_id: String,
    #[serde(default)]
    pub drive_id: Option<String>,
}

/// One logical ingestion target (e.g. an assistant) and its collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    /// Search index (vector store) the profile synchronizes into
    pub index_id: String,

    /// Environment variable holding the document store API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Override for the document store API root
    #[serde(default)]
    pub api_base_url: Option<String>,

    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default)]
    pub folder_prefixes: Vec<String>,

    #[serde(default)]
    pub tree: Option<TreeSourceConfig>,

    /// Overrides `SyncSettings::collision_policy` for this profile
    #[serde(default)]
    pub collision_policy: Option<CollisionPolicy>,
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

impl ProfileConfig {
    pub fn new(index_id: impl Into<String>) -> Self {
        Self {
            index_id: index_id.into(),
            api_key_env: default_api_key_env(),
            api_base_url: None,
            bucket: None,
            folder_prefixes: Vec::new(),
            tree: None,
            collision_policy: None,
        }
    }

    pub fn with_flat_source<I, S>(mut self, bucket: impl Into<String>, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bucket = Some(bucket.into());
        self.folder_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tree_source(mut self, root_id: impl Into<String>, drive_id: Option<String>) -> Self {
        self.tree = Some(TreeSourceConfig {
            root_id: root_id.into(),
            drive_id,
        });
        self
    }

    pub fn with_api_key_env(mut self, env: impl Into<String>) -> Self {
        self.api_key_env = env.into();
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = Some(policy);
        self
    }

    /// The configured source, or `None` when the profile has nothing to ingest
    pub fn source(&self) -> Option<SourceConfig> {
        if let Some(tree) = &self.tree {
            return Some(SourceConfig::Tree {
                root_id: tree.root_id.clone(),
                drive_id: tree.drive_id.clone(),
            });
        }
        match &self.bucket {
            Some(bucket) if !self.folder_prefixes.is_empty() => Some(SourceConfig::Flat {
                bucket: bucket.clone(),
                folder_prefixes: self.folder_prefixes.clone(),
            }),
            _ => None,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.index_id.trim().is_empty() {
            return Err(Error::Config(format!(
                "Profile '{}' has an empty index_id. Set it to the target vector store id.",
                name
            )));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(Error::Config(format!(
                "Profile '{}' has an empty api_key_env. Name the variable holding the API key.",
                name
            )));
        }
        if self.tree.is_some() && self.bucket.is_some() {
            return Err(Error::Config(format!(
                "Profile '{}' configures both a bucket and a tree source. Keep exactly one.",
                name
            )));
        }
        if let Some(tree) = &self.tree {
            if tree.root_id.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Profile '{}' has an empty tree.root_id.",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// What to do when two harvested entries map to the same destination filename
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    KeepFirst,
    /// Later entries overwrite earlier ones (logged)
    #[default]
    KeepLast,
    /// Abort the run with an error
    Reject,
}

/// What to do when the tree walk reaches a folder that is one of its own
/// ancestors. Folders reached again through unrelated branches are always
/// skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Log the anomaly and do not descend again
    #[default]
    Skip,
    /// Abort the walk with an error
    Error,
}

/// Synchronizer tuning and naming policies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Documents per submitted batch (at most the backend limit of 50)
    pub batch_size: usize,

    /// Pause between consecutive batch submissions
    #[serde(rename = "submission_delay_ms", with = "duration_ms")]
    pub submission_delay: Duration,

    /// Interval between polls for in-progress entries
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,

    /// How long one round waits for in-progress entries to settle
    #[serde(rename = "poll_timeout_ms", with = "duration_ms")]
    pub poll_timeout: Duration,

    /// Resubmission rounds after the first (so `max_attempts + 1` rounds total)
    pub max_attempts: u32,

    pub collision_policy: CollisionPolicy,

    pub cycle_policy: CyclePolicy,

    /// Finished jobs kept for status queries; older ones are evicted
    pub job_history: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            submission_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(100),
            max_attempts: 5,
            collision_policy: CollisionPolicy::default(),
            cycle_policy: CyclePolicy::default(),
            job_history: DEFAULT_JOB_HISTORY,
        }
    }
}

impl SyncSettings {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "sync.batch_size must be between 1 and {} (got {})",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config(
                "sync.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.poll_timeout < self.poll_interval {
            return Err(Error::Config(format!(
                "sync.poll_timeout_ms ({} ms) must be at least poll_interval_ms ({} ms)",
                self.poll_timeout.as_millis(),
                self.poll_interval.as_millis()
            )));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Google Drive connector settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriveSettings {
    /// Environment variable holding an OAuth access token (`drive.readonly`)
    pub access_token_env: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            access_token_env: "GOOGLE_DRIVE_ACCESS_TOKEN".to_string(),
            api_base_url: None,
        }
    }
}

/// S3 connector settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct S3Settings {
    pub region: String,
    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,
    pub access_key_id_env: String,
    pub secret_access_key_env: String,
    pub session_token_env: Option<String>,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id_env: "AWS_ACCESS_KEY_ID".to_string(),
            secret_access_key_env: "AWS_SECRET_ACCESS_KEY".to_string(),
            session_token_env: Some("AWS_SESSION_TOKEN".to_string()),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: Option<LogLevel>,
    pub format: Option<LogFormat>,
    /// `EnvFilter` directives overriding `level`
    pub filter: Option<String>,
}

/// Core configuration for the ingestion pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub profiles: BTreeMap<String, ProfileConfig>,
    pub sync: SyncSettings,
    pub drive: DriveSettings,
    pub s3: S3Settings,
    pub logging: LoggingSettings,
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: CoreConfig = toml::from_str(input)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&input)
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.get(name)
    }

    /// Collision policy in effect for a profile
    pub fn collision_policy_for(&self, name: &str) -> CollisionPolicy {
        self.profiles
            .get(name)
            .and_then(|profile| profile.collision_policy)
            .unwrap_or(self.sync.collision_policy)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - At least one profile exists
    /// - Every profile names an index and at most one source
    /// - Synchronizer tuning is within backend limits
    pub fn validate(&self) -> Result<()> {
        if self.profiles.is_empty() {
            return Err(Error::Config(
                "No profiles configured. Add at least one [profiles.<name>] section.".to_string(),
            ));
        }

        for (name, profile) in &self.profiles {
            if name.trim().is_empty() {
                return Err(Error::Config("Profile names cannot be empty".to_string()));
            }
            profile.validate(name)?;
        }

        self.sync.validate()?;

        if self.s3.region.trim().is_empty() {
            return Err(Error::Config("s3.region cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    profiles: BTreeMap<String, ProfileConfig>,
    sync: Option<SyncSettings>,
    drive: Option<DriveSettings>,
    s3: Option<S3Settings>,
    logging: Option<LoggingSettings>,
}

impl CoreConfigBuilder {
    /// Register (or replace) a named profile
    pub fn profile(mut self, name: impl Into<String>, profile: ProfileConfig) -> Self {
        self.profiles.insert(name.into(), profile);
        self
    }

    pub fn sync(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    pub fn drive(mut self, settings: DriveSettings) -> Self {
        self.drive = Some(settings);
        self
    }

    pub fn s3(mut self, settings: S3Settings) -> Self {
        self.s3 = Some(settings);
        self
    }

    pub fn logging(mut self, settings: LoggingSettings) -> Self {
        self.logging = Some(settings);
        self
    }

    pub fn build(self) -> Result<CoreConfig> {
        let config = CoreConfig {
            profiles: self.profiles,
            sync: self.sync.unwrap_or_default(),
            drive: self.drive.unwrap_or_default(),
            s3: self.s3.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
