//! Core service façade and bootstrap helpers.
//!
//! This crate wires a host-provided HTTP client and secret source into the
//! ingestion core. From a validated [`CoreConfig`] it builds one OpenAI
//! client per profile, shared S3 and Google Drive connectors when some
//! profile needs them, and registers everything with the
//! [`IngestionCoordinator`]. Server and CLI hosts enable the `native-http`
//! feature (on by default) and call [`CoreDependencies::native`].

pub mod error;

pub use error::{CoreError, Result};

use std::collections::HashMap;
use std::sync::Arc;

use bridge_traits::{
    error::BridgeError, http::HttpClient, object_store::ObjectStore, tree::TreeSource,
};
use core_runtime::config::{CoreConfig, DriveSettings, S3Settings, SourceConfig};
use core_runtime::events::{EventBus, EventStream, DEFAULT_EVENT_BUFFER_SIZE};
use core_runtime::logging::{init_logging as init_tracing, LoggingConfig};
use core_sync::{
    ClearDocumentsResponse, ClearIndexResponse, DriveTransfer, IngestJob, IngestJobId,
    IngestionCoordinator, IngestionResponse, ProfileClients, TransferReport, UploadPolicy,
};
use provider_google_drive::GoogleDriveConnector;
use provider_openai::{OpenAiClient, OpenAiConfig, OpenAiDocumentStore, OpenAiIndexBackend};
use provider_s3::{S3Config, S3Connector};
use tracing::{debug, info};

/// Resolves secrets named by environment variable.
pub trait SecretSource: Send + Sync {
    /// `None` when the variable is unset or blank
    fn secret(&self, variable: &str) -> Option<String>;
}

/// Reads secrets from the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn secret(&self, variable: &str) -> Option<String> {
        std::env::var(variable)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

impl SecretSource for HashMap<String, String> {
    fn secret(&self, variable: &str) -> Option<String> {
        self.get(variable)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }
}

/// Aggregated handle to the host dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub secrets: Arc<dyn SecretSource>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit handles.
    pub fn new(http_client: Arc<dyn HttpClient>, secrets: Arc<dyn SecretSource>) -> Self {
        Self {
            http_client,
            secrets,
        }
    }

    /// `reqwest` HTTP client and environment secrets
    #[cfg(feature = "native-http")]
    pub fn native() -> Result<Self> {
        let http_client = bridge_native::ReqwestHttpClient::new()
            .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
        Ok(Self::new(Arc::new(http_client), Arc::new(EnvSecrets)))
    }

    fn require_secret(&self, variable: &str) -> Result<String> {
        self.secrets
            .secret(variable)
            .ok_or_else(|| CoreError::MissingSecret {
                variable: variable.to_string(),
            })
    }
}

/// Install the tracing subscriber described by the `[logging]` section.
///
/// Call once at startup, before [`CoreService::bootstrap`].
pub fn init_logging(config: &CoreConfig) -> Result<()> {
    init_tracing(LoggingConfig::from_settings(&config.logging))?;
    Ok(())
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    coordinator: IngestionCoordinator,
    event_bus: Arc<EventBus>,
    object_store: Option<Arc<dyn ObjectStore>>,
    tree_source: Option<Arc<dyn TreeSource>>,
}

impl CoreService {
    /// Build every connector the configuration calls for and register the
    /// profiles.
    ///
    /// # Errors
    ///
    /// Invalid configuration, or a secret that a configured profile needs is
    /// missing. Connectors no profile needs are built only when their
    /// credentials are present (they back drive transfers).
    pub async fn bootstrap(config: CoreConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        let sources: Vec<SourceConfig> = config
            .profiles
            .values()
            .filter_map(|profile| profile.source())
            .collect();
        let needs_bucket = sources
            .iter()
            .any(|source| matches!(source, SourceConfig::Flat { .. }));
        let needs_tree = sources
            .iter()
            .any(|source| matches!(source, SourceConfig::Tree { .. }));

        let object_store = build_object_store(&config.s3, &deps, needs_bucket)?;
        let tree_source = build_tree_source(&config.drive, &deps, needs_tree)?;

        let event_bus = Arc::new(EventBus::new(DEFAULT_EVENT_BUFFER_SIZE));
        let coordinator = IngestionCoordinator::new(config.clone(), event_bus.clone());

        for (name, profile) in &config.profiles {
            let mut openai = OpenAiConfig::new(deps.require_secret(&profile.api_key_env)?);
            if let Some(base_url) = &profile.api_base_url {
                openai = openai.with_base_url(base_url.as_str());
            }
            let client = Arc::new(OpenAiClient::new(deps.http_client.clone(), openai));

            let mut clients = ProfileClients::new(
                Arc::new(OpenAiDocumentStore::new(client.clone())),
                Arc::new(OpenAiIndexBackend::new(client)),
            );
            if let Some(store) = &object_store {
                clients = clients.with_object_store(store.clone());
            }
            if let Some(source) = &tree_source {
                clients = clients.with_tree_source(source.clone());
            }

            coordinator.register_profile(name, clients).await?;
            info!(profile = %name, index_id = %profile.index_id, "Profile ready");
        }

        Ok(Self {
            coordinator,
            event_bus,
            object_store,
            tree_source,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        self.coordinator.config()
    }

    pub fn coordinator(&self) -> &IngestionCoordinator {
        &self.coordinator
    }

    /// Subscribe to ingestion and transfer events; narrow with
    /// [`EventStream::filter`]
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Run an ingestion for `profile` and wait for its outcome
    pub async fn run_ingestion(
        &self,
        profile: &str,
        policy: UploadPolicy,
        purge_before: bool,
    ) -> Result<IngestionResponse> {
        Ok(self
            .coordinator
            .run_ingestion(profile, policy, purge_before)
            .await?)
    }

    pub async fn start_ingestion(
        &self,
        profile: &str,
        policy: UploadPolicy,
        purge_before: bool,
    ) -> Result<IngestJobId> {
        Ok(self
            .coordinator
            .start_ingestion(profile, policy, purge_before)
            .await?)
    }

    pub async fn get_status(&self, job_id: IngestJobId) -> Result<IngestJob> {
        Ok(self.coordinator.get_status(job_id).await?)
    }

    pub async fn list_jobs(&self) -> Vec<IngestJob> {
        self.coordinator.list_jobs().await
    }

    pub async fn cancel_ingestion(&self, job_id: IngestJobId) -> Result<()> {
        Ok(self.coordinator.cancel_ingestion(job_id).await?)
    }

    pub async fn clear_index(&self, profile: &str) -> Result<ClearIndexResponse> {
        Ok(self.coordinator.clear_index(profile).await?)
    }

    pub async fn clear_documents(&self, profile: &str) -> Result<ClearDocumentsResponse> {
        Ok(self.coordinator.clear_documents(profile).await?)
    }

    /// Copy a Drive folder into a bucket
    pub async fn transfer_folder(
        &self,
        folder_id: &str,
        bucket: &str,
        prefix: &str,
        dry_run: bool,
    ) -> Result<TransferReport> {
        Ok(self
            .transfer()?
            .copy_folder(folder_id, bucket, prefix, dry_run)
            .await?)
    }

    /// Copy a shared drive, found by name, into a bucket
    pub async fn transfer_shared_drive(
        &self,
        drive_name: &str,
        bucket: &str,
        prefix: &str,
    ) -> Result<TransferReport> {
        Ok(self
            .transfer()?
            .copy_shared_drive(drive_name, bucket, prefix)
            .await?)
    }

    fn transfer(&self) -> Result<DriveTransfer> {
        let source = self
            .tree_source
            .clone()
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "TreeSource".to_string(),
                message: format!(
                    "Set {} to enable drive transfers",
                    self.config().drive.access_token_env
                ),
            })?;
        let store = self
            .object_store
            .clone()
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "ObjectStore".to_string(),
                message: format!(
                    "Set {} and {} to enable drive transfers",
                    self.config().s3.access_key_id_env,
                    self.config().s3.secret_access_key_env
                ),
            })?;

        Ok(DriveTransfer::new(source, store, self.config().sync.cycle_policy)
            .with_event_bus(self.event_bus.clone()))
    }
}

fn build_object_store(
    settings: &S3Settings,
    deps: &CoreDependencies,
    required: bool,
) -> Result<Option<Arc<dyn ObjectStore>>> {
    let access_key_id = deps.secrets.secret(&settings.access_key_id_env);
    let secret_access_key = deps.secrets.secret(&settings.secret_access_key_env);

    let (access_key_id, secret_access_key) = match (access_key_id, secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => (access_key_id, secret_access_key),
        (access_key_id, _) if required => {
            let variable = if access_key_id.is_none() {
                &settings.access_key_id_env
            } else {
                &settings.secret_access_key_env
            };
            return Err(CoreError::MissingSecret {
                variable: variable.clone(),
            });
        }
        _ => {
            debug!("S3 credentials not set, bucket access disabled");
            return Ok(None);
        }
    };

    let session_token = settings
        .session_token_env
        .as_deref()
        .and_then(|variable| deps.secrets.secret(variable));

    let connector = S3Connector::new(
        deps.http_client.clone(),
        S3Config {
            region: settings.region.clone(),
            endpoint: settings.endpoint.clone(),
            access_key_id,
            secret_access_key,
            session_token,
        },
    )
    .map_err(BridgeError::from)?;

    info!(region = %settings.region, "S3 connector ready");
    Ok(Some(Arc::new(connector)))
}

fn build_tree_source(
    settings: &DriveSettings,
    deps: &CoreDependencies,
    required: bool,
) -> Result<Option<Arc<dyn TreeSource>>> {
    let access_token = match deps.secrets.secret(&settings.access_token_env) {
        Some(token) => token,
        None if required => {
            return Err(CoreError::MissingSecret {
                variable: settings.access_token_env.clone(),
            })
        }
        None => {
            debug!("Drive access token not set, tree access disabled");
            return Ok(None);
        }
    };

    let mut connector = GoogleDriveConnector::new(deps.http_client.clone(), access_token);
    if let Some(base_url) = &settings.api_base_url {
        connector = connector.with_base_url(base_url.as_str());
    }

    info!("Google Drive connector ready");
    Ok(Some(Arc::new(connector)))
}
