// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Service Configuration Types
//
// Defines the configuration schema for a volapi instance, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - HTTP listener settings
// - Record store backend selection
// - Endpoints of the compute, package, image and network services
// - Volume provisioning defaults
// - Observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::size::DEFAULT_VOLUME_SIZE_MB;

pub const CONFIG_API_VERSION: &str = "volapi/v1";
pub const CONFIG_KIND: &str = "VolapiConfig";

/// Top-level Kubernetes-style service configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolapiConfigManifest {
    /// API version (must be "volapi/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "VolapiConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: VolapiConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable instance name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Service configuration (content under `spec:`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolapiConfigSpec {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub volumes: VolumesConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// PostgreSQL connection string (required for the postgres backend)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Endpoints of the platform services volapi drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_vmapi_url")]
    pub vmapi_url: String,

    #[serde(default = "default_papi_url")]
    pub papi_url: String,

    #[serde(default = "default_imgapi_url")]
    pub imgapi_url: String,

    #[serde(default = "default_napi_url")]
    pub napi_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound on a synchronous VM creation, including the job wait
    #[serde(default = "default_vm_create_timeout")]
    pub vm_create_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumesConfig {
    /// Size in MiB used when a create request carries none
    #[serde(default = "default_volume_size")]
    pub default_size_mb: u64,

    /// Name prefix of the packages eligible for NFS server VMs
    #[serde(default = "default_package_prefix")]
    pub package_prefix: String,

    #[serde(default = "default_nfs_server_image_name")]
    pub nfs_server_image_name: String,

    /// Attempts at a reference read-modify-write before giving up
    #[serde(default = "default_reference_retry_attempts")]
    pub reference_retry_attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    80
}

fn default_max_connections() -> u32 {
    5
}

fn default_vmapi_url() -> String {
    "http://vmapi.localdomain".to_string()
}

fn default_papi_url() -> String {
    "http://papi.localdomain".to_string()
}

fn default_imgapi_url() -> String {
    "http://imgapi.localdomain".to_string()
}

fn default_napi_url() -> String {
    "http://napi.localdomain".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_vm_create_timeout() -> u64 {
    600
}

fn default_volume_size() -> u64 {
    DEFAULT_VOLUME_SIZE_MB
}

fn default_package_prefix() -> String {
    "sdc_volume_nfs".to_string()
}

fn default_nfs_server_image_name() -> String {
    "sdc-nfsserver".to_string()
}

fn default_reference_retry_attempts() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            connection_string: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            vmapi_url: default_vmapi_url(),
            papi_url: default_papi_url(),
            imgapi_url: default_imgapi_url(),
            napi_url: default_napi_url(),
            request_timeout_secs: default_request_timeout(),
            vm_create_timeout_secs: default_vm_create_timeout(),
        }
    }
}

impl Default for VolumesConfig {
    fn default() -> Self {
        Self {
            default_size_mb: default_volume_size(),
            package_prefix: default_package_prefix(),
            nfs_server_image_name: default_nfs_server_image_name(),
            reference_retry_attempts: default_reference_retry_attempts(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for VolapiConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "volapi".to_string());

        Self {
            api_version: CONFIG_API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                labels: None,
            },
            spec: VolapiConfigSpec::default(),
        }
    }
}

impl VolapiConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. VOLAPI_CONFIG_PATH environment variable
    /// 2. ./volapi-config.yaml (working directory)
    /// 3. ~/.volapi/config.yaml (user home)
    /// 4. /etc/volapi/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("VOLAPI_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./volapi-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".volapi").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/volapi/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("VOLAPI_STORE_CONNECTION_STRING") {
            tracing::info!("Environment override: VOLAPI_STORE_CONNECTION_STRING");
            self.spec.store.connection_string = Some(val);
        }

        if let Some(val) = lookup("VOLAPI_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: VOLAPI_PORT={}", port);
                    self.spec.api.port = port;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for VOLAPI_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }

        let services = &mut self.spec.services;
        for (key, target) in [
            ("VOLAPI_VMAPI_URL", &mut services.vmapi_url),
            ("VOLAPI_PAPI_URL", &mut services.papi_url),
            ("VOLAPI_IMGAPI_URL", &mut services.imgapi_url),
            ("VOLAPI_NAPI_URL", &mut services.napi_url),
        ] {
            if let Some(val) = lookup(key) {
                tracing::info!("Environment override: {}={}", key, val);
                *target = val;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != CONFIG_API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                CONFIG_API_VERSION
            );
        }

        if self.kind != CONFIG_KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, CONFIG_KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let services = &self.spec.services;
        for (name, url) in [
            ("vmapi_url", &services.vmapi_url),
            ("papi_url", &services.papi_url),
            ("imgapi_url", &services.imgapi_url),
            ("napi_url", &services.napi_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!(
                    "spec.services.{} must be an http:// or https:// URL, got '{}'",
                    name,
                    url
                );
            }
        }

        if self.spec.store.backend == StoreBackend::Postgres
            && self
                .spec
                .store
                .connection_string
                .as_deref()
                .map_or(true, str::is_empty)
        {
            anyhow::bail!("spec.store.connection_string is required for the postgres backend");
        }

        if self.spec.volumes.default_size_mb == 0 {
            anyhow::bail!("spec.volumes.default_size_mb must be greater than zero");
        }

        if self.spec.volumes.reference_retry_attempts == 0 {
            anyhow::bail!("spec.volumes.reference_retry_attempts must be at least 1");
        }

        Ok(())
    }
}
