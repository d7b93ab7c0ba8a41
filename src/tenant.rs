//! Tenant configuration – picks the Workday endpoints and credentials that
//! apply to one request.
//!
//! Resolution order:
//!
//! 1. **Tenant** – explicit hint, else `WORKDAY_TENANT`, else `gms`.
//! 2. **Deployment** – production when any hosting-platform marker is set.
//! 3. **File** – `workday_config_production-<tenant>.json` or
//!    `workday_config-<tenant>.json` under the config directory.
//! 4. **Secrets** – `WORKDAY_USERNAME_<TENANT>` + `WORKDAY_PASSWORD_<TENANT>`
//!    replace the file credentials when both are present.
//! 5. **Validation** – every missing field is reported in one error.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Prefix of the secret-injection environment variables.
pub const SECRET_PREFIX: &str = "WORKDAY";

/// Environment variable naming the process-wide default tenant.
pub const DEFAULT_TENANT_VAR: &str = "WORKDAY_TENANT";

/// Markers set by the hosting platforms we deploy to (Heroku, Azure App
/// Service). Any one present means production.
pub const PRODUCTION_MARKERS: &[&str] = &["DYNO", "WEBSITE_INSTANCE_ID"];

// ---------------------------------------------------------------------------
// Environment snapshot
// ---------------------------------------------------------------------------

/// Immutable snapshot of environment variables.
///
/// Captured once and passed around explicitly so concurrent requests (and
/// tests) never race on the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    vars: HashMap<String, String>,
}

impl EnvVars {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|v| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tenant / deployment
// ---------------------------------------------------------------------------

/// A Workday backend partition with its own endpoints and credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tenant {
    Csc,
    Gms,
}

impl Tenant {
    pub const ALL: [Tenant; 2] = [Tenant::Csc, Tenant::Gms];

    /// Parse a tenant identifier, ignoring case and surrounding whitespace.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csc" => Ok(Tenant::Csc),
            "gms" => Ok(Tenant::Gms),
            _ => Err(Error::InvalidTenant(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tenant::Csc => "csc",
            Tenant::Gms => "gms",
        }
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment class, selecting which config file variant is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Deployment {
    Production,
    Local,
}

impl Deployment {
    pub fn detect(env: &EnvVars) -> Self {
        if PRODUCTION_MARKERS.iter().any(|marker| env.contains(marker)) {
            Deployment::Production
        } else {
            Deployment::Local
        }
    }

    /// File name of the tenant config for this deployment.
    pub fn config_file_name(&self, tenant: Tenant) -> String {
        match self {
            Deployment::Production => format!("workday_config_production-{tenant}.json"),
            Deployment::Local => format!("workday_config-{tenant}.json"),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

/// Where the username/password of a [`TenantConfig`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    File,
}

/// Fully validated Workday configuration for one tenant.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantConfig {
    /// SOAP endpoint (photo retrieval).
    pub endpoint: String,
    /// REST report endpoint (profile retrieval).
    pub profile_endpoint: String,
    pub username: String,
    pub password: String,
    pub api_version: String,
    pub tenant: Tenant,
    pub credential_source: CredentialSource,
}

impl fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConfig")
            .field("endpoint", &self.endpoint)
            .field("profile_endpoint", &self.profile_endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("tenant", &self.tenant)
            .field("credential_source", &self.credential_source)
            .finish()
    }
}

/// On-disk shape of a tenant config file. Every field is optional so that
/// validation can report all gaps at once.
#[derive(Debug, Default, Deserialize)]
struct TenantConfigFile {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    profile_endpoint: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

type CacheKey = (Tenant, Deployment);

/// Memoized configs. `generation` moves on every invalidation so a load
/// that started before it cannot repopulate the cache afterwards.
#[derive(Debug, Default)]
struct ConfigCache {
    generation: u64,
    entries: HashMap<CacheKey, Arc<TenantConfig>>,
}

/// Resolves a [`TenantConfig`] from the config directory and environment.
#[derive(Debug)]
pub struct TenantConfigResolver {
    config_dir: PathBuf,
    env: EnvVars,
    cache: Option<RwLock<ConfigCache>>,
}

impl TenantConfigResolver {
    pub fn new(config_dir: impl Into<PathBuf>, env: EnvVars) -> Self {
        Self {
            config_dir: config_dir.into(),
            env,
            cache: None,
        }
    }

    /// Memoize resolved configs per (tenant, deployment).
    pub fn memoized(mut self) -> Self {
        self.cache = Some(RwLock::new(ConfigCache::default()));
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn deployment(&self) -> Deployment {
        Deployment::detect(&self.env)
    }

    /// The tenant used when a request carries no hint.
    pub fn default_tenant(&self) -> Result<Tenant> {
        Tenant::parse(self.env.get(DEFAULT_TENANT_VAR).unwrap_or("gms"))
    }

    /// Normalise an optional tenant hint into a known tenant.
    pub fn tenant_for(&self, hint: Option<&str>) -> Result<Tenant> {
        match hint {
            Some(h) if !h.trim().is_empty() => Tenant::parse(h),
            _ => self.default_tenant(),
        }
    }

    /// Resolve the config for an optional tenant hint.
    pub fn resolve(&self, hint: Option<&str>) -> Result<Arc<TenantConfig>> {
        let tenant = self.tenant_for(hint)?;
        let deployment = self.deployment();

        let Some(cache) = &self.cache else {
            return self.load(tenant, deployment).map(Arc::new);
        };

        let key = (tenant, deployment);
        let generation = match cache.read() {
            Ok(cached) => match cached.entries.get(&key) {
                Some(hit) => return Ok(Arc::clone(hit)),
                None => cached.generation,
            },
            Err(_) => return self.load(tenant, deployment).map(Arc::new),
        };

        // Two threads may both miss and load; either result is current.
        let config = Arc::new(self.load(tenant, deployment)?);
        self.store(key, &config, generation);
        Ok(config)
    }

    /// Cache `config` unless the cache was invalidated since `generation`.
    fn store(&self, key: CacheKey, config: &Arc<TenantConfig>, generation: u64) -> bool {
        let Some(Ok(mut cached)) = self.cache.as_ref().map(|c| c.write()) else {
            return false;
        };
        if cached.generation != generation {
            log::debug!("config for {} loaded across an invalidation; not cached", key.0);
            return false;
        }
        cached.entries.insert(key, Arc::clone(config));
        true
    }

    #[cfg(test)]
    fn generation(&self) -> Option<u64> {
        self.cache
            .as_ref()
            .and_then(|c| c.read().ok().map(|cached| cached.generation))
    }

    /// Drop every memoized entry. Subsequent resolutions re-read the files,
    /// and loads already in flight are not cached.
    pub fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            if let Ok(mut cached) = cache.write() {
                cached.entries.clear();
                cached.generation += 1;
            }
        }
    }

    /// Path of the config file for the given tenant and deployment.
    pub fn config_path(&self, tenant: Tenant, deployment: Deployment) -> PathBuf {
        self.config_dir.join(deployment.config_file_name(tenant))
    }

    fn load(&self, tenant: Tenant, deployment: Deployment) -> Result<TenantConfig> {
        let path = self.config_path(tenant, deployment);
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path,
                tenant: tenant.to_string(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|e| Error::InvalidConfigFile {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let mut file: TenantConfigFile =
            serde_json::from_str(&raw).map_err(|e| Error::InvalidConfigFile {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let upper = tenant.as_str().to_ascii_uppercase();
        let username_key = format!("{SECRET_PREFIX}_USERNAME_{upper}");
        let password_key = format!("{SECRET_PREFIX}_PASSWORD_{upper}");

        let credential_source = match (self.env.get(&username_key), self.env.get(&password_key)) {
            (Some(user), Some(pass)) => {
                file.username = Some(user.to_string());
                file.password = Some(pass.to_string());
                log::info!("Using credentials from environment variables for {upper}");
                CredentialSource::Environment
            }
            _ => {
                log::info!("Using credentials from config file for {upper}");
                CredentialSource::File
            }
        };

        let mut missing = Vec::new();
        let endpoint = take_required(file.endpoint, "endpoint", &mut missing);
        let profile_endpoint =
            take_required(file.profile_endpoint, "profile_endpoint", &mut missing);
        let username = take_required(file.username, "username", &mut missing);
        let password = take_required(file.password, "password", &mut missing);
        let api_version = take_required(file.version, "version", &mut missing);

        if !missing.is_empty() {
            log::warn!(
                "[{upper}] incomplete configuration in {}: {}",
                path.display(),
                missing.join(", ")
            );
            return Err(Error::MissingConfigField(missing));
        }

        Ok(TenantConfig {
            endpoint,
            profile_endpoint,
            username,
            password,
            api_version,
            tenant,
            credential_source,
        })
    }
}

fn take_required(value: Option<String>, field: &str, missing: &mut Vec<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => {
            missing.push(field.to_string());
            String::new()
        }
    }
}
