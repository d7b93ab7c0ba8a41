//! Process-level settings read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `TALENT_CARD_CONFIG_DIR` | `config` |
//! | `TALENT_CARD_TEMPLATE_DIR` | `templates` |
//! | `WORKDAY_SOAP_TEMPLATE` | `api/Get_Person_Photos_Request.xml` |
//! | `WORKDAY_TIMEOUT_SECS` | `30` |
//! | `TALENT_CARD_ENGINES` | `chromium,wkhtmltopdf,native` |
//! | `TALENT_CARD_ENGINE_TIMEOUT_SECS` | `60` |
//! | `TALENT_CARD_ORIENTATION` | `landscape` |
//! | `TALENT_CARD_MEMOIZE_CONFIG` | `false` |
//! | `WORKDAY_TENANT` | `gms` |
//! | `CHROME_PATH`, `WKHTMLTOPDF_PATH` | looked up on `PATH` |

use std::path::PathBuf;
use std::time::Duration;

use crate::client::{ClientOptions, DEFAULT_ENVELOPE_TEMPLATE, DEFAULT_TIMEOUT};
use crate::engines::{EngineKind, EngineOptions, DEFAULT_ENGINE_TIMEOUT};
use crate::error::{Error, Result};
use crate::pipeline::{PageOptions, PageOrientation};
use crate::tenant::{EnvVars, Tenant, TenantConfigResolver, DEFAULT_TENANT_VAR};

#[derive(Debug, Clone)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub template_dir: PathBuf,
    pub soap_template: PathBuf,
    pub request_timeout: Duration,
    pub engines: Vec<EngineKind>,
    pub engine_timeout: Duration,
    pub orientation: PageOrientation,
    pub memoize_config: bool,
    pub chrome_path: Option<PathBuf>,
    pub wkhtmltopdf_path: Option<PathBuf>,
    pub search_path: Option<String>,
    env: EnvVars,
}

impl Settings {
    pub fn from_env(env: &EnvVars) -> Result<Self> {
        let path = |key: &str, default: &str| {
            PathBuf::from(env.get(key).filter(|v| !v.is_empty()).unwrap_or(default))
        };

        let engines = match env.get("TALENT_CARD_ENGINES") {
            Some(list) => EngineKind::parse_order(list).map_err(|reason| Error::Settings {
                key: "TALENT_CARD_ENGINES".to_string(),
                reason,
            })?,
            None => EngineKind::DEFAULT_ORDER.to_vec(),
        };

        let orientation = match env.get("TALENT_CARD_ORIENTATION").map(str::trim) {
            None | Some("") => PageOrientation::Landscape,
            Some(v) if v.eq_ignore_ascii_case("landscape") => PageOrientation::Landscape,
            Some(v) if v.eq_ignore_ascii_case("portrait") => PageOrientation::Portrait,
            Some(other) => {
                return Err(Error::Settings {
                    key: "TALENT_CARD_ORIENTATION".to_string(),
                    reason: format!("expected portrait or landscape, got '{other}'"),
                })
            }
        };

        // Validated only; the resolver reads it again per request.
        Tenant::parse(env.get(DEFAULT_TENANT_VAR).unwrap_or("gms")).map_err(|e| Error::Settings {
            key: DEFAULT_TENANT_VAR.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            config_dir: path("TALENT_CARD_CONFIG_DIR", "config"),
            template_dir: path("TALENT_CARD_TEMPLATE_DIR", "templates"),
            soap_template: path("WORKDAY_SOAP_TEMPLATE", DEFAULT_ENVELOPE_TEMPLATE),
            request_timeout: seconds(env, "WORKDAY_TIMEOUT_SECS", DEFAULT_TIMEOUT)?,
            engines,
            engine_timeout: seconds(env, "TALENT_CARD_ENGINE_TIMEOUT_SECS", DEFAULT_ENGINE_TIMEOUT)?,
            orientation,
            memoize_config: flag(env, "TALENT_CARD_MEMOIZE_CONFIG")?,
            chrome_path: env.get("CHROME_PATH").filter(|v| !v.is_empty()).map(PathBuf::from),
            wkhtmltopdf_path: env
                .get("WKHTMLTOPDF_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            search_path: env.get("PATH").map(str::to_string),
            env: env.clone(),
        })
    }

    pub fn resolver(&self) -> TenantConfigResolver {
        let resolver = TenantConfigResolver::new(&self.config_dir, self.env.clone());
        if self.memoize_config {
            resolver.memoized()
        } else {
            resolver
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: self.request_timeout,
            envelope_template: Some(self.soap_template.clone()),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            timeout: self.engine_timeout,
            chrome_path: self.chrome_path.clone(),
            wkhtmltopdf_path: self.wkhtmltopdf_path.clone(),
            search_path: self.search_path.clone(),
        }
    }

    pub fn page_options(&self) -> PageOptions {
        PageOptions {
            orientation: self.orientation,
            ..PageOptions::default()
        }
    }
}

fn seconds(env: &EnvVars, key: &str, default: Duration) -> Result<Duration> {
    match env.get(key).map(str::trim) {
        None | Some("") => Ok(default),
        Some(raw) => match raw.parse::<u64>() {
            Ok(0) => Err(Error::Settings {
                key: key.to_string(),
                reason: "must be at least 1 second".to_string(),
            }),
            Ok(secs) => Ok(Duration::from_secs(secs)),
            Err(e) => Err(Error::Settings {
                key: key.to_string(),
                reason: format!("'{raw}' is not a whole number of seconds: {e}"),
            }),
        },
    }
}

fn flag(env: &EnvVars, key: &str) -> Result<bool> {
    match env.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some(other) => Err(Error::Settings {
            key: key.to_string(),
            reason: format!("'{other}' is not a boolean"),
        }),
    }
}
