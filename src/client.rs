//! Workday acquisition client.
//!
//! One client is bound to one [`TenantConfig`] and exposes two independent
//! read paths against the same person:
//!
//! - [`ProfileClient::fetch_profile`] – REST custom report, JSON, Basic auth
//! - [`ProfileClient::fetch_person_photo`] – SOAP `Get_Person_Photos`,
//!   WS-Security credentials in the envelope
//!
//! Neither path retries; the first failure is returned with its detail.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::envelope::{parse_photo_response, EnvelopeFields, EnvelopeTemplate, PhotoResponse};
use crate::error::{Error, Result};
use crate::record::{PhotoPayload, ProfileRecord};
use crate::tenant::TenantConfig;

/// Default bound on a single backend call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default location of the SOAP request template, relative to the working
/// directory.
pub const DEFAULT_ENVELOPE_TEMPLATE: &str = "api/Get_Person_Photos_Request.xml";

/// Transport settings shared by every client built for a service.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// SOAP template file. `None` disables the photo path.
    pub envelope_template: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            envelope_template: Some(PathBuf::from(DEFAULT_ENVELOPE_TEMPLATE)),
        }
    }
}

pub struct ProfileClient {
    config: Arc<TenantConfig>,
    http: Client,
    template: Option<EnvelopeTemplate>,
}

impl ProfileClient {
    /// Bind a client to `config`. A missing SOAP template is not an error:
    /// the photo path reports [`Error::ProtocolUnavailable`] instead.
    pub fn new(config: Arc<TenantConfig>, options: &ClientOptions) -> Result<Self> {
        let http = Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!("talent-card/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        let template = match &options.envelope_template {
            Some(path) => match fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|text| EnvelopeTemplate::new(&text).map_err(|e| e.to_string()))
            {
                Ok(template) => Some(template),
                Err(e) => {
                    log::warn!(
                        "SOAP template {} not loaded ({e}); photo retrieval disabled",
                        path.display()
                    );
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            config,
            http,
            template,
        })
    }

    /// Build a client around template text instead of a template file.
    pub fn with_envelope_template(
        config: Arc<TenantConfig>,
        template: &str,
        options: &ClientOptions,
    ) -> Result<Self> {
        let options = ClientOptions {
            envelope_template: None,
            ..options.clone()
        };
        let mut client = Self::new(config, &options)?;
        client.template = Some(EnvelopeTemplate::new(template)?);
        Ok(client)
    }

    pub fn config(&self) -> &TenantConfig {
        &self.config
    }

    pub fn photo_available(&self) -> bool {
        self.template.is_some()
    }

    /// REST username: the SOAP principal without its `@tenant` suffix.
    pub fn rest_username(&self) -> &str {
        rest_username(&self.config.username)
    }

    /// Fetch the profile report for `employee_id`.
    pub fn fetch_profile(&self, employee_id: &str) -> Result<ProfileRecord> {
        let tenant = self.config.tenant;
        log::debug!(
            "[{tenant}] GET {} for employee {employee_id}",
            self.config.profile_endpoint
        );

        let result = self.request_profile(employee_id);
        match &result {
            Ok(record) => log::info!(
                "[{tenant}] profile fetched for {}",
                record
                    .worker_name()
                    .unwrap_or_else(|| format!("employee {employee_id}"))
            ),
            Err(e) => log::error!("[{tenant}] profile fetch failed for employee {employee_id}: {e}"),
        }
        result
    }

    fn request_profile(&self, employee_id: &str) -> Result<ProfileRecord> {
        let response = self
            .http
            .get(&self.config.profile_endpoint)
            .query(&[("format", "JSON"), ("Employee_ID", employee_id)])
            .basic_auth(self.rest_username(), Some(&self.config.password))
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().map_err(transport_error)?;

        match status {
            StatusCode::UNAUTHORIZED => return Err(Error::AuthenticationFailed),
            StatusCode::NOT_FOUND => return Err(Error::EmployeeNotFound(employee_id.to_string())),
            s if !s.is_success() => return Err(Error::backend_http(s.as_u16(), &body)),
            _ => {}
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| Error::InvalidProfileResponse(format!("invalid JSON: {e}")))?;
        ProfileRecord::from_value(value, employee_id)
    }

    /// Fetch the stored photo for `employee_id`.
    ///
    /// `Ok(None)` means the worker has no photo; a SOAP fault is always an
    /// error.
    pub fn fetch_person_photo(&self, employee_id: &str) -> Result<Option<PhotoPayload>> {
        let tenant = self.config.tenant;
        let result = self.request_photo(employee_id);
        match &result {
            Ok(Some(_)) => log::info!("[{tenant}] photo fetched for employee {employee_id}"),
            Ok(None) => log::info!("[{tenant}] no photo stored for employee {employee_id}"),
            Err(e) => log::error!("[{tenant}] photo fetch failed for employee {employee_id}: {e}"),
        }
        result
    }

    fn request_photo(&self, employee_id: &str) -> Result<Option<PhotoPayload>> {
        let template = self.template.as_ref().ok_or(Error::ProtocolUnavailable)?;
        let envelope = template.render(&EnvelopeFields {
            username: &self.config.username,
            password: &self.config.password,
            version: &self.config.api_version,
            employee_id,
        })?;

        let response = self
            .http
            .post(&self.config.endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", "")
            .body(envelope.into_bytes())
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().map_err(transport_error)?;
        if !status.is_success() {
            return Err(Error::backend_http(status.as_u16(), &body));
        }

        match parse_photo_response(&body)? {
            PhotoResponse::Fault(message) => Err(Error::BackendFault(message)),
            PhotoResponse::Photo(data) => Ok(Some(PhotoPayload::new(data))),
            PhotoResponse::NoPhoto => Ok(None),
        }
    }
}

fn rest_username(username: &str) -> &str {
    username.split('@').next().unwrap_or(username)
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else {
        Error::Transport(err.to_string())
    }
}
