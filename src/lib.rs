//! # talent-card – Workday profile acquisition and talent-card PDF rendering
//!
//! The crate has two halves joined by a thin orchestrator:
//!
//! 1. **Acquire** – resolve a tenant's Workday config ([`tenant`]), then fetch
//!    the profile report over REST and the photo over SOAP ([`client`],
//!    [`envelope`], [`record`])
//! 2. **Render** – turn the record into markup ([`markup`]) and the markup
//!    into PDF through an ordered engine chain ([`pipeline`], [`engines`]),
//!    or build a fixed-layout PDF straight from the record ([`record_pdf`])
//!
//! [`service::TalentCardService`] wires both halves together; the
//! `talent-card` binary exposes it on the command line.

pub mod client;
pub mod engines;
pub mod envelope;
pub mod error;
pub mod markup;
pub mod pdf;
pub mod pipeline;
pub mod record;
pub mod record_pdf;
pub mod service;
pub mod settings;
pub mod tenant;

// Re-exports for convenience
pub use client::{ClientOptions, ProfileClient};
pub use error::{EngineError, EngineFailure, Error, FailureKind, Result};
pub use pipeline::{DocumentPipeline, PageOptions, PageOrientation, RenderEngine};
pub use record::{PhotoPayload, ProfileRecord, RenderArtifact};
pub use record_pdf::RecordRenderer;
pub use service::{CardFormat, TalentCardService};
pub use settings::Settings;
pub use tenant::{EnvVars, Tenant, TenantConfig, TenantConfigResolver};
