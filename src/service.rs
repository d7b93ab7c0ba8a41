//! Request orchestration: resolve the tenant, acquire, then render.
//!
//! The service holds no per-request state. Each call resolves its tenant
//! config (possibly from the resolver's cache) and builds a client bound to
//! it, so calls for different tenants can run on separate threads.

use std::fmt;
use std::str::FromStr;

use crate::client::{ClientOptions, ProfileClient};
use crate::engines::{build_engines, EngineKind};
use crate::error::Result;
use crate::markup::{MarkupRenderer, TemplateRenderer};
use crate::pipeline::DocumentPipeline;
use crate::record::{PhotoPayload, ProfileRecord, RenderArtifact};
use crate::record_pdf::RecordRenderer;
use crate::settings::Settings;
use crate::tenant::{Tenant, TenantConfigResolver};

/// Output requested from [`TalentCardService::talent_card`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardFormat {
    /// Rendered template markup.
    Html,
    /// Template markup through the engine pipeline.
    #[default]
    Pdf,
    /// Fixed-layout PDF built from the record, no markup involved.
    DirectPdf,
}

impl FromStr for CardFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(CardFormat::Html),
            "pdf" => Ok(CardFormat::Pdf),
            "direct" | "direct-pdf" | "direct_pdf" => Ok(CardFormat::DirectPdf),
            other => Err(format!("unknown format '{other}' (expected html, pdf or direct)")),
        }
    }
}

impl fmt::Display for CardFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CardFormat::Html => "html",
            CardFormat::Pdf => "pdf",
            CardFormat::DirectPdf => "direct",
        })
    }
}

pub struct TalentCardService {
    resolver: TenantConfigResolver,
    client_options: ClientOptions,
    markup: Box<dyn MarkupRenderer>,
    pipeline: DocumentPipeline,
    records: RecordRenderer,
}

impl TalentCardService {
    pub fn new(
        resolver: TenantConfigResolver,
        client_options: ClientOptions,
        markup: Box<dyn MarkupRenderer>,
        pipeline: DocumentPipeline,
        records: RecordRenderer,
    ) -> Self {
        Self {
            resolver,
            client_options,
            markup,
            pipeline,
            records,
        }
    }

    /// Wire every collaborator from [`Settings`], with the pipeline limited
    /// to `engines` (probed here). Pass `&settings.engines` for the
    /// configured chain.
    pub fn from_settings(settings: &Settings, engines: &[EngineKind]) -> Self {
        let page = settings.page_options();
        let engines = build_engines(engines, &settings.engine_options());
        Self::new(
            settings.resolver(),
            settings.client_options(),
            Box::new(TemplateRenderer::from_dir(&settings.template_dir)),
            DocumentPipeline::new(engines, page.clone()),
            RecordRenderer::new(page),
        )
    }

    pub fn resolver(&self) -> &TenantConfigResolver {
        &self.resolver
    }

    pub fn pipeline(&self) -> &DocumentPipeline {
        &self.pipeline
    }

    fn client(&self, tenant: Option<&str>) -> Result<ProfileClient> {
        let config = self.resolver.resolve(tenant)?;
        ProfileClient::new(config, &self.client_options)
    }

    pub fn get_profile(&self, employee_id: &str, tenant: Option<&str>) -> Result<ProfileRecord> {
        self.client(tenant)?.fetch_profile(employee_id)
    }

    pub fn get_photo(&self, employee_id: &str, tenant: Option<&str>) -> Result<Option<PhotoPayload>> {
        self.client(tenant)?.fetch_person_photo(employee_id)
    }

    pub fn render_markup(&self, markup: &str) -> Result<Vec<u8>> {
        self.pipeline.render_markup(markup)
    }

    pub fn render_record(&self, record: &ProfileRecord) -> Result<Vec<u8>> {
        self.records.render_record(record)
    }

    /// Fetch the profile and produce a talent card in `format`.
    pub fn talent_card(
        &self,
        employee_id: &str,
        tenant: Option<&str>,
        format: CardFormat,
    ) -> Result<RenderArtifact> {
        let resolved: Tenant = self.resolver.tenant_for(tenant)?;
        let record = self.get_profile(employee_id, Some(resolved.as_str()))?;
        log::info!("[{resolved}] building {format} talent card for employee {employee_id}");

        match format {
            CardFormat::DirectPdf => self.render_record(&record).map(RenderArtifact::Pdf),
            CardFormat::Html => self
                .markup
                .render(resolved, &record)
                .map(RenderArtifact::Markup),
            CardFormat::Pdf => {
                let markup = self.markup.render(resolved, &record)?;
                self.render_markup(&markup).map(RenderArtifact::Pdf)
            }
        }
    }
}
