//! Pipeline – converts markup into PDF bytes by walking an ordered list of
//! rendering engines until one succeeds.
//!
//! Per request the pipeline moves through
//! `NotStarted → TryingEngine(i) → Succeeded | TryingEngine(i + 1) | AllFailed`.
//! Engines are probed once, when the pipeline is built; an engine that
//! probed unavailable is skipped without being invoked.

use crate::error::{EngineError, EngineFailure, Error, FailureKind, Result};

/// A4 in PDF points.
pub const A4_WIDTH_PT: f32 = 595.28;
pub const A4_HEIGHT_PT: f32 = 841.89;

/// 10 mm in points.
pub const DEFAULT_MARGIN_PT: f32 = 28.35;

/// Page orientation for the generated PDF.
///
/// `Portrait` is only the type-level default used by
/// [`PageOptions::default`]; cards rendered through [`Settings`](crate::settings::Settings) default to
/// `Landscape`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageOrientation {
    /// Portrait mode: height > width.
    #[default]
    Portrait,
    /// Landscape mode: width > height.
    Landscape,
}

/// Page setup shared by every engine. Fixed per pipeline, not per call.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOptions {
    /// Page width in points (default: A4 = 595.28).
    pub page_width: f32,
    /// Page height in points (default: A4 = 841.89).
    pub page_height: f32,
    /// Uniform page margin in points (default: 10 mm).
    pub margin: f32,
    pub orientation: PageOrientation,
    /// Keep background colours and images when printing.
    pub print_background: bool,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page_width: A4_WIDTH_PT,
            page_height: A4_HEIGHT_PT,
            margin: DEFAULT_MARGIN_PT,
            orientation: PageOrientation::Portrait,
            print_background: true,
        }
    }
}

impl PageOptions {
    pub fn a4_landscape() -> Self {
        Self {
            orientation: PageOrientation::Landscape,
            ..Self::default()
        }
    }

    /// Effective page width after applying orientation.
    pub fn effective_width(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_width,
            PageOrientation::Landscape => self.page_height,
        }
    }

    /// Effective page height after applying orientation.
    pub fn effective_height(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_height,
            PageOrientation::Landscape => self.page_width,
        }
    }

    pub fn margin_mm(&self) -> f32 {
        self.margin * 0.352778
    }

    /// Print stylesheet equivalent of these options, for browser engines.
    pub fn print_css(&self) -> String {
        let orientation = match self.orientation {
            PageOrientation::Portrait => "portrait",
            PageOrientation::Landscape => "landscape",
        };
        let adjust = if self.print_background { "exact" } else { "economy" };
        format!(
            "@page {{ size: A4 {orientation}; margin: {:.1}mm; }}\n\
             html {{ -webkit-print-color-adjust: {adjust}; print-color-adjust: {adjust}; }}",
            self.margin_mm()
        )
    }
}

/// Result of probing an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

/// A markup → PDF backend.
pub trait RenderEngine: Send + Sync {
    /// Stable identifier used in configuration and diagnostics.
    fn name(&self) -> &str;

    /// Check whether the engine can run in this environment.
    fn probe(&self) -> Availability;

    fn render(&self, markup: &str, page: &PageOptions) -> Result<Vec<u8>, EngineError>;
}

/// Outcome of one fallback attempt. Consumed immediately by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEngineResult {
    Success(Vec<u8>),
    Unavailable(String),
    Failed(String),
}

/// Pipeline progress for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    NotStarted,
    TryingEngine(usize),
    Succeeded { engine: String },
    AllFailed,
}

/// Everything that happened while rendering one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTrace {
    /// Engines that did not produce output, in the order they were tried.
    pub failures: Vec<EngineFailure>,
    /// Terminal state.
    pub state: RenderState,
}

struct EngineSlot {
    engine: Box<dyn RenderEngine>,
    availability: Availability,
}

/// Ordered, probed engine chain.
pub struct DocumentPipeline {
    slots: Vec<EngineSlot>,
    page: PageOptions,
}

impl DocumentPipeline {
    /// Build the chain in the given order, probing each engine once.
    pub fn new(engines: Vec<Box<dyn RenderEngine>>, page: PageOptions) -> Self {
        let slots = engines
            .into_iter()
            .map(|engine| {
                let availability = engine.probe();
                match &availability {
                    Availability::Available => {
                        log::info!("Render engine '{}' available", engine.name())
                    }
                    Availability::Unavailable(reason) => {
                        log::warn!("Render engine '{}' unavailable: {reason}", engine.name())
                    }
                }
                EngineSlot {
                    engine,
                    availability,
                }
            })
            .collect();
        Self { slots, page }
    }

    pub fn page_options(&self) -> &PageOptions {
        &self.page
    }

    /// Engine names with their probe results, in fallback order.
    pub fn engines(&self) -> Vec<(&str, &Availability)> {
        self.slots
            .iter()
            .map(|slot| (slot.engine.name(), &slot.availability))
            .collect()
    }

    /// Render markup with the first engine that succeeds.
    pub fn render_markup(&self, markup: &str) -> Result<Vec<u8>> {
        self.render_markup_traced(markup).0
    }

    /// Like [`render_markup`](Self::render_markup), also returning the
    /// attempt trace.
    pub fn render_markup_traced(&self, markup: &str) -> (Result<Vec<u8>>, RenderTrace) {
        let mut failures = Vec::new();
        let mut state = RenderState::NotStarted;

        for (index, slot) in self.slots.iter().enumerate() {
            let name = slot.engine.name();
            state = RenderState::TryingEngine(index);
            log::debug!("{state:?}: '{name}'");

            match self.attempt(slot, markup) {
                RenderEngineResult::Success(bytes) => {
                    log::info!("Rendered PDF with '{name}' ({} bytes)", bytes.len());
                    let trace = RenderTrace {
                        failures,
                        state: RenderState::Succeeded {
                            engine: name.to_string(),
                        },
                    };
                    return (Ok(bytes), trace);
                }
                RenderEngineResult::Unavailable(reason) => {
                    log::debug!("Skipping unavailable engine '{name}': {reason}");
                    failures.push(EngineFailure {
                        engine: name.to_string(),
                        kind: FailureKind::Unavailable,
                        reason,
                    });
                }
                RenderEngineResult::Failed(reason) => {
                    log::warn!("Engine '{name}' failed, falling back: {reason}");
                    failures.push(EngineFailure {
                        engine: name.to_string(),
                        kind: FailureKind::Failed,
                        reason,
                    });
                }
            }
        }

        log::error!(
            "All {} render engines failed (last state {state:?})",
            failures.len()
        );
        let trace = RenderTrace {
            failures: failures.clone(),
            state: RenderState::AllFailed,
        };
        (Err(Error::RenderingUnavailable(failures)), trace)
    }

    fn attempt(&self, slot: &EngineSlot, markup: &str) -> RenderEngineResult {
        if let Availability::Unavailable(reason) = &slot.availability {
            return RenderEngineResult::Unavailable(reason.clone());
        }
        match slot.engine.render(markup, &self.page) {
            Ok(bytes) if bytes.is_empty() => {
                RenderEngineResult::Failed("engine produced an empty document".to_string())
            }
            Ok(bytes) => RenderEngineResult::Success(bytes),
            Err(err) => RenderEngineResult::Failed(err.cause),
        }
    }
}
