//! `wkhtmltopdf` engine.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use super::process::find_executable;
use super::{probe_executable, render_through_files, EngineOptions};
use crate::error::EngineError;
use crate::pipeline::{Availability, PageOptions, PageOrientation, RenderEngine};

#[derive(Debug, Clone)]
pub struct WkhtmltopdfEngine {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl WkhtmltopdfEngine {
    pub const NAME: &'static str = "wkhtmltopdf";

    pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    pub fn locate(options: &EngineOptions) -> Self {
        let binary = options
            .wkhtmltopdf_path
            .clone()
            .or_else(|| find_executable(&[Self::NAME], options.search_path.as_deref()));
        Self::new(binary, options.timeout)
    }

    fn arguments(page: &PageOptions) -> Vec<String> {
        let margin = format!("{:.0}mm", page.margin_mm());
        let orientation = match page.orientation {
            PageOrientation::Portrait => "Portrait",
            PageOrientation::Landscape => "Landscape",
        };
        let mut args: Vec<String> = vec![
            "--quiet".into(),
            "--page-size".into(),
            "A4".into(),
            "--orientation".into(),
            orientation.into(),
        ];
        for side in ["top", "right", "bottom", "left"] {
            args.push(format!("--margin-{side}"));
            args.push(margin.clone());
        }
        args.push(if page.print_background {
            "--background".into()
        } else {
            "--no-background".into()
        });
        args.push("--encoding".into());
        args.push("UTF-8".into());
        args.push("--enable-local-file-access".into());
        args
    }
}

impl RenderEngine for WkhtmltopdfEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn probe(&self) -> Availability {
        let Some(binary) = &self.binary else {
            return Availability::Unavailable(
                "wkhtmltopdf not found (set WKHTMLTOPDF_PATH)".to_string(),
            );
        };
        match probe_executable(binary, &["--version"]) {
            Ok(()) => Availability::Available,
            Err(reason) => Availability::Unavailable(reason),
        }
    }

    fn render(&self, markup: &str, page: &PageOptions) -> Result<Vec<u8>, EngineError> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| EngineError::new(Self::NAME, "no wkhtmltopdf executable configured"))?;

        render_through_files(Self::NAME, markup, self.timeout, |_, input, output| {
            let mut command = Command::new(binary);
            command.args(Self::arguments(page)).arg(input).arg(output);
            command
        })
    }
}
