//! Concrete [`RenderEngine`] implementations and the factory that builds an
//! ordered chain from configuration.
//!
//! - [`ChromiumEngine`] – headless Chromium/Chrome `--print-to-pdf`
//! - [`WkhtmltopdfEngine`] – the `wkhtmltopdf` CLI
//! - [`NativeEngine`] – in-process printpdf rendering of a controlled HTML
//!   subset; always available

mod chromium;
mod html;
mod native;
pub(crate) mod process;
mod wkhtmltopdf;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;

pub use chromium::ChromiumEngine;
pub use html::{extract_blocks, parse_html, Block};
pub use native::NativeEngine;
pub use wkhtmltopdf::WkhtmltopdfEngine;

use crate::error::EngineError;
use crate::pipeline::{PageOptions, RenderEngine};
use process::{run_with_timeout, ProcessError};

/// Default bound on one external engine invocation.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(60);

/// Engines that can appear in the configured fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Chromium,
    Wkhtmltopdf,
    Native,
}

impl EngineKind {
    pub const DEFAULT_ORDER: [EngineKind; 3] =
        [EngineKind::Chromium, EngineKind::Wkhtmltopdf, EngineKind::Native];

    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::Chromium => "chromium",
            EngineKind::Wkhtmltopdf => "wkhtmltopdf",
            EngineKind::Native => "native",
        }
    }

    /// Parse a comma-separated engine order. Unknown and repeated names are
    /// rejected.
    pub fn parse_order(list: &str) -> Result<Vec<EngineKind>, String> {
        let mut order = Vec::new();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let kind: EngineKind = name.parse()?;
            if order.contains(&kind) {
                return Err(format!("engine '{name}' listed twice"));
            }
            order.push(kind);
        }
        if order.is_empty() {
            return Err("no engines listed".to_string());
        }
        Ok(order)
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(EngineKind::Chromium),
            "wkhtmltopdf" => Ok(EngineKind::Wkhtmltopdf),
            "native" => Ok(EngineKind::Native),
            other => Err(format!(
                "unknown engine '{other}' (expected chromium, wkhtmltopdf or native)"
            )),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executable locations and limits for the external engines.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub timeout: Duration,
    /// Explicit browser binary (`CHROME_PATH`).
    pub chrome_path: Option<PathBuf>,
    /// Explicit wkhtmltopdf binary (`WKHTMLTOPDF_PATH`).
    pub wkhtmltopdf_path: Option<PathBuf>,
    /// Search path for binaries not given explicitly.
    pub search_path: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_ENGINE_TIMEOUT,
            chrome_path: None,
            wkhtmltopdf_path: None,
            search_path: None,
        }
    }
}

/// Instantiate the engines for `order`, preserving it.
pub fn build_engines(order: &[EngineKind], options: &EngineOptions) -> Vec<Box<dyn RenderEngine>> {
    order
        .iter()
        .map(|kind| -> Box<dyn RenderEngine> {
            match kind {
                EngineKind::Chromium => Box::new(ChromiumEngine::locate(options)),
                EngineKind::Wkhtmltopdf => Box::new(WkhtmltopdfEngine::locate(options)),
                EngineKind::Native => Box::new(NativeEngine::new()),
            }
        })
        .collect()
}

/// Insert `page`'s print stylesheet into `markup`, inside `<head>` when
/// there is one.
pub fn inject_print_style(markup: &str, page: &PageOptions) -> String {
    let style = format!("<style>\n{}\n</style>", page.print_css());
    let lower = markup.to_ascii_lowercase();
    if let Some(pos) = lower.find("</head>") {
        format!("{}{style}\n{}", &markup[..pos], &markup[pos..])
    } else if let Some(pos) = lower.find("<body") {
        format!("{}<head>{style}</head>\n{}", &markup[..pos], &markup[pos..])
    } else {
        format!("{style}\n{markup}")
    }
}

/// Write `markup` to a scratch directory, run the command built by
/// `command_for(input, output)` and return the PDF it wrote.
///
/// The directory and everything in it is removed when this returns.
pub(crate) fn render_through_files<F>(
    engine: &str,
    markup: &str,
    timeout: Duration,
    command_for: F,
) -> Result<Vec<u8>, EngineError>
where
    F: FnOnce(&Path, &Path, &Path) -> Command,
{
    let fail = |cause: String| EngineError::new(engine, cause);

    let workdir = tempfile::Builder::new()
        .prefix("talent-card-")
        .tempdir()
        .map_err(|e| fail(format!("cannot create scratch directory: {e}")))?;
    let input = workdir.path().join("input.html");
    let output = workdir.path().join("output.pdf");
    fs::write(&input, markup).map_err(|e| fail(format!("cannot write markup: {e}")))?;

    let command = command_for(workdir.path(), &input, &output);
    let result = run_with_timeout(command, timeout).map_err(|e| match e {
        ProcessError::TimedOut(limit) => fail(format!("killed after {limit:?} timeout")),
        other => fail(other.to_string()),
    })?;

    let pdf = fs::read(&output).unwrap_or_default();
    if !result.status.success() {
        if is_pdf(&pdf) {
            log::warn!(
                "{engine} exited with {} but wrote a PDF: {}",
                result.status,
                result.stderr_excerpt()
            );
        } else {
            return Err(fail(format!(
                "exited with {}: {}",
                result.status,
                result.stderr_excerpt()
            )));
        }
    }
    if !is_pdf(&pdf) {
        return Err(fail("no PDF produced".to_string()));
    }
    Ok(pdf)
}

fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Probe an executable by running it with `args` under a short timeout.
pub(crate) fn probe_executable(binary: &Path, args: &[&str]) -> Result<(), String> {
    let mut command = Command::new(binary);
    command.args(args);
    match run_with_timeout(command, Duration::from_secs(15)) {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(format!(
            "{} {} exited with {}",
            binary.display(),
            args.join(" "),
            output.status
        )),
        Err(e) => Err(format!("{}: {e}", binary.display())),
    }
}
