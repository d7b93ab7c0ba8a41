//! Headless Chromium / Chrome engine.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use super::process::find_executable;
use super::{inject_print_style, probe_executable, render_through_files, EngineOptions};
use crate::error::EngineError;
use crate::pipeline::{Availability, PageOptions, RenderEngine};

/// Binaries tried on `PATH` when no explicit path is configured.
pub const BROWSER_CANDIDATES: [&str; 4] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl ChromiumEngine {
    pub const NAME: &'static str = "chromium";

    pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    /// Use the configured browser, or the first candidate found on the
    /// search path.
    pub fn locate(options: &EngineOptions) -> Self {
        let binary = options.chrome_path.clone().or_else(|| {
            find_executable(&BROWSER_CANDIDATES, options.search_path.as_deref())
        });
        Self::new(binary, options.timeout)
    }
}

impl RenderEngine for ChromiumEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn probe(&self) -> Availability {
        let Some(binary) = &self.binary else {
            return Availability::Unavailable(
                "no chromium or chrome executable found (set CHROME_PATH)".to_string(),
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
            .ok_or_else(|| EngineError::new(Self::NAME, "no browser executable configured"))?;
        let document = inject_print_style(markup, page);

        render_through_files(Self::NAME, &document, self.timeout, |workdir, input, output| {
            let mut command = Command::new(binary);
            command
                .arg("--headless")
                .arg("--disable-gpu")
                .arg("--no-sandbox")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--no-pdf-header-footer")
                .arg(format!("--user-data-dir={}", workdir.join("profile").display()))
                .arg(format!("--print-to-pdf={}", output.display()))
                .arg(format!("file://{}", input.display()));
            command
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn make_executable(path: &PathBuf) {
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("set perms");
    }

    fn fake_browser(dir: &TempDir, args_log: &PathBuf) -> PathBuf {
        let script_path = dir.path().join("fake-chromium");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> "{args_file}"
for arg in "$@"; do
  case "$arg" in
    --print-to-pdf=*)
      out="${{arg#--print-to-pdf=}}"
      printf '%%PDF-1.4 fake\n' > "$out"
      ;;
  esac
done
exit 0
"#,
            args_file = args_log.display()
        );
        fs::write(&script_path, script).expect("write script");
        make_executable(&script_path);
        script_path
    }

    #[test]
    fn renders_with_print_flags() {
        let dir = TempDir::new().expect("temp dir");
        let args_log = dir.path().join("args.log");
        let engine = ChromiumEngine::new(
            Some(fake_browser(&dir, &args_log)),
            Duration::from_secs(10),
        );

        assert_eq!(engine.probe(), Availability::Available);
        let pdf = engine
            .render("<p>hello</p>", &PageOptions::default())
            .expect("pdf rendered");
        assert!(pdf.starts_with(b"%PDF-"));

        let args = fs::read_to_string(&args_log).expect("read args");
        for flag in ["--headless", "--no-sandbox", "--no-pdf-header-footer", "--print-to-pdf="] {
            assert!(args.contains(flag), "missing {flag} in {args}");
        }
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let engine = ChromiumEngine::new(None, Duration::from_secs(1));
        assert!(matches!(engine.probe(), Availability::Unavailable(_)));

        let gone = ChromiumEngine::new(
            Some(PathBuf::from("/nonexistent/chromium")),
            Duration::from_secs(1),
        );
        assert!(matches!(gone.probe(), Availability::Unavailable(_)));
    }

    #[test]
    fn crash_without_output_fails() {
        let dir = TempDir::new().expect("temp dir");
        let script_path = dir.path().join("crashing-chromium");
        fs::write(&script_path, "#!/bin/sh\necho 'gpu process died' >&2\nexit 134\n")
            .expect("write script");
        make_executable(&script_path);

        let engine = ChromiumEngine::new(Some(script_path), Duration::from_secs(10));
        let err = engine
            .render("<p>x</p>", &PageOptions::default())
            .unwrap_err();
        assert_eq!(err.engine, "chromium");
        assert!(err.cause.contains("gpu process died"), "{}", err.cause);
    }
}
