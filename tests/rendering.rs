//! Rendering pipeline and end-to-end talent cards.
//!
//! These tests validate:
//! - Fallback order, probing and the aggregate failure report
//! - Byte-identical output for identical input
//! - The in-process engine as the last resort
//! - The service producing markup, pipeline PDFs and record PDFs

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use httpmock::MockServer;
use sha2::{Digest, Sha256};

use talent_card::engines::{build_engines, EngineKind, EngineOptions, NativeEngine};
use talent_card::markup::TemplateRenderer;
use talent_card::pdf::{FlowWriter, TextStyle};
use talent_card::pipeline::{Availability, RenderState};
use talent_card::{
    CardFormat, ClientOptions, DocumentPipeline, EngineError, EnvVars, Error, FailureKind,
    PageOptions, RecordRenderer, RenderArtifact, RenderEngine, TalentCardService,
    TenantConfigResolver,
};

// =====================================================================
// Helpers
// =====================================================================

struct Stub {
    name: &'static str,
    available: bool,
    output: Result<&'static [u8], &'static str>,
    calls: Arc<AtomicUsize>,
}

impl Stub {
    fn ok(name: &'static str, output: &'static [u8]) -> Self {
        Self {
            name,
            available: true,
            output: Ok(output),
            calls: Arc::default(),
        }
    }

    fn failing(name: &'static str, reason: &'static str) -> Self {
        Self {
            output: Err(reason),
            ..Self::ok(name, b"")
        }
    }

    fn missing(name: &'static str) -> Self {
        Self {
            available: false,
            ..Self::ok(name, b"%PDF-never")
        }
    }
}

impl RenderEngine for Stub {
    fn name(&self) -> &str {
        self.name
    }

    fn probe(&self) -> Availability {
        if self.available {
            Availability::Available
        } else {
            Availability::Unavailable(format!("{} not installed", self.name))
        }
    }

    fn render(&self, markup: &str, _page: &PageOptions) -> Result<Vec<u8>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.output {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            // Deterministic: output depends only on the input.
            Ok(bytes) => Ok([bytes, markup.as_bytes()].concat()),
            Err(reason) => Err(EngineError::new(self.name, reason)),
        }
    }
}

fn pipeline(engines: Vec<Stub>) -> DocumentPipeline {
    DocumentPipeline::new(
        engines
            .into_iter()
            .map(|e| Box::new(e) as Box<dyn RenderEngine>)
            .collect(),
        PageOptions::default(),
    )
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

// =====================================================================
// Fallback chain
// =====================================================================

#[test]
fn first_available_engine_wins() {
    let unused = Stub::ok("third", b"%PDF-third");
    let unused_calls = Arc::clone(&unused.calls);
    let missing = Stub::missing("first");
    let missing_calls = Arc::clone(&missing.calls);

    let pipeline = pipeline(vec![missing, Stub::ok("second", b"%PDF-second "), unused]);
    let (result, trace) = pipeline.render_markup_traced("<p>x</p>");

    assert_eq!(result.unwrap(), b"%PDF-second <p>x</p>");
    assert_eq!(
        trace.state,
        RenderState::Succeeded {
            engine: "second".to_string()
        }
    );
    assert_eq!(trace.failures.len(), 1);
    assert_eq!(trace.failures[0].kind, FailureKind::Unavailable);
    assert_eq!(missing_calls.load(Ordering::SeqCst), 0);
    assert_eq!(unused_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn failures_fall_through_in_order() {
    let pipeline = pipeline(vec![
        Stub::failing("crashy", "segfault"),
        Stub::ok("empty", b""),
        Stub::ok("last", b"%PDF-last"),
    ]);
    let (result, trace) = pipeline.render_markup_traced("doc");

    assert_eq!(result.unwrap(), b"%PDF-lastdoc");
    let names: Vec<_> = trace.failures.iter().map(|f| f.engine.as_str()).collect();
    assert_eq!(names, ["crashy", "empty"]);
    assert!(trace.failures.iter().all(|f| f.kind == FailureKind::Failed));
    assert!(trace.failures[0].reason.contains("segfault"));
}

#[test]
fn exhausted_chain_reports_every_engine() {
    let pipeline = pipeline(vec![
        Stub::missing("chromium"),
        Stub::missing("wkhtmltopdf"),
        Stub::failing("native", "layout error"),
    ]);
    let (result, trace) = pipeline.render_markup_traced("doc");
    assert_eq!(trace.state, RenderState::AllFailed);

    match result {
        Err(Error::RenderingUnavailable(failures)) => {
            let summary: Vec<_> = failures
                .iter()
                .map(|f| (f.engine.as_str(), f.kind.clone()))
                .collect();
            assert_eq!(
                summary,
                [
                    ("chromium", FailureKind::Unavailable),
                    ("wkhtmltopdf", FailureKind::Unavailable),
                    ("native", FailureKind::Failed),
                ]
            );
            assert!(failures[0].reason.contains("not installed"));
        }
        other => panic!("expected RenderingUnavailable, got {other:?}"),
    }
}

#[test]
fn identical_input_gives_identical_bytes() {
    let pipeline = pipeline(vec![Stub::missing("gone"), Stub::ok("stable", b"%PDF-1.7\n")]);
    let markup = "<html><body><h1>Jane Doe</h1></body></html>";

    let first = Sha256::digest(pipeline.render_markup(markup).unwrap());
    let second = Sha256::digest(pipeline.render_markup(markup).unwrap());
    assert_eq!(first, second);

    let other = Sha256::digest(pipeline.render_markup("<p>someone else</p>").unwrap());
    assert_ne!(first, other);
}

#[test]
fn pipeline_is_shared_across_threads() {
    let pipeline = Arc::new(pipeline(vec![Stub::ok("stable", b"%PDF-")]));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || pipeline.render_markup(&format!("doc {i}")).unwrap())
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), format!("%PDF-doc {i}").into_bytes());
    }
}

// =====================================================================
// Built-in engines
// =====================================================================

#[test]
fn missing_external_engines_fall_back_to_native() {
    let engines = build_engines(&EngineKind::DEFAULT_ORDER, &EngineOptions::default());
    let pipeline = DocumentPipeline::new(engines, PageOptions::a4_landscape());

    let listed: Vec<_> = pipeline.engines().into_iter().map(|(name, _)| name).collect();
    assert_eq!(listed, ["chromium", "wkhtmltopdf", "native"]);

    let (result, trace) = pipeline.render_markup_traced(
        "<html><head><title>Card</title></head><body>\
         <h1>Jane Doe</h1><p>Engineer</p><ul><li>Rust</li><li>SQL</li></ul>\
         <table><tr><th>Role</th><th>Years</th></tr><tr><td>Lead</td><td>3</td></tr></table>\
         </body></html>",
    );
    assert_valid_pdf(&result.unwrap());
    assert_eq!(
        trace.state,
        RenderState::Succeeded {
            engine: NativeEngine::NAME.to_string()
        }
    );
    assert_eq!(trace.failures.len(), 2);
}

#[test]
fn long_documents_flow_onto_more_pages() {
    let mut writer = FlowWriter::new("Long", &PageOptions::default());
    for i in 0..200 {
        writer.text(
            &format!("Paragraph {i} with enough words to wrap across the line."),
            &TextStyle::BODY,
            0.0,
        );
    }
    assert!(writer.page_count() > 1, "pages: {}", writer.page_count());

    let body: String = (0..200)
        .map(|i| format!("<p>Paragraph {i} with enough words to wrap across the line.</p>"))
        .collect();
    let long = NativeEngine::new()
        .render(&format!("<body>{body}</body>"), &PageOptions::default())
        .unwrap();
    let short = NativeEngine::new()
        .render("<body><p>Paragraph</p></body>", &PageOptions::default())
        .unwrap();
    assert_valid_pdf(&long);
    assert!(long.len() > short.len());
}

// =====================================================================
// Service
// =====================================================================

const TEMPLATE: &str = "<html><head><title>{{first_name Worker}}</title></head>\
<body><h1>{{first_name Worker}}</h1><p>{{businessTitle}}</p>\
{{{list Skills}}}</body></html>";

fn service(server: &MockServer, config_dir: &std::path::Path, engines: Vec<Stub>) -> TalentCardService {
    fs::write(
        config_dir.join("workday_config-gms.json"),
        format!(
            r#"{{"endpoint": "{}", "profile_endpoint": "{}", "username": "isu@gms",
                "password": "pw", "version": "v44.1"}}"#,
            server.url("/soap"),
            server.url("/report"),
        ),
    )
    .unwrap();

    TalentCardService::new(
        TenantConfigResolver::new(config_dir, EnvVars::default()),
        ClientOptions {
            timeout: Duration::from_secs(5),
            envelope_template: None,
        },
        Box::new(TemplateRenderer::from_source(TEMPLATE)),
        pipeline(engines),
        RecordRenderer::default(),
    )
}

fn mock_report(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method("GET")
            .path("/report")
            .query_param("Employee_ID", "123");
        then.status(200)
            .header("content-type", "application/json")
            .body(
                r#"{"Report_Entry":[{"Worker":"Jane <Doe> (123)","businessTitle":"Engineer",
                    "Skills":["Rust","SQL"]}]}"#,
            );
    })
}

#[test]
fn card_as_markup() {
    let server = MockServer::start();
    let report = mock_report(&server);
    let dir = tempfile::tempdir().unwrap();
    let service = service(&server, dir.path(), vec![Stub::ok("stub", b"%PDF-")]);

    let artifact = service.talent_card("123", None, CardFormat::Html).unwrap();
    report.assert();
    let RenderArtifact::Markup(html) = artifact else {
        panic!("expected markup");
    };
    assert!(html.contains("<h1>Jane &lt;Doe&gt;</h1>"));
    assert!(html.contains("<p>Engineer</p>"));
    assert!(html.contains("<ul><li>Rust</li><li>SQL</li></ul>"));
}

#[test]
fn card_through_the_pipeline() {
    let server = MockServer::start();
    mock_report(&server);
    let dir = tempfile::tempdir().unwrap();
    let service = service(
        &server,
        dir.path(),
        vec![Stub::missing("chromium"), Stub::ok("stub", b"%PDF-stub\n")],
    );

    match service.talent_card("123", Some("GMS"), CardFormat::Pdf).unwrap() {
        RenderArtifact::Pdf(bytes) => {
            assert!(bytes.starts_with(b"%PDF-stub\n<html>"));
            assert!(String::from_utf8_lossy(&bytes).contains("Engineer"));
        }
        other => panic!("expected PDF, got {other:?}"),
    }
}

#[test]
fn direct_card_skips_the_engines() {
    let server = MockServer::start();
    mock_report(&server);
    let dir = tempfile::tempdir().unwrap();
    let stub = Stub::ok("stub", b"%PDF-");
    let calls = Arc::clone(&stub.calls);
    let service = service(&server, dir.path(), vec![stub]);

    let artifact = service.talent_card("123", None, CardFormat::DirectPdf).unwrap();
    assert_eq!(artifact.content_type(), "application/pdf");
    assert_valid_pdf(artifact.as_bytes());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn card_errors_surface_unchanged() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/report");
        then.status(404);
    });
    let dir = tempfile::tempdir().unwrap();
    let service = service(&server, dir.path(), vec![Stub::ok("stub", b"%PDF-")]);

    assert!(matches!(
        service.talent_card("404", None, CardFormat::Pdf),
        Err(Error::EmployeeNotFound(_))
    ));
    assert!(matches!(
        service.talent_card("404", Some("acme"), CardFormat::Pdf),
        Err(Error::InvalidTenant(_))
    ));
    assert!(matches!(
        service.talent_card("404", Some("csc"), CardFormat::Pdf),
        Err(Error::ConfigNotFound { .. })
    ));
}
