//! Acquisition against a stubbed Workday backend.
//!
//! Covers the REST profile report (status mapping, report validation,
//! timeouts) and the SOAP photo call (photo, no photo, faults).

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use httpmock::MockServer;

use talent_card::tenant::CredentialSource;
use talent_card::{ClientOptions, Error, ProfileClient, Tenant, TenantConfig};

const REPORT_PATH: &str = "/ccx/service/customreport2/gms/ISU_Talent/Talent_Card";
const SOAP_PATH: &str = "/ccx/service/gms/Human_Resources/v44.1";
const ENVELOPE: &str = include_str!("../api/Get_Person_Photos_Request.xml");

// =====================================================================
// Helpers
// =====================================================================

fn config(server: &MockServer) -> Arc<TenantConfig> {
    Arc::new(TenantConfig {
        endpoint: server.url(SOAP_PATH),
        profile_endpoint: server.url(REPORT_PATH),
        username: "ISU_Talent@gms".to_string(),
        password: "p&ss<word>".to_string(),
        api_version: "v44.1".to_string(),
        tenant: Tenant::Gms,
        credential_source: CredentialSource::File,
    })
}

fn options(timeout: Duration) -> ClientOptions {
    ClientOptions {
        timeout,
        envelope_template: None,
    }
}

fn client(server: &MockServer) -> ProfileClient {
    ProfileClient::with_envelope_template(config(server), ENVELOPE, &options(Duration::from_secs(5)))
        .unwrap()
}

fn soap(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<env:Envelope xmlns:env="http://schemas.xmlsoap.org/soap/envelope/">
  <env:Body>{body}</env:Body>
</env:Envelope>"#
    )
}

// =====================================================================
// Profile report
// =====================================================================

#[test]
fn fetches_profile_with_basic_auth_and_query() {
    let server = MockServer::start();
    let expected_auth = format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode("ISU_Talent:p&ss<word>")
    );
    let mock = server.mock(|when, then| {
        when.method("GET")
            .path(REPORT_PATH)
            .query_param("format", "JSON")
            .query_param("Employee_ID", "123")
            .header("authorization", expected_auth.as_str());
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"Report_Entry":[{"Worker":"Jane Doe (123)","businessTitle":"Engineer"}]}"#);
    });

    let record = client(&server).fetch_profile("123").unwrap();
    mock.assert();
    assert_eq!(record.entries().len(), 1);
    assert_eq!(record.worker_name().as_deref(), Some("Jane Doe"));
    assert_eq!(
        record.lookup("businessTitle").and_then(|v| v.as_str()),
        Some("Engineer")
    );
}

#[test]
fn maps_error_statuses() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path(REPORT_PATH).query_param("Employee_ID", "401");
        then.status(401).body("denied");
    });
    server.mock(|when, then| {
        when.method("GET").path(REPORT_PATH).query_param("Employee_ID", "999");
        then.status(404).body("no such worker");
    });
    server.mock(|when, then| {
        when.method("GET").path(REPORT_PATH).query_param("Employee_ID", "500");
        then.status(500).body("x".repeat(2_000));
    });

    let client = client(&server);
    assert!(matches!(
        client.fetch_profile("401"),
        Err(Error::AuthenticationFailed)
    ));
    match client.fetch_profile("999") {
        Err(Error::EmployeeNotFound(id)) => assert_eq!(id, "999"),
        other => panic!("expected EmployeeNotFound, got {other:?}"),
    }
    match client.fetch_profile("500") {
        Err(Error::BackendHttpError { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.len() < 2_000, "body not trimmed: {} chars", body.len());
            assert!(body.ends_with("..."));
        }
        other => panic!("expected BackendHttpError, got {other:?}"),
    }
}

#[test]
fn validates_report_shape() {
    let server = MockServer::start();
    for (id, body) in [
        ("1", "not json"),
        ("2", r#"{"Other":[]}"#),
        ("3", r#"{"Report_Entry":{"Worker":"x"}}"#),
    ] {
        server.mock(|when, then| {
            when.method("GET").path(REPORT_PATH).query_param("Employee_ID", id);
            then.status(200).body(body);
        });
    }
    server.mock(|when, then| {
        when.method("GET").path(REPORT_PATH).query_param("Employee_ID", "4");
        then.status(200).body(r#"{"Report_Entry":[]}"#);
    });

    let client = client(&server);
    for id in ["1", "2", "3"] {
        assert!(
            matches!(client.fetch_profile(id), Err(Error::InvalidProfileResponse(_))),
            "employee {id}"
        );
    }
    assert!(matches!(
        client.fetch_profile("4"),
        Err(Error::EmployeeNotFound(_))
    ));
}

#[test]
fn slow_backend_times_out() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path(REPORT_PATH);
        then.status(200)
            .delay(Duration::from_secs(3))
            .body(r#"{"Report_Entry":[{"Worker":"Late (1)"}]}"#);
    });

    let client = ProfileClient::new(config(&server), &options(Duration::from_millis(300))).unwrap();
    assert!(matches!(client.fetch_profile("1"), Err(Error::Timeout)));
}

#[test]
fn unreachable_backend_is_a_transport_error() {
    let server = MockServer::start();
    let mut config = (*config(&server)).clone();
    config.profile_endpoint = "http://127.0.0.1:9/report".to_string();
    let client = ProfileClient::new(Arc::new(config), &options(Duration::from_secs(2))).unwrap();
    assert!(matches!(
        client.fetch_profile("1"),
        Err(Error::Transport(_)) | Err(Error::Timeout)
    ));
}

// =====================================================================
// Person photo
// =====================================================================

#[test]
fn photo_request_embeds_escaped_credentials_and_id() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path(SOAP_PATH)
            .header("soapaction", "")
            .body_includes("<wsse:Username>ISU_Talent@gms</wsse:Username>")
            .body_includes(">p&amp;ss&lt;word&gt;</wsse:Password>")
            .body_includes(r#"wd:version="v44.1""#)
            .body_includes(r#"<wd:ID wd:type="Employee_ID">123</wd:ID>"#);
        then.status(200).body(soap(""));
    });

    assert!(client(&server).fetch_person_photo("123").unwrap().is_none());
    mock.assert();
}

#[test]
fn unparseable_template_file_disables_photos() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.xml");
    std::fs::write(&path, "<wsse:Username>{{ username </wsse:Username>").unwrap();

    let client = ProfileClient::new(
        config(&server),
        &ClientOptions {
            timeout: Duration::from_secs(5),
            envelope_template: Some(path),
        },
    )
    .unwrap();
    assert!(!client.photo_available());
    assert!(matches!(
        ProfileClient::with_envelope_template(
            config(&server),
            "{{ username ",
            &options(Duration::from_secs(5))
        ),
        Err(Error::Template(_))
    ));
}

#[test]
fn fetches_photo_verbatim() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path(SOAP_PATH)
            .header("content-type", "text/xml; charset=utf-8");
        then.status(200).body(soap(
            r#"<wd:Get_Person_Photos_Response xmlns:wd="urn:com.workday/bsvc">
                 <wd:Response_Data><wd:Person_Photo><wd:Person_Photo_Data>
                   <wd:File>  iVBORw0KGgo=  </wd:File>
                 </wd:Person_Photo_Data></wd:Person_Photo></wd:Response_Data>
               </wd:Get_Person_Photos_Response>"#,
        ));
    });

    let photo = client(&server).fetch_person_photo("123").unwrap();
    mock.assert();
    assert_eq!(photo.map(|p| p.into_inner()).as_deref(), Some("iVBORw0KGgo="));
}

#[test]
fn missing_photo_is_none() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("POST").path(SOAP_PATH);
        then.status(200).body(soap(
            r#"<wd:Get_Person_Photos_Response xmlns:wd="urn:com.workday/bsvc">
                 <wd:Response_Data/>
               </wd:Get_Person_Photos_Response>"#,
        ));
    });

    assert_eq!(client(&server).fetch_person_photo("123").unwrap(), None);
}

#[test]
fn soap_fault_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("POST").path(SOAP_PATH);
        then.status(200).body(soap(
            "<env:Fault><faultcode>env:Client</faultcode>\
             <faultstring>bad creds</faultstring></env:Fault>",
        ));
    });

    match client(&server).fetch_person_photo("123") {
        Err(Error::BackendFault(message)) => assert_eq!(message, "bad creds"),
        other => panic!("expected BackendFault, got {other:?}"),
    }
}

#[test]
fn non_xml_photo_response_is_malformed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("POST").path(SOAP_PATH);
        then.status(200).body("<html><body>gateway</body></html>");
    });

    assert!(matches!(
        client(&server).fetch_person_photo("123"),
        Err(Error::MalformedResponse(_))
    ));
}

#[test]
fn photo_path_without_template_is_unavailable() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST").path(SOAP_PATH);
        then.status(200).body(soap(""));
    });

    let client = ProfileClient::new(config(&server), &options(Duration::from_secs(5))).unwrap();
    assert!(!client.photo_available());
    assert!(matches!(
        client.fetch_person_photo("123"),
        Err(Error::ProtocolUnavailable)
    ));
    mock.assert_hits(0);
}
