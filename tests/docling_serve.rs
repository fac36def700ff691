//! docling-serve backend tests against a wiremock server.

use edgequake_ocr_lambda::{ConvertRequest, DocumentConverter, DoclingServe};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn request(dir: &Path, do_ocr: bool) -> ConvertRequest {
    let pdf_path = dir.join("input.pdf");
    std::fs::write(&pdf_path, b"%PDF-1.7 test").unwrap();
    ConvertRequest {
        pdf_path,
        work_dir: dir.to_path_buf(),
        do_ocr,
        ocr_models: None,
        image_placeholders: true,
    }
}

fn body_text(req: &Request) -> String {
    String::from_utf8_lossy(&req.body).into_owned()
}

#[tokio::test]
async fn converts_and_summarises_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/convert/file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "document": {
                "filename": "input.pdf",
                "md_content": "# Annual Report\n\nBody\n",
                "json_content": {
                    "name": "input",
                    "texts": [{ "label": "title", "text": "Annual Report" }],
                    "pages": { "1": {}, "2": {} }
                }
            },
            "status": "success",
            "errors": [],
            "processing_time": 1.5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let converter = DoclingServe::new(server.uri(), Duration::from_secs(10)).unwrap();
    let doc = converter.convert(&request(dir.path(), false)).await.unwrap();

    assert_eq!(doc.markdown, "# Annual Report\n\nBody\n");
    assert_eq!(doc.title.as_deref(), Some("Annual Report"));
    assert_eq!(doc.page_count, 2);
    assert_eq!(doc.engine_version, None);

    let received = server.received_requests().await.unwrap();
    let body = body_text(&received[0]);
    assert!(body.contains("name=\"do_ocr\"\r\n\r\nfalse"), "{body}");
    assert!(body.contains("name=\"image_export_mode\"\r\n\r\nplaceholder"));
    assert!(body.contains("filename=\"input.pdf\""));
    assert!(body.contains("%PDF-1.7 test"));
}

#[tokio::test]
async fn failure_status_is_conversion_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/convert/file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "document": { "md_content": null, "json_content": null },
            "status": "failure",
            "errors": [{ "error_message": "corrupt xref" }]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let converter = DoclingServe::new(server.uri(), Duration::from_secs(10)).unwrap();
    let err = converter.convert(&request(dir.path(), true)).await.unwrap_err();
    assert_eq!(err.kind(), "ConversionFailed");
    assert!(err.to_string().contains("corrupt xref"), "{err}");
}

#[tokio::test]
async fn http_error_is_conversion_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/convert/file"))
        .respond_with(ResponseTemplate::new(500).set_body_string("worker crashed"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let converter = DoclingServe::new(server.uri(), Duration::from_secs(10)).unwrap();
    let err = converter.convert(&request(dir.path(), true)).await.unwrap_err();
    assert_eq!(err.kind(), "ConversionFailed");
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/convert/file"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let converter = DoclingServe::new(server.uri(), Duration::from_millis(200)).unwrap();
    let err = converter.convert(&request(dir.path(), true)).await.unwrap_err();
    assert_eq!(err.kind(), "ConversionTimeout");
}
