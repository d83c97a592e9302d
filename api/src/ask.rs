use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdf_rag::{validate_request, Embedder, Generator, RagConfig, RagError, RagPipeline};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::rag_response::{ErrorResponse, RagResponse};

#[derive(Clone)]
pub struct AppState {
    config: Arc<RagConfig>,
    backends: Option<(Arc<dyn Embedder>, Arc<dyn Generator>)>,
}

impl AppState {
    pub fn new(config: RagConfig) -> Self {
        Self {
            config: Arc::new(config),
            backends: None,
        }
    }

    /// A fresh pipeline per request; nothing is shared between runs.
    fn pipeline(&self) -> Result<RagPipeline, RagError> {
        let config = self.config.as_ref().clone();
        match &self.backends {
            Some((embedder, generator)) => {
                RagPipeline::with_backends(config, embedder.clone(), generator.clone())
            }
            None => RagPipeline::new(config),
        }
    }
}

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct AskForm {
    question: String,
    uploads: Vec<Upload>,
}

impl AskForm {
    async fn read(multipart: &mut Multipart) -> Result<Self, String> {
        let mut form = AskForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| format!("Invalid upload: {}", e))?
        {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("question") => {
                    form.question = field
                        .text()
                        .await
                        .map_err(|e| format!("Invalid question: {}", e))?;
                }
                Some("files") => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| format!("Invalid upload: {}", e))?;
                    // Browsers send an empty part when no file was picked.
                    if !bytes.is_empty() {
                        form.uploads.push(Upload {
                            filename,
                            bytes: bytes.to_vec(),
                        });
                    }
                }
                other => log::debug!("Ignoring form field {:?}", other),
            }
        }

        Ok(form)
    }
}

/// Upload paths inside `dir`, keeping the original file names where they
/// are usable so answers can cite them.
fn upload_paths(dir: &Path, uploads: &[Upload]) -> Vec<PathBuf> {
    let mut used = HashSet::new();
    uploads
        .iter()
        .enumerate()
        .map(|(i, upload)| {
            let mut name = Path::new(&upload.filename)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .filter(|n| !n.is_empty() && !used.contains(n))
                .unwrap_or_else(|| format!("upload-{}.pdf", i + 1));
            // The fallback can itself clash with an uploaded name.
            let mut attempt = 2;
            while used.contains(&name) {
                name = format!("upload-{}-{}.pdf", i + 1, attempt);
                attempt += 1;
            }
            used.insert(name.clone());
            dir.join(name)
        })
        .collect()
}

fn status_for(err: &RagError) -> StatusCode {
    match err {
        RagError::Validation(_) => StatusCode::BAD_REQUEST,
        RagError::Extraction { .. } | RagError::EmptyIndex => StatusCode::UNPROCESSABLE_ENTITY,
        RagError::Embedding { .. } | RagError::Generation { .. } => StatusCode::BAD_GATEWAY,
        RagError::Retrieval { .. } | RagError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

pub async fn handle_ask(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let form = match AskForm::read(&mut multipart).await {
        Ok(form) => form,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let upload_dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            log::error!("Failed to create upload directory: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store uploads");
        }
    };
    let paths = upload_paths(upload_dir.path(), &form.uploads);

    if let Err(err) = validate_request(&paths, &form.question) {
        return error_response(StatusCode::BAD_REQUEST, err.to_string());
    }

    for (path, upload) in paths.iter().zip(&form.uploads) {
        if let Err(e) = tokio::fs::write(path, &upload.bytes).await {
            log::error!("Failed to write upload {}: {}", path.display(), e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store uploads");
        }
    }

    log::info!(
        "Answering question over {} uploaded document(s)",
        paths.len()
    );

    let result = match state.pipeline() {
        Ok(pipeline) => pipeline.run(&paths, &form.question).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(answer) => Json(RagResponse::from(answer)).into_response(),
        Err(err) => {
            log::error!("Pipeline failed: {}", err);
            error_response(status_for(&err), format!("Error processing PDFs: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pdf_rag::GenerationRequest;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XTESTBOUNDARYX";
    const PDF_STUB: &[u8] = b"%PDF";

    struct NeverEmbedder;

    #[async_trait]
    impl Embedder for NeverEmbedder {
        async fn embed_documents(&self, _texts: &[String]) -> pdf_rag::Result<Vec<Vec<f32>>> {
            Err(RagError::embedding("not expected in this test"))
        }

        async fn embed_query(&self, _text: &str) -> pdf_rag::Result<Vec<f32>> {
            Err(RagError::embedding("not expected in this test"))
        }
    }

    struct NeverGenerator;

    #[async_trait]
    impl Generator for NeverGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> pdf_rag::Result<String> {
            Err(RagError::generation("not expected in this test"))
        }
    }

    /// Every text lands on the same point; fine for one-chunk documents.
    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> pdf_rag::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        async fn embed_query(&self, _text: &str) -> pdf_rag::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, request: &GenerationRequest) -> pdf_rag::Result<String> {
            Ok(request.prompt.clone())
        }
    }

    struct UnauthorizedGenerator;

    #[async_trait]
    impl Generator for UnauthorizedGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> pdf_rag::Result<String> {
            Err(RagError::generation("HTTP 401 Unauthorized: invalid API key"))
        }
    }

    fn state_with(embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> AppState {
        AppState {
            config: Arc::new(RagConfig::default()),
            backends: Some((embedder, generator)),
        }
    }

    fn test_state() -> AppState {
        state_with(Arc::new(NeverEmbedder), Arc::new(NeverGenerator))
    }

    /// A one-page PDF showing `text` in Helvetica, with a valid xref table.
    fn one_page_pdf(text: &str) -> Vec<u8> {
        let stream = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text);
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [4 0 R] /Count 1 >>".to_string(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents 5 0 R >>"
                .to_string(),
            format!("<< /Length {} >>\nstream\n{}\nendstream", stream.len(), stream),
        ];

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets = Vec::new();
        for (i, object) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, object));
        }
        let xref_offset = out.len();
        out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in offsets {
            out.push_str(&format!("{:010} 00000 n \n", offset));
        }
        out.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        ));
        out.into_bytes()
    }

    fn multipart_body(question: Option<&str>, files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(question) = question {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"question\"\r\n\r\n{question}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_ask(body: Vec<u8>) -> (StatusCode, ErrorResponse) {
        let (status, bytes) = post_ask_to(test_state(), body).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_ask_to(state: AppState, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri("/ask")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_missing_files() {
        let (status, body) = post_ask(multipart_body(Some("What?"), &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Please upload at least one PDF file");
    }

    #[tokio::test]
    async fn rejects_missing_question() {
        let (status, body) = post_ask(multipart_body(None, &[("a.pdf", PDF_STUB)])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Please enter a question");
    }

    #[tokio::test]
    async fn rejects_more_than_two_files() {
        let files = [("a.pdf", PDF_STUB), ("b.pdf", PDF_STUB), ("c.pdf", PDF_STUB)];
        let (status, body) = post_ask(multipart_body(Some("What?"), &files)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Please upload no more than 2 PDF files");
    }

    #[tokio::test]
    async fn unreadable_pdf_is_reported_in_place_of_an_answer() {
        let (status, body) = post_ask(multipart_body(
            Some("What is inside?"),
            &[("notes.pdf", &b"definitely not a pdf"[..])],
        ))
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.status, "error");
        assert!(body.error.starts_with("Error processing PDFs: Failed to extract text"));
        assert!(body.error.contains("notes.pdf"));
    }

    #[tokio::test]
    async fn answers_with_context_from_the_upload() {
        let pdf = one_page_pdf("The capital of France is Paris.");
        let state = state_with(Arc::new(ConstantEmbedder), Arc::new(EchoGenerator));

        let (status, bytes) = post_ask_to(
            state,
            multipart_body(
                Some("What is the capital of France?"),
                &[("france.pdf", pdf.as_slice())],
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body: RagResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, "success");
        assert!(body.answer.contains("Paris"));
        assert_eq!(body.context_snippets.len(), 1);
        assert!(body.context_snippets[0].contains("capital of France"));
        assert_eq!(body.citations[0].document, "france.pdf");
        assert_eq!(body.citations[0].page, 1);

        let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(raw["processing_time_ms"].is_u64());
    }

    #[tokio::test]
    async fn generation_failures_map_to_bad_gateway() {
        let pdf = one_page_pdf("The capital of France is Paris.");
        let state = state_with(Arc::new(ConstantEmbedder), Arc::new(UnauthorizedGenerator));

        let (status, bytes) = post_ask_to(
            state,
            multipart_body(
                Some("What is the capital of France?"),
                &[("france.pdf", pdf.as_slice())],
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, "error");
        assert_eq!(
            body.error,
            "Error processing PDFs: Generation backend error: HTTP 401 Unauthorized: invalid API key"
        );
    }

    #[test]
    fn upload_paths_keep_names_and_avoid_collisions() {
        let dir = Path::new("/tmp/uploads");
        let uploads = vec![
            Upload { filename: "../../etc/report.pdf".to_string(), bytes: vec![1] },
            Upload { filename: "report.pdf".to_string(), bytes: vec![1] },
            Upload { filename: String::new(), bytes: vec![1] },
        ];

        let paths = upload_paths(dir, &uploads);
        assert_eq!(paths[0], dir.join("report.pdf"));
        assert_eq!(paths[1], dir.join("upload-2.pdf"));
        assert_eq!(paths[2], dir.join("upload-3.pdf"));
    }

    #[test]
    fn fallback_names_never_overwrite_an_upload() {
        let dir = Path::new("/tmp/uploads");
        let uploads = vec![
            Upload { filename: "upload-2.pdf".to_string(), bytes: vec![1] },
            Upload { filename: "upload-2.pdf".to_string(), bytes: vec![2] },
            Upload { filename: "upload-2-2.pdf".to_string(), bytes: vec![3] },
        ];

        let paths = upload_paths(dir, &uploads);
        assert_eq!(paths[0], dir.join("upload-2.pdf"));
        assert_eq!(paths[1], dir.join("upload-2-2.pdf"));
        assert_eq!(paths[2], dir.join("upload-3.pdf"));
        assert_ne!(paths[0], paths[1]);
    }
}
