//! HTTP routes over the job service.

use std::sync::Arc;

use api::{Service, UploadFile};
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::io::ReaderStream;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use unmark_core::config::MAX_FILES_PER_UPLOAD;

use crate::error::{HttpError, HttpResult};

type AppState = Arc<Service>;

/// Room for multipart framing on top of the file bytes.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(service: AppState) -> Router {
    let file_limit = usize::try_from(service.settings().max_file_size).unwrap_or(usize::MAX);
    let body_limit = file_limit
        .saturating_mul(MAX_FILES_PER_UPLOAD)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health))
        .route("/api/upload", post(upload))
        .route("/api/status/{id}", get(status))
        .route("/api/download/{id}", get(download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(service)
}

async fn health(State(service): State<AppState>) -> HttpResult<impl IntoResponse> {
    Ok(Json(service.health().await?))
}

/// POST /api/upload
///
/// Multipart form with one or more `files` fields.
async fn upload(
    State(service): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> HttpResult<impl IntoResponse> {
    let mut multipart =
        multipart.map_err(|_| HttpError::bad_request("Expected multipart/form-data"))?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::bad_request(e.body_text()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| HttpError::bad_request(e.body_text()))?;
        files.push(UploadFile {
            name,
            content_type,
            bytes,
        });
    }

    let response = service.upload(files).await.map_err(|e| match e {
        api::ApiError::Internal(_) => {
            HttpError(api::ApiError::Internal("Upload failed. Please try again.".to_string()))
        }
        other => HttpError(other),
    })?;
    Ok(Json(response))
}

/// GET /api/status/{id}
async fn status(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<impl IntoResponse> {
    let view = service.status(&id).await?;
    Ok((
        [(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")],
        Json(view),
    ))
}

/// GET /api/download/{id}
async fn download(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> HttpResult<Response> {
    let download = service.download(&id).await?;

    let file = tokio::fs::File::open(&download.path).await.map_err(|_| {
        HttpError(api::ApiError::NotFound(
            "Processed file no longer available".to_string(),
        ))
    })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name.replace(['"', '\\', '\r', '\n'], "_")
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, download.content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, download.size)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| HttpError(api::ApiError::Internal(e.to_string())))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use std::error::Error;
    use std::time::Duration;

    use actors::{FnProcessor, ImageProcessor};
    use api::Settings;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use unmark_core::ProcessOutcome;

    use super::*;

    type TestResult<T = ()> = Result<T, Box<dyn Error>>;

    const BOUNDARY: &str = "unmark-test-boundary";

    async fn app() -> TestResult<(tempfile::TempDir, Arc<Service>, Router)> {
        let dir = tempfile::tempdir()?;
        let settings = Settings {
            temp_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let processor: Arc<dyn ImageProcessor> = Arc::new(FnProcessor::new(|input, output| {
            Box::pin(async move {
                match tokio::fs::copy(&input, &output).await {
                    Ok(_) => ProcessOutcome::finished(Some(0), String::new(), String::new(), false),
                    Err(e) => ProcessOutcome::not_run(e.to_string()),
                }
            })
        }));
        let service = Arc::new(Service::with_processor(settings, processor).await?);
        Ok((dir, service.clone(), router(service)))
    }

    fn multipart_body(files: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, mime, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: {mime}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn json_body(response: Response) -> TestResult<serde_json::Value> {
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get(router: &Router, uri: &str) -> TestResult<Response> {
        let request = Request::builder().uri(uri).body(Body::empty())?;
        Ok(router.clone().oneshot(request).await?)
    }

    #[tokio::test]
    async fn upload_then_poll_then_download() -> TestResult {
        let (_dir, service, router) = app().await?;

        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(&[
                ("beach.png", "image/png", b"\x89PNG beach"),
                ("notes.txt", "text/plain", b"hello"),
            ])))?;
        let response = router.clone().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await?;
        let results = json["results"].as_array().cloned().unwrap_or_default();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["status"], "accepted");
        assert_eq!(results[1]["status"], "rejected");
        let id = results[0]["id"].as_str().unwrap_or_default().to_string();

        let mut state = String::new();
        for _ in 0..250 {
            let response = get(&router, &format!("/api/status/{id}")).await?;
            assert_eq!(
                response.headers()[header::CACHE_CONTROL],
                "no-cache, no-store, must-revalidate"
            );
            state = json_body(response).await?["state"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            if state == "complete" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(state, "complete");

        let response = get(&router, &format!("/api/download/{id}")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"beach_nowatermark.png\""
        );
        let bytes = response.into_body().collect().await?.to_bytes();
        assert_eq!(&bytes[..], b"\x89PNG beach");

        service.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn errors_are_json_with_status_codes() -> TestResult {
        let (_dir, service, router) = app().await?;

        let response = get(&router, "/api/status/unknown").await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await?["error"],
            "Processing ID not found or expired"
        );

        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))?;
        let response = router.clone().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await?["error"], "Expected multipart/form-data");

        let response = get(&router, "/health").await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await?["status"], "ok");

        service.shutdown().await;
        Ok(())
    }
}
