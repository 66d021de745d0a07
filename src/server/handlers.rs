use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{ErrorResponse, LanguageOption, TranslateRequest, TranslateResponse};
use super::state::ServerState;
use crate::languages;
use crate::ocr::ProgressReporter;
use crate::pipeline::{FailureKind, ImageUpload, OverlayView, PipelineContext, PipelineFailure};
use crate::render::{DisplaySize, EXPORT_FILE_NAME};
use crate::settings;
use crate::style::OverlayStyleId;
use crate::translate::{TranslationRecord, format_results};

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(settings: settings::Settings, addr: String) -> Result<()> {
    let pipeline = PipelineContext::new(settings)?;
    let app = build_router(pipeline);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!(addr = %addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(pipeline: PipelineContext) -> Router {
    let state = Arc::new(ServerState { pipeline });
    Router::new()
        .route("/health", get(health))
        .route("/languages", get(supported_languages))
        .route("/translate", post(translate))
        .route("/export", post(export))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

async fn supported_languages() -> Json<Vec<LanguageOption>> {
    let options = languages::SUPPORTED_LANGUAGES
        .iter()
        .map(|lang| LanguageOption {
            value: lang.code.to_string(),
            label: lang.name.to_string(),
            flag: lang.flag.to_string(),
        })
        .collect();
    Json(options)
}

struct PreparedRequest {
    upload: ImageUpload,
    target: String,
    style: OverlayStyleId,
    visible: bool,
    display: Option<DisplaySize>,
}

impl PreparedRequest {
    fn view<'a>(&self, records: &'a [TranslationRecord]) -> OverlayView<'a> {
        OverlayView {
            records,
            style: self.style,
            visible: self.visible,
        }
    }
}

async fn prepare(
    pipeline: &PipelineContext,
    payload: TranslateRequest,
) -> Result<PreparedRequest, ApiError> {
    let settings = pipeline.settings();
    let encoded = payload
        .image_base64
        .as_deref()
        .map(strip_data_url)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| bad_request("image_base64 is required"))?;
    let bytes = BASE64
        .decode(encoded)
        .map_err(|err| bad_request(format!("image_base64 is not valid base64: {}", err)))?;

    let target = payload
        .lang
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(settings.target_lang.as_str())
        .to_ascii_lowercase();
    if !languages::is_supported(&target) {
        return Err(bad_request(format!("unsupported target language '{}'", target)));
    }
    let style = match payload.style.as_deref() {
        Some(value) => value
            .parse::<OverlayStyleId>()
            .map_err(|err| bad_request(err.to_string()))?,
        None => settings.overlay_style,
    };
    let display = match (payload.display_width, payload.display_height) {
        (Some(width), Some(height)) if width > 0.0 && height > 0.0 => {
            Some(DisplaySize::new(width, height))
        }
        (None, None) => None,
        _ => return Err(bad_request("display_width and display_height must both be positive")),
    };
    let visible = !payload.hide_overlay.unwrap_or(!settings.overlay_visible);

    let upload_settings = settings.clone();
    let upload = run_blocking(move || ImageUpload::from_bytes(&bytes, &upload_settings)).await?;
    Ok(PreparedRequest {
        upload,
        target,
        style,
        visible,
        display,
    })
}

/// Runs decode and render work on the blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("server task failed: {}", err),
                }),
            )
        })?
        .map_err(pipeline_error)
}

async fn translate(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let request = prepare(&state.pipeline, payload).await?;
    let records = state
        .pipeline
        .process_detached(&request.upload, &request.target, &ProgressReporter::silent())
        .await
        .map_err(pipeline_error)?;

    let (width, height) = (request.upload.width, request.upload.height);
    let (records, overlay_svg) = run_blocking(move || {
        let svg = state.pipeline.render_overlay(
            &request.upload,
            request.view(&records),
            request.display,
            false,
        );
        Ok((records, svg))
    })
    .await?;
    Ok(Json(TranslateResponse {
        width,
        height,
        results: format_results(&records),
        records,
        overlay_svg,
    }))
}

async fn export(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<TranslateRequest>,
) -> Result<Response<Body>, ApiError> {
    let request = prepare(&state.pipeline, payload).await?;
    let records = state
        .pipeline
        .process_detached(&request.upload, &request.target, &ProgressReporter::silent())
        .await
        .map_err(pipeline_error)?;

    let png = run_blocking(move || {
        state
            .pipeline
            .render_export(&request.upload, request.view(&records))
    })
    .await?;

    let mut response = Response::new(Body::from(png));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    let disposition = format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// Accepts both bare base64 and `data:<mime>;base64,<payload>` URLs.
fn strip_data_url(value: &str) -> &str {
    let value = value.trim();
    match value.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => value,
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn pipeline_error(err: anyhow::Error) -> ApiError {
    let status = match PipelineFailure::find(&err).map(|failure| failure.kind) {
        Some(FailureKind::Acquisition) => StatusCode::BAD_REQUEST,
        Some(FailureKind::Recognition) => StatusCode::UNPROCESSABLE_ENTITY,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(status = status.as_u16(), "request failed: {:#}", err);
    (
        status,
        Json(ErrorResponse {
            error: format!("{:#}", err),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{BBox, Recognition, RecognizedWord, TextRecognizer};
    use crate::render::OverlayFont;
    use crate::translate::{BlockTranslator, FallbackDictionary};
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    struct FixedRecognizer;

    impl TextRecognizer for FixedRecognizer {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn recognize(&self, _: &DynamicImage, _: &ProgressReporter) -> anyhow::Result<Recognition> {
            Ok(Recognition {
                words: vec![
                    RecognizedWord::new("hello", 90.0, BBox::new(10.0, 10.0, 60.0, 30.0)),
                    RecognizedWord::new("world", 90.0, BBox::new(70.0, 10.0, 130.0, 30.0)),
                ],
                full_text: "hello world".to_string(),
            })
        }
    }

    async fn spawn_server() -> String {
        let translator =
            BlockTranslator::new(None, None, FallbackDictionary::embedded().unwrap());
        let pipeline =
            PipelineContext::with_parts(settings::Settings::default(), translator, OverlayFont::default())
                .with_recognizer(Arc::new(FixedRecognizer));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(pipeline)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    fn png_base64() -> String {
        let image = RgbaImage::from_pixel(160, 60, Rgba([20, 20, 20, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", BASE64.encode(bytes))
    }

    #[test]
    fn data_urls_are_unwrapped() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url(" AAAA "), "AAAA");
    }

    #[tokio::test]
    async fn health_and_languages_carry_cors_headers() {
        let base = spawn_server().await;
        let client = client();
        let health = client.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(health.status(), 200);
        assert_eq!(
            health.headers()["access-control-allow-origin"].to_str().unwrap(),
            "*"
        );
        let languages: serde_json::Value = client
            .get(format!("{}/languages", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(languages.as_array().unwrap().len(), 15);
        assert_eq!(languages[1]["value"], "hi");
    }

    #[tokio::test]
    async fn translate_returns_records_and_overlay() {
        let base = spawn_server().await;
        let response = client()
            .post(format!("{}/translate", base))
            .json(&serde_json::json!({
                "image_base64": png_base64(),
                "lang": "es",
                "style": "solid",
                "display_width": 320.0,
                "display_height": 120.0
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["records"][0]["originalText"], "hello world");
        assert_eq!(body["records"][0]["translatedText"], "hola mundo");
        assert_eq!(body["records"][0]["toLanguage"], "Spanish");
        assert_eq!(body["results"], "1. hello world → hola mundo");
        let svg = body["overlay_svg"].as_str().unwrap();
        assert!(svg.contains(r#"width="320" height="120""#));
        assert!(svg.contains("hola mundo"));
    }

    #[tokio::test]
    async fn export_returns_png_at_native_size() {
        let base = spawn_server().await;
        let response = client()
            .post(format!("{}/export", base))
            .json(&serde_json::json!({ "image_base64": png_base64(), "lang": "fr" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["content-type"], "image/png");
        let bytes = response.bytes().await.unwrap();
        let image = image::load_from_memory(&bytes).unwrap();
        assert_eq!((image.width(), image.height()), (160, 60));
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let base = spawn_server().await;
        let client = client();
        let missing = client
            .post(format!("{}/translate", base))
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 400);

        let not_image = client
            .post(format!("{}/translate", base))
            .json(&serde_json::json!({ "image_base64": BASE64.encode("just text") }))
            .send()
            .await
            .unwrap();
        assert_eq!(not_image.status(), 400);
        let body: serde_json::Value = not_image.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("could not load image"));

        let bad_style = client
            .post(format!("{}/translate", base))
            .json(&serde_json::json!({ "image_base64": png_base64(), "style": "neon" }))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_style.status(), 400);
    }

    #[tokio::test]
    async fn blocking_work_failures_map_to_status() {
        let doubled = run_blocking(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(doubled, 42);

        let (status, _) = run_blocking(|| Err::<(), _>(PipelineFailure::acquisition("empty")))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, Json(body)) = run_blocking(|| -> Result<()> { panic!("render crashed") })
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.error.starts_with("server task failed"));
    }
}
