use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum_auth::AuthBearer;
use axum_typed_multipart::TypedMultipart;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::info;
use tokio::task::block_in_place;

use super::error::{RequestError, Result};
use super::state::AppState;
use super::types::*;
use crate::enrich::{annotate, enrich};
use crate::metrics;

/// 识别一张上传的图片
#[utoipa::path(
    post,
    path = "/recognize",
    request_body(content = RecognizeForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = RecognizeResponse),
        (status = 400, description = "图片为空或无法解码"),
        (status = 401, description = "token 无效"),
    )
)]
pub async fn recognize_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    data: TypedMultipart<RecognizeRequest>,
) -> Result<Json<RecognizeResponse>> {
    check_token(&state, &token)?;
    info!("正在识别上传图片: {} 字节", data.file.len());
    recognize(&state, &data.file, data.top_k).await.map(Json)
}

/// 识别一张 Base64 编码的图片
#[utoipa::path(
    post,
    path = "/recognize/base64",
    request_body = Base64Request,
    responses(
        (status = 200, body = RecognizeResponse),
        (status = 400, description = "图片为空或无法解码"),
        (status = 401, description = "token 无效"),
    )
)]
pub async fn recognize_base64_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Json(data): Json<Base64Request>,
) -> Result<Json<RecognizeResponse>> {
    check_token(&state, &token)?;
    let bytes = decode_base64(&data.image_base64)?;
    info!("正在识别 Base64 图片: {} 字节", bytes.len());
    recognize(&state, &bytes, data.top_k).await.map(Json)
}

/// 导出 Prometheus 指标
#[utoipa::path(get, path = "/metrics", responses((status = 200, body = String)))]
pub async fn metrics_handler() -> Result<String> {
    Ok(metrics::gather_text()?)
}

fn check_token(state: &AppState, token: &str) -> Result<()> {
    if token != state.token {
        return Err(RequestError::Unauthorized.into());
    }
    Ok(())
}

/// 解码 Base64 图片，去掉可能存在的 data URL 前缀
fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let data = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| RequestError::BadRequest(format!("无效的 Base64 数据: {e}")))?;
    Ok(bytes)
}

async fn recognize(state: &AppState, bytes: &[u8], top_k: Option<usize>) -> Result<RecognizeResponse> {
    if bytes.is_empty() {
        return Err(RequestError::BadRequest("图片数据为空".to_string()).into());
    }

    let start = Instant::now();
    let top_k = top_k.unwrap_or(state.top_k).min(state.max_top_k);
    let results = block_in_place(|| state.recognizer.recognize_bytes(bytes, top_k))?;

    let result = match &state.db {
        Some(db) => enrich(db, &results, &state.thresholds).await?,
        None => annotate(&results, &state.thresholds),
    };

    Ok(RecognizeResponse { time: start.elapsed().as_millis() as u64, result })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::*;
    use crate::confidence::{Confidence, ConfidenceThresholds};
    use crate::pipeline::RecognizerBuilder;
    use crate::testing::*;

    fn state(work_dir: &std::path::Path) -> Arc<AppState> {
        limited_state(work_dir, 100)
    }

    fn limited_state(work_dir: &std::path::Path, max_top_k: usize) -> Arc<AppState> {
        let recognizer = RecognizerBuilder::new(extractor(Default::default(), Default::default()), rgb_catalog())
            .work_dir(work_dir)
            .build()
            .unwrap();
        Arc::new(AppState {
            recognizer,
            db: None,
            thresholds: ConfidenceThresholds::default(),
            top_k: 3,
            max_top_k,
            token: "secret".to_string(),
        })
    }

    fn base64_request(bytes: &[u8], top_k: Option<usize>) -> Json<Base64Request> {
        Json(Base64Request { image_base64: STANDARD.encode(bytes), top_k })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_recognize_base64() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let Json(response) = recognize_base64_handler(
            State(state),
            AuthBearer("secret".to_string()),
            base64_request(&png_bytes([0, 0, 255]), Some(2)),
        )
        .await
        .unwrap();

        assert_eq!(response.result.len(), 2);
        assert_eq!(response.result[0].item_id, 3);
        assert_eq!(response.result[0].confidence, Confidence::High);
        assert_eq!(response.result[1].confidence, Confidence::Low);
        assert!(crate::utils::list_dir(dir.path()).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_recognize_base64_default_top_k() {
        let dir = tempfile::tempdir().unwrap();
        let Json(response) = recognize_base64_handler(
            State(state(dir.path())),
            AuthBearer("secret".to_string()),
            base64_request(&png_bytes([255, 0, 0]), None),
        )
        .await
        .unwrap();
        assert_eq!(response.result.len(), 3);
        assert_eq!(response.result[0].item_id, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_top_k_capped() {
        let dir = tempfile::tempdir().unwrap();
        let Json(response) = recognize_base64_handler(
            State(limited_state(dir.path(), 2)),
            AuthBearer("secret".to_string()),
            base64_request(&png_bytes([255, 0, 0]), Some(100_000)),
        )
        .await
        .unwrap();
        assert_eq!(response.result.len(), 2);
        assert_eq!(response.result[0].item_id, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejects_bad_token() {
        let dir = tempfile::tempdir().unwrap();
        let err = recognize_base64_handler(
            State(state(dir.path())),
            AuthBearer("wrong".to_string()),
            base64_request(&png_bytes([255, 0, 0]), None),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejects_empty_and_invalid_images() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        for bytes in [b"".as_slice(), b"not an image".as_slice()] {
            let err = recognize_base64_handler(
                State(state.clone()),
                AuthBearer("secret".to_string()),
                base64_request(bytes, None),
            )
            .await
            .unwrap_err();
            assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        }
        assert!(crate::utils::list_dir(dir.path()).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejects_zero_top_k() {
        let dir = tempfile::tempdir().unwrap();
        let err = recognize_base64_handler(
            State(state(dir.path())),
            AuthBearer("secret".to_string()),
            base64_request(&png_bytes([255, 0, 0]), Some(0)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_decode_base64() {
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64("data:image/png;base64,aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64(" aGVsbG8=\n").unwrap(), b"hello");
        assert!(decode_base64("not base64!").is_err());
    }
}
