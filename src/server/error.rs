use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{error, warn};
use serde_json::json;
use thiserror::Error;

use crate::error::{CatalogError, RecognitionError};

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// 请求本身不合法，不会进入识别流程
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("鉴权失败")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
}

/// API错误类型
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn status(&self) -> StatusCode {
        if let Some(e) = self.0.downcast_ref::<RequestError>() {
            return match e {
                RequestError::Unauthorized => StatusCode::UNAUTHORIZED,
                RequestError::BadRequest(_) => StatusCode::BAD_REQUEST,
            };
        }
        if let Some(e) = self.0.downcast_ref::<RecognitionError>() {
            return match e {
                RecognitionError::Input(_) => StatusCode::BAD_REQUEST,
                RecognitionError::Catalog(_) => StatusCode::SERVICE_UNAVAILABLE,
                RecognitionError::Inference(_) | RecognitionError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
        }
        if self.0.downcast_ref::<CatalogError>().is_some() {
            return StatusCode::SERVICE_UNAVAILABLE;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求处理失败: {:?}", self.0);
        } else {
            warn!("请求被拒绝: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
