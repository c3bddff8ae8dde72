use axum::body::Bytes;
use axum_typed_multipart::TryFromMultipart;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::enrich::RecognitionMatch;

/// 识别请求参数
#[derive(TryFromMultipart)]
pub struct RecognizeRequest {
    pub file: Bytes,
    pub top_k: Option<usize>,
}

/// 识别表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct RecognizeForm {
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 返回的结果数量
    pub top_k: Option<usize>,
}

/// Base64 识别请求
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Base64Request {
    /// Base64 编码的图片，可以带有 `data:image/...;base64,` 前缀
    pub image_base64: String,
    /// 返回的结果数量
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// 识别响应
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecognizeResponse {
    /// 识别耗时，单位为毫秒
    pub time: u64,
    /// 按分数降序排列的识别结果
    pub result: Vec<RecognitionMatch>,
}
