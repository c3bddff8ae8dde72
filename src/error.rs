use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = RecognitionError> = std::result::Result<T, E>;

/// 识别流程中的错误
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// 图片为空、损坏或无法解码，属于调用方错误，在任何模型推理之前返回
    #[error("无效输入: {0}")]
    Input(String),
    /// 特征库加载失败
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// 分割或嵌入模型执行失败，不自动重试
    #[error("模型推理失败: {0}")]
    Inference(String),
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl RecognitionError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn inference(err: impl fmt::Display) -> Self {
        Self::Inference(err.to_string())
    }
}

/// 特征库加载错误，出现时服务不应启动
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("特征库文件不存在: {0}")]
    NotFound(PathBuf),
    #[error("特征库为空")]
    Empty,
    #[error("物品 {item_id} 的嵌入向量长度为 {actual}，期望 {expected}")]
    EmbeddingDimension { item_id: i64, expected: usize, actual: usize },
    #[error("物品 {item_id} 的颜色向量长度为 {actual}，期望 {expected}")]
    ColorDimension { item_id: i64, expected: usize, actual: usize },
    #[error("物品 {item_id} 的{field}中含有 NaN 或无穷大")]
    NonFinite { item_id: i64, field: &'static str },
    /// 模型输出维数与特征库不一致，识别结果没有意义
    #[error("{stage}输出 {actual} 维，特征库为 {expected} 维")]
    ModelDimension { stage: &'static str, expected: usize, actual: usize },
    #[error("特征库解析失败: {0}")]
    Decode(String),
    #[error("特征库读写失败: {0}")]
    Io(#[from] std::io::Error),
}

/// 临时文件删除失败，只记录日志，不影响请求结果
#[derive(Debug)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub source: std::io::Error,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "删除临时文件失败 {}: {}", self.path.display(), self.source)
    }
}
