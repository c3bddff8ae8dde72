use std::sync::Arc;

use crate::cli::server::ServerCommand;
use crate::confidence::ConfidenceThresholds;
use crate::db::Database;
use crate::pipeline::Recognizer;

/// 应用状态
pub struct AppState {
    /// 识别流程
    pub recognizer: Recognizer,
    /// 元数据库连接，为空时不查询商品信息
    pub db: Option<Database>,
    /// 置信度阈值
    pub thresholds: ConfidenceThresholds,
    /// 请求未指定时返回的结果数量
    pub top_k: usize,
    /// 请求可指定的最大结果数量
    pub max_top_k: usize,
    /// 鉴权 token
    pub token: String,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(recognizer: Recognizer, db: Option<Database>, opts: ServerCommand) -> Arc<Self> {
        Arc::new(AppState {
            recognizer,
            db,
            thresholds: opts.search.thresholds(),
            top_k: opts.search.top_k,
            max_top_k: opts.max_top_k,
            token: opts.token,
        })
    }
}
