use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::confidence::{Confidence, ConfidenceThresholds};
use crate::db::{Database, ItemRecord, crud};
use crate::search::RecognitionResult;

/// 附带商品信息的识别结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionMatch {
    /// 商品 ID
    pub item_id: i64,
    /// 相似度分数
    pub score: f32,
    /// 置信度
    pub confidence: Confidence,
    /// 商品名称，未查询元数据时为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 品牌，未查询元数据时为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// 商品图片地址
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// 只附加置信度，不查询元数据
pub fn annotate(results: &[RecognitionResult], thresholds: &ConfidenceThresholds) -> Vec<RecognitionMatch> {
    results
        .iter()
        .map(|r| RecognitionMatch {
            item_id: r.item_id,
            score: r.score,
            confidence: thresholds.classify(r.score),
            name: None,
            brand: None,
            image_url: None,
        })
        .collect()
}

/// 将识别结果与商品记录合并
///
/// 没有元数据的结果会被丢弃，其余结果保持识别排序。
pub fn merge(
    results: &[RecognitionResult],
    items: Vec<ItemRecord>,
    thresholds: &ConfidenceThresholds,
) -> Vec<RecognitionMatch> {
    let mut items = items.into_iter().map(|item| (item.id, item)).collect::<HashMap<_, _>>();

    results
        .iter()
        .filter_map(|r| {
            // NOTE: 同一 ID 出现多次时只保留排名最高的一条
            let item = items.remove(&r.item_id)?;
            Some(RecognitionMatch {
                item_id: r.item_id,
                score: r.score,
                confidence: thresholds.classify(r.score),
                name: Some(item.name),
                brand: Some(item.brand),
                image_url: item.image_url,
            })
        })
        .collect()
}

/// 从元数据库查询识别结果对应的商品信息
pub async fn enrich(
    db: &Database,
    results: &[RecognitionResult],
    thresholds: &ConfidenceThresholds,
) -> sqlx::Result<Vec<RecognitionMatch>> {
    // 同一商品可能有多张照片，每个 ID 只查询一次
    let mut ids = results.iter().map(|r| r.item_id).collect::<Vec<_>>();
    ids.sort_unstable();
    ids.dedup();
    let items = crud::get_items(db, &ids).await?;
    Ok(merge(results, items, thresholds))
}
