use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::{EmbeddingCatalog, FeatureRecord};
use crate::normalize::dot;

/// 特征库超过该大小时并行计算相似度
const PARALLEL_THRESHOLD: usize = 4096;

/// 单条识别结果，分数越高越相似
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub item_id: i64,
    pub score: f32,
}

/// 颜色融合重排参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorFusion {
    /// 第一阶段按嵌入相似度保留的候选数量
    pub candidate_pool: usize,
    /// 颜色分数权重，0 为仅使用嵌入，1 为仅使用颜色
    pub color_weight: f32,
}

impl Default for ColorFusion {
    fn default() -> Self {
        Self { candidate_pool: 32, color_weight: 0.2 }
    }
}

/// 计算查询向量与特征库中每条嵌入的点积，顺序与特征库一致
fn embedding_scores(query: &[f32], catalog: &EmbeddingCatalog) -> Vec<f32> {
    let records = catalog.records();
    if records.len() >= PARALLEL_THRESHOLD {
        records.par_iter().map(|r| dot(query, &r.embedding)).collect()
    } else {
        records.iter().map(|r| dot(query, &r.embedding)).collect()
    }
}

/// 按分数降序稳定排序，同分时保持特征库顺序
///
/// 特征库构建时已排除非有限值，加 0 将 -0.0 变为 +0.0，使两者视为同分。
fn sort_descending<T>(items: &mut [(T, f32)]) {
    items.sort_by(|a, b| (b.1 + 0.).total_cmp(&(a.1 + 0.)));
}

/// 返回与查询向量点积最大的 `min(k, |catalog|)` 条记录
///
/// 特征库中的向量已经归一化，因此点积即余弦相似度。
pub fn find_top_k(query: &[f32], catalog: &EmbeddingCatalog, k: usize) -> Vec<RecognitionResult> {
    let mut scored = catalog
        .records()
        .iter()
        .zip(embedding_scores(query, catalog))
        .collect::<Vec<_>>();
    sort_descending(&mut scored);

    scored
        .into_iter()
        .take(k)
        .map(|(record, score)| RecognitionResult { item_id: record.item_id, score })
        .collect()
}

/// 两阶段颜色融合排序
///
/// 先按嵌入相似度取前 `candidate_pool` 个候选，再对候选计算颜色相似度并按
/// `(1 - w) * 嵌入分数 + w * 颜色分数` 重新排序。没有颜色特征的候选颜色分数为 0。
/// 返回数量为 `min(top_k, candidate_pool)`，`candidate_pool < top_k` 时结果会被截断。
///
/// # Arguments
///
/// * `query_embedding` - 已归一化的查询嵌入
/// * `query_color` - 查询颜色特征
/// * `catalog` - 特征库
/// * `top_k` - 返回结果数量
/// * `candidate_pool` - 候选池大小
/// * `color_weight` - 颜色权重
pub fn rank_with_color(
    query_embedding: &[f32],
    query_color: &[f32],
    catalog: &EmbeddingCatalog,
    top_k: usize,
    candidate_pool: usize,
    color_weight: f32,
) -> Vec<RecognitionResult> {
    let mut candidates: Vec<(&FeatureRecord, f32)> = catalog
        .records()
        .iter()
        .zip(embedding_scores(query_embedding, catalog))
        .collect();
    sort_descending(&mut candidates);
    candidates.truncate(candidate_pool);

    let mut fused = candidates
        .into_iter()
        .map(|(record, embedding_score)| {
            let color_score = record.color.as_deref().map_or(0., |c| dot(query_color, c));
            let score = (1. - color_weight) * embedding_score + color_weight * color_score;
            (record, score)
        })
        .collect::<Vec<_>>();
    sort_descending(&mut fused);

    fused
        .into_iter()
        .take(top_k)
        .map(|(record, score)| RecognitionResult { item_id: record.item_id, score })
        .collect()
}

/// 使用 [`ColorFusion`] 参数的 [`rank_with_color`]
pub fn rank_with_fusion(
    query_embedding: &[f32],
    query_color: &[f32],
    catalog: &EmbeddingCatalog,
    top_k: usize,
    fusion: ColorFusion,
) -> Vec<RecognitionResult> {
    rank_with_color(
        query_embedding,
        query_color,
        catalog,
        top_k,
        fusion.candidate_pool,
        fusion.color_weight,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;

    fn catalog(records: Vec<(i64, Vec<f32>, Option<Vec<f32>>)>) -> EmbeddingCatalog {
        let dim = records[0].1.len();
        let records = records
            .into_iter()
            .map(|(id, embedding, color)| FeatureRecord::new(id, embedding, color))
            .collect();
        EmbeddingCatalog::new(records, dim).unwrap()
    }

    fn ids(results: &[RecognitionResult]) -> Vec<i64> {
        results.iter().map(|r| r.item_id).collect()
    }

    #[test]
    fn test_find_top_k_orders_by_score() {
        let catalog = catalog(vec![
            (1, vec![1., 0.], None),
            (2, vec![0., 1.], None),
            (3, vec![0.8, 0.2], None),
        ]);
        let result = find_top_k(&[1., 0.], &catalog, 2);
        assert_eq!(ids(&result), vec![1, 3]);
        assert!(result[0].score > result[1].score);
    }

    #[test]
    fn test_find_top_k_respects_k() {
        let catalog = catalog(vec![(1, vec![1.], None), (2, vec![0.5], None)]);
        assert_eq!(find_top_k(&[1.], &catalog, 1).len(), 1);
    }

    #[test]
    fn test_find_top_k_larger_than_catalog() {
        let catalog = catalog(vec![(1, vec![0.2], None), (2, vec![0.5], None)]);
        let result = find_top_k(&[1.], &catalog, 10);
        assert_eq!(ids(&result), vec![2, 1]);
    }

    #[test]
    fn test_find_top_k_ties_keep_catalog_order() {
        let catalog = catalog(vec![
            (5, vec![0.5, 0.5], None),
            (3, vec![1., 0.], None),
            (4, vec![0.5, 0.5], None),
            (1, vec![0.5, 0.5], None),
        ]);
        let result = find_top_k(&[1., 0.], &catalog, 4);
        assert_eq!(ids(&result), vec![3, 5, 4, 1]);
    }

    #[test]
    fn test_catalog_rejects_nan_embedding() {
        let records = vec![
            FeatureRecord::new(1, vec![1., 0.], None),
            FeatureRecord::new(2, vec![f32::NAN, 0.], None),
        ];
        let err = EmbeddingCatalog::new(records, 2).unwrap_err();
        assert!(matches!(err, CatalogError::NonFinite { item_id: 2, .. }));
    }

    #[test]
    fn test_signed_zero_scores_keep_catalog_order() {
        let catalog = catalog(vec![(1, vec![-0., -1.], None), (2, vec![0., 1.], None)]);
        let result = find_top_k(&[1., 0.], &catalog, 2);
        assert_eq!(ids(&result), vec![1, 2]);
        assert_eq!(result[0].score, result[1].score);
    }

    #[test]
    fn test_rank_with_color_missing_color() {
        let catalog = catalog(vec![(1, vec![1., 0.], None), (2, vec![0.9, 0.1], None)]);
        let result = rank_with_color(&[1., 0.], &[1., 0.], &catalog, 1, 32, 0.2);
        assert_eq!(ids(&result), vec![1]);
        // 没有颜色时只剩下加权后的嵌入分数
        assert!((result[0].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_rank_with_color_applies_weight() {
        let catalog = catalog(vec![
            (1, vec![1., 0.], Some(vec![0., 1.])),
            (2, vec![0.9, 0.1], Some(vec![1., 0.])),
        ]);
        let result = rank_with_color(&[1., 0.], &[1., 0.], &catalog, 1, 2, 0.5);
        assert_eq!(ids(&result), vec![2]);
        assert!((result[0].score - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_rank_with_color_zero_weight_matches_top_k() {
        let catalog = catalog(vec![
            (1, vec![1., 0.], Some(vec![0., 1.])),
            (2, vec![0.9, 0.1], Some(vec![1., 0.])),
            (3, vec![0.1, 0.9], Some(vec![1., 0.])),
        ]);
        let fused = rank_with_color(&[1., 0.], &[1., 0.], &catalog, 3, 3, 0.);
        assert_eq!(fused, find_top_k(&[1., 0.], &catalog, 3));
    }

    #[test]
    fn test_rank_with_color_respects_candidate_pool() {
        let catalog = catalog(vec![
            (1, vec![1., 0.], Some(vec![0., 1.])),
            (2, vec![0.9, 0.1], Some(vec![1., 0.])),
            (3, vec![0.8, 0.2], Some(vec![1., 0.])),
        ]);
        let result = rank_with_color(&[1., 0.], &[1., 0.], &catalog, 2, 1, 0.2);
        assert_eq!(ids(&result), vec![1]);
    }

    #[test]
    fn test_rank_with_color_pool_excludes_color_match() {
        // 颜色完全匹配但嵌入相似度排在候选池之外的物品不会被召回
        let catalog = catalog(vec![
            (1, vec![1., 0.], Some(vec![0., 1.])),
            (2, vec![0.9, 0.1], Some(vec![0., 1.])),
            (3, vec![0., 1.], Some(vec![1., 0.])),
        ]);
        let result = rank_with_color(&[1., 0.], &[1., 0.], &catalog, 3, 2, 0.9);
        assert_eq!(ids(&result), vec![1, 2]);
    }

    #[test]
    fn test_rank_with_fusion_defaults() {
        let catalog = catalog(vec![(1, vec![1., 0.], None), (2, vec![0., 1.], None)]);
        let result = rank_with_fusion(&[0., 1.], &[], &catalog, 5, ColorFusion::default());
        assert_eq!(ids(&result), vec![2, 1]);
    }
}
