use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::normalize::l2_normalize_in_place;

/// 单个物品的特征记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRecord {
    #[serde(alias = "perfumeId", alias = "PerfumeId", alias = "ItemId")]
    pub item_id: i64,
    #[serde(alias = "vector", alias = "Vector", alias = "Embedding")]
    pub embedding: Vec<f32>,
    // NOTE: 不能使用 skip_serializing_if，bincode 不是自描述格式，跳过字段会导致无法反序列化
    #[serde(default, alias = "Color")]
    pub color: Option<Vec<f32>>,
}

impl FeatureRecord {
    pub fn new(item_id: i64, embedding: Vec<f32>, color: Option<Vec<f32>>) -> Self {
        Self { item_id, embedding, color }
    }
}

/// 特征库文件格式，`.json` 为 JSON，其余均视为 bincode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Json,
    Bincode,
}

impl CatalogFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().map(|s| s.to_string_lossy().to_ascii_lowercase()) {
            Some(ext) if ext == "json" => Self::Json,
            _ => Self::Bincode,
        }
    }
}

/// 只读的内存特征库，加载后在整个进程生命周期内共享
#[derive(Debug)]
pub struct EmbeddingCatalog {
    records: Vec<FeatureRecord>,
    embedding_dim: usize,
    color_dim: Option<usize>,
}

impl EmbeddingCatalog {
    /// 校验记录并构建特征库，向量保持原样
    ///
    /// # Arguments
    ///
    /// * `records` - 特征记录，不能为空
    /// * `embedding_dim` - 期望的嵌入向量维数
    pub fn new(records: Vec<FeatureRecord>, embedding_dim: usize) -> Result<Self, CatalogError> {
        if records.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut color_dim = None;
        for record in &records {
            if record.embedding.len() != embedding_dim {
                return Err(CatalogError::EmbeddingDimension {
                    item_id: record.item_id,
                    expected: embedding_dim,
                    actual: record.embedding.len(),
                });
            }
            if !record.embedding.iter().all(|x| x.is_finite()) {
                return Err(CatalogError::NonFinite { item_id: record.item_id, field: "嵌入向量" });
            }
            if let Some(color) = &record.color {
                if !color.iter().all(|x| x.is_finite()) {
                    return Err(CatalogError::NonFinite { item_id: record.item_id, field: "颜色向量" });
                }
                // 第一个颜色向量决定整个库的颜色维数
                let expected = *color_dim.get_or_insert(color.len());
                if color.len() != expected {
                    return Err(CatalogError::ColorDimension {
                        item_id: record.item_id,
                        expected,
                        actual: color.len(),
                    });
                }
            }
        }

        Ok(Self { records, embedding_dim, color_dim })
    }

    /// 从文件加载特征库，并对所有向量做 L2 归一化，使点积等价于余弦相似度
    pub fn load<P: AsRef<Path>>(path: P, embedding_dim: usize) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        info!("加载特征库: {}", path.display());

        let mut records = read_records(path)?;
        for record in records.iter_mut() {
            l2_normalize_in_place(&mut record.embedding);
            if let Some(color) = record.color.as_mut() {
                l2_normalize_in_place(color);
            }
        }

        let catalog = Self::new(records, embedding_dim)?;
        info!(
            "特征库加载完成，共 {} 条记录，其中 {} 条带颜色特征",
            catalog.len(),
            catalog.color_count()
        );
        Ok(catalog)
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<FeatureRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 特征库在构建时保证非空
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// 颜色向量维数，所有记录都没有颜色时为 None
    pub fn color_dim(&self) -> Option<usize> {
        self.color_dim
    }

    pub fn has_color(&self) -> bool {
        self.color_dim.is_some()
    }

    /// 带颜色特征的记录数量
    pub fn color_count(&self) -> usize {
        self.records.iter().filter(|r| r.color.is_some()).count()
    }
}

/// 读取特征记录，不做任何校验
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<FeatureRecord>, CatalogError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CatalogError::NotFound(path.to_path_buf()));
    }

    let reader = BufReader::new(File::open(path)?);
    let format = CatalogFormat::from_path(path);
    debug!("特征库格式: {:?}", format);

    let records: Vec<FeatureRecord> = match format {
        CatalogFormat::Json => {
            serde_json::from_reader(reader).map_err(|e| CatalogError::Decode(e.to_string()))?
        }
        CatalogFormat::Bincode => {
            bincode::deserialize_from(reader).map_err(|e| CatalogError::Decode(e.to_string()))?
        }
    };
    Ok(records)
}

/// 写入特征记录，格式由文件后缀决定
pub fn write_records<P: AsRef<Path>>(path: P, records: &[FeatureRecord]) -> Result<(), CatalogError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let writer = BufWriter::new(File::create(path)?);
    match CatalogFormat::from_path(path) {
        CatalogFormat::Json => {
            serde_json::to_writer(writer, records).map_err(|e| CatalogError::Decode(e.to_string()))?
        }
        CatalogFormat::Bincode => {
            bincode::serialize_into(writer, records).map_err(|e| CatalogError::Decode(e.to_string()))?
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, embedding: &[f32]) -> FeatureRecord {
        FeatureRecord::new(id, embedding.to_vec(), None)
    }

    #[test]
    fn test_new_rejects_empty() {
        let err = EmbeddingCatalog::new(vec![], 2).unwrap_err();
        assert!(matches!(err, CatalogError::Empty));
    }

    #[test]
    fn test_new_rejects_dimension_mismatch() {
        let err =
            EmbeddingCatalog::new(vec![record(1, &[1., 0.]), record(2, &[1., 0., 0.])], 2)
                .unwrap_err();
        match err {
            CatalogError::EmbeddingDimension { item_id, expected, actual } => {
                assert_eq!((item_id, expected, actual), (2, 2, 3));
            }
            e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_new_rejects_color_mismatch() {
        let records = vec![
            FeatureRecord::new(1, vec![1., 0.], Some(vec![1., 0., 0.])),
            FeatureRecord::new(2, vec![0., 1.], None),
            FeatureRecord::new(3, vec![0., 1.], Some(vec![1., 0.])),
        ];
        let err = EmbeddingCatalog::new(records, 2).unwrap_err();
        assert!(matches!(err, CatalogError::ColorDimension { item_id: 3, expected: 3, actual: 2 }));
    }

    #[test]
    fn test_new_keeps_order_and_dims() {
        let records = vec![
            record(3, &[1., 0.]),
            FeatureRecord::new(1, vec![0., 1.], Some(vec![0.5; 4])),
            record(2, &[0.5, 0.5]),
        ];
        let catalog = EmbeddingCatalog::new(records, 2).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.embedding_dim(), 2);
        assert_eq!(catalog.color_dim(), Some(4));
        assert_eq!(catalog.color_count(), 1);
        let ids = catalog.records().iter().map(|r| r.item_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(CatalogFormat::from_path(Path::new("a/catalog.json")), CatalogFormat::Json);
        assert_eq!(CatalogFormat::from_path(Path::new("catalog.JSON")), CatalogFormat::Json);
        assert_eq!(CatalogFormat::from_path(Path::new("catalog.bin")), CatalogFormat::Bincode);
        assert_eq!(CatalogFormat::from_path(Path::new("catalog")), CatalogFormat::Bincode);
    }

    #[test]
    fn test_json_accepts_legacy_field_names() {
        let json = r#"[{"PerfumeId": 7, "Vector": [3.0, 4.0], "Color": null}]"#;
        let records: Vec<FeatureRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records, vec![record(7, &[3., 4.])]);
    }
}
