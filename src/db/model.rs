use serde::{Deserialize, Serialize};

/// 商品记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    /// 商品 ID，与特征库中的 itemId 对应
    #[serde(alias = "perfumeId", alias = "PerfumeId", alias = "Id")]
    pub id: i64,
    /// 商品名称
    #[serde(alias = "Name")]
    pub name: String,
    /// 品牌
    #[serde(alias = "Brand")]
    pub brand: String,
    /// 商品图片地址
    #[serde(default, alias = "ImageUrl")]
    pub image_url: Option<String>,
}
