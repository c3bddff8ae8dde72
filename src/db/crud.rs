use sqlx::{Executor, QueryBuilder, Result, Sqlite, SqlitePool};

use super::ItemRecord;

/// 添加或更新商品记录
pub async fn upsert_item<'c, E>(executor: E, item: &ItemRecord) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO item (id, name, brand, image_url)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            brand = excluded.brand,
            image_url = excluded.image_url
        "#,
    )
    .bind(item.id)
    .bind(&item.name)
    .bind(&item.brand)
    .bind(&item.image_url)
    .execute(executor)
    .await?;

    Ok(())
}

/// 批量添加或更新商品记录
pub async fn upsert_items(executor: &SqlitePool, items: &[ItemRecord]) -> Result<()> {
    let mut tx = executor.begin().await?;
    for item in items {
        upsert_item(&mut *tx, item).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// 根据 ID 列表获取商品记录，不存在的 ID 会被忽略，返回顺序不确定
pub async fn get_items(executor: &SqlitePool, ids: &[i64]) -> Result<Vec<ItemRecord>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let mut builder =
        QueryBuilder::<Sqlite>::new("SELECT id, name, brand, image_url FROM item WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    builder.build_query_as::<ItemRecord>().fetch_all(executor).await
}

/// 查询商品数量
pub async fn count_items(executor: &SqlitePool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM item").fetch_one(executor).await
}
