use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tokio::task::block_in_place;

use crate::catalog::EmbeddingCatalog;
use crate::cli::SubCommandExtend;
use crate::config::{Opts, OutputFormat};

#[derive(Parser, Debug, Clone)]
pub struct InspectCommand {
    /// 特征库路径，默认为配置目录下的 catalog.json
    #[arg(long, value_name = "PATH")]
    pub catalog: Option<std::path::PathBuf>,
    /// 嵌入向量维数
    #[arg(long, value_name = "DIM", default_value_t = 2048)]
    pub embedding_dim: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

/// 特征库概况
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogSummary {
    records: usize,
    items: usize,
    embedding_dim: usize,
    color_dim: Option<usize>,
    color_records: usize,
}

impl SubCommandExtend for InspectCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let path = self.catalog.clone().unwrap_or_else(|| opts.conf_dir.catalog());
        let catalog = block_in_place(|| EmbeddingCatalog::load(&path, self.embedding_dim))?;
        let summary = summarize(&catalog);

        match self.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            OutputFormat::Table => {
                println!("记录数量: {}", summary.records);
                println!("商品数量: {}", summary.items);
                println!("嵌入维数: {}", summary.embedding_dim);
                match summary.color_dim {
                    Some(dim) => println!("颜色维数: {} ({} 条记录)", dim, summary.color_records),
                    None => println!("颜色维数: 无"),
                }
            }
        }
        Ok(())
    }
}

fn summarize(catalog: &EmbeddingCatalog) -> CatalogSummary {
    let mut ids = catalog.records().iter().map(|r| r.item_id).collect::<Vec<_>>();
    ids.sort_unstable();
    ids.dedup();

    CatalogSummary {
        records: catalog.len(),
        items: ids.len(),
        embedding_dim: catalog.embedding_dim(),
        color_dim: catalog.color_dim(),
        color_records: catalog.color_count(),
    }
}
