use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use ndarray::{Array1, Array2};
use ndarray_npy::write_npy;
use tokio::task::block_in_place;

use crate::catalog::EmbeddingCatalog;
use crate::cli::SubCommandExtend;
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    /// 特征库路径，默认为配置目录下的 catalog.json
    #[arg(long, value_name = "PATH")]
    pub catalog: Option<PathBuf>,
    /// 嵌入向量维数
    #[arg(long, value_name = "DIM", default_value_t = 2048)]
    pub embedding_dim: usize,
    /// 嵌入矩阵输出路径，商品 ID 写入同目录下的 `<名称>.ids.npy`
    #[arg(default_value = "embeddings.npy")]
    pub output: PathBuf,
}

impl SubCommandExtend for ExportCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let path = self.catalog.clone().unwrap_or_else(|| opts.conf_dir.catalog());
        block_in_place(|| {
            let catalog = EmbeddingCatalog::load(&path, self.embedding_dim)?;
            let (embeddings, ids) = to_arrays(&catalog)?;

            let ids_path = ids_path(&self.output);
            write_npy(&self.output, &embeddings)?;
            write_npy(&ids_path, &ids)?;
            info!(
                "导出成功: {} ({}x{}), {}",
                self.output.display(),
                embeddings.nrows(),
                embeddings.ncols(),
                ids_path.display()
            );
            Ok(())
        })
    }
}

/// 嵌入矩阵的每一行对应一条记录，顺序与特征库一致
fn to_arrays(catalog: &EmbeddingCatalog) -> Result<(Array2<f32>, Array1<i64>)> {
    let dim = catalog.embedding_dim();
    let data = catalog.records().iter().flat_map(|r| r.embedding.iter().copied()).collect();
    let embeddings = Array2::from_shape_vec((catalog.len(), dim), data)?;
    let ids = catalog.records().iter().map(|r| r.item_id).collect();
    Ok((embeddings, ids))
}

fn ids_path(output: &std::path::Path) -> PathBuf {
    let stem = output.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    output.with_file_name(format!("{stem}.ids.npy"))
}
