mod embed;
mod export;
mod import_meta;
mod inspect;
mod recognize;
mod segment;
pub mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use embed::*;
pub use export::*;
pub use import_meta::*;
pub use inspect::*;
pub use recognize::*;
pub use segment::*;
pub use server::*;

use anyhow::Result;
use log::info;
use regex::Regex;
use tokio::task::block_in_place;
use walkdir::WalkDir;

use crate::catalog::EmbeddingCatalog;
use crate::config::{ColorOptions, CropOptions, ModelOptions, Opts, SearchOptions};
use crate::pipeline::{FeatureExtractor, Recognizer, RecognizerBuilder};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 加载特征库与模型，构建识别流程
fn open_recognizer(
    opts: &Opts,
    model: &ModelOptions,
    crop: &CropOptions,
    color: &ColorOptions,
    search: &SearchOptions,
) -> Result<Recognizer> {
    block_in_place(|| {
        let catalog = EmbeddingCatalog::load(search.catalog_path(&opts.conf_dir), model.embedding_dim)?;
        let extractor = FeatureExtractor::from_options(&opts.conf_dir, model, crop, color)?;
        let recognizer = RecognizerBuilder::new(extractor, Arc::new(catalog))
            .fusion(search.fusion())
            .work_dir(opts.conf_dir.scratch())
            .build()?;
        Ok(recognizer)
    })
}

/// 扫描目录下指定后缀的图片，按路径排序
///
/// # Arguments
///
/// * `dir` - 图片目录
/// * `suffix` - 文件后缀名，多个后缀用逗号分隔，不区分大小写
fn scan_images(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let re_suf = Regex::new(&format!("^(?i)({})$", suffix.replace(',', "|")))?;

    let mut paths = vec![];
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matched = entry.path().extension().is_some_and(|s| re_suf.is_match(&s.to_string_lossy()));
        if matched {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    info!("在 {} 中找到 {} 张图片", dir.display(), paths.len());
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_images_filters_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["b.jpg", "a.PNG", "sub/c.webp", "notes.txt", "jpg"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let paths = scan_images(dir.path(), "jpg,png,webp").unwrap();
        let names = paths
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.PNG", "b.jpg", "sub/c.webp"]);
    }
}
