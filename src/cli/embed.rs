use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{info, warn};
use rayon::prelude::*;
use regex::Regex;
use tokio::task::block_in_place;

use crate::catalog::{EmbeddingCatalog, FeatureRecord, write_records};
use crate::cli::{SubCommandExtend, scan_images};
use crate::config::{ColorOptions, CropOptions, ModelOptions, Opts};
use crate::normalize::l2_normalize_in_place;
use crate::pipeline::FeatureExtractor;
use crate::utils::{imdecode, pb_style};

#[derive(Parser, Debug, Clone)]
pub struct EmbedCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    #[command(flatten)]
    pub crop: CropOptions,
    #[command(flatten)]
    pub color: ColorOptions,
    /// 商品照片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,webp")]
    pub suffix: String,
    /// 从文件名（不含后缀）中提取商品 ID 的正则表达式，使用第一个分组
    /// 例：`^(\d+)` 会将 `1234_front.jpg` 识别为商品 1234
    #[arg(long, value_name = "REGEX", default_value = r"^(\d+)", verbatim_doc_comment)]
    pub id_pattern: String,
    /// 特征库输出路径，`.json` 后缀输出 JSON，其余为 bincode，默认为配置目录下的 catalog.json
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// 待处理的照片
struct Photo {
    path: PathBuf,
    item_id: i64,
}

impl SubCommandExtend for EmbedCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let re_id = Regex::new(&self.id_pattern)?;
        let output = self.output.clone().unwrap_or_else(|| opts.conf_dir.catalog());

        let (records, skipped) = block_in_place(|| -> Result<_> {
            let paths = scan_images(&self.path, &self.suffix)?;
            let photos = collect_photos(paths, &re_id);
            let photos = dedup_photos(photos);

            let extractor =
                FeatureExtractor::from_options(&opts.conf_dir, &self.model, &self.crop, &self.color)?;

            let pb = ProgressBar::new(photos.len() as u64).with_style(pb_style());
            let results = photos
                .par_iter()
                .progress_with(pb.clone())
                .map(|photo| {
                    let record = extract_record(&extractor, photo);
                    if let Err(e) = &record {
                        pb.println(format!("跳过 {}: {}", photo.path.display(), e));
                    }
                    record.ok()
                })
                .collect::<Vec<_>>();
            pb.finish_with_message("特征提取完成");

            let skipped = results.iter().filter(|r| r.is_none()).count();
            Ok((results.into_iter().flatten().collect::<Vec<_>>(), skipped))
        })?;

        if records.is_empty() {
            return Err(anyhow!("没有可用的商品照片"));
        }

        // 写入前校验，保证生成的特征库一定能被加载
        let records = EmbeddingCatalog::new(records, self.model.embedding_dim)?.into_records();
        write_records(&output, &records)?;

        info!("特征库已写入 {}: 生成 {} 条，跳过 {} 张", output.display(), records.len(), skipped);
        Ok(())
    }
}

/// 从文件名中提取商品 ID，无法提取的照片会被忽略
fn collect_photos(paths: Vec<PathBuf>, re_id: &Regex) -> Vec<Photo> {
    paths
        .into_iter()
        .filter_map(|path| match parse_item_id(&path, re_id) {
            Some(item_id) => Some(Photo { path, item_id }),
            None => {
                warn!("无法从文件名中提取商品 ID: {}", path.display());
                None
            }
        })
        .collect()
}

fn parse_item_id(path: &Path, re_id: &Regex) -> Option<i64> {
    let stem = path.file_stem()?.to_string_lossy();
    let caps = re_id.captures(&stem)?;
    caps.get(1)?.as_str().parse().ok()
}

/// 使用 blake3 去除内容完全相同的照片，保留第一次出现的
fn dedup_photos(photos: Vec<Photo>) -> Vec<Photo> {
    let hashes = photos
        .par_iter()
        .map(|photo| std::fs::read(&photo.path).map(|data| blake3::hash(&data)).ok())
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    let total = photos.len();
    let photos = photos
        .into_iter()
        .zip(hashes)
        .filter(|(_, hash)| match hash {
            Some(hash) => seen.insert(*hash),
            // 读取失败的文件留到提取阶段报告
            None => true,
        })
        .map(|(photo, _)| photo)
        .collect::<Vec<_>>();

    if photos.len() < total {
        info!("去除 {} 张重复照片", total - photos.len());
    }
    photos
}

fn extract_record(extractor: &FeatureExtractor, photo: &Photo) -> Result<FeatureRecord> {
    let data = std::fs::read(&photo.path)?;
    let image = imdecode(&data)?;
    let features = extractor.extract(&image, true)?;

    let mut embedding = features.embedding;
    l2_normalize_in_place(&mut embedding);
    Ok(FeatureRecord::new(photo.item_id, embedding, features.color))
}
