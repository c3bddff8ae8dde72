use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::info;
use rayon::prelude::*;
use tokio::task::block_in_place;

use crate::cli::{SubCommandExtend, scan_images};
use crate::config::{CropOptions, Opts};
use crate::crop::{AlphaBoxCropper, ForegroundNormalizer};
use crate::segment::{ForegroundSegmenter, OnnxSegmenter};
use crate::utils::{imread, pb_style};

#[derive(Parser, Debug, Clone)]
pub struct SegmentCommand {
    #[command(flatten)]
    pub crop_opts: CropOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 输出目录，保持输入的目录结构，统一保存为 PNG
    pub output: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg")]
    pub suffix: String,
    /// 前景分割模型路径，默认为配置目录下的 segment.onnx
    #[arg(long, value_name = "PATH")]
    pub segment_model: Option<PathBuf>,
    /// 分割模型输入边长
    #[arg(long, value_name = "SIZE", default_value_t = 320)]
    pub segment_size: u32,
    /// 推理线程数，0 表示使用全部 CPU
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub intra_threads: usize,
    /// 同时裁剪前景并居中到固定尺寸
    #[arg(long)]
    pub crop: bool,
    /// 覆盖已存在的输出文件
    #[arg(long)]
    pub overwrite: bool,
}

impl SubCommandExtend for SegmentCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let model = self.segment_model.clone().unwrap_or_else(|| opts.conf_dir.segment_model());

        block_in_place(|| {
            let segmenter = OnnxSegmenter::open(&model, self.segment_size, self.intra_threads)?;
            let cropper = self.crop.then(|| self.crop_opts.cropper());
            let paths = scan_images(&self.path, &self.suffix)?;

            let pb = ProgressBar::new(paths.len() as u64).with_style(pb_style());
            let results = paths
                .par_iter()
                .progress_with(pb.clone())
                .map(|input| {
                    let output = output_path(&self.path, &self.output, input);
                    if output.exists() && !self.overwrite {
                        return Ok(false);
                    }
                    remove_background(&segmenter, cropper.as_ref(), input, &output)
                        .inspect_err(|e| pb.println(format!("处理失败 {}: {}", input.display(), e)))?;
                    Ok(true)
                })
                .collect::<Vec<Result<bool>>>();
            pb.finish_with_message("背景去除完成");

            let processed = results.iter().filter(|r| matches!(r, Ok(true))).count();
            let failed = results.iter().filter(|r| r.is_err()).count();
            info!(
                "处理 {} 张，跳过已存在 {} 张，失败 {} 张",
                processed,
                results.len() - processed - failed,
                failed
            );
            Ok(())
        })
    }
}

/// 输出文件路径：保留相对目录，后缀替换为 png
fn output_path(input_root: &Path, output_root: &Path, input: &Path) -> PathBuf {
    let relative = input.strip_prefix(input_root).unwrap_or(input);
    let relative = match relative.file_name() {
        Some(_) => relative,
        None => input,
    };
    output_root.join(relative).with_extension("png")
}

fn remove_background(
    segmenter: &OnnxSegmenter,
    cropper: Option<&AlphaBoxCropper>,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let image = imread(input)?;
    let mut rgba = segmenter.segment(&image)?;
    if let Some(cropper) = cropper {
        rgba = cropper.crop(rgba).into_image();
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rgba.save_with_format(output, image::ImageFormat::Png)?;
    Ok(())
}
