use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;
use crate::color::LabHistogram;
use crate::confidence::ConfidenceThresholds;
use crate::crop::AlphaBoxCropper;
use crate::search::ColorFusion;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "scentid", "scentid").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap_or(".")
}

#[derive(Parser, Debug, Clone)]
pub struct ModelOptions {
    /// 前景分割模型路径，默认为配置目录下的 segment.onnx
    #[arg(long, value_name = "PATH")]
    pub segment_model: Option<PathBuf>,
    /// 嵌入模型路径，默认为配置目录下的 embedding.onnx
    #[arg(long, value_name = "PATH")]
    pub embedding_model: Option<PathBuf>,
    /// 分割模型输入边长
    #[arg(long, value_name = "SIZE", default_value_t = 320)]
    pub segment_size: u32,
    /// 嵌入模型输入边长
    #[arg(long, value_name = "SIZE", default_value_t = 224)]
    pub embedding_size: u32,
    /// 嵌入向量维数
    #[arg(long, value_name = "DIM", default_value_t = 2048)]
    pub embedding_dim: usize,
    /// 每个模型的推理线程数，0 表示使用全部 CPU
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub intra_threads: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct CropOptions {
    /// 裁剪后的正方形边长
    #[arg(long, value_name = "SIZE", default_value_t = 224)]
    pub crop_size: u32,
    /// 不透明度超过该值的像素视为前景
    #[arg(long, value_name = "ALPHA", default_value_t = 10)]
    pub alpha_threshold: u8,
    /// 前景包围盒的最小边长，低于该值时使用原图
    #[arg(long, value_name = "PIXELS", default_value_t = 4)]
    pub min_foreground: u32,
}

impl CropOptions {
    pub fn cropper(&self) -> AlphaBoxCropper {
        AlphaBoxCropper::new(self.crop_size)
            .with_alpha_threshold(self.alpha_threshold)
            .with_min_size(self.min_foreground)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ColorOptions {
    /// 禁用颜色特征
    #[arg(long)]
    pub no_color: bool,
    /// Lab 直方图的桶数量，格式为 LxAxB
    #[arg(long, value_name = "LxAxB", value_parser = parse_bins, default_value = "8x8x8")]
    pub color_bins: (usize, usize, usize),
    /// 计算颜色直方图前的缩放边长
    #[arg(long, value_name = "SIZE", default_value_t = 224)]
    pub color_sample_size: u32,
}

impl ColorOptions {
    /// 返回颜色特征提取器，禁用时返回 None
    pub fn histogram(&self, alpha_threshold: u8) -> Option<LabHistogram> {
        if self.no_color {
            return None;
        }
        let (l, a, b) = self.color_bins;
        Some(LabHistogram::new(l, a, b, self.color_sample_size).with_alpha_threshold(alpha_threshold))
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 特征库路径，默认为配置目录下的 catalog.json
    #[arg(long, value_name = "PATH")]
    pub catalog: Option<PathBuf>,
    /// 返回的结果数量
    #[arg(short = 'k', long, value_name = "K", default_value_t = 3)]
    pub top_k: usize,
    /// 颜色重排前按嵌入相似度保留的候选数量
    #[arg(long, value_name = "N", default_value_t = 32)]
    pub candidate_pool: usize,
    /// 颜色分数权重，范围从 0 到 1
    #[arg(long, value_name = "WEIGHT", default_value_t = 0.2, value_parser = parse_weight)]
    pub color_weight: f32,
    /// 高置信度阈值
    #[arg(long, value_name = "SCORE", default_value_t = 0.92)]
    pub high_confidence: f32,
    /// 中置信度阈值
    #[arg(long, value_name = "SCORE", default_value_t = 0.85)]
    pub medium_confidence: f32,
}

impl SearchOptions {
    pub fn fusion(&self) -> ColorFusion {
        ColorFusion { candidate_pool: self.candidate_pool, color_weight: self.color_weight }
    }

    pub fn thresholds(&self) -> ConfidenceThresholds {
        ConfidenceThresholds::new(self.high_confidence, self.medium_confidence)
    }

    pub fn catalog_path(&self, conf_dir: &ConfDir) -> PathBuf {
        self.catalog.clone().unwrap_or_else(|| conf_dir.catalog())
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "scentid", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// scentid 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 识别一张香水瓶照片
    Recognize(RecognizeCommand),
    /// 启动 HTTP 识别服务
    Server(ServerCommand),
    /// 从商品照片目录生成特征库
    Embed(EmbedCommand),
    /// 批量去除图片背景
    Segment(SegmentCommand),
    /// 检查特征库
    Inspect(InspectCommand),
    /// 导出特征库中的嵌入向量
    Export(ExportCommand),
    /// 导入商品元数据
    ImportMeta(ImportMetaCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回特征库文件的路径
    pub fn catalog(&self) -> PathBuf {
        self.path.join("catalog.json")
    }

    /// 返回分割模型的路径
    pub fn segment_model(&self) -> PathBuf {
        self.path.join("segment.onnx")
    }

    /// 返回嵌入模型的路径
    pub fn embedding_model(&self) -> PathBuf {
        self.path.join("embedding.onnx")
    }

    /// 返回元数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("metadata.db")
    }

    /// 返回上传图片的临时目录
    pub fn scratch(&self) -> PathBuf {
        self.path.join("scratch")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

fn parse_bins(s: &str) -> anyhow::Result<(usize, usize, usize)> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 3 {
        return Err(anyhow::anyhow!("无效的桶数量: {}", s));
    }
    let bins = (parts[0].parse()?, parts[1].parse()?, parts[2].parse()?);
    if bins.0 == 0 || bins.1 == 0 || bins.2 == 0 {
        return Err(anyhow::anyhow!("桶数量不能为 0: {}", s));
    }
    Ok(bins)
}

fn parse_weight(s: &str) -> anyhow::Result<f32> {
    let w: f32 = s.parse()?;
    if !(0. ..=1.).contains(&w) {
        return Err(anyhow::anyhow!("权重必须在 0 到 1 之间: {}", s));
    }
    Ok(w)
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// 每行一条结果
    Table,
    /// JSON
    Json,
}
