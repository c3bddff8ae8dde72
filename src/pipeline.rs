use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use log::{debug, info, warn};

use crate::catalog::EmbeddingCatalog;
use crate::color::ColorDescriptorExtractor;
use crate::config::{ColorOptions, ConfDir, CropOptions, ModelOptions};
use crate::crop::ForegroundNormalizer;
use crate::embed::{EmbeddingExtractor, OnnxEmbedder};
use crate::error::{CatalogError, RecognitionError, Result};
use crate::metrics::{self, SearchPath};
use crate::normalize::l2_normalize_in_place;
use crate::search::{ColorFusion, RecognitionResult, find_top_k, rank_with_fusion};
use crate::segment::{ForegroundSegmenter, OnnxSegmenter};
use crate::utils::{self, ScratchFile};

/// 单张图片提取出的特征
#[derive(Debug, Clone)]
pub struct Features {
    /// 未归一化的嵌入向量
    pub embedding: Vec<f32>,
    /// 颜色特征，未启用颜色时为 None
    pub color: Option<Vec<f32>>,
    /// 前景裁剪是否退化为原图
    pub passthrough: bool,
}

/// 分割 → 裁剪 → 嵌入 / 颜色，识别和离线建库共用
pub struct FeatureExtractor {
    segmenter: Box<dyn ForegroundSegmenter>,
    cropper: Box<dyn ForegroundNormalizer>,
    embedder: Box<dyn EmbeddingExtractor>,
    color: Option<Box<dyn ColorDescriptorExtractor>>,
}

impl FeatureExtractor {
    pub fn new(
        segmenter: impl ForegroundSegmenter + 'static,
        cropper: impl ForegroundNormalizer + 'static,
        embedder: impl EmbeddingExtractor + 'static,
    ) -> Self {
        Self {
            segmenter: Box::new(segmenter),
            cropper: Box::new(cropper),
            embedder: Box::new(embedder),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl ColorDescriptorExtractor + 'static) -> Self {
        self.color = Some(Box::new(color));
        self
    }

    /// 按命令行参数加载 ONNX 模型
    pub fn from_options(
        conf_dir: &ConfDir,
        model: &ModelOptions,
        crop: &CropOptions,
        color: &ColorOptions,
    ) -> Result<Self> {
        let segment_model = model.segment_model.clone().unwrap_or_else(|| conf_dir.segment_model());
        let embedding_model =
            model.embedding_model.clone().unwrap_or_else(|| conf_dir.embedding_model());

        info!("加载分割模型: {}", segment_model.display());
        let segmenter = OnnxSegmenter::open(&segment_model, model.segment_size, model.intra_threads)?;
        info!("加载嵌入模型: {}", embedding_model.display());
        let embedder = OnnxEmbedder::open(
            &embedding_model,
            model.embedding_size,
            model.embedding_dim,
            model.intra_threads,
        )?;

        let extractor = Self::new(segmenter, crop.cropper(), embedder);
        Ok(match color.histogram(crop.alpha_threshold) {
            Some(histogram) => extractor.with_color(histogram),
            None => extractor,
        })
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn color_dim(&self) -> Option<usize> {
        self.color.as_ref().map(|c| c.dimension())
    }

    /// 提取特征
    ///
    /// # Arguments
    ///
    /// * `image` - 任意尺寸的图片
    /// * `with_color` - 是否计算颜色特征，未配置颜色提取器时忽略
    pub fn extract(&self, image: &DynamicImage, with_color: bool) -> Result<Features> {
        let segmented = self.segmenter.segment(image)?;
        let cropped = self.cropper.crop(segmented);
        let passthrough = cropped.is_passthrough();
        if passthrough {
            metrics::inc_passthrough_count();
        }

        let embedding = self.embedder.extract(cropped.image())?;
        let color = match &self.color {
            Some(color) if with_color => Some(color.extract(cropped.image())),
            _ => None,
        };

        Ok(Features { embedding, color, passthrough })
    }
}

/// 识别流程，构建后只读，可在多个请求间共享
pub struct Recognizer {
    extractor: FeatureExtractor,
    catalog: Arc<EmbeddingCatalog>,
    fusion: ColorFusion,
    work_dir: PathBuf,
    use_color: bool,
}

/// 构建 [`Recognizer`]，在构建时检查模型与特征库的维数
pub struct RecognizerBuilder {
    extractor: FeatureExtractor,
    catalog: Arc<EmbeddingCatalog>,
    fusion: ColorFusion,
    work_dir: PathBuf,
}

impl RecognizerBuilder {
    pub fn new(extractor: FeatureExtractor, catalog: Arc<EmbeddingCatalog>) -> Self {
        Self {
            extractor,
            catalog,
            fusion: ColorFusion::default(),
            work_dir: std::env::temp_dir(),
        }
    }

    pub fn fusion(mut self, fusion: ColorFusion) -> Self {
        self.fusion = fusion;
        self
    }

    /// 上传图片的临时目录
    pub fn work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn build(self) -> Result<Recognizer> {
        let expected = self.catalog.embedding_dim();
        let actual = self.extractor.embedding_dim();
        if expected != actual {
            return Err(CatalogError::ModelDimension { stage: "嵌入模型", expected, actual }.into());
        }

        let use_color = match (self.extractor.color_dim(), self.catalog.color_dim()) {
            (Some(actual), Some(expected)) => {
                if actual != expected {
                    return Err(
                        CatalogError::ModelDimension { stage: "颜色特征", expected, actual }.into()
                    );
                }
                true
            }
            (Some(_), None) => {
                warn!("特征库中没有颜色特征，仅使用嵌入相似度");
                false
            }
            _ => false,
        };

        std::fs::create_dir_all(&self.work_dir)?;
        info!(
            "识别流程就绪: 颜色重排 = {}, 临时目录 = {}",
            use_color,
            self.work_dir.display()
        );

        Ok(Recognizer {
            extractor: self.extractor,
            catalog: self.catalog,
            fusion: self.fusion,
            work_dir: self.work_dir,
            use_color,
        })
    }
}

impl Recognizer {
    pub fn catalog(&self) -> &EmbeddingCatalog {
        &self.catalog
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// 是否启用颜色重排
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// 识别图片文件，返回按分数降序排列的结果
    pub fn recognize<P: AsRef<Path>>(&self, path: P, top_k: usize) -> Result<Vec<RecognitionResult>> {
        check_top_k(top_k)?;
        let image = utils::imread(path)?;
        self.recognize_image(&image, top_k)
    }

    /// 识别已解码的图片
    pub fn recognize_image(&self, image: &DynamicImage, top_k: usize) -> Result<Vec<RecognitionResult>> {
        check_top_k(top_k)?;
        let start = Instant::now();

        let features = self.extractor.extract(image, self.use_color)?;
        let mut embedding = features.embedding;
        l2_normalize_in_place(&mut embedding);

        let (path, results) = match &features.color {
            Some(color) => {
                (SearchPath::Color, rank_with_fusion(&embedding, color, &self.catalog, top_k, self.fusion))
            }
            None => (SearchPath::Embedding, find_top_k(&embedding, &self.catalog, top_k)),
        };

        let size = (image.width(), image.height());
        metrics::inc_recognition_count(path, size);
        metrics::inc_recognition_duration(path, size, start.elapsed().as_secs_f32());
        if let Some(top) = results.first() {
            metrics::inc_recognition_top_score(path, top.score);
        }
        debug!("识别完成: {:?}，耗时 {:?}", results, start.elapsed());

        Ok(results)
    }

    /// 识别上传的图片数据
    ///
    /// 数据先写入工作目录中的临时文件，识别结束后无论成功、失败还是 panic 都会删除。
    pub fn recognize_bytes(&self, bytes: &[u8], top_k: usize) -> Result<Vec<RecognitionResult>> {
        if bytes.is_empty() {
            return Err(RecognitionError::input("图片数据为空"));
        }
        check_top_k(top_k)?;

        let scratch = ScratchFile::create(&self.work_dir, bytes)?;
        self.recognize(scratch.path(), top_k)
    }
}

fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(RecognitionError::input("top_k 必须大于 0"));
    }
    Ok(())
}
