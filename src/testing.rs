//! 单元测试用的替身实现，不依赖 ONNX 模型

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};

use crate::catalog::{EmbeddingCatalog, FeatureRecord};
use crate::crop::AlphaBoxCropper;
use crate::embed::EmbeddingExtractor;
use crate::error::{RecognitionError, Result};
use crate::pipeline::FeatureExtractor;
use crate::segment::ForegroundSegmenter;

/// 整张图都视为前景
#[derive(Default)]
pub struct OpaqueSegmenter {
    pub calls: Arc<AtomicUsize>,
}

impl ForegroundSegmenter for OpaqueSegmenter {
    fn segment(&self, image: &DynamicImage) -> Result<RgbaImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut rgba = image.to_rgba8();
        rgba.pixels_mut().for_each(|p| p.0[3] = 255);
        Ok(rgba)
    }
}

/// 以平均 RGB 作为三维嵌入
#[derive(Default)]
pub struct MeanColorEmbedder {
    pub fail: bool,
}

impl EmbeddingExtractor for MeanColorEmbedder {
    fn extract(&self, image: &RgbaImage) -> Result<Vec<f32>> {
        if self.fail {
            return Err(RecognitionError::inference("stub failure"));
        }
        let mut sum = [0f32; 3];
        for p in image.pixels() {
            for c in 0..3 {
                sum[c] += p.0[c] as f32;
            }
        }
        let n = (image.width() * image.height()).max(1) as f32;
        Ok(sum.iter().map(|s| s / n / 255.).collect())
    }

    fn dimension(&self) -> usize {
        3
    }
}

pub fn extractor(segmenter: OpaqueSegmenter, embedder: MeanColorEmbedder) -> FeatureExtractor {
    FeatureExtractor::new(segmenter, AlphaBoxCropper::new(32), embedder)
}

/// 红、绿、蓝三个商品
pub fn rgb_catalog() -> Arc<EmbeddingCatalog> {
    let records = vec![
        FeatureRecord::new(1, vec![1., 0., 0.], None),
        FeatureRecord::new(2, vec![0., 1., 0.], None),
        FeatureRecord::new(3, vec![0., 0., 1.], None),
    ];
    Arc::new(EmbeddingCatalog::new(records, 3).unwrap())
}

pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(48, 40, Rgb(color));
    let mut buffer = Cursor::new(vec![]);
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}
