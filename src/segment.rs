use std::path::Path;
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbaImage};
use log::debug;
use ort::session::Session;
use ort::value::TensorRef;

use crate::error::{RecognitionError, Result};
use crate::utils::{check_finite, create_session, lock_session, nchw_tensor};

/// 前景分割：输出与输入尺寸相同的 RGBA 图片，alpha 通道为前景概率
pub trait ForegroundSegmenter: Send + Sync {
    fn segment(&self, image: &DynamicImage) -> Result<RgbaImage>;
}

/// 基于 U²-Net 类二值分割模型的前景分割器
///
/// ONNX Runtime 的会话需要独占访问，这里用 Mutex 串行化所有推理调用。
pub struct OnnxSegmenter {
    session: Mutex<Session>,
    input_size: u32,
}

impl OnnxSegmenter {
    /// 加载分割模型
    ///
    /// # Arguments
    ///
    /// * `path` - ONNX 模型路径
    /// * `input_size` - 模型输入的边长，U²-Net 为 320
    /// * `intra_threads` - 推理线程数，0 表示使用全部 CPU
    pub fn open<P: AsRef<Path>>(path: P, input_size: u32, intra_threads: usize) -> Result<Self> {
        let session = create_session(path, intra_threads)?;
        Ok(Self { session: Mutex::new(session), input_size })
    }

    /// 运行模型，返回 input_size x input_size 的概率图
    fn predict(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let size = self.input_size;
        let resized = image.resize_exact(size, size, FilterType::CatmullRom).to_rgb8();
        let input = nchw_tensor(&resized);

        let mut session = lock_session(&self.session);
        let outputs = session
            .run(ort::inputs![TensorRef::from_array_view(input.view()).map_err(RecognitionError::inference)?])
            .map_err(RecognitionError::inference)?;
        // U²-Net 的第一个输出为融合后的 d0
        let (_, data) = outputs[0].try_extract_tensor::<f32>().map_err(RecognitionError::inference)?;

        let expected = (size * size) as usize;
        if data.len() < expected {
            return Err(RecognitionError::Inference(format!(
                "分割模型输出长度为 {}，期望至少 {}",
                data.len(),
                expected
            )));
        }
        let data = &data[..expected];
        check_finite("分割模型", data)?;
        Ok(data.to_vec())
    }
}

impl ForegroundSegmenter for OnnxSegmenter {
    fn segment(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let mask = self.predict(image)?;
        debug!("分割完成: {}x{}", image.width(), image.height());
        Ok(apply_mask(image, &mask, self.input_size))
    }
}

/// 将 `mask_size` x `mask_size` 的概率图缩放回原图尺寸并写入 alpha 通道
///
/// 概率值先截断到 [0, 1] 再量化到 [0, 255]，缩放使用双线性插值以避免块状边缘。
pub fn apply_mask(image: &DynamicImage, mask: &[f32], mask_size: u32) -> RgbaImage {
    let alpha = GrayImage::from_fn(mask_size, mask_size, |x, y| {
        let p = mask[(y * mask_size + x) as usize].clamp(0., 1.);
        Luma([(p * 255.) as u8])
    });
    let alpha = imageops::resize(&alpha, image.width(), image.height(), FilterType::Triangle);

    let mut rgba = image.to_rgba8();
    for (pixel, a) in rgba.pixels_mut().zip(alpha.pixels()) {
        pixel.0[3] = a.0[0];
    }
    rgba
}
