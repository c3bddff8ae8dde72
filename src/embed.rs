use std::path::Path;
use std::sync::Mutex;

use image::RgbaImage;
use image::imageops::{self, FilterType};
use ort::session::Session;
use ort::value::TensorRef;

use crate::error::{RecognitionError, Result};
use crate::utils::{check_finite, create_session, lock_session, nchw_tensor};

/// 嵌入特征提取器
pub trait EmbeddingExtractor: Send + Sync {
    /// 提取嵌入向量，不做归一化
    fn extract(&self, image: &RgbaImage) -> Result<Vec<f32>>;

    /// 嵌入向量维数
    fn dimension(&self) -> usize;
}

/// 度量学习模型（如 ResNet101 + GeM）的薄封装
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    input_size: u32,
    dimension: usize,
}

impl OnnxEmbedder {
    /// 加载嵌入模型
    ///
    /// # Arguments
    ///
    /// * `path` - ONNX 模型路径
    /// * `input_size` - 模型输入边长
    /// * `dimension` - 模型输出维数，输出长度不一致时推理失败
    /// * `intra_threads` - 推理线程数，0 表示使用全部 CPU
    pub fn open<P: AsRef<Path>>(
        path: P,
        input_size: u32,
        dimension: usize,
        intra_threads: usize,
    ) -> Result<Self> {
        let session = create_session(path, intra_threads)?;
        Ok(Self { session: Mutex::new(session), input_size, dimension })
    }
}

impl EmbeddingExtractor for OnnxEmbedder {
    fn extract(&self, image: &RgbaImage) -> Result<Vec<f32>> {
        let size = self.input_size;
        let input = if image.dimensions() == (size, size) {
            nchw_tensor(image)
        } else {
            nchw_tensor(&imageops::resize(image, size, size, FilterType::CatmullRom))
        };

        let mut session = lock_session(&self.session);
        let outputs = session
            .run(ort::inputs![TensorRef::from_array_view(input.view()).map_err(RecognitionError::inference)?])
            .map_err(RecognitionError::inference)?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>().map_err(RecognitionError::inference)?;

        if data.len() != self.dimension {
            return Err(RecognitionError::Inference(format!(
                "嵌入模型输出 {} 维，期望 {} 维",
                data.len(),
                self.dimension
            )));
        }
        check_finite("嵌入模型", data)?;
        Ok(data.to_vec())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxEmbedder::open(dir.path().join("embedding.onnx"), 224, 2048, 1);
        assert!(matches!(result, Err(RecognitionError::Inference(_))));
    }

    #[test]
    fn test_open_corrupt_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embedding.onnx");
        std::fs::write(&path, [0xde, 0xad, 0xbe, 0xef].repeat(64)).unwrap();
        let result = OnnxEmbedder::open(&path, 224, 2048, 1);
        assert!(matches!(result, Err(RecognitionError::Inference(_))));
    }
}
