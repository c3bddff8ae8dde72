use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use image::{DynamicImage, GenericImageView, Pixel};
use indicatif::ProgressStyle;
use log::{debug, warn};
use ndarray::Array4;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use tempfile::TempPath;

use crate::error::{CleanupWarning, RecognitionError, Result};

/// 创建 ONNX Runtime 会话
///
/// # Arguments
///
/// * `path` - 模型文件路径
/// * `intra_threads` - 单个算子使用的线程数，0 表示使用全部 CPU
pub fn create_session<P: AsRef<Path>>(path: P, intra_threads: usize) -> Result<Session> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RecognitionError::Inference(format!("模型文件不存在: {}", path.display())));
    }

    let intra_threads = if intra_threads == 0 { num_cpus::get() } else { intra_threads };
    let session = Session::builder()
        .map_err(RecognitionError::inference)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(RecognitionError::inference)?
        .with_intra_threads(intra_threads)
        .map_err(RecognitionError::inference)?
        .commit_from_file(path)
        .map_err(RecognitionError::inference)?;

    debug!("加载模型 {}，intra_threads = {}", path.display(), intra_threads);
    Ok(session)
}

/// 获取模型会话
///
/// 持锁线程 panic 不会破坏 ONNX 会话本身，因此直接忽略锁中毒。
pub fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 模型输出中出现 NaN 或无穷大时视为推理失败
pub fn check_finite(stage: &str, data: &[f32]) -> Result<()> {
    match data.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(RecognitionError::Inference(format!("{stage}输出第 {i} 项为 {}", data[i]))),
        None => Ok(()),
    }
}

/// 将图片转换为 [1, 3, H, W] 的张量，RGB 通道缩放到 [0, 1]，忽略 alpha
pub fn nchw_tensor<I>(image: &I) -> Array4<f32>
where
    I: GenericImageView,
    I::Pixel: Pixel<Subpixel = u8>,
{
    let (width, height) = image.dimensions();
    let mut tensor = Array4::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in image.pixels() {
        let [r, g, b] = pixel.to_rgb().0;
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = r as f32 / 255.;
        tensor[[0, 1, y, x]] = g as f32 / 255.;
        tensor[[0, 2, y, x]] = b as f32 / 255.;
    }
    tensor
}

/// 解码内存中的图片，空数据或无法识别的格式均为输入错误
pub fn imdecode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(RecognitionError::input("图片数据为空"));
    }
    image::load_from_memory(bytes).map_err(|e| RecognitionError::input(format!("无法解码图片: {e}")))
}

/// 读取并解码图片文件
pub fn imread<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| RecognitionError::input(format!("无法读取图片 {}: {e}", path.display())))?;
    imdecode(&bytes)
}

/// 请求级临时文件，在任何退出路径上都会被删除
///
/// 删除失败只记录 [`CleanupWarning`]，不会覆盖请求本身的结果。
#[derive(Debug)]
pub struct ScratchFile {
    path: Option<TempPath>,
}

impl ScratchFile {
    /// 在 `dir` 中创建临时文件并写入 `data`
    pub fn create(dir: &Path, data: &[u8]) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new().prefix("upload-").tempfile_in(dir)?;
        // NOTE: 写入失败时 NamedTempFile 被丢弃，文件同样会被删除
        file.write_all(data)?;
        file.flush()?;
        Ok(Self { path: Some(file.into_temp_path()) })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().expect("scratch file already closed")
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let display = path.to_path_buf();
        match path.close() {
            Ok(()) => debug!("删除临时文件: {}", display.display()),
            Err(source) => warn!("{}", CleanupWarning { path: display, source }),
        }
    }
}

/// 列出目录下的所有文件名，主要用于检查临时文件是否泄漏
pub fn list_dir<P: AsRef<Path>>(dir: P) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} [{eta_precise}] {msg}",
    )
    .expect("invalid progress bar template")
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    #[test]
    fn test_nchw_tensor_layout() {
        let mut image = RgbaImage::new(3, 2);
        image.put_pixel(2, 1, Rgba([255, 0, 51, 0]));
        let tensor = nchw_tensor(&image);
        assert_eq!(tensor.shape(), &[1, 3, 2, 3]);
        assert_eq!(tensor[[0, 0, 1, 2]], 1.);
        assert_eq!(tensor[[0, 1, 1, 2]], 0.);
        assert!((tensor[[0, 2, 1, 2]] - 0.2).abs() < 1e-6);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.);
    }

    #[test]
    fn test_lock_session_recovers_from_poison() {
        let session = Mutex::new(1);
        let _ = std::panic::catch_unwind(|| {
            let _guard = session.lock().unwrap();
            panic!("inference crashed");
        });
        assert!(session.is_poisoned());
        *lock_session(&session) += 1;
        assert_eq!(*lock_session(&session), 2);
    }

    #[test]
    fn test_check_finite() {
        assert!(check_finite("嵌入模型", &[0., -1.5, 3.]).is_ok());
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let result = check_finite("嵌入模型", &[0.5, bad]);
            assert!(matches!(result, Err(RecognitionError::Inference(_))));
        }
    }

    #[test]
    fn test_create_session_rejects_corrupt_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.onnx");
        std::fs::write(&path, b"this is not an onnx graph").unwrap();
        assert!(matches!(create_session(&path, 1), Err(RecognitionError::Inference(_))));
    }

    #[test]
    fn test_imdecode_rejects_empty() {
        assert!(matches!(imdecode(&[]), Err(RecognitionError::Input(_))));
    }

    #[test]
    fn test_imdecode_rejects_garbage() {
        assert!(matches!(imdecode(b"definitely not an image"), Err(RecognitionError::Input(_))));
    }

    #[test]
    fn test_imread_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = imread(dir.path().join("missing.png"));
        assert!(matches!(result, Err(RecognitionError::Input(_))));
    }

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchFile::create(dir.path(), b"hello").unwrap();
            assert_eq!(std::fs::read(scratch.path()).unwrap(), b"hello");
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
        assert!(list_dir(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_scratch_file_removed_on_panic() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().to_path_buf();
        let result = std::panic::catch_unwind(move || {
            let _scratch = ScratchFile::create(&work_dir, b"data").unwrap();
            panic!("stage failed");
        });
        assert!(result.is_err());
        assert!(list_dir(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_scratch_file_already_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create(dir.path(), b"data").unwrap();
        std::fs::remove_file(scratch.path()).unwrap();
        // 只会记录警告，不会 panic
        drop(scratch);
    }
}
