use image::RgbaImage;
use image::imageops::{self, FilterType};
use log::debug;

/// 前景裁剪结果
#[derive(Debug, Clone)]
pub enum Cropped {
    /// 已裁剪并居中到固定大小的正方形画布
    Letterboxed(RgbaImage),
    /// 前景不可用，原图原样返回
    Passthrough(RgbaImage),
}

impl Cropped {
    pub fn image(&self) -> &RgbaImage {
        match self {
            Self::Letterboxed(image) | Self::Passthrough(image) => image,
        }
    }

    pub fn into_image(self) -> RgbaImage {
        match self {
            Self::Letterboxed(image) | Self::Passthrough(image) => image,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough(_))
    }
}

/// 前景归一化：根据 alpha 通道把前景裁剪到固定尺寸
pub trait ForegroundNormalizer: Send + Sync {
    fn crop(&self, image: RgbaImage) -> Cropped;
}

/// 前景包围盒，坐标均包含边界
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 返回 alpha 超过阈值的所有像素的包围盒，没有前景时返回 None
pub fn alpha_bounding_box(image: &RgbaImage, threshold: u8) -> Option<BoundingBox> {
    let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
    let (mut max_x, mut max_y) = (0, 0);
    let mut found = false;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[3] > threshold {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| BoundingBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// 按 alpha 包围盒裁剪并等比缩放，居中放在 `target_size` x `target_size` 的透明画布上
#[derive(Debug, Clone)]
pub struct AlphaBoxCropper {
    target_size: u32,
    alpha_threshold: u8,
    min_size: u32,
}

impl Default for AlphaBoxCropper {
    fn default() -> Self {
        Self::new(224)
    }
}

impl AlphaBoxCropper {
    pub fn new(target_size: u32) -> Self {
        Self { target_size, alpha_threshold: 10, min_size: 4 }
    }

    pub fn with_alpha_threshold(mut self, alpha_threshold: u8) -> Self {
        self.alpha_threshold = alpha_threshold;
        self
    }

    /// 前景宽或高小于该值时视为分割噪声
    pub fn with_min_size(mut self, min_size: u32) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    fn letterbox(&self, image: &RgbaImage, bbox: BoundingBox) -> RgbaImage {
        let size = self.target_size;
        let crop = imageops::crop_imm(image, bbox.x, bbox.y, bbox.width, bbox.height).to_image();

        let scale =
            (size as f32 / bbox.width as f32).min(size as f32 / bbox.height as f32);
        let rw = ((bbox.width as f32 * scale) as u32).clamp(1, size);
        let rh = ((bbox.height as f32 * scale) as u32).clamp(1, size);
        let resized = imageops::resize(&crop, rw, rh, FilterType::CatmullRom);

        let mut canvas = RgbaImage::new(size, size);
        let ox = (size - rw) / 2;
        let oy = (size - rh) / 2;
        imageops::overlay(&mut canvas, &resized, ox as i64, oy as i64);
        canvas
    }
}

impl ForegroundNormalizer for AlphaBoxCropper {
    fn crop(&self, image: RgbaImage) -> Cropped {
        let Some(bbox) = alpha_bounding_box(&image, self.alpha_threshold) else {
            debug!("没有找到前景，使用原图");
            return Cropped::Passthrough(image);
        };

        if bbox.width < self.min_size || bbox.height < self.min_size {
            debug!("前景过小 ({}x{})，使用原图", bbox.width, bbox.height);
            return Cropped::Passthrough(image);
        }

        debug!("前景包围盒: {:?}", bbox);
        Cropped::Letterboxed(self.letterbox(&image, bbox))
    }
}
