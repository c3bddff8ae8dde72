use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::normalize::l2_normalize_in_place;

/// 颜色特征提取器
pub trait ColorDescriptorExtractor: Send + Sync {
    /// 提取颜色特征向量，长度固定为 `dimension()`
    fn extract(&self, image: &RgbaImage) -> Vec<f32>;

    /// 特征向量维数
    fn dimension(&self) -> usize;
}

/// CIE D65 白点
const WHITE_D65: [f64; 3] = [0.95047, 1.00000, 1.08883];

/// 线性 sRGB 到 XYZ 的转换矩阵（D65）
const RGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

/// Lab 颜色直方图
///
/// 与嵌入模型无关的感知颜色特征，用于区分外形相同但颜色不同的瓶子。
/// 只统计不透明度超过阈值的像素，结果为相对直方图再做 L2 归一化。
#[derive(Debug, Clone)]
pub struct LabHistogram {
    bins_l: usize,
    bins_a: usize,
    bins_b: usize,
    sample_size: u32,
    alpha_threshold: u8,
}

impl Default for LabHistogram {
    fn default() -> Self {
        Self::new(8, 8, 8, 224)
    }
}

impl LabHistogram {
    pub fn new(bins_l: usize, bins_a: usize, bins_b: usize, sample_size: u32) -> Self {
        Self { bins_l, bins_a, bins_b, sample_size, alpha_threshold: 10 }
    }

    pub fn with_alpha_threshold(mut self, alpha_threshold: u8) -> Self {
        self.alpha_threshold = alpha_threshold;
        self
    }

    #[inline(always)]
    fn index(&self, l: usize, a: usize, b: usize) -> usize {
        l * self.bins_a * self.bins_b + a * self.bins_b + b
    }

    fn histogram(&self, image: &RgbaImage) -> Vec<f32> {
        let mut hist = vec![0f32; self.dimension()];
        let mut count = 0u64;

        for pixel in image.pixels() {
            let [r, g, b, a] = pixel.0;
            if a <= self.alpha_threshold {
                continue;
            }
            let (l, a, b) = srgb_to_lab(r, g, b);
            let l_bin = to_bin(l / 100., self.bins_l);
            let a_bin = to_bin((a + 128.) / 255., self.bins_a);
            let b_bin = to_bin((b + 128.) / 255., self.bins_b);
            hist[self.index(l_bin, a_bin, b_bin)] += 1.;
            count += 1;
        }

        if count == 0 {
            return hist;
        }

        for v in hist.iter_mut() {
            *v /= count as f32;
        }
        l2_normalize_in_place(&mut hist);
        hist
    }
}

impl ColorDescriptorExtractor for LabHistogram {
    fn extract(&self, image: &RgbaImage) -> Vec<f32> {
        if image.width() == self.sample_size && image.height() == self.sample_size {
            return self.histogram(image);
        }
        let resized =
            imageops::resize(image, self.sample_size, self.sample_size, FilterType::Triangle);
        self.histogram(&resized)
    }

    fn dimension(&self) -> usize {
        self.bins_l * self.bins_a * self.bins_b
    }
}

/// 将 [0, 1] 区间的值映射到 bins 个桶中，越界值落入首尾两个桶
#[inline(always)]
fn to_bin(v: f64, bins: usize) -> usize {
    if v <= 0. {
        0
    } else if v >= 1. {
        bins - 1
    } else {
        (v * bins as f64) as usize
    }
}

#[inline(always)]
fn srgb_to_linear(c: u8) -> f64 {
    let c = c as f64 / 255.;
    if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
}

#[inline(always)]
fn lab_f(t: f64) -> f64 {
    const DELTA: f64 = 6. / 29.;
    if t > DELTA * DELTA * DELTA { t.cbrt() } else { t / (3. * DELTA * DELTA) + 4. / 29. }
}

/// sRGB (0-255) 转换为 CIE Lab，返回 (L, a, b)
pub fn srgb_to_lab(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let rgb = [srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b)];
    let xyz = RGB_TO_XYZ.map(|row| row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2]);

    let fx = lab_f(xyz[0] / WHITE_D65[0]);
    let fy = lab_f(xyz[1] / WHITE_D65[1]);
    let fz = lab_f(xyz[2] / WHITE_D65[2]);

    (116. * fy - 16., 500. * (fx - fy), 200. * (fy - fz))
}
