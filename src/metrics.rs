use std::sync::LazyLock;

use prometheus::*;

static METRIC_RECOGNITION_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "scentid_recognition_count",
        "count of the recognition requests",
        &["path", "size"]
    )
    .unwrap()
});

static METRIC_RECOGNITION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "scentid_recognition_duration",
        "duration of the per-image recognition in seconds",
        &["path", "size"]
    )
    .unwrap()
});

static METRIC_RECOGNITION_TOP_SCORE: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "scentid_recognition_top_score",
        "score of the best match of the per-image recognition",
        &["path"],
        (0..=20).map(|x| x as f64 * 0.05).collect()
    )
    .unwrap()
});

static METRIC_PASSTHROUGH_COUNT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "scentid_crop_passthrough_count",
        "count of the images whose foreground could not be cropped"
    )
    .unwrap()
});

/// 识别走的排序路径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPath {
    /// 嵌入召回 + 颜色重排
    Color,
    /// 仅嵌入
    Embedding,
}

impl SearchPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Embedding => "embedding",
        }
    }
}

pub fn inc_recognition_count(path: SearchPath, size: (u32, u32)) {
    METRIC_RECOGNITION_COUNT.with_label_values(&[path.as_str(), to_fixed_size(size)]).inc();
}

pub fn inc_recognition_duration(path: SearchPath, size: (u32, u32), duration: f32) {
    METRIC_RECOGNITION_DURATION
        .with_label_values(&[path.as_str(), to_fixed_size(size)])
        .observe(duration as f64);
}

pub fn inc_recognition_top_score(path: SearchPath, score: f32) {
    METRIC_RECOGNITION_TOP_SCORE.with_label_values(&[path.as_str()]).observe(score as f64);
}

pub fn inc_passthrough_count() {
    METRIC_PASSTHROUGH_COUNT.inc();
}

/// 以 Prometheus 文本格式导出当前进程的所有指标
pub fn gather_text() -> Result<String> {
    let mut buffer = vec![];
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// 将图像面积范围调整到几个固定值
fn to_fixed_size((width, height): (u32, u32)) -> &'static str {
    let area = width as u64 * height as u64;
    if area <= 256 * 256 {
        "256"
    } else if area <= 512 * 512 {
        "512"
    } else if area <= 1024 * 1024 {
        "1024"
    } else if area <= 2048 * 2048 {
        "2048"
    } else if area <= 4096 * 4096 {
        "4096"
    } else {
        "4096+"
    }
}
