/// 将向量缩放为单位 L2 长度，零向量原样返回
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    l2_normalize_in_place(&mut out);
    out
}

/// 原地 L2 归一化，零向量不做任何处理
pub fn l2_normalize_in_place(v: &mut [f32]) {
    // 使用 f64 累加，避免 2048 维时的精度损失
    let norm = v.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();
    if norm == 0. {
        return;
    }
    let inv = 1. / norm;
    for x in v.iter_mut() {
        *x = (*x as f64 * inv) as f32;
    }
}

/// 向量点积，长度不同时按较短者计算
#[inline(always)]
pub fn dot(va: &[f32], vb: &[f32]) -> f32 {
    va.iter().zip(vb).map(|(a, b)| a * b).sum()
}
