//! Embedding math used by the graph's recall and clustering.

/// Cosine of the angle between `a` and `b`, accumulated in `f64`.
///
/// 0.0 when the lengths differ, either side is empty, or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, sq_a, sq_b) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |(d, na, nb), (&x, &y)| {
        let (x, y) = (f64::from(x), f64::from(y));
        (d + x * y, na + x * x, nb + y * y)
    });

    let norms = (sq_a * sq_b).sqrt();
    if norms < 1e-10 { 0.0 } else { (dot / norms) as f32 }
}

/// Component-wise mean of equally sized vectors.
///
/// `None` for an empty input or mismatched dimensions.
pub fn centroid<'a>(vectors: impl IntoIterator<Item = &'a [f32]>) -> Option<Vec<f32>> {
    let mut iter = vectors.into_iter();
    let first = iter.next()?;
    let mut sum: Vec<f64> = first.iter().map(|&x| x as f64).collect();
    let mut count = 1usize;

    for v in iter {
        if v.len() != sum.len() {
            return None;
        }
        for (acc, &x) in sum.iter_mut().zip(v) {
            *acc += x as f64;
        }
        count += 1;
    }

    Some(sum.into_iter().map(|x| (x / count as f64) as f32).collect())
}
