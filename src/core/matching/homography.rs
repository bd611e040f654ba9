//! Planar homography estimation from point correspondences.
//!
//! Deterministic RANSAC over minimal 4-point samples, followed by a
//! normalized DLT refit on the consensus set. Coordinates are f64
//! throughout; the pixel-space reprojection gate comes from the caller.

use nalgebra::{DMatrix, Matrix3, SMatrix, SVector};

/// A source point and the target point it should map to.
pub type PointPair = ((f64, f64), (f64, f64));

/// Consensus estimate: the homography and the indices of the pairs that
/// agree with it.
#[derive(Debug, Clone)]
pub struct RansacResult {
    pub homography: Matrix3<f64>,
    pub inliers: Vec<usize>,
}

const RANSAC_ITERATIONS: usize = 512;
const MIN_SAMPLE: usize = 4;

/// Estimate a homography mapping `pairs[i].0` onto `pairs[i].1`.
///
/// Returns `None` when fewer than four pairs exist or no model reaches
/// four inliers within the reprojection threshold.
pub fn estimate(pairs: &[PointPair], reproj_threshold: f64) -> Option<RansacResult> {
    if pairs.len() < MIN_SAMPLE {
        return None;
    }

    // Seeded from the problem size: identical inputs give identical
    // estimates, which keeps pipeline runs reproducible.
    let mut rng = XorShift::new(0x5DEE_CE66 ^ pairs.len() as u64);
    let mut best: Option<(Matrix3<f64>, Vec<usize>)> = None;

    for _ in 0..RANSAC_ITERATIONS {
        let sample = sample_indices(&mut rng, pairs.len());
        let Some(model) = solve_minimal(pairs, &sample) else {
            continue;
        };
        let inliers = consensus(pairs, &model, reproj_threshold);
        if inliers.len() >= MIN_SAMPLE
            && best.as_ref().map_or(true, |(_, b)| inliers.len() > b.len())
        {
            best = Some((model, inliers));
        }
    }

    let (model, inliers) = best?;

    // Refit on the whole consensus set; fall back to the minimal model
    // if the refit degenerates.
    let refined = solve_dlt(pairs, &inliers).unwrap_or(model);
    let mut inliers = consensus(pairs, &refined, reproj_threshold);
    if inliers.len() < MIN_SAMPLE {
        inliers = consensus(pairs, &model, reproj_threshold);
        return Some(RansacResult {
            homography: model,
            inliers,
        });
    }
    Some(RansacResult {
        homography: refined,
        inliers,
    })
}

/// Apply a homography to a point; `None` when the point maps to infinity.
pub fn project(h: &Matrix3<f64>, point: (f64, f64)) -> Option<(f64, f64)> {
    let w = h[(2, 0)] * point.0 + h[(2, 1)] * point.1 + h[(2, 2)];
    if w.abs() < 1e-12 {
        return None;
    }
    let x = (h[(0, 0)] * point.0 + h[(0, 1)] * point.1 + h[(0, 2)]) / w;
    let y = (h[(1, 0)] * point.0 + h[(1, 1)] * point.1 + h[(1, 2)]) / w;
    Some((x, y))
}

fn consensus(pairs: &[PointPair], h: &Matrix3<f64>, threshold: f64) -> Vec<usize> {
    pairs
        .iter()
        .enumerate()
        .filter_map(|(index, (src, dst))| {
            let projected = project(h, *src)?;
            let dx = projected.0 - dst.0;
            let dy = projected.1 - dst.1;
            ((dx * dx + dy * dy).sqrt() < threshold).then_some(index)
        })
        .collect()
}

/// Exact solve from four pairs, fixing h33 = 1.
fn solve_minimal(pairs: &[PointPair], sample: &[usize; 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (row, &index) in sample.iter().enumerate() {
        let ((x, y), (u, v)) = pairs[index];
        let r = 2 * row;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;
        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }
    let h = a.lu().solve(&b)?;
    Some(Matrix3::new(
        h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0,
    ))
}

/// Normalized DLT over an arbitrary consensus set.
fn solve_dlt(pairs: &[PointPair], indices: &[usize]) -> Option<Matrix3<f64>> {
    if indices.len() < MIN_SAMPLE {
        return None;
    }
    let sources: Vec<_> = indices.iter().map(|&i| pairs[i].0).collect();
    let targets: Vec<_> = indices.iter().map(|&i| pairs[i].1).collect();
    let (t_src, normalized_src) = normalize(&sources)?;
    let (t_dst, normalized_dst) = normalize(&targets)?;

    let mut a = DMatrix::<f64>::zeros(2 * indices.len(), 9);
    for (row, ((x, y), (u, v))) in normalized_src
        .iter()
        .zip(normalized_dst.iter())
        .enumerate()
    {
        a[(2 * row, 0)] = -x;
        a[(2 * row, 1)] = -y;
        a[(2 * row, 2)] = -1.0;
        a[(2 * row, 6)] = u * x;
        a[(2 * row, 7)] = u * y;
        a[(2 * row, 8)] = *u;
        a[(2 * row + 1, 3)] = -x;
        a[(2 * row + 1, 4)] = -y;
        a[(2 * row + 1, 5)] = -1.0;
        a[(2 * row + 1, 6)] = v * x;
        a[(2 * row + 1, 7)] = v * y;
        a[(2 * row + 1, 8)] = *v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let h_vec = v_t.row(v_t.nrows() - 1);
    let h_normalized = Matrix3::new(
        h_vec[0], h_vec[1], h_vec[2], h_vec[3], h_vec[4], h_vec[5], h_vec[6], h_vec[7], h_vec[8],
    );

    // Denormalize: H = T_dst^-1 * Hn * T_src
    let h = t_dst.try_inverse()? * h_normalized * t_src;
    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 {
        return None;
    }
    Some(h / scale)
}

/// Hartley normalization: centroid to origin, mean distance sqrt(2).
fn normalize(points: &[(f64, f64)]) -> Option<(Matrix3<f64>, Vec<(f64, f64)>)> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-12 {
        return None;
    }
    let scale = std::f64::consts::SQRT_2 / mean_dist;
    let transform = Matrix3::new(scale, 0.0, -scale * cx, 0.0, scale, -scale * cy, 0.0, 0.0, 1.0);
    let transformed = points
        .iter()
        .map(|p| (scale * (p.0 - cx), scale * (p.1 - cy)))
        .collect();
    Some((transform, transformed))
}

fn sample_indices(rng: &mut XorShift, len: usize) -> [usize; 4] {
    let mut sample = [0usize; 4];
    let mut chosen = 0;
    while chosen < 4 {
        let candidate = (rng.next() % len as u64) as usize;
        if !sample[..chosen].contains(&candidate) {
            sample[chosen] = candidate;
            chosen += 1;
        }
    }
    sample
}

struct XorShift {
    state: u64,
}

impl XorShift {
    fn new(seed: u64) -> Self {
        Self {
            state: seed | 0x1357_9BDF,
        }
    }

    fn next(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation_pairs(dx: f64, dy: f64, n: usize) -> Vec<PointPair> {
        (0..n)
            .map(|i| {
                let x = (i * 37 % 211) as f64;
                let y = (i * 61 % 173) as f64;
                ((x, y), (x + dx, y + dy))
            })
            .collect()
    }

    #[test]
    fn recovers_pure_translation() {
        let pairs = translation_pairs(42.0, -17.0, 30);
        let result = estimate(&pairs, 3.0).unwrap();
        assert_eq!(result.inliers.len(), 30);

        let (x, y) = project(&result.homography, (10.0, 10.0)).unwrap();
        assert!((x - 52.0).abs() < 0.5);
        assert!((y + 7.0).abs() < 0.5);
    }

    #[test]
    fn rejects_outliers() {
        let mut pairs = translation_pairs(5.0, 5.0, 40);
        // Ten gross outliers.
        for i in 0..10 {
            pairs.push(((i as f64, i as f64), (500.0 - i as f64, 900.0)));
        }
        let result = estimate(&pairs, 3.0).unwrap();
        assert!(result.inliers.len() >= 40);
        assert!(result.inliers.len() < 50);
    }

    #[test]
    fn too_few_pairs_is_none() {
        let pairs = translation_pairs(1.0, 1.0, 3);
        assert!(estimate(&pairs, 3.0).is_none());
    }

    #[test]
    fn pure_noise_has_no_consensus() {
        let pairs: Vec<PointPair> = (0..24)
            .map(|i| {
                let a = ((i * 97 % 500) as f64, (i * 31 % 400) as f64);
                let b = ((i * 53 % 450) as f64, (i * 89 % 350) as f64);
                (a, b)
            })
            .collect();
        // Either no model at all, or a small accidental consensus; the
        // minimal sample itself can always be fit exactly.
        if let Some(result) = estimate(&pairs, 3.0) {
            assert!(result.inliers.len() < 20);
        }
    }

    #[test]
    fn projecting_to_infinity_is_none() {
        let h = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0);
        assert!(project(&h, (0.0, 5.0)).is_none());
    }
}
