//! # Matching Module
//!
//! Pairwise image matching and panorama grouping.
//!
//! For each candidate pair: 2-NN descriptor matching with a ratio test,
//! then a homography-consensus filter; the surviving inliers become the
//! pair's correspondences. Grouping chains accepted matches into
//! panorama candidates strictly in the order the matches were produced.
//!
//! The thresholds here are policy constants owned by the core; they are
//! deliberately not part of the configuration surface.

pub mod homography;

use crate::core::features::{self, ImageFeatures};
use serde::{Deserialize, Serialize};

/// Lowe ratio gate for 2-NN descriptor matches.
const RATIO_TEST_THRESHOLD: f32 = 0.8;
/// Minimum surviving matches before homography estimation is attempted.
const MIN_CORRESPONDENCES: usize = 4;
/// Reprojection gate for homography consensus, in pixels.
const REPROJECTION_THRESHOLD_PX: f64 = 3.0;
/// A match participates in panorama chaining only above this many
/// correspondences.
const PANO_CHAIN_THRESHOLD: usize = 70;

/// One accepted correspondence: keypoint indices into the two images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correspondence {
    pub idx1: usize,
    pub idx2: usize,
}

/// Directed pairwise relationship between two image indices.
///
/// One `Match` is recorded per candidate pair; a pair that failed the
/// ratio/consensus gates carries an empty correspondence list and can
/// never seed a panorama.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id1: usize,
    pub id2: usize,
    pub correspondences: Vec<Correspondence>,
}

/// An ordered sequence of image indices believed to form one panorama.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pano {
    pub ids: Vec<usize>,
}

/// Match two feature sets: 2-NN + ratio test + homography consensus.
///
/// Returns the inlier correspondences, or an empty list when either side
/// has no features, too few matches survive the ratio test, or no
/// homography consensus forms.
pub fn match_features(first: &ImageFeatures, second: &ImageFeatures) -> Vec<Correspondence> {
    if first.is_empty() || second.is_empty() {
        return Vec::new();
    }

    let mut good = Vec::new();
    for (idx1, descriptor) in first.descriptors.iter().enumerate() {
        let mut best = (u32::MAX, 0usize);
        let mut second_best = u32::MAX;
        for (idx2, candidate) in second.descriptors.iter().enumerate() {
            let distance = features::hamming(descriptor, candidate);
            if distance < best.0 {
                second_best = best.0;
                best = (distance, idx2);
            } else if distance < second_best {
                second_best = distance;
            }
        }
        // An ambiguous nearest neighbor (or a lone one) is rejected.
        if second_best == 0 || second_best == u32::MAX {
            continue;
        }
        if (best.0 as f32) / (second_best as f32) < RATIO_TEST_THRESHOLD {
            good.push(Correspondence {
                idx1,
                idx2: best.1,
            });
        }
    }

    if good.len() < MIN_CORRESPONDENCES {
        return Vec::new();
    }

    let pairs: Vec<homography::PointPair> = good
        .iter()
        .map(|c| {
            let a = first.keypoints[c.idx1];
            let b = second.keypoints[c.idx2];
            ((a.x as f64, a.y as f64), (b.x as f64, b.y as f64))
        })
        .collect();

    match homography::estimate(&pairs, REPROJECTION_THRESHOLD_PX) {
        Some(result) => result.inliers.iter().map(|&i| good[i]).collect(),
        None => Vec::new(),
    }
}

/// Estimate the homography mapping pixels of `first` onto `second`.
///
/// Used by the stitching engine on freshly detected full-scale features.
pub(crate) fn pairwise_homography(
    first: &ImageFeatures,
    second: &ImageFeatures,
) -> Option<nalgebra::Matrix3<f64>> {
    let correspondences = match_features(first, second);
    if correspondences.len() < MIN_CORRESPONDENCES {
        return None;
    }
    let pairs: Vec<homography::PointPair> = correspondences
        .iter()
        .map(|c| {
            let a = first.keypoints[c.idx1];
            let b = second.keypoints[c.idx2];
            ((a.x as f64, a.y as f64), (b.x as f64, b.y as f64))
        })
        .collect();
    homography::estimate(&pairs, REPROJECTION_THRESHOLD_PX).map(|r| r.homography)
}

/// Chain accepted matches into panorama candidates.
///
/// Scans matches **in the order they were produced** and greedily extends
/// the current chain while each new match starts where the chain ended.
/// The grouping is linear and order-sensitive, not a connected
/// components clustering: shuffling the input images or widening the
/// candidate window can legitimately change which panoramas form.
pub fn find_panos(matches: &[Match]) -> Vec<Pano> {
    let good: Vec<(usize, usize)> = matches
        .iter()
        .filter(|m| m.correspondences.len() > PANO_CHAIN_THRESHOLD)
        .map(|m| (m.id1, m.id2))
        .collect();

    let Some(&(first_id1, first_id2)) = good.first() else {
        return Vec::new();
    };

    let mut result = Vec::new();
    let mut next = Pano {
        ids: vec![first_id1, first_id2],
    };
    for &(id1, id2) in &good[1..] {
        if next.ids.last() == Some(&id1) {
            next.ids.push(id2);
        } else {
            result.push(next);
            next = Pano {
                ids: vec![id1, id2],
            };
        }
    }
    result.push(next);
    result
}
