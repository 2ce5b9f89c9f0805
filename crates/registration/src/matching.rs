use cloudalign_core::PointCloud;
use cloudalign_features::{compute_fpfh, FpfhDescriptor, FpfhParams, FPFH_DIM};
use cloudalign_spatial::FeatureTree;
use rayon::prelude::*;

use crate::error::RegistrationError;

/// Fewer pairs than this cannot determine a rigid transform.
pub const MIN_CORRESPONDENCES: usize = 3;

/// A proposed match between a source point and a target point, both by
/// index into their respective clouds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correspondence {
    pub source_index: usize,
    pub target_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrespondenceParams {
    /// FPFH neighbourhood radius, forwarded to the descriptor stage.
    pub feature_radius: f64,
    /// Keep only mutually-nearest descriptor pairs. Sharply cuts
    /// many-to-one mismatches at some cost in recall. Default on.
    pub mutual_filter: bool,
}

impl Default for CorrespondenceParams {
    fn default() -> Self {
        Self {
            feature_radius: FpfhParams::default().radius,
            mutual_filter: true,
        }
    }
}

/// Match descriptors across two clouds by nearest Euclidean distance in
/// descriptor space.
///
/// Every source point with a nonzero descriptor proposes its nearest
/// target descriptor; with `mutual_filter` the pair is kept only when the
/// target's nearest source descriptor points back at it. Each source index
/// appears at most once by construction and the output is ordered by
/// ascending source index. Zero descriptors (empty neighbourhoods) never
/// match in either direction.
pub fn match_descriptors(
    source: &[FpfhDescriptor],
    target: &[FpfhDescriptor],
    mutual_filter: bool,
) -> Vec<Correspondence> {
    let target_tree = FeatureTree::<FPFH_DIM>::build(target);
    let source_tree = if mutual_filter {
        Some(FeatureTree::<FPFH_DIM>::build(source))
    } else {
        None
    };

    // Queries are independent per source point; rayon preserves input
    // order on collect, which gives the ascending-source-index contract.
    source
        .par_iter()
        .enumerate()
        .filter_map(|(i, descriptor)| {
            if descriptor.iter().all(|&v| v == 0.0) {
                return None;
            }
            let (j, _) = target_tree.nearest(descriptor)?;

            if let Some(tree) = &source_tree {
                let (back, _) = tree.nearest(&target[j])?;
                if back != i {
                    return None;
                }
            }

            Some(Correspondence {
                source_index: i,
                target_index: j,
            })
        })
        .collect()
}

/// Full correspondence estimation between two normal-enriched clouds:
/// FPFH descriptors on each side, then nearest-descriptor matching with
/// the reciprocity filter. Descriptors are dropped on return; only the
/// index pairs survive.
///
/// # Errors
///
/// [`RegistrationError::Feature`] if either cloud lacks usable normals;
/// [`RegistrationError::InsufficientCorrespondences`] if fewer than
/// [`MIN_CORRESPONDENCES`] pairs survive.
pub fn compute_correspondences(
    source: &PointCloud,
    target: &PointCloud,
    params: &CorrespondenceParams,
) -> Result<Vec<Correspondence>, RegistrationError> {
    let fpfh_params = FpfhParams {
        radius: params.feature_radius,
    };
    let source_descriptors = compute_fpfh(source, &fpfh_params)?;
    let target_descriptors = compute_fpfh(target, &fpfh_params)?;

    let correspondences =
        match_descriptors(&source_descriptors, &target_descriptors, params.mutual_filter);
    log::debug!(
        "descriptor matching: {} of {} source points matched (mutual_filter={})",
        correspondences.len(),
        source.len(),
        params.mutual_filter
    );

    if correspondences.len() < MIN_CORRESPONDENCES {
        return Err(RegistrationError::InsufficientCorrespondences {
            found: correspondences.len(),
        });
    }
    Ok(correspondences)
}
