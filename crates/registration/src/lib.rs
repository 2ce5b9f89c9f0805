#![forbid(unsafe_code)]

pub mod error;
pub mod fgr;
pub mod matching;
pub mod transform;

pub use error::RegistrationError;
pub use fgr::{register_rigid, FgrParams};
pub use matching::{
    compute_correspondences, match_descriptors, Correspondence, CorrespondenceParams,
    MIN_CORRESPONDENCES,
};
pub use transform::{apply_transform, RigidTransform};
