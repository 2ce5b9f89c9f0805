#![forbid(unsafe_code)]

pub mod feature_tree;
pub mod kdtree;

pub use feature_tree::FeatureTree;
pub use kdtree::KdTree;
