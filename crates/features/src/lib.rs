#![forbid(unsafe_code)]

pub mod fpfh;

pub use fpfh::{compute_fpfh, FeatureError, FpfhDescriptor, FpfhParams, FPFH_DIM, HISTOGRAM_BINS};
