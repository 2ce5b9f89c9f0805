#![forbid(unsafe_code)]

pub mod cloud;

pub use cloud::{Normals, PointCloud};
