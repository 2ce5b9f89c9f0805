/// A 3D point cloud stored in structure-of-arrays layout.
///
/// Positions are `f64`; registration accuracy targets (sub-microradian
/// rotation recovery) rule out single precision. The index of a point in
/// the `x`/`y`/`z` vectors is its stable identity: descriptors and
/// correspondences refer to points by this index.
///
/// Normals are optional. A cloud starts positions-only and is enriched
/// into a positions+normals cloud via [`PointCloud::with_normals`] — there
/// is no in-place normal mutation anywhere in the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub normals: Option<Normals>,
}

/// Per-point unit normal vectors, same SoA layout and indexing as the
/// owning [`PointCloud`].
#[derive(Debug, Clone, PartialEq)]
pub struct Normals {
    pub nx: Vec<f64>,
    pub ny: Vec<f64>,
    pub nz: Vec<f64>,
}

impl Normals {
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.nx.len(), self.ny.len());
        debug_assert_eq!(self.nx.len(), self.nz.len());
        self.nx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nx.is_empty()
    }

    pub fn normal(&self, i: usize) -> [f64; 3] {
        [self.nx[i], self.ny[i], self.nz[i]]
    }
}

impl PointCloud {
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            normals: None,
        }
    }

    pub fn from_xyz(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Self {
        assert_eq!(x.len(), y.len(), "x and y must have same length");
        assert_eq!(x.len(), z.len(), "x and z must have same length");

        Self {
            x,
            y,
            z,
            normals: None,
        }
    }

    /// Attach normals, consuming and returning the cloud.
    ///
    /// # Panics
    ///
    /// Panics if `normals` does not have one entry per point.
    pub fn with_normals(mut self, normals: Normals) -> Self {
        assert_eq!(
            normals.len(),
            self.len(),
            "normals must have one entry per point"
        );
        self.normals = Some(normals);
        self
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.x.len(), self.y.len());
        debug_assert_eq!(self.x.len(), self.z.len());
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn point(&self, i: usize) -> [f64; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    pub fn iter_points(&self) -> impl Iterator<Item = [f64; 3]> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.z)
            .map(|((x, y), z)| [*x, *y, *z])
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new()
    }
}
