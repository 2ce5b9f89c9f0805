use kiddo::float::distance::SquaredEuclidean;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use cloudalign_core::PointCloud;
use std::num::NonZero;

/// A kd-tree over the positions of a [`PointCloud`].
///
/// Built once from the cloud and read-only afterwards; all registration
/// stages query it without mutation. Backed by kiddo v5's
/// `ImmutableKdTree`, whose cache-optimized layout beats the mutable
/// variant for query-heavy workloads like descriptor computation.
///
/// Stored items are `u32` indices into the originating cloud.
#[derive(Debug, Clone)]
pub struct KdTree {
    tree: ImmutableKdTree<f64, u32, 3, 32>,
    num_points: usize,
}

impl KdTree {
    pub fn build(cloud: &PointCloud) -> Self {
        let n = cloud.len();
        if n == 0 {
            return Self {
                tree: ImmutableKdTree::new_from_slice(&[]),
                num_points: 0,
            };
        }

        let points: Vec<[f64; 3]> = cloud.iter_points().collect();
        let tree = ImmutableKdTree::new_from_slice(&points);

        Self {
            tree,
            num_points: n,
        }
    }

    pub fn len(&self) -> usize {
        self.num_points
    }

    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    /// The `k` nearest neighbours of `query`.
    ///
    /// Returns `(indices, squared_distances)` in ascending distance order.
    /// Equidistant points are returned in the tree's traversal order,
    /// which is fixed for a given build, so repeated queries on the same
    /// tree are deterministic.
    ///
    /// Returns empty vectors if `k == 0`, the tree is empty, or the query
    /// contains a non-finite coordinate.
    pub fn knn(&self, query: &[f64; 3], k: usize) -> (Vec<usize>, Vec<f64>) {
        if k == 0 || self.is_empty() || !query.iter().all(|v| v.is_finite()) {
            return (Vec::new(), Vec::new());
        }

        let nz_k = NonZero::new(k).unwrap();
        let results = self.tree.nearest_n::<SquaredEuclidean>(query, nz_k);

        let mut indices = Vec::with_capacity(results.len());
        let mut sq_distances = Vec::with_capacity(results.len());
        for nn in results {
            indices.push(nn.item as usize);
            sq_distances.push(nn.distance);
        }

        (indices, sq_distances)
    }

    /// Like [`knn`](Self::knn) but returns only indices, skipping the
    /// distance vector allocation. Used by normal estimation, which never
    /// looks at the distances.
    pub fn knn_indices(&self, query: &[f64; 3], k: usize) -> Vec<usize> {
        if k == 0 || self.is_empty() || !query.iter().all(|v| v.is_finite()) {
            return Vec::new();
        }

        let nz_k = NonZero::new(k).unwrap();
        self.tree
            .nearest_n::<SquaredEuclidean>(query, nz_k)
            .iter()
            .map(|nn| nn.item as usize)
            .collect()
    }

    /// All point indices within Euclidean distance `radius` of `query`,
    /// boundary included, sorted ascending by original index.
    ///
    /// Returns empty if the tree is empty, `radius <= 0`, or any input is
    /// non-finite.
    pub fn radius_search(&self, query: &[f64; 3], radius: f64) -> Vec<usize> {
        if self.is_empty()
            || radius <= 0.0
            || !radius.is_finite()
            || !query.iter().all(|v| v.is_finite())
        {
            return Vec::new();
        }

        let radius_sq = radius * radius;

        // kiddo's `within_unsorted` uses strict `<`; widen the query by an
        // epsilon and post-filter with `<=` so boundary points are kept.
        let query_radius_sq = radius_sq + f64::EPSILON * radius_sq.max(1.0);

        let mut indices: Vec<usize> = self
            .tree
            .within_unsorted::<SquaredEuclidean>(query, query_radius_sq)
            .into_iter()
            .filter(|nn| nn.distance <= radius_sq)
            .map(|nn| nn.item as usize)
            .collect();

        indices.sort_unstable();
        indices
    }
}
