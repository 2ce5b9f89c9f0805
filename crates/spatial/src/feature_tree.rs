use kiddo::float::distance::SquaredEuclidean;
use kiddo::immutable::float::kdtree::ImmutableKdTree;

/// A kd-tree over `N`-dimensional feature descriptors, used for
/// nearest-descriptor search when matching features across two clouds.
///
/// Descriptors with zero norm are degenerate (a point whose neighbourhood
/// was empty) and must never participate in matching; they are dropped at
/// build time and the tree maps its results back to the caller's original
/// descriptor indices.
#[derive(Debug, Clone)]
pub struct FeatureTree<const N: usize> {
    tree: ImmutableKdTree<f64, u32, N, 32>,
    // tree item -> index in the caller's descriptor slice
    original_index: Vec<u32>,
}

impl<const N: usize> FeatureTree<N> {
    /// Build a tree over all nonzero descriptors in `descriptors`.
    pub fn build(descriptors: &[[f64; N]]) -> Self {
        let mut kept = Vec::with_capacity(descriptors.len());
        let mut original_index = Vec::with_capacity(descriptors.len());

        for (i, d) in descriptors.iter().enumerate() {
            if d.iter().any(|&v| v != 0.0) {
                kept.push(*d);
                original_index.push(i as u32);
            }
        }

        Self {
            tree: ImmutableKdTree::new_from_slice(&kept),
            original_index,
        }
    }

    /// Number of (nonzero) descriptors indexed.
    pub fn len(&self) -> usize {
        self.original_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original_index.is_empty()
    }

    /// Nearest descriptor to `query` by Euclidean distance.
    ///
    /// Returns `(original_index, squared_distance)`, or `None` if the tree
    /// holds no descriptors.
    pub fn nearest(&self, query: &[f64; N]) -> Option<(usize, f64)> {
        if self.is_empty() {
            return None;
        }

        let nn = self.tree.nearest_one::<SquaredEuclidean>(query);
        Some((self.original_index[nn.item as usize] as usize, nn.distance))
    }
}
