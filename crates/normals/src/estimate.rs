use cloudalign_core::{Normals, PointCloud};
use cloudalign_spatial::KdTree;
use rayon::prelude::*;

/// Estimate a unit surface normal for every point via local PCA.
///
/// For each point the covariance of its `k` nearest neighbours is formed
/// and the eigenvector of the smallest eigenvalue is taken as the normal,
/// oriented to face the origin. The result is a standalone [`Normals`]
/// block; attach it with [`PointCloud::with_normals`] to produce the
/// enriched cloud the feature stage consumes. Nothing is mutated in place.
///
/// Points are processed in parallel; each point reads only its neighbours'
/// positions, so no synchronization is needed.
pub fn estimate_normals(cloud: &PointCloud, k: usize) -> Normals {
    estimate_normals_with_viewpoint(cloud, k, [0.0, 0.0, 0.0])
}

/// Same as [`estimate_normals`] but orients normals toward `viewpoint`.
pub fn estimate_normals_with_viewpoint(
    cloud: &PointCloud,
    k: usize,
    viewpoint: [f64; 3],
) -> Normals {
    if cloud.is_empty() || k == 0 {
        return Normals {
            nx: vec![],
            ny: vec![],
            nz: vec![],
        };
    }

    let tree = KdTree::build(cloud);
    let points: Vec<[f64; 3]> = cloud.iter_points().collect();

    let normals: Vec<[f64; 3]> = points
        .par_iter()
        .map(|point| {
            let neighbours = tree.knn_indices(point, k);
            if neighbours.is_empty() {
                return [0.0, 0.0, 1.0];
            }

            let cov = neighbourhood_covariance(&points, &neighbours);
            let mut n = smallest_eigenvector(&cov);

            // Flip toward the viewpoint for a consistent orientation.
            let to_view = [
                viewpoint[0] - point[0],
                viewpoint[1] - point[1],
                viewpoint[2] - point[2],
            ];
            if n[0] * to_view[0] + n[1] * to_view[1] + n[2] * to_view[2] < 0.0 {
                n = [-n[0], -n[1], -n[2]];
            }
            n
        })
        .collect();

    let mut nx = Vec::with_capacity(normals.len());
    let mut ny = Vec::with_capacity(normals.len());
    let mut nz = Vec::with_capacity(normals.len());
    for n in &normals {
        nx.push(n[0]);
        ny.push(n[1]);
        nz.push(n[2]);
    }

    Normals { nx, ny, nz }
}

/// Upper triangle of the 3x3 covariance of the given neighbourhood,
/// packed as `[c00, c01, c02, c11, c12, c22]`.
fn neighbourhood_covariance(points: &[[f64; 3]], neighbours: &[usize]) -> [f64; 6] {
    let count = neighbours.len() as f64;

    let mut centroid = [0.0_f64; 3];
    for &idx in neighbours {
        centroid[0] += points[idx][0];
        centroid[1] += points[idx][1];
        centroid[2] += points[idx][2];
    }
    centroid[0] /= count;
    centroid[1] /= count;
    centroid[2] /= count;

    let mut c = [0.0_f64; 6];
    for &idx in neighbours {
        let dx = points[idx][0] - centroid[0];
        let dy = points[idx][1] - centroid[1];
        let dz = points[idx][2] - centroid[2];
        c[0] += dx * dx;
        c[1] += dx * dy;
        c[2] += dx * dz;
        c[3] += dy * dy;
        c[4] += dy * dz;
        c[5] += dz * dz;
    }
    c
}

/// Unit eigenvector of the smallest eigenvalue of a symmetric 3x3 matrix
/// given as its packed upper triangle.
///
/// Eigenvalues come from Cardano's closed form; the eigenvector is the
/// cross product of two rows of `A - lambda*I` (that matrix has rank <= 2,
/// so any two independent rows span its range and their cross product is
/// the null direction). Closed-form beats a general iterative eigensolver
/// in this inner loop and avoids heap allocation entirely.
fn smallest_eigenvector(c: &[f64; 6]) -> [f64; 3] {
    let [a00, a01, a02, a11, a12, a22] = *c;

    let mean = (a00 + a11 + a22) / 3.0;
    let b00 = a00 - mean;
    let b11 = a11 - mean;
    let b22 = a22 - mean;

    // Cardano: lambda = mean + 2 sqrt(p) cos(phi + 2k pi/3)
    let p = (b00 * b00 + b11 * b11 + b22 * b22
        + 2.0 * (a01 * a01 + a02 * a02 + a12 * a12))
        / 6.0;
    let q = (b00 * (b11 * b22 - a12 * a12) - a01 * (a01 * b22 - a12 * a02)
        + a02 * (a01 * a12 - b11 * a02))
        / 2.0;

    let p = p.max(0.0);
    if p < 1e-30 {
        // Zero or isotropic covariance; any direction is an eigenvector.
        return [0.0, 0.0, 1.0];
    }

    let phi = (q / (p * p.sqrt())).clamp(-1.0, 1.0).acos() / 3.0;
    let sqrt_p = p.sqrt();
    let lambda = mean + 2.0 * sqrt_p * (phi + 2.0 * std::f64::consts::FRAC_PI_3).cos();

    let r00 = a00 - lambda;
    let r11 = a11 - lambda;
    let r22 = a22 - lambda;

    // Rows of A - lambda*I; try row pairs until a usable cross product
    // appears (pairs degenerate when the two rows are parallel).
    let rows = [
        [r00, a01, a02],
        [a01, r11, a12],
        [a02, a12, r22],
    ];
    for (i, j) in [(0, 1), (0, 2), (1, 2)] {
        let v = cross(&rows[i], &rows[j]);
        let len_sq = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
        if len_sq > 1e-30 {
            let inv = 1.0 / len_sq.sqrt();
            return [v[0] * inv, v[1] * inv, v[2] * inv];
        }
    }

    [0.0, 0.0, 1.0]
}

fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
