//! End-to-end pipeline tests: descriptors, correspondence matching and
//! the robust solver working together on clouds with no initial alignment.

use cloudalign_core::{Normals, PointCloud};
use cloudalign_normals::estimate_normals_with_viewpoint;
use cloudalign_registration::{
    apply_transform, compute_correspondences, register_rigid, CorrespondenceParams, FgrParams,
    RegistrationError, RigidTransform,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn rigid(axis: [f64; 3], angle: f64, translation: [f64; 3]) -> RigidTransform {
    let len = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
    RigidTransform::from_twist(
        &[
            axis[0] / len * angle,
            axis[1] / len * angle,
            axis[2] / len * angle,
        ],
        &translation,
    )
}

/// Seeded random blob with random unit normals. Irregular geometry gives
/// every point a distinctive descriptor, so descriptor matching can
/// recover the index pairing exactly.
fn random_cloud_with_normals(n: usize, seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let x: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let y: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let z: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let mut nx = Vec::with_capacity(n);
    let mut ny = Vec::with_capacity(n);
    let mut nz = Vec::with_capacity(n);
    for _ in 0..n {
        let v = [
            rng.gen_range(-1.0f64..1.0),
            rng.gen_range(-1.0f64..1.0),
            rng.gen_range(-1.0f64..1.0),
        ];
        let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt().max(1e-9);
        nx.push(v[0] / len);
        ny.push(v[1] / len);
        nz.push(v[2] / len);
    }
    PointCloud::from_xyz(x, y, z).with_normals(Normals { nx, ny, nz })
}

fn rms_distance(a: &PointCloud, b: &PointCloud) -> f64 {
    assert_eq!(a.len(), b.len());
    let sum_sq: f64 = (0..a.len())
        .map(|i| {
            let pa = a.point(i);
            let pb = b.point(i);
            (pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2) + (pa[2] - pb[2]).powi(2)
        })
        .sum();
    (sum_sq / a.len() as f64).sqrt()
}

#[test]
fn aligns_displaced_cloud_without_initial_pose() {
    // 1000 points, moved by 10 degrees about z plus a unit translation:
    // the classic no-initial-guess scenario.
    let fixed = random_cloud_with_normals(1000, 42);
    let motion = rigid([0.0, 0.0, 1.0], 10.0_f64.to_radians(), [1.0, 0.0, 0.0]);
    let moving = apply_transform(&fixed, &motion);

    let params = CorrespondenceParams {
        feature_radius: 0.4,
        ..CorrespondenceParams::default()
    };
    let correspondences = compute_correspondences(&moving, &fixed, &params).unwrap();

    // Descriptors of the moved cloud are bit-for-bit comparable to the
    // originals, so matching should recover the identity pairing for
    // nearly every point.
    let identity_pairs = correspondences
        .iter()
        .filter(|c| c.source_index == c.target_index)
        .count();
    assert!(
        identity_pairs as f64 >= 0.9 * correspondences.len() as f64,
        "{} of {} pairs are identity",
        identity_pairs,
        correspondences.len()
    );

    let recovered =
        register_rigid(&correspondences, &moving, &fixed, &FgrParams::default()).unwrap();

    let realigned = apply_transform(&moving, &recovered);
    let rms = rms_distance(&realigned, &fixed);
    assert!(rms < 1e-3, "post-alignment RMS = {}", rms);
}

#[test]
fn aligns_surface_with_estimated_normals() {
    // A wavy height-field surface with PCA-estimated normals on the fixed
    // side; the moving side carries the same normals rotated with the
    // motion, as a caller applying a known sensor pose would provide.
    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut z = Vec::new();
    for i in 0..30 {
        for j in 0..30 {
            let px = i as f64 * 0.1 - 1.5;
            let py = j as f64 * 0.1 - 1.5;
            x.push(px);
            y.push(py);
            z.push(0.3 * (2.0 * px).sin() * (1.5 * py).cos());
        }
    }
    let fixed = PointCloud::from_xyz(x, y, z);
    let normals = estimate_normals_with_viewpoint(&fixed, 12, [0.0, 0.0, 10.0]);
    let fixed = fixed.with_normals(normals);

    let motion = rigid([0.1, 0.2, 1.0], 0.2, [0.8, -0.3, 0.5]);
    let moving = apply_transform(&fixed, &motion);

    let params = CorrespondenceParams {
        feature_radius: 0.35,
        ..CorrespondenceParams::default()
    };
    let correspondences = compute_correspondences(&moving, &fixed, &params).unwrap();
    assert!(correspondences.len() > 100);

    let recovered =
        register_rigid(&correspondences, &moving, &fixed, &FgrParams::default()).unwrap();

    let realigned = apply_transform(&moving, &recovered);
    let rms = rms_distance(&realigned, &fixed);
    assert!(rms < 1e-3, "post-alignment RMS = {}", rms);
}

#[test]
fn reciprocity_filter_only_reduces_matches() {
    let fixed = random_cloud_with_normals(300, 7);
    let moving = apply_transform(&fixed, &rigid([0.0, 0.0, 1.0], 0.3, [0.5, 0.0, 0.0]));

    let mutual = compute_correspondences(
        &moving,
        &fixed,
        &CorrespondenceParams {
            feature_radius: 0.4,
            mutual_filter: true,
        },
    )
    .unwrap();
    let unfiltered = compute_correspondences(
        &moving,
        &fixed,
        &CorrespondenceParams {
            feature_radius: 0.4,
            mutual_filter: false,
        },
    )
    .unwrap();

    assert!(mutual.len() <= unfiltered.len());
}

#[test]
fn sparse_clouds_report_insufficient_correspondences() {
    // Two close points plus one isolated: the isolated point gets a zero
    // descriptor, leaving at most two matchable pairs.
    let make = || {
        PointCloud::from_xyz(
            vec![0.0, 0.05, 100.0],
            vec![0.0, 0.02, 0.0],
            vec![0.0, 0.01, 0.0],
        )
        .with_normals(Normals {
            nx: vec![0.0, 0.1, 0.0],
            ny: vec![0.0, 0.0, 0.0],
            nz: vec![1.0, 0.995, 1.0],
        })
    };

    let err = compute_correspondences(&make(), &make(), &CorrespondenceParams::default())
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::InsufficientCorrespondences { found } if found < 3
    ));
}
