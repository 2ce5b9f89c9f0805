use cloudalign_core::{Normals, PointCloud};

/// A rigid transform: rotation (orthonormal, det +1) plus translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0, 0.0, 0.0],
        }
    }

    pub fn is_identity(&self, eps: f64) -> bool {
        let id = Self::identity();
        for r in 0..3 {
            for c in 0..3 {
                if (self.rotation[r][c] - id.rotation[r][c]).abs() > eps {
                    return false;
                }
            }
        }
        self.translation.iter().all(|t| t.abs() <= eps)
    }

    /// Apply to a single point: `R * p + t`.
    pub fn apply_to_point(&self, p: &[f64; 3]) -> [f64; 3] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + t[0],
            r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + t[1],
            r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + t[2],
        ]
    }

    /// Rotate a direction vector (no translation).
    pub fn rotate_vector(&self, v: &[f64; 3]) -> [f64; 3] {
        let r = &self.rotation;
        [
            r[0][0] * v[0] + r[0][1] * v[1] + r[0][2] * v[2],
            r[1][0] * v[0] + r[1][1] * v[1] + r[1][2] * v[2],
            r[2][0] * v[0] + r[2][1] * v[1] + r[2][2] * v[2],
        ]
    }

    /// Compose two transforms: apply `self` first, then `other`.
    ///
    /// `R_new = other.R * self.R`, `t_new = other.R * self.t + other.t`.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        let mut rotation = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                rotation[i][j] = other.rotation[i][0] * self.rotation[0][j]
                    + other.rotation[i][1] * self.rotation[1][j]
                    + other.rotation[i][2] * self.rotation[2][j];
            }
        }
        let rt = other.rotate_vector(&self.translation);
        RigidTransform {
            rotation,
            translation: [
                rt[0] + other.translation[0],
                rt[1] + other.translation[1],
                rt[2] + other.translation[2],
            ],
        }
    }

    /// The inverse transform: `R^T, -R^T t`.
    pub fn inverse(&self) -> RigidTransform {
        let r = &self.rotation;
        let rotation = [
            [r[0][0], r[1][0], r[2][0]],
            [r[0][1], r[1][1], r[2][1]],
            [r[0][2], r[1][2], r[2][2]],
        ];
        let t = &self.translation;
        let translation = [
            -(rotation[0][0] * t[0] + rotation[0][1] * t[1] + rotation[0][2] * t[2]),
            -(rotation[1][0] * t[0] + rotation[1][1] * t[1] + rotation[1][2] * t[2]),
            -(rotation[2][0] * t[0] + rotation[2][1] * t[1] + rotation[2][2] * t[2]),
        ];
        RigidTransform {
            rotation,
            translation,
        }
    }

    /// The rotation angle in radians, from the trace identity
    /// `trace(R) = 1 + 2 cos(angle)`.
    pub fn rotation_angle(&self) -> f64 {
        let trace = self.rotation[0][0] + self.rotation[1][1] + self.rotation[2][2];
        ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos()
    }

    /// Row-major 4x4 homogeneous matrix.
    pub fn to_homogeneous(&self) -> [[f64; 4]; 4] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            [r[0][0], r[0][1], r[0][2], t[0]],
            [r[1][0], r[1][1], r[1][2], t[1]],
            [r[2][0], r[2][1], r[2][2], t[2]],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Build the incremental transform for a 6-vector twist
    /// `(omega, t)`: rotation via Rodrigues' formula on `omega`,
    /// translation taken as `t` directly. Consistent to first order with
    /// the solver's linearization `p + omega x p + t`.
    pub fn from_twist(omega: &[f64; 3], t: &[f64; 3]) -> RigidTransform {
        let angle = (omega[0] * omega[0] + omega[1] * omega[1] + omega[2] * omega[2]).sqrt();

        let rotation = if angle < 1e-12 {
            [
                [1.0, -omega[2], omega[1]],
                [omega[2], 1.0, -omega[0]],
                [-omega[1], omega[0], 1.0],
            ]
        } else {
            let ax = omega[0] / angle;
            let ay = omega[1] / angle;
            let az = omega[2] / angle;
            let c = angle.cos();
            let s = angle.sin();
            let k = 1.0 - c;

            [
                [k * ax * ax + c, k * ax * ay - s * az, k * ax * az + s * ay],
                [k * ax * ay + s * az, k * ay * ay + c, k * ay * az - s * ax],
                [k * ax * az - s * ay, k * ay * az + s * ax, k * az * az + c],
            ]
        };

        RigidTransform {
            rotation,
            translation: *t,
        }
    }

    /// Re-orthonormalize the rotation block by Gram-Schmidt on its rows,
    /// forcing the third row to `r0 x r1` so the determinant stays +1.
    /// Called after every solver update to stop orthonormality drift from
    /// accumulating across iterations.
    pub fn orthonormalized(&self) -> RigidTransform {
        let r = &self.rotation;
        let r0 = normalize(&r[0]);
        let d = r[1][0] * r0[0] + r[1][1] * r0[1] + r[1][2] * r0[2];
        let r1 = normalize(&[
            r[1][0] - d * r0[0],
            r[1][1] - d * r0[1],
            r[1][2] - d * r0[2],
        ]);
        let r2 = [
            r0[1] * r1[2] - r0[2] * r1[1],
            r0[2] * r1[0] - r0[0] * r1[2],
            r0[0] * r1[1] - r0[1] * r1[0],
        ];
        RigidTransform {
            rotation: [r0, r1, r2],
            translation: self.translation,
        }
    }
}

fn normalize(v: &[f64; 3]) -> [f64; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len < 1e-30 {
        return [1.0, 0.0, 0.0];
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

/// Apply a rigid transform to a whole cloud, returning a new cloud.
/// Normals, if present, are rotated alongside the positions.
pub fn apply_transform(cloud: &PointCloud, transform: &RigidTransform) -> PointCloud {
    let n = cloud.len();
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    let mut z = Vec::with_capacity(n);

    for p in cloud.iter_points() {
        let tp = transform.apply_to_point(&p);
        x.push(tp[0]);
        y.push(tp[1]);
        z.push(tp[2]);
    }

    let mut out = PointCloud::from_xyz(x, y, z);
    if let Some(normals) = &cloud.normals {
        let mut nx = Vec::with_capacity(n);
        let mut ny = Vec::with_capacity(n);
        let mut nz = Vec::with_capacity(n);
        for i in 0..n {
            let rn = transform.rotate_vector(&normals.normal(i));
            nx.push(rn[0]);
            ny.push(rn[1]);
            nz.push(rn[2]);
        }
        out = out.with_normals(Normals { nx, ny, nz });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rot_z(angle: f64) -> RigidTransform {
        let (s, c) = angle.sin_cos();
        RigidTransform {
            rotation: [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn identity_applies_as_noop() {
        let t = RigidTransform::identity();
        assert_eq!(t.apply_to_point(&[1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
        assert!(t.is_identity(1e-12));
        assert_relative_eq!(t.rotation_angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rotation_then_translation_composes() {
        // Rotate 90 degrees about z, then translate by (1, 0, 0).
        let composed = rot_z(std::f64::consts::FRAC_PI_2).compose(&RigidTransform {
            rotation: RigidTransform::identity().rotation,
            translation: [1.0, 0.0, 0.0],
        });
        let p = composed.apply_to_point(&[1.0, 0.0, 0.0]);
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn inverse_roundtrips_points() {
        let t = rot_z(0.7).compose(&RigidTransform {
            rotation: RigidTransform::identity().rotation,
            translation: [1.0, -2.0, 3.0],
        });
        let p = [0.3, -0.8, 2.0];
        let back = t.inverse().apply_to_point(&t.apply_to_point(&p));
        for a in 0..3 {
            assert_relative_eq!(back[a], p[a], epsilon = 1e-12);
        }
        assert!(t.compose(&t.inverse()).is_identity(1e-12));
    }

    #[test]
    fn rotation_angle_matches_construction() {
        for angle in [0.1, 0.5, 1.0, 2.0, 3.0] {
            assert_relative_eq!(rot_z(angle).rotation_angle(), angle, epsilon = 1e-12);
        }
    }

    #[test]
    fn from_twist_matches_axis_angle() {
        let t = RigidTransform::from_twist(&[0.0, 0.0, 0.3], &[1.0, 2.0, 3.0]);
        let expected = rot_z(0.3);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(
                    t.rotation[i][j],
                    expected.rotation[i][j],
                    epsilon = 1e-12
                );
            }
        }
        assert_eq!(t.translation, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn from_twist_tiny_angle_is_near_identity() {
        let t = RigidTransform::from_twist(&[1e-15, 0.0, 0.0], &[0.0; 3]);
        assert!(t.is_identity(1e-12));
    }

    #[test]
    fn orthonormalized_restores_rotation() {
        // Perturb a valid rotation and check the cleanup restores
        // orthonormality with det +1.
        let mut t = rot_z(0.9);
        t.rotation[0][1] += 1e-4;
        t.rotation[2][0] -= 1e-4;
        let fixed = t.orthonormalized();

        let r = &fixed.rotation;
        for i in 0..3 {
            let len = (r[i][0] * r[i][0] + r[i][1] * r[i][1] + r[i][2] * r[i][2]).sqrt();
            assert_relative_eq!(len, 1.0, epsilon = 1e-12);
        }
        let det = r[0][0] * (r[1][1] * r[2][2] - r[1][2] * r[2][1])
            - r[0][1] * (r[1][0] * r[2][2] - r[1][2] * r[2][0])
            + r[0][2] * (r[1][0] * r[2][1] - r[1][1] * r[2][0]);
        assert_relative_eq!(det, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn to_homogeneous_layout() {
        let t = RigidTransform {
            rotation: [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]],
            translation: [10.0, 11.0, 12.0],
        };
        let m = t.to_homogeneous();
        assert_eq!(m[0], [1.0, 2.0, 3.0, 10.0]);
        assert_eq!(m[2], [7.0, 8.0, 9.0, 12.0]);
        assert_eq!(m[3], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn apply_transform_rotates_normals_too() {
        use cloudalign_core::Normals;
        let cloud = PointCloud::from_xyz(vec![1.0], vec![0.0], vec![0.0]).with_normals(Normals {
            nx: vec![1.0],
            ny: vec![0.0],
            nz: vec![0.0],
        });
        let out = apply_transform(&cloud, &rot_z(std::f64::consts::FRAC_PI_2));
        let normals = out.normals.as_ref().unwrap();
        assert_relative_eq!(normals.nx[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(normals.ny[0], 1.0, epsilon = 1e-12);
    }
}
