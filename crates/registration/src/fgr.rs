use cloudalign_core::PointCloud;
use nalgebra::{Matrix3, Matrix3x6, Matrix6, Vector3, Vector6};

use crate::error::RegistrationError;
use crate::matching::{Correspondence, MIN_CORRESPONDENCES};
use crate::transform::RigidTransform;

/// Parameters for the graduated non-convexity solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FgrParams {
    /// Outer iteration budget. Also the caller's wall-clock lever: the
    /// solver has no timeout of its own.
    pub max_iterations: usize,
    /// Divide `mu` by `mu_decay` every `decay_interval` iterations.
    pub decay_interval: usize,
    pub mu_decay: f64,
    /// Annealing floor for `mu`.
    pub mu_floor: f64,
    /// Stop early when the twist update norm drops below this.
    pub convergence_tol: f64,
}

impl Default for FgrParams {
    fn default() -> Self {
        Self {
            max_iterations: 64,
            decay_interval: 4,
            mu_decay: 1.4,
            mu_floor: 1e-12,
            convergence_tol: 1e-10,
        }
    }
}

/// Estimate the rigid transform aligning `source` onto `target` from a
/// fixed correspondence set, tolerating a large outlier fraction.
///
/// Minimizes `sum_k rho_mu(|T p_k - q_k|)` with the Geman-McClure loss
/// `rho_mu(x) = mu x^2 / (mu + x^2)` by IRLS over a graduated `mu`
/// schedule: `mu` starts large enough that the loss is nearly quadratic
/// (early iterations behave like least squares and find the right basin
/// with no initial pose), then decays geometrically so the final
/// iterations drive outlier weights toward zero. The correspondence set
/// is consumed once; there is no per-iteration re-matching or pruning.
///
/// Each outer iteration is one Gauss-Newton step on the weighted
/// problem: residuals and IRLS weights at the current `T`, a small-angle
/// 6-DoF linearization, a 6x6 Cholesky solve, then `T <- exp(xi) * T`
/// with the rotation re-orthonormalized.
///
/// # Errors
///
/// [`RegistrationError::InsufficientCorrespondences`] for fewer than
/// [`MIN_CORRESPONDENCES`] pairs; [`RegistrationError::DegenerateGeometry`]
/// when the normal equations go singular (e.g. all correspondence points
/// collinear, leaving a rotation direction unobservable).
pub fn register_rigid(
    correspondences: &[Correspondence],
    source: &PointCloud,
    target: &PointCloud,
    params: &FgrParams,
) -> Result<RigidTransform, RegistrationError> {
    if correspondences.len() < MIN_CORRESPONDENCES {
        return Err(RegistrationError::InsufficientCorrespondences {
            found: correspondences.len(),
        });
    }

    let src: Vec<[f64; 3]> = correspondences
        .iter()
        .map(|c| source.point(c.source_index))
        .collect();
    let tgt: Vec<[f64; 3]> = correspondences
        .iter()
        .map(|c| target.point(c.target_index))
        .collect();

    let mut transform = RigidTransform::identity();
    let mut mu = initial_mu(&src, &tgt, params.mu_floor);
    log::debug!(
        "fgr: {} correspondences, initial mu = {:.3e}",
        src.len(),
        mu
    );

    for iteration in 0..params.max_iterations {
        if iteration > 0 && iteration % params.decay_interval == 0 {
            mu = (mu / params.mu_decay).max(params.mu_floor);
        }

        let (next, step_norm) = gauss_newton_step(&transform, &src, &tgt, mu)
            .ok_or(RegistrationError::DegenerateGeometry { iteration })?;
        transform = next;

        if step_norm < params.convergence_tol {
            log::debug!(
                "fgr: converged at iteration {} (step norm {:.3e})",
                iteration,
                step_norm
            );
            break;
        }
    }

    Ok(transform)
}

/// Initial annealing scale: a fixed multiple of the median residual at
/// the identity alignment, squared to match the units of `mu` (the loss
/// compares `mu` against squared residual norms). A perfectly
/// pre-aligned input yields the floor.
fn initial_mu(src: &[[f64; 3]], tgt: &[[f64; 3]], floor: f64) -> f64 {
    let mut norms: Vec<f64> = src
        .iter()
        .zip(tgt)
        .map(|(p, q)| {
            let dx = p[0] - q[0];
            let dy = p[1] - q[1];
            let dz = p[2] - q[2];
            (dx * dx + dy * dy + dz * dz).sqrt()
        })
        .collect();
    norms.sort_by(|a, b| a.total_cmp(b));
    let median = norms[norms.len() / 2];
    (4.0 * median).powi(2).max(floor)
}

/// One IRLS Gauss-Newton step at the current transform and `mu`.
///
/// Pure: returns the updated transform and the twist norm rather than
/// mutating, so a single iteration is checkable in isolation. `None`
/// means the weighted normal equations were not positive definite.
fn gauss_newton_step(
    transform: &RigidTransform,
    src: &[[f64; 3]],
    tgt: &[[f64; 3]],
    mu: f64,
) -> Option<(RigidTransform, f64)> {
    let mut jtj = Matrix6::<f64>::zeros();
    let mut jtr = Vector6::<f64>::zeros();

    for (p, q) in src.iter().zip(tgt) {
        let tp = transform.apply_to_point(p);
        let residual = Vector3::new(tp[0] - q[0], tp[1] - q[1], tp[2] - q[2]);

        // Derivative-consistent IRLS weight for Geman-McClure.
        let denom = mu + residual.norm_squared();
        let weight = (mu * mu) / (denom * denom);

        // Residual of exp(xi) * T acting on p, linearized at xi = 0:
        // J = [ -[T p]x | I ].
        let mut jacobian = Matrix3x6::<f64>::zeros();
        jacobian
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(-skew(&tp)));
        jacobian
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&Matrix3::identity());

        jtj += weight * jacobian.transpose() * jacobian;
        jtr += weight * jacobian.transpose() * residual;
    }

    let xi = jtj.cholesky()?.solve(&(-jtr));

    let update = RigidTransform::from_twist(&[xi[0], xi[1], xi[2]], &[xi[3], xi[4], xi[5]]);
    let next = transform.compose(&update).orthonormalized();

    Some((next, xi.norm()))
}

fn skew(v: &[f64; 3]) -> Matrix3<f64> {
    Matrix3::new(0.0, -v[2], v[1], v[2], 0.0, -v[0], -v[1], v[0], 0.0)
}
