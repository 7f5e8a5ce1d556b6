//! Plane estimation for wall candidates.
//!
//! Two estimators are provided:
//! - [`plane_from_marker_pose`]: the marker's forward axis is the normal and
//!   its position a point on the plane.
//! - [`plane_from_points`]: RANSAC over a local cloud of map points, refined
//!   by total least squares over the consensus set.
//!
//! All functions are pure. The RANSAC sampler is seeded from the config,
//! so identical input always produces the identical plane.

use nalgebra::{Matrix3, SymmetricEigen, Unit, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::geometry::{PlaneEquation, SE3};
use crate::map::MapPoint;

use super::config::PlaneFitConfig;
use super::error::PlaneFitError;

/// Number of points defining a candidate plane.
const MINIMAL_SAMPLE: usize = 3;

/// Result of a robust plane fit.
#[derive(Debug, Clone)]
pub struct PlaneFit {
    /// Refined plane, oriented with a non-negative offset.
    pub plane: PlaneEquation,
    /// Indices (into the input slice, ascending) of the inlier points.
    pub inliers: Vec<usize>,
}

impl PlaneFit {
    /// Number of inliers supporting the plane.
    pub fn support(&self) -> usize {
        self.inliers.len()
    }
}

/// Plane of a marker without any orientation fix-up.
///
/// The normal is the marker's forward axis, so a marker and its
/// 180°-rotated counterpart produce opposite normals.
pub fn raw_plane_from_marker_pose(pose: &SE3) -> PlaneEquation {
    let forward = Unit::new_normalize(pose.forward_axis());
    PlaneEquation::from_unit_normal_and_point(&forward, &pose.translation)
}

/// Plane of a marker, oriented toward the side it was observed from.
///
/// `viewpoint` is the camera centre of the observing keyframe. Two
/// sightings of the same wall from the same side always agree in sign.
pub fn plane_from_marker_pose(pose: &SE3, viewpoint: &Vector3<f64>) -> PlaneEquation {
    raw_plane_from_marker_pose(pose).canonicalized_toward(viewpoint)
}

/// Map points within `radius` of `location`, nearest first, at most `max_points`.
///
/// Ties in distance are ordered by point ID so the result is deterministic.
pub fn points_near_location<'a, I>(
    points: I,
    location: &Vector3<f64>,
    radius: f64,
    max_points: usize,
) -> Vec<&'a MapPoint>
where
    I: IntoIterator<Item = &'a MapPoint>,
{
    let radius_sq = radius * radius;
    let mut near: Vec<(f64, &MapPoint)> = points
        .into_iter()
        .map(|mp| ((mp.position - location).norm_squared(), mp))
        .filter(|(dist_sq, _)| *dist_sq <= radius_sq)
        .collect();

    near.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
    near.truncate(max_points);
    near.into_iter().map(|(_, mp)| mp).collect()
}

/// Perpendicular distance test.
pub fn is_point_on_plane(plane: &PlaneEquation, point: &Vector3<f64>, tolerance: f64) -> bool {
    plane.distance(point) <= tolerance
}

/// Robustly fit a plane to `points`.
///
/// Fails with `InsufficientSupport` when fewer than `min_points` points are
/// given or the best candidate explains less than `min_inlier_ratio` of them.
pub fn plane_from_points(
    points: &[Vector3<f64>],
    config: &PlaneFitConfig,
) -> Result<PlaneFit, PlaneFitError> {
    let n = points.len();
    let min_points = config.min_points.max(MINIMAL_SAMPLE);
    if n < min_points {
        return Err(PlaneFitError::InsufficientSupport {
            points: n,
            inliers: 0,
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(PlaneEquation, Vec<usize>)> = None;

    for _ in 0..config.max_iterations {
        let sample = rand::seq::index::sample(&mut rng, n, MINIMAL_SAMPLE);
        let candidate = match PlaneEquation::from_points(
            &points[sample.index(0)],
            &points[sample.index(1)],
            &points[sample.index(2)],
        ) {
            Some(plane) => plane,
            None => continue,
        };

        let inliers = collect_inliers(points, &candidate, config.inlier_threshold);
        let improved = best
            .as_ref()
            .is_none_or(|(_, best_inliers)| inliers.len() > best_inliers.len());
        if improved {
            let all_explained = inliers.len() == n;
            best = Some((candidate, inliers));
            if all_explained {
                break;
            }
        }
    }

    let (mut plane, mut inliers) = best.ok_or(PlaneFitError::InsufficientSupport {
        points: n,
        inliers: 0,
    })?;

    if inliers.len() < min_points || (inliers.len() as f64) < config.min_inlier_ratio * n as f64 {
        return Err(PlaneFitError::InsufficientSupport {
            points: n,
            inliers: inliers.len(),
        });
    }

    // Refine until the consensus set is stable; a refinement that loses inliers is rejected.
    for _ in 0..config.max_refinement_passes {
        let Some(refined) = fit_total_least_squares(points, &inliers) else {
            break;
        };
        let refined_inliers = collect_inliers(points, &refined, config.inlier_threshold);
        if refined_inliers.len() < inliers.len() {
            break;
        }
        plane = refined;
        let converged = refined_inliers == inliers;
        inliers = refined_inliers;
        if converged {
            break;
        }
    }

    Ok(PlaneFit {
        plane: plane.with_non_negative_offset(),
        inliers,
    })
}

/// Indices of points within `threshold` of `plane`.
fn collect_inliers(points: &[Vector3<f64>], plane: &PlaneEquation, threshold: f64) -> Vec<usize> {
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| plane.distance(p) <= threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Total least squares plane: through the centroid, normal along the
/// eigenvector of the smallest covariance eigenvalue.
fn fit_total_least_squares(points: &[Vector3<f64>], indices: &[usize]) -> Option<PlaneEquation> {
    if indices.len() < MINIMAL_SAMPLE {
        return None;
    }

    let centroid = indices.iter().map(|&i| points[i]).sum::<Vector3<f64>>() / indices.len() as f64;
    let mut covariance = Matrix3::zeros();
    for &i in indices {
        let d = points[i] - centroid;
        covariance += d * d.transpose();
    }

    let eigen = SymmetricEigen::new(covariance);
    let (min_idx, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let normal = eigen.eigenvectors.column(min_idx).into_owned();

    PlaneEquation::from_normal_and_point(normal, &centroid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapPointId;
    use approx::assert_relative_eq;
    use rand::Rng;
    use std::f64::consts::{FRAC_PI_2, PI};

    /// Points on the plane y = 2 with small deterministic noise, plus outliers.
    fn noisy_wall_points(seed: u64, n_inliers: usize, n_outliers: usize) -> Vec<Vector3<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut points = Vec::new();
        for _ in 0..n_inliers {
            points.push(Vector3::new(
                rng.gen_range(-1.0..1.0),
                2.0 + rng.gen_range(-0.005..0.005),
                rng.gen_range(0.0..2.0),
            ));
        }
        for _ in 0..n_outliers {
            points.push(Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.5..1.5),
                rng.gen_range(0.0..2.0),
            ));
        }
        points
    }

    #[test]
    fn test_marker_pose_plane() {
        // Marker on the wall y = 2, forward axis pointing toward -Y.
        let pose = SE3::from_axis_angle(Vector3::new(FRAC_PI_2, 0.0, 0.0), Vector3::new(0.0, 2.0, 1.0));
        let plane = raw_plane_from_marker_pose(&pose);

        assert_relative_eq!(plane.normal(), -Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(plane.offset(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_canonicalization_flips_rotated_marker() {
        let pose = SE3::from_axis_angle(Vector3::new(FRAC_PI_2, 0.0, 0.0), Vector3::new(0.0, 2.0, 1.0));
        let rotated = pose.compose(&SE3::from_axis_angle(Vector3::new(0.0, PI, 0.0), Vector3::zeros()));
        let viewpoint = Vector3::new(0.0, 0.0, 1.0);

        let raw_a = raw_plane_from_marker_pose(&pose);
        let raw_b = raw_plane_from_marker_pose(&rotated);
        assert_relative_eq!(raw_a.normal(), -raw_b.normal(), epsilon = 1e-12);

        let a = plane_from_marker_pose(&pose, &viewpoint);
        let b = plane_from_marker_pose(&rotated, &viewpoint);
        assert_relative_eq!(a.normal(), b.normal(), epsilon = 1e-12);
        assert_relative_eq!(a.offset(), b.offset(), epsilon = 1e-12);
        assert!(a.signed_distance(&viewpoint) > 0.0);
    }

    #[test]
    fn test_fit_rejects_outliers() {
        let points = noisy_wall_points(1, 80, 20);
        let fit = plane_from_points(&points, &PlaneFitConfig::default()).unwrap();

        assert!(fit.support() >= 80);
        assert!(fit.inliers.iter().all(|&i| i < 80));
        assert_relative_eq!(fit.plane.normal().y.abs(), 1.0, epsilon = 1e-3);
        assert_relative_eq!(fit.plane.distance(&Vector3::new(0.3, 2.0, 0.7)), 0.0, epsilon = 5e-3);
        assert!(fit.plane.offset() >= 0.0);
    }

    #[test]
    fn test_fit_is_idempotent_on_its_inliers() {
        let config = PlaneFitConfig::default();
        let points = noisy_wall_points(7, 60, 15);
        let fit = plane_from_points(&points, &config).unwrap();

        let inlier_points: Vec<_> = fit.inliers.iter().map(|&i| points[i]).collect();
        let refit = plane_from_points(&inlier_points, &config).unwrap();

        assert_eq!(refit.support(), inlier_points.len());
        assert_relative_eq!(refit.plane.normal(), fit.plane.normal(), epsilon = 1e-9);
        assert_relative_eq!(refit.plane.offset(), fit.plane.offset(), epsilon = 1e-9);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let config = PlaneFitConfig::default();
        let points = noisy_wall_points(3, 50, 30);
        let a = plane_from_points(&points, &config).unwrap();
        let b = plane_from_points(&points, &config).unwrap();
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.plane, b.plane);
    }

    #[test]
    fn test_too_few_points() {
        let points = vec![Vector3::zeros(), Vector3::x()];
        let err = plane_from_points(&points, &PlaneFitConfig::default()).unwrap_err();
        assert_eq!(
            err,
            PlaneFitError::InsufficientSupport {
                points: 2,
                inliers: 0
            }
        );
    }

    #[test]
    fn test_scattered_points_lack_support() {
        let mut rng = StdRng::seed_from_u64(11);
        let points: Vec<_> = (0..60)
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-3.0..3.0),
                    rng.gen_range(-3.0..3.0),
                    rng.gen_range(-3.0..3.0),
                )
            })
            .collect();
        assert!(matches!(
            plane_from_points(&points, &PlaneFitConfig::default()),
            Err(PlaneFitError::InsufficientSupport { .. })
        ));
    }

    #[test]
    fn test_points_near_location_is_bounded() {
        let points: Vec<_> = (0..10)
            .map(|i| MapPoint::new(MapPointId::new(i), Vector3::new(i as f64 * 0.1, 0.0, 0.0)))
            .collect();

        let near = points_near_location(&points, &Vector3::zeros(), 0.45, 100);
        let ids: Vec<_> = near.iter().map(|mp| mp.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);

        let capped = points_near_location(&points, &Vector3::new(0.5, 0.0, 0.0), 1.0, 3);
        let ids: Vec<_> = capped.iter().map(|mp| mp.id.0).collect();
        assert_eq!(ids, vec![5, 4, 6]);
    }

    #[test]
    fn test_is_point_on_plane() {
        let plane = PlaneEquation::from_normal_and_point(Vector3::y(), &Vector3::new(0.0, 2.0, 0.0))
            .unwrap();
        assert!(is_point_on_plane(&plane, &Vector3::new(4.0, 2.04, -1.0), 0.05));
        assert!(!is_point_on_plane(&plane, &Vector3::new(4.0, 2.2, -1.0), 0.05));
    }
}
