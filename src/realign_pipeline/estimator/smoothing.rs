//! Separable Gaussian smoothing applied before estimation.

use nalgebra::Vector3;
use ndarray::{Array3, Axis};

/// Sigmas below this many voxels leave an axis untouched.
const MIN_SIGMA: f64 = 1e-3;
/// Kernel half-width in sigmas.
const KERNEL_RADIUS_SIGMAS: f64 = 4.0;

/// Converts a FWHM in mm to a per-axis sigma in voxels.
pub fn fwhm_to_sigma(fwhm: f64, voxel_size: &Vector3<f64>) -> [f64; 3] {
    let sigma_mm = fwhm / (8.0 * std::f64::consts::LN_2).sqrt();
    [0, 1, 2].map(|a| {
        if voxel_size[a] > 0.0 {
            sigma_mm / voxel_size[a]
        } else {
            0.0
        }
    })
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (KERNEL_RADIUS_SIGMAS * sigma).ceil().max(1.0) as i64;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-0.5 * (i as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = kernel.iter().sum();
    kernel.into_iter().map(|w| w / total).collect()
}

/// Smooths `volume` with a Gaussian of `sigma` voxels per axis. Wrapped axes
/// convolve periodically, the others replicate the edge sample.
pub fn smooth(volume: Array3<f64>, sigma: [f64; 3], wrap: [bool; 3]) -> Array3<f64> {
    let mut smoothed = volume;

    for axis in 0..3 {
        if sigma[axis] < MIN_SIGMA {
            continue;
        }
        let kernel = gaussian_kernel(sigma[axis]);
        let radius = (kernel.len() / 2) as i64;
        let len = smoothed.len_of(Axis(axis));
        let mut line = vec![0.0; len];

        for mut lane in smoothed.lanes_mut(Axis(axis)) {
            line.iter_mut().zip(lane.iter()).for_each(|(dst, &src)| *dst = src);
            for (i, out) in lane.iter_mut().enumerate() {
                *out = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, &w)| {
                        let j = i as i64 + k as i64 - radius;
                        let j = if wrap[axis] {
                            j.rem_euclid(len as i64)
                        } else {
                            j.clamp(0, len as i64 - 1)
                        };
                        w * line[j as usize]
                    })
                    .sum();
            }
        }
    }

    smoothed
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fwhm_to_sigma_scales_by_voxel_size() {
        let sigma = fwhm_to_sigma(5.0, &Vector3::new(2.0, 2.5, 5.0));

        assert_relative_eq!(sigma[0], 5.0 / 2.354_820_045 / 2.0, epsilon = 1e-6);
        assert_relative_eq!(sigma[2], 5.0 / 2.354_820_045 / 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_smoothing_preserves_constant_volume() {
        let volume = Array3::from_elem((6, 5, 4), 3.0);
        let smoothed = smooth(volume, [1.5, 1.0, 0.8], [false, true, false]);

        smoothed.iter().for_each(|&v| assert_relative_eq!(v, 3.0, epsilon = 1e-12));
    }

    #[test]
    fn test_smoothing_spreads_impulse_and_keeps_mass() {
        let mut volume = Array3::<f64>::zeros((15, 15, 15));
        volume[[7, 7, 7]] = 1.0;

        let smoothed = smooth(volume, [1.0, 1.0, 1.0], [false; 3]);

        assert!(smoothed[[7, 7, 7]] < 1.0);
        assert!(smoothed[[8, 7, 7]] > 0.0);
        assert_relative_eq!(smoothed[[6, 7, 7]], smoothed[[8, 7, 7]], epsilon = 1e-12);
        assert_relative_eq!(smoothed.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_fwhm_is_identity() {
        let volume = Array3::from_shape_fn((3, 3, 3), |(x, y, z)| (x + y * z) as f64);
        let sigma = fwhm_to_sigma(0.0, &Vector3::new(2.0, 2.0, 2.0));

        let smoothed = smooth(volume.clone(), sigma, [false; 3]);
        assert_eq!(smoothed, volume);
    }
}
