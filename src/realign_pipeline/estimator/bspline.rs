//! B-spline interpolation of 3D volumes.
//!
//! Degree 1 is trilinear interpolation on the raw samples. Degrees 2 to 7
//! first convert the samples to B-spline coefficients with the recursive
//! prefilter of Unser/Thévenaz (mirror boundaries), then evaluate the
//! cardinal B-spline basis around each point.

use nalgebra::Vector3;
use ndarray::{Array3, Axis};

/// Filter poles per degree, index 0 is degree 2.
const POLES: [&[f64]; 6] = [
    &[-0.171_572_875_253_809_9],
    &[-0.267_949_192_431_122_7],
    &[-0.361_341_225_900_220_2, -0.013_725_429_297_339_12],
    &[-0.430_575_347_099_973_8, -0.043_096_288_203_264_65],
    &[-0.488_294_589_303_044_8, -0.081_679_271_076_237_51, -0.001_414_151_808_325_818],
    &[-0.535_280_430_796_438_2, -0.122_554_615_192_326_7, -0.009_148_694_809_608_277],
];

const MAX_DEGREE: usize = 7;
const PREFILTER_TOLERANCE: f64 = 1e-10;
/// Slack allowed beyond the outermost voxel centre before a point counts as outside.
const FOV_TOLERANCE: f64 = 1e-5;

/// Prefiltered volume ready for interpolation.
#[derive(Debug, Clone)]
pub struct BSplineVolume {
    coefficients: Array3<f64>,
    degree: usize,
    wrap: [bool; 3],
}

/// Contributing indices and weights along one axis.
struct AxisWeights {
    len: usize,
    indices: [usize; MAX_DEGREE + 1],
    weights: [f64; MAX_DEGREE + 1],
    derivatives: [f64; MAX_DEGREE + 1],
}

impl BSplineVolume {
    /// `degree` must be in 1..=7; `wrap` marks axes sampled periodically.
    pub fn new(volume: Array3<f64>, degree: u8, wrap: [bool; 3]) -> Self {
        let degree = (degree as usize).clamp(1, MAX_DEGREE);
        let mut coefficients = volume;

        if degree >= 2 {
            let poles = POLES[degree - 2];
            for axis in 0..3 {
                let mut line = Vec::with_capacity(coefficients.len_of(Axis(axis)));
                for mut lane in coefficients.lanes_mut(Axis(axis)) {
                    line.clear();
                    line.extend(lane.iter().copied());
                    prefilter_line(&mut line, poles);
                    lane.iter_mut().zip(&line).for_each(|(c, &v)| *c = v);
                }
            }
        }

        Self {
            coefficients,
            degree,
            wrap,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        let shape = self.coefficients.shape();
        [shape[0], shape[1], shape[2]]
    }

    /// Whether `point` (voxel coordinates) lies inside the field of view.
    /// Wrapped axes never exclude a point.
    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        let dims = self.dims();
        (0..3).all(|a| {
            self.wrap[a]
                || (point[a] >= -FOV_TOLERANCE && point[a] <= (dims[a] - 1) as f64 + FOV_TOLERANCE)
        })
    }

    pub fn sample(&self, point: &Vector3<f64>) -> f64 {
        let [wx, wy, wz] = self.axis_weights(point, false);
        let mut value = 0.0;
        for k in 0..wz.len {
            for j in 0..wy.len {
                let wyz = wy.weights[j] * wz.weights[k];
                for i in 0..wx.len {
                    value += wx.weights[i]
                        * wyz
                        * self.coefficients[[wx.indices[i], wy.indices[j], wz.indices[k]]];
                }
            }
        }
        value
    }

    /// Interpolated value and its gradient with respect to voxel coordinates.
    pub fn sample_with_gradient(&self, point: &Vector3<f64>) -> (f64, Vector3<f64>) {
        let [wx, wy, wz] = self.axis_weights(point, true);
        let mut value = 0.0;
        let mut gradient = Vector3::zeros();
        for k in 0..wz.len {
            for j in 0..wy.len {
                for i in 0..wx.len {
                    let c = self.coefficients[[wx.indices[i], wy.indices[j], wz.indices[k]]];
                    value += wx.weights[i] * wy.weights[j] * wz.weights[k] * c;
                    gradient.x += wx.derivatives[i] * wy.weights[j] * wz.weights[k] * c;
                    gradient.y += wx.weights[i] * wy.derivatives[j] * wz.weights[k] * c;
                    gradient.z += wx.weights[i] * wy.weights[j] * wz.derivatives[k] * c;
                }
            }
        }
        (value, gradient)
    }

    fn axis_weights(&self, point: &Vector3<f64>, with_derivatives: bool) -> [AxisWeights; 3] {
        let dims = self.dims();
        [0, 1, 2].map(|a| {
            let x = point[a];
            let mut first = if self.degree % 2 == 1 {
                x.floor() as i64 - (self.degree / 2) as i64
            } else {
                (x + 0.5).floor() as i64 - (self.degree / 2) as i64
            };
            if self.degree == 1 && !self.wrap[a] && dims[a] > 1 {
                // Keep both trilinear taps inside the volume at the far edge.
                first = first.clamp(0, dims[a] as i64 - 2);
            }

            let mut axis = AxisWeights {
                len: self.degree + 1,
                indices: [0; MAX_DEGREE + 1],
                weights: [0.0; MAX_DEGREE + 1],
                derivatives: [0.0; MAX_DEGREE + 1],
            };
            for k in 0..=self.degree {
                let index = first + k as i64;
                let t = x - index as f64;
                axis.indices[k] = boundary_index(index, dims[a], self.wrap[a]);
                axis.weights[k] = bspline(self.degree, t);
                if with_derivatives {
                    // The trilinear derivative is taken on the cell containing x, so it
                    // stays defined on grid points.
                    axis.derivatives[k] = if self.degree == 1 {
                        if k == 0 { -1.0 } else { 1.0 }
                    } else {
                        bspline(self.degree - 1, t + 0.5) - bspline(self.degree - 1, t - 0.5)
                    };
                }
            }
            axis
        })
    }
}

/// Maps an unbounded grid index into `0..len`: periodic when wrapping, mirrored otherwise.
fn boundary_index(index: i64, len: usize, wrap: bool) -> usize {
    let len = len as i64;
    if len == 1 {
        return 0;
    }
    if wrap {
        return index.rem_euclid(len) as usize;
    }
    let period = 2 * (len - 1);
    let folded = index.rem_euclid(period);
    (if folded >= len { period - folded } else { folded }) as usize
}

/// Centred cardinal B-spline of the given degree evaluated at `t`.
fn bspline(degree: usize, t: f64) -> f64 {
    let half = (degree + 1) as f64 / 2.0;
    let at = t.abs();
    if at >= half {
        return 0.0;
    }

    // Truncated power form: sum_k (-1)^k C(n+1, k) (t + (n+1)/2 - k)_+^n / n!
    let n = degree as i32;
    let mut sum = 0.0;
    let mut binomial = 1.0;
    for k in 0..=degree + 1 {
        let u = t + half - k as f64;
        if u > 0.0 {
            let term = binomial * u.powi(n);
            sum += if k % 2 == 0 { term } else { -term };
        }
        binomial = binomial * (degree + 1 - k) as f64 / (k + 1) as f64;
    }
    let factorial: f64 = (1..=degree).map(|i| i as f64).product();
    sum / factorial
}

fn prefilter_line(line: &mut [f64], poles: &[f64]) {
    let n = line.len();
    if n < 2 {
        return;
    }

    let gain: f64 = poles.iter().map(|&z| (1.0 - z) * (1.0 - 1.0 / z)).product();
    line.iter_mut().for_each(|c| *c *= gain);

    for &z in poles {
        line[0] = initial_causal(line, z);
        for k in 1..n {
            line[k] += z * line[k - 1];
        }
        line[n - 1] = initial_anticausal(line, z);
        for k in (0..n - 1).rev() {
            line[k] = z * (line[k + 1] - line[k]);
        }
    }
}

fn initial_causal(line: &[f64], z: f64) -> f64 {
    let n = line.len();
    let horizon = (PREFILTER_TOLERANCE.ln() / z.abs().ln()).ceil() as usize;

    if horizon < n {
        let mut zn = z;
        let mut sum = line[0];
        for &c in &line[1..horizon] {
            sum += zn * c;
            zn *= z;
        }
        return sum;
    }

    // Full mirror-symmetric sum for short lines
    let iz = 1.0 / z;
    let mut zn = z;
    let mut z2n = z.powi((n - 1) as i32);
    let mut sum = line[0] + z2n * line[n - 1];
    z2n *= z2n * iz;
    for &c in &line[1..n - 1] {
        sum += (zn + z2n) * c;
        zn *= z;
        z2n *= iz;
    }
    sum / (1.0 - zn * zn)
}

fn initial_anticausal(line: &[f64], z: f64) -> f64 {
    let n = line.len();
    (z / (z * z - 1.0)) * (z * line[n - 2] + line[n - 1])
}
