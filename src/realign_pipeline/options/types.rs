//! Realignment option types

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::realign_pipeline::common::error::{RealignError, Result};

/// B-spline degrees the estimator accepts: 1 (trilinear) to 7.
pub const MIN_INTERP_DEGREE: u8 = 1;
pub const MAX_INTERP_DEGREE: u8 = 7;

/// Options for rigid-body realignment.
///
/// The field set mirrors the "estimate" configuration of the realignment
/// library the brick was modelled on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealignOptions {
    /// Speed/accuracy trade-off in (0, 1]: fraction of sample points kept
    pub quality: f64,
    /// FWHM in mm of the Gaussian applied before estimation
    pub fwhm: f64,
    /// Spacing in mm between sample points in the reference
    pub sep: f64,
    /// Register to mean: realign to the first volume, then to the mean of the aligned series
    pub rtm: bool,
    /// Axes (x, y, z) on which the field of view wraps around
    pub wrap: [bool; 3],
    /// B-spline interpolation degree (1 = trilinear)
    pub interp: u8,
    /// Dry run: only resolve defaults, perform no I/O
    pub test: bool,
}

impl Default for RealignOptions {
    fn default() -> Self {
        Self {
            quality: 0.9,
            fwhm: 5.0,
            sep: 4.0,
            rtm: true,
            wrap: [false, false, false],
            interp: 2,
            test: false,
        }
    }
}

impl RealignOptions {
    pub fn builder() -> RealignOptionsBuilder {
        RealignOptionsBuilder::default()
    }

    /// Parses a partial options record and merges it over the defaults.
    ///
    /// Unknown keys are rejected.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let partial: RealignOptionsBuilder = serde_json::from_str(json)?;
        Ok(partial.build())
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(RealignOptionsBuilder::from_json_file(path)?.build())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(RealignError::invalid_option(
                "quality",
                format!("expected a value in (0, 1], got {}", self.quality),
            ));
        }
        if !(self.fwhm >= 0.0) || !self.fwhm.is_finite() {
            return Err(RealignError::invalid_option(
                "fwhm",
                format!("expected a non-negative value, got {}", self.fwhm),
            ));
        }
        if !(self.sep > 0.0) || !self.sep.is_finite() {
            return Err(RealignError::invalid_option(
                "sep",
                format!("expected a positive value, got {}", self.sep),
            ));
        }
        if !(MIN_INTERP_DEGREE..=MAX_INTERP_DEGREE).contains(&self.interp) {
            return Err(RealignError::invalid_option(
                "interp",
                format!(
                    "expected a degree in {}..={}, got {}",
                    MIN_INTERP_DEGREE, MAX_INTERP_DEGREE, self.interp
                ),
            ));
        }
        Ok(())
    }
}

/// Builder for RealignOptions
///
/// Doubles as the partial options record: every field is optional and unset
/// fields fall back to [`RealignOptions::default`] in [`build`](Self::build).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RealignOptionsBuilder {
    quality: Option<f64>,
    fwhm: Option<f64>,
    sep: Option<f64>,
    rtm: Option<bool>,
    wrap: Option<[bool; 3]>,
    interp: Option<u8>,
    test: Option<bool>,
}

impl RealignOptionsBuilder {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn quality(mut self, quality: f64) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn fwhm(mut self, fwhm: f64) -> Self {
        self.fwhm = Some(fwhm);
        self
    }

    pub fn sep(mut self, sep: f64) -> Self {
        self.sep = Some(sep);
        self
    }

    pub fn rtm(mut self, rtm: bool) -> Self {
        self.rtm = Some(rtm);
        self
    }

    pub fn wrap(mut self, wrap: [bool; 3]) -> Self {
        self.wrap = Some(wrap);
        self
    }

    pub fn interp(mut self, degree: u8) -> Self {
        self.interp = Some(degree);
        self
    }

    pub fn test(mut self, test: bool) -> Self {
        self.test = Some(test);
        self
    }

    /// Overlays every field set in `other` onto `self`.
    pub fn merge(self, other: RealignOptionsBuilder) -> Self {
        Self {
            quality: other.quality.or(self.quality),
            fwhm: other.fwhm.or(self.fwhm),
            sep: other.sep.or(self.sep),
            rtm: other.rtm.or(self.rtm),
            wrap: other.wrap.or(self.wrap),
            interp: other.interp.or(self.interp),
            test: other.test.or(self.test),
        }
    }

    pub fn build(self) -> RealignOptions {
        let default = RealignOptions::default();
        RealignOptions {
            quality: self.quality.unwrap_or(default.quality),
            fwhm: self.fwhm.unwrap_or(default.fwhm),
            sep: self.sep.unwrap_or(default.sep),
            rtm: self.rtm.unwrap_or(default.rtm),
            wrap: self.wrap.unwrap_or(default.wrap),
            interp: self.interp.unwrap_or(default.interp),
            test: self.test.unwrap_or(default.test),
        }
    }
}
