//! NIfTI-1 volume reader and writer built on the `nifti` crate.
//!
//! Both `.nii` and `.nii.gz` are handled; compression follows the file extension.

use std::path::Path;

use nalgebra::{Matrix3, Matrix4, Vector3};
use ndarray::{Axis, Ix3, Ix4};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use tracing::debug;

use crate::realign_pipeline::common::error::{RealignError, Result};
use crate::realign_pipeline::volume::reader::VolumeReader;
use crate::realign_pipeline::volume::types::VolumeSeries;
use crate::realign_pipeline::volume::writer::VolumeWriter;

/// Reads and writes volume series as NIfTI-1 files.
pub struct NiftiVolumeIo;

/// NIfTI xform code for scanner-based anatomical coordinates.
const XFORM_SCANNER_ANAT: i16 = 1;

fn read_error(path: &Path, message: impl ToString) -> RealignError {
    RealignError::VolumeRead {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn write_error(path: &Path, message: impl ToString) -> RealignError {
    RealignError::VolumeWrite {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Voxel-to-world affine of a header: sform first, then qform, then bare voxel sizes.
pub(crate) fn header_affine(header: &NiftiHeader) -> Matrix4<f64> {
    if header.sform_code > 0 {
        let rows = [header.srow_x, header.srow_y, header.srow_z];
        let mut affine = Matrix4::identity();
        for (r, row) in rows.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                affine[(r, c)] = value as f64;
            }
        }
        return affine;
    }

    let voxel = |i: usize| {
        let size = header.pixdim[i].abs() as f64;
        if size > 0.0 { size } else { 1.0 }
    };

    if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();

        let rotation = Matrix3::new(
            a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c),
            2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b),
            2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b,
        );
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let scale = Matrix3::from_diagonal(&Vector3::new(voxel(1), voxel(2), qfac * voxel(3)));

        let mut affine = Matrix4::identity();
        affine.fixed_view_mut::<3, 3>(0, 0).copy_from(&(rotation * scale));
        affine[(0, 3)] = header.quatern_x as f64;
        affine[(1, 3)] = header.quatern_y as f64;
        affine[(2, 3)] = header.quatern_z as f64;
        return affine;
    }

    Matrix4::new_nonuniform_scaling(&Vector3::new(voxel(1), voxel(2), voxel(3)))
}

fn affine_header(affine: &Matrix4<f64>, voxel_size: &Vector3<f64>) -> NiftiHeader {
    let row = |r: usize| -> [f32; 4] {
        [
            affine[(r, 0)] as f32,
            affine[(r, 1)] as f32,
            affine[(r, 2)] as f32,
            affine[(r, 3)] as f32,
        ]
    };

    NiftiHeader {
        pixdim: [
            1.0,
            voxel_size.x as f32,
            voxel_size.y as f32,
            voxel_size.z as f32,
            1.0,
            1.0,
            1.0,
            1.0,
        ],
        scl_slope: 1.0,
        scl_inter: 0.0,
        qform_code: 0,
        sform_code: XFORM_SCANNER_ANAT,
        srow_x: row(0),
        srow_y: row(1),
        srow_z: row(2),
        ..NiftiHeader::default()
    }
}

impl VolumeReader for NiftiVolumeIo {
    fn read_volume(&self, path: &Path) -> Result<VolumeSeries> {
        debug!("Reading NIfTI volume {}", path.display());

        let object = ReaderOptions::new()
            .read_file(path)
            .map_err(|e| read_error(path, e))?;
        let affine = header_affine(object.header());

        let array = object
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(|e| read_error(path, e))?;

        let data = match array.ndim() {
            3 => array
                .into_dimensionality::<Ix3>()
                .map_err(|e| read_error(path, e))?
                .insert_axis(Axis(3)),
            4 => array
                .into_dimensionality::<Ix4>()
                .map_err(|e| read_error(path, e))?,
            n => {
                return Err(read_error(
                    path,
                    format!("expected a 3D or 4D volume, found {} dimensions", n),
                ));
            }
        };

        let series = VolumeSeries::new(data, affine)?;
        debug!(
            "Read {} volumes of {:?} from {}",
            series.len(),
            series.dims(),
            path.display()
        );
        Ok(series)
    }
}

impl VolumeWriter for NiftiVolumeIo {
    fn write_volume(&self, series: &VolumeSeries, path: &Path) -> Result<()> {
        if !series.has_uniform_affine() {
            return Err(write_error(
                path,
                "a NIfTI file holds a single affine but the series affines differ",
            ));
        }

        debug!(
            "Writing {} volumes of {:?} to {}",
            series.len(),
            series.dims(),
            path.display()
        );

        let header = affine_header(series.affine(0), &series.voxel_size(0));
        WriterOptions::new(path)
            .reference_header(&header)
            .write_nifti(series.data())
            .map_err(|e| write_error(path, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array4;

    fn sample_series() -> VolumeSeries {
        let data = Array4::from_shape_fn((5, 4, 3, 2), |(x, y, z, t)| {
            (x + 10 * y + 100 * z + 1000 * t) as f32
        });
        let mut affine = Matrix4::new_nonuniform_scaling(&Vector3::new(3.0, 3.0, 3.5));
        affine[(0, 3)] = -90.0;
        affine[(1, 3)] = -126.0;
        affine[(2, 3)] = -72.0;
        VolumeSeries::new(data, affine).unwrap()
    }

    #[test]
    fn test_written_volume_reads_back_with_affine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.nii");
        let series = sample_series();

        NiftiVolumeIo.write_volume(&series, &path).unwrap();
        let loaded = NiftiVolumeIo.read_volume(&path).unwrap();

        assert_eq!(loaded.dims(), [5, 4, 3]);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.data()[[4, 3, 2, 1]], 1234.0);
        assert_relative_eq!(*loaded.affine(1), *series.affine(0), epsilon = 1e-4);
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = NiftiVolumeIo.read_volume(&dir.path().join("absent.nii"));

        assert!(matches!(result, Err(RealignError::VolumeRead { .. })));
    }

    #[test]
    fn test_non_uniform_affines_are_rejected_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut shifted = Matrix4::identity();
        shifted[(0, 3)] = 1.0;
        let series = VolumeSeries::with_affines(
            Array4::zeros((2, 2, 2, 2)),
            vec![Matrix4::identity(), shifted],
        )
        .unwrap();

        let result = NiftiVolumeIo.write_volume(&series, &dir.path().join("out.nii"));
        assert!(matches!(result, Err(RealignError::VolumeWrite { .. })));
    }

    #[test]
    fn test_header_affine_falls_back_to_pixdim() {
        let header = NiftiHeader {
            pixdim: [1.0, 2.0, 2.5, 4.0, 1.0, 1.0, 1.0, 1.0],
            sform_code: 0,
            qform_code: 0,
            ..NiftiHeader::default()
        };

        let affine = header_affine(&header);
        assert_relative_eq!(
            affine,
            Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 2.5, 4.0))
        );
    }

    #[test]
    fn test_header_affine_from_identity_quaternion() {
        let header = NiftiHeader {
            pixdim: [1.0, 2.0, 2.0, 2.0, 1.0, 1.0, 1.0, 1.0],
            sform_code: 0,
            qform_code: 1,
            quatern_b: 0.0,
            quatern_c: 0.0,
            quatern_d: 0.0,
            quatern_x: 10.0,
            quatern_y: -5.0,
            quatern_z: 1.0,
            ..NiftiHeader::default()
        };

        let affine = header_affine(&header);
        assert_relative_eq!(affine[(0, 0)], 2.0);
        assert_relative_eq!(affine[(1, 1)], 2.0);
        assert_relative_eq!(affine[(2, 2)], 2.0);
        assert_relative_eq!(affine[(0, 3)], 10.0);
        assert_relative_eq!(affine[(1, 3)], -5.0);
        assert_relative_eq!(affine[(2, 3)], 1.0);
    }
}
