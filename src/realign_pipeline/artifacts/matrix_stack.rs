use std::io::{BufReader, Write};
use std::path::Path;

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::realign_pipeline::artifacts::{create_output, output_error};
use crate::realign_pipeline::common::error::{RealignError, Result};

/// A time-ordered stack of 4×4 matrices, stored as `{ "shape": [4, 4, T], "matrices": [...] }`
/// with each matrix written row by row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixStack {
    shape: [usize; 3],
    matrices: Vec<[[f64; 4]; 4]>,
}

impl MatrixStack {
    pub fn from_matrices(matrices: &[Matrix4<f64>]) -> Self {
        Self {
            shape: [4, 4, matrices.len()],
            matrices: matrices
                .iter()
                .map(|m| std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)])))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn to_matrices(&self) -> Vec<Matrix4<f64>> {
        self.matrices
            .iter()
            .map(|rows| Matrix4::from_fn(|r, c| rows[r][c]))
            .collect()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        debug!("Writing {} matrices to {}", self.len(), path.display());
        let mut writer = create_output(path)?;
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| output_error(path, e))?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|e| output_error(path, e))
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let stack: MatrixStack = serde_json::from_reader(BufReader::new(file))?;
        if stack.shape != [4, 4, stack.matrices.len()] {
            return Err(RealignError::InvalidArgument(format!(
                "{}: shape {:?} does not describe {} 4x4 matrices",
                path.display(),
                stack.shape,
                stack.matrices.len()
            )));
        }
        Ok(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_keeps_time_order_and_layout() {
        let mut second = Matrix4::identity();
        second[(0, 3)] = 2.0;
        second[(2, 1)] = -0.5;
        let stack = MatrixStack::from_matrices(&[Matrix4::identity(), second]);

        assert_eq!(stack.shape(), [4, 4, 2]);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.to_matrices(), vec![Matrix4::identity(), second]);
    }

    #[test]
    fn test_json_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w2w.json");
        let mut shifted = Matrix4::identity();
        shifted[(1, 3)] = 3.5;

        MatrixStack::from_matrices(&[shifted]).write_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["shape"], serde_json::json!([4, 4, 1]));
        assert_eq!(json["matrices"][0][1][3], serde_json::json!(3.5));
        assert_eq!(MatrixStack::read_json(&path).unwrap().to_matrices(), vec![shifted]);
    }

    #[test]
    fn test_read_rejects_inconsistent_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "shape": [4, 4, 3], "matrices": [] }"#).unwrap();

        assert!(matches!(
            MatrixStack::read_json(&path),
            Err(RealignError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("v2w.json");

        let result = MatrixStack::from_matrices(&[Matrix4::identity()]).write_json(&path);
        assert!(matches!(result, Err(RealignError::OutputWrite { .. })));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_json_write_reports_path() {
        let path = Path::new("/dev/full");
        let matrices = vec![Matrix4::identity(); 512];

        let result = MatrixStack::from_matrices(&matrices).write_json(path);

        match result {
            Err(RealignError::OutputWrite { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected OutputWrite, got {:?}", other),
        }
    }
}
