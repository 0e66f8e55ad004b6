use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::realign_pipeline::artifacts::{create_output, output_error};
use crate::realign_pipeline::common::error::{RealignError, Result};
use crate::realign_pipeline::transform::MotionParameters;

/// Writes one whitespace-delimited row `tx ty tz yaw roll pitch` per timepoint.
///
/// Columns are right-aligned to 14 characters and always separated by at least one space.
pub fn write_parameters(path: &Path, parameters: &[MotionParameters]) -> Result<()> {
    debug!("Writing {} parameter rows to {}", parameters.len(), path.display());

    let mut writer = create_output(path)?;
    for motion in parameters {
        let line: String = motion.row().iter().map(|v| format!(" {:>13.6}", v)).collect();
        writeln!(writer, "{}", line).map_err(|e| output_error(path, e))?;
    }
    writer.flush().map_err(|e| output_error(path, e))
}

/// Parses a parameter file back into rows of six values.
pub fn read_parameters(path: &Path) -> Result<Vec<[f64; 6]>> {
    let text = std::fs::read_to_string(path)?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            let values = line
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    RealignError::InvalidArgument(format!(
                        "{}:{}: {}",
                        path.display(),
                        number + 1,
                        e
                    ))
                })?;
            <[f64; 6]>::try_from(values).map_err(|values| {
                RealignError::InvalidArgument(format!(
                    "{}:{}: expected 6 columns, found {}",
                    path.display(),
                    number + 1,
                    values.len()
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_one_row_per_timepoint_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rp.txt");
        let rows = [
            MotionParameters { translation: [0.0; 3], rotation: [0.0; 3] },
            MotionParameters { translation: [2.0, -0.25, 0.0], rotation: [0.5, 0.0, -1.0] },
            MotionParameters { translation: [1.0, 0.0, 0.125], rotation: [0.0, 0.1, 0.0] },
        ];

        write_parameters(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed = read_parameters(&path).unwrap();

        assert_eq!(text.lines().count(), 3);
        assert_eq!(parsed.len(), 3);
        assert_relative_eq!(parsed[1][0], 2.0);
        assert_relative_eq!(parsed[1][1], -0.25);
        assert_relative_eq!(parsed[1][5], -1.0);
        assert_relative_eq!(parsed[2][2], 0.125);
    }

    #[test]
    fn test_wide_values_stay_separate_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rp.txt");
        let rows = [MotionParameters {
            translation: [-123456.5, 2500000.25, -9999999.0],
            rotation: [1.0e6, -1.0e5, 0.5],
        }];

        write_parameters(&path, &rows).unwrap();
        let parsed = read_parameters(&path).unwrap();

        assert_eq!(parsed.len(), 1);
        assert_relative_eq!(parsed[0][0], -123456.5);
        assert_relative_eq!(parsed[0][1], 2500000.25);
        assert_relative_eq!(parsed[0][2], -9999999.0);
        assert_relative_eq!(parsed[0][3], 1.0e6);
        assert_relative_eq!(parsed[0][4], -1.0e5);
    }

    #[test]
    fn test_read_rejects_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rp.txt");
        std::fs::write(&path, "0 0 0 0 0 0\n1 2 3\n").unwrap();

        assert!(matches!(
            read_parameters(&path),
            Err(RealignError::InvalidArgument(_))
        ));
    }
}
