//! Geometry of voxel paths

use crate::volume::Volume;
use nalgebra::Vector3;

/// Physical position of every step of a voxel path
pub fn path_positions(volume: &Volume, voxel_path: &[usize]) -> Vec<Vector3<f64>> {
    voxel_path.iter().map(|&v| volume.voxel_position(v)).collect()
}

/// Integrated length of a voxel path
pub fn euclidean_path_length(volume: &Volume, voxel_path: &[usize]) -> f64 {
    path_positions(volume, voxel_path)
        .windows(2)
        .map(|step| (step[1] - step[0]).norm())
        .sum()
}

/// Straight-line distance between the ends of a voxel path, 0 for an
/// empty path
pub fn euclidean_distance(volume: &Volume, voxel_path: &[usize]) -> f64 {
    match (voxel_path.first(), voxel_path.last()) {
        (Some(&start), Some(&end)) => {
            (volume.voxel_position(end) - volume.voxel_position(start)).norm()
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn volume() -> Volume {
        let indices = vec![[0, 0, 0], [1, 0, 0], [1, 1, 0], [0, 1, 0]];
        Volume::new("E13.5", DMatrix::zeros(4, 1), indices, None).unwrap()
    }

    #[test]
    fn test_length_and_distance() {
        let v = volume();
        let path = [0, 1, 2, 3];
        // three unit steps of 100 µm, ending one step from the start
        assert!((euclidean_path_length(&v, &path) - 300.0).abs() < 1e-9);
        assert!((euclidean_distance(&v, &path) - 100.0).abs() < 1e-9);
        assert_eq!(path_positions(&v, &[2])[0], Vector3::new(100.0, 100.0, 0.0));
    }

    #[test]
    fn test_degenerate_paths() {
        let v = volume();
        assert_eq!(euclidean_path_length(&v, &[1]), 0.0);
        assert_eq!(euclidean_distance(&v, &[]), 0.0);
    }
}
