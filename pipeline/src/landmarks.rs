//! SPDX-License-Identifier: GPL-3.0-or-later

//! The 33-point body landmark matrix produced by the pose extractor.
//!
//! Shape is 33 rows by 4 columns. Columns: x and y normalized to [0, 1],
//! z relative depth (negative is closer to the camera), visibility in [0, 1].

use ndarray::{Array2, ArrayView1, Axis};

pub const NUM_LANDMARKS: usize = 33;

/// Row indices into the landmark matrix.
#[allow(dead_code)]
pub mod landmark {
    pub const NOSE: usize = 0;
    pub const LEFT_EYE_INNER: usize = 1;
    pub const LEFT_EYE: usize = 2;
    pub const LEFT_EYE_OUTER: usize = 3;
    pub const RIGHT_EYE_INNER: usize = 4;
    pub const RIGHT_EYE: usize = 5;
    pub const RIGHT_EYE_OUTER: usize = 6;
    pub const LEFT_EAR: usize = 7;
    pub const RIGHT_EAR: usize = 8;
    pub const MOUTH_LEFT: usize = 9;
    pub const MOUTH_RIGHT: usize = 10;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    pub const LEFT_PINKY: usize = 17;
    pub const RIGHT_PINKY: usize = 18;
    pub const LEFT_INDEX: usize = 19;
    pub const RIGHT_INDEX: usize = 20;
    pub const LEFT_THUMB: usize = 21;
    pub const RIGHT_THUMB: usize = 22;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
    pub const LEFT_KNEE: usize = 25;
    pub const RIGHT_KNEE: usize = 26;
    pub const LEFT_ANKLE: usize = 27;
    pub const RIGHT_ANKLE: usize = 28;
    pub const LEFT_HEEL: usize = 29;
    pub const RIGHT_HEEL: usize = 30;
    pub const LEFT_FOOT_INDEX: usize = 31;
    pub const RIGHT_FOOT_INDEX: usize = 32;
}

/// Left-side landmark rows, used by the position-side detector.
pub const LEFT_LANDMARKS: [usize; 15] = [
    landmark::LEFT_EYE_INNER,
    landmark::LEFT_EYE,
    landmark::LEFT_EYE_OUTER,
    landmark::LEFT_EAR,
    landmark::LEFT_SHOULDER,
    landmark::LEFT_ELBOW,
    landmark::LEFT_WRIST,
    landmark::LEFT_PINKY,
    landmark::LEFT_INDEX,
    landmark::LEFT_THUMB,
    landmark::LEFT_HIP,
    landmark::LEFT_KNEE,
    landmark::LEFT_ANKLE,
    landmark::LEFT_HEEL,
    landmark::LEFT_FOOT_INDEX,
];

/// Right-side landmark rows.
pub const RIGHT_LANDMARKS: [usize; 15] = [
    landmark::RIGHT_EYE_INNER,
    landmark::RIGHT_EYE,
    landmark::RIGHT_EYE_OUTER,
    landmark::RIGHT_EAR,
    landmark::RIGHT_SHOULDER,
    landmark::RIGHT_ELBOW,
    landmark::RIGHT_WRIST,
    landmark::RIGHT_PINKY,
    landmark::RIGHT_INDEX,
    landmark::RIGHT_THUMB,
    landmark::RIGHT_HIP,
    landmark::RIGHT_KNEE,
    landmark::RIGHT_ANKLE,
    landmark::RIGHT_HEEL,
    landmark::RIGHT_FOOT_INDEX,
];

/// Owned 33x4 landmark matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseLandmarks(Array2<f32>);

impl PoseLandmarks {
    /// Wraps a matrix, rejecting anything that is not 33x4.
    pub fn new(matrix: Array2<f32>) -> Option<Self> {
        if matrix.shape() == [NUM_LANDMARKS, 4] {
            Some(PoseLandmarks(matrix))
        } else {
            None
        }
    }

    /// Builds from 33 rows of `[x, y, z, visibility]`.
    pub fn from_rows(rows: &[[f32; 4]]) -> Option<Self> {
        if rows.len() != NUM_LANDMARKS {
            return None;
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((NUM_LANDMARKS, 4), flat)
            .ok()
            .map(PoseLandmarks)
    }

    pub fn matrix(&self) -> &Array2<f32> {
        &self.0
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f32> {
        self.0.row(index)
    }

    fn column_clean(&self, column: usize) -> Vec<f32> {
        // NaN values are substituted with 0.0 before any comparison.
        self.0
            .index_axis(Axis(1), column)
            .iter()
            .map(|v| if v.is_nan() { 0.0 } else { *v })
            .collect()
    }

    pub fn xs(&self) -> Vec<f32> {
        self.column_clean(0)
    }

    pub fn ys(&self) -> Vec<f32> {
        self.column_clean(1)
    }

    pub fn visibilities(&self) -> Vec<f32> {
        self.column_clean(3)
    }

    pub fn visibility(&self, index: usize) -> f32 {
        let v = self.0[[index, 3]];
        if v.is_nan() {
            0.0
        } else {
            v
        }
    }

    /// Screen-space footprint of the pose in normalized units.
    pub fn bbox_area(&self) -> f32 {
        let xs = self.xs();
        let ys = self.ys();
        let (mut min_x, mut max_x) = (f32::MAX, f32::MIN);
        let (mut min_y, mut max_y) = (f32::MAX, f32::MIN);
        for &x in &xs {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
        }
        for &y in &ys {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        (max_x - min_x) * (max_y - min_y)
    }

    /// Mean Euclidean displacement of (x, y) across all landmarks versus a
    /// previous matrix. Measures camera shake and detection glitches.
    pub fn mean_delta(&self, previous: &PoseLandmarks) -> f32 {
        let cur_x = self.xs();
        let cur_y = self.ys();
        let prev_x = previous.xs();
        let prev_y = previous.ys();
        let mut total = 0.0f32;
        for i in 0..NUM_LANDMARKS {
            let dx = cur_x[i] - prev_x[i];
            let dy = cur_y[i] - prev_y[i];
            total += (dx * dx + dy * dy).sqrt();
        }
        total / NUM_LANDMARKS as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(x: f32, y: f32, vis: f32) -> PoseLandmarks {
        PoseLandmarks::from_rows(&[[x, y, 0.0, vis]; NUM_LANDMARKS]).unwrap()
    }

    #[test]
    fn rejects_wrong_shape() {
        assert!(PoseLandmarks::new(Array2::zeros((10, 4))).is_none());
        assert!(PoseLandmarks::new(Array2::zeros((33, 3))).is_none());
    }

    #[test]
    fn bbox_area_of_spread_points() {
        let mut rows = [[0.5f32, 0.5, 0.0, 1.0]; NUM_LANDMARKS];
        rows[0] = [0.2, 0.1, 0.0, 1.0];
        rows[1] = [0.8, 0.9, 0.0, 1.0];
        let lm = PoseLandmarks::from_rows(&rows).unwrap();
        let area = lm.bbox_area();
        assert!((area - 0.48).abs() < 1e-5, "area {area}");
    }

    #[test]
    fn nan_visibility_reads_as_zero() {
        let mut rows = [[0.5f32, 0.5, 0.0, 1.0]; NUM_LANDMARKS];
        rows[3][3] = f32::NAN;
        let lm = PoseLandmarks::from_rows(&rows).unwrap();
        assert_eq!(lm.visibility(3), 0.0);
    }

    #[test]
    fn mean_delta_of_shifted_pose() {
        let a = uniform(0.5, 0.5, 1.0);
        let b = uniform(0.5, 0.6, 1.0);
        let delta = a.mean_delta(&b);
        assert!((delta - 0.1).abs() < 1e-5, "delta {delta}");
    }
}
