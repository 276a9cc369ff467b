//! SPDX-License-Identifier: GPL-3.0-or-later

//! The pose-extraction seam. The engine never runs a model itself; whatever
//! produces the 33x4 landmark matrix is injected behind this trait.

use std::sync::Mutex;

use crate::error::ErrorCode;
use crate::frame::FrameData;
use crate::landmarks::PoseLandmarks;

/// Capability that turns a decoded frame into a landmark matrix.
pub trait PoseExtractor: Send + Sync {
    fn extract(&self, frame: &FrameData) -> Result<PoseLandmarks, ErrorCode>;
}

/// Deterministic extractor for tests and replay: returns a canned sequence
/// of matrices, repeating the last one once the sequence is exhausted.
pub struct StubExtractor {
    sequence: Mutex<Vec<PoseLandmarks>>,
    cursor: Mutex<usize>,
}

impl StubExtractor {
    pub fn new(sequence: Vec<PoseLandmarks>) -> Self {
        StubExtractor {
            sequence: Mutex::new(sequence),
            cursor: Mutex::new(0),
        }
    }

    /// Extractor that yields the same matrix for every frame.
    pub fn constant(landmarks: PoseLandmarks) -> Self {
        Self::new(vec![landmarks])
    }

    /// Replaces the remaining sequence; the cursor restarts at the front.
    pub fn reload(&self, sequence: Vec<PoseLandmarks>) {
        *self.sequence.lock().expect("stub lock poisoned") = sequence;
        *self.cursor.lock().expect("stub lock poisoned") = 0;
    }
}

impl PoseExtractor for StubExtractor {
    fn extract(&self, _frame: &FrameData) -> Result<PoseLandmarks, ErrorCode> {
        let sequence = self.sequence.lock().expect("stub lock poisoned");
        if sequence.is_empty() {
            return Err(ErrorCode::FrameAnalysisError);
        }
        let mut cursor = self.cursor.lock().expect("stub lock poisoned");
        let index = (*cursor).min(sequence.len() - 1);
        *cursor += 1;
        Ok(sequence[index].clone())
    }
}
