//! SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Utc};

use crate::error::ErrorCode;

/// One decoded video frame handed to the pipeline. Pixels are tightly packed
/// BGR bytes, row major.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl FrameData {
    pub fn new(frame_id: u64, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        FrameData {
            frame_id,
            width,
            height,
            pixels,
            received_at: Utc::now(),
        }
    }

    /// Structural validation before any analysis: non-zero dimensions and a
    /// buffer that holds exactly three channels per pixel.
    pub fn validate(&self) -> Result<(), ErrorCode> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.width == 0 || self.height == 0 || self.pixels.len() != expected {
            return Err(ErrorCode::FrameInitialValidationFailed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_three_channel_buffer() {
        let frame = FrameData::new(1, 2, 2, vec![0u8; 12]);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn rejects_short_buffer_and_zero_dims() {
        assert!(FrameData::new(1, 2, 2, vec![0u8; 11]).validate().is_err());
        assert!(FrameData::new(1, 0, 2, vec![]).validate().is_err());
    }
}
