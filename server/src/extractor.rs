//! SPDX-License-Identifier: GPL-3.0-or-later

//! Pose extraction over a sidecar process. The heavy landmark model runs
//! out of process; per frame we hand it the raw BGR buffer on stdin and
//! parse a 33x4 float matrix from its stdout.
//!
//! Protocol: one header line `<width> <height>\n`, then `width * height * 3`
//! BGR bytes. The sidecar answers with a single JSON line: an array of 33
//! `[x, y, z, visibility]` rows.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use bodytrack_pipeline::error::ErrorCode;
use bodytrack_pipeline::extract::PoseExtractor;
use bodytrack_pipeline::frame::FrameData;
use bodytrack_pipeline::landmarks::{PoseLandmarks, NUM_LANDMARKS};
use log::error;

pub struct CommandExtractor {
    program: PathBuf,
}

impl CommandExtractor {
    pub fn new(program: PathBuf) -> Self {
        CommandExtractor { program }
    }
}

impl PoseExtractor for CommandExtractor {
    fn extract(&self, frame: &FrameData) -> Result<PoseLandmarks, ErrorCode> {
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                error!("cannot spawn pose extractor {}: {e}", self.program.display());
                ErrorCode::FrameAnalysisError
            })?;

        {
            let stdin = child.stdin.as_mut().ok_or(ErrorCode::FrameAnalysisError)?;
            stdin
                .write_all(format!("{} {}\n", frame.width, frame.height).as_bytes())
                .and_then(|_| stdin.write_all(&frame.pixels))
                .map_err(|e| {
                    error!("pose extractor stdin write failed: {e}");
                    ErrorCode::FrameAnalysisError
                })?;
        }

        let stdout = child.stdout.take().ok_or(ErrorCode::FrameAnalysisError)?;
        let mut line = String::new();
        BufReader::new(stdout).read_line(&mut line).map_err(|e| {
            error!("pose extractor stdout read failed: {e}");
            ErrorCode::FrameAnalysisError
        })?;
        let _ = child.wait();

        let rows: Vec<[f32; 4]> = serde_json::from_str(line.trim()).map_err(|e| {
            error!("pose extractor returned malformed landmarks: {e}");
            ErrorCode::FrameAnalysisError
        })?;
        if rows.len() != NUM_LANDMARKS {
            error!("pose extractor returned {} rows, expected {NUM_LANDMARKS}", rows.len());
            return Err(ErrorCode::FrameAnalysisError);
        }
        PoseLandmarks::from_rows(&rows).ok_or(ErrorCode::FrameAnalysisError)
    }
}
