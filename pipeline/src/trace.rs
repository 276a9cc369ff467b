//! SPDX-License-Identifier: GPL-3.0-or-later

//! Per-frame pipeline traces. The orchestrator appends one event per stage
//! to the session's current [`FrameTrace`]; a [`TraceWriter`] can drain
//! finished traces to a JSON-lines file on a dedicated thread without
//! stalling the hot path.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, tick, select, Sender, TrySendError};
use serde::Serialize;

/// Outcome of one pipeline stage for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub stage: &'static str,
    pub success: bool,
    pub detail: String,
}

/// All stage events for a single frame of a single session.
#[derive(Debug, Clone, Serialize)]
pub struct FrameTrace {
    pub session_id: String,
    pub frame_id: u64,
    pub started_at: DateTime<Utc>,
    pub events: Vec<TraceEvent>,
}

impl FrameTrace {
    pub fn new(session_id: String, frame_id: u64) -> Self {
        FrameTrace {
            session_id,
            frame_id,
            started_at: Utc::now(),
            events: Vec::new(),
        }
    }

    pub fn add_event(&mut self, stage: &'static str, success: bool, detail: impl Into<String>) {
        self.events.push(TraceEvent {
            stage,
            success,
            detail: detail.into(),
        });
    }
}

enum TraceMsg {
    Line(String),
    Shutdown,
}

/// Background JSON-lines writer. Bounded channel so a slow disk applies
/// backpressure to nobody: lines are dropped and counted instead.
pub struct TraceWriter {
    tx: Option<Sender<TraceMsg>>,
    handle: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
    activated: bool,
}

impl TraceWriter {
    /// A writer that swallows everything; used when tracing is disabled.
    pub fn disabled() -> Self {
        TraceWriter {
            tx: None,
            handle: None,
            dropped: Arc::new(AtomicU64::new(0)),
            activated: false,
        }
    }

    /// Creates the trace directory and spawns the writer thread. Lines are
    /// batched and flushed every 500ms or 256 lines, whichever comes first.
    pub fn new(dir: &Path) -> Result<Self, anyhow::Error> {
        fs::create_dir_all(dir)?;
        let file_name = format!("traces-{}.jsonl", Utc::now().format("%Y-%m-%dT%H-%M-%SZ"));
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(dir.join(file_name))?;

        let (tx, rx) = bounded::<TraceMsg>(4096);
        let handle = thread::Builder::new()
            .name("trace-writer".to_string())
            .spawn(move || {
                const BATCH_MAX: usize = 256;
                const FLUSH_EVERY: Duration = Duration::from_millis(500);

                let mut writer = BufWriter::new(file);
                let mut buf: Vec<String> = Vec::with_capacity(BATCH_MAX);
                let ticker = tick(FLUSH_EVERY);

                let flush = |writer: &mut BufWriter<std::fs::File>, buf: &mut Vec<String>| {
                    if buf.is_empty() {
                        return;
                    }
                    for line in buf.drain(..) {
                        let _ = writer.write_all(line.as_bytes());
                        let _ = writer.write_all(b"\n");
                    }
                    let _ = writer.flush();
                };

                loop {
                    select! {
                        recv(rx) -> msg => match msg {
                            Ok(TraceMsg::Line(line)) => {
                                buf.push(line);
                                if buf.len() >= BATCH_MAX {
                                    flush(&mut writer, &mut buf);
                                }
                            }
                            Ok(TraceMsg::Shutdown) | Err(_) => {
                                flush(&mut writer, &mut buf);
                                break;
                            }
                        },
                        recv(ticker) -> _ => flush(&mut writer, &mut buf),
                    }
                }
            })?;

        Ok(TraceWriter {
            tx: Some(tx),
            handle: Some(handle),
            dropped: Arc::new(AtomicU64::new(0)),
            activated: true,
        })
    }

    /// Enqueues a finished trace. Serialization happens on the caller side;
    /// a full queue drops the line rather than blocking the pipeline.
    pub fn write(&self, trace: &FrameTrace) {
        if !self.activated {
            return;
        }
        let Some(tx) = &self.tx else {
            return;
        };
        let Ok(line) = serde_json::to_string(trace) else {
            return;
        };
        match tx.try_send(TraceMsg::Line(line)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(TraceMsg::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
