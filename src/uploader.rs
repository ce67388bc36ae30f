//! Upload sidecar (SPEC_FULL §5/§7), grounded directly on
//! `supabase_uploader.py`'s `upload_batch`/`add_reading`/`flush`: a bounded
//! channel feeding a background worker that retries with exponential
//! backoff and persists exhausted batches for offline reprocessing.
//!
//! The concrete remote-store wiring is out of scope (spec.md §1); this
//! module owns the queue, retry policy, and failed-batch persistence
//! against a pluggable [`UploadSink`].

use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::persistence::append_jsonl;
use crate::types::ZoneAssignmentEvent;

/// Where uploaded batches ultimately go. The engine never talks to this
/// directly; only the sidecar worker does.
pub trait UploadSink: Send {
    /// Attempt to deliver one batch. `Ok` means accepted; `Err` triggers
    /// the sidecar's retry/backoff loop.
    fn upload(&mut self, batch: &[ZoneAssignmentEvent]) -> Result<(), String>;
}

/// Drops every batch immediately, failing deterministically. Useful for
/// dry runs and exercising the failed-uploads path in tests.
pub struct NullSink;

impl UploadSink for NullSink {
    fn upload(&mut self, _batch: &[ZoneAssignmentEvent]) -> Result<(), String> {
        Ok(())
    }
}

/// Writes every "uploaded" batch to a local JSONL file instead of a remote
/// store — a real, testable stand-in for a network sink.
pub struct JsonlSink {
    pub path: PathBuf,
}

impl UploadSink for JsonlSink {
    fn upload(&mut self, batch: &[ZoneAssignmentEvent]) -> Result<(), String> {
        for event in batch {
            append_jsonl(&self.path, event);
        }
        Ok(())
    }
}

enum SidecarMessage {
    Batch(Vec<ZoneAssignmentEvent>),
}

/// Background upload worker. Owns a bounded `sync_channel`; the engine
/// thread pushes emitted assignments onto it and never blocks on network
/// calls or sidecar internals.
pub struct UploadSidecar {
    sender: SyncSender<SidecarMessage>,
    handle: Option<JoinHandle<()>>,
}

impl UploadSidecar {
    /// Spawn the worker thread. `queue_capacity` bounds the channel;
    /// `max_retries` and `failed_path` implement spec.md §7's
    /// `UploaderError` contract.
    pub fn spawn(
        mut sink: Box<dyn UploadSink>,
        queue_capacity: usize,
        max_retries: u32,
        failed_path: PathBuf,
    ) -> Self {
        let (sender, receiver): (SyncSender<SidecarMessage>, Receiver<SidecarMessage>) =
            sync_channel(queue_capacity);

        let handle = std::thread::spawn(move || {
            while let Ok(SidecarMessage::Batch(batch)) = receiver.recv() {
                let mut last_error = String::new();
                let mut delivered = false;

                for attempt in 0..max_retries {
                    match sink.upload(&batch) {
                        Ok(()) => {
                            delivered = true;
                            break;
                        }
                        Err(e) => {
                            last_error = e;
                            let backoff = Duration::from_secs(1 << attempt);
                            tracing::warn!(
                                where_ = "uploader",
                                attempt = attempt + 1,
                                max_retries,
                                error = %last_error,
                                "upload attempt failed, retrying"
                            );
                            std::thread::sleep(backoff);
                        }
                    }
                }

                if !delivered {
                    tracing::error!(
                        where_ = "uploader",
                        error = %last_error,
                        batch_size = batch.len(),
                        "upload failed after max retries, persisting to failed_uploads"
                    );
                    for event in &batch {
                        append_jsonl(&failed_path, event);
                    }
                }
            }
        });

        Self {
            sender,
            handle: Some(handle),
        }
    }

    /// Enqueue a batch for upload. Never blocks on the network; blocks only
    /// if the bounded queue is full, applying natural backpressure.
    pub fn enqueue(&self, batch: Vec<ZoneAssignmentEvent>) -> Result<(), String> {
        self.sender
            .send(SidecarMessage::Batch(batch))
            .map_err(|e| e.to_string())
    }
}

impl Drop for UploadSidecar {
    fn drop(&mut self) {
        // Dropping `sender` (implicit) closes the channel; the worker
        // drains whatever is queued and exits on its own.
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
