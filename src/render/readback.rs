//! Optional asynchronous readback of the visibility counter.
//!
//! Off the critical path: the copy is recorded into the frame's encoder, the
//! map is requested after submit, and results are picked up by a non-blocking
//! poll on a later frame. A failed map is logged and dropped.

use std::sync::mpsc::{self, Receiver, TryRecvError};

/// Where a readback is in its lifecycle.
#[derive(Debug)]
enum ReadbackState {
    Idle,
    /// Copy recorded, not yet submitted
    Copied { frame: u64 },
    /// Map requested, waiting on the device
    Pending { frame: u64, rx: Receiver<Result<(), String>> },
}

#[derive(Debug, PartialEq, Eq)]
enum MapStatus {
    NotPending,
    Waiting,
    Ready { frame: u64 },
    Failed { frame: u64, reason: String },
}

impl ReadbackState {
    fn is_idle(&self) -> bool {
        matches!(self, ReadbackState::Idle)
    }

    /// Resolve a pending map without blocking. Ready and Failed return to Idle.
    fn check(&mut self) -> MapStatus {
        let ReadbackState::Pending { frame, rx } = self else {
            return MapStatus::NotPending;
        };
        let frame = *frame;
        let status = match rx.try_recv() {
            Ok(Ok(())) => MapStatus::Ready { frame },
            Ok(Err(reason)) => MapStatus::Failed { frame, reason },
            Err(TryRecvError::Empty) => return MapStatus::Waiting,
            Err(TryRecvError::Disconnected) => MapStatus::Failed {
                frame,
                reason: "map callback dropped".into(),
            },
        };
        *self = ReadbackState::Idle;
        status
    }
}

/// Single-slot readback of a `u32` device counter.
pub struct CountReadback {
    staging: wgpu::Buffer,
    state: ReadbackState,
    latest: Option<(u64, u32)>,
    failures: u64,
}

impl CountReadback {
    pub fn new(device: &wgpu::Device) -> Self {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("grass_counter_readback"),
            size: 4,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            staging,
            state: ReadbackState::Idle,
            latest: None,
            failures: 0,
        }
    }

    /// Record a copy of `counter` if no readback is in flight.
    pub fn schedule(&mut self, encoder: &mut wgpu::CommandEncoder, counter: &wgpu::Buffer, frame: u64) -> bool {
        if !self.state.is_idle() {
            return false;
        }
        encoder.copy_buffer_to_buffer(counter, 0, &self.staging, 0, 4);
        self.state = ReadbackState::Copied { frame };
        true
    }

    /// Request the map once the copy has been submitted.
    pub fn after_submit(&mut self) {
        let ReadbackState::Copied { frame } = self.state else {
            return;
        };
        let (tx, rx) = mpsc::channel();
        self.staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result.map_err(|e| e.to_string()));
        });
        self.state = ReadbackState::Pending { frame, rx };
    }

    /// Non-blocking. Returns `(frame, count)` when a new value arrived.
    pub fn poll(&mut self, device: &wgpu::Device) -> Option<(u64, u32)> {
        if !matches!(self.state, ReadbackState::Pending { .. }) {
            return None;
        }
        if let Err(e) = device.poll(wgpu::PollType::Poll) {
            log::warn!("Visible-count readback: device poll failed: {e}");
        }

        match self.state.check() {
            MapStatus::Ready { frame } => {
                let count = {
                    let data = self.staging.slice(..).get_mapped_range();
                    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
                };
                self.staging.unmap();
                log::debug!("Grass frame {frame}: {count} visible blades");
                self.latest = Some((frame, count));
                self.latest
            }
            MapStatus::Failed { frame, reason } => {
                self.failures += 1;
                log::warn!("Visible-count readback for frame {frame} failed: {reason}");
                None
            }
            MapStatus::Waiting | MapStatus::NotPending => None,
        }
    }

    /// Most recent successful readback
    pub fn latest(&self) -> Option<(u64, u32)> {
        self.latest
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Free the staging buffer. A map still in flight resolves as failed.
    pub fn destroy(&self) {
        self.staging.destroy();
    }
}

/// Copy `size` bytes out of `source` and wait for them. For tests and tools only.
pub fn read_buffer_blocking(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    size: u64,
) -> crate::core::Result<Vec<u8>> {
    use crate::core::Error;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("blocking_readback"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("blocking_readback"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait { submission_index: None, timeout: None })
        .map_err(|e| Error::Readback(e.to_string()))?;

    rx.recv()
        .map_err(|e| Error::Readback(e.to_string()))?
        .map_err(|e| Error::Readback(e.to_string()))?;

    let bytes = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(frame: u64) -> (ReadbackState, mpsc::Sender<Result<(), String>>) {
        let (tx, rx) = mpsc::channel();
        (ReadbackState::Pending { frame, rx }, tx)
    }

    #[test]
    fn test_idle_and_copied_are_not_pending() {
        assert_eq!(ReadbackState::Idle.check(), MapStatus::NotPending);
        let mut copied = ReadbackState::Copied { frame: 3 };
        assert_eq!(copied.check(), MapStatus::NotPending);
        assert!(!copied.is_idle());
    }

    #[test]
    fn test_waiting_stays_pending() {
        let (mut state, _tx) = pending(5);
        assert_eq!(state.check(), MapStatus::Waiting);
        assert_eq!(state.check(), MapStatus::Waiting);
        assert!(!state.is_idle());
    }

    #[test]
    fn test_ready_returns_to_idle() {
        let (mut state, tx) = pending(9);
        tx.send(Ok(())).unwrap();
        assert_eq!(state.check(), MapStatus::Ready { frame: 9 });
        assert!(state.is_idle());
    }

    #[test]
    fn test_failure_is_discarded() {
        let (mut state, tx) = pending(2);
        tx.send(Err("device lost".into())).unwrap();
        assert_eq!(state.check(), MapStatus::Failed { frame: 2, reason: "device lost".into() });
        assert!(state.is_idle());

        // A dropped callback does not leave the slot stuck
        let (mut state, tx) = pending(4);
        drop(tx);
        assert!(matches!(state.check(), MapStatus::Failed { frame: 4, .. }));
        assert!(state.is_idle());
    }
}
