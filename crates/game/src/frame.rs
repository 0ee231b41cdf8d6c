//! Double-buffered hand-off from the logic thread to a viewer thread.
//!
//! The logic thread fills its back buffer, then swaps. The viewer only ever
//! reads the front buffer it was handed, so neither side waits on the other
//! except at the swap.

use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cosmos::EntityId;
use crate::visibility::VisibleEntity;

/// Everything a viewer needs to draw one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameFrameBuffer {
    pub step: u32,
    pub interpolation_ratio: f32,
    pub viewed_character: Option<EntityId>,
    pub visible: Vec<VisibleEntity>,
}

#[derive(Debug, Default)]
struct SwapState {
    buffer: GameFrameBuffer,
    fresh: bool,
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<SwapState>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SwapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn frame_buffer_swapper() -> (FrameWriter, FrameReader) {
    let shared = Arc::new(Shared::default());
    (
        FrameWriter {
            back: GameFrameBuffer::default(),
            shared: Arc::clone(&shared),
        },
        FrameReader {
            front: GameFrameBuffer::default(),
            shared,
        },
    )
}

/// Logic-thread side.
#[derive(Debug)]
pub struct FrameWriter {
    back: GameFrameBuffer,
    shared: Arc<Shared>,
}

impl FrameWriter {
    pub fn buffer_mut(&mut self) -> &mut GameFrameBuffer {
        &mut self.back
    }

    /// Publishes the back buffer. A frame the viewer has not picked up yet is
    /// overwritten.
    pub fn swap(&mut self) {
        let mut state = self.shared.lock();
        mem::swap(&mut state.buffer, &mut self.back);
        state.fresh = true;
        drop(state);
        self.shared.ready.notify_one();
        self.back.visible.clear();
    }

    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.ready.notify_all();
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Viewer-thread side.
#[derive(Debug)]
pub struct FrameReader {
    front: GameFrameBuffer,
    shared: Arc<Shared>,
}

impl FrameReader {
    /// Blocks until a new frame arrives. Returns `None` on timeout or once
    /// the writer is closed and nothing is left.
    pub fn wait_for_frame(&mut self, timeout: Duration) -> Option<&GameFrameBuffer> {
        let state = self.shared.lock();
        let (mut state, _) = self
            .shared
            .ready
            .wait_timeout_while(state, timeout, |s| !s.fresh && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);

        if !state.fresh {
            return None;
        }
        mem::swap(&mut state.buffer, &mut self.front);
        state.fresh = false;
        Some(&self.front)
    }

    /// Last frame received.
    pub fn current(&self) -> &GameFrameBuffer {
        &self.front
    }

    pub fn is_closed(&self) -> bool {
        let state = self.shared.lock();
        state.closed && !state.fresh
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn reader_gets_latest_swapped_frame() {
        let (mut writer, mut reader) = frame_buffer_swapper();
        assert!(reader.wait_for_frame(Duration::from_millis(1)).is_none());

        writer.buffer_mut().step = 1;
        writer.swap();
        writer.buffer_mut().step = 2;
        writer.swap();

        let frame = reader.wait_for_frame(Duration::from_millis(10)).unwrap();
        assert_eq!(frame.step, 2);
        assert!(reader.wait_for_frame(Duration::from_millis(1)).is_none());
        assert_eq!(reader.current().step, 2);
    }

    #[test]
    fn frames_cross_threads_until_close() {
        let (mut writer, mut reader) = frame_buffer_swapper();

        let viewer = thread::spawn(move || {
            let mut last = 0;
            while !reader.is_closed() {
                if let Some(frame) = reader.wait_for_frame(Duration::from_millis(50)) {
                    assert!(frame.step > last);
                    last = frame.step;
                }
            }
            last
        });

        for step in 1..=100 {
            writer.buffer_mut().step = step;
            writer.swap();
        }
        drop(writer);

        assert_eq!(viewer.join().unwrap(), 100);
    }
}
