use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// Upper bound on queued output samples (about one second of 48 kHz stereo).
/// The transport side is expected to drain continuously; on overflow the
/// oldest audio is dropped.
pub const MAX_QUEUED_SAMPLES: usize = 96_000;

/// Sample format of the processed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug)]
struct OutputQueue {
    samples: VecDeque<f32>,
    format: Option<StreamFormat>,
    capacity: usize,
}

/// The processed output stream handed to the transport layer.
///
/// Clones share one queue; the handle's identity is fixed for the engine's
/// lifetime, so internal capture restarts never force the transport to
/// renegotiate. The engine pushes post-gain samples, the transport reads.
#[derive(Debug, Clone)]
pub struct ProcessedStream {
    id: Uuid,
    queue: Arc<Mutex<OutputQueue>>,
}

impl Default for ProcessedStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessedStream {
    pub fn new() -> Self {
        Self::with_capacity(MAX_QUEUED_SAMPLES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue: Arc::new(Mutex::new(OutputQueue {
                samples: VecDeque::new(),
                format: None,
                capacity: capacity.max(1),
            })),
        }
    }

    /// Stable identity of this output handle.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Format of the most recent source, if any audio has flowed yet.
    pub fn format(&self) -> Option<StreamFormat> {
        self.queue.lock().format
    }

    /// Engine side: enqueue processed samples, dropping the oldest on
    /// overflow.
    pub fn push(&self, samples: &[f32], sample_rate: u32, channels: u16) {
        let mut queue = self.queue.lock();
        queue.format = Some(StreamFormat {
            sample_rate,
            channels,
        });
        for &sample in samples {
            if queue.samples.len() == queue.capacity {
                queue.samples.pop_front();
            }
            queue.samples.push_back(sample);
        }
    }

    /// Transport side: read and remove up to `max` samples.
    pub fn read(&self, max: usize) -> Vec<f32> {
        let mut queue = self.queue.lock();
        let take = max.min(queue.samples.len());
        queue.samples.drain(..take).collect()
    }

    /// Samples currently queued.
    pub fn available(&self) -> usize {
        self.queue.lock().samples.len()
    }

    pub fn clear(&self) {
        self.queue.lock().samples.clear();
    }
}
