use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::models::constraints::CaptureConstraints;
use crate::traits::capture::CaptureStream;

/// Where a source's buffers are routed.
///
/// The processing graph (source tap → analysis window → gain ramp → output)
/// never changes shape; acquiring, committing and tearing down sources only
/// flips tap routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SourceRoute {
    /// Feeds only the validation probe window.
    Probe = 0,
    /// Feeds the live processing pipeline.
    Live = 1,
    /// Buffers are dropped; the source is logically disconnected.
    Dead = 2,
}

/// Routing state shared between a capture stream's callback and the engine.
#[derive(Debug)]
pub struct SourceTap {
    route: AtomicU8,
}

impl SourceTap {
    pub fn new(route: SourceRoute) -> Arc<Self> {
        Arc::new(Self {
            route: AtomicU8::new(route as u8),
        })
    }

    pub fn route(&self) -> SourceRoute {
        match self.route.load(Ordering::Acquire) {
            0 => SourceRoute::Probe,
            1 => SourceRoute::Live,
            _ => SourceRoute::Dead,
        }
    }

    pub fn set_route(&self, route: SourceRoute) {
        self.route.store(route as u8, Ordering::Release);
    }
}

/// The one live capture session owned by an engine.
///
/// Replacing a session atomically kills the old tap and stops the old
/// stream's tracks before the new one goes live.
pub struct CaptureSession<S: CaptureStream> {
    pub id: Uuid,
    pub stream: S,
    pub constraints: CaptureConstraints,
    pub tap: Arc<SourceTap>,
}

impl<S: CaptureStream> CaptureSession<S> {
    pub fn new(stream: S, constraints: CaptureConstraints, tap: Arc<SourceTap>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream,
            constraints,
            tap,
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_active()
    }

    /// Disconnect and release: buffers already in flight are dropped at the
    /// tap, then the device tracks are stopped.
    pub fn shutdown(&self) {
        self.tap.set_route(SourceRoute::Dead);
        self.stream.stop_all();
    }
}
