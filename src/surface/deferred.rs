use super::{MapSurface, SurfaceOp};
use std::collections::VecDeque;
use tracing::debug;

/// Gate in front of a map surface that is not usable until its style and
/// tiles have loaded.
///
/// Ops submitted before `mark_ready` are queued in order and flushed once
/// the ready signal fires; nothing is dropped.
pub struct DeferredSurface {
    inner: Box<dyn MapSurface>,
    ready: bool,
    pending: VecDeque<SurfaceOp>,
}

impl DeferredSurface {
    pub fn new(inner: Box<dyn MapSurface>) -> Self {
        Self {
            inner,
            ready: false,
            pending: VecDeque::new(),
        }
    }

    /// Wrap a surface that is usable immediately
    pub fn ready(inner: Box<dyn MapSurface>) -> Self {
        Self {
            ready: true,
            ..Self::new(inner)
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn submit(&mut self, op: SurfaceOp) {
        if self.ready {
            self.inner.apply(&op);
        } else {
            self.pending.push_back(op);
        }
    }

    /// Ready signal from the map; flushes the queue
    pub fn mark_ready(&mut self) {
        if self.ready {
            return;
        }
        self.ready = true;
        debug!(queued = self.pending.len(), "Map surface ready, flushing queued ops");
        while let Some(op) = self.pending.pop_front() {
            self.inner.apply(&op);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::testing::RecordingSurface;

    fn remove(id: &str) -> SurfaceOp {
        SurfaceOp::RemoveMarker { id: id.to_string() }
    }

    #[test]
    fn test_ops_queue_until_ready() {
        let recorder = RecordingSurface::default();
        let mut surface = DeferredSurface::new(Box::new(recorder.clone()));

        surface.submit(remove("a"));
        surface.submit(remove("b"));
        assert!(recorder.snapshot().is_empty());
        assert_eq!(surface.pending_len(), 2);

        surface.mark_ready();
        assert_eq!(recorder.take(), vec![remove("a"), remove("b")]);
        assert_eq!(surface.pending_len(), 0);

        surface.submit(remove("c"));
        assert_eq!(recorder.take(), vec![remove("c")]);
    }

    #[test]
    fn test_ready_surface_applies_immediately() {
        let recorder = RecordingSurface::default();
        let mut surface = DeferredSurface::ready(Box::new(recorder.clone()));

        surface.submit(SurfaceOp::ClearRoute);
        assert_eq!(recorder.take(), vec![SurfaceOp::ClearRoute]);
    }
}
