//! Yield accounting for the inbound frame reader.
//!
//! The routes behind the reader are unbounded, so nothing here limits how
//! much is buffered. The counter only makes a busy reader give other tasks
//! on the runtime a turn: after two thirds of a prefetch batch has been
//! routed, the reader yields and the count starts over.

#[derive(Debug)]
pub(crate) struct ReadFairness {
    frames: usize,
    yield_after: usize,
}

impl ReadFairness {
    pub(crate) fn new(batch: usize) -> Self {
        let batch = batch.max(1);
        Self {
            frames: 0,
            yield_after: batch - batch / 3,
        }
    }

    pub(crate) fn after_frame(&mut self) { self.frames += 1; }

    pub(crate) fn should_yield(&self) -> bool { self.frames >= self.yield_after }

    pub(crate) fn reset(&mut self) { self.frames = 0; }
}
