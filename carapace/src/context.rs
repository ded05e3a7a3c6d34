//! Per-call state: depth budget and reference trackers.
//!
//! Contexts live for exactly one top-level (de)serialization call. Reference
//! trackers are borrowed from a pool on entry and returned cleared on exit.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;
use crate::options::SerializerOptions;

/// Outbound identity table: object identity to assigned id, in
/// first-encounter order.
#[derive(Debug, Default)]
pub(crate) struct WriteRefTracker {
    ids: HashMap<usize, u32>,
    next_id: u32,
}

impl WriteRefTracker {
    pub(crate) fn existing_id(&self, identity: usize) -> Option<u32> {
        self.ids.get(&identity).copied()
    }

    pub(crate) fn assign(&mut self, identity: usize) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(identity, id);
        id
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.next_id = 0;
    }
}

/// Inbound identity table: id to materialized value. A slot is reserved
/// before its contents are read so ids line up with the writer's
/// first-encounter order; a back-reference into a still-empty slot is a
/// wire-level cycle.
#[derive(Debug, Default)]
pub(crate) struct ReadRefTracker {
    values: Vec<Option<Arc<dyn Any + Send + Sync>>>,
}

impl ReadRefTracker {
    pub(crate) fn reserve(&mut self) -> usize {
        self.values.push(None);
        self.values.len() - 1
    }

    pub(crate) fn fulfill(&mut self, index: usize, value: Arc<dyn Any + Send + Sync>) {
        self.values[index] = Some(value);
    }

    pub(crate) fn get(&self, id: u32) -> Result<Arc<dyn Any + Send + Sync>, Error> {
        match self.values.get(id as usize) {
            None => Err(Error::UnknownReferenceId { id }),
            Some(None) => Err(Error::ReferenceCycle { id }),
            Some(Some(value)) => Ok(value.clone()),
        }
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}

/// Pool of reference trackers shared by all calls on one serializer.
#[derive(Debug, Default)]
pub(crate) struct TrackerPool {
    write: Mutex<Vec<WriteRefTracker>>,
    read: Mutex<Vec<ReadRefTracker>>,
}

impl TrackerPool {
    fn borrow_write(&self) -> WriteRefTracker {
        self.write.lock().pop().unwrap_or_default()
    }

    fn return_write(&self, mut tracker: WriteRefTracker) {
        tracker.clear();
        self.write.lock().push(tracker);
    }

    fn borrow_read(&self) -> ReadRefTracker {
        self.read.lock().pop().unwrap_or_default()
    }

    fn return_read(&self, mut tracker: ReadRefTracker) {
        tracker.clear();
        self.read.lock().push(tracker);
    }
}

/// State threaded through every converter on the write side.
pub struct SerializationContext<'s> {
    options: &'s SerializerOptions,
    depth_remaining: u32,
    refs: Option<WriteRefTracker>,
    pool: &'s TrackerPool,
}

impl<'s> SerializationContext<'s> {
    pub(crate) fn new(options: &'s SerializerOptions, pool: &'s TrackerPool) -> Self {
        let refs = options.preserve_references.then(|| pool.borrow_write());
        Self {
            options,
            depth_remaining: options.depth_limit,
            refs,
            pool,
        }
    }

    /// The serializer's options.
    pub fn options(&self) -> &SerializerOptions {
        self.options
    }

    /// Charge one unit of the depth budget for the duration of `f`.
    pub fn descend<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, Error>,
    ) -> Result<R, Error> {
        if self.depth_remaining == 0 {
            return Err(Error::DepthLimitExceeded {
                limit: self.options.depth_limit,
            });
        }
        self.depth_remaining -= 1;
        let result = f(self);
        self.depth_remaining += 1;
        result
    }

    pub(crate) fn refs_mut(&mut self) -> Option<&mut WriteRefTracker> {
        self.refs.as_mut()
    }
}

impl Drop for SerializationContext<'_> {
    fn drop(&mut self) {
        if let Some(tracker) = self.refs.take() {
            self.pool.return_write(tracker);
        }
    }
}

/// State threaded through every converter on the read side.
pub struct DeserializationContext<'s> {
    options: &'s SerializerOptions,
    depth_remaining: u32,
    refs: Option<ReadRefTracker>,
    pool: &'s TrackerPool,
}

impl<'s> DeserializationContext<'s> {
    pub(crate) fn new(options: &'s SerializerOptions, pool: &'s TrackerPool) -> Self {
        let refs = options.preserve_references.then(|| pool.borrow_read());
        Self {
            options,
            depth_remaining: options.depth_limit,
            refs,
            pool,
        }
    }

    /// The serializer's options.
    pub fn options(&self) -> &SerializerOptions {
        self.options
    }

    /// Charge one unit of the depth budget for the duration of `f`.
    pub fn descend<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, Error>,
    ) -> Result<R, Error> {
        if self.depth_remaining == 0 {
            return Err(Error::DepthLimitExceeded {
                limit: self.options.depth_limit,
            });
        }
        self.depth_remaining -= 1;
        let result = f(self);
        self.depth_remaining += 1;
        result
    }

    pub(crate) fn refs_mut(&mut self) -> Option<&mut ReadRefTracker> {
        self.refs.as_mut()
    }
}

impl Drop for DeserializationContext<'_> {
    fn drop(&mut self) {
        if let Some(tracker) = self.refs.take() {
            self.pool.return_read(tracker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_budget_is_restored_between_siblings() {
        let options = SerializerOptions {
            depth_limit: 2,
            ..SerializerOptions::default()
        };
        let pool = TrackerPool::default();
        let mut ctx = SerializationContext::new(&options, &pool);
        for _ in 0..10 {
            ctx.descend(|ctx| ctx.descend(|_| Ok(()))).unwrap();
        }
        let too_deep = ctx.descend(|ctx| ctx.descend(|ctx| ctx.descend(|_| Ok(()))));
        assert!(matches!(too_deep, Err(Error::DepthLimitExceeded { limit: 2 })));
    }

    #[test]
    fn read_tracker_reports_cycles_and_unknown_ids() {
        let mut tracker = ReadRefTracker::default();
        let slot = tracker.reserve();
        assert!(matches!(tracker.get(0), Err(Error::ReferenceCycle { id: 0 })));
        assert!(matches!(
            tracker.get(3),
            Err(Error::UnknownReferenceId { id: 3 })
        ));
        tracker.fulfill(slot, Arc::new(7u32));
        let value = tracker.get(0).unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 7);
    }
}
