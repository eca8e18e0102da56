use std::collections::VecDeque;

use crate::foundation::core::TIME_EPSILON;
use crate::media::handle::{DecodedUnit, Payload, UnitHandle};

/// Bounded, time-ordered look-ahead of decoded units.
///
/// Presentation times are strictly increasing front to back. The capacity is the pipeline's only
/// backpressure point: producers stop decoding while [`UnitQueue::is_full`] holds.
#[derive(Debug)]
pub struct UnitQueue<P> {
    units: VecDeque<UnitHandle<P>>,
    capacity: usize,
}

impl<P: Payload> UnitQueue<P> {
    /// Create an empty queue holding at most `capacity` units (minimum 2).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            units: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of units held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Return `true` when no unit is queued.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Return `true` when no more units may be pushed.
    pub fn is_full(&self) -> bool {
        self.units.len() >= self.capacity
    }

    /// Presentation time of the oldest queued unit.
    pub fn oldest_time(&self) -> Option<f64> {
        self.units.front().map(UnitHandle::presentation_time)
    }

    /// Presentation time of the newest queued unit.
    pub fn newest_time(&self) -> Option<f64> {
        self.units.back().map(UnitHandle::presentation_time)
    }

    /// Append a unit.
    ///
    /// The unit is handed back when the queue is full or when it would not be strictly newer than
    /// the current newest unit.
    pub fn push(&mut self, unit: DecodedUnit<P>) -> Result<(), DecodedUnit<P>> {
        if self.is_full() {
            return Err(unit);
        }
        if let Some(newest) = self.newest_time()
            && unit.presentation_time <= newest + TIME_EPSILON
        {
            return Err(unit);
        }
        self.units.push_back(UnitHandle::new(unit));
        Ok(())
    }

    /// Index of the newest unit with `presentation_time <= t`.
    fn index_for_time(&self, t: f64) -> Option<usize> {
        let after = self
            .units
            .partition_point(|u| u.presentation_time() <= t + TIME_EPSILON);
        after.checked_sub(1)
    }

    /// Newest unit with `presentation_time <= t`, without evicting anything.
    pub fn peek_for_time(&self, t: f64) -> Option<&UnitHandle<P>> {
        self.index_for_time(t).map(|i| &self.units[i])
    }

    /// Return `true` when a unit newer than `t` is queued, i.e. the answer for `t` is final.
    pub fn covers(&self, t: f64) -> bool {
        self.newest_time()
            .is_some_and(|newest| newest > t + TIME_EPSILON)
    }

    /// Evict every unit strictly older than the one [`UnitQueue::acquire_for_time`] would return
    /// for `t`. Returns the number of evicted units.
    pub fn evict_before_time(&mut self, t: f64) -> usize {
        match self.index_for_time(t) {
            Some(i) => {
                self.units.drain(..i);
                i
            }
            None => 0,
        }
    }

    /// Newest unit with `presentation_time <= t`; older units are evicted.
    pub fn acquire_for_time(&mut self, t: f64) -> Option<UnitHandle<P>> {
        self.index_for_time(t)?;
        self.evict_before_time(t);
        self.units.front().cloned()
    }

    /// Newest queued unit.
    pub fn latest(&self) -> Option<UnitHandle<P>> {
        self.units.back().cloned()
    }

    /// Drop every queued unit. Outstanding handles stay valid.
    pub fn clear(&mut self) {
        self.units.clear();
    }

    /// Presentation times front to back.
    pub fn timestamps(&self) -> Vec<f64> {
        self.units.iter().map(UnitHandle::presentation_time).collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/queue.rs"]
mod tests;
