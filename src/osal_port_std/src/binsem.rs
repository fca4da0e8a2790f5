//! Binary semaphores with flush, simulated with a mutex and a condition
//! variable.
//!
//! The record's lock is held while the value or the flush count changes and
//! while signalling, so a taker that has just observed `current_value == 0`
//! cannot miss the wake-up of a concurrent give or flush.
//!
//! Deleting a semaphore while a thread is blocked in a take is the caller's
//! responsibility to avoid. The blocked thread keeps the record alive, but
//! since the token no longer resolves, nothing can give or flush it anymore.
use osal_core::{
    msecs_to_duration, InvalidIdError, ObjectToken, SemError,
    SemTimedWaitError,
};
use std::{sync::Arc, time::Instant};

use crate::{
    kernel::{self, WaitStatus},
    table, Port,
};

pub(crate) struct BinSemRecord {
    state: kernel::Mutex<BinSemState>,
    cond: kernel::Condvar,
}

#[derive(Debug)]
struct BinSemState {
    /// `0` or `1`
    current_value: u32,
    /// Incremented by every flush
    flush_count: u32,
}

/// The properties reported by [`Port::bin_sem_get_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinSemProp {
    pub value: u32,
}

impl Port {
    fn bin_sem(&self, token: &ObjectToken) -> Result<Arc<BinSemRecord>, InvalidIdError> {
        table(&self.bin_sems)?.get(token)
    }

    /// Create a binary semaphore. An `initial_value` above `1` is treated as
    /// `1`.
    pub fn bin_sem_create(
        &self,
        token: &ObjectToken,
        initial_value: u32,
        _options: u32,
    ) -> Result<(), SemError> {
        log::trace!("bin_sem_create({token:?}, {initial_value})");
        let table = table(&self.bin_sems)?;

        let kernel_error = |e: kernel::KernelError| {
            log::warn!("bin_sem_create({token:?}): {e}");
            SemError::SemFailure
        };

        let state = self
            .kernel
            .mutex(BinSemState {
                current_value: initial_value.min(1),
                flush_count: 0,
            })
            .map_err(kernel_error)?;
        // `state` is released if this fails
        let cond = self.kernel.condvar().map_err(kernel_error)?;

        table.install(token, Arc::new(BinSemRecord { state, cond }))?;
        Ok(())
    }

    pub fn bin_sem_delete(&self, token: &ObjectToken) -> Result<(), SemError> {
        log::trace!("bin_sem_delete({token:?})");
        table(&self.bin_sems)?.remove(token)?;
        Ok(())
    }

    /// Set the value to `1` and wake up one waiter.
    pub fn bin_sem_give(&self, token: &ObjectToken) -> Result<(), SemError> {
        log::trace!("bin_sem_give({token:?})");
        let sem = self.bin_sem(token)?;
        let mut state = sem.state.lock();
        state.current_value = 1;
        sem.cond.notify_one();
        Ok(())
    }

    /// Release every thread currently blocked in a take without changing the
    /// value.
    pub fn bin_sem_flush(&self, token: &ObjectToken) -> Result<(), SemError> {
        log::trace!("bin_sem_flush({token:?})");
        let sem = self.bin_sem(token)?;
        let mut state = sem.state.lock();
        state.flush_count = state.flush_count.wrapping_add(1);
        sem.cond.notify_all();
        Ok(())
    }

    /// Wait until the semaphore is given or flushed.
    pub fn bin_sem_take(&self, token: &ObjectToken) -> Result<(), SemError> {
        log::trace!("bin_sem_take({token:?})");
        self.bin_sem_take_until(token, None).map_err(|e| match e {
            SemTimedWaitError::InvalidId => SemError::InvalidId,
            SemTimedWaitError::SemFailure | SemTimedWaitError::SemTimeout => {
                SemError::SemFailure
            }
        })
    }

    /// Wait up to `msecs` milliseconds until the semaphore is given or
    /// flushed. With `msecs == 0`, this only checks the current value.
    pub fn bin_sem_timed_wait(
        &self,
        token: &ObjectToken,
        msecs: u32,
    ) -> Result<(), SemTimedWaitError> {
        log::trace!("bin_sem_timed_wait({token:?}, {msecs})");
        let deadline = Instant::now() + msecs_to_duration(msecs);
        self.bin_sem_take_until(token, Some(deadline))
    }

    fn bin_sem_take_until(
        &self,
        token: &ObjectToken,
        deadline: Option<Instant>,
    ) -> Result<(), SemTimedWaitError> {
        let sem = self.bin_sem(token)?;
        let mut state = sem.state.lock();
        let flush_count = state.flush_count;

        while state.current_value == 0 && state.flush_count == flush_count {
            state = match deadline {
                None => sem.cond.wait(state),
                Some(deadline) => {
                    let (state, status) = sem.cond.wait_until(state, deadline);
                    if status == WaitStatus::TimedOut
                        && state.current_value == 0
                        && state.flush_count == flush_count
                    {
                        return Err(SemTimedWaitError::SemTimeout);
                    }
                    state
                }
            };
        }

        // A flushed taker leaves the value for the next one
        if state.flush_count == flush_count {
            state.current_value = 0;
        }
        Ok(())
    }

    pub fn bin_sem_get_info(&self, token: &ObjectToken) -> Result<BinSemProp, InvalidIdError> {
        log::trace!("bin_sem_get_info({token:?})");
        let sem = self.bin_sem(token)?;
        let value = sem.state.lock().current_value;
        Ok(BinSemProp { value })
    }
}
