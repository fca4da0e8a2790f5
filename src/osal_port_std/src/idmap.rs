//! Per-category table locks
use osal_core::{InvalidIdError, ObjectType, TableLockError};
use std::time::{Duration, Instant};

use crate::{
    kernel::{Kernel, KernelError, RawCondvar, RawMutex},
    Port,
};

/// The lock serializing changes to one category's object table, plus a
/// condition broadcast whenever the holder releases it.
pub(crate) struct GlobalLock {
    mutex: RawMutex,
    state_change: RawCondvar,
}

impl GlobalLock {
    pub(crate) fn new(kernel: &Kernel) -> Result<Self, KernelError> {
        Ok(Self {
            mutex: kernel.raw_mutex(false)?,
            state_change: kernel.raw_condvar()?,
        })
    }
}

/// Get how long [`Port::wait_for_state_change`] waits on its `attempts`-th
/// try: quadratic back-off in 10 ms steps, capped to one second after ten
/// attempts.
pub fn state_change_backoff(attempts: u32) -> Duration {
    if attempts <= 10 {
        Duration::from_millis(u64::from(attempts * attempts) * 10)
    } else {
        Duration::from_secs(1)
    }
}

impl Port {
    fn global_lock(&self, obj_type: ObjectType) -> Result<&GlobalLock, InvalidIdError> {
        self.global_locks[obj_type.index()]
            .get()
            .ok_or(InvalidIdError::InvalidId)
    }

    /// Acquire the table lock of `obj_type`.
    pub fn lock_global(&self, obj_type: ObjectType) -> Result<(), TableLockError> {
        log::trace!("lock_global({obj_type:?})");
        self.global_lock(obj_type)?.mutex.lock().map_err(|e| {
            log::warn!("lock_global({obj_type:?}): {e:?}");
            TableLockError::Error
        })
    }

    /// Release the table lock of `obj_type`, waking up every thread in
    /// [`Self::wait_for_state_change`] first.
    pub fn unlock_global(&self, obj_type: ObjectType) -> Result<(), TableLockError> {
        log::trace!("unlock_global({obj_type:?})");
        let lock = self.global_lock(obj_type)?;
        if !lock.mutex.is_locked_by_current_thread() {
            return Err(TableLockError::Error);
        }
        lock.state_change.broadcast();
        lock.mutex.unlock().map_err(|_| TableLockError::Error)
    }

    /// Temporarily release the table lock of `obj_type` (which the caller
    /// must hold) until another thread releases it or the back-off for
    /// `attempts` elapses.
    pub fn wait_for_state_change(
        &self,
        obj_type: ObjectType,
        attempts: u32,
    ) -> Result<(), TableLockError> {
        log::trace!("wait_for_state_change({obj_type:?}, {attempts})");
        let lock = self.global_lock(obj_type)?;
        let deadline = Instant::now() + state_change_backoff(attempts);
        lock.state_change
            .wait_until(&lock.mutex, deadline)
            .map(|_| ())
            .map_err(|_| TableLockError::Error)
    }
}
