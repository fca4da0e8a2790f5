//! Condition variables with an associated mutex
use osal_core::{CondVarError, CondVarTimedWaitError, InvalidIdError, ObjectToken};
use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use crate::{
    kernel::{self, WaitStatus},
    table, Port,
};

pub(crate) struct CondVarRecord {
    mutex: kernel::RawMutex,
    cond: kernel::RawCondvar,
}

impl Port {
    fn cond_var(&self, token: &ObjectToken) -> Result<Arc<CondVarRecord>, InvalidIdError> {
        table(&self.cond_vars)?.get(token)
    }

    pub fn cond_var_create(&self, token: &ObjectToken, _options: u32) -> Result<(), CondVarError> {
        log::trace!("cond_var_create({token:?})");
        let table = table(&self.cond_vars)?;
        let kernel_error = |e: kernel::KernelError| {
            log::warn!("cond_var_create({token:?}): {e}");
            CondVarError::Error
        };
        let mutex = self.kernel.raw_mutex(false).map_err(kernel_error)?;
        let cond = self.kernel.raw_condvar().map_err(kernel_error)?;
        table.install(token, Arc::new(CondVarRecord { mutex, cond }))?;
        Ok(())
    }

    pub fn cond_var_delete(&self, token: &ObjectToken) -> Result<(), CondVarError> {
        log::trace!("cond_var_delete({token:?})");
        table(&self.cond_vars)?.remove(token)?;
        Ok(())
    }

    /// Acquire the mutex associated with the condition variable.
    pub fn cond_var_lock(&self, token: &ObjectToken) -> Result<(), CondVarError> {
        log::trace!("cond_var_lock({token:?})");
        self.cond_var(token)?
            .mutex
            .lock()
            .map_err(|_| CondVarError::Error)
    }

    pub fn cond_var_unlock(&self, token: &ObjectToken) -> Result<(), CondVarError> {
        log::trace!("cond_var_unlock({token:?})");
        self.cond_var(token)?
            .mutex
            .unlock()
            .map_err(|_| CondVarError::Error)
    }

    pub fn cond_var_signal(&self, token: &ObjectToken) -> Result<(), CondVarError> {
        log::trace!("cond_var_signal({token:?})");
        self.cond_var(token)?.cond.signal();
        Ok(())
    }

    pub fn cond_var_broadcast(&self, token: &ObjectToken) -> Result<(), CondVarError> {
        log::trace!("cond_var_broadcast({token:?})");
        self.cond_var(token)?.cond.broadcast();
        Ok(())
    }

    /// Release the associated mutex (which the caller must hold), wait for a
    /// signal and reacquire it. The wait may end spuriously.
    pub fn cond_var_wait(&self, token: &ObjectToken) -> Result<(), CondVarError> {
        log::trace!("cond_var_wait({token:?})");
        let cv = self.cond_var(token)?;
        cv.cond.wait(&cv.mutex).map_err(|_| CondVarError::Error)
    }

    /// Like [`Self::cond_var_wait`], but gives up at the wall-clock time
    /// `abs_wakeup_time`.
    pub fn cond_var_timed_wait(
        &self,
        token: &ObjectToken,
        abs_wakeup_time: SystemTime,
    ) -> Result<(), CondVarTimedWaitError> {
        log::trace!("cond_var_timed_wait({token:?}, {abs_wakeup_time:?})");
        let cv = self.cond_var(token)?;
        let remaining = abs_wakeup_time
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        let status = match Instant::now().checked_add(remaining) {
            Some(deadline) => cv.cond.wait_until(&cv.mutex, deadline),
            None => cv.cond.wait(&cv.mutex).map(|()| WaitStatus::Signaled),
        };
        match status {
            Ok(WaitStatus::Signaled) => Ok(()),
            Ok(WaitStatus::TimedOut) => Err(CondVarTimedWaitError::ErrorTimeout),
            Err(_) => Err(CondVarTimedWaitError::Error),
        }
    }

    /// There are no backend-specific properties to report.
    pub fn cond_var_get_info(&self, token: &ObjectToken) -> Result<(), InvalidIdError> {
        log::trace!("cond_var_get_info({token:?})");
        self.cond_var(token).map(|_| ())
    }
}
