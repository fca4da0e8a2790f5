//! Counting semaphores, passed through to the kernel semaphore
use osal_core::{
    msecs_to_duration, CountSemCreateError, GetInfoError, InvalidIdError,
    ObjectToken, SemError, SemTimedWaitError, SEM_VALUE_MAX,
};
use std::sync::Arc;

use crate::{
    kernel::{self, SemWaitError},
    table, Port,
};

pub(crate) struct CountSemRecord {
    sem: kernel::Semaphore,
}

impl Port {
    fn count_sem(&self, token: &ObjectToken) -> Result<Arc<CountSemRecord>, InvalidIdError> {
        table(&self.count_sems)?.get(token)
    }

    /// Create a counting semaphore. Unlike binary semaphores, an initial
    /// value above [`SEM_VALUE_MAX`] is rejected.
    pub fn count_sem_create(
        &self,
        token: &ObjectToken,
        initial_value: u32,
        _options: u32,
    ) -> Result<(), CountSemCreateError> {
        log::trace!("count_sem_create({token:?}, {initial_value})");
        let table = table(&self.count_sems)?;

        if initial_value > SEM_VALUE_MAX {
            return Err(CountSemCreateError::InvalidSemValue);
        }

        let sem = self.kernel.semaphore(initial_value).map_err(|e| {
            log::warn!("count_sem_create({token:?}): {e}");
            CountSemCreateError::SemFailure
        })?;

        table.install(token, Arc::new(CountSemRecord { sem }))?;
        Ok(())
    }

    pub fn count_sem_delete(&self, token: &ObjectToken) -> Result<(), SemError> {
        log::trace!("count_sem_delete({token:?})");
        let record = table(&self.count_sems)?.remove(token)?;
        // Waiters (a caller error) fail instead of blocking forever
        record.sem.close();
        Ok(())
    }

    pub fn count_sem_give(&self, token: &ObjectToken) -> Result<(), SemError> {
        log::trace!("count_sem_give({token:?})");
        self.count_sem(token)?.sem.post().map_err(|e| {
            log::warn!("count_sem_give({token:?}): {e}");
            SemError::SemFailure
        })
    }

    pub fn count_sem_take(&self, token: &ObjectToken) -> Result<(), SemError> {
        log::trace!("count_sem_take({token:?})");
        self.count_sem(token)?
            .sem
            .wait(None)
            .map_err(|_| SemError::SemFailure)
    }

    /// Take the semaphore, waiting up to `msecs` milliseconds. With
    /// `msecs == 0`, this polls without blocking.
    pub fn count_sem_timed_wait(
        &self,
        token: &ObjectToken,
        msecs: u32,
    ) -> Result<(), SemTimedWaitError> {
        log::trace!("count_sem_timed_wait({token:?}, {msecs})");
        let sem = self.count_sem(token)?;
        match sem.sem.wait(Some(msecs_to_duration(msecs))) {
            Ok(()) => Ok(()),
            Err(SemWaitError::Timeout) => Err(SemTimedWaitError::SemTimeout),
            Err(SemWaitError::Closed) => Err(SemTimedWaitError::SemFailure),
        }
    }

    /// The kernel semaphore's value is not exposed by this backend.
    pub fn count_sem_get_info(&self, token: &ObjectToken) -> Result<(), GetInfoError> {
        log::trace!("count_sem_get_info({token:?})");
        self.count_sem(token)?;
        Err(GetInfoError::NotImplemented)
    }
}
