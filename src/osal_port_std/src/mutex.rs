//! Recursive mutexes
use osal_core::{InvalidIdError, ObjectToken, SemError};
use std::sync::Arc;

use crate::{kernel, table, Port};

pub(crate) struct MutexRecord {
    mutex: kernel::RawMutex,
}

impl Port {
    fn mut_sem(&self, token: &ObjectToken) -> Result<Arc<MutexRecord>, InvalidIdError> {
        table(&self.mutexes)?.get(token)
    }

    pub fn mut_sem_create(&self, token: &ObjectToken, _options: u32) -> Result<(), SemError> {
        log::trace!("mut_sem_create({token:?})");
        let table = table(&self.mutexes)?;
        let mutex = self.kernel.raw_mutex(true).map_err(|e| {
            log::warn!("mut_sem_create({token:?}): {e}");
            SemError::SemFailure
        })?;
        table.install(token, Arc::new(MutexRecord { mutex }))?;
        Ok(())
    }

    pub fn mut_sem_delete(&self, token: &ObjectToken) -> Result<(), SemError> {
        log::trace!("mut_sem_delete({token:?})");
        table(&self.mutexes)?.remove(token)?;
        Ok(())
    }

    /// Release one level of ownership. Fails if the calling thread is not
    /// the owner.
    pub fn mut_sem_give(&self, token: &ObjectToken) -> Result<(), SemError> {
        log::trace!("mut_sem_give({token:?})");
        self.mut_sem(token)?.mutex.unlock().map_err(|e| {
            log::debug!("mut_sem_give({token:?}): {e:?}");
            SemError::SemFailure
        })
    }

    pub fn mut_sem_take(&self, token: &ObjectToken) -> Result<(), SemError> {
        log::trace!("mut_sem_take({token:?})");
        self.mut_sem(token)?
            .mutex
            .lock()
            .map_err(|_| SemError::SemFailure)
    }

    /// There are no backend-specific properties to report.
    pub fn mut_sem_get_info(&self, token: &ObjectToken) -> Result<(), InvalidIdError> {
        log::trace!("mut_sem_get_info({token:?})");
        self.mut_sem(token).map(|_| ())
    }
}
