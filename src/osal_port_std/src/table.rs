//! Per-category implementation records
use osal_core::{InvalidIdError, ObjectId, ObjectToken, ObjectType};
use spin::Mutex as SpinMutex;
use std::sync::Arc;

/// Maps the slots of one object category to their implementation records.
///
/// The slot table guarantees that create and delete never race on the same
/// slot, so each slot only needs a short-lived spinlock for the pointer
/// swap. Records are reference-counted so that an operation in progress keeps
/// its record alive for the call's duration.
pub(crate) struct ImplTable<R> {
    obj_type: ObjectType,
    slots: Box<[SpinMutex<Option<(ObjectId, Arc<R>)>>]>,
}

impl<R> ImplTable<R> {
    pub(crate) fn new(obj_type: ObjectType, capacity: usize) -> Self {
        Self {
            obj_type,
            slots: (0..capacity).map(|_| SpinMutex::new(None)).collect(),
        }
    }

    fn slot(
        &self,
        token: &ObjectToken,
    ) -> Result<&SpinMutex<Option<(ObjectId, Arc<R>)>>, InvalidIdError> {
        if token.obj_type() != self.obj_type {
            return Err(InvalidIdError::InvalidId);
        }
        self.slots
            .get(token.obj_idx())
            .ok_or(InvalidIdError::InvalidId)
    }

    /// Attach `record` to the slot of `token`.
    pub(crate) fn install(&self, token: &ObjectToken, record: Arc<R>) -> Result<(), InvalidIdError> {
        let mut slot = self.slot(token)?.lock();
        if slot.is_some() {
            log::warn!("{token:?}: slot is already in use");
            return Err(InvalidIdError::InvalidId);
        }
        *slot = Some((token.obj_id(), record));
        Ok(())
    }

    /// Get the record of a live object.
    pub(crate) fn get(&self, token: &ObjectToken) -> Result<Arc<R>, InvalidIdError> {
        match &*self.slot(token)?.lock() {
            Some((id, record)) if *id == token.obj_id() => Ok(Arc::clone(record)),
            _ => Err(InvalidIdError::InvalidId),
        }
    }

    /// Detach the record of a live object.
    pub(crate) fn remove(&self, token: &ObjectToken) -> Result<Arc<R>, InvalidIdError> {
        let mut slot = self.slot(token)?.lock();
        match &*slot {
            Some((id, _)) if *id == token.obj_id() => {}
            _ => return Err(InvalidIdError::InvalidId),
        }
        slot.take()
            .map(|(_, record)| record)
            .ok_or(InvalidIdError::InvalidId)
    }

    /// Find a live record satisfying `pred`.
    pub(crate) fn find(
        &self,
        mut pred: impl FnMut(&R) -> bool,
    ) -> Option<(ObjectToken, Arc<R>)> {
        self.slots
            .iter()
            .enumerate()
            .find_map(|(obj_idx, slot)| match &*slot.lock() {
                Some((id, record)) if pred(record) => Some((
                    ObjectToken::new(self.obj_type, obj_idx, *id),
                    Arc::clone(record),
                )),
                _ => None,
            })
    }
}
