//! The object slot table
use core::sync::atomic::{AtomicU32, Ordering};
use slab::Slab;
use spin::Mutex as SpinMutex;

use crate::{
    AllocIdError, Config, InvalidIdError, ObjectId, ObjectToken, ObjectType, OBJECT_ID_SERIAL_BITS,
};

/// Fixed-capacity slot allocator for every object category.
///
/// Each category has its own table. A slot is exclusively owned by the
/// holder of its [`ObjectToken`] from [`IdMap::allocate`] until
/// [`IdMap::release`], so no two create/delete operations on the same slot
/// can ever be in flight at once.
#[derive(Debug)]
pub struct IdMap {
    tables: [Table; ObjectType::COUNT],
}

#[derive(Debug)]
struct Table {
    slots: SpinMutex<Slab<ObjectId>>,
    capacity: usize,
    next_serial: AtomicU32,
}

impl IdMap {
    pub fn new(config: &Config) -> Self {
        Self {
            tables: ObjectType::ALL.map(|ty| {
                let capacity = config.capacity(ty);
                Table {
                    slots: SpinMutex::new(Slab::with_capacity(capacity)),
                    capacity,
                    next_serial: AtomicU32::new(0),
                }
            }),
        }
    }

    /// Reserve a slot in the table of `obj_type`.
    pub fn allocate(&self, obj_type: ObjectType) -> Result<ObjectToken, AllocIdError> {
        let table = &self.tables[obj_type.index()];
        let mut slots = table.slots.lock();
        if slots.len() >= table.capacity {
            log::warn!("no free slot for {obj_type:?} (capacity = {})", table.capacity);
            return Err(AllocIdError::ErrNoFreeIds);
        }

        // Serial numbers wrap around; skip the ones still in use
        let obj_id = (0..1u32 << OBJECT_ID_SERIAL_BITS)
            .map(|_| ObjectId::new(obj_type, table.next_serial.fetch_add(1, Ordering::Relaxed)))
            .find(|candidate| !slots.iter().any(|(_, id)| id == candidate))
            .ok_or(AllocIdError::ErrNoFreeIds)?;
        let obj_idx = slots.insert(obj_id);
        debug_assert!(obj_idx < table.capacity);

        log::trace!("allocate({obj_type:?}) = {obj_id} @ {obj_idx}");
        Ok(ObjectToken::new(obj_type, obj_idx, obj_id))
    }

    /// Return a slot to its table. The token must not be used afterwards.
    pub fn release(&self, token: ObjectToken) -> Result<(), InvalidIdError> {
        log::trace!("release({token:?})");
        let table = &self.tables[token.obj_type().index()];
        let mut slots = table.slots.lock();
        match slots.get(token.obj_idx()) {
            Some(id) if *id == token.obj_id() => {
                slots.remove(token.obj_idx());
                Ok(())
            }
            _ => Err(InvalidIdError::InvalidId),
        }
    }

    /// Find the token of a live object by its public ID.
    pub fn token_for_id(
        &self,
        obj_type: ObjectType,
        obj_id: ObjectId,
    ) -> Result<ObjectToken, InvalidIdError> {
        if obj_id.obj_type() != obj_type {
            return Err(InvalidIdError::InvalidId);
        }
        let slots = self.tables[obj_type.index()].slots.lock();
        slots
            .iter()
            .find(|(_, id)| **id == obj_id)
            .map(|(obj_idx, _)| ObjectToken::new(obj_type, obj_idx, obj_id))
            .ok_or(InvalidIdError::InvalidId)
    }

    /// Get the number of live objects of `obj_type`.
    pub fn len(&self, obj_type: ObjectType) -> usize {
        self.tables[obj_type.index()].slots.lock().len()
    }

    pub fn capacity(&self, obj_type: ObjectType) -> usize {
        self.tables[obj_type.index()].capacity
    }
}
