//! Bounded message queues
use osal_core::{
    InvalidIdError, ObjectToken, QueueCreateError, QueueGetError, QueuePutError, Timeout,
};
use std::{sync::Arc, time::Instant};

use crate::{
    kernel::{self, WaitStatus},
    table, Port,
};

pub(crate) struct QueueRecord {
    ring: kernel::Mutex<Ring>,
    /// Signalled by every put
    not_empty: kernel::Condvar,
}

/// A fixed-capacity ring of variable-length messages. Message `i` occupies
/// `data_block[i * max_size..][..sizes[i]]`.
#[derive(Debug)]
struct Ring {
    data_block: Vec<u8>,
    sizes: Vec<usize>,
    /// The slot of the oldest message
    head: usize,
    /// The slot the next message goes to
    tail: usize,
    current_size: usize,
    max_depth: usize,
    max_size: usize,
}

impl Ring {
    fn new(max_depth: usize, max_size: usize) -> Result<Self, QueueCreateError> {
        let data_len = max_depth
            .checked_mul(max_size)
            .ok_or(QueueCreateError::Error)?;

        let mut sizes = Vec::new();
        sizes
            .try_reserve_exact(max_depth)
            .map_err(|_| QueueCreateError::Error)?;
        sizes.resize(max_depth, 0);

        let mut data_block = Vec::new();
        data_block
            .try_reserve_exact(data_len)
            .map_err(|_| QueueCreateError::Error)?;
        data_block.resize(data_len, 0);

        Ok(Self {
            data_block,
            sizes,
            head: 0,
            tail: 0,
            current_size: 0,
            max_depth,
            max_size,
        })
    }

    fn slot_mut(&mut self, i: usize) -> &mut [u8] {
        &mut self.data_block[i * self.max_size..][..self.max_size]
    }

    fn push(&mut self, data: &[u8]) -> Result<(), QueuePutError> {
        if data.len() > self.max_size {
            return Err(QueuePutError::QueueInvalidSize);
        }
        if self.current_size >= self.max_depth {
            return Err(QueuePutError::QueueFull);
        }
        let tail = self.tail;
        self.slot_mut(tail)[..data.len()].copy_from_slice(data);
        self.sizes[tail] = data.len();
        self.tail = (tail + 1) % self.max_depth;
        self.current_size += 1;
        Ok(())
    }

    /// Copy out the oldest message. Nothing is consumed if `buf` is too
    /// short.
    fn pop(&mut self, buf: &mut [u8]) -> Result<usize, QueueGetError> {
        debug_assert!(self.current_size > 0);
        let head = self.head;
        let size = self.sizes[head];
        if buf.len() < size {
            return Err(QueueGetError::QueueInvalidSize);
        }
        buf[..size].copy_from_slice(&self.slot_mut(head)[..size]);
        self.head = (head + 1) % self.max_depth;
        self.current_size -= 1;
        Ok(size)
    }
}

/// The properties reported by [`Port::queue_get_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueProp {
    pub max_depth: usize,
    pub max_size: usize,
    /// The number of messages currently queued
    pub depth: usize,
}

impl Port {
    fn queue(&self, token: &ObjectToken) -> Result<Arc<QueueRecord>, InvalidIdError> {
        table(&self.queues)?.get(token)
    }

    /// Create a queue holding up to `max_depth` messages of up to `max_size`
    /// bytes each.
    pub fn queue_create(
        &self,
        token: &ObjectToken,
        max_depth: usize,
        max_size: usize,
        _flags: u32,
    ) -> Result<(), QueueCreateError> {
        log::trace!("queue_create({token:?}, {max_depth}, {max_size})");
        let table = table(&self.queues)?;

        if max_depth == 0 || max_size == 0 {
            return Err(QueueCreateError::QueueInvalidSize);
        }

        let ring = Ring::new(max_depth, max_size).map_err(|e| {
            log::warn!("queue_create({token:?}): out of memory");
            e
        })?;

        let kernel_error = |e: kernel::KernelError| {
            log::warn!("queue_create({token:?}): {e}");
            QueueCreateError::Error
        };
        let ring = self.kernel.mutex(ring).map_err(kernel_error)?;
        let not_empty = self.kernel.condvar().map_err(kernel_error)?;

        table.install(token, Arc::new(QueueRecord { ring, not_empty }))?;
        Ok(())
    }

    pub fn queue_delete(&self, token: &ObjectToken) -> Result<(), InvalidIdError> {
        log::trace!("queue_delete({token:?})");
        table(&self.queues)?.remove(token)?;
        Ok(())
    }

    /// Append a message. Never blocks; a full queue is reported as
    /// `QueueFull`.
    pub fn queue_put(
        &self,
        token: &ObjectToken,
        data: &[u8],
        _flags: u32,
    ) -> Result<(), QueuePutError> {
        log::trace!("queue_put({token:?}, len = {})", data.len());
        let queue = self.queue(token)?;
        let mut ring = queue.ring.lock();
        ring.push(data)?;
        queue.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest message, copying it to `buf`. Returns the length of
    /// the message. If `buf` is too short, the message is left for another
    /// reader.
    pub fn queue_get(
        &self,
        token: &ObjectToken,
        buf: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize, QueueGetError> {
        log::trace!("queue_get({token:?}, len = {}, {timeout:?})", buf.len());
        let queue = self.queue(token)?;
        let deadline = match timeout {
            Timeout::Millis(_) => timeout.to_duration().map(|d| Instant::now() + d),
            Timeout::Pend | Timeout::Check => None,
        };

        let mut ring = queue.ring.lock();
        while ring.current_size == 0 {
            ring = match (timeout, deadline) {
                (Timeout::Check, _) => return Err(QueueGetError::QueueEmpty),
                (_, None) => queue.not_empty.wait(ring),
                (_, Some(deadline)) => {
                    let (ring, status) = queue.not_empty.wait_until(ring, deadline);
                    if status == WaitStatus::TimedOut && ring.current_size == 0 {
                        return Err(QueueGetError::QueueTimeout);
                    }
                    ring
                }
            };
        }
        let result = ring.pop(buf);
        if result.is_err() {
            // The message stays queued; hand the wake-up to another reader
            queue.not_empty.notify_one();
        }
        result
    }

    pub fn queue_get_info(&self, token: &ObjectToken) -> Result<QueueProp, InvalidIdError> {
        log::trace!("queue_get_info({token:?})");
        let queue = self.queue(token)?;
        let ring = queue.ring.lock();
        Ok(QueueProp {
            max_depth: ring.max_depth,
            max_size: ring.max_size,
            depth: ring.current_size,
        })
    }
}
