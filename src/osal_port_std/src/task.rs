//! Tasks
use once_cell::sync::OnceCell;
use osal_core::{
    msecs_to_duration, InvalidIdError, NotImplementedError, ObjectId,
    ObjectToken, TaskError, ValidateSystemDataError,
};
use std::{cell::Cell, fmt, mem::size_of, sync::Arc};

use crate::{
    kernel::{self, KernelThreadId, ThreadAttr, ThreadHandle, NUM_PRIORITY_LEVELS},
    table, Port,
};

/// The parameters of a new task.
pub struct TaskAttr {
    pub name: String,
    /// The portable-layer priority in range `0..=max_task_priority`. Lower
    /// values are more urgent.
    pub priority: u32,
    pub stack_size: usize,
    pub entry: Box<dyn FnOnce() + Send>,
}

impl fmt::Debug for TaskAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskAttr")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("stack_size", &self.stack_size)
            .finish_non_exhaustive()
    }
}

/// The properties reported by [`Port::task_get_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskProp {
    /// The priority after remapping to the kernel's levels
    pub kernel_priority: u8,
    pub thread_id: KernelThreadId,
}

pub(crate) struct TaskRecord {
    obj_id: ObjectId,
    kernel_priority: u8,
    /// Set once the thread is running
    thread: OnceCell<ThreadHandle>,
}

/// What a task's thread receives from its creator.
struct TaskEntryArg {
    record: Arc<TaskRecord>,
    entry: Box<dyn FnOnce() + Send>,
}

impl TaskEntryArg {
    fn run(self) {
        let Self { record, entry } = self;
        // Don't run the entry before the creator has published the thread
        // handle, so the task can look itself up
        record.thread.wait();
        let obj_id = record.obj_id;
        drop(record);

        CURRENT_TASK.with(|c| c.set(Some(obj_id)));
        log::debug!("task {obj_id} started");
        entry();
        log::debug!("task {obj_id} returned");
    }
}

thread_local! {
    static CURRENT_TASK: Cell<Option<ObjectId>> = Cell::new(None);
}

/// Map a portable-layer priority onto the kernel's [`NUM_PRIORITY_LEVELS`]
/// levels by dividing it into equal bands.
pub(crate) fn remap_priority(priority: u32, max_task_priority: u32) -> u8 {
    let band = (max_task_priority.saturating_add(1) / u32::from(NUM_PRIORITY_LEVELS)).max(1);
    (priority / band).min(u32::from(NUM_PRIORITY_LEVELS - 1)) as u8
}

impl Port {
    fn task(&self, token: &ObjectToken) -> Result<Arc<TaskRecord>, InvalidIdError> {
        table(&self.tasks)?.get(token)
    }

    /// Create a task and start running `attr.entry` in a new kernel thread.
    pub fn task_create(&self, token: &ObjectToken, attr: TaskAttr) -> Result<(), TaskError> {
        log::trace!("task_create({token:?}, {attr:?})");
        let table = table(&self.tasks)?;

        let kernel_priority = remap_priority(attr.priority, self.config.max_task_priority);
        let record = Arc::new(TaskRecord {
            obj_id: token.obj_id(),
            kernel_priority,
            thread: OnceCell::new(),
        });
        table.install(token, Arc::clone(&record))?;

        let arg = TaskEntryArg {
            record: Arc::clone(&record),
            entry: attr.entry,
        };
        let spawned = self.kernel.spawn(
            ThreadAttr {
                name: attr.name,
                priority: kernel_priority,
                stack_size: attr.stack_size,
            },
            move || arg.run(),
        );

        match spawned {
            Ok(thread) => {
                let _ = record.thread.set(thread);
                Ok(())
            }
            Err(e) => {
                log::warn!("task_create({token:?}): {e}");
                table.remove(token)?;
                Err(TaskError::Error)
            }
        }
    }

    /// Delete a task. If the calling thread is the task itself, this does not
    /// return. Otherwise the task is cancelled and waited for; it must reach
    /// a cancellation point for this to complete.
    pub fn task_delete(&self, token: &ObjectToken) -> Result<(), TaskError> {
        log::trace!("task_delete({token:?})");
        let record = table(&self.tasks)?.remove(token)?;

        if self.task_get_id() == Some(record.obj_id) {
            log::debug!("task {} deleted itself", record.obj_id);
            drop(record);
            kernel::exit_thread();
        }

        if let Some(thread) = record.thread.get() {
            thread.cancel();
            thread.join();
        }
        log::debug!("task {} deleted", record.obj_id);
        Ok(())
    }

    /// Terminate the calling task and release its record.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread is not a task.
    pub fn task_exit(&self) -> ! {
        log::trace!("task_exit()");
        if let (Some(obj_id), Ok(table)) = (self.task_get_id(), table(&self.tasks)) {
            if let Some((token, _)) = table.find(|r| r.obj_id == obj_id) {
                let _ = table.remove(&token);
            }
        }
        kernel::exit_thread();
    }

    /// Suspend the calling task for `msecs` milliseconds. A pending
    /// deletion takes effect here.
    pub fn task_delay(&self, msecs: u32) -> Result<(), TaskError> {
        log::trace!("task_delay({msecs})");
        kernel::sleep(msecs_to_duration(msecs));
        Ok(())
    }

    /// Threads of this backend are never joined by the portable layer, so
    /// there is nothing to detach.
    pub fn task_detach(&self, token: &ObjectToken) -> Result<(), NotImplementedError> {
        log::trace!("task_detach({token:?})");
        Err(NotImplementedError::NotImplemented)
    }

    pub fn task_set_priority(
        &self,
        token: &ObjectToken,
        priority: u32,
    ) -> Result<(), NotImplementedError> {
        log::trace!("task_set_priority({token:?}, {priority})");
        Err(NotImplementedError::NotImplemented)
    }

    /// Succeed iff the calling thread is the task of `token`.
    pub fn task_match(&self, token: &ObjectToken) -> Result<(), TaskError> {
        log::trace!("task_match({token:?})");
        let record = self.task(token)?;
        if self.task_get_id() == Some(record.obj_id) {
            Ok(())
        } else {
            Err(TaskError::Error)
        }
    }

    /// Nothing needs to be registered; the task's identity is set up when
    /// its thread starts.
    pub fn task_register(&self, token: &ObjectToken) -> Result<(), TaskError> {
        log::trace!("task_register({token:?})");
        self.task(token)?;
        Ok(())
    }

    /// Get the ID of the calling task, or `None` if the calling thread is not
    /// a task.
    pub fn task_get_id(&self) -> Option<ObjectId> {
        CURRENT_TASK.with(|c| c.get())
    }

    pub fn task_get_info(&self, token: &ObjectToken) -> Result<TaskProp, InvalidIdError> {
        log::trace!("task_get_info({token:?})");
        let record = self.task(token)?;
        let thread = record.thread.get().ok_or(InvalidIdError::InvalidId)?;
        Ok(TaskProp {
            kernel_priority: record.kernel_priority,
            thread_id: thread.id(),
        })
    }

    /// Check that `sysdata` has the shape of a kernel thread ID.
    pub fn task_validate_system_data(
        &self,
        sysdata: &[u8],
    ) -> Result<(), ValidateSystemDataError> {
        if sysdata.len() != size_of::<u64>() {
            return Err(ValidateSystemDataError::InvalidPointer);
        }
        Ok(())
    }

    /// Get a flag indicating whether `sysdata` (a kernel thread ID in native
    /// byte order) identifies the thread of the task of `token`.
    pub fn task_id_match_system_data(&self, token: &ObjectToken, sysdata: &[u8]) -> bool {
        let Ok(bytes) = <[u8; size_of::<u64>()]>::try_from(sysdata) else {
            return false;
        };
        let thread_id = KernelThreadId(u64::from_ne_bytes(bytes));
        self.task(token)
            .ok()
            .and_then(|record| record.thread.get().map(|t| t.id() == thread_id))
            .unwrap_or(false)
    }
}
