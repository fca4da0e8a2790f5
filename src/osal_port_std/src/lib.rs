//! A hosted OSAL backend.
//!
//! This crate implements the per-object operations of the OS abstraction
//! layer (tasks, binary and counting semaphores, mutexes, condition
//! variables, message queues and timebases) on top of the host's threads and
//! locks. The portable layer allocates a slot for each object through
//! [`osal_core::IdMap`] and then calls the operations of [`Port`] with the
//! slot's [`ObjectToken`](osal_core::ObjectToken).
//!
//! # Lifecycle
//!
//! [`Port::api_impl_init`] must be called once for every object category
//! before its objects are used; operations on a category that was never
//! initialized fail with `InvalidId`. [`Port::idle_loop`] parks the calling
//! thread until [`Port::application_shutdown`] is called.
//!
//! # Threads
//!
//! Every task and every timebase helper is a kernel thread created through
//! the [`kernel`] facade. Cancellation is cooperative: a deleted task stops
//! at its next cancellation point (a delay, a blocking wait, or an explicit
//! [`kernel::test_cancel`]).
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms)]
use once_cell::sync::{Lazy, OnceCell};
use osal_core::{Config, IdMap, InitError, InvalidIdError, ObjectType};

pub mod kernel;

mod binsem;
mod condvar;
mod countsem;
mod idmap;
mod mutex;
mod queue;
mod table;
mod task;
mod timebase;

pub use self::{
    binsem::BinSemProp,
    idmap::state_change_backoff,
    queue::QueueProp,
    task::{TaskAttr, TaskProp},
    timebase::{ExternalSync, TimeBaseAttr, TimeBaseProp},
};

use self::{
    binsem::BinSemRecord, condvar::CondVarRecord, countsem::CountSemRecord, idmap::GlobalLock,
    kernel::Kernel, mutex::MutexRecord, queue::QueueRecord, table::ImplTable, task::TaskRecord,
    timebase::TimeBaseRecord,
};

/// The state of one backend instance.
pub struct Port {
    config: Config,
    kernel: Kernel,
    id_map: IdMap,
    /// Posted by [`Self::application_shutdown`]
    idle_sem: OnceCell<kernel::Semaphore>,
    global_locks: [OnceCell<GlobalLock>; ObjectType::COUNT],
    tasks: OnceCell<ImplTable<TaskRecord>>,
    queues: OnceCell<ImplTable<QueueRecord>>,
    count_sems: OnceCell<ImplTable<CountSemRecord>>,
    bin_sems: OnceCell<ImplTable<BinSemRecord>>,
    mutexes: OnceCell<ImplTable<MutexRecord>>,
    time_bases: OnceCell<ImplTable<TimeBaseRecord>>,
    cond_vars: OnceCell<ImplTable<CondVarRecord>>,
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("config", &self.config)
            .field("kernel", &self.kernel)
            .finish_non_exhaustive()
    }
}

static GLOBAL: Lazy<Port> = Lazy::new(|| Port::new(Config::DEFAULT));

impl Port {
    pub fn new(config: Config) -> Self {
        Self::with_kernel(config, Kernel::default())
    }

    /// Construct a `Port` that creates its primitives through `kernel`.
    pub fn with_kernel(config: Config, kernel: Kernel) -> Self {
        Self {
            id_map: IdMap::new(&config),
            config,
            kernel,
            idle_sem: OnceCell::new(),
            global_locks: Default::default(),
            tasks: OnceCell::new(),
            queues: OnceCell::new(),
            count_sems: OnceCell::new(),
            bin_sems: OnceCell::new(),
            mutexes: OnceCell::new(),
            time_bases: OnceCell::new(),
            cond_vars: OnceCell::new(),
        }
    }

    /// Get the process-wide instance, which uses [`Config::DEFAULT`].
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// The slot table that issues the tokens accepted by this instance.
    pub fn id_map(&self) -> &IdMap {
        &self.id_map
    }

    /// Initialize the backend state of an object category.
    ///
    /// The first call for any category also creates the process-wide idle
    /// semaphore. Subsequent calls for the same category do nothing.
    pub fn api_impl_init(&self, obj_type: ObjectType) -> Result<(), InitError> {
        log::trace!("api_impl_init({obj_type:?})");

        let kernel_error = |e: kernel::KernelError| {
            log::error!("api_impl_init({obj_type:?}) failed: {e}");
            InitError::Error
        };

        self.idle_sem
            .get_or_try_init(|| self.kernel.semaphore(0))
            .map_err(kernel_error)?;

        self.global_locks[obj_type.index()]
            .get_or_try_init(|| GlobalLock::new(&self.kernel))
            .map_err(kernel_error)?;

        let capacity = self.config.capacity(obj_type);
        match obj_type {
            ObjectType::Task => {
                self.tasks.get_or_init(|| ImplTable::new(obj_type, capacity));
            }
            ObjectType::Queue => {
                self.queues.get_or_init(|| ImplTable::new(obj_type, capacity));
            }
            ObjectType::CountSem => {
                self.count_sems
                    .get_or_init(|| ImplTable::new(obj_type, capacity));
            }
            ObjectType::BinSem => {
                self.bin_sems.get_or_init(|| ImplTable::new(obj_type, capacity));
            }
            ObjectType::Mutex => {
                self.mutexes.get_or_init(|| ImplTable::new(obj_type, capacity));
            }
            ObjectType::TimeBase => {
                self.time_bases
                    .get_or_init(|| ImplTable::new(obj_type, capacity));
            }
            ObjectType::CondVar => {
                self.cond_vars
                    .get_or_init(|| ImplTable::new(obj_type, capacity));
            }
        }
        Ok(())
    }

    /// Initialize every object category.
    pub fn init_all(&self) -> Result<(), InitError> {
        ObjectType::ALL
            .into_iter()
            .try_for_each(|ty| self.api_impl_init(ty))
    }

    /// Block the calling thread until [`Self::application_shutdown`] is
    /// called.
    pub fn idle_loop(&self) {
        log::trace!("idle_loop()");
        if let Some(sem) = self.idle_sem.get() {
            // `Closed` is never produced; the semaphore is never closed
            let _ = sem.wait(None);
        }
    }

    /// Wake up the thread in [`Self::idle_loop`].
    pub fn application_shutdown(&self) {
        log::trace!("application_shutdown()");
        if let Some(sem) = self.idle_sem.get() {
            if let Err(e) = sem.post() {
                log::warn!("application_shutdown: {e}");
            }
        }
    }
}

fn table<R>(cell: &OnceCell<ImplTable<R>>) -> Result<&ImplTable<R>, InvalidIdError> {
    cell.get().ok_or(InvalidIdError::InvalidId)
}
