//! Kernel primitive facade over the host OS.
//!
//! The object modules only ever talk to the host through this module. It
//! provides what an RTOS kernel would: mutexes, condition variables,
//! counting semaphores and threads with a cancellation request. Every
//! primitive holds an accounting handle so that the fixed handle tables of a
//! real kernel can be emulated with [`ResourceLimits`].
//!
//! Cancellation is cooperative. A cancelled kernel thread terminates when it
//! reaches a cancellation point: [`sleep`], [`test_cancel`], or any blocking
//! wait on a primitive created here.
use std::{
    any::Any,
    cell::RefCell,
    fmt, panic,
    sync::{
        self,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

use spin::Mutex as SpinMutex;

#[cfg(target_os = "linux")]
#[path = "kernel/priority_linux.rs"]
mod priority;
#[cfg(not(target_os = "linux"))]
#[path = "kernel/priority_unsupported.rs"]
mod priority;

/// The number of distinct kernel thread priorities. `0` is the highest.
pub const NUM_PRIORITY_LEVELS: u8 = 8;

/// Helper threads never get a smaller stack than this.
pub const MIN_STACK_SIZE: usize = 256 * 1024;

/// How often a kernel thread blocked in a wait checks for a cancellation
/// request.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Failure of a kernel facade operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// The handle or thread limit was reached.
    NoResources,
    /// The host refused to create a thread.
    SpawnFailed,
    /// A semaphore count would exceed `u32::MAX`.
    Overflow,
    /// The semaphore was closed.
    Closed,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for KernelError {}

/// Emulated sizes of the kernel's handle tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// The maximum number of live kernel threads.
    pub max_threads: usize,
    /// The maximum number of live synchronization primitives.
    pub max_handles: usize,
}

impl ResourceLimits {
    pub const UNLIMITED: Self = Self {
        max_threads: usize::MAX,
        max_handles: usize::MAX,
    };
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

/// The outcome of a timed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The wait returned before the deadline. This includes spurious
    /// wake-ups; callers re-check their predicate.
    Signaled,
    TimedOut,
}

/// The entry point to the kernel facade.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

struct KernelInner {
    limits: ResourceLimits,
    live_threads: AtomicUsize,
    live_handles: AtomicUsize,
    next_thread_id: AtomicU64,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("limits", &self.inner.limits)
            .field("live_threads", &self.live_threads())
            .field("live_handles", &self.live_handles())
            .finish()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(ResourceLimits::UNLIMITED)
    }
}

impl Kernel {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            inner: Arc::new(KernelInner {
                limits,
                live_threads: AtomicUsize::new(0),
                live_handles: AtomicUsize::new(0),
                next_thread_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn limits(&self) -> ResourceLimits {
        self.inner.limits
    }

    /// Get the number of kernel threads that have not exited yet.
    pub fn live_threads(&self) -> usize {
        self.inner.live_threads.load(Ordering::Acquire)
    }

    /// Get the number of live synchronization primitives.
    pub fn live_handles(&self) -> usize {
        self.inner.live_handles.load(Ordering::Acquire)
    }

    fn handle(&self) -> Result<Handle, KernelError> {
        Handle::acquire(&self.inner, HandleKind::Primitive)
    }

    /// Create a mutex protecting `value`.
    pub fn mutex<T>(&self, value: T) -> Result<Mutex<T>, KernelError> {
        Ok(Mutex {
            inner: sync::Mutex::new(value),
            _handle: self.handle()?,
        })
    }

    pub fn condvar(&self) -> Result<Condvar, KernelError> {
        Ok(Condvar {
            inner: sync::Condvar::new(),
            _handle: self.handle()?,
        })
    }

    /// Create a counting semaphore with the specified initial count.
    pub fn semaphore(&self, initial_count: u32) -> Result<Semaphore, KernelError> {
        Ok(Semaphore {
            state: sync::Mutex::new(SemState {
                count: initial_count,
                closed: false,
            }),
            cond: sync::Condvar::new(),
            _handle: self.handle()?,
        })
    }

    /// Create a mutex with explicit lock and unlock operations.
    pub fn raw_mutex(&self, recursive: bool) -> Result<RawMutex, KernelError> {
        Ok(RawMutex {
            state: sync::Mutex::new(RawMutexState {
                owner: None,
                depth: 0,
            }),
            cond: sync::Condvar::new(),
            recursive,
            _handle: self.handle()?,
        })
    }

    pub fn raw_condvar(&self) -> Result<RawCondvar, KernelError> {
        Ok(RawCondvar {
            seq: sync::Mutex::new(0),
            cond: sync::Condvar::new(),
            _handle: self.handle()?,
        })
    }

    /// Spawn a kernel thread.
    ///
    /// The thread applies its own priority before running `f`. A panic in
    /// `f` is logged and ends the thread; [`exit_thread`] ends it silently.
    pub fn spawn(
        &self,
        attr: ThreadAttr,
        f: impl FnOnce() + Send + 'static,
    ) -> Result<ThreadHandle, KernelError> {
        let slot = Handle::acquire(&self.inner, HandleKind::Thread)?;

        let id = KernelThreadId(self.inner.next_thread_id.fetch_add(1, Ordering::Relaxed));
        let control = Arc::new(ThreadControl {
            id,
            cancel_requested: AtomicBool::new(false),
            sleep_lock: sync::Mutex::new(()),
            sleep_cond: sync::Condvar::new(),
        });
        let control2 = Arc::clone(&control);
        let priority = attr.priority.min(NUM_PRIORITY_LEVELS - 1);

        log::trace!("spawn({:?}) = {id:?}", attr.name);

        let std_handle = thread::Builder::new()
            .name(attr.name.replace('\0', ""))
            .stack_size(attr.stack_size.max(MIN_STACK_SIZE))
            .spawn(move || {
                // Released when this thread exits
                let _slot = slot;

                priority::apply(priority);
                CURRENT.with(|c| *c.borrow_mut() = Some(control2));

                let result = panic::catch_unwind(panic::AssertUnwindSafe(f));

                CURRENT.with(|c| c.borrow_mut().take());

                if let Err(payload) = result {
                    if payload.is::<ThreadExit>() {
                        log::trace!("{id:?} exited");
                    } else {
                        log::error!("{id:?} panicked: {}", panic_message(&*payload));
                    }
                }
            })
            .map_err(|e| {
                log::warn!("failed to spawn a thread: {e}");
                KernelError::SpawnFailed
            })?;

        Ok(ThreadHandle {
            control,
            std_thread_id: std_handle.thread().id(),
            join_handle: SpinMutex::new(Some(std_handle)),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string payload>"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    Thread,
    Primitive,
}

impl KernelInner {
    fn counter(&self, kind: HandleKind) -> (&AtomicUsize, usize) {
        match kind {
            HandleKind::Thread => (&self.live_threads, self.limits.max_threads),
            HandleKind::Primitive => (&self.live_handles, self.limits.max_handles),
        }
    }
}

/// An accounting token for one kernel resource.
struct Handle {
    kernel: Arc<KernelInner>,
    kind: HandleKind,
}

impl Handle {
    fn acquire(kernel: &Arc<KernelInner>, kind: HandleKind) -> Result<Self, KernelError> {
        let (counter, limit) = kernel.counter(kind);
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .map_err(|_| {
                log::warn!("kernel {kind:?} limit ({limit}) reached");
                KernelError::NoResources
            })?;
        Ok(Self {
            kernel: Arc::clone(kernel),
            kind,
        })
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.kernel.counter(self.kind).0.fetch_sub(1, Ordering::AcqRel);
    }
}

// Mutex and condition variable
// ---------------------------------------------------------------------------

pub type MutexGuard<'a, T> = sync::MutexGuard<'a, T>;

/// A mutex that owns the data it protects.
///
/// A panic while the lock is held does not make the data inaccessible.
pub struct Mutex<T> {
    inner: sync::Mutex<T>,
    _handle: Handle,
}

impl<T> Mutex<T> {
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Mutex").field(&*self.lock()).finish()
    }
}

/// A condition variable to be used with [`Mutex`]. Waits may wake up
/// spuriously.
pub struct Condvar {
    inner: sync::Condvar,
    _handle: Handle,
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condvar")
    }
}

impl Condvar {
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        wait_on(&self.inner, guard, None).0
    }

    pub fn wait_until<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        deadline: Instant,
    ) -> (MutexGuard<'a, T>, WaitStatus) {
        wait_on(&self.inner, guard, Some(deadline))
    }

    pub fn wait_timeout<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
    ) -> (MutexGuard<'a, T>, WaitStatus) {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(guard, deadline),
            None => (self.wait(guard), WaitStatus::Signaled),
        }
    }

    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}

/// Block on `cond` once. This is a cancellation point when called by a
/// kernel thread.
fn wait_on<'a, T>(
    cond: &sync::Condvar,
    guard: sync::MutexGuard<'a, T>,
    deadline: Option<Instant>,
) -> (sync::MutexGuard<'a, T>, WaitStatus) {
    let cancellable = is_kernel_thread();
    let now = Instant::now();
    let slice = match deadline {
        Some(deadline) if now >= deadline => return (guard, WaitStatus::TimedOut),
        Some(deadline) if cancellable => (deadline - now).min(CANCEL_POLL_INTERVAL),
        Some(deadline) => deadline - now,
        None if cancellable => CANCEL_POLL_INTERVAL,
        None => {
            let guard = cond.wait(guard).unwrap_or_else(PoisonError::into_inner);
            return (guard, WaitStatus::Signaled);
        }
    };

    let (guard, _) = cond
        .wait_timeout(guard, slice)
        .unwrap_or_else(PoisonError::into_inner);

    if cancellable && is_cancel_requested() {
        drop(guard);
        // A notification consumed by this thread must not be lost
        cond.notify_all();
        exit_thread();
    }

    match deadline {
        Some(deadline) if Instant::now() >= deadline => (guard, WaitStatus::TimedOut),
        _ => (guard, WaitStatus::Signaled),
    }
}

// Counting semaphore
// ---------------------------------------------------------------------------

/// Failure of [`Semaphore::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemWaitError {
    Timeout,
    /// The semaphore was closed. Pending and future waits fail with this.
    Closed,
}

pub struct Semaphore {
    state: sync::Mutex<SemState>,
    cond: sync::Condvar,
    _handle: Handle,
}

#[derive(Debug)]
struct SemState {
    count: u32,
    closed: bool,
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Semaphore").field(&*self.lock()).finish()
    }
}

impl Semaphore {
    fn lock(&self) -> sync::MutexGuard<'_, SemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Increment the count and wake up one waiter.
    pub fn post(&self) -> Result<(), KernelError> {
        let mut state = self.lock();
        if state.closed {
            return Err(KernelError::Closed);
        }
        state.count = state.count.checked_add(1).ok_or(KernelError::Overflow)?;
        self.cond.notify_one();
        Ok(())
    }

    /// Decrement the count, waiting up to `timeout` (or indefinitely if
    /// `None`) for it to become nonzero. A zero timeout never blocks.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<(), SemWaitError> {
        let deadline = timeout.map(|timeout| {
            Instant::now()
                .checked_add(timeout)
                .unwrap_or_else(far_future)
        });

        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(SemWaitError::Closed);
            }
            if state.count > 0 {
                state.count -= 1;
                return Ok(());
            }
            let (new_state, status) = wait_on(&self.cond, state, deadline);
            state = new_state;
            if status == WaitStatus::TimedOut && state.count == 0 && !state.closed {
                return Err(SemWaitError::Timeout);
            }
        }
    }

    /// Decrement the count if it is nonzero.
    pub fn try_wait(&self) -> Result<(), SemWaitError> {
        self.wait(Some(Duration::ZERO))
    }

    /// Reset the count to zero. Returns the discarded count.
    pub fn drain(&self) -> u32 {
        std::mem::take(&mut self.lock().count)
    }

    /// Make every pending and future [`Self::wait`] fail with
    /// [`SemWaitError::Closed`].
    pub fn close(&self) {
        self.lock().closed = true;
        self.cond.notify_all();
    }

    pub fn value(&self) -> u32 {
        self.lock().count
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365 * 30)
}

// Raw mutex and condition variable
// ---------------------------------------------------------------------------

/// Failure of a [`RawMutex`] or [`RawCondvar`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawMutexError {
    /// The calling thread does not own the mutex.
    NotOwner,
    /// The calling thread already owns the non-recursive mutex.
    WouldDeadlock,
}

/// A mutex that is locked and unlocked by separate calls, tracking the
/// owning thread.
pub struct RawMutex {
    state: sync::Mutex<RawMutexState>,
    cond: sync::Condvar,
    recursive: bool,
    _handle: Handle,
}

#[derive(Debug)]
struct RawMutexState {
    owner: Option<thread::ThreadId>,
    depth: u32,
}

impl fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMutex")
            .field("state", &*self.lock_state())
            .field("recursive", &self.recursive)
            .finish()
    }
}

impl RawMutex {
    fn lock_state(&self) -> sync::MutexGuard<'_, RawMutexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lock(&self) -> Result<(), RawMutexError> {
        let me = thread::current().id();
        let mut state = self.lock_state();
        if state.owner == Some(me) {
            if !self.recursive {
                return Err(RawMutexError::WouldDeadlock);
            }
            state.depth += 1;
            return Ok(());
        }
        while state.owner.is_some() {
            state = wait_on(&self.cond, state, None).0;
        }
        state.owner = Some(me);
        state.depth = 1;
        Ok(())
    }

    pub fn unlock(&self) -> Result<(), RawMutexError> {
        let mut state = self.lock_state();
        if state.owner != Some(thread::current().id()) {
            return Err(RawMutexError::NotOwner);
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.cond.notify_one();
        }
        Ok(())
    }

    pub fn is_locked_by_current_thread(&self) -> bool {
        self.lock_state().owner == Some(thread::current().id())
    }

    /// Release every level of ownership held by the current thread. Returns
    /// the depth to be passed to [`Self::relock`].
    fn unlock_all(&self) -> Result<u32, RawMutexError> {
        let mut state = self.lock_state();
        if state.owner != Some(thread::current().id()) {
            return Err(RawMutexError::NotOwner);
        }
        let depth = std::mem::take(&mut state.depth);
        state.owner = None;
        self.cond.notify_one();
        Ok(depth)
    }

    fn relock(&self, depth: u32) {
        let me = thread::current().id();
        let mut state = self.lock_state();
        while state.owner.is_some() {
            state = wait_on(&self.cond, state, None).0;
        }
        state.owner = Some(me);
        state.depth = depth;
    }
}

/// A condition variable to be used with [`RawMutex`]. Waits may wake up
/// spuriously.
pub struct RawCondvar {
    /// Incremented by every signal and broadcast
    seq: sync::Mutex<u64>,
    cond: sync::Condvar,
    _handle: Handle,
}

impl fmt::Debug for RawCondvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawCondvar")
    }
}

impl RawCondvar {
    fn lock_seq(&self) -> sync::MutexGuard<'_, u64> {
        self.seq.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically release `mutex` and wait for a signal, then reacquire
    /// `mutex` at the same recursion depth.
    pub fn wait(&self, mutex: &RawMutex) -> Result<(), RawMutexError> {
        self.wait_inner(mutex, None).map(|_| ())
    }

    pub fn wait_until(
        &self,
        mutex: &RawMutex,
        deadline: Instant,
    ) -> Result<WaitStatus, RawMutexError> {
        self.wait_inner(mutex, Some(deadline))
    }

    fn wait_inner(
        &self,
        mutex: &RawMutex,
        deadline: Option<Instant>,
    ) -> Result<WaitStatus, RawMutexError> {
        // Holding `seq` across the unlock keeps a signal issued right after
        // the unlock from being missed
        let seq = self.lock_seq();
        let start = *seq;
        let depth = mutex.unlock_all()?;

        let mut seq = seq;
        let status = loop {
            let (new_seq, status) = wait_on(&self.cond, seq, deadline);
            seq = new_seq;
            if *seq != start {
                break WaitStatus::Signaled;
            }
            if status == WaitStatus::TimedOut {
                break WaitStatus::TimedOut;
            }
        };
        drop(seq);

        mutex.relock(depth);
        Ok(status)
    }

    pub fn signal(&self) {
        *self.lock_seq() += 1;
        self.cond.notify_one();
    }

    pub fn broadcast(&self) {
        *self.lock_seq() += 1;
        self.cond.notify_all();
    }
}

// Threads
// ---------------------------------------------------------------------------

/// Identifies a kernel thread. Never reused within a [`Kernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelThreadId(pub u64);

/// The attributes of a new kernel thread.
#[derive(Debug, Clone)]
pub struct ThreadAttr {
    pub name: String,
    /// The kernel priority in range `0..NUM_PRIORITY_LEVELS`. `0` is the
    /// highest.
    pub priority: u8,
    pub stack_size: usize,
}

struct ThreadControl {
    id: KernelThreadId,
    cancel_requested: AtomicBool,
    sleep_lock: sync::Mutex<()>,
    sleep_cond: sync::Condvar,
}

/// The unwinding payload used by [`exit_thread`].
struct ThreadExit;

thread_local! {
    static CURRENT: RefCell<Option<Arc<ThreadControl>>> = RefCell::new(None);
}

fn current_control() -> Option<Arc<ThreadControl>> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Get a flag indicating whether the calling thread was spawned by
/// [`Kernel::spawn`].
pub fn is_kernel_thread() -> bool {
    CURRENT.with(|c| c.borrow().is_some())
}

/// Get the ID of the calling kernel thread.
pub fn current_thread_id() -> Option<KernelThreadId> {
    CURRENT.with(|c| c.borrow().as_ref().map(|c| c.id))
}

fn is_cancel_requested() -> bool {
    CURRENT.with(|c| {
        c.borrow()
            .as_ref()
            .map_or(false, |c| c.cancel_requested.load(Ordering::Acquire))
    })
}

/// Terminate the calling kernel thread.
///
/// The remainder of the thread's body is skipped, but destructors of live
/// values run.
///
/// # Panics
///
/// Panics if the calling thread was not spawned by [`Kernel::spawn`].
pub fn exit_thread() -> ! {
    assert!(
        is_kernel_thread(),
        "this thread wasn't started by `Kernel::spawn`"
    );
    panic::resume_unwind(Box::new(ThreadExit));
}

/// Terminate the calling kernel thread if its cancellation was requested.
pub fn test_cancel() {
    if is_cancel_requested() {
        log::trace!("{:?}: cancelled", current_thread_id());
        exit_thread();
    }
}

/// Suspend the calling thread for `duration`. This is a cancellation point.
pub fn sleep(duration: Duration) {
    let Some(control) = current_control() else {
        thread::sleep(duration);
        return;
    };

    let deadline = Instant::now().checked_add(duration);
    let mut guard = control
        .sleep_lock
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    loop {
        if control.cancel_requested.load(Ordering::Acquire) {
            drop(guard);
            drop(control);
            exit_thread();
        }
        let now = Instant::now();
        let remaining = match deadline {
            Some(deadline) if now >= deadline => return,
            Some(deadline) => deadline - now,
            None => Duration::MAX,
        };
        guard = control
            .sleep_cond
            .wait_timeout(guard, remaining)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
}

/// A handle to a kernel thread.
pub struct ThreadHandle {
    control: Arc<ThreadControl>,
    std_thread_id: thread::ThreadId,
    join_handle: SpinMutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadHandle").field(&self.control.id).finish()
    }
}

impl ThreadHandle {
    pub fn id(&self) -> KernelThreadId {
        self.control.id
    }

    /// Get a flag indicating whether this handle refers to the calling
    /// thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.std_thread_id
    }

    /// Request the thread to terminate at its next cancellation point.
    pub fn cancel(&self) {
        log::trace!("cancel({:?})", self.control.id);
        self.control.cancel_requested.store(true, Ordering::Release);
        let _guard = self
            .control
            .sleep_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.control.sleep_cond.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle
            .lock()
            .as_ref()
            .map_or(true, |jh| jh.is_finished())
    }

    /// Wait for the thread to exit. Returns immediately if the thread was
    /// already joined or if called by the thread itself.
    pub fn join(&self) {
        if self.is_current() {
            return;
        }
        let Some(jh) = self.join_handle.lock().take() else {
            return;
        };
        // Panics were already reported by the thread itself
        let _ = jh.join();
    }
}
