//! Timebases: a tick source driving a callback.
//!
//! Each timebase has a handler thread that waits for a tick and then invokes
//! the callback with the tick's duration under the handler mutex. The tick
//! comes either from an [`ExternalSync`] supplied by the application or,
//! when there is none, from a timer thread owned by the timebase:
//!
//! ```text
//!             set                     start delay        interval
//!   IDLE ────────────▶ ARMED ─────────────────▶ TICK ◀──────────┐
//!    ▲ ▲                 │ set (re-arm)           │ ────────────┘
//!    │ └─────────────────┘                        │ interval == 0
//!    └────────────────────────────────────────────┘
//!   (any state) ── delete ──▶ FINISHING ──▶ FINISHED
//! ```
//!
//! The timer thread posts the tick semaphore once per tick and the handler
//! thread consumes it, so a slow callback never delays tick generation.
use once_cell::sync::OnceCell;
use osal_core::{
    ticks_to_duration, InvalidIdError, ObjectId, ObjectToken, TimeBaseCreateError,
    TimeBaseSetError,
};
use spin::Mutex as SpinMutex;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::{
    kernel::{self, Kernel, KernelError, ThreadAttr, ThreadHandle, WaitStatus},
    table, Port,
};

/// An application-provided tick source.
pub trait ExternalSync: Send {
    /// Block until the next tick of the timebase `time_base_id` and return
    /// its duration in microseconds.
    fn wait_tick(&mut self, time_base_id: ObjectId) -> u32;
}

impl<T: FnMut(ObjectId) -> u32 + Send> ExternalSync for T {
    fn wait_tick(&mut self, time_base_id: ObjectId) -> u32 {
        self(time_base_id)
    }
}

/// The parameters of a new timebase.
pub struct TimeBaseAttr {
    pub name: String,
    /// The tick source. If `None`, ticks are generated by a timer thread
    /// according to [`Port::time_base_set`].
    pub external_sync: Option<Box<dyn ExternalSync>>,
    /// Called by the handler thread with the duration of each tick in
    /// microseconds.
    pub callback: Box<dyn FnMut(u32) + Send>,
}

impl fmt::Debug for TimeBaseAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeBaseAttr")
            .field("name", &self.name)
            .field("external_sync", &self.external_sync.is_some())
            .finish_non_exhaustive()
    }
}

/// The properties reported by [`Port::time_base_get_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBaseProp {
    /// The interval, or the start time of a one-shot arming, in
    /// microseconds
    pub accuracy_usec: u32,
    /// `true` if the ticks are generated by this backend
    pub simulated: bool,
}

/// How often a deleter waiting for the timer thread checks that the thread
/// is still alive.
const FINISH_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) struct TimeBaseRecord {
    obj_id: ObjectId,
    /// Held by the handler thread while the callback runs
    handler_mutex: kernel::RawMutex,
    handler_thread: OnceCell<ThreadHandle>,
    timer_thread: SpinMutex<Option<ThreadHandle>>,
    /// Set by every arming; the next tick reports the start time
    reset_flag: AtomicBool,
    accuracy_usec: AtomicU32,
    /// Present iff there is no external tick source
    sim: Option<Arc<SimulatedTimer>>,
}

struct SimulatedTimer {
    /// Posted once per tick
    tick_sem: kernel::Semaphore,
    state: kernel::Mutex<TimerState>,
    cond: kernel::Condvar,
}

#[derive(Debug, Default)]
struct TimerState {
    active: bool,
    finished: bool,
    finish_request: bool,
    /// Microseconds
    start_time: u32,
    /// Microseconds
    interval_time: u32,
    /// Incremented by every arming
    generation: u64,
    /// The ticks of the current arming posted but not yet consumed. A tick
    /// consumed from `tick_sem` while this is zero belongs to an earlier
    /// arming.
    undelivered: u32,
}

impl SimulatedTimer {
    fn new(kernel: &Kernel) -> Result<Self, KernelError> {
        Ok(Self {
            tick_sem: kernel.semaphore(0)?,
            state: kernel.mutex(TimerState::default())?,
            cond: kernel.condvar()?,
        })
    }

    fn post_tick(&self, state: &mut TimerState, obj_id: ObjectId) {
        match self.tick_sem.post() {
            Ok(()) => state.undelivered = state.undelivered.saturating_add(1),
            Err(e) => log::warn!("timebase {obj_id}: dropped a tick: {e}"),
        }
    }

    /// The body of the timer thread.
    fn run(&self, obj_id: ObjectId) {
        let mut state = self.state.lock();

        'idle: loop {
            while !state.active && !state.finish_request {
                state = self.cond.wait(state);
            }
            if state.finish_request {
                break;
            }

            let generation = state.generation;
            log::debug!(
                "timebase {obj_id}: armed (start = {}, interval = {})",
                state.start_time,
                state.interval_time
            );
            let mut deadline = Instant::now() + ticks_to_duration(state.start_time);

            loop {
                // Wait for `deadline` unless re-armed or asked to finish
                loop {
                    let (new_state, status) = self.cond.wait_until(state, deadline);
                    state = new_state;
                    if state.finish_request {
                        break 'idle;
                    }
                    if state.generation != generation {
                        continue 'idle;
                    }
                    if status == WaitStatus::TimedOut {
                        break;
                    }
                }

                self.post_tick(&mut state, obj_id);

                if state.interval_time == 0 {
                    log::debug!("timebase {obj_id}: one-shot expired");
                    state.active = false;
                    continue 'idle;
                }
                deadline += ticks_to_duration(state.interval_time);
            }
        }

        log::debug!("timebase {obj_id}: timer thread finished");
        state.finished = true;
        self.cond.notify_all();
    }
}

impl TimeBaseRecord {
    /// Wait for the next tick of the timer thread and get its duration.
    /// Returns `None` when the timebase is being deleted.
    fn wait_simulated_tick(&self, sim: &SimulatedTimer) -> Option<u32> {
        loop {
            sim.tick_sem.wait(None).ok()?;

            let mut state = sim.state.lock();
            if state.undelivered == 0 {
                // Posted before the last arming
                continue;
            }
            state.undelivered -= 1;

            return Some(if self.reset_flag.swap(false, Ordering::AcqRel) {
                state.start_time
            } else {
                state.interval_time
            });
        }
    }

    /// The body of the handler thread.
    fn run_handler(
        &self,
        mut external_sync: Option<Box<dyn ExternalSync>>,
        mut callback: Box<dyn FnMut(u32) + Send>,
    ) {
        loop {
            let tick = match (&mut external_sync, &self.sim) {
                (Some(sync), _) => sync.wait_tick(self.obj_id),
                (None, Some(sim)) => match self.wait_simulated_tick(sim) {
                    Some(tick) => tick,
                    None => break,
                },
                (None, None) => break,
            };

            kernel::test_cancel();

            if let Err(e) = self.handler_mutex.lock() {
                log::error!("timebase {}: handler lock failed: {e:?}", self.obj_id);
                break;
            }
            callback(tick);
            let _ = self.handler_mutex.unlock();
        }
        log::debug!("timebase {}: handler thread finished", self.obj_id);
    }

    /// Stop both helper threads. Returns after the timer thread has exited;
    /// the handler thread exits at its next cancellation point.
    fn shutdown(&self) {
        if let Some(sim) = &self.sim {
            let mut state = sim.state.lock();
            state.active = false;
            state.finish_request = true;
            sim.cond.notify_all();
        }

        if let Some(handler) = self.handler_thread.get() {
            handler.cancel();
        }

        if self.handler_mutex.is_locked_by_current_thread() {
            let _ = self.handler_mutex.unlock();
        }

        if let Some(sim) = &self.sim {
            let mut state = sim.state.lock();
            while !state.finished {
                let timer_alive = self
                    .timer_thread
                    .lock()
                    .as_ref()
                    .map_or(false, |timer| !timer.is_finished());
                if !timer_alive {
                    log::warn!("timebase {}: timer thread is already gone", self.obj_id);
                    break;
                }
                state = sim.cond.wait_timeout(state, FINISH_POLL_INTERVAL).0;
            }
            drop(state);
            sim.tick_sem.close();
        }

        if let Some(timer) = self.timer_thread.lock().take() {
            timer.join();
        }
    }
}

impl Port {
    fn time_base(&self, token: &ObjectToken) -> Result<Arc<TimeBaseRecord>, InvalidIdError> {
        table(&self.time_bases)?.get(token)
    }

    /// Create a timebase and its helper threads. A timebase without an
    /// external tick source produces no ticks until
    /// [`Self::time_base_set`] is called.
    pub fn time_base_create(
        &self,
        token: &ObjectToken,
        attr: TimeBaseAttr,
    ) -> Result<(), TimeBaseCreateError> {
        log::trace!("time_base_create({token:?}, {attr:?})");
        let table = table(&self.time_bases)?;
        let obj_id = token.obj_id();

        let internal = |e: KernelError| {
            log::warn!("time_base_create({token:?}): {e}");
            TimeBaseCreateError::TimerErrInternal
        };

        let handler_mutex = self.kernel.raw_mutex(false).map_err(internal)?;
        let sim = match attr.external_sync {
            Some(_) => None,
            None => Some(Arc::new(SimulatedTimer::new(&self.kernel).map_err(internal)?)),
        };

        let record = Arc::new(TimeBaseRecord {
            obj_id,
            handler_mutex,
            handler_thread: OnceCell::new(),
            timer_thread: SpinMutex::new(None),
            reset_flag: AtomicBool::new(false),
            accuracy_usec: AtomicU32::new(0),
            sim,
        });

        let thread_attr = |role: &str| ThreadAttr {
            name: format!("{}.{role}", attr.name),
            priority: 0,
            stack_size: self.config.timebase_stack_size,
        };

        if let Some(sim) = &record.sim {
            let sim = Arc::clone(sim);
            let timer = self
                .kernel
                .spawn(thread_attr("timer"), move || sim.run(obj_id))
                .map_err(internal)?;
            *record.timer_thread.lock() = Some(timer);
        }

        let record2 = Arc::clone(&record);
        let (external_sync, callback) = (attr.external_sync, attr.callback);
        let handler = self.kernel.spawn(thread_attr("handler"), move || {
            record2.run_handler(external_sync, callback)
        });
        match handler {
            Ok(handler) => {
                let _ = record.handler_thread.set(handler);
            }
            Err(e) => {
                record.shutdown();
                return Err(internal(e));
            }
        }

        if let Err(e) = table.install(token, Arc::clone(&record)) {
            record.shutdown();
            return Err(e.into());
        }
        Ok(())
    }

    /// Arm the timer: the first tick comes after `start_time` microseconds,
    /// then one every `interval_time` microseconds. An `interval_time` of
    /// zero arms a single tick, and a `start_time` of zero disarms the
    /// timer. Ticks of the previous arming that were not yet handled are
    /// discarded.
    ///
    /// A `start_time` of zero leaves the timer thread idle. It does not keep
    /// the previous start time and arm a single tick with it, as some other
    /// backends do.
    pub fn time_base_set(
        &self,
        token: &ObjectToken,
        start_time: u32,
        interval_time: u32,
    ) -> Result<(), TimeBaseSetError> {
        log::trace!("time_base_set({token:?}, {start_time}, {interval_time})");
        let record = self.time_base(token)?;

        if start_time > i32::MAX as u32 || interval_time > i32::MAX as u32 {
            return Err(TimeBaseSetError::TimerErrInvalidArgs);
        }

        let interval_time = if start_time == 0 { 0 } else { interval_time };
        let accuracy = if interval_time != 0 {
            interval_time
        } else {
            start_time
        };
        record.accuracy_usec.store(accuracy, Ordering::Relaxed);

        if let Some(sim) = &record.sim {
            let mut state = sim.state.lock();
            state.start_time = start_time;
            state.interval_time = interval_time;
            state.active = start_time != 0;
            state.generation = state.generation.wrapping_add(1);
            state.undelivered = 0;
            sim.tick_sem.drain();
            record.reset_flag.store(true, Ordering::Release);
            sim.cond.notify_all();
        }
        Ok(())
    }

    /// Delete a timebase. Returns after the timer thread has finished; the
    /// handler thread stops at its next cancellation point.
    pub fn time_base_delete(&self, token: &ObjectToken) -> Result<(), InvalidIdError> {
        log::trace!("time_base_delete({token:?})");
        let record = table(&self.time_bases)?.remove(token)?;
        record.shutdown();
        Ok(())
    }

    /// Acquire the handler mutex, excluding the callback.
    pub fn time_base_lock(&self, token: &ObjectToken) -> Result<(), InvalidIdError> {
        log::trace!("time_base_lock({token:?})");
        let record = self.time_base(token)?;
        if let Err(e) = record.handler_mutex.lock() {
            log::warn!("time_base_lock({token:?}): {e:?}");
        }
        Ok(())
    }

    pub fn time_base_unlock(&self, token: &ObjectToken) -> Result<(), InvalidIdError> {
        log::trace!("time_base_unlock({token:?})");
        let record = self.time_base(token)?;
        if let Err(e) = record.handler_mutex.unlock() {
            log::warn!("time_base_unlock({token:?}): {e:?}");
        }
        Ok(())
    }

    pub fn time_base_get_info(&self, token: &ObjectToken) -> Result<TimeBaseProp, InvalidIdError> {
        log::trace!("time_base_get_info({token:?})");
        let record = self.time_base(token)?;
        Ok(TimeBaseProp {
            accuracy_usec: record.accuracy_usec.load(Ordering::Relaxed),
            simulated: record.sim.is_some(),
        })
    }
}
