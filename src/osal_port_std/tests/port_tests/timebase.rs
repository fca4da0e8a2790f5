use osal_core::{Config, ObjectId, ObjectType, TimeBaseCreateError};
use osal_port_std::{
    kernel::{self, Kernel, ResourceLimits},
    TimeBaseAttr, TimeBaseProp,
};
use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        mpsc,
    },
    time::{Duration, Instant},
};

use crate::TestPort;

fn recording_attr() -> (TimeBaseAttr, mpsc::Receiver<u32>) {
    let (send, recv) = mpsc::channel();
    let attr = TimeBaseAttr {
        name: "tb".to_owned(),
        external_sync: None,
        callback: Box::new(move |tick| {
            let _ = send.send(tick);
        }),
    };
    (attr, recv)
}

fn recv_n(recv: &mpsc::Receiver<u32>, n: usize) -> Vec<u32> {
    (0..n)
        .map(|_| recv.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect()
}

#[test]
fn reports_start_then_intervals() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::TimeBase);
    let (attr, recv) = recording_attr();
    t.port.time_base_create(&token, attr).unwrap();

    t.port.time_base_set(&token, 30_000, 10_000).unwrap();
    assert_eq!(recv_n(&recv, 5), [30_000, 10_000, 10_000, 10_000, 10_000]);
    assert_eq!(
        t.port.time_base_get_info(&token),
        Ok(TimeBaseProp {
            accuracy_usec: 10_000,
            simulated: true
        })
    );

    // Re-arming restarts the sequence. One tick of the previous arming may
    // already be in the callback.
    t.port.time_base_set(&token, 20_000, 5_000).unwrap();
    let mut ticks = recv_n(&recv, 4);
    if ticks[0] == 10_000 {
        ticks.remove(0);
    }
    assert_eq!(ticks[..3], [20_000, 5_000, 5_000]);

    t.port.time_base_delete(&token).unwrap();
}

#[test]
fn ticks_do_not_drift() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::TimeBase);
    let (attr, recv) = recording_attr();
    t.port.time_base_create(&token, attr).unwrap();

    let start = Instant::now();
    t.port.time_base_set(&token, 10_000, 10_000).unwrap();
    recv_n(&recv, 20);
    let elapsed = start.elapsed();
    // 20 ticks are due at 200 ms
    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");

    t.port.time_base_delete(&token).unwrap();
}

#[test]
fn zero_start_forces_zero_interval() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::TimeBase);
    let (attr, recv) = recording_attr();
    t.port.time_base_create(&token, attr).unwrap();

    t.port.time_base_set(&token, 0, 50_000).unwrap();
    assert!(recv.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(t.port.time_base_get_info(&token).unwrap().accuracy_usec, 0);

    t.port.time_base_delete(&token).unwrap();
}

#[test]
fn delete_mid_wait() {
    let t = TestPort::new();
    let baseline = (t.port.kernel().live_threads(), t.port.kernel().live_handles());
    let token = t.alloc(ObjectType::TimeBase);
    let (attr, _recv) = recording_attr();
    t.port.time_base_create(&token, attr).unwrap();
    assert_eq!(t.port.kernel().live_threads(), baseline.0 + 2);

    // The timer thread is in the middle of a half-hour start delay
    t.port.time_base_set(&token, 2_000_000_000, 0).unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    t.port.time_base_delete(&token).unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(
        t.port.time_base_get_info(&token).err(),
        Some(osal_core::InvalidIdError::InvalidId)
    );
    t.settle(baseline.0, baseline.1);
}

#[test]
fn delete_while_locked() {
    let t = TestPort::new();
    let baseline = (t.port.kernel().live_threads(), t.port.kernel().live_handles());
    let token = t.alloc(ObjectType::TimeBase);
    let (attr, recv) = recording_attr();
    t.port.time_base_create(&token, attr).unwrap();
    t.port.time_base_set(&token, 1_000, 1_000).unwrap();
    recv_n(&recv, 1);

    // The handler thread blocks on the handler mutex
    t.port.time_base_lock(&token).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    recv.try_iter().for_each(drop);
    assert!(recv.recv_timeout(Duration::from_millis(50)).is_err());

    t.port.time_base_delete(&token).unwrap();
    t.settle(baseline.0, baseline.1);
}

#[test]
fn external_sync_drives_callback() {
    let t = TestPort::new();
    let baseline = (t.port.kernel().live_threads(), t.port.kernel().live_handles());
    let token = t.alloc(ObjectType::TimeBase);
    let seen_id: &_ = Box::leak(Box::new(AtomicU32::new(0)));
    let (send, recv) = mpsc::channel();
    t.port
        .time_base_create(
            &token,
            TimeBaseAttr {
                name: "ext".to_owned(),
                external_sync: Some(Box::new(move |id: ObjectId| {
                    seen_id.store(id.get(), Ordering::Relaxed);
                    kernel::sleep(Duration::from_millis(5));
                    1234
                })),
                callback: Box::new(move |tick| {
                    let _ = send.send(tick);
                }),
            },
        )
        .unwrap();

    // Only the handler thread
    assert_eq!(t.port.kernel().live_threads(), baseline.0 + 1);
    assert_eq!(recv_n(&recv, 3), [1234, 1234, 1234]);
    assert_eq!(seen_id.load(Ordering::Relaxed), token.obj_id().get());
    assert!(!t.port.time_base_get_info(&token).unwrap().simulated);

    // `set` only updates the reported accuracy
    t.port.time_base_set(&token, 100, 200).unwrap();
    assert_eq!(t.port.time_base_get_info(&token).unwrap().accuracy_usec, 200);

    t.port.time_base_delete(&token).unwrap();
    t.settle(baseline.0, baseline.1);
}

#[test]
fn create_unwinds_on_spawn_failure() {
    // Room for the timer thread but not for the handler thread
    let t = TestPort::with_kernel(
        Config::DEFAULT,
        Kernel::new(ResourceLimits {
            max_threads: 1,
            max_handles: usize::MAX,
        }),
    );
    let handles = t.port.kernel().live_handles();
    let token = t.alloc(ObjectType::TimeBase);
    let (attr, _recv) = recording_attr();

    assert_eq!(
        t.port.time_base_create(&token, attr),
        Err(TimeBaseCreateError::TimerErrInternal)
    );
    // The timer thread was joined before returning
    assert_eq!(t.port.kernel().live_threads(), 0);
    assert_eq!(t.port.kernel().live_handles(), handles);
    assert!(t.port.time_base_get_info(&token).is_err());
}

#[test]
fn create_unwinds_on_handle_exhaustion() {
    let reference = TestPort::new();
    let handles = reference.port.kernel().live_handles();

    // Room for the handler mutex and the tick semaphore only
    let t = TestPort::with_kernel(
        Config::DEFAULT,
        Kernel::new(ResourceLimits {
            max_threads: usize::MAX,
            max_handles: handles + 2,
        }),
    );
    let token = t.alloc(ObjectType::TimeBase);
    let (attr, _recv) = recording_attr();
    assert_eq!(
        t.port.time_base_create(&token, attr),
        Err(TimeBaseCreateError::TimerErrInternal)
    );
    assert_eq!(t.port.kernel().live_handles(), handles);
    assert_eq!(t.port.kernel().live_threads(), 0);
}

#[test]
fn callback_may_take_long() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::TimeBase);
    let (send, recv) = mpsc::channel();
    t.port
        .time_base_create(
            &token,
            TimeBaseAttr {
                name: "slow".to_owned(),
                external_sync: None,
                callback: Box::new(move |tick| {
                    let _ = send.send(tick);
                    // Slower than the interval; ticks queue up in the
                    // semaphore instead of being lost
                    std::thread::sleep(Duration::from_millis(15));
                }),
            },
        )
        .unwrap();
    t.port.time_base_set(&token, 5_000, 5_000).unwrap();
    assert_eq!(recv_n(&recv, 4), [5_000, 5_000, 5_000, 5_000]);
    t.port.time_base_delete(&token).unwrap();
}
