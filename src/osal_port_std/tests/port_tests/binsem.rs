use osal_core::{ObjectType, SemTimedWaitError};
use osal_port_std::BinSemProp;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::TestPort;

#[test]
fn give_wakes_blocked_taker() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::BinSem);
    t.port.bin_sem_create(&token, 0, 0).unwrap();

    let port = Arc::clone(&t.port);
    let taker = thread::spawn(move || port.bin_sem_take(&token));

    thread::sleep(Duration::from_millis(50));
    assert!(!taker.is_finished());
    t.port.bin_sem_give(&token).unwrap();
    taker.join().unwrap().unwrap();

    // The give was consumed
    assert_eq!(t.port.bin_sem_get_info(&token), Ok(BinSemProp { value: 0 }));
}

#[test]
fn flush_releases_every_taker() {
    const NUM_TAKERS: usize = 4;
    let t = TestPort::new();
    let token = t.alloc(ObjectType::BinSem);
    t.port.bin_sem_create(&token, 0, 0).unwrap();

    let waiting = Arc::new(AtomicUsize::new(0));
    let (send, recv) = mpsc::channel();
    for _ in 0..NUM_TAKERS {
        let port = Arc::clone(&t.port);
        let waiting = Arc::clone(&waiting);
        let send = send.clone();
        thread::spawn(move || {
            waiting.fetch_add(1, Ordering::SeqCst);
            send.send(port.bin_sem_take(&token)).unwrap();
        });
    }

    while waiting.load(Ordering::SeqCst) < NUM_TAKERS {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(100));
    assert!(recv.try_recv().is_err());

    t.port.bin_sem_flush(&token).unwrap();
    for _ in 0..NUM_TAKERS {
        let result = recv.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Ok(()));
    }

    // Nothing was consumed, and nothing was given either
    assert_eq!(t.port.bin_sem_get_info(&token), Ok(BinSemProp { value: 0 }));
    assert_eq!(
        t.port.bin_sem_timed_wait(&token, 0),
        Err(SemTimedWaitError::SemTimeout)
    );
}

#[test]
fn timed_wait_times_out() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::BinSem);
    t.port.bin_sem_create(&token, 0, 0).unwrap();

    let start = Instant::now();
    assert_eq!(
        t.port.bin_sem_timed_wait(&token, 100),
        Err(SemTimedWaitError::SemTimeout)
    );
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn timed_wait_succeeds_on_give() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::BinSem);
    t.port.bin_sem_create(&token, 0, 0).unwrap();

    let port = Arc::clone(&t.port);
    let giver = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        port.bin_sem_give(&token).unwrap();
    });
    assert_eq!(t.port.bin_sem_timed_wait(&token, 5000), Ok(()));
    giver.join().unwrap();
}

#[test]
fn clamped_initial_value_behaves_like_one() {
    let t = TestPort::new();
    let five = t.alloc(ObjectType::BinSem);
    let one = t.alloc(ObjectType::BinSem);
    t.port.bin_sem_create(&five, 5, 0).unwrap();
    t.port.bin_sem_create(&one, 1, 0).unwrap();

    for token in [five, one] {
        assert_eq!(t.port.bin_sem_get_info(&token), Ok(BinSemProp { value: 1 }));
        assert_eq!(t.port.bin_sem_timed_wait(&token, 0), Ok(()));
        assert_eq!(
            t.port.bin_sem_timed_wait(&token, 0),
            Err(SemTimedWaitError::SemTimeout)
        );
    }
}
