use osal_core::{ObjectType, QueueGetError, QueuePutError, Timeout};
use quickcheck_macros::quickcheck;
use std::{collections::VecDeque, sync::{mpsc, Arc}, thread, time::Duration};

use crate::TestPort;

#[test]
fn accepts_exactly_max_depth() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::Queue);
    t.port.queue_create(&token, 5, 8, 0).unwrap();
    for i in 0..5u8 {
        t.port.queue_put(&token, &[i; 8], 0).unwrap();
    }
    assert_eq!(
        t.port.queue_put(&token, &[9], 0),
        Err(QueuePutError::QueueFull)
    );
}

#[test]
fn pend_wakes_on_put() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::Queue);
    t.port.queue_create(&token, 2, 16, 0).unwrap();

    let port = Arc::clone(&t.port);
    let receiver = thread::spawn(move || {
        let mut buf = [0; 16];
        let len = port.queue_get(&token, &mut buf, Timeout::Pend).unwrap();
        buf[..len].to_vec()
    });

    thread::sleep(Duration::from_millis(30));
    t.port.queue_put(&token, b"hello", 0).unwrap();
    assert_eq!(receiver.join().unwrap(), b"hello");
}

#[test]
fn timed_get_receives_late_message() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::Queue);
    t.port.queue_create(&token, 1, 4, 0).unwrap();

    let port = Arc::clone(&t.port);
    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        port.queue_put(&token, &[7, 7], 0).unwrap();
    });
    let mut buf = [0; 4];
    assert_eq!(
        t.port.queue_get(&token, &mut buf, Timeout::Millis(5000)),
        Ok(2)
    );
    sender.join().unwrap();
}

#[test]
fn short_buffer_passes_message_on() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::Queue);
    t.port.queue_create(&token, 2, 4, 0).unwrap();

    let port = Arc::clone(&t.port);
    let short_reader = thread::spawn(move || {
        let mut buf = [0; 1];
        port.queue_get(&token, &mut buf, Timeout::Pend)
    });
    thread::sleep(Duration::from_millis(30));

    let port = Arc::clone(&t.port);
    let (send, recv) = mpsc::channel();
    let long_reader = thread::spawn(move || {
        let mut buf = [0; 4];
        let result = port.queue_get(&token, &mut buf, Timeout::Pend);
        send.send(result.map(|len| buf[..len].to_vec())).unwrap();
    });
    thread::sleep(Duration::from_millis(30));

    // Whichever reader is woken first, the long one ends up with it
    t.port.queue_put(&token, &[1, 2, 3], 0).unwrap();
    assert_eq!(
        recv.recv_timeout(Duration::from_secs(5)).unwrap(),
        Ok(vec![1, 2, 3])
    );
    long_reader.join().unwrap();

    // Releases the short reader if it is still waiting
    t.port.queue_put(&token, &[9], 0).unwrap();
    let result = short_reader.join().unwrap();
    assert!(
        matches!(result, Ok(1) | Err(QueueGetError::QueueInvalidSize)),
        "{result:?}"
    );
}

/// Puts succeed until the queue holds `max_depth` messages, and gets return
/// messages in the order they were put.
#[quickcheck]
fn qc_fifo(max_depth: u8, ops: Vec<(bool, u8)>) {
    let max_depth = usize::from(max_depth % 8) + 1;
    let t = TestPort::new();
    let token = t.alloc(ObjectType::Queue);
    t.port.queue_create(&token, max_depth, 4, 0).unwrap();

    let mut model = VecDeque::new();
    let mut buf = [0; 4];
    for (put, x) in ops {
        let msg = vec![x; usize::from(x % 4) + 1];
        if put {
            let result = t.port.queue_put(&token, &msg, 0);
            if model.len() < max_depth {
                assert_eq!(result, Ok(()));
                model.push_back(msg);
            } else {
                assert_eq!(result, Err(QueuePutError::QueueFull));
            }
        } else {
            match (t.port.queue_get(&token, &mut buf, Timeout::Check), model.pop_front()) {
                (Ok(len), Some(expected)) => assert_eq!(buf[..len], expected[..]),
                (Err(e), None) => assert_eq!(e, osal_core::QueueGetError::QueueEmpty),
                (result, expected) => panic!("got {result:?}, expected {expected:?}"),
            }
        }
    }
}
