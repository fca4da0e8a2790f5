use osal_core::{CountSemCreateError, ObjectType, SemTimedWaitError, SEM_VALUE_MAX};
use std::{sync::Arc, thread, time::Duration};

use crate::TestPort;

#[test]
fn out_of_range_initial_value_creates_nothing() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::CountSem);
    let handles = t.port.kernel().live_handles();

    assert_eq!(
        t.port.count_sem_create(&token, SEM_VALUE_MAX + 1, 0),
        Err(CountSemCreateError::InvalidSemValue)
    );
    assert_eq!(t.port.kernel().live_handles(), handles);
    assert!(t.port.count_sem_take(&token).is_err());
}

#[test]
fn producer_consumer() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::CountSem);
    t.port.count_sem_create(&token, 0, 0).unwrap();

    let port = Arc::clone(&t.port);
    let producer = thread::spawn(move || {
        for _ in 0..10 {
            port.count_sem_give(&token).unwrap();
            thread::sleep(Duration::from_millis(1));
        }
    });
    for _ in 0..10 {
        t.port.count_sem_take(&token).unwrap();
    }
    producer.join().unwrap();
    assert_eq!(
        t.port.count_sem_timed_wait(&token, 10),
        Err(SemTimedWaitError::SemTimeout)
    );
}

#[test]
fn delete_releases_the_semaphore() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::CountSem);
    let handles = t.port.kernel().live_handles();
    t.port.count_sem_create(&token, 3, 0).unwrap();
    assert_eq!(t.port.kernel().live_handles(), handles + 1);
    t.port.count_sem_delete(&token).unwrap();
    assert_eq!(t.port.kernel().live_handles(), handles);
}
