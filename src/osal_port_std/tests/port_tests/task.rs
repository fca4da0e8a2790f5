use osal_core::{Config, InvalidIdError, NotImplementedError, ObjectType, TaskError};
use osal_port_std::{
    kernel::{self, Kernel, ResourceLimits},
    TaskAttr,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        mpsc, Arc,
    },
    time::Duration,
};

use crate::TestPort;

fn attr(entry: impl FnOnce() + Send + 'static) -> TaskAttr {
    TaskAttr {
        name: "task".to_owned(),
        priority: 100,
        stack_size: 16384,
        entry: Box::new(entry),
    }
}

#[test]
fn identity_inside_task() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::Task);
    let (send, recv) = mpsc::channel();
    let (go_send, go_recv) = mpsc::channel::<()>();

    let port = Arc::clone(&t.port);
    t.port
        .task_create(
            &token,
            attr(move || {
                // Wait until `task_create` has returned
                go_recv.recv().unwrap();
                send.send((port.task_get_id(), port.task_match(&token)))
                    .unwrap();
            }),
        )
        .unwrap();
    go_send.send(()).unwrap();

    let (id, matched) = recv.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(id, Some(token.obj_id()));
    assert_eq!(matched, Ok(()));

    assert_eq!(t.port.task_get_id(), None);
    assert_eq!(t.port.task_match(&token), Err(TaskError::Error));
    t.port.task_register(&token).unwrap();
    assert_eq!(t.port.task_get_info(&token).unwrap().kernel_priority, 3);

    t.port.task_delete(&token).unwrap();
}

#[test]
fn task_finds_itself_on_entry() {
    let t = TestPort::new();
    for _ in 0..20 {
        let token = t.alloc(ObjectType::Task);
        let port = Arc::clone(&t.port);
        let (send, recv) = mpsc::channel();
        t.port
            .task_create(
                &token,
                attr(move || {
                    let me = kernel::current_thread_id().unwrap();
                    let info = port.task_get_info(&token).map(|prop| prop.thread_id);
                    let matched = port.task_id_match_system_data(&token, &me.0.to_ne_bytes());
                    send.send((me, info, matched)).unwrap();
                }),
            )
            .unwrap();

        let (me, info, matched) = recv.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(info, Ok(me));
        assert!(matched);
        t.port.task_delete(&token).unwrap();
        t.port.id_map().release(token).unwrap();
    }
}

#[test]
fn delete_delaying_task() {
    let t = TestPort::new();
    let baseline = (t.port.kernel().live_threads(), t.port.kernel().live_handles());
    let token = t.alloc(ObjectType::Task);
    let iterations: &_ = Box::leak(Box::new(AtomicU32::new(0)));

    let port = Arc::clone(&t.port);
    t.port
        .task_create(
            &token,
            attr(move || loop {
                iterations.fetch_add(1, Ordering::Relaxed);
                port.task_delay(5).unwrap();
            }),
        )
        .unwrap();

    while iterations.load(Ordering::Relaxed) < 3 {
        std::thread::sleep(Duration::from_millis(5));
    }
    t.port.task_delete(&token).unwrap();

    // `task_delete` joins the thread
    assert_eq!(t.port.kernel().live_threads(), baseline.0);
    let after = iterations.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(iterations.load(Ordering::Relaxed), after);

    assert_eq!(t.port.task_delete(&token), Err(TaskError::InvalidId));
    t.settle(baseline.0, baseline.1);
}

#[test]
fn delete_blocked_task() {
    let t = TestPort::new();
    let baseline = (t.port.kernel().live_threads(), t.port.kernel().live_handles());
    let task = t.alloc(ObjectType::Task);
    let sem = t.alloc(ObjectType::BinSem);
    t.port.bin_sem_create(&sem, 0, 0).unwrap();

    let port = Arc::clone(&t.port);
    let (send, recv) = mpsc::channel();
    t.port
        .task_create(
            &task,
            attr(move || {
                send.send(()).unwrap();
                let _ = port.bin_sem_take(&sem);
                unreachable!("the semaphore is never given");
            }),
        )
        .unwrap();
    recv.recv_timeout(Duration::from_secs(5)).unwrap();

    // The blocking take is a cancellation point
    t.port.task_delete(&task).unwrap();
    t.port.bin_sem_delete(&sem).unwrap();
    t.settle(baseline.0, baseline.1);
}

#[test]
fn self_delete() {
    let t = TestPort::new();
    let baseline = t.port.kernel().live_threads();
    let token = t.alloc(ObjectType::Task);
    let finished: &_ = Box::leak(Box::new(AtomicBool::new(false)));

    let port = Arc::clone(&t.port);
    let (send, recv) = mpsc::channel::<()>();
    t.port
        .task_create(
            &token,
            attr(move || {
                let _guard = send;
                let _ = port.task_delete(&token);
                finished.store(true, Ordering::Relaxed);
            }),
        )
        .unwrap();

    // Disconnected when the task's closure is dropped
    assert!(recv.recv_timeout(Duration::from_secs(5)).is_err());
    assert!(!finished.load(Ordering::Relaxed));
    assert_eq!(
        t.port.task_get_info(&token).err(),
        Some(InvalidIdError::InvalidId)
    );
    t.settle(baseline, t.port.kernel().live_handles());
}

#[test]
fn exit_releases_record() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::Task);
    let port = Arc::clone(&t.port);
    let (send, recv) = mpsc::channel::<()>();
    t.port
        .task_create(
            &token,
            attr(move || {
                let _guard = send;
                port.task_exit();
            }),
        )
        .unwrap();
    assert!(recv.recv_timeout(Duration::from_secs(5)).is_err());
    assert_eq!(t.port.task_register(&token), Err(TaskError::InvalidId));
}

#[test]
fn system_data_identifies_thread() {
    let t = TestPort::new();
    let a = t.alloc(ObjectType::Task);
    let b = t.alloc(ObjectType::Task);
    let (send, recv) = mpsc::channel::<()>();
    let recv = Arc::new(std::sync::Mutex::new(recv));
    for token in [a, b] {
        let recv = Arc::clone(&recv);
        t.port
            .task_create(
                &token,
                attr(move || {
                    let _ = recv.lock().unwrap().recv();
                }),
            )
            .unwrap();
    }

    let sysdata = t.port.task_get_info(&a).unwrap().thread_id.0.to_ne_bytes();
    t.port.task_validate_system_data(&sysdata).unwrap();
    assert!(t.port.task_id_match_system_data(&a, &sysdata));
    assert!(!t.port.task_id_match_system_data(&b, &sysdata));
    assert!(!t.port.task_id_match_system_data(&a, &sysdata[..4]));

    drop(send);
    t.port.task_delete(&a).unwrap();
    t.port.task_delete(&b).unwrap();
}

#[test]
fn unsupported_operations() {
    let t = TestPort::new();
    let token = t.alloc(ObjectType::Task);
    assert_eq!(
        t.port.task_detach(&token),
        Err(NotImplementedError::NotImplemented)
    );
    assert_eq!(
        t.port.task_set_priority(&token, 1),
        Err(NotImplementedError::NotImplemented)
    );
}

#[test]
fn spawn_failure_leaves_no_record() {
    let t = TestPort::with_kernel(
        Config::DEFAULT,
        Kernel::new(ResourceLimits {
            max_threads: 0,
            max_handles: usize::MAX,
        }),
    );
    let token = t.alloc(ObjectType::Task);
    assert_eq!(
        t.port.task_create(&token, attr(|| {})),
        Err(TaskError::Error)
    );
    assert_eq!(t.port.task_register(&token), Err(TaskError::InvalidId));
}
