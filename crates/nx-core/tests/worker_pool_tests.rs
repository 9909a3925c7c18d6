use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use nx_core::{CancellationToken, NxError, TurnGate, WorkerPool};

#[test]
fn worker_pool_processes_every_task() -> Result<(), Box<dyn std::error::Error>> {
    let seen = Arc::new(Mutex::new(BTreeSet::new()));
    let seen_by_worker = Arc::clone(&seen);
    let handle = WorkerPool::new(4).spawn(move |_worker_id, task: usize| {
        seen_by_worker
            .lock()
            .expect("seen set mutex poisoned")
            .insert(task);
        Ok(())
    });

    for task in 0..200usize {
        handle.submit(task)?;
    }
    assert_eq!(handle.submitted_count(), 200);
    handle.finish()?;

    let seen = seen.lock().expect("seen set mutex poisoned");
    assert_eq!(seen.len(), 200);
    assert_eq!(seen.iter().next_back(), Some(&199));
    Ok(())
}

#[test]
fn worker_pool_spreads_blocking_tasks() -> Result<(), Box<dyn std::error::Error>> {
    let worker_count = 4usize;
    let workers_seen = Arc::new(Mutex::new(BTreeSet::new()));
    let seen = Arc::clone(&workers_seen);
    let handle = WorkerPool::new(worker_count).spawn(move |worker_id, _task: u32| {
        seen.lock().expect("worker set mutex poisoned").insert(worker_id);
        thread::sleep(Duration::from_millis(20));
        Ok(())
    });

    for task in 0..16 {
        handle.submit(task)?;
    }
    let snapshot = handle.runtime_snapshot();
    assert_eq!(snapshot.submitted, 16);
    assert_eq!(snapshot.worker_task_counts.len(), worker_count);
    handle.finish()?;

    assert!(workers_seen.lock().expect("worker set mutex poisoned").len() > 1);
    Ok(())
}

#[test]
fn first_failure_is_reported_and_cancels_the_rest() {
    let token = CancellationToken::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_by_worker = Arc::clone(&ran);
    let handle = WorkerPool::new(2)
        .with_cancellation(token.clone())
        .spawn(move |_worker_id, task: usize| {
            if task == 3 {
                return Err(NxError::InvalidFormat("task three is broken"));
            }
            ran_by_worker.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            Ok(())
        });

    for task in 0..500usize {
        let _ = handle.submit(task);
    }
    let result = handle.finish();

    assert!(matches!(result, Err(NxError::InvalidFormat("task three is broken"))));
    assert!(token.is_cancelled());
    assert!(ran.load(Ordering::SeqCst) < 499);
}

#[test]
fn panicking_task_becomes_an_error() {
    let handle = WorkerPool::new(2).spawn(|_worker_id, task: u8| {
        if task == 1 {
            panic!("boom at {task}");
        }
        Ok(())
    });
    for task in 0..4u8 {
        let _ = handle.submit(task);
    }

    match handle.finish() {
        Err(error) => {
            assert!(!error.is_cancellation());
            assert!(error.to_string().contains("boom at 1"), "got {error}");
        }
        Ok(()) => panic!("a panicking task was reported as success"),
    }
}

#[test]
fn external_cancellation_surfaces_as_cancelled() {
    let token = CancellationToken::new();
    token.cancel();
    let handle = WorkerPool::new(3)
        .with_cancellation(token)
        .spawn(|_worker_id, _task: u8| Ok(()));
    for task in 0..10u8 {
        let _ = handle.submit(task);
    }
    assert!(matches!(handle.finish(), Err(NxError::Cancelled)));
}

#[test]
fn shutdown_rejects_new_work() -> Result<(), Box<dyn std::error::Error>> {
    let mut handle = WorkerPool::new(1).spawn(|_worker_id, _task: u8| Ok(()));
    handle.submit(1)?;
    handle.shutdown();
    assert!(handle.submit(2).is_err());
    handle.finish()?;
    Ok(())
}

#[test]
fn completed_counts_match_submissions() -> Result<(), Box<dyn std::error::Error>> {
    let pool = WorkerPool::new(0);
    assert_eq!(pool.num_workers(), 1);

    let handle = pool.spawn(|_worker_id, _task: u16| Ok(()));
    for task in 0..32u16 {
        handle.submit(task)?;
    }
    while handle.worker_task_counts().iter().sum::<usize>() < 32 {
        thread::yield_now();
    }
    assert_eq!(handle.pending_count(), 0);
    assert_eq!(handle.completed_count(), 32);
    assert_eq!(handle.worker_task_counts(), vec![32]);
    handle.join()?;
    Ok(())
}

#[test]
fn turn_gate_serializes_out_of_order_workers() -> Result<(), Box<dyn std::error::Error>> {
    let gate = Arc::new(TurnGate::new(CancellationToken::new()));
    let order = Arc::new(Mutex::new(Vec::new()));

    let workers: Vec<_> = (0..8u32)
        .rev()
        .map(|ticket| {
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            thread::spawn(move || -> nx_core::Result<()> {
                thread::sleep(Duration::from_millis(u64::from(8 - ticket) * 3));
                gate.wait_for_turn(ticket)?;
                order.lock().expect("order mutex poisoned").push(ticket);
                assert_eq!(gate.advance(), ticket);
                Ok(())
            })
        })
        .collect();
    for worker in workers {
        worker.join().map_err(|_| "turn worker panicked")??;
    }

    assert_eq!(*order.lock().expect("order mutex poisoned"), (0..8).collect::<Vec<_>>());
    assert_eq!(gate.current(), 8);
    Ok(())
}

#[test]
fn turn_gate_rejects_a_ticket_already_passed() -> Result<(), Box<dyn std::error::Error>> {
    let gate = TurnGate::new(CancellationToken::new());
    gate.wait_for_turn(0)?;
    gate.advance();
    gate.advance();
    assert!(matches!(
        gate.wait_for_turn(1),
        Err(NxError::InvalidBlockId {
            expected: 2,
            actual: 1
        })
    ));
    Ok(())
}

#[test]
fn cancelling_the_gate_releases_waiters() {
    let gate = Arc::new(TurnGate::new(CancellationToken::new()));
    let waiter = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || gate.wait_for_turn(5))
    };

    thread::sleep(Duration::from_millis(30));
    let started = Instant::now();
    gate.cancel();
    let result = waiter.join().expect("waiter panicked");

    assert!(matches!(result, Err(NxError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(gate.cancellation().is_cancelled());
}

#[test]
fn child_token_follows_its_parent_but_not_back() {
    let parent = CancellationToken::new();
    let child = parent.child();
    let grandchild = child.child();

    child.cancel();
    assert!(child.is_cancelled());
    assert!(grandchild.is_cancelled());
    assert!(!parent.is_cancelled());

    let sibling = parent.child();
    assert!(!sibling.is_cancelled());
    parent.cancel();
    assert!(sibling.is_cancelled());
    assert!(matches!(sibling.check(), Err(NxError::Cancelled)));
}
