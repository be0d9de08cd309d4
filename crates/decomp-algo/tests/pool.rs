//! Worker pool: run-directory lock and parallel sub solves.

mod common;

use common::{approx, single_site};
use decomp_algo::decomposition::TimeHorizonConfig;
use decomp_algo::pool::{PoolError, WorkerPool, LOCK_FILE};
use decomp_algo::solver::ClarabelBackend;
use decomp_algo::{decompose, DecompositionConfig, DecompositionError, Method};
use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

#[test]
fn existing_lock_refuses_to_start() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(LOCK_FILE), "1234").unwrap();
    let err = WorkerPool::new(2)
        .unwrap()
        .with_run_dir(dir.path())
        .err()
        .expect("stale lock must be reported");
    assert!(matches!(err, PoolError::StaleLock(_)));
}

#[test]
fn lock_is_released_on_drop() {
    let dir = TempDir::new().unwrap();
    let lock = dir.path().join(LOCK_FILE);
    {
        let pool = WorkerPool::new(2).unwrap().with_run_dir(dir.path()).unwrap();
        assert_eq!(pool.threads(), 2);
        assert!(lock.exists());
    }
    assert!(!lock.exists());
}

#[test]
fn parallel_run_matches_serial_run() {
    let data = single_site(&[50.0, 80.0, 30.0, 60.0]);
    let backend = ClarabelBackend::new();
    let serial = DecompositionConfig {
        method: Method::TimeHorizon,
        max_iterations: 20,
        time_horizon: TimeHorizonConfig {
            support_steps: vec![2, 3],
        },
        ..Default::default()
    };
    let dir = TempDir::new().unwrap();
    let parallel = DecompositionConfig {
        parallel: true,
        threads: 3,
        run_dir: Some(dir.path().to_path_buf()),
        ..serial.clone()
    };
    let a = decompose(&data, &serial, BTreeMap::new(), &backend).unwrap();
    let b = decompose(&data, &parallel, BTreeMap::new(), &backend).unwrap();
    assert_eq!(a.iterations(), b.iterations());
    assert!(approx(a.total_cost, b.total_cost, 1e-6));
    assert!(!dir.path().join(LOCK_FILE).exists());
}

#[test]
fn parallel_run_in_locked_dir_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(LOCK_FILE), "1234").unwrap();
    let config = DecompositionConfig {
        parallel: true,
        run_dir: Some(dir.path().to_path_buf()),
        time_horizon: TimeHorizonConfig {
            support_steps: vec![2],
        },
        ..Default::default()
    };
    let err = decompose(
        &single_site(&[50.0, 80.0, 30.0]),
        &config,
        BTreeMap::new(),
        &ClarabelBackend::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        DecompositionError::Pool(PoolError::StaleLock(_))
    ));
}

#[test]
fn second_pool_on_live_dir_is_refused() {
    let dir = TempDir::new().unwrap();
    let first = WorkerPool::new(1).unwrap().with_run_dir(dir.path()).unwrap();
    let pid = std::fs::read_to_string(dir.path().join(LOCK_FILE)).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());

    let err = WorkerPool::new(1)
        .unwrap()
        .with_run_dir(dir.path())
        .err()
        .expect("live lock must be reported");
    assert!(matches!(err, PoolError::StaleLock(_)));
    // the refused pool must not release the lock it never took
    assert!(dir.path().join(LOCK_FILE).exists());
    drop(first);
    assert!(!dir.path().join(LOCK_FILE).exists());
}

#[test]
fn racing_pools_take_the_lock_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let pool = WorkerPool::new(1).unwrap();
                barrier.wait();
                pool.with_run_dir(&path)
            })
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let (held, refused): (Vec<_>, Vec<_>) = outcomes.into_iter().partition(|o| o.is_ok());
    assert_eq!(held.len(), 1);
    for outcome in refused {
        assert!(matches!(outcome, Err(PoolError::StaleLock(_))));
    }
}

#[test]
fn missing_run_dir_is_created() {
    let dir = TempDir::new().unwrap();
    let run_dir = dir.path().join("runs").join("a");
    let _pool = WorkerPool::new(1).unwrap().with_run_dir(&run_dir).unwrap();
    assert!(run_dir.join(LOCK_FILE).exists());
}
