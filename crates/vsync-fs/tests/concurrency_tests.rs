//! Concurrent access tests for locked atomic writes

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tempfile::tempdir;
use vsync_fs::{NormalizedPath, RobustnessConfig, io};

#[test]
fn test_concurrent_writes_no_corruption() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("concurrent.json");
    let path = Arc::new(NormalizedPath::new(&file_path));
    let config = RobustnessConfig {
        lock_timeout: Duration::from_secs(10),
        enable_fsync: false,
    };

    let num_threads = 8;
    let writes_per_thread = 20;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let path = Arc::clone(&path);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                barrier.wait();
                for i in 0..writes_per_thread {
                    let content = format!("thread{}:write{}\n", thread_id, i);
                    io::write_atomic(&path, content.as_bytes(), config).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread should not panic");
    }

    let content = std::fs::read_to_string(&file_path).unwrap();
    assert!(content.starts_with("thread"), "got: {}", content);
    assert_eq!(
        content.matches("thread").count(),
        1,
        "Content should be exactly one complete write"
    );
}

#[test]
fn test_lock_serializes_read_modify_write() {
    let dir = tempdir().unwrap();
    let path = Arc::new(NormalizedPath::new(dir.path().join("counter.txt")));
    let config = RobustnessConfig {
        lock_timeout: Duration::from_secs(10),
        enable_fsync: false,
    };
    io::write_atomic(&path, b"0", config).unwrap();

    let num_threads = 4;
    let increments = 25;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let path = Arc::clone(&path);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..increments {
                    let lock = io::acquire_lock(&path, config).unwrap();
                    let current: u32 = io::read_text(&path).unwrap().parse().unwrap();
                    io::write_locked(&lock, (current + 1).to_string().as_bytes(), config)
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let total: u32 = io::read_text(&path).unwrap().parse().unwrap();
    assert_eq!(total, (num_threads * increments) as u32);
}
