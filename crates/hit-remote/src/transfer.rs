use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Worker count for bulk object transfer.
pub fn pool_size() -> usize {
    std::cmp::max(4, 2 * num_cpus::get())
}

/// Run `job` over `items` on a worker pool. Workers pull from a shared
/// queue; the first failure cancels the remaining work and is returned.
/// Items already processed stay processed (object writes are content
/// addressed, so a retry reuses them).
pub fn for_each_parallel<T, F>(items: Vec<T>, job: F) -> anyhow::Result<()>
where
    T: Send,
    F: Fn(T) -> anyhow::Result<()> + Sync,
{
    if items.is_empty() {
        return Ok(());
    }

    let workers = pool_size().min(items.len());
    debug!(items = items.len(), workers, "starting transfer pool");

    let (work_tx, work_rx) = crossbeam_channel::unbounded();
    for item in items {
        work_tx.send(item).expect("queue send");
    }
    drop(work_tx);

    let (err_tx, err_rx) = crossbeam_channel::unbounded();
    let cancelled = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                while let Ok(item) = work_rx.recv() {
                    if cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Err(err) = job(item) {
                        cancelled.store(true, Ordering::Relaxed);
                        let _ = err_tx.send(err);
                        break;
                    }
                }
            });
        }
    });

    drop(err_tx);
    match err_rx.recv() {
        Ok(err) => Err(err),
        Err(_) => Ok(()),
    }
}
