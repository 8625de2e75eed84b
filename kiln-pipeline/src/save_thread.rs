use crate::{storage, CookedResource};
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct SaveJob {
    path: PathBuf,
    resource: CookedResource,
    cancelled: Arc<AtomicBool>,
}

struct SaveThreadShared {
    queue: VecDeque<SaveJob>,
    saving_in_flight: bool,
}

/// Dedicated worker draining a FIFO queue of "serialize resource to path"
/// jobs, so cooking throughput is never blocked by disk I/O. Writes go to a
/// temp file first and are renamed over the destination, so a crash mid-write
/// never corrupts a previously-good output. A newer save scheduled for the
/// same path cancels a queued-but-not-yet-executed older one.
///
/// On drop the worker is asked to exit: the in-flight write finishes, jobs
/// still queued are discarded.
pub struct SaveThread {
    shared: Arc<Mutex<SaveThreadShared>>,
    wake_tx: Sender<()>,
    finish_tx: Sender<()>,
    exit_requested: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

fn execute_save(job: &SaveJob) -> std::io::Result<()> {
    if let Some(parent) = job.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut temp_path = job.path.clone().into_os_string();
    temp_path.push(".out");
    let temp_path = PathBuf::from(temp_path);

    {
        let file = std::fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        if let Err(e) = storage::save_cooked_resource(&mut writer, &job.resource) {
            drop(writer);
            let _ = std::fs::remove_file(&temp_path);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    }

    // Atomic swap over the previous output
    if job.path.exists() {
        std::fs::remove_file(&job.path)?;
    }
    std::fs::rename(&temp_path, &job.path)?;
    Ok(())
}

fn drain_queue(
    shared: &Mutex<SaveThreadShared>,
    exit_requested: &AtomicBool,
) {
    loop {
        // Queued-but-unstarted jobs are dropped on shutdown
        if exit_requested.load(Ordering::Acquire) {
            return;
        }

        let job = {
            let mut state = shared.lock().unwrap();
            let job = state.queue.pop_front();
            if job.is_some() {
                state.saving_in_flight = true;
            }
            job
        };

        let Some(job) = job else {
            return;
        };

        if !job.cancelled.load(Ordering::Acquire) {
            profiling::scope!("Save cooked resource");
            match execute_save(&job) {
                Ok(()) => log::info!("Saved '{}'", job.path.display()),
                // A failed save does not halt the thread, each job fails
                // independently
                Err(e) => log::error!("Failed to save '{}': {}", job.path.display(), e),
            }
        }

        shared.lock().unwrap().saving_in_flight = false;
    }
}

impl SaveThread {
    pub fn new() -> Self {
        let shared = Arc::new(Mutex::new(SaveThreadShared {
            queue: VecDeque::default(),
            saving_in_flight: false,
        }));
        let exit_requested = Arc::new(AtomicBool::new(false));

        let (wake_tx, wake_rx) = crossbeam_channel::unbounded::<()>();
        let (finish_tx, finish_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_shared = shared.clone();
        let thread_exit = exit_requested.clone();
        let join_handle = std::thread::Builder::new()
            .name("Cooker Save Thread".into())
            .spawn(move || {
                save_thread_main(thread_shared, thread_exit, wake_rx, finish_rx);
            })
            .unwrap();

        SaveThread {
            shared,
            wake_tx,
            finish_tx,
            exit_requested,
            join_handle: Some(join_handle),
        }
    }

    /// Enqueues a job and wakes the worker. Returns immediately, the queue is
    /// unbounded.
    pub fn schedule_save(
        &self,
        resource: CookedResource,
        path: PathBuf,
    ) {
        {
            let mut state = self.shared.lock().unwrap();

            // Last writer wins at the queue level: cancel an older queued
            // save for the same destination
            for existing in &state.queue {
                if existing.path == path && !existing.cancelled.load(Ordering::Acquire) {
                    log::info!(
                        "Superseding queued save for '{}' with a newer version",
                        path.display()
                    );
                    existing.cancelled.store(true, Ordering::Release);
                }
            }

            state.queue.push_back(SaveJob {
                path,
                resource,
                cancelled: Arc::new(AtomicBool::new(false)),
            });
        }

        let _ = self.wake_tx.send(());
    }

    /// Blocks until the queue is empty and no job is mid-flight, printing
    /// periodic progress so long drains stay observable.
    pub fn wait_until_done(&self) {
        let mut last_report = Instant::now();

        loop {
            let remaining = {
                let state = self.shared.lock().unwrap();
                if state.queue.is_empty() && !state.saving_in_flight {
                    return;
                }
                state.queue.len() + state.saving_in_flight as usize
            };

            if last_report.elapsed() > Duration::from_secs(1) {
                log::info!("Waiting for {} save job(s) to finish", remaining);
                last_report = Instant::now();
            }

            std::thread::sleep(Duration::from_millis(25));
        }
    }
}

fn save_thread_main(
    shared: Arc<Mutex<SaveThreadShared>>,
    exit_requested: Arc<AtomicBool>,
    wake_rx: Receiver<()>,
    finish_rx: Receiver<()>,
) {
    profiling::register_thread!("Cooker Save Thread");
    loop {
        crossbeam_channel::select! {
            recv(wake_rx) -> msg => {
                if msg.is_err() {
                    return;
                }
                drain_queue(&shared, &exit_requested);
            },
            recv(finish_rx) -> _msg => {
                return;
            }
        }
    }
}

impl Drop for SaveThread {
    fn drop(&mut self) {
        self.exit_requested.store(true, Ordering::Release);
        let _ = self.finish_tx.send(());
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.join();
        }
    }
}
