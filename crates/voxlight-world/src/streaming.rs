//! Background thread that keeps the world's chunks loaded, lit and meshed.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use tracing::{debug, info};

use crate::world::{TickReport, World};

/// Work request sent to the background worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldWorkRequest {
    /// Run one [`World::tick`].
    Tick,
    /// Signal worker thread to shut down.
    Shutdown,
}

/// Handle to the background world worker.
///
/// Ticks are requested without blocking; while one is in flight further requests
/// are coalesced so the worker never builds up a backlog.
pub struct WorldWorker {
    /// Channel to send work requests to the worker.
    request_tx: Sender<WorldWorkRequest>,
    /// Channel to receive tick reports from the worker.
    result_rx: Receiver<TickReport>,
    /// Worker thread handle for joining on shutdown.
    thread: Option<JoinHandle<()>>,
}

impl WorldWorker {
    /// Spawn the worker thread for `world`.
    pub fn spawn(world: Arc<World>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = channel::bounded::<WorldWorkRequest>(1);
        let (result_tx, result_rx) = channel::bounded::<TickReport>(64);

        let thread = thread::Builder::new()
            .name("world-worker".to_string())
            .spawn(move || Self::worker_loop(&world, &request_rx, &result_tx))?;
        info!("World worker started");

        Ok(Self {
            request_tx,
            result_rx,
            thread: Some(thread),
        })
    }

    /// Blocks waiting for requests and ticks the world for each one.
    fn worker_loop(
        world: &World,
        request_rx: &Receiver<WorldWorkRequest>,
        result_tx: &Sender<TickReport>,
    ) {
        loop {
            match request_rx.recv() {
                Ok(WorldWorkRequest::Tick) => {
                    let report = world.tick();
                    // Drop reports nobody collects instead of stalling the world.
                    if let Err(TrySendError::Disconnected(_)) = result_tx.try_send(report) {
                        return;
                    }
                }
                Ok(WorldWorkRequest::Shutdown) | Err(_) => return,
            }
        }
    }

    /// Ask for a tick. Returns false if one is already queued.
    pub fn request_tick(&self) -> bool {
        self.request_tx.try_send(WorldWorkRequest::Tick).is_ok()
    }

    /// Try to receive a finished tick report (non-blocking).
    pub fn try_recv(&self) -> Option<TickReport> {
        self.result_rx.try_recv().ok()
    }

    /// Wait for the next finished tick report.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<TickReport> {
        self.result_rx.recv_timeout(timeout).ok()
    }

    /// Shutdown the worker thread and wait for it to finish.
    pub fn shutdown(&mut self) {
        let _ = self.request_tx.send(WorldWorkRequest::Shutdown);

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            debug!("World worker stopped");
        }
    }
}

impl Drop for WorldWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use glam::Vec3;

    use super::*;
    use crate::world::WorldConfig;

    #[test]
    fn worker_ticks_the_world() {
        let save_dir =
            std::env::temp_dir().join(format!("voxlight-worker-{}", std::process::id()));
        let world = Arc::new(World::new(WorldConfig {
            save_dir: save_dir.clone(),
            visible_distance: 2,
            ..Default::default()
        }));
        world.add_observer(Vec3::new(8.0, 8.0, 8.0));

        let mut worker = WorldWorker::spawn(Arc::clone(&world)).unwrap();
        assert!(worker.request_tick());
        let report = worker.recv_timeout(Duration::from_secs(30)).unwrap();
        assert_eq!(report.created, 7);
        assert_eq!(world.chunks().len(), 7);

        worker.shutdown();
        assert!(!worker.request_tick());
        assert!(worker.try_recv().is_none());
        let _ = std::fs::remove_dir_all(save_dir);
    }

    #[test]
    fn drop_joins_the_thread() {
        let world = Arc::new(World::new(WorldConfig {
            save_dir: std::env::temp_dir().join("voxlight-worker-drop"),
            ..Default::default()
        }));
        let worker = WorldWorker::spawn(world).unwrap();
        drop(worker);
    }
}
