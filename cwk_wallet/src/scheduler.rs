//! Cooperative periodic tasks.
//!
//! A [`Metronome`] runs its function immediately, then reschedules *after*
//! the run completes, so a tick can never overlap itself and a slow tick
//! simply delays the next one. Errors end the tick, not the loop.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub(crate) struct Metronome {
    name: &'static str,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl Metronome {
    pub(crate) fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            handle: None,
            stop_tx: None,
        }
    }

    /// Run `tick` now and then every `interval` after each completion.
    pub(crate) fn start<F, Fut>(&mut self, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), crate::Error>> + Send + 'static,
    {
        if self.handle.is_some() {
            return;
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let name = self.name;
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }
                if let Err(e) = tick().await {
                    log::error!("{name} tick failed: {e}");
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_rx.changed() => break,
                }
            }
        });

        self.handle = Some(handle);
        self.stop_tx = Some(stop_tx);
    }

    /// Cancel future ticks and wait for an in-flight one to complete.
    /// Resolves immediately when the metronome is not running.
    pub(crate) async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
