use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::MediaSource;
use crate::types::MediaRecord;

/// Message type for the prefetch worker
#[derive(Debug)]
enum Command {
    /// Deliver the next record, from the cache or the next production
    Next,
    /// Switch feeds and drop everything buffered for the old one
    Reset(String),
    /// Shut the worker down
    Stop,
}

/// Consumer side of a running [`PrefetchQueue`].
///
/// `request_next` and `reset` never block; records arrive on [`recv`]
/// in the order they were produced.
///
/// [`recv`]: PrefetchHandle::recv
pub struct PrefetchHandle {
    commands: mpsc::UnboundedSender<Command>,
    deliveries: mpsc::UnboundedReceiver<MediaRecord>,
    worker: Option<JoinHandle<()>>,
}

impl PrefetchHandle {
    /// Asks for one record. Requests made while the cache is empty and a
    /// consumer is already waiting collapse into a single delivery.
    pub fn request_next(&self) {
        self.send(Command::Next);
    }

    /// Switches the worker to `feed` and requests its first record.
    pub fn reset(&self, feed: impl Into<String>) {
        self.send(Command::Reset(feed.into()));
    }

    /// Waits for the next delivered record. `None` once the worker is gone.
    pub async fn recv(&mut self) -> Option<MediaRecord> {
        self.deliveries.recv().await
    }

    /// A record that has already been delivered, if any.
    pub fn try_recv(&mut self) -> Option<MediaRecord> {
        self.deliveries.try_recv().ok()
    }

    /// Requests the next record and waits for it.
    pub async fn next(&mut self) -> Option<MediaRecord> {
        self.request_next();
        self.recv().await
    }

    /// Stops the worker and waits for it to release the source.
    pub async fn stop(mut self) {
        self.send(Command::Stop);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Prefetch worker ended abnormally");
            }
        }
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            warn!(command = ?e.0, "Prefetch worker is not running");
        }
    }
}

/// Worker-side state that command handling touches. Kept apart from the
/// source so commands can be applied while a production borrows it.
#[derive(Debug)]
struct QueueState {
    cache: VecDeque<MediaRecord>,
    capacity: usize,
    /// No productions until the next reset.
    stopped: bool,
    /// The source ran dry; further requests get the sentinel again.
    exhausted: bool,
    shutdown: bool,
    filling: bool,
    /// A consumer is waiting on an empty cache.
    pending: bool,
    /// Set by a reset; the next completed production is dropped.
    resetting: bool,
    pending_reset: Option<String>,
}

impl QueueState {
    fn new(capacity: usize) -> Self {
        Self {
            cache: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            stopped: false,
            exhausted: false,
            shutdown: false,
            filling: false,
            pending: false,
            resetting: false,
            pending_reset: None,
        }
    }

    fn wants_production(&self) -> bool {
        self.filling && !self.stopped && !self.shutdown && self.cache.len() < self.capacity
    }

    fn apply(
        &mut self,
        command: Option<Command>,
        deliveries: &mpsc::UnboundedSender<MediaRecord>,
    ) {
        match command {
            Some(Command::Next) => {
                if let Some(record) = self.cache.pop_front() {
                    self.deliver(record, deliveries);
                } else if self.exhausted {
                    self.deliver(MediaRecord::Exhausted, deliveries);
                } else {
                    self.pending = true;
                    self.filling = true;
                }
            }
            Some(Command::Reset(feed)) => {
                debug!(feed = %feed, dropped = self.cache.len(), "Prefetch reset");
                self.cache.clear();
                self.stopped = false;
                self.exhausted = false;
                self.resetting = true;
                self.pending_reset = Some(feed);
                self.apply(Some(Command::Next), deliveries);
            }
            // A dropped handle means nobody will ever ask again
            Some(Command::Stop) | None => {
                self.stopped = true;
                self.shutdown = true;
            }
        }
    }

    /// Hands a fresh production to a waiting consumer or buffers it.
    fn accept(&mut self, record: MediaRecord, deliveries: &mpsc::UnboundedSender<MediaRecord>) {
        if self.pending {
            self.pending = false;
            self.deliver(record, deliveries);
        } else {
            self.cache.push_back(record);
        }
    }

    fn deliver(&mut self, record: MediaRecord, deliveries: &mpsc::UnboundedSender<MediaRecord>) {
        if deliveries.send(record).is_err() {
            self.shutdown = true;
        }
    }
}

/// Background look-ahead cache in front of a [`MediaSource`].
///
/// The worker owns the source; the consumer talks to it only through a
/// [`PrefetchHandle`]. A production is raced against incoming commands, so
/// `reset` and `stop` are seen while a request is in flight. The first
/// production to complete after a reset is discarded, whether it was in
/// flight when the reset arrived or started afterwards.
pub struct PrefetchQueue<S: MediaSource> {
    source: S,
    commands: mpsc::UnboundedReceiver<Command>,
    deliveries: mpsc::UnboundedSender<MediaRecord>,
    state: QueueState,
}

impl<S: MediaSource> PrefetchQueue<S> {
    /// Creates the worker and the handle to talk to it.
    pub fn new(source: S, capacity: usize) -> (Self, PrefetchHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let queue = Self {
            source,
            commands: command_rx,
            deliveries: delivery_tx,
            state: QueueState::new(capacity),
        };
        let handle = PrefetchHandle {
            commands: command_tx,
            deliveries: delivery_rx,
            worker: None,
        };
        (queue, handle)
    }

    /// Spawns the worker on the current runtime.
    pub fn spawn(source: S, capacity: usize) -> PrefetchHandle {
        let (queue, mut handle) = Self::new(source, capacity);
        handle.worker = Some(tokio::spawn(queue.run()));
        handle
    }

    /// Run the worker loop until stopped or the handle is dropped.
    pub async fn run(mut self) {
        info!(capacity = self.state.capacity, "Prefetch worker started");

        loop {
            if self.state.shutdown {
                break;
            }
            if let Some(feed) = self.state.pending_reset.take() {
                self.source.reset(&feed);
            }

            if !self.state.wants_production() {
                self.state.filling = false;
                let command = self.commands.recv().await;
                self.state.apply(command, &self.deliveries);
                continue;
            }

            let produced = {
                let production = self.source.next_media();
                tokio::pin!(production);
                loop {
                    tokio::select! {
                        biased;
                        command = self.commands.recv() => {
                            self.state.apply(command, &self.deliveries);
                            if self.state.shutdown {
                                break None;
                            }
                        }
                        result = &mut production => break Some(result),
                    }
                }
            };

            let Some(result) = produced else {
                continue;
            };
            if self.state.resetting {
                self.state.resetting = false;
                debug!("Discarding first media produced after reset");
                continue;
            }

            let record = match result {
                Ok(record) => record,
                Err(end) => {
                    info!(reason = %end, "Media source exhausted");
                    self.state.stopped = true;
                    self.state.exhausted = true;
                    MediaRecord::Exhausted
                }
            };
            self.state.accept(record, &self.deliveries);
        }

        info!("Prefetch worker stopped");
    }
}
