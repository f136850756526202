//! The source worker thread and the channels around it.

use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::SourceError;
use crate::events::SourceEvent;
use crate::utils::now_millis;

/// Output of a provider, in production order.
#[derive(Debug)]
pub enum SourceMessage {
    Chunk(Bytes),
    Event(SourceEvent),
    /// The provider returned normally after its last chunk.
    Finished,
    /// The provider failed; no more chunks follow.
    Failed(String),
}

/// Flow control sent from the async side to a running provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceControl {
    Pause,
    Resume,
    Stop,
}

/// A blocking producer of audio for one broadcast session.
pub trait AudioProvider: Send + 'static {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Produces the whole track through `sink`, returning once done or told to stop.
    fn run(&mut self, sink: &mut ProviderSink) -> Result<(), SourceError>;
}

/// Handed to a provider for the duration of one job.
pub struct ProviderSink {
    session_id: String,
    messages: mpsc::Sender<SourceMessage>,
    controls: Receiver<SourceControl>,
    paused: bool,
    stopped: bool,
}

impl ProviderSink {
    fn new(
        session_id: String,
        messages: mpsc::Sender<SourceMessage>,
        controls: Receiver<SourceControl>,
    ) -> Self {
        Self {
            session_id,
            messages,
            controls,
            paused: false,
            stopped: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Hands a chunk to the broadcast, blocking while paused or while the
    /// channel is full. Returns false once the provider should stop.
    pub fn deliver(&mut self, chunk: Bytes) -> bool {
        if !self.wait_while_paused() {
            return false;
        }
        if self.messages.blocking_send(SourceMessage::Chunk(chunk)).is_err() {
            self.stopped = true;
            return false;
        }
        true
    }

    /// Publishes a session event. Returns false if nobody is listening any more.
    pub fn emit(&mut self, event: SourceEvent) -> bool {
        self.send(SourceMessage::Event(event))
    }

    /// True once the job has been stopped or superseded.
    pub fn is_stopped(&mut self) -> bool {
        self.drain_controls();
        self.stopped
    }

    fn send(&mut self, message: SourceMessage) -> bool {
        let sent = self.messages.blocking_send(message).is_ok();
        if !sent {
            self.stopped = true;
        }
        sent
    }

    fn apply(&mut self, control: SourceControl) {
        match control {
            SourceControl::Pause => self.paused = true,
            SourceControl::Resume => self.paused = false,
            SourceControl::Stop => self.stopped = true,
        }
    }

    fn drain_controls(&mut self) {
        loop {
            match self.controls.try_recv() {
                Ok(control) => self.apply(control),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.stopped = true;
                    break;
                }
            }
        }
    }

    fn wait_while_paused(&mut self) -> bool {
        self.drain_controls();
        while self.paused && !self.stopped {
            match self.controls.recv() {
                Ok(control) => self.apply(control),
                Err(_) => self.stopped = true,
            }
        }
        !self.stopped
    }
}

/// Async-side handle to a running job.
///
/// Dropping the feed stops the job.
pub struct SourceFeed {
    session_id: String,
    messages: mpsc::Receiver<SourceMessage>,
    controls: Sender<SourceControl>,
}

impl SourceFeed {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next message from the provider; `None` once the job is gone.
    pub async fn recv(&mut self) -> Option<SourceMessage> {
        self.messages.recv().await
    }

    pub fn pause(&self) {
        self.control(SourceControl::Pause);
    }

    pub fn resume(&self) {
        self.control(SourceControl::Resume);
    }

    pub fn stop(&self) {
        self.control(SourceControl::Stop);
    }

    fn control(&self, control: SourceControl) {
        if self.controls.send(control).is_err() {
            log::trace!("[Source] {:?} for finished job {}", control, self.session_id);
        }
    }
}

impl Drop for SourceFeed {
    fn drop(&mut self) {
        let _ = self.controls.send(SourceControl::Stop);
    }
}

struct Job {
    session_id: String,
    provider: Box<dyn AudioProvider>,
    messages: mpsc::Sender<SourceMessage>,
    controls: Receiver<SourceControl>,
}

/// Owns the single audio worker thread. One job runs at a time.
pub struct SourceWorker {
    jobs: Mutex<Option<Sender<Job>>>,
    current: Mutex<Option<Sender<SourceControl>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    channel_capacity: usize,
}

impl SourceWorker {
    /// Spawns the worker thread.
    ///
    /// `channel_capacity` bounds how many messages a job may queue ahead of
    /// the broadcast; it must be at least 1.
    pub fn spawn(channel_capacity: usize) -> Result<Self, SourceError> {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<Job>();
        let thread = thread::Builder::new()
            .name("slimhub-source".into())
            .spawn(move || worker_loop(jobs_rx))
            .map_err(SourceError::Spawn)?;
        log::info!("[Source] Worker thread started");

        Ok(Self {
            jobs: Mutex::new(Some(jobs_tx)),
            current: Mutex::new(None),
            thread: Mutex::new(Some(thread)),
            channel_capacity: channel_capacity.max(1),
        })
    }

    /// Queues `provider` as the next job, stopping whatever is running.
    pub fn start(
        &self,
        session_id: &str,
        provider: Box<dyn AudioProvider>,
    ) -> Result<SourceFeed, SourceError> {
        let jobs = self.jobs.lock();
        let jobs = jobs.as_ref().ok_or(SourceError::WorkerUnavailable)?;
        self.stop_current();

        let (messages_tx, messages_rx) = mpsc::channel(self.channel_capacity);
        let (controls_tx, controls_rx) = crossbeam_channel::unbounded();
        log::info!(
            "[Source] Starting {} for session {}",
            provider.describe(),
            session_id
        );
        jobs.send(Job {
            session_id: session_id.to_string(),
            provider,
            messages: messages_tx,
            controls: controls_rx,
        })
        .map_err(|_| SourceError::WorkerUnavailable)?;

        *self.current.lock() = Some(controls_tx.clone());
        Ok(SourceFeed {
            session_id: session_id.to_string(),
            messages: messages_rx,
            controls: controls_tx,
        })
    }

    /// Stops the running job, if any.
    pub fn stop_current(&self) {
        if let Some(controls) = self.current.lock().take() {
            let _ = controls.send(SourceControl::Stop);
        }
    }

    /// Stops the running job and waits for the thread to exit.
    ///
    /// Blocks; call from a blocking context once every feed has been dropped.
    pub fn shutdown(&self) {
        self.stop_current();
        self.jobs.lock().take();
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                log::error!("[Source] Worker thread panicked");
            } else {
                log::info!("[Source] Worker thread stopped");
            }
        }
    }
}

impl Drop for SourceWorker {
    fn drop(&mut self) {
        self.stop_current();
        self.jobs.lock().take();
    }
}

fn worker_loop(jobs: Receiver<Job>) {
    for job in jobs.iter() {
        run_job(job);
    }
}

fn run_job(job: Job) {
    let Job {
        session_id,
        mut provider,
        messages,
        controls,
    } = job;
    let mut sink = ProviderSink::new(session_id, messages, controls);
    if sink.is_stopped() {
        log::debug!("[Source] Skipping superseded job {}", sink.session_id());
        return;
    }

    match provider.run(&mut sink) {
        Ok(()) if sink.stopped => {
            log::info!("[Source] Job {} stopped", sink.session_id());
        }
        Ok(()) => {
            log::info!("[Source] Job {} finished", sink.session_id());
            sink.send(SourceMessage::Finished);
        }
        Err(e) => {
            log::error!("[Source] Job {} failed: {}", sink.session_id(), e);
            let error = e.to_string();
            sink.emit(SourceEvent::ConnectionError {
                error: error.clone(),
                timestamp: now_millis(),
            });
            sink.send(SourceMessage::Failed(error));
        }
    }
}
