// src/engrave_job.rs - runs a motion script against the engraver on a worker task
use std::time::Duration;

use futures_core::stream::Stream;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::communication::{
    DeviceConnection, SerialTransport, Transport, DEFAULT_ACK_TIMEOUT, DEFAULT_BAUD,
};
use crate::protocol::ProtocolError;
use crate::script::{Decoded, Interpreter, MotionScript, Point, ScriptError};

pub const DEFAULT_SIMULATED_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum JobError {
    #[error("cannot open device '{port}': {source}")]
    Connection {
        port: String,
        #[source]
        source: std::io::Error,
    },
    #[error("multiplier must be at least 1")]
    InvalidMultiplier,
    #[error("a job is already running")]
    AlreadyRunning,
    #[error("no job available")]
    NoJob,
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),
    #[error("run aborted: {0}")]
    Script(#[from] ScriptError),
    #[error("run aborted: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("job worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed(String),
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobState::Idle | JobState::Running)
    }
}

/// Emitted once per executed script line, in script order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// 1-based script line.
    pub line: usize,
    /// False when the device did not acknowledge the point.
    pub ok: bool,
    pub percent_complete: f64,
    /// Position in script units, i.e. with the multiplier divided back out.
    pub point: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub lines_processed: usize,
    pub failures: usize,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub multiplier: u32,
    /// Per-point delay when no device is attached.
    pub simulated_delay: Duration,
    pub ack_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            multiplier: 1,
            simulated_delay: DEFAULT_SIMULATED_DELAY,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

/// Where points go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    Simulated,
    Serial { port: String, baud: u32 },
}

impl DeviceTarget {
    /// Port id `"0"` (or an empty id) selects simulation.
    pub fn from_port_id(port: &str, baud: u32) -> Self {
        match port.trim() {
            "" | "0" => DeviceTarget::Simulated,
            port => DeviceTarget::Serial {
                port: port.to_string(),
                baud,
            },
        }
    }

    pub fn serial(port: &str) -> Self {
        DeviceTarget::Serial {
            port: port.to_string(),
            baud: DEFAULT_BAUD,
        }
    }
}

#[derive(Debug)]
struct CancelSignal;

/// Handle to one run. Dropping it tears the run down and releases the device.
#[derive(Debug)]
pub struct EngraveJob {
    id: String,
    cancel_tx: mpsc::Sender<CancelSignal>,
    progress_rx: mpsc::UnboundedReceiver<ProgressEvent>,
    state_rx: watch::Receiver<JobState>,
    task: Option<JoinHandle<Result<RunSummary, JobError>>>,
}

impl EngraveJob {
    /// Open the device (if any) and start the run on a new task.
    ///
    /// Connection failures are reported here, before anything runs.
    pub fn start(
        script: MotionScript,
        options: RunOptions,
        target: DeviceTarget,
    ) -> Result<Self, JobError> {
        check_options(&options)?;
        let connection = match target {
            DeviceTarget::Simulated => None,
            DeviceTarget::Serial { port, baud } => {
                let transport = SerialTransport::open(&port, baud).map_err(|source| {
                    tracing::error!("Failed to open {}: {}", port, source);
                    JobError::Connection { port: port.clone(), source }
                })?;
                Some(DeviceConnection::new(Box::new(transport), options.ack_timeout))
            }
        };
        Ok(Self::spawn(script, options, connection))
    }

    /// Start a run over an already open link.
    pub fn start_with_transport(
        script: MotionScript,
        options: RunOptions,
        transport: Box<dyn Transport>,
    ) -> Result<Self, JobError> {
        check_options(&options)?;
        let connection = DeviceConnection::new(transport, options.ack_timeout);
        Ok(Self::spawn(script, options, Some(connection)))
    }

    fn spawn(
        script: MotionScript,
        options: RunOptions,
        connection: Option<DeviceConnection>,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(JobState::Running);

        tracing::info!(
            "Starting job {} ({} lines, multiplier {}, {})",
            id,
            script.len(),
            options.multiplier,
            connection
                .as_ref()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "simulated".to_string())
        );

        let worker = Worker {
            script,
            options,
            connection,
            cancel_rx,
            progress_tx,
        };
        let job_id = id.clone();
        let task = tokio::spawn(async move {
            let result = worker.run().await;
            let state = match &result {
                Ok(summary) => {
                    tracing::info!(
                        "Job {} {:?}: {} lines, {} failures",
                        job_id,
                        summary.outcome,
                        summary.lines_processed,
                        summary.failures
                    );
                    match summary.outcome {
                        RunOutcome::Completed => JobState::Completed,
                        RunOutcome::Cancelled => JobState::Cancelled,
                    }
                }
                Err(e) => {
                    tracing::error!("Job {} failed: {}", job_id, e);
                    JobState::Failed(e.to_string())
                }
            };
            state_tx.send_replace(state);
            result
        });

        Self {
            id,
            cancel_tx,
            progress_rx,
            state_rx,
            task: Some(task),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> JobState {
        self.state_rx.borrow().clone()
    }

    /// Ask the worker to stop at the next line boundary. Returns false once
    /// the worker has already finished.
    pub fn cancel(&self) -> bool {
        match self.cancel_tx.try_send(CancelSignal) {
            Ok(()) => {
                tracing::info!("Cancellation requested for job {}", self.id);
                true
            }
            // A signal is already queued.
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Next event if one is ready, without waiting.
    pub fn try_next_progress(&mut self) -> Option<ProgressEvent> {
        self.progress_rx.try_recv().ok()
    }

    /// Every event that is ready now.
    pub fn drain_progress(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.progress_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event. `None` once the run has ended and every event was read.
    pub async fn next_progress(&mut self) -> Option<ProgressEvent> {
        self.progress_rx.recv().await
    }

    /// Like [`next_progress`](Self::next_progress) but gives up after `wait`.
    pub async fn next_progress_timeout(&mut self, wait: Duration) -> Option<ProgressEvent> {
        timeout(wait, self.progress_rx.recv()).await.ok().flatten()
    }

    pub fn progress_stream(&mut self) -> impl Stream<Item = ProgressEvent> + '_ {
        async_stream::stream! {
            while let Some(event) = self.progress_rx.recv().await {
                yield event;
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Wait for the run to end. Progress events not yet read stay available.
    pub async fn wait(&mut self) -> Result<RunSummary, JobError> {
        let task = self.task.take().ok_or(JobError::NoJob)?;
        task.await.map_err(|e| JobError::Worker(e.to_string()))?
    }
}

impl Drop for EngraveJob {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                tracing::debug!("Job {} handle dropped, aborting worker", self.id);
                task.abort();
            }
        }
    }
}

fn check_options(options: &RunOptions) -> Result<(), JobError> {
    if options.multiplier == 0 {
        return Err(JobError::InvalidMultiplier);
    }
    Ok(())
}

/// State owned by the worker task. The device connection lives and dies here.
struct Worker {
    script: MotionScript,
    options: RunOptions,
    connection: Option<DeviceConnection>,
    cancel_rx: mpsc::Receiver<CancelSignal>,
    progress_tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl Worker {
    async fn run(mut self) -> Result<RunSummary, JobError> {
        let total = self.script.len();
        let multiplier = self.options.multiplier;
        let mut interp = Interpreter::new(multiplier);
        let mut summary = RunSummary {
            outcome: RunOutcome::Completed,
            lines_processed: 0,
            failures: 0,
        };

        for (index, line) in self.script.lines().iter().enumerate() {
            let line_number = index + 1;
            let point = match interp.decode_line(line, line_number)? {
                Decoded::Point(point) => point,
                Decoded::EndOfScript => {
                    tracing::debug!("End of script at line {}", line_number);
                    break;
                }
            };

            let ok = match self.connection.as_mut() {
                Some(connection) => connection.send_point(point).await?,
                None => {
                    tokio::time::sleep(self.options.simulated_delay).await;
                    true
                }
            };

            summary.lines_processed += 1;
            if !ok {
                summary.failures += 1;
                tracing::warn!("Line {}: device did not acknowledge {:?}", line_number, point);
            }

            let event = ProgressEvent {
                line: line_number,
                ok,
                percent_complete: line_number as f64 / total as f64 * 100.0,
                point: point.unscaled(multiplier),
            };
            if self.progress_tx.send(event).is_err() {
                tracing::trace!("Progress listener has gone away");
            }

            if line_number < total && self.cancel_rx.try_recv().is_ok() {
                tracing::info!("Run cancelled after line {}", line_number);
                summary.outcome = RunOutcome::Cancelled;
                break;
            }
        }

        if let Some(connection) = self.connection.as_mut() {
            connection.close();
        }
        Ok(summary)
    }
}

/// Keeps at most one job active at a time.
#[derive(Debug, Default)]
pub struct JobController {
    current: Option<EngraveJob>,
}

impl JobController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &mut self,
        script: MotionScript,
        options: RunOptions,
        target: DeviceTarget,
    ) -> Result<&mut EngraveJob, JobError> {
        self.ensure_idle()?;
        let job = EngraveJob::start(script, options, target)?;
        Ok(self.current.insert(job))
    }

    pub fn start_with_transport(
        &mut self,
        script: MotionScript,
        options: RunOptions,
        transport: Box<dyn Transport>,
    ) -> Result<&mut EngraveJob, JobError> {
        self.ensure_idle()?;
        let job = EngraveJob::start_with_transport(script, options, transport)?;
        Ok(self.current.insert(job))
    }

    fn ensure_idle(&self) -> Result<(), JobError> {
        match &self.current {
            Some(job) if job.state() == JobState::Running => Err(JobError::AlreadyRunning),
            _ => Ok(()),
        }
    }

    pub fn state(&self) -> JobState {
        self.current.as_ref().map(EngraveJob::state).unwrap_or(JobState::Idle)
    }

    pub fn current_mut(&mut self) -> Option<&mut EngraveJob> {
        self.current.as_mut()
    }

    /// Request cancellation of the running job and return its id.
    pub fn cancel_current(&self) -> Result<String, JobError> {
        let job = self.current.as_ref().ok_or(JobError::NoJob)?;
        match job.state() {
            JobState::Running if job.cancel() => Ok(job.id().to_string()),
            state => Err(JobError::InvalidTransition(format!(
                "cannot cancel a job in state {:?}",
                state
            ))),
        }
    }

    pub fn take(&mut self) -> Option<EngraveJob> {
        self.current.take()
    }
}
