use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domains::export::service::ExportService;
use crate::domains::export::types::{ExportParams, ExportReport};
use crate::errors::{DomainError, ServiceError, ServiceResult};

/// Jobs waiting beyond this many are refused.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub enum JobStatus {
    Queued,
    Running,
    Completed(ExportReport),
    Failed(String),
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed(_) | JobStatus::Failed(_))
    }
}

struct ExportJob {
    id: Uuid,
    params: ExportParams,
    created_at: DateTime<Utc>,
    status: watch::Sender<JobStatus>,
}

/// Handle for tracking an enqueued export
pub struct JobHandle {
    pub id: Uuid,
    status_receiver: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub fn status(&self) -> JobStatus {
        self.status_receiver.borrow().clone()
    }

    pub async fn wait_for_completion(&mut self) -> ServiceResult<ExportReport> {
        loop {
            match &*self.status_receiver.borrow_and_update() {
                JobStatus::Completed(report) => return Ok(report.clone()),
                JobStatus::Failed(reason) => {
                    return Err(ServiceError::Domain(DomainError::Internal(format!(
                        "Export job {} failed: {}",
                        self.id, reason
                    ))))
                }
                _ => {}
            }

            self.status_receiver
                .changed()
                .await
                .map_err(|_| ServiceError::QueueUnavailable(format!("Export job {} was dropped", self.id)))?;
        }
    }
}

/// Sending side of the export worker. Cheap to clone.
#[derive(Clone)]
pub struct ExportQueue {
    sender: mpsc::Sender<ExportJob>,
}

impl ExportQueue {
    /// Queue an export and return at once.
    pub fn enqueue(&self, params: ExportParams) -> ServiceResult<JobHandle> {
        let (status, status_receiver) = watch::channel(JobStatus::Queued);
        let job = ExportJob {
            id: Uuid::new_v4(),
            params,
            created_at: Utc::now(),
            status,
        };
        let id = job.id;

        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ServiceError::QueueUnavailable("export queue is full".to_string()),
            mpsc::error::TrySendError::Closed(_) => {
                ServiceError::QueueUnavailable("export worker is not running".to_string())
            }
        })?;

        log::info!("Queued export job {}", id);
        Ok(JobHandle { id, status_receiver })
    }
}

/// Runs queued exports one at a time in the background.
pub struct ExportWorker {
    service: Arc<dyn ExportService>,
    receiver: mpsc::Receiver<ExportJob>,
    shutdown_signal: Option<oneshot::Receiver<()>>,
}

impl ExportWorker {
    pub fn new(service: Arc<dyn ExportService>, capacity: usize) -> (Self, ExportQueue) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                service,
                receiver,
                shutdown_signal: None,
            },
            ExportQueue { sender },
        )
    }

    /// Set shutdown signal receiver
    pub fn with_shutdown_signal(mut self, receiver: oneshot::Receiver<()>) -> Self {
        self.shutdown_signal = Some(receiver);
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.start())
    }

    /// Start the worker loop. Ends on shutdown or once every queue handle is gone.
    pub async fn start(mut self) {
        log::info!("Starting export worker");
        let mut shutdown = self.shutdown_signal.take();

        loop {
            tokio::select! {
                job = self.receiver.recv() => {
                    match job {
                        Some(job) => self.process(job).await,
                        None => {
                            log::info!("Export queue closed, stopping export worker");
                            break;
                        }
                    }
                }
                _ = async {
                    match shutdown.as_mut() {
                        Some(signal) => {
                            let _ = signal.await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    log::info!("Received shutdown signal, stopping export worker");
                    break;
                }
            }
        }
    }

    async fn process(&self, job: ExportJob) {
        let waited = Utc::now() - job.created_at;
        log::info!("Running export job {} after {}ms in queue", job.id, waited.num_milliseconds());
        job.status.send_replace(JobStatus::Running);

        let status = match self.service.run_export(job.params).await {
            Ok(report) => {
                log::info!("Export job {} produced {}", job.id, report.filename);
                JobStatus::Completed(report)
            }
            Err(e) => {
                log::error!("Export job {} failed: {}", job.id, e);
                JobStatus::Failed(e.to_string())
            }
        };
        job.status.send_replace(status);
    }
}
