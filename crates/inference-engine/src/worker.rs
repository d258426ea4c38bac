//! Background Training Worker
//!
//! Training runs on the blocking pool, one job at a time, away from the
//! request path. A cancelled job's result is discarded, never installed.

use crate::engine::{Trainer, TrainingMetrics};
use crate::registry::ModelRegistry;
use crate::InferenceError;
use feature_engine::Observation;
use measurement::Parameter;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// A queued training request
struct TrainingJob {
    city: String,
    parameter: Parameter,
    history: Vec<Observation>,
    reply: oneshot::Sender<Result<TrainingMetrics, InferenceError>>,
}

/// Client side of the training worker
#[derive(Clone)]
pub struct TrainingHandle {
    sender: mpsc::Sender<TrainingJob>,
    cancel: Arc<watch::Sender<u64>>,
}

impl TrainingHandle {
    /// Submit a training job and wait for its metrics
    pub async fn train(
        &self,
        city: &str,
        parameter: Parameter,
        history: Vec<Observation>,
    ) -> Result<TrainingMetrics, InferenceError> {
        let (reply, response) = oneshot::channel();
        let job = TrainingJob {
            city: city.to_string(),
            parameter,
            history,
            reply,
        };

        self.sender
            .send(job)
            .await
            .map_err(|_| InferenceError::TrainingFailed("training worker stopped".into()))?;

        response
            .await
            .map_err(|_| InferenceError::TrainingFailed("training worker dropped job".into()))?
    }

    /// Cancel the job currently running, if any
    pub fn cancel_current(&self) {
        self.cancel.send_modify(|generation| *generation += 1);
    }
}

/// Worker that trains models and installs them in the registry
pub struct TrainingWorker {
    receiver: mpsc::Receiver<TrainingJob>,
    cancel: watch::Receiver<u64>,
    trainer: Arc<Trainer>,
    registry: Arc<ModelRegistry>,
}

impl TrainingWorker {
    /// Create a handle/worker pair
    pub fn channel(
        capacity: usize,
        trainer: Trainer,
        registry: Arc<ModelRegistry>,
    ) -> (TrainingHandle, Self) {
        info!("Creating training worker: queue capacity={}", capacity);
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (cancel_tx, cancel_rx) = watch::channel(0u64);
        let handle = TrainingHandle {
            sender,
            cancel: Arc::new(cancel_tx),
        };
        let worker = Self {
            receiver,
            cancel: cancel_rx,
            trainer: Arc::new(trainer),
            registry,
        };
        (handle, worker)
    }

    /// Run the worker loop until every handle is dropped
    pub async fn run(mut self) {
        info!("Starting training worker");

        while let Some(job) = self.receiver.recv().await {
            // only cancellations issued after this point apply to the job
            let _ = self.cancel.borrow_and_update();

            let result = self.run_job(&job.city, job.parameter, job.history).await;
            match &result {
                Ok(metrics) => {
                    counter!("models_trained_total").increment(1);
                    debug!("Training done for {} - {}: r2={:.3}", job.city, job.parameter, metrics.r2);
                }
                Err(e) => warn!("Training failed for {} - {}: {}", job.city, job.parameter, e),
            }

            if job.reply.send(result).is_err() {
                debug!("Training requester went away");
            }
        }

        info!("Training worker stopped");
    }

    async fn run_job(
        &mut self,
        city: &str,
        parameter: Parameter,
        history: Vec<Observation>,
    ) -> Result<TrainingMetrics, InferenceError> {
        let trainer = Arc::clone(&self.trainer);
        let owned_city = city.to_string();
        let task = tokio::task::spawn_blocking(move || trainer.train(&owned_city, parameter, &history));

        let model = tokio::select! {
            joined = task => joined
                .map_err(|e| InferenceError::TrainingFailed(e.to_string()))??,
            Ok(()) = self.cancel.changed() => {
                info!("Training cancelled for {} - {}", city, parameter);
                return Err(InferenceError::Cancelled);
            }
        };

        let registry = Arc::clone(&self.registry);
        let installed = tokio::task::spawn_blocking(move || registry.install(model))
            .await
            .map_err(|e| InferenceError::PersistError(e.to_string()))??;
        Ok(installed.metrics.clone())
    }
}
