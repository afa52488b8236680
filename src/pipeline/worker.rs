//! Background generation worker.
//!
//! - One dedicated thread owns calls into the engine
//! - Requests go in over a flume channel
//! - Each request resolves through its own async channel so the GTK main
//!   loop can await it without blocking

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{CancelToken, InferencePipeline, PipelineError};
use crate::models::{GenerationRequest, GenerationResult};

pub type GenerationOutcome = Result<GenerationResult, PipelineError>;

struct Job {
    id: u64,
    request: GenerationRequest,
    cancel: CancelToken,
    reply: async_channel::Sender<GenerationOutcome>,
}

/// Pending generation. Resolves exactly once.
pub struct GenerationHandle {
    id: u64,
    cancel: CancelToken,
    reply: async_channel::Receiver<GenerationOutcome>,
}

impl GenerationHandle {
    /// Generation cycle this handle belongs to.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation. The handle still resolves, normally to
    /// [`PipelineError::Cancelled`].
    #[cfg(test)]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> GenerationOutcome {
        self.reply.recv().await.unwrap_or_else(|_| {
            Err(PipelineError::Engine("generation worker stopped".to_string()))
        })
    }

    #[cfg(test)]
    pub fn wait_blocking(self) -> GenerationOutcome {
        self.reply.recv_blocking().unwrap_or_else(|_| {
            Err(PipelineError::Engine("generation worker stopped".to_string()))
        })
    }
}

/// Runs engine calls on a background thread.
pub struct GenerationWorker {
    request_tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    active: Arc<Mutex<Option<CancelToken>>>,
}

impl GenerationWorker {
    pub fn new(pipeline: Arc<dyn InferencePipeline>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = flume::unbounded::<Job>();
        let active = Arc::new(Mutex::new(None));

        let worker_active = Arc::clone(&active);
        let worker = thread::Builder::new()
            .name("generation-worker".to_string())
            .spawn(move || worker_loop(pipeline, request_rx, worker_active))?;

        debug!("Started generation worker");

        Ok(Self {
            request_tx: Some(request_tx),
            worker: Some(worker),
            active,
        })
    }

    /// Queue a request for generation cycle `id`. The returned handle
    /// resolves to the engine result.
    pub fn submit(&self, id: u64, request: GenerationRequest) -> GenerationHandle {
        let cancel = CancelToken::new();
        let (reply_tx, reply_rx) = async_channel::bounded(1);

        let job = Job {
            id,
            request,
            cancel: cancel.clone(),
            reply: reply_tx,
        };

        match &self.request_tx {
            Some(tx) => {
                if let Err(flume::SendError(job)) = tx.send(job) {
                    error!("Generation worker disconnected");
                    let _ = job.reply.try_send(Err(PipelineError::Engine(
                        "generation worker stopped".to_string(),
                    )));
                }
            }
            None => {
                let _ = job.reply.try_send(Err(PipelineError::Engine(
                    "generation worker stopped".to_string(),
                )));
            }
        }

        GenerationHandle {
            id,
            cancel,
            reply: reply_rx,
        }
    }

    /// Whether a request is currently inside the engine.
    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Cancel the request currently inside the engine, if any.
    pub fn cancel_active(&self) {
        if let Some(token) = self.active.lock().as_ref() {
            token.cancel();
        }
    }

    pub fn shutdown(&mut self) {
        debug!("Shutting down generation worker");
        self.cancel_active();
        // Closing the channel ends the worker loop once queued jobs drain.
        self.request_tx.take();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("Generation worker panicked");
            }
        }
        debug!("Generation worker shutdown complete");
    }
}

impl Drop for GenerationWorker {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown();
        }
    }
}

fn worker_loop(
    pipeline: Arc<dyn InferencePipeline>,
    rx: Receiver<Job>,
    active: Arc<Mutex<Option<CancelToken>>>,
) {
    debug!("Generation worker started");

    while let Ok(job) = rx.recv() {
        let outcome = if job.cancel.is_cancelled() {
            debug!(id = job.id, "Skipping cancelled request");
            Err(PipelineError::Cancelled)
        } else {
            *active.lock() = Some(job.cancel.clone());
            info!(
                id = job.id,
                seed = job.request.seed,
                images = job.request.image_count,
                steps = job.request.step_count,
                "Generating"
            );
            let outcome = pipeline.generate(&job.request, &job.cancel);
            *active.lock() = None;
            outcome
        };

        if job.reply.try_send(outcome).is_err() {
            warn!(id = job.id, "Generation result dropped, handle gone");
        }
    }

    debug!("Generation worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeneratedImage;
    use image::RgbaImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct EchoPipeline {
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl InferencePipeline for EchoPipeline {
        fn generate(
            &self,
            request: &GenerationRequest,
            _cancel: &CancelToken,
        ) -> Result<GenerationResult, PipelineError> {
            self.seen.lock().push(request.clone());
            let entries = (0..request.image_count)
                .map(|_| Some(GeneratedImage::new(RgbaImage::new(1, 1))))
                .collect();
            Ok(GenerationResult::new(entries))
        }
    }

    /// Blocks until cancelled.
    #[derive(Default)]
    struct StallPipeline {
        calls: AtomicUsize,
    }

    impl InferencePipeline for StallPipeline {
        fn generate(
            &self,
            _request: &GenerationRequest,
            cancel: &CancelToken,
        ) -> Result<GenerationResult, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            Err(PipelineError::Cancelled)
        }
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            image_count: 4,
            step_count: 25,
            seed: 99,
            safety_enabled: true,
        }
    }

    #[test]
    fn test_submit_resolves_with_engine_result() {
        let pipeline = Arc::new(EchoPipeline {
            seen: Mutex::new(Vec::new()),
        });
        let worker = GenerationWorker::new(pipeline.clone()).unwrap();

        let result = worker.submit(1, request("lighthouse")).wait_blocking().unwrap();
        assert_eq!(result.entries.len(), 4);
        assert_eq!(pipeline.seen.lock()[0].prompt, "lighthouse");
    }

    #[test]
    fn test_handles_carry_cycle_ids() {
        let worker = GenerationWorker::new(Arc::new(EchoPipeline {
            seen: Mutex::new(Vec::new()),
        }))
        .unwrap();
        let first = worker.submit(7, request("a"));
        let second = worker.submit(8, request("b"));
        assert_eq!((first.id(), second.id()), (7, 8));
        first.wait_blocking().unwrap();
        second.wait_blocking().unwrap();
    }

    #[test]
    fn test_cancel_running_request() {
        let worker = GenerationWorker::new(Arc::new(StallPipeline::default())).unwrap();
        let handle = worker.submit(1, request("slow"));

        while !worker.is_busy() {
            thread::sleep(Duration::from_millis(1));
        }
        handle.cancel();

        assert!(matches!(handle.wait_blocking(), Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_cancelled_before_start_skips_engine() {
        let pipeline = Arc::new(StallPipeline::default());
        let worker = GenerationWorker::new(pipeline.clone()).unwrap();

        let running = worker.submit(1, request("first"));
        while !worker.is_busy() {
            thread::sleep(Duration::from_millis(1));
        }
        let queued = worker.submit(2, request("second"));
        queued.cancel();
        running.cancel();

        assert!(matches!(running.wait_blocking(), Err(PipelineError::Cancelled)));
        assert!(matches!(queued.wait_blocking(), Err(PipelineError::Cancelled)));
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_cancels_active_request() {
        let mut worker = GenerationWorker::new(Arc::new(StallPipeline::default())).unwrap();
        let handle = worker.submit(1, request("never"));
        while !worker.is_busy() {
            thread::sleep(Duration::from_millis(1));
        }
        worker.shutdown();
        assert!(matches!(handle.wait_blocking(), Err(PipelineError::Cancelled)));
    }
}
