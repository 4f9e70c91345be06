//! Policy Bridge: ships board buffers to the external routing policy on a
//! worker thread and hands decoded direction grids back to the engine.

use std::{
    io::{self, Read},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use route_protocol::{
    decode_policy_directions, Direction, PolicyDecodeError, PolicyRequest, PolicyResponse,
    BOARD_CELLS,
};
use thiserror::Error;

use crate::config::PolicyConfig;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy service unreachable: {0}")]
    Transport(#[from] io::Error),
    #[error("policy service answered HTTP {status}")]
    Http { status: u16 },
    #[error("malformed policy response: {reason}")]
    Malformed { reason: String },
    #[error("policy returned {actual} directions, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
    #[error("policy action {value} at cell {index} is outside 0..=3")]
    OutOfRange { index: usize, value: i64 },
    #[error("policy worker is gone")]
    Disconnected,
    #[error("policy service is disabled")]
    Disabled,
}

impl From<PolicyDecodeError> for PolicyError {
    fn from(err: PolicyDecodeError) -> Self {
        match err {
            PolicyDecodeError::WrongLength { expected, actual } => {
                PolicyError::WrongLength { expected, actual }
            }
            PolicyDecodeError::OutOfRange { index, value } => {
                PolicyError::OutOfRange { index, value }
            }
        }
    }
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        PolicyError::Malformed {
            reason: err.to_string(),
        }
    }
}

/// Anything that can turn a [`PolicyRequest`] into a [`PolicyResponse`].
/// Calls block; the bridge runs them off the engine thread.
pub trait PolicyTransport: Send + 'static {
    fn fetch(&mut self, request: &PolicyRequest) -> Result<PolicyResponse, PolicyError>;
}

impl<F> PolicyTransport for F
where
    F: FnMut(&PolicyRequest) -> Result<PolicyResponse, PolicyError> + Send + 'static,
{
    fn fetch(&mut self, request: &PolicyRequest) -> Result<PolicyResponse, PolicyError> {
        self(request)
    }
}

/// Largest response body the bridge will read. A full reply is well under
/// 1 KiB.
pub const MAX_RESPONSE_BYTES: u64 = 64 * 1024;

/// JSON-over-HTTP client for the decision service.
///
/// The configured timeout bounds the whole exchange, body included, and the
/// body is cut off at [`MAX_RESPONSE_BYTES`].
#[derive(Debug, Clone)]
pub struct HttpPolicyTransport {
    url: String,
    agent: ureq::Agent,
}

impl HttpPolicyTransport {
    pub fn new(endpoint: impl Into<String>, path: impl Into<String>, timeout: Duration) -> Self {
        let endpoint = endpoint.into();
        let path = path.into();
        let url = if endpoint.contains("://") {
            format!("{endpoint}{path}")
        } else {
            format!("http://{endpoint}{path}")
        };
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self { url, agent }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::new(config.endpoint.clone(), config.path.clone(), config.timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PolicyTransport for HttpPolicyTransport {
    fn fetch(&mut self, request: &PolicyRequest) -> Result<PolicyResponse, PolicyError> {
        let response = self
            .agent
            .post(&self.url)
            .set("Accept", "application/json")
            .send_json(request)
            .map_err(|err| match err {
                ureq::Error::Status(status, _) => PolicyError::Http { status },
                ureq::Error::Transport(transport) => PolicyError::Transport(io::Error::new(
                    io::ErrorKind::Other,
                    transport.to_string(),
                )),
            })?;

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES + 1)
            .read_to_end(&mut body)?;
        if body.len() as u64 > MAX_RESPONSE_BYTES {
            return Err(PolicyError::Malformed {
                reason: format!("response body exceeds {MAX_RESPONSE_BYTES} bytes"),
            });
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Result of one policy request, tagged with the generation it answers.
#[derive(Debug)]
pub struct PolicyOutcome {
    pub generation: u64,
    pub result: Result<[Direction; BOARD_CELLS], PolicyError>,
}

struct PolicyJob {
    generation: u64,
    request: PolicyRequest,
}

/// Owns the policy worker thread.
///
/// Every request gets a fresh generation. The worker skips queued jobs older
/// than the newest one, and [`PolicyBridge::poll`] drops answers to any
/// generation other than the newest, so only the latest request can ever be
/// applied.
pub struct PolicyBridge {
    jobs: Option<Sender<PolicyJob>>,
    results: Receiver<PolicyOutcome>,
    latest: Arc<AtomicU64>,
    pending: bool,
    worker: Option<JoinHandle<()>>,
}

impl PolicyBridge {
    pub fn spawn<T: PolicyTransport>(transport: T) -> Self {
        let (job_tx, job_rx) = unbounded::<PolicyJob>();
        let (result_tx, result_rx) = unbounded::<PolicyOutcome>();
        let latest = Arc::new(AtomicU64::new(0));
        let worker_latest = Arc::clone(&latest);

        let worker = thread::Builder::new()
            .name("route-policy".into())
            .spawn(move || run_worker(transport, job_rx, result_tx, worker_latest))
            .map_err(|err| {
                tracing::warn!(
                    target: "route_sim::policy",
                    error = %err,
                    "policy.worker_spawn_failed"
                );
            })
            .ok();

        Self {
            jobs: worker.as_ref().map(|_| job_tx),
            results: result_rx,
            latest,
            pending: false,
            worker,
        }
    }

    pub fn http(config: &PolicyConfig) -> Self {
        Self::spawn(HttpPolicyTransport::from_config(config))
    }

    /// Queue a request, superseding any outstanding one. Returns its generation.
    pub fn request(&mut self, request: PolicyRequest) -> Result<u64, PolicyError> {
        let jobs = self.jobs.as_ref().ok_or(PolicyError::Disconnected)?;
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        jobs.send(PolicyJob {
            generation,
            request,
        })
        .map_err(|_| PolicyError::Disconnected)?;
        self.pending = true;
        tracing::debug!(target: "route_sim::policy", generation, "policy.requested");
        Ok(generation)
    }

    /// Invalidate any outstanding request.
    pub fn cancel(&mut self) {
        if self.pending {
            let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::debug!(target: "route_sim::policy", generation, "policy.cancelled");
        }
        self.pending = false;
    }

    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Collect the answer to the newest request if it has arrived. Never
    /// blocks.
    pub fn poll(&mut self) -> Option<PolicyOutcome> {
        loop {
            match self.results.try_recv() {
                Ok(outcome) => {
                    if let Some(outcome) = self.accept(outcome) {
                        return Some(outcome);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return self.disconnected(),
            }
        }
    }

    /// Like [`PolicyBridge::poll`] but waits up to `timeout` for an answer.
    pub fn wait(&mut self, timeout: Duration) -> Option<PolicyOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(outcome) => {
                    if let Some(outcome) = self.accept(outcome) {
                        return Some(outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => return self.disconnected(),
            }
        }
    }

    fn accept(&mut self, outcome: PolicyOutcome) -> Option<PolicyOutcome> {
        if outcome.generation != self.latest_generation() {
            tracing::debug!(
                target: "route_sim::policy",
                generation = outcome.generation,
                latest = self.latest_generation(),
                "policy.stale_discarded"
            );
            return None;
        }
        self.pending = false;
        Some(outcome)
    }

    fn disconnected(&mut self) -> Option<PolicyOutcome> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        Some(PolicyOutcome {
            generation: self.latest_generation(),
            result: Err(PolicyError::Disconnected),
        })
    }
}

impl Drop for PolicyBridge {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker<T: PolicyTransport>(
    mut transport: T,
    jobs: Receiver<PolicyJob>,
    results: Sender<PolicyOutcome>,
    latest: Arc<AtomicU64>,
) {
    while let Ok(mut job) = jobs.recv() {
        while let Ok(newer) = jobs.try_recv() {
            job = newer;
        }
        if job.generation != latest.load(Ordering::Acquire) {
            continue;
        }

        let result = transport
            .fetch(&job.request)
            .and_then(|response| Ok(decode_policy_directions(&response)?));
        if let Err(err) = &result {
            tracing::warn!(
                target: "route_sim::policy",
                generation = job.generation,
                error = %err,
                "policy.failed"
            );
        }
        let outcome = PolicyOutcome {
            generation: job.generation,
            result,
        };
        if results.send(outcome).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_endpoint_gets_http_scheme() {
        let transport =
            HttpPolicyTransport::new("127.0.0.1:8000", "/get_action", Duration::from_secs(1));
        assert_eq!(transport.url(), "http://127.0.0.1:8000/get_action");
        let transport =
            HttpPolicyTransport::new("http://policy:9000", "/act", Duration::from_secs(1));
        assert_eq!(transport.url(), "http://policy:9000/act");
    }

    #[test]
    fn decode_errors_keep_their_detail() {
        let err: PolicyError = PolicyDecodeError::OutOfRange { index: 4, value: 9 }.into();
        assert!(matches!(err, PolicyError::OutOfRange { index: 4, value: 9 }));
    }
}
