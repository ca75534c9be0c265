//! Concurrent batch dispatch
//!
//! Sends oracle requests on worker threads, at most `max_in_flight` at a
//! time, and bounds every call by a timeout. Responses are keyed by batch
//! token so arrival order never matters. A batch that times out is failed
//! as a whole; its worker is left to finish in the background and its late
//! answer is discarded.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::oracle::OracleRequest;
use super::transport::OracleTransport;
use crate::error::{CategorizeError, CategorizeResult};
use crate::models::BatchToken;

/// Shared flag used to stop a run between batches
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Responses for every dispatched batch, keyed by token
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub responses: HashMap<BatchToken, CategorizeResult<String>>,
    /// Batches never sent because the run was cancelled
    pub cancelled: Vec<BatchToken>,
}

/// Sends requests through a transport with bounded concurrency and timeouts
pub struct Dispatcher {
    transport: Arc<dyn OracleTransport>,
    timeout: Duration,
    max_in_flight: usize,
    cancel: CancelFlag,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn OracleTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            max_in_flight: 4,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Send all requests and collect one result per dispatched batch
    pub fn dispatch(&self, requests: &[OracleRequest]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for wave in requests.chunks(self.max_in_flight) {
            if self.cancel.is_cancelled() {
                report.cancelled.extend(wave.iter().map(OracleRequest::token));
                continue;
            }
            self.dispatch_wave(wave, &mut report);
        }

        report
    }

    fn dispatch_wave(&self, wave: &[OracleRequest], report: &mut DispatchReport) {
        let (tx, rx) = mpsc::channel::<(BatchToken, CategorizeResult<String>)>();
        let mut pending = HashSet::new();

        for request in wave {
            let token = request.token();
            if self.cancel.is_cancelled() {
                report.cancelled.push(token);
                continue;
            }

            let tx = tx.clone();
            let transport = Arc::clone(&self.transport);
            let text = request.text.clone();

            let spawned = thread::Builder::new()
                .name(format!("oracle-{}", token))
                .spawn(move || {
                    let result = transport.send(&text);
                    // The receiver is gone if the batch already timed out
                    let _ = tx.send((token, result));
                });

            match spawned {
                Ok(_) => {
                    debug!(batch = %token, "Dispatched oracle batch");
                    pending.insert(token);
                }
                Err(e) => {
                    report.responses.insert(
                        token,
                        Err(CategorizeError::OracleTransport(format!(
                            "Failed to start worker: {}",
                            e
                        ))),
                    );
                }
            }
        }
        drop(tx);

        let deadline = Instant::now() + self.timeout;
        let mut timed_out = false;

        while !pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((token, result)) => {
                    if pending.remove(&token) {
                        report.responses.insert(token, result);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    timed_out = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        for token in pending {
            let err = if timed_out {
                warn!(batch = %token, timeout_ms, "Oracle batch timed out");
                CategorizeError::OracleTimeout(timeout_ms)
            } else {
                warn!(batch = %token, "Oracle worker exited without a response");
                CategorizeError::OracleTransport("Worker exited without a response".into())
            };
            report.responses.insert(token, Err(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionId;
    use crate::services::oracle::{OrdinalTable, RequestKind};

    fn request(text: &str) -> OracleRequest {
        OracleRequest {
            kind: RequestKind::Classify,
            text: text.to_string(),
            table: OrdinalTable::new(BatchToken::new(), vec![TransactionId::from("1")]),
        }
    }

    fn echo() -> Arc<dyn OracleTransport> {
        Arc::new(|request: &str| -> CategorizeResult<String> { Ok(format!("echo:{}", request)) })
    }

    #[test]
    fn test_responses_keyed_by_token() {
        // Slower first request so answers arrive out of order
        let transport: Arc<dyn OracleTransport> =
            Arc::new(|request: &str| -> CategorizeResult<String> {
                if request == "slow" {
                    thread::sleep(Duration::from_millis(50));
                }
                Ok(request.to_string())
            });
        let dispatcher = Dispatcher::new(transport, Duration::from_secs(5));

        let requests = vec![request("slow"), request("fast")];
        let report = dispatcher.dispatch(&requests);

        assert_eq!(report.responses.len(), 2);
        assert_eq!(
            report.responses[&requests[0].token()].as_ref().unwrap(),
            "slow"
        );
        assert_eq!(
            report.responses[&requests[1].token()].as_ref().unwrap(),
            "fast"
        );
    }

    #[test]
    fn test_timeout_fails_whole_batch() {
        let transport: Arc<dyn OracleTransport> =
            Arc::new(|request: &str| -> CategorizeResult<String> {
                if request == "hang" {
                    thread::sleep(Duration::from_secs(2));
                }
                Ok(request.to_string())
            });
        let dispatcher = Dispatcher::new(transport, Duration::from_millis(100));

        let requests = vec![request("hang"), request("quick")];
        let started = Instant::now();
        let report = dispatcher.dispatch(&requests);

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(
            report.responses[&requests[0].token()],
            Err(CategorizeError::OracleTimeout(100))
        ));
        assert!(report.responses[&requests[1].token()].is_ok());
    }

    #[test]
    fn test_transport_errors_are_returned_per_batch() {
        let transport: Arc<dyn OracleTransport> =
            Arc::new(|request: &str| -> CategorizeResult<String> {
                if request == "bad" {
                    Err(CategorizeError::OracleTransport("connection refused".into()))
                } else {
                    Ok(request.to_string())
                }
            });
        let dispatcher = Dispatcher::new(transport, Duration::from_secs(5));

        let requests = vec![request("bad"), request("good")];
        let report = dispatcher.dispatch(&requests);
        assert!(report.responses[&requests[0].token()].is_err());
        assert!(report.responses[&requests[1].token()].is_ok());
    }

    #[test]
    fn test_bounded_waves_cover_all_requests() {
        let dispatcher = Dispatcher::new(echo(), Duration::from_secs(5)).with_max_in_flight(2);
        let requests: Vec<_> = (0..5).map(|i| request(&i.to_string())).collect();
        let report = dispatcher.dispatch(&requests);

        assert_eq!(report.responses.len(), 5);
        for (i, req) in requests.iter().enumerate() {
            assert_eq!(
                report.responses[&req.token()].as_ref().unwrap(),
                &format!("echo:{}", i)
            );
        }
    }

    #[test]
    fn test_cancelled_before_dispatch() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let dispatcher = Dispatcher::new(echo(), Duration::from_secs(5)).with_cancel_flag(cancel);

        let requests = vec![request("a"), request("b")];
        let report = dispatcher.dispatch(&requests);
        assert!(report.responses.is_empty());
        assert_eq!(report.cancelled.len(), 2);
    }

    #[test]
    fn test_cancel_mid_run_keeps_completed_batches() {
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let transport: Arc<dyn OracleTransport> =
            Arc::new(move |request: &str| -> CategorizeResult<String> {
                flag.cancel();
                Ok(request.to_string())
            });
        let dispatcher = Dispatcher::new(transport, Duration::from_secs(5))
            .with_max_in_flight(1)
            .with_cancel_flag(cancel);

        let requests = vec![request("first"), request("second"), request("third")];
        let report = dispatcher.dispatch(&requests);

        assert_eq!(report.responses.len(), 1);
        assert!(report.responses[&requests[0].token()].is_ok());
        assert_eq!(
            report.cancelled,
            vec![requests[1].token(), requests[2].token()]
        );
    }
}
