#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tradeextract::{CompletionRequest, CompletionService, ServiceError};

type Route = dyn Fn(&CompletionRequest) -> (Duration, Result<String, ServiceError>) + Send + Sync;

/// Fake service whose reply (and latency) is a function of the prompt.
/// Records every request and the peak number of concurrent calls.
pub struct FakeService {
    route: Box<Route>,
    pub requests: Mutex<Vec<CompletionRequest>>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl FakeService {
    pub fn new(
        route: impl Fn(&CompletionRequest) -> (Duration, Result<String, ServiceError>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            route: Box::new(route),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Same reply for every call, no latency.
    pub fn constant(reply: &'static str) -> Self {
        Self::new(move |_| (Duration::ZERO, Ok(reply.to_string())))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for FakeService {
    async fn call_for_batch(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let (delay, reply) = (self.route)(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

/// Text of "Message 1: ..." in a batch prompt.
pub fn first_message_text(prompt: &str) -> &str {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix("Message 1: "))
        .unwrap_or("")
}
