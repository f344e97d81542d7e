//! Metrics decorator (C8): wraps a [`Sender`] and records execution
//! duration and terminal-failure counts without changing its behavior.
//!
//! Grounded on the original's `MetricExecutor` (a `prometheus.HistogramVec`
//! keyed by `{table, success}` plus a `CounterVec` keyed by `{table}`),
//! reimplemented against the `metrics` crate's recorder-agnostic macros so
//! the host picks the exporter (Prometheus, StatsD, ...).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use relaybox_domain::{Result, ShardTarget};

use crate::ports::{SendOutcome, Sender};

const METRIC_EXEC_DURATION: &str = "relaybox_sender_exec_duration_seconds";
const METRIC_TERMINAL_FAILURES: &str = "relaybox_sender_terminal_failures_total";

pub struct MetricsSender {
    inner: Arc<dyn Sender>,
}

impl MetricsSender {
    pub fn new(inner: Arc<dyn Sender>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Sender for MetricsSender {
    async fn exec(&self, target: &ShardTarget) -> Result<SendOutcome> {
        let start = Instant::now();
        let result = self.inner.exec(target).await;
        let elapsed = start.elapsed();
        let table = target.to_string();
        let success = result.is_ok();

        histogram!(METRIC_EXEC_DURATION, "table" => table.clone(), "success" => success.to_string())
            .record(elapsed.as_secs_f64());

        let terminal_failures = match &result {
            Ok(outcome) => outcome.terminal_failures,
            Err(_) => 0,
        };
        if terminal_failures > 0 {
            counter!(METRIC_TERMINAL_FAILURES, "table" => table).increment(terminal_failures as u64);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct FixedSender {
        outcome: SendOutcome,
    }

    #[async_trait]
    impl Sender for FixedSender {
        async fn exec(&self, _target: &ShardTarget) -> Result<SendOutcome> {
            Ok(self.outcome)
        }
    }

    #[tokio::test]
    async fn passes_through_the_inner_outcome() {
        let inner = Arc::new(FixedSender { outcome: SendOutcome { processed: 4, terminal_failures: 1 } });
        let decorated = MetricsSender::new(inner);
        let outcome = decorated.exec(&ShardTarget::single("local_msgs")).await.unwrap();
        assert_eq!(outcome.processed, 4);
        assert_eq!(outcome.terminal_failures, 1);
    }
}
