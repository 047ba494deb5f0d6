//! Telemetry for the query pipeline
//!
//! Two concerns live here: process-wide `tracing` subscriber setup, and a
//! cheap in-process collector of pipeline events whose aggregated counters
//! are served by the stats endpoint.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Recent events kept for inspection
const EVENT_HISTORY: usize = 256;

/// Pipeline stage names used in events and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Embed,
    Retrieve,
    Rerank,
    Context,
    Generate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Embed => "embed",
            Stage::Retrieve => "retrieve",
            Stage::Rerank => "rerank",
            Stage::Context => "context",
            Stage::Generate => "generate",
        }
    }
}

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    QueryStarted {
        request_id: String,
        streaming: bool,
        timestamp: Instant,
    },
    StageCompleted {
        stage: Stage,
        duration_ms: u64,
        timestamp: Instant,
    },
    RetryAttempt {
        operation: String,
        attempt: u32,
        timestamp: Instant,
    },
    RerankFallback {
        reason: String,
        timestamp: Instant,
    },
    FragmentStreamed {
        timestamp: Instant,
    },
    QueryCompleted {
        request_id: String,
        timestamp: Instant,
    },
    QueryFailed {
        request_id: String,
        kind: String,
        timestamp: Instant,
    },
    StreamCancelled {
        request_id: String,
        timestamp: Instant,
    },
}

/// Aggregated counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub queries_started: usize,
    pub streaming_queries: usize,
    pub queries_completed: usize,
    pub queries_failed: usize,
    pub retry_attempts: usize,
    pub rerank_fallbacks: usize,
    pub fragments_streamed: usize,
    pub streams_cancelled: usize,
    pub embed_ms_total: u64,
    pub retrieve_ms_total: u64,
    pub rerank_ms_total: u64,
    pub generate_ms_total: u64,
}

/// Thread-safe event collector shared by every request
#[derive(Clone)]
pub struct PipelineTelemetry {
    events: Arc<Mutex<VecDeque<PipelineEvent>>>,
    stats: Arc<Mutex<PipelineStats>>,
    start_time: Instant,
}

/// Keep counting after a panicked holder; counters stay meaningful
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PipelineTelemetry {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(EVENT_HISTORY))),
            stats: Arc::new(Mutex::new(PipelineStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: PipelineEvent) {
        {
            let mut stats = lock(&self.stats);
            match &event {
                PipelineEvent::QueryStarted { streaming, .. } => {
                    stats.queries_started += 1;
                    if *streaming {
                        stats.streaming_queries += 1;
                    }
                }
                PipelineEvent::StageCompleted { stage, duration_ms, .. } => match stage {
                    Stage::Embed => stats.embed_ms_total += duration_ms,
                    Stage::Retrieve => stats.retrieve_ms_total += duration_ms,
                    Stage::Rerank => stats.rerank_ms_total += duration_ms,
                    Stage::Generate => stats.generate_ms_total += duration_ms,
                    Stage::Context => {}
                },
                PipelineEvent::RetryAttempt { .. } => stats.retry_attempts += 1,
                PipelineEvent::RerankFallback { .. } => stats.rerank_fallbacks += 1,
                PipelineEvent::FragmentStreamed { .. } => stats.fragments_streamed += 1,
                PipelineEvent::QueryCompleted { .. } => stats.queries_completed += 1,
                PipelineEvent::QueryFailed { .. } => stats.queries_failed += 1,
                PipelineEvent::StreamCancelled { .. } => stats.streams_cancelled += 1,
            }
        }

        // Fragments are counted, not kept
        if matches!(event, PipelineEvent::FragmentStreamed { .. }) {
            return;
        }

        let mut events = lock(&self.events);
        if events.len() == EVENT_HISTORY {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Record a finished stage with its duration
    pub fn stage(&self, stage: Stage, started: Instant) {
        self.record(PipelineEvent::StageCompleted {
            stage,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Instant::now(),
        });
    }

    /// Get current statistics
    pub fn stats(&self) -> PipelineStats {
        lock(&self.stats).clone()
    }

    /// Get elapsed time since start
    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<PipelineEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events.iter().skip(start).cloned().collect()
    }

    /// Share of finished queries that succeeded
    pub fn success_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        let total = stats.queries_completed + stats.queries_failed;
        if total == 0 {
            1.0
        } else {
            stats.queries_completed as f64 / total as f64
        }
    }
}

impl Default for PipelineTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Initialize tracing; `RUST_LOG` takes precedence over the verbosity level
///
/// Logs go to stderr so stdout carries only command output.
pub fn init_tracing(verbose: u8, format: LogFormat) {
    use tracing_subscriber::util::SubscriberInitExt;

    build_subscriber(verbose, format, std::io::stderr).init();
}

fn build_subscriber<W>(verbose: u8, format: LogFormat, writer: W) -> Box<dyn tracing::Subscriber + Send + Sync>
where
    W: for<'a> tracing_subscriber::fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match verbose {
        0 => "ragquery=info,tower_http=warn",
        1 => "ragquery=debug,tower_http=info",
        _ => "ragquery=trace,tower_http=debug",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match format {
        LogFormat::Text => Box::new(
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(writer)
                .finish(),
        ),
        LogFormat::Json => Box::new(
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .finish(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Writer collecting formatted log output in memory
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_log_lines_go_to_configured_writer() {
        for format in [LogFormat::Text, LogFormat::Json] {
            let capture = Capture::default();
            let subscriber = build_subscriber(0, format, capture.clone());

            tracing::subscriber::with_default(subscriber, || {
                tracing::info!(target: "ragquery", "retrieval complete");
            });

            let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
            assert!(output.contains("retrieval complete"));
        }
    }

    #[test]
    fn test_collector_creation() {
        let telemetry = PipelineTelemetry::new();
        assert_eq!(telemetry.stats(), PipelineStats::default());
        assert!(telemetry.recent_events(10).is_empty());
    }

    #[test]
    fn test_stage_durations_accumulate() {
        let telemetry = PipelineTelemetry::new();
        telemetry.record(PipelineEvent::StageCompleted {
            stage: Stage::Embed,
            duration_ms: 12,
            timestamp: Instant::now(),
        });
        telemetry.record(PipelineEvent::StageCompleted {
            stage: Stage::Embed,
            duration_ms: 8,
            timestamp: Instant::now(),
        });

        assert_eq!(telemetry.stats().embed_ms_total, 20);
    }

    #[test]
    fn test_success_rate() {
        let telemetry = PipelineTelemetry::new();
        for id in ["a", "b"] {
            telemetry.record(PipelineEvent::QueryCompleted {
                request_id: id.to_string(),
                timestamp: Instant::now(),
            });
        }
        telemetry.record(PipelineEvent::QueryFailed {
            request_id: "c".to_string(),
            kind: "retrieval_error".to_string(),
            timestamp: Instant::now(),
        });

        assert!((telemetry.success_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_fragments_counted_but_not_kept() {
        let telemetry = PipelineTelemetry::new();
        for _ in 0..5 {
            telemetry.record(PipelineEvent::FragmentStreamed {
                timestamp: Instant::now(),
            });
        }

        assert_eq!(telemetry.stats().fragments_streamed, 5);
        assert!(telemetry.recent_events(10).is_empty());
    }

    #[test]
    fn test_event_history_is_bounded() {
        let telemetry = PipelineTelemetry::new();
        for attempt in 0..(EVENT_HISTORY as u32 + 10) {
            telemetry.record(PipelineEvent::RetryAttempt {
                operation: "retrieve".to_string(),
                attempt,
                timestamp: Instant::now(),
            });
        }

        assert_eq!(telemetry.recent_events(usize::MAX).len(), EVENT_HISTORY);
        assert_eq!(telemetry.stats().retry_attempts, EVENT_HISTORY + 10);
    }

    #[test]
    fn test_clones_share_state() {
        let telemetry = PipelineTelemetry::new();
        let clone = telemetry.clone();
        clone.record(PipelineEvent::RerankFallback {
            reason: "scorer failed".to_string(),
            timestamp: Instant::now(),
        });

        assert_eq!(telemetry.stats().rerank_fallbacks, 1);
    }
}
