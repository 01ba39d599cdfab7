//! Metrics for query execution.
//!
//! Recorded through the [`metrics`] facade. Without an installed recorder
//! every call is a no-op; applications that want Prometheus (or any other
//! backend) install a recorder and call [`describe_metrics`] once.
//!
//! | name | kind | labels |
//! |---|---|---|
//! | `docquery_queries_total` | counter | `operation`, `outcome` |
//! | `docquery_query_errors_total` | counter | `operation`, `kind` |
//! | `docquery_query_duration_seconds` | histogram | `operation` |
//! | `docquery_documents_written_total` | counter | `operation` |
//! | `docquery_retry_attempts_total` | counter | |

use docquery_core::envelope::QueryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Register all metric descriptions.
pub fn describe_metrics() {
    describe_counter!(
        "docquery_queries_total",
        "Total number of resolved queries and mutations"
    );
    describe_counter!(
        "docquery_query_errors_total",
        "Total number of resolutions that returned an error"
    );
    describe_histogram!(
        "docquery_query_duration_seconds",
        "Time taken to resolve a query, driver calls included"
    );
    describe_counter!(
        "docquery_documents_written_total",
        "Total number of documents written by insert, upsert and update"
    );
    describe_counter!(
        "docquery_retry_attempts_total",
        "Total number of driver calls retried after a transient failure"
    );
}

/// Query metrics recorder.
pub struct QueryMetrics;

impl QueryMetrics {
    /// Record one resolution.
    pub fn record(operation: &'static str, duration: Duration, result: &QueryResult) {
        histogram!("docquery_query_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());

        match result {
            Ok(_) => {
                counter!("docquery_queries_total", "operation" => operation, "outcome" => "ok")
                    .increment(1);
            }
            Err(error) => {
                counter!("docquery_queries_total", "operation" => operation, "outcome" => "error")
                    .increment(1);
                counter!("docquery_query_errors_total", "operation" => operation, "kind" => error.kind())
                    .increment(1);
            }
        }
    }

    /// Record documents written by a mutation.
    pub fn record_written(operation: &'static str, count: usize) {
        counter!("docquery_documents_written_total", "operation" => operation)
            .increment(count as u64);
    }

    /// Record one retried driver call.
    pub fn record_retry() {
        counter!("docquery_retry_attempts_total").increment(1);
    }
}
