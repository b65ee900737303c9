//! Operation counters and timers, exported for Prometheus.
//!
//! Names follow `{scope}.{op}.count` / `{scope}.{op}.timer`:
//! - `api.s3.{upload,get,delete,list}`: registry operations
//! - `s3.operation.{upload,head,delete}`: individual object store calls
//!
//! plus `registry.orphaned_objects`, counting objects left without a
//! metadata record. The exporter renders `.` as `_`.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::{net::SocketAddr, time::Instant};

const API: &str = "api.s3";
const STORE: &str = "s3.operation";

/// Serve `/metrics` on `addr`.
pub fn install(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Counts one operation and records its duration when dropped.
pub struct OperationTimer {
    scope: &'static str,
    op: &'static str,
    started: Instant,
}

impl OperationTimer {
    pub fn api(op: &'static str) -> Self {
        Self::new(API, op)
    }

    pub fn store(op: &'static str) -> Self {
        Self::new(STORE, op)
    }

    fn new(scope: &'static str, op: &'static str) -> Self {
        Self {
            scope,
            op,
            started: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        counter!(format!("{}.{}.count", self.scope, self.op)).increment(1);
        histogram!(format!("{}.{}.timer", self.scope, self.op))
            .record(self.started.elapsed().as_secs_f64());
    }
}

pub fn record_orphaned_object() {
    counter!("registry.orphaned_objects").increment(1);
}
