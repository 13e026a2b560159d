//! Routing metrics using Prometheus
//!
//! Counters live in a registry owned by each application instance, so several
//! applications (or tests) in one process never fight over global names.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::core::error::AppResult;

/// Counters updated by the dispatcher
#[derive(Clone)]
pub struct RoutingMetrics {
    registry: Registry,
    /// Successful dispatches
    /// Labels: handler_type (button/command/input/typing/start)
    pub dispatched: IntCounterVec,
    /// Inbound actions that matched no handler in the current state
    pub misses: IntCounter,
    /// Handler invocations that returned an error
    pub failures: IntCounter,
    /// Calls stopped by a permission policy
    /// Labels: policy
    pub denied: IntCounterVec,
}

impl RoutingMetrics {
    /// Creates the counters and registers them in a fresh registry.
    pub fn new(app_name: &str) -> AppResult<Self> {
        let registry = Registry::new_custom(Some("screenflow".to_string()), None)?;

        let dispatched = IntCounterVec::new(
            Opts::new("dispatch_total", "Inbound actions handled, by handler type").const_label("app", app_name),
            &["handler_type"],
        )?;
        let misses = IntCounter::with_opts(
            Opts::new("routing_miss_total", "Inbound actions that matched no handler").const_label("app", app_name),
        )?;
        let failures = IntCounter::with_opts(
            Opts::new("handler_failure_total", "Handler invocations that returned an error")
                .const_label("app", app_name),
        )?;
        let denied = IntCounterVec::new(
            Opts::new("permission_denied_total", "Calls stopped by a permission policy").const_label("app", app_name),
            &["policy"],
        )?;

        registry.register(Box::new(dispatched.clone()))?;
        registry.register(Box::new(misses.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(denied.clone()))?;

        Ok(Self {
            registry,
            dispatched,
            misses,
            failures,
            denied,
        })
    }

    /// Renders all counters in the Prometheus text exposition format.
    pub fn render(&self) -> AppResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_text_output() {
        let metrics = RoutingMetrics::new("test").unwrap();
        metrics.dispatched.with_label_values(&["button"]).inc();
        metrics.misses.inc();
        metrics.denied.with_label_values(&["maintenance"]).inc_by(2);

        let text = metrics.render().unwrap();
        assert!(text.contains("screenflow_dispatch_total"));
        assert!(text.contains("handler_type=\"button\""));
        assert!(text.contains("screenflow_routing_miss_total"));
        assert!(text.contains("policy=\"maintenance\""));
    }

    #[test]
    fn test_two_instances_do_not_conflict() {
        let a = RoutingMetrics::new("a").unwrap();
        let b = RoutingMetrics::new("b").unwrap();
        a.misses.inc();
        assert_eq!(a.misses.get(), 1);
        assert_eq!(b.misses.get(), 0);
    }
}
