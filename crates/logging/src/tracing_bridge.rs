//! Bridges the log bus into the `tracing` ecosystem so operators can route
//! daemon/shim diagnostics through the same subscriber stack as any other
//! `tracing`-instrumented service, without making `tracing` part of the
//! wire-visible subscriber contract itself.

use std::sync::Arc;

use crate::{LogBus, Level, SubscriptionId, Subscriber};

struct TracingForwarder;

impl Subscriber for TracingForwarder {
    fn on_record(&self, level: Level, errno: i32, message: &str) {
        match level {
            Level::Critical | Level::Error => {
                tracing::error!(errno, "{message}");
            }
            Level::Warning => tracing::warn!(errno, "{message}"),
            Level::Info => tracing::info!(errno, "{message}"),
            Level::Debug => tracing::debug!(errno, "{message}"),
        }
    }
}

/// Registers a forwarder that re-emits every log bus record as a `tracing`
/// event at the matching level. Returns the subscription so callers can
/// [`LogBus::deregister`] it on shutdown.
pub fn install(bus: &LogBus) -> SubscriptionId {
    bus.register(Arc::new(TracingForwarder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_registers_a_subscriber() {
        let bus = LogBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let id = install(&bus);
        assert_eq!(bus.subscriber_count(), 1);
        bus.deregister(id);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
