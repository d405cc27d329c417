use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::level::Level;
use crate::scratch;

/// A registered log subscriber. Callbacks run synchronously, under the
/// bus's read lock, on whichever thread produced the record.
pub trait Subscriber: Send + Sync {
    fn on_record(&self, level: Level, errno: i32, message: &str);
}

impl<F> Subscriber for F
where
    F: Fn(Level, i32, &str) + Send + Sync,
{
    fn on_record(&self, level: Level, errno: i32, message: &str) {
        (self)(level, errno, message)
    }
}

struct Entry {
    id: u64,
    subscriber: Arc<dyn Subscriber>,
}

/// Process-wide log bus. Readers (emitters) and writers
/// (register/deregister) share one `RwLock` over the subscriber list, as
/// in the native client's own log handler registry.
pub struct LogBus {
    subscribers: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

/// Handle returned by [`LogBus::register`]; pass to [`LogBus::deregister`]
/// to remove the subscriber.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubscriptionId(u64);

impl Default for LogBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.write().expect("log bus poisoned");
        subscribers.push(Entry { id, subscriber });
        SubscriptionId(id)
    }

    pub fn deregister(&self, id: SubscriptionId) {
        let mut subscribers = self.subscribers.write().expect("log bus poisoned");
        subscribers.retain(|entry| entry.id != id.0);
    }

    /// Emits a pre-rendered record to every subscriber. Used internally by
    /// the [`crate::log`] macro after scratch-buffer rendering.
    pub fn emit(&self, level: Level, errno: i32, message: &str) {
        let subscribers = self.subscribers.read().expect("log bus poisoned");
        for entry in subscribers.iter() {
            entry.subscriber.on_record(level, errno, message);
        }
    }

    pub fn record(&self, level: Level, errno: i32, args: std::fmt::Arguments<'_>) {
        scratch::with_rendered(args, |message| self.emit(level, errno, message));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("log bus poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn subscribers_receive_emitted_records() {
        let bus = LogBus::new();
        let seen: Arc<Mutex<Vec<(Level, i32, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.register(Arc::new(move |level, errno, msg: &str| {
            seen_clone.lock().unwrap().push((level, errno, msg.to_string()));
        }));

        bus.record(Level::Warning, 0, format_args!("untrusted config snapshot"));

        let recorded = seen.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, Level::Warning);
        assert_eq!(recorded[0].2, "untrusted config snapshot");
    }

    #[test]
    fn deregistered_subscriber_stops_receiving() {
        let bus = LogBus::new();
        let count = Arc::new(Mutex::new(0usize));
        let count_clone = count.clone();
        let id = bus.register(Arc::new(move |_, _, _: &str| {
            *count_clone.lock().unwrap() += 1;
        }));

        bus.record(Level::Info, 0, format_args!("one"));
        bus.deregister(id);
        bus.record(Level::Info, 0, format_args!("two"));

        assert_eq!(*count.lock().unwrap(), 1);
    }
}
