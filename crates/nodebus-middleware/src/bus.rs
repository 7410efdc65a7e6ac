//! Typed, path-keyed publish/subscribe message bus.
//!
//! Nodes never hold references to each other.  They publish values of some
//! message type `T` to a path, and subscribe callbacks to a `(T, path)` pair.
//! Channels are addressed by both: `publish_to::<OccupancyGrid>("map")` and
//! `publish_to::<LaserScanData>("map")` are unrelated.
//!
//! # Delivery
//!
//! | Guarantee | Detail |
//! |---|---|
//! | Single consumer thread | Every callback runs on the one dispatch thread. |
//! | Per-subscriber FIFO | Values from one publisher reach a subscriber in publish order. |
//! | Latching | A latched publisher's last value is replayed to late subscribers. |
//! | Isolation | A panicking callback is logged; other values and subscribers are unaffected. |
//! | Non-blocking producers | `publish`, `subscribe_to` and `unsubscribe` never wait on the dispatch loop. |
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use nodebus_middleware::{BusConfig, MessageBus};
//!
//! let bus = MessageBus::start(BusConfig::default()).unwrap();
//! let grid = bus.publish_to::<u32>("grid");
//! grid.publish(1);
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let sub = bus.subscribe_to("grid", move |v: u32| sink.lock().unwrap().push(v));
//! grid.publish(2);
//! bus.flush().unwrap();
//!
//! // The latched 1 is replayed on subscribe, then 2 arrives.
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
//! sub.unsubscribe();
//! bus.shutdown();
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use nodebus_types::BusError;
use tracing::{debug, warn};

use crate::channel::Message;
use crate::config::BusConfig;
use crate::dispatch::{Dispatcher, LoopState};
use crate::introspect::BusSnapshot;
use crate::publisher::Publisher;
use crate::registry::{ChannelTable, TypeRegistry};
use crate::subscriber::{Subscriber, SubscriberCore};

static GLOBAL: OnceLock<MessageBus> = OnceLock::new();

/// Shared bus handle.  Clone it cheaply; all clones address the same
/// channels and the same dispatch loop.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    registry: TypeRegistry,
    dispatcher: Dispatcher,
    config: BusConfig,
}

impl Drop for BusInner {
    fn drop(&mut self) {
        self.dispatcher.shutdown();
    }
}

impl MessageBus {
    /// Create an independent bus and start its dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Spawn`] if the dispatch thread cannot be created.
    pub fn start(config: BusConfig) -> Result<Self, BusError> {
        let dispatcher = Dispatcher::spawn(&config)?;
        debug!(?config, "message bus started");
        Ok(Self {
            inner: Arc::new(BusInner {
                registry: TypeRegistry::new(),
                dispatcher,
                config,
            }),
        })
    }

    /// Start the process-wide bus, or return it if it is already running.
    ///
    /// `config` only applies to the call that actually starts the bus.
    pub fn init_global(config: BusConfig) -> Result<&'static MessageBus, BusError> {
        if let Some(bus) = GLOBAL.get() {
            return Ok(bus);
        }
        let bus = Self::start(config)?;
        // A racing caller may have won; the loser's bus shuts down on drop.
        Ok(GLOBAL.get_or_init(move || bus))
    }

    /// The process-wide bus, if [`MessageBus::init_global`] has run.
    pub fn global() -> Option<&'static MessageBus> {
        GLOBAL.get()
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Latched publisher for `(T, path)`.  See [`MessageBus::publish_to_with`].
    pub fn publish_to<T: Message>(&self, path: &str) -> Publisher<T> {
        self.publish_to_with(path, true)
    }

    /// Publisher for `(T, path)`, created with `latched` if none exists yet.
    ///
    /// An existing publisher is returned as is; when its latch setting
    /// differs from `latched` the request is ignored and a warning logged.
    /// Use [`MessageBus::try_publish_to_with`] to treat that as an error.
    pub fn publish_to_with<T: Message>(&self, path: &str, latched: bool) -> Publisher<T> {
        let channel = self.inner.registry.table::<T>().channel(path);
        let effective = channel.advertise(latched);
        if effective != latched {
            warn!(
                type_name = channel.type_name(),
                path,
                existing = effective,
                requested = latched,
                "publisher already exists with a different latch setting; keeping the first"
            );
        }
        Publisher::new(channel)
    }

    /// Like [`MessageBus::publish_to_with`] but refuses a conflicting latch
    /// setting.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::LatchConflict`] when a publisher already exists on
    /// this channel with a different latch setting.
    pub fn try_publish_to_with<T: Message>(
        &self,
        path: &str,
        latched: bool,
    ) -> Result<Publisher<T>, BusError> {
        let channel = self.inner.registry.table::<T>().channel(path);
        let effective = channel.advertise(latched);
        if effective != latched {
            return Err(BusError::LatchConflict {
                type_name: channel.type_name().to_string(),
                path: path.to_string(),
                existing: effective,
                requested: latched,
            });
        }
        Ok(Publisher::new(channel))
    }

    // -----------------------------------------------------------------------
    // Subscribing
    // -----------------------------------------------------------------------

    /// Attach `callback` to `(T, path)`.
    ///
    /// If a latched publisher on the channel already holds a value, that
    /// value is delivered on the next dispatch pass as if just published.
    /// The callback always runs on the dispatch thread.
    pub fn subscribe_to<T, F>(&self, path: &str, callback: F) -> Subscriber<T>
    where
        T: Message,
        F: FnMut(T) + Send + 'static,
    {
        let channel = self.inner.registry.table::<T>().channel(path);
        let core = Arc::new(SubscriberCore::new(
            &channel,
            Box::new(callback),
            self.inner.config.effective_capacity(),
            self.inner.config.overflow,
            self.inner.dispatcher.sender(),
        ));
        Subscriber::attach(channel, core)
    }

    /// Current subscriber count on `(T, path)`; zero for unknown channels.
    pub fn subscriber_count<T: Message>(&self, path: &str) -> usize {
        self.inner
            .registry
            .existing::<T>()
            .and_then(|table| table.find(path))
            .map_or(0, |channel| channel.subscriber_count())
    }

    // -----------------------------------------------------------------------
    // Dispatch loop
    // -----------------------------------------------------------------------

    /// Run `action` on the dispatch thread, before the next subscriber scan.
    ///
    /// A panicking action is logged and does not affect later ones.
    pub fn run_on_main<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.dispatcher.schedule(Box::new(action));
    }

    /// Block until every value published and every action scheduled before
    /// this call has been handled.
    ///
    /// Work that callbacks themselves publish during the flush may still be
    /// pending when it returns.
    ///
    /// # Errors
    ///
    /// [`BusError::ReentrantFlush`] from the dispatch thread,
    /// [`BusError::Stopped`] once the loop has stopped.
    pub fn flush(&self) -> Result<(), BusError> {
        self.inner.dispatcher.flush()
    }

    /// Stop the dispatch loop.  Terminal and idempotent.
    ///
    /// Publishing afterwards is still accepted; values are buffered but never
    /// delivered.
    pub fn shutdown(&self) {
        self.inner.dispatcher.shutdown();
    }

    pub fn state(&self) -> LoopState {
        self.inner.dispatcher.state()
    }

    pub fn is_dispatch_thread(&self) -> bool {
        self.inner.dispatcher.is_dispatch_thread()
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Every message type's channel table, sorted by type name.
    pub fn channel_tables(&self) -> Vec<Arc<dyn ChannelTable>> {
        self.inner.registry.tables()
    }

    /// A copy of every type, channel, publisher and subscriber count.
    pub fn snapshot(&self) -> BusSnapshot {
        BusSnapshot {
            state: self.state(),
            types: self.channel_tables().iter().map(|t| t.describe()).collect(),
        }
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("state", &self.state())
            .field("types", &self.inner.registry.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::dispatch::DISPATCH_THREAD_NAME;
    use parking_lot::Mutex;
    use std::sync::mpsc;
    use std::thread;

    fn bus() -> MessageBus {
        MessageBus::start(BusConfig::default()).unwrap()
    }

    /// Subscribe a callback that records every value it receives.
    fn collect<T: Message>(bus: &MessageBus, path: &str) -> (Subscriber<T>, Arc<Mutex<Vec<T>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = bus.subscribe_to(path, move |v: T| sink.lock().push(v));
        (sub, seen)
    }

    /// Occupy the dispatch thread until the returned sender fires.
    fn stall(bus: &MessageBus) -> mpsc::Sender<()> {
        let (release, wait) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        bus.run_on_main(move || {
            let _ = started_tx.send(());
            let _ = wait.recv();
        });
        started_rx.recv().unwrap();
        release
    }

    #[test]
    fn values_arrive_in_publish_order() {
        let bus = bus();
        let (_sub, seen) = collect::<u32>(&bus, "seq");
        let publisher = bus.publish_to::<u32>("seq");
        for i in 0..50 {
            publisher.publish(i);
        }
        bus.flush().unwrap();
        assert_eq!(*seen.lock(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn late_subscriber_gets_latched_value() {
        let bus = bus();
        let grid = bus.publish_to::<String>("grid");
        let (_s1, early) = collect::<String>(&bus, "grid");
        grid.publish("A".to_string());
        grid.publish("B".to_string());
        let (_s2, late) = collect::<String>(&bus, "grid");
        bus.flush().unwrap();
        assert_eq!(*early.lock(), vec!["A", "B"]);
        assert_eq!(*late.lock(), vec!["B"]);
        assert_eq!(grid.latched_value().as_deref(), Some("B"));
    }

    #[test]
    fn unlatched_or_empty_publisher_replays_nothing() {
        let bus = bus();
        let plain = bus.publish_to_with::<u8>("plain", false);
        plain.publish(1);
        let _empty = bus.publish_to::<u8>("empty");
        let (_a, on_plain) = collect::<u8>(&bus, "plain");
        let (_b, on_empty) = collect::<u8>(&bus, "empty");
        bus.flush().unwrap();
        assert!(on_plain.lock().is_empty());
        assert!(on_empty.lock().is_empty());
        assert_eq!(plain.latched_value(), None);

        plain.publish(2);
        bus.flush().unwrap();
        assert_eq!(*on_plain.lock(), vec![2]);
    }

    #[test]
    fn subscribing_before_any_publisher_exists() {
        let bus = bus();
        let (_sub, seen) = collect::<i64>(&bus, "early");
        bus.publish_to::<i64>("early").publish(-3);
        bus.flush().unwrap();
        assert_eq!(*seen.lock(), vec![-3]);
    }

    #[test]
    fn unsubscribed_receives_nothing_new() {
        let bus = bus();
        let publisher = bus.publish_to::<u32>("odom");
        let (sub, seen) = collect::<u32>(&bus, "odom");
        publisher.publish(1);
        bus.flush().unwrap();
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_subscribed());
        publisher.publish(2);
        publisher.publish(3);
        bus.flush().unwrap();
        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn buffered_values_survive_unsubscribe() {
        let bus = bus();
        let publisher = bus.publish_to_with::<u32>("odom", false);
        let (sub, seen) = collect::<u32>(&bus, "odom");
        let release = stall(&bus);
        for v in 1..=3 {
            publisher.publish(v);
        }
        assert_eq!(sub.pending(), 3);
        sub.unsubscribe();
        assert_eq!(publisher.publish(4), 0);
        release.send(()).unwrap();
        bus.flush().unwrap();
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
        assert_eq!(sub.pending(), 0);
        assert_eq!(sub.delivered(), 3);
    }

    #[test]
    fn subscribe_unsubscribe_race_with_concurrent_publishers() {
        use std::collections::HashSet;
        use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

        const THREADS: usize = 4;
        let bus = bus();
        let publisher = bus.publish_to_with::<(usize, u64)>("churn", false);
        let next: Arc<Vec<AtomicU64>> = Arc::new((0..THREADS).map(|_| AtomicU64::new(0)).collect());
        let stop = Arc::new(AtomicBool::new(false));
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let publisher = publisher.clone();
                let next = Arc::clone(&next);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        let i = next[t].fetch_add(1, Ordering::SeqCst);
                        publisher.publish((t, i));
                    }
                })
            })
            .collect();

        let mut rounds = Vec::new();
        for _ in 0..50 {
            let (sub, seen) = collect::<(usize, u64)>(&bus, "churn");
            // Index `start` is claimed after the attach, and `start + 2` only
            // once its publish has returned, so every round sees something.
            let start = next[0].load(Ordering::SeqCst);
            while next[0].load(Ordering::SeqCst) < start + 2 {
                thread::yield_now();
            }
            sub.unsubscribe();
            // Indices claimed from here on are published after the detach.
            let bound: Vec<u64> = next.iter().map(|n| n.load(Ordering::SeqCst)).collect();
            rounds.push((sub, seen, bound));
        }
        stop.store(true, Ordering::SeqCst);
        for h in handles {
            h.join().unwrap();
        }
        bus.flush().unwrap();

        for (sub, seen, bound) in rounds {
            let seen = seen.lock();
            assert!(!seen.is_empty());
            let unique: HashSet<_> = seen.iter().collect();
            assert_eq!(unique.len(), seen.len(), "duplicate delivery");
            for (t, &limit) in bound.iter().enumerate() {
                let mine: Vec<u64> = seen.iter().filter(|(who, _)| *who == t).map(|(_, i)| *i).collect();
                assert!(mine.windows(2).all(|w| w[0] < w[1]), "thread {t} out of order");
                assert!(mine.iter().all(|&i| i < limit), "thread {t} delivered after unsubscribe");
            }
            assert!(!sub.is_subscribed());
            assert_eq!(sub.pending(), 0);
        }
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn two_subscribers_see_everything_independently() {
        let bus = bus();
        let publisher = bus.publish_to::<u16>("path");
        let (_a, first) = collect::<u16>(&bus, "path");
        let (_b, second) = collect::<u16>(&bus, "path");
        for v in [5, 6, 7] {
            assert_eq!(publisher.publish(v), 2);
        }
        bus.flush().unwrap();
        assert_eq!(*first.lock(), vec![5, 6, 7]);
        assert_eq!(*second.lock(), vec![5, 6, 7]);
        assert_eq!(bus.subscriber_count::<u16>("path"), 2);
    }

    #[test]
    fn panicking_callback_is_isolated() {
        let bus = bus();
        let publisher = bus.publish_to_with::<u32>("fragile", false);
        let ok = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ok);
        let flaky = bus.subscribe_to("fragile", move |v: u32| {
            if v == 2 {
                panic!("cannot handle {v}");
            }
            sink.lock().push(v);
        });
        let (_steady, steady) = collect::<u32>(&bus, "fragile");

        publisher.publish(1);
        publisher.publish(2);
        bus.flush().unwrap();
        publisher.publish(3);
        bus.flush().unwrap();

        assert_eq!(*ok.lock(), vec![1, 3]);
        assert_eq!(*steady.lock(), vec![1, 2, 3]);
        assert_eq!(flaky.failures(), 1);
        assert_eq!(flaky.delivered(), 2);
        assert_eq!(bus.state(), LoopState::Running);
    }

    /// A message whose `Clone` fails whenever it runs on the dispatch thread.
    #[derive(Debug)]
    struct Brittle(u32);

    impl Clone for Brittle {
        fn clone(&self) -> Self {
            if thread::current().name() == Some(DISPATCH_THREAD_NAME) {
                panic!("clone of {} refused", self.0);
            }
            Brittle(self.0)
        }
    }

    #[test]
    fn panicking_clone_does_not_starve_other_subscribers() {
        let bus = bus();
        let brittle_sub = bus.subscribe_to("brittle", |_: Brittle| {});
        let (_steady, steady) = collect::<u32>(&bus, "steady");
        let brittle = bus.publish_to_with::<Brittle>("brittle", false);
        let counts = bus.publish_to_with::<u32>("steady", false);

        // Queue the brittle drain ahead of the steady one in a single batch.
        let release = stall(&bus);
        brittle.publish(Brittle(1));
        for i in 1..=5 {
            counts.publish(i);
        }
        release.send(()).unwrap();
        bus.flush().unwrap();
        assert_eq!(*steady.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(brittle_sub.failures(), 1);

        // Neither subscriber is left stuck.
        brittle.publish(Brittle(2));
        counts.publish(6);
        bus.flush().unwrap();
        assert_eq!(*steady.lock(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(brittle_sub.failures(), 2);
        assert_eq!(brittle_sub.pending(), 0);
        assert_eq!(bus.state(), LoopState::Running);
    }

    #[test]
    fn hundred_concurrent_publishers_lose_nothing() {
        let bus = bus();
        let (_sub, seen) = collect::<u32>(&bus, "counter");
        let publisher = bus.publish_to_with::<u32>("counter", false);
        let handles: Vec<_> = (0..100)
            .map(|i| {
                let publisher = publisher.clone();
                thread::spawn(move || {
                    publisher.publish(i);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        bus.flush().unwrap();
        let mut values = seen.lock().clone();
        assert_eq!(values.len(), 100);
        values.sort_unstable();
        assert_eq!(values, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn per_thread_order_survives_interleaving() {
        let bus = bus();
        let (_sub, seen) = collect::<(u8, u32)>(&bus, "pairs");
        let publisher = bus.publish_to_with::<(u8, u32)>("pairs", false);
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let publisher = publisher.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        publisher.publish((t, i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        bus.flush().unwrap();
        let seen = seen.lock();
        assert_eq!(seen.len(), 2000);
        for t in 0..4u8 {
            let mine: Vec<u32> = seen.iter().filter(|(who, _)| *who == t).map(|(_, i)| *i).collect();
            assert_eq!(mine, (0..500).collect::<Vec<_>>());
        }
    }

    #[test]
    fn same_path_different_types_do_not_interact() {
        let bus = bus();
        let (_ints, ints) = collect::<u32>(&bus, "shared");
        let (_strings, strings) = collect::<String>(&bus, "shared");
        bus.publish_to::<u32>("shared").publish(9);
        bus.flush().unwrap();
        assert_eq!(*ints.lock(), vec![9]);
        assert!(strings.lock().is_empty());
    }

    #[test]
    fn publish_to_returns_the_same_publisher() {
        let bus = bus();
        let first = bus.publish_to::<u32>("p");
        first.publish(4);
        let second = bus.publish_to_with::<u32>("p", false);
        assert!(second.is_latched(), "first latch setting wins");
        assert_eq!(second.latched_value(), Some(4));

        let err = bus.try_publish_to_with::<u32>("p", false).unwrap_err();
        assert!(matches!(err, BusError::LatchConflict { existing: true, requested: false, .. }));
        assert!(bus.try_publish_to_with::<u32>("p", true).is_ok());
    }

    #[test]
    fn callbacks_and_actions_run_on_dispatch_thread() {
        let bus = bus();
        let threads = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&threads);
        let _sub = bus.subscribe_to("where", move |_: ()| {
            sink.lock().push(thread::current().name().map(str::to_string));
        });
        let sink = Arc::clone(&threads);
        let handle = bus.clone();
        bus.run_on_main(move || {
            assert!(handle.is_dispatch_thread());
            sink.lock().push(thread::current().name().map(str::to_string));
        });
        bus.publish_to::<()>("where").publish(());
        bus.flush().unwrap();
        assert!(!bus.is_dispatch_thread());
        let threads = threads.lock();
        assert_eq!(threads.len(), 2);
        assert!(
            threads
                .iter()
                .all(|n| n.as_deref() == Some(DISPATCH_THREAD_NAME))
        );
    }

    #[test]
    fn callbacks_may_publish_and_unsubscribe() {
        let bus = bus();
        let relay = bus.publish_to::<u32>("doubled");
        let (_sink, doubled) = collect::<u32>(&bus, "doubled");
        let _doubler = bus.subscribe_to("raw", move |v: u32| {
            relay.publish(v * 2);
        });
        let once_bus = bus.clone();
        let slot: Arc<Mutex<Option<Subscriber<u32>>>> = Arc::new(Mutex::new(None));
        let slot_in = Arc::clone(&slot);
        let hits = Arc::new(Mutex::new(0));
        let hits_in = Arc::clone(&hits);
        let one_shot = once_bus.subscribe_to("raw", move |_: u32| {
            *hits_in.lock() += 1;
            if let Some(me) = slot_in.lock().as_ref() {
                me.unsubscribe();
            }
        });
        *slot.lock() = Some(one_shot);

        let raw = bus.publish_to_with::<u32>("raw", false);
        raw.publish(1);
        bus.flush().unwrap();
        raw.publish(2);
        bus.flush().unwrap();
        bus.flush().unwrap();

        assert_eq!(*doubled.lock(), vec![2, 4]);
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn default_config_never_drops_for_a_slow_subscriber() {
        let bus = bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = bus.subscribe_to("slow", move |v: u32| {
            thread::sleep(std::time::Duration::from_micros(50));
            sink.lock().push(v);
        });
        let publisher = bus.publish_to_with::<u32>("slow", false);
        for i in 0..2000 {
            publisher.publish(i);
        }
        bus.flush().unwrap();
        assert_eq!(*seen.lock(), (0..2000).collect::<Vec<_>>());
        assert_eq!(sub.dropped(), 0);
        assert_eq!(sub.delivered(), 2000);
    }

    #[test]
    fn drop_oldest_keeps_the_newest_values() {
        let bus = MessageBus::start(BusConfig::bounded(2, OverflowPolicy::DropOldest)).unwrap();
        let (sub, seen) = collect::<u32>(&bus, "burst");
        let publisher = bus.publish_to_with::<u32>("burst", false);
        let release = stall(&bus);
        for i in 1..=5 {
            publisher.publish(i);
        }
        assert_eq!(sub.pending(), 2);
        assert_eq!(sub.dropped(), 3);
        release.send(()).unwrap();
        bus.flush().unwrap();
        assert_eq!(*seen.lock(), vec![4, 5]);
        assert_eq!(bus.snapshot().channel::<u32>("burst").unwrap().dropped, 3);
    }

    #[test]
    fn drop_newest_keeps_the_oldest_values() {
        let bus = MessageBus::start(BusConfig::bounded(2, OverflowPolicy::DropNewest)).unwrap();
        let (sub, seen) = collect::<u32>(&bus, "burst");
        let publisher = bus.publish_to_with::<u32>("burst", false);
        let release = stall(&bus);
        for i in 1..=5 {
            publisher.publish(i);
        }
        release.send(()).unwrap();
        bus.flush().unwrap();
        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(sub.dropped(), 3);
    }

    #[test]
    fn snapshot_describes_channels() {
        let bus = bus();
        let grid = bus.publish_to::<String>("grid");
        grid.publish("cells".to_string());
        let (_a, _) = collect::<String>(&bus, "grid");
        let (_b, _) = collect::<u32>(&bus, "lonely");
        bus.flush().unwrap();

        let snap = bus.snapshot();
        assert_eq!(snap.state, LoopState::Running);
        assert_eq!(snap.types.len(), 2);

        let grid = snap.channel::<String>("grid").unwrap();
        let publisher = grid.publisher.as_ref().unwrap();
        assert!(publisher.latched && publisher.has_value);
        assert_eq!(publisher.last_value.as_deref(), Some("\"cells\""));
        assert_eq!(publisher.published, 1);
        assert_eq!(grid.subscribers, 1);

        let lonely = snap.channel::<u32>("lonely").unwrap();
        assert!(lonely.publisher.is_none());
        assert!(snap.to_string().contains("publisher @ grid with 1 subscriber"));
    }

    #[test]
    fn shutdown_is_terminal_and_publish_still_succeeds() {
        let bus = bus();
        let publisher = bus.publish_to::<u32>("after");
        let (sub, seen) = collect::<u32>(&bus, "after");
        bus.shutdown();
        bus.shutdown();
        assert_eq!(bus.state(), LoopState::Stopped);
        assert_eq!(publisher.publish(1), 1);
        assert_eq!(bus.flush(), Err(BusError::Stopped));
        assert!(seen.lock().is_empty());
        assert_eq!(sub.pending(), 1);
    }

    #[test]
    fn global_bus_is_initialised_once() {
        let first = MessageBus::init_global(BusConfig::default()).unwrap();
        let second = MessageBus::init_global(BusConfig::bounded(1, OverflowPolicy::DropNewest)).unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(std::ptr::eq(MessageBus::global().unwrap(), first));
        assert_eq!(first.state(), LoopState::Running);
    }
}
