/*
 * Summary store and event bus
 *
 * A map from Method to a topic. Each topic keeps a replay buffer (late
 * subscribers observe the full history) and a list of live subscriber
 * channels; publication is multi-producer/multi-consumer. Delivery is
 * at-least-once; subscribers deduplicate by edge identity in propagate,
 * so logical processing is effectively at-most-once.
 *
 * Replay buffers are unbounded in principle, bounded in practice by the
 * finite fact domain. A configurable cap downgrades to drop-newest and
 * flags the analysis result instead of growing without bound.
 *
 * Subscribing to a method nobody published for yet creates the topic,
 * so a subscriber can never race the first publish and lose it.
 */

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::warn;

use crate::features::ifds::domain::{Edge, Vertex, Vulnerability};
use crate::shared::models::MethodId;

/// Events flowing between runners and into the store
#[derive(Debug, Clone)]
pub enum Event {
    /// A path edge ending at a method exit was discovered
    SummaryEdge { method: MethodId, edge: Edge },

    /// A finding was reported
    Vulnerability(Vulnerability),

    /// An edge destined for the runner owning its method's unit
    EdgeForOtherRunner { edge: Edge },

    /// A call site requested analysis of a callee in another unit
    CrossUnitCall {
        caller: Vertex,
        callee_start: Vertex,
        callee: MethodId,
    },
}

/// Sender half of a runner inbox, with global in-flight accounting
///
/// The manager's quiescence detection needs to know that no event is
/// sitting in a channel while every worklist is empty; each send
/// increments the shared counter and the receiving runner decrements it
/// after handling the event.
#[derive(Clone)]
pub struct EventChannel {
    sender: Sender<Event>,
    in_flight: Arc<AtomicUsize>,
}

impl EventChannel {
    pub fn new(sender: Sender<Event>, in_flight: Arc<AtomicUsize>) -> Self {
        Self { sender, in_flight }
    }

    /// Send, keeping the in-flight count accurate. Returns false when
    /// the receiver is gone.
    pub fn send(&self, event: Event) -> bool {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        match self.sender.send(event) {
            Ok(()) => true,
            Err(_) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                false
            }
        }
    }
}

#[derive(Default)]
struct TopicInner {
    replay: Vec<Event>,
    subscribers: Vec<EventChannel>,
}

#[derive(Default)]
struct Topic {
    inner: Mutex<TopicInner>,
}

/// Shared publish/subscribe store of cross-unit knowledge
pub struct SummaryStore {
    topics: DashMap<MethodId, Arc<Topic>>,
    vulnerabilities: Mutex<Vec<Vulnerability>>,
    replay_capacity: usize,
    events_dropped: AtomicBool,
}

impl SummaryStore {
    pub fn new(replay_capacity: usize) -> Self {
        Self {
            topics: DashMap::default(),
            vulnerabilities: Mutex::new(Vec::new()),
            replay_capacity,
            events_dropped: AtomicBool::new(false),
        }
    }

    fn topic(&self, method: MethodId) -> Arc<Topic> {
        self.topics
            .entry(method)
            .or_insert_with(|| Arc::new(Topic::default()))
            .clone()
    }

    /// Publish an event on a method's topic: append to the replay buffer
    /// and fan out to live subscribers. Dead subscribers are pruned.
    pub fn publish(&self, method: MethodId, event: Event) {
        let topic = self.topic(method);
        let mut inner = topic.inner.lock();

        if inner.replay.len() >= self.replay_capacity {
            if !self.events_dropped.swap(true, Ordering::SeqCst) {
                warn!(
                    %method,
                    capacity = self.replay_capacity,
                    "replay buffer full; dropping newest events"
                );
            }
            return;
        }
        inner.replay.push(event.clone());
        inner.subscribers.retain(|sub| sub.send(event.clone()));
    }

    /// Subscribe a runner inbox to a method's topic. The full history is
    /// replayed into the channel before it goes live, under the topic
    /// lock, so no concurrent publish can slip between replay and
    /// registration.
    pub fn subscribe(&self, method: MethodId, channel: EventChannel) {
        let topic = self.topic(method);
        let mut inner = topic.inner.lock();
        for event in &inner.replay {
            channel.send(event.clone());
        }
        inner.subscribers.push(channel);
    }

    /// Append a finding and announce it on the sink method's topic.
    /// Duplicates are dropped at insertion, which also terminates the
    /// announcement echo when a subscriber hands the finding back.
    pub fn add_vulnerability(&self, vulnerability: Vulnerability) {
        {
            let mut all = self.vulnerabilities.lock();
            if all.contains(&vulnerability) {
                return;
            }
            all.push(vulnerability.clone());
        }
        self.publish(
            vulnerability.method,
            Event::Vulnerability(vulnerability),
        );
    }

    /// All findings published so far
    pub fn vulnerabilities(&self) -> Vec<Vulnerability> {
        self.vulnerabilities.lock().clone()
    }

    pub fn events_dropped(&self) -> bool {
        self.events_dropped.load(Ordering::SeqCst)
    }

    /// Replay-buffer depths per topic, for operator visibility
    pub fn queue_depths(&self) -> Vec<(MethodId, usize)> {
        let mut depths: Vec<(MethodId, usize)> = self
            .topics
            .iter()
            .map(|entry| (*entry.key(), entry.value().inner.lock().replay.len()))
            .collect();
        depths.sort();
        depths
    }
}
