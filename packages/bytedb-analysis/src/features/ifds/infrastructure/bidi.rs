//! Bidirectional runner
//!
//! Couples a forward and a backward solver on the same unit: the
//! forward half analyzes the natural graph, the backward half the
//! reversed graph. Each half injects its summary edges into the other's
//! inbox as `EdgeForOtherRunner`, so backward-discovered facts seed the
//! forward analysis (NPE and alias analyses rely on this). Quiescence
//! of the pair is the conjunction of the inner quiescences, which the
//! manager observes through both idle flags.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::runner::{RunnerOutput, UnitRunner};
use super::summary_store::EventChannel;

pub struct BidiRunner {
    forward: UnitRunner,
    backward: UnitRunner,
}

impl BidiRunner {
    /// Wire the two halves together; each inbox becomes the other's peer
    pub fn new(
        mut forward: UnitRunner,
        forward_inbox: EventChannel,
        mut backward: UnitRunner,
        backward_inbox: EventChannel,
    ) -> Self {
        forward.set_peer(backward_inbox);
        backward.set_peer(forward_inbox);
        Self { forward, backward }
    }

    /// Both halves' worklist-emptiness flags
    pub fn idle_flags(&self) -> Vec<Arc<AtomicBool>> {
        vec![self.forward.idle_flag(), self.backward.idle_flag()]
    }

    /// Spawn one thread per half
    pub fn spawn(self) -> Vec<JoinHandle<RunnerOutput>> {
        let forward_name = format!("runner-{}-fwd", self.forward.unit());
        let backward_name = format!("runner-{}-bwd", self.backward.unit());
        let forward = self.forward;
        let backward = self.backward;
        vec![
            thread::Builder::new()
                .name(forward_name)
                .spawn(move || forward.run())
                .expect("spawn forward runner"),
            thread::Builder::new()
                .name(backward_name)
                .spawn(move || backward.run())
                .expect("spawn backward runner"),
        ]
    }
}
