//! Deferred operations and the flush barrier
//!
//! Sensory adapters and drivers can batch writes instead of applying them
//! immediately. Queued operations are validated when enqueued and applied in
//! FIFO order by [`SimContext::flush`](crate::SimContext::flush), which every
//! [`SimContext::step`](crate::SimContext::step) calls first. Releasing an
//! object drops the queued operations aimed at it.

use crate::{GroupId, NetworkId, PopulationId};
use std::collections::VecDeque;

/// Pending operations that force a flush when reached
pub const DEFAULT_MAX_PENDING_OPS: usize = 1024;

/// An operation waiting for the next flush
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredOp {
    /// Add current to selected neurons
    InjectCurrent {
        /// Target population
        population: PopulationId,
        /// Neuron offsets
        offsets: Vec<usize>,
        /// Current per offset
        amounts: Vec<f32>,
    },
    /// Replace a network's legacy reward
    SetReward {
        /// Target network
        network: NetworkId,
        /// New reward
        reward: f32,
    },
    /// Zero a group's traces and eligibility
    ResetLearning {
        /// Target group
        group: GroupId,
    },
    /// Redraw a group's weights
    ResetWeights {
        /// Target group
        group: GroupId,
    },
}

impl DeferredOp {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            DeferredOp::InjectCurrent { .. } => "inject_current",
            DeferredOp::SetReward { .. } => "set_reward",
            DeferredOp::ResetLearning { .. } => "reset_learning",
            DeferredOp::ResetWeights { .. } => "reset_weights",
        }
    }
}

/// Bounded FIFO of deferred operations
#[derive(Debug, Clone)]
pub struct OpQueue {
    pending: VecDeque<DeferredOp>,
    max_pending: usize,
}

impl OpQueue {
    /// Create a queue that reports full at `max_pending` operations
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
        }
    }

    /// Append an operation
    pub fn push(&mut self, op: DeferredOp) {
        self.pending.push_back(op);
    }

    /// Take the oldest operation
    pub fn pop(&mut self) -> Option<DeferredOp> {
        self.pending.pop_front()
    }

    /// Whether the bound has been reached
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.max_pending
    }

    /// Pending operation count
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Flush bound
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Pending operations, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &DeferredOp> {
        self.pending.iter()
    }

    /// Keep only the operations `keep` accepts; returns how many were dropped
    pub fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&DeferredOp) -> bool,
    {
        let before = self.pending.len();
        self.pending.retain(keep);
        before - self.pending.len()
    }

    /// Drop everything pending
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for OpQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_OPS)
    }
}
