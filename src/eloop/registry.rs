//! Pending timeouts and event bindings.
//!
//! Pure data structure: the event loop wraps it in a mutex and supplies the
//! current tick. Timeouts are kept sorted by fire time; entries with equal
//! fire times keep their registration order.

use super::clock::Tick;
use super::message::{Ctx, CtxMatch, EventId};
use std::collections::VecDeque;

/// A scheduled timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout<H> {
    pub fire_at: Tick,
    pub handler: H,
    pub ctx1: Ctx,
    pub ctx2: Ctx,
}

/// An event to handler binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding<H> {
    pub event: EventId,
    pub handler: H,
    pub ctx1: Ctx,
    pub ctx2: Ctx,
}

impl<H> Binding<H> {
    pub fn new(event: EventId, handler: H) -> Self {
        Self::with_ctx(event, handler, Ctx::NONE, Ctx::NONE)
    }

    pub fn with_ctx(event: EventId, handler: H, ctx1: Ctx, ctx2: Ctx) -> Self {
        Self {
            event,
            handler,
            ctx1,
            ctx2,
        }
    }
}

#[derive(Debug)]
pub struct Registry<H> {
    timeouts: VecDeque<Timeout<H>>,
    static_bindings: Vec<Binding<H>>,
    bindings: Vec<Binding<H>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            timeouts: VecDeque::new(),
            static_bindings: Vec::new(),
            bindings: Vec::new(),
        }
    }
}

impl<H: Copy + PartialEq> Registry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the bindings that live for the whole lifetime of the loop.
    pub fn set_static_bindings(&mut self, bindings: Vec<Binding<H>>) {
        self.static_bindings = bindings;
    }

    pub fn insert_timeout(&mut self, timeout: Timeout<H>) {
        let pos = self
            .timeouts
            .iter()
            .position(|t| t.fire_at.since(timeout.fire_at) > 0)
            .unwrap_or(self.timeouts.len());
        self.timeouts.insert(pos, timeout);
    }

    /// Fire time of the earliest pending timeout.
    pub fn next_deadline(&self) -> Option<Tick> {
        self.timeouts.front().map(|t| t.fire_at)
    }

    /// Remove and return the earliest timeout if it is due at `now`.
    pub fn pop_due(&mut self, now: Tick) -> Option<Timeout<H>> {
        if self.timeouts.front()?.fire_at.is_due(now) {
            self.timeouts.pop_front()
        } else {
            None
        }
    }

    /// Remove every timeout of `handler` whose contexts match. Returns the
    /// number removed.
    pub fn cancel(&mut self, handler: H, ctx1: CtxMatch, ctx2: CtxMatch) -> usize {
        let before = self.timeouts.len();
        self.timeouts
            .retain(|t| !(t.handler == handler && ctx1.matches(t.ctx1) && ctx2.matches(t.ctx2)));
        before - self.timeouts.len()
    }

    pub fn contains(&self, handler: H, ctx1: Ctx, ctx2: Ctx) -> bool {
        self.timeouts
            .iter()
            .any(|t| t.handler == handler && t.ctx1 == ctx1 && t.ctx2 == ctx2)
    }

    pub fn timeout_count(&self) -> usize {
        self.timeouts.len()
    }

    pub fn add_binding(&mut self, binding: Binding<H>) {
        self.bindings.push(binding);
    }

    /// Remove the first dynamic binding for `event`. Returns whether one was
    /// found.
    pub fn remove_binding(&mut self, event: EventId) -> bool {
        match self.bindings.iter().position(|b| b.event == event) {
            Some(pos) => {
                self.bindings.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn is_bound(&self, event: EventId, handler: H) -> bool {
        self.static_bindings
            .iter()
            .chain(self.bindings.iter())
            .any(|b| b.event == event && b.handler == handler)
    }

    /// Bindings to invoke for `event`, wildcard bindings first, each group
    /// in registration order (static before dynamic).
    pub fn targets(&self, event: EventId) -> Vec<Binding<H>> {
        let all = || self.static_bindings.iter().chain(self.bindings.iter());
        all()
            .filter(|b| b.event == EventId::ALL)
            .chain(all().filter(|b| b.event == event && event != EventId::ALL))
            .copied()
            .collect()
    }

    /// Take every pending timeout and drop all bindings.
    pub fn clear(&mut self) -> Vec<Timeout<H>> {
        self.static_bindings.clear();
        self.bindings.clear();
        self.timeouts.drain(..).collect()
    }
}
