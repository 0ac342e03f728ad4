//! Messages carried by the event loop queue.

use std::fmt;

/// Event identifier. Values below [`EventId::FIRST_USER`] are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u16);

impl EventId {
    /// Wakes the loop without dispatching anything.
    pub const WAKEUP: EventId = EventId(1);
    /// Stops the loop once dequeued.
    pub const TERMINATE: EventId = EventId(2);
    /// Wildcard: a binding on `ALL` sees every dispatched message.
    pub const ALL: EventId = EventId(3);
    /// First identifier available to users of the loop.
    pub const FIRST_USER: EventId = EventId(4);

    pub fn is_reserved(self) -> bool {
        self < Self::FIRST_USER
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::WAKEUP => write!(f, "WAKEUP"),
            Self::TERMINATE => write!(f, "TERMINATE"),
            Self::ALL => write!(f, "ALL"),
            EventId(id) => write!(f, "#{}", id),
        }
    }
}

/// A queued message: event plus 16-bit reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Message {
    pub event: EventId,
    pub reason: u16,
}

// Messages travel by value; they must fit a pointer-sized queue slot.
const _: () = assert!(std::mem::size_of::<Message>() <= std::mem::size_of::<usize>());

impl Message {
    pub fn new(event: EventId, reason: u16) -> Self {
        Self { event, reason }
    }

    pub fn event(event: EventId) -> Self {
        Self::new(event, 0)
    }
}

/// Opaque context handle attached to bindings and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ctx(pub u32);

impl Ctx {
    pub const NONE: Ctx = Ctx(0);
}

/// Context filter used when cancelling timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtxMatch {
    Exactly(Ctx),
    Any,
}

impl CtxMatch {
    pub fn matches(self, ctx: Ctx) -> bool {
        match self {
            Self::Exactly(want) => want == ctx,
            Self::Any => true,
        }
    }
}

impl From<Ctx> for CtxMatch {
    fn from(ctx: Ctx) -> Self {
        Self::Exactly(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids() {
        assert!(EventId::WAKEUP.is_reserved());
        assert!(EventId::ALL.is_reserved());
        assert!(!EventId::FIRST_USER.is_reserved());
        assert_eq!(EventId::TERMINATE.to_string(), "TERMINATE");
        assert_eq!(EventId(9).to_string(), "#9");
    }

    #[test]
    fn test_message_fits_pointer_slot() {
        assert_eq!(std::mem::size_of::<Message>(), 4);
    }

    #[test]
    fn test_ctx_match() {
        assert!(CtxMatch::Any.matches(Ctx(7)));
        assert!(CtxMatch::from(Ctx(7)).matches(Ctx(7)));
        assert!(!CtxMatch::Exactly(Ctx::NONE).matches(Ctx(7)));
    }
}
