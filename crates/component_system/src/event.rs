//! Events and the handlers that receive them

use compact_str::CompactString;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt::{self, Debug};
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Bound shared by every event payload
///
/// The core never inspects the payload; it only needs to move it across
/// tasks and render it for diagnostics.
pub trait Payload: Debug + Send + Sync + 'static {}

impl<T: Debug + Send + Sync + 'static> Payload for T {}

/// Named payload envelope with a bubble level
///
/// The level counts how many ancestor managers the event climbs before it is
/// broadcast. It is the only mutable part of an event and it is shared by
/// every holder of the same `Arc<Event<T>>`.
pub struct Event<T> {
    name: CompactString,
    data: T,
    level: AtomicU8,
}

impl<T> Event<T> {
    /// Create a level 0 event
    pub fn new(name: impl Into<CompactString>, data: T) -> Self {
        Self::with_level(name, data, 0)
    }

    /// Create an event that bubbles up `level` managers before broadcasting
    pub fn with_level(name: impl Into<CompactString>, data: T, level: u8) -> Self {
        Self {
            name: name.into(),
            data,
            level: AtomicU8::new(level),
        }
    }

    /// Create an event already wrapped for dispatch
    pub fn shared(name: impl Into<CompactString>, data: T, level: u8) -> Arc<Self> {
        Arc::new(Self::with_level(name, data, level))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn level(&self) -> u8 {
        self.level.load(Ordering::Acquire)
    }

    /// Travel up one level.
    ///
    /// Returns `true` if the level was above zero (the event should keep
    /// climbing) and `false` once it is exhausted. The level never underflows.
    pub fn pop_level(&self) -> bool {
        self.level
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |level| level.checked_sub(1))
            .is_ok()
    }
}

impl<T: Debug> Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({:?}, {:?}, {})", self.name.as_str(), self.data, self.level())
    }
}

/// Future returned by a handler invocation
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

type HandlerFn<T> = dyn Fn(Arc<Event<T>>) -> HandlerFuture + Send + Sync;

/// Identity of a handler registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(Uuid);

/// Async event handler with a stable identity
///
/// Closures cannot be compared, so every handler carries an id minted at
/// construction. Clones share the id: registering a clone twice is a no-op
/// and a clone can be used to unregister the original.
pub struct Handler<T> {
    id: HandlerId,
    label: CompactString,
    func: Arc<HandlerFn<T>>,
}

impl<T: Payload> Handler<T> {
    /// Wrap an async function as a handler
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Arc<Event<T>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::named("anonymous", func)
    }

    /// Wrap an async function under a label used in logs
    pub fn named<F, Fut>(label: impl Into<CompactString>, func: F) -> Self
    where
        F: Fn(Arc<Event<T>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: HandlerId(Uuid::new_v4()),
            label: label.into(),
            func: Arc::new(move |event| func(event).boxed()),
        }
    }

    /// Wrap a synchronous function as a handler
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn(&Event<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(move |event| {
            let func = Arc::clone(&func);
            async move { func(event.as_ref()) }
        })
    }
}

impl<T> Handler<T> {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Invoke the handler
    pub fn call(&self, event: Arc<Event<T>>) -> HandlerFuture {
        (self.func)(event)
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            label: self.label.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<T> PartialEq for Handler<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handler<T> {}

impl<T> Hash for Handler<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

/// A handler together with the name of the component that owns it
#[derive(Debug)]
pub(crate) struct Registration<T> {
    pub(crate) handler: Handler<T>,
    pub(crate) owner: CompactString,
}

impl<T> Clone for Registration<T> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            owner: self.owner.clone(),
        }
    }
}

impl<T> PartialEq for Registration<T> {
    fn eq(&self, other: &Self) -> bool {
        self.handler == other.handler && self.owner == other.owner
    }
}

impl<T> Eq for Registration<T> {}

impl<T> Hash for Registration<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handler.hash(state);
        self.owner.hash(state);
    }
}
