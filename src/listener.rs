//! Listener and validation subsystem (spec §4.6): typed change
//! notifications dispatched synchronously within the mutating thread, and
//! a per-transaction validation queue drained at commit.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::objid::ObjId;
use crate::value::Value;

/// The coarse kind of a listener registration, matching spec §4.6
/// "Listener kinds". Field-change sub-kinds are distinguished by the
/// [`Event`] variant itself, not by a separate enum, so a single
/// `FieldChange` registration can filter on the `Event` it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    /// Object creation.
    Create,
    /// Object deletion.
    Delete,
    /// Any field mutation (simple, counter, or collection).
    FieldChange,
    /// Schema migration of an object.
    SchemaChange,
}

/// A single typed change notification.
#[derive(Debug, Clone)]
pub enum Event {
    /// `id` of type `type_id` was created.
    Create { id: ObjId, type_id: u64 },
    /// `id` of type `type_id` was deleted.
    Delete { id: ObjId, type_id: u64 },
    /// A simple field changed from `old` to `new`.
    SimpleChange {
        id: ObjId,
        field_id: u64,
        old: Value,
        new: Value,
    },
    /// A counter field was adjusted by `delta`, reaching `new_value`.
    CounterAdjust {
        id: ObjId,
        field_id: u64,
        delta: i64,
        new_value: i64,
    },
    /// An element was added to a set field.
    SetAdd {
        id: ObjId,
        field_id: u64,
        element: Vec<u8>,
    },
    /// An element was removed from a set field.
    SetRemove {
        id: ObjId,
        field_id: u64,
        element: Vec<u8>,
    },
    /// An element was inserted into a list field at `index`.
    ListAdd {
        id: ObjId,
        field_id: u64,
        index: u32,
        element: Vec<u8>,
    },
    /// An element was removed from a list field at `index`.
    ListRemove {
        id: ObjId,
        field_id: u64,
        index: u32,
        element: Vec<u8>,
    },
    /// A list element at `index` was overwritten.
    ListReplace {
        id: ObjId,
        field_id: u64,
        index: u32,
        old: Vec<u8>,
        new: Vec<u8>,
    },
    /// A map entry was inserted or overwritten.
    MapPut {
        id: ObjId,
        field_id: u64,
        key: Vec<u8>,
        old_value: Option<Vec<u8>>,
        new_value: Vec<u8>,
    },
    /// A map entry was removed.
    MapRemove {
        id: ObjId,
        field_id: u64,
        key: Vec<u8>,
        old_value: Vec<u8>,
    },
    /// A collection field was cleared in bulk.
    Clear { id: ObjId, field_id: u64 },
    /// `id` was migrated from `old_version` to `new_version`. `old_values`
    /// holds every simple/counter field's pre-migration value, keyed by
    /// field storage id, per spec §4.4 "Fires *schema-change* listeners
    /// with the old value map".
    SchemaChange {
        id: ObjId,
        old_version: u32,
        new_version: u32,
        old_values: Vec<(u64, Value)>,
    },
}

impl Event {
    /// The coarse [`ListenerKind`] this event belongs to.
    pub fn kind(&self) -> ListenerKind {
        match self {
            Event::Create { .. } => ListenerKind::Create,
            Event::Delete { .. } => ListenerKind::Delete,
            Event::SchemaChange { .. } => ListenerKind::SchemaChange,
            _ => ListenerKind::FieldChange,
        }
    }

    /// The object this event concerns.
    pub fn object_id(&self) -> ObjId {
        match self {
            Event::Create { id, .. }
            | Event::Delete { id, .. }
            | Event::SimpleChange { id, .. }
            | Event::CounterAdjust { id, .. }
            | Event::SetAdd { id, .. }
            | Event::SetRemove { id, .. }
            | Event::ListAdd { id, .. }
            | Event::ListRemove { id, .. }
            | Event::ListReplace { id, .. }
            | Event::MapPut { id, .. }
            | Event::MapRemove { id, .. }
            | Event::Clear { id, .. }
            | Event::SchemaChange { id, .. } => *id,
        }
    }
}

type Filter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;
type Handler = Arc<Mutex<dyn FnMut(&Event) + Send>>;

struct Registration {
    id: u64,
    kind: ListenerKind,
    filter: Filter,
    handler: Handler,
}

/// A handle returned by [`ListenerRegistry::register`], used to later
/// remove the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

/// A collection of listener registrations with synchronous, same-thread
/// dispatch (spec §4.6 "Dispatch", §5 "Shared resources").
///
/// Add/remove take an exclusive lock; [`ListenerRegistry::dispatch`] takes
/// a read-only snapshot (a clone of the registration `Vec`, cheap since
/// each entry is an `Arc`) so a listener that re-enters the registry (e.g.
/// to register another listener) cannot deadlock against dispatch.
#[derive(Default)]
pub struct ListenerRegistry {
    registrations: Mutex<Vec<Registration>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("count", &self.registrations.lock().unwrap().len())
            .finish()
    }
}

impl ListenerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` to run on every [`Event`] of kind `kind` for
    /// which `filter` returns `true`.
    pub fn register(
        &self,
        kind: ListenerKind,
        filter: impl Fn(&Event) -> bool + Send + Sync + 'static,
        handler: impl FnMut(&Event) + Send + 'static,
    ) -> ListenerHandle {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.registrations.lock().unwrap().push(Registration {
            id,
            kind,
            filter: Arc::new(filter),
            handler: Arc::new(Mutex::new(handler)),
        });
        ListenerHandle(id)
    }

    /// Removes a registration by handle. Returns `true` if it was present.
    pub fn unregister(&self, handle: ListenerHandle) -> bool {
        let mut regs = self.registrations.lock().unwrap();
        let before = regs.len();
        regs.retain(|r| r.id != handle.0);
        regs.len() != before
    }

    /// Dispatches `event` to every matching registration, in registration
    /// order.
    pub fn dispatch(&self, event: &Event) {
        let snapshot: Vec<(Filter, Handler)> = {
            let regs = self.registrations.lock().unwrap();
            regs.iter()
                .filter(|r| r.kind == event.kind())
                .map(|r| (r.filter.clone(), r.handler.clone()))
                .collect()
        };
        for (filter, handler) in snapshot {
            if filter(event) {
                (handler.lock().unwrap())(event);
            }
        }
    }
}

/// The per-transaction set of objects awaiting validation, drained at
/// commit or on demand (spec §4.6 "Validation queue").
#[derive(Debug, Default)]
pub struct ValidationQueue {
    pending: BTreeSet<ObjId>,
}

impl ValidationQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `id` for validation, if not already queued.
    pub fn enqueue(&mut self, id: ObjId) {
        self.pending.insert(id);
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes and returns the next object to validate, if any. Draining
    /// should loop calling this until it returns `None`, since validators
    /// may themselves enqueue further objects (spec: "Queue is drained at
    /// commit ... iterates until empty").
    pub fn take_next(&mut self) -> Option<ObjId> {
        let id = *self.pending.iter().next()?;
        self.pending.remove(&id);
        Some(id)
    }
}

/// A user-defined validator supplied by the mapping layer. The core
/// invokes it with only the changed object's identity (spec §4.6 step 3,
/// §9 "Reflection & dynamic dispatch": the core has no reflection
/// dependency and does not inspect the validator's internals).
pub type Validator = Arc<dyn Fn(ObjId) -> Result<()> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatch_calls_matching_listeners_only() {
        let registry = ListenerRegistry::new();
        let create_count = Arc::new(AtomicUsize::new(0));
        let delete_count = Arc::new(AtomicUsize::new(0));
        {
            let c = create_count.clone();
            registry.register(ListenerKind::Create, |_| true, move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let c = delete_count.clone();
            registry.register(ListenerKind::Delete, |_| true, move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        let id = ObjId::from_raw(1);
        registry.dispatch(&Event::Create { id, type_id: 1 });
        assert_eq!(create_count.load(Ordering::SeqCst), 1);
        assert_eq!(delete_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unregister_stops_dispatch() {
        let registry = ListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = registry.register(ListenerKind::Create, |_| true, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        registry.unregister(handle);
        registry.dispatch(&Event::Create {
            id: ObjId::from_raw(1),
            type_id: 1,
        });
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn validation_queue_drains_in_order() {
        let mut q = ValidationQueue::new();
        let a = ObjId::from_raw(1);
        let b = ObjId::from_raw(2);
        q.enqueue(b);
        q.enqueue(a);
        assert_eq!(q.take_next(), Some(a));
        assert_eq!(q.take_next(), Some(b));
        assert_eq!(q.take_next(), None);
    }
}
