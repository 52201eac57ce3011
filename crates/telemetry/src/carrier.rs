//! Carrying a handle inside an OpenTelemetry [`Context`].
//!
//! Code that only receives a `Context` (framework callbacks, panic hooks) can
//! still find the handle of the operation it belongs to. Lookups never fail:
//! [`from_context`] hands out a fresh no-op handle when none was stored.

use std::sync::Arc;

use opentelemetry::Context;
use parking_lot::Mutex;

use crate::handle::Handle;

/// A handle shared between the owner of an operation and code reached
/// through its context.
pub type SharedHandle = Arc<Mutex<Handle>>;

pub fn share(handle: Handle) -> SharedHandle {
    Arc::new(Mutex::new(handle))
}

struct HandleSlot(SharedHandle);

/// Returns a copy of `cx` carrying `handle`.
pub fn with_handle(cx: &Context, handle: SharedHandle) -> Context {
    cx.with_value(HandleSlot(handle))
}

pub fn handle_from(cx: &Context) -> Option<SharedHandle> {
    cx.get::<HandleSlot>().map(|slot| slot.0.clone())
}

/// The handle stored in `cx`, or a no-op handle named `name`.
pub fn from_context(cx: &Context, name: &str) -> SharedHandle {
    handle_from(cx).unwrap_or_else(|| share(Handle::noop(name)))
}
