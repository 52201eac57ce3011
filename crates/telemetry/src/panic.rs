use std::{
    any::Any,
    panic::{self, UnwindSafe},
};

use opentelemetry::{
    Context,
    trace::{Status, TraceContextExt},
};

use crate::{carrier::from_context, error::PanicError, handle::Handle};

/// Renders a panic payload. `panic!` payloads are `&str` or `String`;
/// anything else is reported as an unknown panic.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Turns a caught panic into a recorded error on `handle` and logs it once at
/// error severity. The panic is consumed, never resumed.
pub fn recover_panic(handle: &mut Handle, payload: Box<dyn Any + Send>) -> PanicError {
    let err = PanicError(panic_message(payload.as_ref()));
    handle.with_error(&err).error("unhandled panic");
    err
}

/// [`recover_panic`] for code that only has the request's context: uses the
/// handle carried by `cx` (or a no-op one) and also marks the span in `cx`
/// as errored.
pub fn recover_panic_in(cx: &Context, payload: Box<dyn Any + Send>) -> PanicError {
    let handle = from_context(cx, "panic");
    let err = recover_panic(&mut handle.lock(), payload);

    let span = cx.span();
    span.record_error(&err);
    span.set_status(Status::error(err.to_string()));
    err
}

/// Runs `f`, converting an unwinding panic into a [`PanicError`] through
/// [`recover_panic_in`].
pub fn catch_panic<F, T>(cx: &Context, f: F) -> Result<T, PanicError>
where
    F: FnOnce() -> T + UnwindSafe,
{
    panic::catch_unwind(f).map_err(|payload| recover_panic_in(cx, payload))
}
