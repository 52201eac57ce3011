use std::{convert::Infallible, ops::Deref};

use axum::{extract::FromRequestParts, http::request::Parts};
use opentelemetry::Context;
use strand_telemetry::{Handle, SharedHandle, from_context, share};

/// The request's context, carrying its server span and correlation handle.
/// Inserted into the request extensions by the telemetry middleware.
#[derive(Clone, Debug)]
pub struct RequestContext(pub Context);

impl RequestContext {
    pub fn context(&self) -> &Context {
        &self.0
    }

    pub fn handle(&self, name: &str) -> SharedHandle {
        from_context(&self.0, name)
    }
}

/// Extracts the request's correlation handle.
///
/// Outside the telemetry middleware this yields a no-op handle, so handlers
/// can always log through it.
pub struct RequestHandle(pub SharedHandle);

impl Deref for RequestHandle {
    type Target = SharedHandle;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for RequestHandle
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let handle = match parts.extensions.get::<RequestContext>() {
            Some(cx) => cx.handle("request"),
            None => share(Handle::noop("request")),
        };
        Ok(Self(handle))
    }
}
