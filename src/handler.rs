//! Handler traits and type erasure.
//!
//! # How async handlers are stored
//!
//! The route table holds handlers of *different* concrete types, so each one
//! is hidden behind a trait object and stored uniformly:
//!
//! ```text
//! async fn get(req: Request) -> Response { … }     ← app writes this
//!        ↓ Route::new("get", get)
//! get.into_boxed_handler()                         ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get))                         ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time               ← one vtable dispatch
//! ```
//!
//! Streaming routes follow the same path through [`StreamHandler`], resolving
//! to an [`EventStream`] instead of a [`Response`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::sse::EventStream;

// ── Erased forms ─────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` lets tokio move it across worker threads.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<Response>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

#[doc(hidden)]
pub trait ErasedStreamHandler {
    fn call(&self, req: Request) -> BoxFuture<EventStream>;
}

#[doc(hidden)]
pub type BoxedStreamHandler = Arc<dyn ErasedStreamHandler + Send + Sync + 'static>;

// ── Route handler traits ─────────────────────────────────────────────────────

/// Implemented for every valid unary route handler.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure with the shape:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// The trait is **sealed**, so only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Implemented for every valid streaming route handler:
///
/// ```text
/// async fn name(req: Request) -> EventStream
/// ```
pub trait StreamHandler: Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_stream_handler(self) -> BoxedStreamHandler;
}

// ── Blanket impls over async fns ─────────────────────────────────────────────

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

impl<F, Fut> StreamHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EventStream> + Send + 'static,
{
    fn into_boxed_stream_handler(self) -> BoxedStreamHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Closure adapter ──────────────────────────────────────────────────────────

/// Newtype bridging a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Response> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

impl<F, Fut> ErasedStreamHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = EventStream> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<EventStream> {
        Box::pin((self.0)(req))
    }
}
