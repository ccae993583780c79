//! Service adapters for the main loop.

use std::future::{Future, Ready, ready};
use std::marker::PhantomData;
use std::task::{Context, Poll};

use tower_service::Service;

/// Wraps an async function as a [`Service`].
pub fn service_fn<F>(f: F) -> ServiceFn<F> {
	ServiceFn { f }
}

/// A [`Service`] implemented by a closure returning a future.
#[derive(Debug, Clone)]
pub struct ServiceFn<F> {
	f: F,
}

impl<F, Req, Fut, T, E> Service<Req> for ServiceFn<F>
where
	F: FnMut(Req) -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	type Response = T;
	type Error = E;
	type Future = Fut;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), E>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: Req) -> Fut {
		(self.f)(req)
	}
}

/// A [`Service`] for connections that never expect inbound requests.
///
/// Every request is answered with the configured error.
#[derive(Debug, Clone)]
pub struct Reject<T, E> {
	error: E,
	_response: PhantomData<fn() -> T>,
}

impl<T, E> Reject<T, E> {
	/// Creates a service that answers every request with `error`.
	#[must_use]
	pub fn new(error: E) -> Self {
		Self {
			error,
			_response: PhantomData,
		}
	}
}

impl<Req, T, E: Clone> Service<Req> for Reject<T, E> {
	type Response = T;
	type Error = E;
	type Future = Ready<Result<T, E>>;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), E>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, _req: Req) -> Self::Future {
		ready(Err(self.error.clone()))
	}
}
