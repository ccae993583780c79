//! The per-connection event loop.

use std::collections::HashMap;

use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tower_service::Service;

use crate::socket::{MainLoopEvent, PeerSocket};
use crate::{Inbound, Protocol, RpcError};

/// Drives one transport: serves inbound requests, matches inbound
/// responses to pending outbound calls, and writes everything its
/// [`PeerSocket`] handles enqueue.
pub struct MainLoop<P: Protocol, S> {
	protocol: P,
	id_gen: P::IdGen,
	service: S,
	tx: mpsc::UnboundedSender<MainLoopEvent<P>>,
	rx: mpsc::UnboundedReceiver<MainLoopEvent<P>>,
	pending: HashMap<P::Id, oneshot::Sender<Result<P::ReqResult, RpcError<P::ReqError>>>>,
}

impl<P, S> MainLoop<P, S>
where
	P: Protocol,
	S: Service<P::Request, Response = P::ReqResult, Error = P::ReqError>,
	S::Future: Send + 'static,
{
	/// Creates a loop and the socket connected to it.
	///
	/// `make_service` receives the socket so the service can issue calls
	/// back through its own connection.
	pub fn new(
		make_service: impl FnOnce(PeerSocket<P>) -> S,
		protocol: P,
		id_gen: P::IdGen,
	) -> (Self, PeerSocket<P>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let socket = PeerSocket::from_sender(tx.clone());
		let service = make_service(socket.clone());
		let main_loop = Self {
			protocol,
			id_gen,
			service,
			tx,
			rx,
			pending: HashMap::new(),
		};
		(main_loop, socket)
	}

	/// Runs until the peer disconnects, the socket is closed, or the
	/// transport fails. Must be called from within a tokio runtime.
	///
	/// Pending outbound calls are failed with
	/// [`RpcError::Closed`](crate::RpcError) when the loop exits.
	pub async fn run(
		mut self,
		reader: impl AsyncBufRead + Unpin + Send + 'static,
		writer: impl AsyncWrite + Unpin + Send,
	) -> std::io::Result<()> {
		let read_protocol = self.protocol.clone();
		let read_tx = self.tx.clone();
		let reader_task = tokio::spawn(async move {
			let mut reader = reader;
			loop {
				match read_protocol.read_message(&mut reader).await {
					Ok(msg) => {
						if read_tx.send(MainLoopEvent::Incoming(msg)).is_err() {
							break;
						}
					}
					Err(err) => {
						let fatal = (!P::is_disconnect(&err)).then_some(err);
						let _ = read_tx.send(MainLoopEvent::Disconnected(fatal));
						break;
					}
				}
			}
		});

		let mut writer = writer;
		let result = loop {
			let Some(event) = self.rx.recv().await else {
				break Ok(());
			};
			match event {
				MainLoopEvent::Incoming(msg) => self.dispatch(msg),
				MainLoopEvent::Outgoing(msg) => {
					if let Err(err) = self.protocol.write_message(&mut writer, &msg).await {
						break Err(err);
					}
				}
				MainLoopEvent::Request(mut req, reply) => {
					let id = P::next_id(&mut self.id_gen);
					P::set_request_id(&mut req, id);
					let msg = P::wrap_request(req);
					match self.protocol.write_message(&mut writer, &msg).await {
						// Dropping `reply` on failure resolves the caller
						// with `RpcError::Closed`.
						Ok(()) => {
							self.pending.insert(id, reply);
						}
						Err(err) => break Err(err),
					}
				}
				MainLoopEvent::Disconnected(None) | MainLoopEvent::Quit => break Ok(()),
				MainLoopEvent::Disconnected(Some(err)) => break Err(err),
			}
		};
		reader_task.abort();
		result
	}

	fn dispatch(&mut self, msg: P::Message) {
		match P::split_inbound(msg) {
			Inbound::Request(req) => {
				let id = P::request_id(&req);
				let fut = self.service.call(req);
				let tx = self.tx.clone();
				tokio::spawn(async move {
					let resp = match fut.await {
						Ok(result) => P::response_ok(id, result),
						Err(err) => P::response_err(id, err),
					};
					let _ = tx.send(MainLoopEvent::Outgoing(P::wrap_response(resp)));
				});
			}
			Inbound::Response(resp) => {
				let id = P::response_id(&resp);
				let Some(reply) = self.pending.remove(&id) else {
					tracing::debug!(?id, "response without a pending request");
					return;
				};
				let _ = reply.send(P::split_response(resp).map_err(RpcError::Remote));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::{Error as IoError, ErrorKind};

	use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

	use super::*;
	use crate::{CounterIdGen, Reject, service_fn};

	/// Frames are `[kind u8][id u64][value u64]`; kind 0 is a request,
	/// kind 1 a response. The test service answers `value + 1`.
	#[derive(Debug, Clone)]
	struct TestProtocol;

	#[derive(Debug)]
	struct TestFrame {
		kind: u8,
		id: u64,
		value: u64,
	}

	impl Protocol for TestProtocol {
		type Id = u64;
		type Message = TestFrame;
		type Request = TestFrame;
		type Response = TestFrame;
		type ReqResult = u64;
		type ReqError = u64;
		type IdGen = CounterIdGen;

		fn next_id(id_gen: &mut Self::IdGen) -> Self::Id {
			id_gen.next()
		}

		async fn read_message(
			&self,
			input: &mut (impl tokio::io::AsyncBufRead + Unpin + Send),
		) -> std::io::Result<Self::Message> {
			let kind = input.read_u8().await?;
			let id = input.read_u64().await?;
			let value = input.read_u64().await?;
			Ok(TestFrame { kind, id, value })
		}

		async fn write_message(
			&self,
			output: &mut (impl tokio::io::AsyncWrite + Unpin + Send),
			msg: &Self::Message,
		) -> std::io::Result<()> {
			output.write_u8(msg.kind).await?;
			output.write_u64(msg.id).await?;
			output.write_u64(msg.value).await?;
			output.flush().await
		}

		fn split_inbound(msg: Self::Message) -> Inbound<Self::Request, Self::Response> {
			if msg.kind == 0 {
				Inbound::Request(msg)
			} else {
				Inbound::Response(msg)
			}
		}

		fn request_id(req: &Self::Request) -> Self::Id {
			req.id
		}

		fn set_request_id(req: &mut Self::Request, id: Self::Id) {
			req.id = id;
		}

		fn response_id(resp: &Self::Response) -> Self::Id {
			resp.id
		}

		fn split_response(resp: Self::Response) -> Result<Self::ReqResult, Self::ReqError> {
			Ok(resp.value)
		}

		fn wrap_request(req: Self::Request) -> Self::Message {
			req
		}

		fn wrap_response(resp: Self::Response) -> Self::Message {
			resp
		}

		fn response_ok(id: Self::Id, result: Self::ReqResult) -> Self::Response {
			TestFrame {
				kind: 1,
				id,
				value: result,
			}
		}

		fn response_err(id: Self::Id, error: Self::ReqError) -> Self::Response {
			TestFrame {
				kind: 1,
				id,
				value: error,
			}
		}

		fn is_disconnect(err: &IoError) -> bool {
			matches!(
				err.kind(),
				ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
			)
		}
	}

	fn request(value: u64) -> TestFrame {
		TestFrame { kind: 0, id: 0, value }
	}

	#[tokio::test]
	async fn request_resolves_with_service_result() {
		let (client_io, server_io) = tokio::io::duplex(256);
		let (client_read, client_write) = tokio::io::split(client_io);
		let (server_read, server_write) = tokio::io::split(server_io);

		let (server_loop, _server_socket) = MainLoop::new(
			|_socket| service_fn(|req: TestFrame| async move { Ok::<_, u64>(req.value + 1) }),
			TestProtocol,
			CounterIdGen::new(),
		);
		let server = tokio::spawn(server_loop.run(BufReader::new(server_read), server_write));

		let (client_loop, client_socket) = MainLoop::new(
			|_socket| Reject::<u64, u64>::new(0),
			TestProtocol,
			CounterIdGen::new(),
		);
		tokio::spawn(client_loop.run(BufReader::new(client_read), client_write));

		assert_eq!(client_socket.request(request(41)).await.unwrap(), 42);
		assert_eq!(client_socket.request(request(7)).await.unwrap(), 8);

		client_socket.close();
		drop(client_socket);
		server.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn concurrent_requests_are_correlated() {
		let (client_io, server_io) = tokio::io::duplex(256);
		let (client_read, client_write) = tokio::io::split(client_io);
		let (server_read, server_write) = tokio::io::split(server_io);

		let (server_loop, _server_socket) = MainLoop::new(
			|_socket| {
				service_fn(|req: TestFrame| async move {
					// Later requests finish first.
					tokio::time::sleep(std::time::Duration::from_millis(50 - req.value)).await;
					Ok::<_, u64>(req.value * 10)
				})
			},
			TestProtocol,
			CounterIdGen::new(),
		);
		tokio::spawn(server_loop.run(BufReader::new(server_read), server_write));

		let (client_loop, client_socket) = MainLoop::new(
			|_socket| Reject::<u64, u64>::new(0),
			TestProtocol,
			CounterIdGen::new(),
		);
		tokio::spawn(client_loop.run(BufReader::new(client_read), client_write));

		let slow = client_socket.request(request(10));
		let fast = client_socket.request(request(40));
		let (slow, fast) = tokio::join!(slow, fast);
		assert_eq!(slow.unwrap(), 100);
		assert_eq!(fast.unwrap(), 400);
	}

	#[tokio::test]
	async fn disconnect_fails_pending_requests() {
		let (client_io, server_io) = tokio::io::duplex(256);
		let (client_read, client_write) = tokio::io::split(client_io);

		let (client_loop, client_socket) = MainLoop::new(
			|_socket| Reject::<u64, u64>::new(0),
			TestProtocol,
			CounterIdGen::new(),
		);
		let client = tokio::spawn(client_loop.run(BufReader::new(client_read), client_write));

		let call = client_socket.request(request(1));
		drop(server_io);
		assert!(matches!(call.await, Err(RpcError::Closed)));
		// The loop may report either a clean disconnect or a broken pipe
		// depending on whether the write raced the drop.
		let _ = client.await.unwrap();
	}
}
