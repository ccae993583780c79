//! IPC server for broker connections.

use std::path::Path;
use std::sync::Arc;

use stash_proto::protocol::StashProtocol;
use stash_rpc::{CounterIdGen, MainLoop};
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::core::BrokerCore;
use crate::service::BrokerService;

/// Runs the broker IPC server on a Unix domain socket until `shutdown`
/// is cancelled.
pub async fn serve(
	socket_path: impl AsRef<Path>,
	core: Arc<BrokerCore>,
	shutdown: CancellationToken,
) -> std::io::Result<()> {
	let path = socket_path.as_ref();
	if path.exists() {
		tokio::fs::remove_file(path).await?;
	}

	let listener = UnixListener::bind(path)?;
	tracing::info!(path = %path.display(), "broker listening");

	loop {
		tokio::select! {
			() = shutdown.cancelled() => {
				tracing::info!("broker shutting down");
				break;
			}
			accepted = listener.accept() => match accepted {
				Ok((stream, _addr)) => {
					tokio::spawn(handle_connection(stream, core.clone()));
				}
				Err(err) => {
					tracing::error!(error = %err, "failed to accept connection");
				}
			}
		}
	}

	Ok(())
}

/// Handles a single accepted connection.
pub(crate) async fn handle_connection(stream: UnixStream, core: Arc<BrokerCore>) {
	let conn = core.open_connection();
	tracing::debug!(?conn, "client connected");

	let (reader, writer) = stream.into_split();
	let (main_loop, _socket) = MainLoop::new(
		|_socket| BrokerService::new(core.clone(), conn),
		StashProtocol::new(),
		CounterIdGen::new(),
	);

	if let Err(err) = main_loop.run(BufReader::new(reader), writer).await {
		tracing::warn!(?conn, error = %err, "client connection error");
	}

	core.close_connection(conn);
	tracing::debug!(?conn, "client disconnected");
}

/// Connects to the broker as a client.
pub async fn connect(socket_path: impl AsRef<Path>) -> std::io::Result<UnixStream> {
	UnixStream::connect(socket_path).await
}

#[cfg(test)]
mod tests {
	use std::io::{Error as IoError, ErrorKind};
	use std::time::Duration;

	use stash_proto::types::{
		ClientId, ErrorCode, Frame, Request, RequestId, RequestPayload, Response, ResponsePayload,
	};
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	use super::*;
	use crate::core::BrokerConfig;

	async fn write_frame(stream: &mut UnixStream, frame: &Frame) -> std::io::Result<()> {
		let buf = postcard::to_allocvec(frame)
			.map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))?;
		stream.write_u32_le(buf.len() as u32).await?;
		stream.write_all(&buf).await?;
		stream.flush().await?;
		Ok(())
	}

	async fn read_frame(stream: &mut UnixStream) -> std::io::Result<Frame> {
		let len = stream.read_u32_le().await?;
		let mut buf = vec![0u8; len as usize];
		stream.read_exact(&mut buf).await?;
		postcard::from_bytes(&buf).map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))
	}

	async fn roundtrip(
		stream: &mut UnixStream,
		id: u64,
		payload: RequestPayload,
	) -> Response {
		write_frame(
			stream,
			&Frame::Request(Request {
				id: RequestId(id),
				payload,
			}),
		)
		.await
		.unwrap();
		let frame = read_frame(stream).await.unwrap();
		let Frame::Response(resp) = frame else {
			panic!("expected response frame");
		};
		assert_eq!(resp.request_id, RequestId(id));
		resp
	}

	fn test_core() -> Arc<BrokerCore> {
		let dir = std::env::temp_dir().join("stash-ipc-tests");
		BrokerCore::new_with_config(BrokerConfig {
			socket_path: dir.join("stash-broker.sock"),
			rpc_timeout: Duration::from_millis(200),
		})
	}

	#[tokio::test]
	async fn set_get_roundtrip() {
		let core = test_core();
		let (mut client, server) = UnixStream::pair().unwrap();
		let server_task = tokio::spawn(handle_connection(server, core));

		let resp = roundtrip(
			&mut client,
			1,
			RequestPayload::Set {
				path: "/a/b".to_string(),
				value: b"1".to_vec(),
			},
		)
		.await;
		assert!(matches!(resp.payload, Some(ResponsePayload::Ok)));

		let resp = roundtrip(
			&mut client,
			2,
			RequestPayload::Get {
				path: "/a/b".to_string(),
			},
		)
		.await;
		let Some(ResponsePayload::Value { value }) = resp.payload else {
			panic!("expected value payload");
		};
		assert_eq!(value, b"1");

		drop(client);
		server_task.await.expect("server task panicked");
	}

	#[tokio::test]
	async fn get_of_an_absent_path_is_empty() {
		let core = test_core();
		let (mut client, server) = UnixStream::pair().unwrap();
		let server_task = tokio::spawn(handle_connection(server, core));

		let resp = roundtrip(
			&mut client,
			1,
			RequestPayload::Get {
				path: "/missing".to_string(),
			},
		)
		.await;
		let Some(ResponsePayload::Value { value }) = resp.payload else {
			panic!("expected value payload");
		};
		assert!(value.is_empty());

		drop(client);
		server_task.await.expect("server task panicked");
	}

	#[tokio::test]
	async fn search_lists_children() {
		let core = test_core();
		let (mut client, server) = UnixStream::pair().unwrap();
		let server_task = tokio::spawn(handle_connection(server, core));

		for (id, path) in [(1, "/a/b"), (2, "/a/c")] {
			let resp = roundtrip(
				&mut client,
				id,
				RequestPayload::Set {
					path: path.to_string(),
					value: b"x".to_vec(),
				},
			)
			.await;
			assert!(matches!(resp.payload, Some(ResponsePayload::Ok)));
		}

		let resp = roundtrip(
			&mut client,
			3,
			RequestPayload::Search {
				path: "/a/".to_string(),
			},
		)
		.await;
		let Some(ResponsePayload::Paths { mut paths }) = resp.payload else {
			panic!("expected paths payload");
		};
		paths.sort();
		assert_eq!(paths, vec!["/a/b".to_string(), "/a/c".to_string()]);

		drop(client);
		server_task.await.expect("server task panicked");
	}

	#[tokio::test]
	async fn invalid_path_is_rejected() {
		let core = test_core();
		let (mut client, server) = UnixStream::pair().unwrap();
		let server_task = tokio::spawn(handle_connection(server, core));

		let resp = roundtrip(
			&mut client,
			1,
			RequestPayload::Set {
				path: "no/leading/slash".to_string(),
				value: b"x".to_vec(),
			},
		)
		.await;
		assert_eq!(resp.error, Some(ErrorCode::InvalidPath));

		drop(client);
		server_task.await.expect("server task panicked");
	}

	#[tokio::test]
	async fn disconnect_drops_the_connections_subscriptions() {
		let core = test_core();
		let (mut client, server) = UnixStream::pair().unwrap();
		let server_task = tokio::spawn(handle_connection(server, core.clone()));

		let resp = roundtrip(
			&mut client,
			1,
			RequestPayload::Watch {
				path: "/a/*".to_string(),
				id: ClientId(42),
				cb: 1,
				token: 0,
			},
		)
		.await;
		assert!(matches!(resp.payload, Some(ResponsePayload::Ok)));
		assert_eq!(core.lock_watchers_for_test().len(), 1);

		drop(client);
		server_task.await.expect("server task panicked");
		assert!(core.lock_watchers_for_test().is_empty());
	}

	#[tokio::test]
	async fn callback_invocations_are_not_served_by_the_broker() {
		let core = test_core();
		let (mut client, server) = UnixStream::pair().unwrap();
		let server_task = tokio::spawn(handle_connection(server, core));

		let resp = roundtrip(
			&mut client,
			1,
			RequestPayload::WatchInvoke {
				path: "/a".to_string(),
				cb: 1,
				token: 0,
				value: Vec::new(),
			},
		)
		.await;
		assert_eq!(resp.error, Some(ErrorCode::UnexpectedRequest));

		drop(client);
		server_task.await.expect("server task panicked");
	}
}
