//! Stash protocol implementation using stash_rpc.

use std::io::{Error as IoError, ErrorKind};

use stash_rpc::{CounterIdGen, Inbound, Protocol};
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::{ErrorCode, Frame, Request, RequestId, Response, ResponsePayload};

/// Upper bound on a single frame.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Stash protocol implementation using length-delimited postcard encoding.
///
/// Frames are a 4-byte little-endian length followed by the postcard
/// encoding of a [`Frame`].
#[derive(Debug, Clone, Default)]
pub struct StashProtocol;

impl StashProtocol {
	/// Creates a new protocol instance.
	#[must_use]
	pub const fn new() -> Self {
		Self
	}
}

impl Protocol for StashProtocol {
	type Id = RequestId;
	type Message = Frame;
	type Request = Request;
	type Response = Response;
	type ReqResult = ResponsePayload;
	type ReqError = ErrorCode;
	type IdGen = CounterIdGen;

	fn next_id(id_gen: &mut Self::IdGen) -> Self::Id {
		RequestId(id_gen.next())
	}

	async fn read_message(
		&self,
		input: &mut (impl AsyncBufRead + Unpin + Send),
	) -> std::io::Result<Self::Message> {
		let mut len_bytes = [0u8; 4];
		input.read_exact(&mut len_bytes).await?;
		let len = u32::from_le_bytes(len_bytes) as usize;

		if len > MAX_FRAME_LEN {
			return Err(IoError::new(
				ErrorKind::InvalidData,
				format!("message too large: {len} bytes"),
			));
		}

		let mut buf = vec![0u8; len];
		input.read_exact(&mut buf).await?;

		postcard::from_bytes(&buf).map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))
	}

	async fn write_message(
		&self,
		output: &mut (impl AsyncWrite + Unpin + Send),
		msg: &Self::Message,
	) -> std::io::Result<()> {
		let buf = postcard::to_allocvec(msg)
			.map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))?;

		if buf.len() > MAX_FRAME_LEN {
			return Err(IoError::new(
				ErrorKind::InvalidData,
				format!("message too large: {} bytes", buf.len()),
			));
		}

		let len_bytes = (buf.len() as u32).to_le_bytes();
		output.write_all(&len_bytes).await?;
		output.write_all(&buf).await?;
		output.flush().await?;

		Ok(())
	}

	fn split_inbound(msg: Self::Message) -> Inbound<Self::Request, Self::Response> {
		match msg {
			Frame::Request(req) => Inbound::Request(req),
			Frame::Response(resp) => Inbound::Response(resp),
		}
	}

	fn request_id(req: &Self::Request) -> Self::Id {
		req.id
	}

	fn set_request_id(req: &mut Self::Request, id: Self::Id) {
		req.id = id;
	}

	fn response_id(resp: &Self::Response) -> Self::Id {
		resp.request_id
	}

	fn split_response(resp: Self::Response) -> Result<Self::ReqResult, Self::ReqError> {
		match (resp.payload, resp.error) {
			(Some(payload), _) => Ok(payload),
			(None, Some(error)) => Err(error),
			(None, None) => Err(ErrorCode::Internal),
		}
	}

	fn wrap_request(req: Self::Request) -> Self::Message {
		Frame::Request(req)
	}

	fn wrap_response(resp: Self::Response) -> Self::Message {
		Frame::Response(resp)
	}

	fn response_ok(id: Self::Id, result: Self::ReqResult) -> Self::Response {
		Response {
			request_id: id,
			payload: Some(result),
			error: None,
		}
	}

	fn response_err(id: Self::Id, error: Self::ReqError) -> Self::Response {
		Response {
			request_id: id,
			payload: None,
			error: Some(error),
		}
	}

	fn is_disconnect(err: &IoError) -> bool {
		matches!(
			err.kind(),
			ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
		)
	}
}
