//! Newline-delimited JSON transport.
//!
//! [`LineClient`] speaks the protocol to an engine behind a pair of byte
//! streams (typically a child process). [`serve_lines`] is the other end:
//! it exposes any [`EngineProxy`] over a pair of streams.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, broadcast};

use crate::protocol::{EngineMessage, EngineRequest, decode_message, decode_request, encode_frame};
use crate::types::strip_ansi;
use crate::{EngineProxy, Result, TransportError};

const STATUS_BUFFER: usize = 64;

struct LineIo<R, W> {
	reader: R,
	writer: W,
	buf: String,
	/// Set while an exchange is in progress. Still set when a new call
	/// starts means the previous exchange was abandoned midway.
	busy: bool,
	/// Set once the engine hung up or the stream failed; later calls fail
	/// with [`TransportError::Closed`].
	closed: bool,
	/// Kept so the child is killed when the client goes away.
	_child: Option<Child>,
}

/// Engine proxy over a line-oriented byte stream.
///
/// Calls are serialized: one request is written, then lines are read until
/// its terminal response. `notify` frames read along the way are forwarded
/// to status subscribers.
pub struct LineClient<R, W> {
	io: Mutex<LineIo<R, W>>,
	status: broadcast::Sender<String>,
	pid: Option<u32>,
}

/// Line client talking to an engine child process over stdio.
pub type ProcessClient = LineClient<BufReader<ChildStdout>, ChildStdin>;

impl<R, W> LineClient<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	pub fn new(reader: R, writer: W) -> Self {
		Self::with_child(reader, writer, None)
	}

	fn with_child(reader: R, writer: W, child: Option<Child>) -> Self {
		let (status, _) = broadcast::channel(STATUS_BUFFER);
		Self {
			pid: child.as_ref().and_then(Child::id),
			io: Mutex::new(LineIo {
				reader,
				writer,
				buf: String::new(),
				busy: false,
				closed: false,
				_child: child,
			}),
			status,
		}
	}
}

impl<R, W> LineIo<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	/// Writes one request frame and reads until its terminal response.
	async fn exchange(&mut self, op: &'static str, frame: &str, status: &broadcast::Sender<String>) -> Result<EngineMessage> {
		tracing::trace!(op, "engine.request");
		self.writer.write_all(frame.as_bytes()).await?;
		self.writer.flush().await?;

		loop {
			self.buf.clear();
			if self.reader.read_line(&mut self.buf).await? == 0 {
				tracing::debug!(op, "engine.eof");
				return Err(TransportError::Closed);
			}
			if self.buf.trim().is_empty() {
				continue;
			}
			match decode_message(&self.buf)? {
				EngineMessage::Notify { text } => {
					let text = strip_ansi(&text);
					tracing::debug!(status = %text, "engine.status");
					let _ = status.send(text);
				}
				terminal => {
					tracing::trace!(op, kind = terminal.kind(), "engine.response");
					return Ok(terminal);
				}
			}
		}
	}
}

impl ProcessClient {
	/// Starts `command` (program followed by its arguments) with piped stdio.
	///
	/// The child's stderr is inherited. The child is killed when the client
	/// is dropped.
	pub fn spawn(command: &[String]) -> Result<Self> {
		let (program, args) = command.split_first().ok_or(TransportError::EmptyCommand)?;
		let mut child = Command::new(program)
			.args(args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(true)
			.spawn()?;
		let stdin = child.stdin.take().ok_or(TransportError::Closed)?;
		let stdout = child.stdout.take().ok_or(TransportError::Closed)?;
		tracing::info!(program = %program, pid = child.id(), "engine.process_spawn");
		Ok(Self::with_child(BufReader::new(stdout), stdin, Some(child)))
	}
}

impl<R, W> std::fmt::Debug for LineClient<R, W> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LineClient").field("pid", &self.pid).finish_non_exhaustive()
	}
}

#[async_trait]
impl<R, W> EngineProxy for LineClient<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	async fn call(&self, request: EngineRequest) -> Result<EngineMessage> {
		let op = request.op();
		let frame = encode_frame(&request)?;

		let mut io = self.io.lock().await;
		if io.closed {
			return Err(TransportError::Closed);
		}
		if io.busy {
			tracing::warn!(op, "engine.desynchronized");
			return Err(TransportError::Desynchronized);
		}
		io.busy = true;

		let result = io.exchange(op, &frame, &self.status).await;
		match &result {
			Ok(_) => io.busy = false,
			Err(TransportError::Closed | TransportError::Io(_)) => io.closed = true,
			// A malformed frame leaves the rest of the stream unaccounted for.
			Err(_) => {}
		}
		result
	}

	fn subscribe_status(&self) -> broadcast::Receiver<String> {
		self.status.subscribe()
	}
}

/// Serves `engine` over a line-oriented byte stream until `reader` ends.
///
/// Requests are answered one at a time. Status notifications published by
/// the engine are written as `notify` frames ahead of the pending response.
/// Malformed request lines and engine failures are answered with `error`
/// frames; only i/o failures end the loop early.
pub async fn serve_lines<P, R, W>(engine: &P, reader: R, mut writer: W) -> Result<()>
where
	P: EngineProxy + ?Sized,
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let mut status = engine.subscribe_status();
	let mut lines = reader.lines();

	while let Some(line) = lines.next_line().await? {
		if line.trim().is_empty() {
			continue;
		}
		let response = match decode_request(&line) {
			Ok(request) => {
				let op = request.op();
				let call = engine.call(request);
				tokio::pin!(call);
				loop {
					tokio::select! {
						biased;
						Ok(text) = status.recv() => write_frame(&mut writer, &EngineMessage::Notify { text }).await?,
						response = &mut call => {
							break response.unwrap_or_else(|err| {
								tracing::warn!(op, error = %err, "engine.serve_failed");
								EngineMessage::Error { message: err.to_string() }
							});
						}
					}
				}
			}
			Err(err) => {
				tracing::warn!(error = %err, "engine.malformed_request");
				EngineMessage::Error {
					message: format!("malformed request: {err}"),
				}
			}
		};
		write_frame(&mut writer, &response).await?;
	}

	tracing::debug!("engine.serve_eof");
	Ok(())
}

async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<()>
where
	W: AsyncWrite + Unpin,
	T: Serialize,
{
	writer.write_all(encode_frame(frame)?.as_bytes()).await?;
	writer.flush().await?;
	Ok(())
}
