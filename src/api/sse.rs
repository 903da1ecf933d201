//! Incremental decoder for `text/event-stream` bodies.
//!
//! Only the `event` and `data` fields matter to the dashboard; `id`, `retry` and comment lines
//! are skipped. Input arrives in arbitrary byte chunks, so partial lines (including partial
//! UTF-8 sequences) are buffered until their newline arrives, up to `MAX_LINE_BYTES`.

use super::types::ApiError;

/// Longest line the decoder will buffer while waiting for its newline
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
	pub event: Option<String>,
	pub data: String,
}

#[derive(Debug)]
pub struct SseDecoder {
	pending: Vec<u8>,
	event: Option<String>,
	data: Vec<String>,
	max_line: usize,
}

impl SseDecoder {
	pub fn new() -> Self {
		Self::with_max_line(MAX_LINE_BYTES)
	}

	pub fn with_max_line(max_line: usize) -> Self {
		Self {
			pending: Vec::new(),
			event: None,
			data: Vec::new(),
			max_line,
		}
	}

	/// Feed a chunk of the body, returning every frame completed by it.
	///
	/// Fails once an unterminated line grows past the limit; the stream is unusable after that.
	pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, ApiError> {
		self.pending.extend_from_slice(chunk);

		let mut frames = Vec::new();
		while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
			let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
			line.pop();
			if line.last() == Some(&b'\r') {
				line.pop();
			}
			let line = String::from_utf8_lossy(&line);
			if let Some(frame) = self.process_line(&line) {
				frames.push(frame);
			}
		}

		if self.pending.len() > self.max_line {
			let length = self.pending.len();
			self.pending.clear();
			return Err(ApiError::LineTooLong {
				length,
				limit: self.max_line,
			});
		}
		Ok(frames)
	}

	fn process_line(&mut self, line: &str) -> Option<SseFrame> {
		if line.is_empty() {
			return self.dispatch();
		}
		if line.starts_with(':') {
			return None;
		}

		let (field, value) = match line.split_once(':') {
			Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
			None => (line, ""),
		};
		match field {
			"event" => self.event = Some(value.to_string()),
			"data" => self.data.push(value.to_string()),
			_ => {}
		}
		None
	}

	fn dispatch(&mut self) -> Option<SseFrame> {
		let event = self.event.take().filter(|name| !name.is_empty());
		if self.data.is_empty() {
			return None;
		}
		let data = std::mem::take(&mut self.data).join("\n");
		Some(SseFrame { event, data })
	}
}
