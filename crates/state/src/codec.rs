//! Reversible text ⇄ URL-safe string codec.
//!
//! Text is brotli-compressed with fixed parameters and the compressed bytes
//! are written as unpadded URL-safe base64. Decoding accepts padded or
//! unpadded input and returns `None` for anything it cannot fully invert.

use std::io::Write;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// Brotli quality. Fixed so that equal text always yields equal links.
const QUALITY: u32 = 9;
/// Brotli window size (log2).
const LG_WINDOW: u32 = 22;
const BUFFER_SIZE: usize = 4096;

const URL_SAFE: GeneralPurpose = GeneralPurpose::new(
	&alphabet::URL_SAFE,
	GeneralPurposeConfig::new()
		.with_encode_padding(false)
		.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Reason a string failed to decode. Only surfaced in traces.
#[derive(Debug, thiserror::Error)]
enum DecodeError {
	#[error("invalid base64: {0}")]
	Base64(#[from] base64::DecodeError),
	#[error("invalid compressed stream: {0}")]
	Brotli(#[from] std::io::Error),
	#[error("compressed stream ends early")]
	Truncated,
	#[error("{0} bytes after the end of the compressed stream")]
	Trailing(usize),
	#[error("decompressed text is not UTF-8: {0}")]
	Utf8(#[from] std::string::FromUtf8Error),
}

/// Encodes `text` into a URL-safe string.
pub fn encode(text: &str) -> String {
	let mut writer = brotli::CompressorWriter::new(Vec::new(), BUFFER_SIZE, QUALITY, LG_WINDOW);
	writer.write_all(text.as_bytes()).expect("writing into a Vec<u8> cannot fail");
	let compressed = writer.into_inner();
	URL_SAFE.encode(compressed)
}

/// Decodes a string produced by [`encode`].
///
/// Never panics; malformed, truncated or non-UTF-8 input yields `None`.
pub fn decode(encoded: &str) -> Option<String> {
	match try_decode(encoded) {
		Ok(text) => Some(text),
		Err(err) => {
			tracing::debug!(error = %err, len = encoded.len(), "codec.decode_failed");
			None
		}
	}
}

fn try_decode(encoded: &str) -> Result<String, DecodeError> {
	let compressed = URL_SAFE.decode(encoded.trim())?;
	let mut writer = brotli::DecompressorWriter::new(Vec::new(), BUFFER_SIZE);
	// Stops consuming at the end of the final meta-block.
	let consumed = writer.write(&compressed)?;
	if consumed < compressed.len() {
		return Err(DecodeError::Trailing(compressed.len() - consumed));
	}
	let bytes = writer.into_inner().map_err(|_| DecodeError::Truncated)?;
	Ok(String::from_utf8(bytes)?)
}
