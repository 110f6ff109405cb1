//! Wire formats handled by the bridge
//!
//! Inbound events arrive from the broker as JSON objects, outbound
//! envelopes go to session transports, and membership records are the
//! list elements kept in the shared membership store.

use std::io;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::Value;

use crate::error::DecodeError;

/// Event published to the exchange for one connection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InboundEvent {
	/// Target connection id
	pub uid: String,
	/// Room the connection joined
	pub room: String,
	/// Host that registered the membership
	pub host: String,
	/// Payload forwarded to the subscriber
	pub data: Value,
}

impl InboundEvent {
	/// Decode a raw broker payload
	pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
		Ok(serde_json::from_slice(payload)?)
	}

	/// Envelope delivered to the subscriber; host and room are not forwarded
	pub fn into_envelope(self) -> OutboundEnvelope {
		OutboundEnvelope { data: self.data }
	}

	/// Membership element this event refers to
	pub fn member_record(&self) -> MemberRecord<'_> {
		MemberRecord {
			id: &self.uid,
			host: &self.host,
		}
	}
}

/// Payload handed to a session transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEnvelope {
	/// Opaque data from the inbound event
	pub data: Value,
}

impl OutboundEnvelope {
	/// Compact JSON encoding
	pub fn encode(&self) -> ArcStr {
		// Serializing a `Value` into a String cannot fail.
		let json = serde_json::to_string(self).unwrap_or_default();
		ArcStr::from(json)
	}
}

/// Element of the membership list stored under a room key
///
/// Field order is part of the format: `id` first, then `host`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemberRecord<'a> {
	/// Connection id
	pub id: &'a str,
	/// Host holding the connection
	pub host: &'a str,
}

impl MemberRecord<'_> {
	/// Serialize exactly like the writer of the membership list
	///
	/// List removal compares elements byte for byte, so separators are
	/// `", "` and `": "` and non-ASCII characters are `\uXXXX` escaped.
	pub fn encode(&self) -> String {
		let mut out =
			Vec::with_capacity(32 + self.id.len() + self.host.len());
		let mut ser = serde_json::Serializer::with_formatter(
			&mut out,
			SpacedAsciiFormatter,
		);
		if self.serialize(&mut ser).is_err() {
			return String::new();
		}
		// The formatter only ever emits ASCII.
		String::from_utf8(out).unwrap_or_default()
	}
}

/// Escaped like non-ASCII characters, matching `ensure_ascii` writers
const DEL: u8 = 0x7f;

/// JSON formatter with `", "`/`": "` separators and ASCII-only output
struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
	fn begin_array_value<W>(
		&mut self,
		writer: &mut W,
		first: bool,
	) -> io::Result<()>
	where
		W: ?Sized + io::Write,
	{
		if first {
			return Ok(());
		}
		writer.write_all(b", ")
	}

	fn begin_object_key<W>(
		&mut self,
		writer: &mut W,
		first: bool,
	) -> io::Result<()>
	where
		W: ?Sized + io::Write,
	{
		if first {
			return Ok(());
		}
		writer.write_all(b", ")
	}

	fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
	where W: ?Sized + io::Write {
		writer.write_all(b": ")
	}

	fn write_string_fragment<W>(
		&mut self,
		writer: &mut W,
		fragment: &str,
	) -> io::Result<()>
	where
		W: ?Sized + io::Write,
	{
		if fragment.bytes().all(|b| b.is_ascii() && b != DEL) {
			return writer.write_all(fragment.as_bytes());
		}
		let mut units = [0u16; 2];
		for ch in fragment.chars() {
			if ch.is_ascii() && ch as u8 != DEL {
				writer.write_all(&[ch as u8])?;
			} else {
				for unit in ch.encode_utf16(&mut units) {
					write!(writer, "\\u{unit:04x}")?;
				}
			}
		}
		Ok(())
	}
}
