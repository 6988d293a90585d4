//! ---
//! rhome_section: "02-messaging"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Line protocol codec, message variants and queues."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
//! Field-level helpers for the comma-delimited wire format.
//!
//! Fields are split on a literal `,`; there is no quoting or escaping.
use crate::refnum::RefNum;
use crate::types::{Endpoint, Header};

/// Separator between wire fields.
pub const FIELD_SEPARATOR: char = ',';

/// Number of header fields preceding any payload.
pub const HEADER_FIELDS: usize = 6;

const REF_INDEX: usize = 0;
const DEST_ADDR_INDEX: usize = 1;
const DEST_PORT_INDEX: usize = 2;
const SOURCE_ADDR_INDEX: usize = 3;
const SOURCE_PORT_INDEX: usize = 4;
const TYPE_INDEX: usize = 5;

/// Reasons a raw line cannot be decoded into a message variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer than [`HEADER_FIELDS`] fields were present.
    #[error("malformed header: expected at least 6 fields, found {found}")]
    MalformedHeader {
        /// Number of fields actually present.
        found: usize,
    },
    /// Field 5 carries a different tag than the variant expects.
    #[error("type mismatch: expected tag `{expected}`, found `{found}`")]
    TypeMismatch {
        /// Tag configured for the variant.
        expected: String,
        /// Tag found on the line.
        found: String,
    },
    /// A payload field required by the variant is absent or blank.
    #[error("missing payload field `{field}` at index {index}")]
    MissingPayloadField {
        /// Payload field name.
        field: &'static str,
        /// Wire index of the field.
        index: usize,
    },
    /// A field is present but its value cannot be interpreted.
    #[error("invalid value `{value}` for field `{field}`")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Check that `value` can travel as a single field.
///
/// Commas would split it and line terminators would end the frame, so either
/// makes `parse(encode(m))` differ from `m`.
pub fn ensure_wire_safe(field: &'static str, value: &str) -> Result<(), DecodeError> {
    if value.contains([FIELD_SEPARATOR, '\r', '\n']) {
        return Err(DecodeError::InvalidField {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}

/// Read the wire tag (field 5) without decoding the rest of the line.
pub fn peek_type_tag(line: &str) -> Result<&str, DecodeError> {
    Fields::split(line).map(|fields| fields.get(TYPE_INDEX))
}

/// Read the destination endpoint (fields 1 and 2) of an encoded line.
pub fn peek_destination(line: &str) -> Result<Endpoint, DecodeError> {
    Fields::split(line).map(|fields| fields.endpoint(DEST_ADDR_INDEX, DEST_PORT_INDEX))
}

/// Borrowed view over the fields of one line.
#[derive(Debug)]
pub(crate) struct Fields<'a> {
    fields: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    /// Split a line, tolerating trailing line terminators left by framing.
    pub(crate) fn split(line: &'a str) -> Result<Self, DecodeError> {
        let fields: Vec<&str> = line
            .trim_end_matches(['\r', '\n'])
            .split(FIELD_SEPARATOR)
            .collect();
        if fields.len() < HEADER_FIELDS {
            return Err(DecodeError::MalformedHeader {
                found: fields.len(),
            });
        }
        Ok(Self { fields })
    }

    fn get(&self, index: usize) -> &'a str {
        self.fields.get(index).copied().unwrap_or_default()
    }

    fn endpoint(&self, addr: usize, port: usize) -> Endpoint {
        Endpoint::new(self.get(addr), self.get(port))
    }

    fn checked_endpoint(
        &self,
        addr: usize,
        port: usize,
        names: (&'static str, &'static str),
    ) -> Result<Endpoint, DecodeError> {
        ensure_wire_safe(names.0, self.get(addr))?;
        ensure_wire_safe(names.1, self.get(port))?;
        Ok(self.endpoint(addr, port))
    }

    /// Decode the shared header, checking field 5 against `expected_tag`.
    pub(crate) fn header(&self, expected_tag: &str) -> Result<Header, DecodeError> {
        let found = self.get(TYPE_INDEX);
        if found != expected_tag {
            return Err(DecodeError::TypeMismatch {
                expected: expected_tag.to_owned(),
                found: found.to_owned(),
            });
        }

        let raw_ref = self.get(REF_INDEX).trim();
        let ref_num = if raw_ref.is_empty() {
            None
        } else {
            Some(
                raw_ref
                    .parse::<RefNum>()
                    .map_err(|_| DecodeError::InvalidField {
                        field: "ref",
                        value: raw_ref.to_owned(),
                    })?,
            )
        };

        Ok(Header {
            ref_num,
            dest: self.checked_endpoint(
                DEST_ADDR_INDEX,
                DEST_PORT_INDEX,
                ("dest_addr", "dest_port"),
            )?,
            source: self.checked_endpoint(
                SOURCE_ADDR_INDEX,
                SOURCE_PORT_INDEX,
                ("source_addr", "source_port"),
            )?,
            msg_type: found.to_owned(),
        })
    }

    /// Payload field `offset` positions after the header; blank counts as missing.
    pub(crate) fn payload(
        &self,
        offset: usize,
        field: &'static str,
    ) -> Result<&'a str, DecodeError> {
        let index = HEADER_FIELDS + offset;
        match self.fields.get(index) {
            Some(value) if !value.is_empty() => {
                ensure_wire_safe(field, value)?;
                Ok(*value)
            }
            _ => Err(DecodeError::MissingPayloadField { field, index }),
        }
    }
}

/// Render a header followed by payload fields.
pub(crate) fn join(header: &Header, payload: &[&str]) -> String {
    let ref_num = header
        .ref_num
        .map(|value| value.to_string())
        .unwrap_or_default();
    let mut parts: Vec<&str> = Vec::with_capacity(HEADER_FIELDS + payload.len());
    parts.extend([
        ref_num.as_str(),
        header.dest.addr.as_str(),
        header.dest.port.as_str(),
        header.source.addr.as_str(),
        header.source.port.as_str(),
        header.msg_type.as_str(),
    ]);
    parts.extend_from_slice(payload);
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_reads_tag_without_full_decode() {
        assert_eq!(peek_type_tag(",,,192.168.1.5,9000,1,bedroom_lamp"), Ok("1"));
        assert_eq!(peek_type_tag("7,a,b,c,d,600\n"), Ok("600"));
    }

    #[test]
    fn short_lines_are_malformed() {
        assert_eq!(
            peek_type_tag("1,2,3,4,5"),
            Err(DecodeError::MalformedHeader { found: 5 })
        );
        assert_eq!(
            peek_type_tag(""),
            Err(DecodeError::MalformedHeader { found: 1 })
        );
    }

    #[test]
    fn destination_comes_from_fields_one_and_two() {
        let dest = peek_destination("101,10.0.0.9,27001,10.0.0.2,27003,601").expect("valid");
        assert_eq!(dest, Endpoint::new("10.0.0.9", "27001"));
    }

    #[test]
    fn header_rejects_non_numeric_reference() {
        let fields = Fields::split("x1,a,b,c,d,600").expect("six fields");
        assert_eq!(
            fields.header("600"),
            Err(DecodeError::InvalidField {
                field: "ref",
                value: "x1".into(),
            })
        );
    }

    #[test]
    fn embedded_carriage_return_is_rejected() {
        let fields = Fields::split("1,a\rb,c,d,e,1,lamp\rtwo\r\n").expect("seven fields");
        assert_eq!(
            fields.header("1"),
            Err(DecodeError::InvalidField {
                field: "dest_addr",
                value: "a\rb".into(),
            })
        );
        assert_eq!(
            fields.payload(0, "device"),
            Err(DecodeError::InvalidField {
                field: "device",
                value: "lamp\rtwo".into(),
            })
        );
    }

    #[test]
    fn wire_safe_check_names_the_field() {
        assert_eq!(ensure_wire_safe("device", "porch_light"), Ok(()));
        assert_eq!(ensure_wire_safe("device", ""), Ok(()));
        for bad in ["a,b", "lamp\n", "lamp\r"] {
            assert_eq!(
                ensure_wire_safe("device", bad),
                Err(DecodeError::InvalidField {
                    field: "device",
                    value: bad.into(),
                })
            );
        }
    }

    #[test]
    fn blank_payload_is_missing() {
        let fields = Fields::split("1,a,b,c,d,1,").expect("seven fields");
        assert_eq!(
            fields.payload(0, "device"),
            Err(DecodeError::MissingPayloadField {
                field: "device",
                index: 6,
            })
        );
    }
}
