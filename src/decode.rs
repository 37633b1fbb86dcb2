//! Protocol buffer binary payload decoding.
//!
//! The decoder walks the payload against a message definition from a [`Context`] and builds a
//! [`ValueTree`]. Any malformed or unexpected input aborts the whole decode with a
//! [`DecodeError`]. See the example in the [crate root](crate).

use crate::context::*;
use crate::tree::*;
use bytes::Bytes;
use snafu::Snafu;
use std::collections::HashMap;
use std::fmt;

/// Varints longer than this cannot represent a 64-bit value.
const MAX_VARINT_LEN: usize = 10;

/// Wire type of a field key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType
{
    /// Variable length integer, wire type 0.
    Varint,

    /// Eight bytes little endian, wire type 1.
    Fixed64,

    /// Length prefixed payload, wire type 2.
    LengthDelimited,

    /// Deprecated group start, wire type 3.
    StartGroup,

    /// Deprecated group end, wire type 4.
    EndGroup,

    /// Four bytes little endian, wire type 5.
    Fixed32,
}

impl WireType
{
    /// Wire type for the three lowest bits of a key. `None` for 6 and 7.
    pub fn from_tag(tag: u8) -> Option<Self>
    {
        Some(match tag {
            0 => WireType::Varint,
            1 => WireType::Fixed64,
            2 => WireType::LengthDelimited,
            3 => WireType::StartGroup,
            4 => WireType::EndGroup,
            5 => WireType::Fixed32,
            _ => return None,
        })
    }

    /// Numeric value used on the wire.
    pub fn tag(self) -> u8
    {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::LengthDelimited => 2,
            WireType::StartGroup => 3,
            WireType::EndGroup => 4,
            WireType::Fixed32 => 5,
        }
    }
}

impl fmt::Display for WireType
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        let name = match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "64-bit",
            WireType::LengthDelimited => "length-delimited",
            WireType::StartGroup => "start group",
            WireType::EndGroup => "end group",
            WireType::Fixed32 => "32-bit",
        };
        write!(f, "{} ({})", name, self.tag())
    }
}

/// Payload decoding error.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum DecodeError
{
    /// The input ended in the middle of a value.
    #[snafu(display("Input ended while reading {}", reading))]
    TruncatedInput
    {
        /// What was being read.
        reading: &'static str,
    },

    /// A varint did not terminate within ten bytes.
    #[snafu(display("Varint longer than {} bytes while reading {}", MAX_VARINT_LEN, reading))]
    VarintOverflow
    {
        /// What was being read.
        reading: &'static str,
    },

    /// A field key with the field number zero.
    #[snafu(display("Invalid field number {}", number))]
    InvalidFieldNumber
    {
        /// Field number.
        number: u64,
    },

    /// A field key with the wire type 6 or 7.
    #[snafu(display("Invalid wire type {} for field {}", wire_type, number))]
    InvalidWireType
    {
        /// Raw wire type.
        wire_type: u8,

        /// Field number.
        number: u64,
    },

    /// The field number is neither a field nor a known extension of the message.
    #[snafu(display("Unknown field {} in '{}'", number, message))]
    UnknownField
    {
        /// Full name of the message.
        message: String,

        /// Field number.
        number: u64,
    },

    /// The enum has no name for the value.
    #[snafu(display("Unknown value {} for enum '{}'", value, enum_name))]
    UnknownEnumValue
    {
        /// Full name of the enum.
        enum_name: String,

        /// Value on the wire.
        value: i64,
    },

    /// Groups are not supported.
    #[snafu(display("Group encoding is not supported (field {})", number))]
    UnsupportedGroupEncoding
    {
        /// Field number.
        number: u64,
    },

    /// A packed payload ended in the middle of an element.
    #[snafu(display("Packed field '{}' has {} dangling bytes", field, remaining))]
    CorruptPackedField
    {
        /// Field name.
        field: String,

        /// Number of bytes left over after the last complete element.
        remaining: usize,
    },

    /// A message or an enum could not be found in the context.
    #[snafu(display("Type '{}' not found in the context", name))]
    SchemaLookupFailed
    {
        /// Type name, or the name of the field referring to the type.
        name: String,
    },

    /// The wire type on the wire differs from the declared type of the field.
    #[snafu(display(
        "Field '{}' is declared as {} but was encoded as {}",
        field,
        expected,
        actual
    ))]
    WireTypeMismatch
    {
        /// Field name.
        field: String,

        /// Wire type of the declared field type.
        expected: WireType,

        /// Wire type found on the wire.
        actual: WireType,
    },

    /// Two different fields decode to the same entry name.
    #[snafu(display("Entry '{}' in '{}' is used by two fields", name, message))]
    DuplicateName
    {
        /// Full name of the message.
        message: String,

        /// Entry name.
        name: String,
    },

    /// Messages are nested deeper than allowed.
    #[snafu(display("Messages nested deeper than {} levels", limit))]
    RecursionLimitExceeded
    {
        /// The configured limit.
        limit: usize,
    },
}

/// Decoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions
{
    /// Maximum depth of nested messages below the root message.
    pub recursion_limit: usize,
}

impl Default for DecodeOptions
{
    fn default() -> Self
    {
        DecodeOptions {
            recursion_limit: 100,
        }
    }
}

/// Decodes payloads into value trees.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a>
{
    ctx: &'a Context,
    options: DecodeOptions,
}

/// Decodes the buffers as instances of the message `root`.
///
/// The message name is fully qualified, optionally with a leading `.`.
pub fn decode<B: AsRef<[u8]>>(
    buffers: &[B],
    root: &str,
    ctx: &Context,
) -> Result<ValueTree, DecodeError>
{
    let msg = ctx
        .get_message(root)
        .ok_or_else(|| DecodeError::SchemaLookupFailed {
            name: root.to_string(),
        })?;
    Decoder::new(ctx).decode(msg, buffers)
}

impl<'a> Decoder<'a>
{
    /// Create a decoder with the default options.
    pub fn new(ctx: &'a Context) -> Self
    {
        Self::with_options(ctx, DecodeOptions::default())
    }

    /// Create a decoder.
    pub fn with_options(ctx: &'a Context, options: DecodeOptions) -> Self
    {
        Decoder { ctx, options }
    }

    /// Decodes the buffers as instances of `msg`.
    ///
    /// A single buffer becomes the root directory named after the message. Any other number of
    /// buffers is placed under a synthetic root as `Message_1`, `Message_2` and so on.
    pub fn decode<B: AsRef<[u8]>>(
        &self,
        msg: &MessageInfo,
        buffers: &[B],
    ) -> Result<ValueTree, DecodeError>
    {
        log::debug!("Decoding {} buffer(s) as '{}'", buffers.len(), msg.full_name);

        let root = match buffers {
            [single] => self.decode_message(msg, single.as_ref())?,
            _ => {
                let mut root = Directory::new(msg.name.clone(), NodeAttributes::root());
                for (idx, buffer) in buffers.iter().enumerate() {
                    let instance = self.decode_directory(
                        msg,
                        buffer.as_ref(),
                        format!("Message_{}", idx + 1),
                        NodeAttributes::root(),
                        0,
                    )?;
                    insert_child(msg, &mut root, Node::Directory(instance))?;
                }
                root
            }
        };

        Ok(ValueTree::new(root))
    }

    /// Decodes a single message into a directory named after the message.
    pub fn decode_message(&self, msg: &MessageInfo, data: &[u8]) -> Result<Directory, DecodeError>
    {
        self.decode_directory(msg, data, msg.name.clone(), NodeAttributes::root(), 0)
    }

    fn decode_directory(
        &self,
        msg: &MessageInfo,
        data: &[u8],
        name: String,
        attributes: NodeAttributes,
        depth: usize,
    ) -> Result<Directory, DecodeError>
    {
        let mut dir = Directory::new(name, attributes);
        self.decode_into(msg, data, &mut dir, depth)?;
        Ok(dir)
    }

    /// Decodes the fields of `msg` into `dir`.
    ///
    /// Repeated fields already in the directory keep their numbering, so a message seen twice
    /// merges the same way protobuf merges it.
    fn decode_into(
        &self,
        msg: &MessageInfo,
        mut data: &[u8],
        dir: &mut Directory,
        depth: usize,
    ) -> Result<(), DecodeError>
    {
        if depth > self.options.recursion_limit {
            return Err(DecodeError::RecursionLimitExceeded {
                limit: self.options.recursion_limit,
            });
        }

        let mut occurrences = HashMap::new();
        for child in dir.children() {
            let attributes = child.attributes();
            if attributes.label == Label::Repeated {
                *occurrences.entry(attributes.field_number).or_insert(0) += 1;
            }
        }

        while !data.is_empty() {
            let (wire_type, number) = read_key(&mut data)?;
            if let WireType::StartGroup | WireType::EndGroup = wire_type {
                return Err(DecodeError::UnsupportedGroupEncoding { number });
            }

            let field = self.resolve_field(msg, number)?;
            log::trace!(
                "{}: field {} '{}' as {}",
                msg.full_name,
                number,
                field.name,
                wire_type
            );

            // Parsers must accept both encodings for repeated scalars.
            if field.accepts_packed() && wire_type == WireType::LengthDelimited {
                let payload = read_length_delimited(&mut data)?;
                self.decode_packed(msg, field, payload, &mut occurrences, dir)?;
                continue;
            }

            let expected = field.field_type.wire_type();
            if wire_type != expected {
                return Err(DecodeError::WireTypeMismatch {
                    field: field.name.clone(),
                    expected,
                    actual: wire_type,
                });
            }

            let name = instance_name(field, &mut occurrences);
            if let (ValueType::Message(mref), Some(existing)) =
                (&field.field_type, dir.get_directory_mut(&name))
            {
                if existing.attributes().field_number == field.number {
                    let payload = read_length_delimited(&mut data)?;
                    let nested = self.nested_message(field, *mref)?;
                    self.decode_into(nested, payload, existing, depth + 1)?;
                    continue;
                }
            }

            let node = self.decode_field(field, name, &mut data, depth)?;
            insert_child(msg, dir, node)?;
        }

        Ok(())
    }

    fn nested_message(
        &self,
        field: &MessageField,
        mref: MessageRef,
    ) -> Result<&'a MessageInfo, DecodeError>
    {
        self.ctx
            .resolve_message(mref)
            .ok_or_else(|| DecodeError::SchemaLookupFailed {
                name: field.name.clone(),
            })
    }

    /// Finds the field among the message fields or its registered extensions.
    fn resolve_field<'m>(
        &self,
        msg: &'m MessageInfo,
        number: u64,
    ) -> Result<&'m MessageField, DecodeError>
    where
        'a: 'm,
    {
        if let Some(field) = msg.get_field(number) {
            return Ok(field);
        }

        if msg.is_extension(number) {
            if let Some(field) = self.ctx.extension(msg.self_ref, number) {
                return Ok(field);
            }
        }

        Err(DecodeError::UnknownField {
            message: msg.full_name.clone(),
            number,
        })
    }

    fn decode_field(
        &self,
        field: &MessageField,
        name: String,
        data: &mut &[u8],
        depth: usize,
    ) -> Result<Node, DecodeError>
    {
        let attributes = NodeAttributes {
            field_number: field.number,
            wire_type: field.field_type.wire_type(),
            label: field.label,
        };

        Ok(match &field.field_type {
            ValueType::Message(mref) => {
                let payload = read_length_delimited(data)?;
                let msg = self.nested_message(field, *mref)?;
                Node::Directory(self.decode_directory(msg, payload, name, attributes, depth + 1)?)
            }
            vt => Node::Leaf(Leaf::new(name, attributes, self.decode_scalar(vt, data)?)),
        })
    }

    fn decode_packed(
        &self,
        msg: &MessageInfo,
        field: &MessageField,
        mut payload: &[u8],
        occurrences: &mut HashMap<u64, usize>,
        dir: &mut Directory,
    ) -> Result<(), DecodeError>
    {
        let vt = &field.field_type;
        let width = match vt.wire_type() {
            WireType::Fixed32 => 4,
            WireType::Fixed64 => 8,
            _ => 1,
        };
        if payload.len() % width != 0 {
            return Err(DecodeError::CorruptPackedField {
                field: field.name.clone(),
                remaining: payload.len() % width,
            });
        }

        let attributes = NodeAttributes {
            field_number: field.number,
            wire_type: vt.wire_type(),
            label: field.label,
        };
        while !payload.is_empty() {
            let remaining = payload.len();
            let contents = self
                .decode_scalar(vt, &mut payload)
                .map_err(|e| match e {
                    DecodeError::TruncatedInput { .. } => DecodeError::CorruptPackedField {
                        field: field.name.clone(),
                        remaining,
                    },
                    other => other,
                })?;

            let name = instance_name(field, occurrences);
            insert_child(msg, dir, Node::Leaf(Leaf::new(name, attributes, contents)))?;
        }

        Ok(())
    }

    /// Reads a single non-message value and renders it as text.
    fn decode_scalar(&self, vt: &ValueType, data: &mut &[u8]) -> Result<Bytes, DecodeError>
    {
        let text = match vt {
            ValueType::Double => format!("{:.6}", f64::from_le_bytes(read_fixed(data)?)),
            ValueType::Float => format!("{:.6}", f32::from_le_bytes(read_fixed(data)?)),
            ValueType::Int32 => (read_varint(data, "int32")? as i32).to_string(),
            ValueType::Int64 => (read_varint(data, "int64")? as i64).to_string(),
            ValueType::UInt32 => (read_varint(data, "uint32")? as u32).to_string(),
            ValueType::UInt64 => read_varint(data, "uint64")?.to_string(),
            ValueType::SInt32 => {
                zigzag_decode_32(read_varint(data, "sint32")? as u32).to_string()
            }
            ValueType::SInt64 => zigzag_decode_64(read_varint(data, "sint64")?).to_string(),
            ValueType::Fixed32 => u32::from_le_bytes(read_fixed(data)?).to_string(),
            ValueType::Fixed64 => u64::from_le_bytes(read_fixed(data)?).to_string(),
            ValueType::SFixed32 => i32::from_le_bytes(read_fixed(data)?).to_string(),
            ValueType::SFixed64 => i64::from_le_bytes(read_fixed(data)?).to_string(),
            ValueType::Bool => match read_varint(data, "bool")? {
                0 => "False".to_string(),
                _ => "True".to_string(),
            },
            ValueType::String => return Ok(Bytes::copy_from_slice(read_length_delimited(data)?)),
            ValueType::Bytes => hex::encode(read_length_delimited(data)?),
            ValueType::Enum(eref) => {
                // Enums are int32 on the wire; negative values arrive sign extended.
                let value = i64::from(read_varint(data, "enum")? as i32);
                let e = self.ctx.resolve_enum(*eref).ok_or_else(|| {
                    DecodeError::SchemaLookupFailed {
                        name: format!("{:?}", eref),
                    }
                })?;
                match e.get_field_by_value(value) {
                    Some(field) => field.name.clone(),
                    None => {
                        return Err(DecodeError::UnknownEnumValue {
                            enum_name: e.full_name.clone(),
                            value,
                        })
                    }
                }
            }
            ValueType::Message(..) => unreachable!("Message value decoded as a scalar"),
        };

        Ok(Bytes::from(text))
    }
}

fn insert_child(msg: &MessageInfo, dir: &mut Directory, node: Node) -> Result<(), DecodeError>
{
    dir.insert(node).map_err(|node| DecodeError::DuplicateName {
        message: msg.full_name.clone(),
        name: node.name().to_string(),
    })
}

/// `foo_N` for the Nth instance of a repeated field, plain `foo` otherwise.
fn instance_name(field: &MessageField, occurrences: &mut HashMap<u64, usize>) -> String
{
    match field.label {
        Label::Repeated => {
            let count = occurrences.entry(field.number).or_insert(0);
            *count += 1;
            format!("{}_{}", field.name, count)
        }
        _ => field.name.clone(),
    }
}

impl MessageRef
{
    /// Decode a single message payload.
    ///
    /// Fails with `SchemaLookupFailed` if the `MessageRef` came from a different context.
    pub fn decode(self, data: &[u8], ctx: &Context) -> Result<ValueTree, DecodeError>
    {
        let msg = ctx
            .resolve_message(self)
            .ok_or_else(|| DecodeError::SchemaLookupFailed {
                name: format!("{:?}", self),
            })?;
        msg.decode(data, ctx)
    }
}

impl MessageInfo
{
    /// Decode a single message payload with the default options.
    pub fn decode(&self, data: &[u8], ctx: &Context) -> Result<ValueTree, DecodeError>
    {
        Decoder::new(ctx).decode(self, std::slice::from_ref(&data))
    }
}

/// Decodes a base 128 varint from the start of `data`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize), DecodeError>
{
    let mut cursor = data;
    let value = read_varint(&mut cursor, "varint")?;
    Ok((value, data.len() - cursor.len()))
}

/// Decodes a field key from the start of `data`.
///
/// Returns the wire type, the field number and the number of bytes consumed.
pub fn decode_key(data: &[u8]) -> Result<(WireType, u64, usize), DecodeError>
{
    let mut cursor = data;
    let (wire_type, number) = read_key(&mut cursor)?;
    Ok((wire_type, number, data.len() - cursor.len()))
}

/// Zig-zag decoding for `sint32`.
pub fn zigzag_decode_32(u: u32) -> i32
{
    ((u >> 1) as i32) ^ -((u & 1) as i32)
}

/// Zig-zag decoding for `sint64`.
pub fn zigzag_decode_64(u: u64) -> i64
{
    ((u >> 1) as i64) ^ -((u & 1) as i64)
}

fn read_varint(data: &mut &[u8], reading: &'static str) -> Result<u64, DecodeError>
{
    let bytes: &[u8] = *data;
    let mut result = 0u64;
    for (idx, b) in bytes.iter().enumerate() {
        if idx >= MAX_VARINT_LEN {
            return Err(DecodeError::VarintOverflow { reading });
        }

        result |= u64::from(b & 0x7f) << (idx * 7);
        if b & 0x80 == 0 {
            *data = &bytes[idx + 1..];
            return Ok(result);
        }
    }

    Err(DecodeError::TruncatedInput { reading })
}

fn read_key(data: &mut &[u8]) -> Result<(WireType, u64), DecodeError>
{
    let key = read_varint(data, "field key")?;
    let number = key >> 3;
    let tag = (key & 0x07) as u8;

    if number == 0 {
        return Err(DecodeError::InvalidFieldNumber { number });
    }

    match WireType::from_tag(tag) {
        Some(wire_type) => Ok((wire_type, number)),
        None => Err(DecodeError::InvalidWireType {
            wire_type: tag,
            number,
        }),
    }
}

fn read_fixed<const N: usize>(data: &mut &[u8]) -> Result<[u8; N], DecodeError>
{
    if data.len() < N {
        return Err(DecodeError::TruncatedInput {
            reading: "fixed width value",
        });
    }

    let bytes: &[u8] = *data;
    let (value, remainder) = bytes.split_at(N);
    *data = remainder;
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(value);
    Ok(bytes)
}

fn read_length_delimited<'d>(data: &mut &'d [u8]) -> Result<&'d [u8], DecodeError>
{
    let len = read_varint(data, "length prefix")?;
    let bytes: &'d [u8] = *data;
    match usize::try_from(len) {
        Ok(len) if len <= bytes.len() => {
            let (value, remainder) = bytes.split_at(len);
            *data = remainder;
            Ok(value)
        }
        _ => Err(DecodeError::TruncatedInput {
            reading: "length-delimited value",
        }),
    }
}
