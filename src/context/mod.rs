//! Schema index built from the proto-files.
//!
//! The [`Context`] answers the lookups the decoder needs: messages and enums by their fully
//! qualified names and extension fields by their containing message and field number.

use bytes::Bytes;
use snafu::Snafu;
use std::collections::{BTreeMap, HashMap};

mod api;
mod builder;
mod modify_api;
mod parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InternalRef(usize);

/// A reference to a message. Can be resolved to `MessageInfo` through a `Context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef(InternalRef);

/// A reference to an enum. Can be resolved to `EnumInfo` through a `Context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumRef(InternalRef);

/// A reference to a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageRef(InternalRef);

/// Schema parsing error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum ParseError
{
    /// Syntax error in the input files.
    #[snafu(display("Parsing error: {}", source))]
    SyntaxError
    {
        /// Source error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Duplicate type.
    #[snafu(display("Duplicate type: {}", name))]
    DuplicateType
    {
        /// Type.
        name: String,
    },

    /// Unknown type reference.
    #[snafu(display("Unknown type '{}' in '{}'", name, context))]
    TypeNotFound
    {
        /// Type name.
        name: String,
        /// Type that referred to the unknown type.
        context: String,
    },

    /// Wrong kind of type used in a specific context.
    #[snafu(display(
        "Invalid type '{}' ({:?}) for {}, expected {:?}",
        type_name,
        actual,
        context,
        expected
    ))]
    InvalidTypeKind
    {
        /// Type that is of the wrong kind.
        type_name: String,

        /// The context where the type was used.
        context: &'static str,

        /// Expected item type.
        expected: ItemType,

        /// Actual item type.
        actual: ItemType,
    },

    /// Two fields of a message share a number or a name.
    #[snafu(display("Duplicate field '{}' in '{}'", name, message))]
    DuplicateField
    {
        /// Field name.
        name: String,
        /// Full name of the message.
        message: String,
    },

    /// Two values of an enum share a name.
    #[snafu(display("Duplicate value '{}' in enum '{}'", name, enum_name))]
    DuplicateEnumValue
    {
        /// Value name.
        name: String,
        /// Full name of the enum.
        enum_name: String,
    },

    /// An integer literal that does not fit the target type.
    #[snafu(display("Invalid integer literal '{}'", literal))]
    InvalidLiteral
    {
        /// The literal as written in the file.
        literal: String,
    },

    /// Extension field outside of the extension ranges of the extended message.
    #[snafu(display("Extension {} is not in an extension range of '{}'", number, extendee))]
    InvalidExtension
    {
        /// Full name of the extended message.
        extendee: String,

        /// Extension field number.
        number: u64,
    },

    /// The same extension number was declared twice for one message.
    #[snafu(display("Duplicate extension {} for '{}'", number, extendee))]
    DuplicateExtension
    {
        /// Full name of the extended message.
        extendee: String,

        /// Extension field number.
        number: u64,
    },
}

/// Error modifying the context.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum InsertError
{
    /// A type conflicts with an existing type.
    #[snafu(display("Type already exists: {:?}", original))]
    TypeExists
    {
        /// The previous type that conflicts with the new one.
        original: TypeRef,
    },

    /// An extension with the same number already exists for the message.
    #[snafu(display("Extension {} already exists", number))]
    ExtensionExists
    {
        /// Extension field number.
        number: u64,
    },

    /// The extension number is not within any extension range of the message.
    #[snafu(display("Extension {} is outside of the extension ranges", number))]
    ExtensionOutOfRange
    {
        /// Extension field number.
        number: u64,
    },
}

/// Error modifying a type.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub enum MemberInsertError
{
    /// A field with the same number already exists.
    NumberConflict,

    /// A field with the same name already exists.
    NameConflict,
}

/// Type reference that references either message or enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef
{
    /// Message type reference.
    Message(MessageRef),

    /// Enum type reference.
    Enum(EnumRef),
}

/// Protobuf item type
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ItemType
{
    /// `message` item
    Message,

    /// `enum` item
    Enum,
}

/// Schema index.
///
/// Contains type information parsed from the files. Required for decoding
/// incoming Protobuf messages.
#[derive(Default, Debug, PartialEq)]
pub struct Context
{
    packages: Vec<Package>,
    types: Vec<TypeInfo>,
    types_by_name: HashMap<String, usize>,
    extensions: HashMap<(MessageRef, u64), MessageField>,
}

/// Package details.
#[derive(Debug, PartialEq)]
pub struct Package
{
    /// Package name. None for an anonymous package.
    name: Option<String>,

    /// Package self reference.
    self_ref: PackageRef,

    /// Top level types.
    types: Vec<TypeRef>,
}

/// Message or enum type.
#[derive(Debug, PartialEq)]
pub enum TypeInfo
{
    /// Message.
    Message(MessageInfo),

    /// Enum.
    Enum(EnumInfo),
}

/// Message details
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct MessageInfo
{
    /// Message name.
    pub name: String,

    /// Full message name, including package and parent type names.
    pub full_name: String,

    /// Parent
    pub parent: TypeParent,

    /// `MessageRef` that references this message.
    pub self_ref: MessageRef,

    /// References to the inner types defined within this message.
    pub inner_types: Vec<TypeRef>,

    /// Field number ranges reserved for extensions.
    pub extension_ranges: Vec<ExtensionRange>,

    // Using BTreeMap here to ensure ordering.
    fields: BTreeMap<u64, MessageField>,
    fields_by_name: BTreeMap<String, u64>,
}

/// Reference to a type parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeParent
{
    /// Reference to a package for top-level types.
    Package(PackageRef),

    /// Reference to a message for inner types.
    Message(MessageRef),
}

/// Half-open range of field numbers, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionRange
{
    /// First field number in the range.
    pub start: u64,

    /// First field number after the range.
    pub end: u64,
}

/// Enum details
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct EnumInfo
{
    /// Enum name.
    pub name: String,

    /// Full enum name, including package and parent type names.
    pub full_name: String,

    /// Parent
    pub parent: TypeParent,

    /// `EnumRef` that references this enum.
    pub self_ref: EnumRef,

    fields_by_value: BTreeMap<i64, EnumField>,
    fields_by_name: BTreeMap<String, i64>,
}

/// Message field details.
#[derive(Debug, PartialEq, Clone)]
#[non_exhaustive]
pub struct MessageField
{
    /// Field name.
    pub name: String,

    /// Field number.
    pub number: u64,

    /// Field type
    pub field_type: ValueType,

    /// Field label.
    pub label: Label,

    /// True, if a repeated scalar field is encoded packed.
    pub packed: bool,

    /// Field options.
    pub options: Vec<ProtoOption>,
}

/// Field label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label
{
    /// `required`
    Required,

    /// `optional`, or a proto3 field without a label.
    Optional,

    /// `repeated`
    Repeated,
}

/// Enum field details.
#[derive(Debug, PartialEq, Clone)]
#[non_exhaustive]
pub struct EnumField
{
    /// Enum field name.
    pub name: String,

    /// Enum field value.
    pub value: i64,

    /// Options.
    pub options: Vec<ProtoOption>,
}

/// Field value types.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueType
{
    /// `double`
    Double,

    /// `float`
    Float,

    /// `int32`
    Int32,

    /// `int64`
    Int64,

    /// `uint32`
    UInt32,

    /// `uint64`
    UInt64,

    /// `sint32`
    SInt32,

    /// `sint64`
    SInt64,

    /// `fixed32`
    Fixed32,

    /// `fixed64`
    Fixed64,

    /// `sfixed32`
    SFixed32,

    /// `sfixed64`
    SFixed64,

    /// `bool`
    Bool,

    /// `string`
    String,

    /// `bytes`
    Bytes,

    /// A message type.
    Message(MessageRef),

    /// An enum type.
    Enum(EnumRef),
}

/// A single option.
#[derive(Debug, PartialEq, Clone)]
pub struct ProtoOption
{
    /// Option name.
    pub name: String,

    /// Option value.
    pub value: Constant,
}

/// Constant value, used for options.
#[derive(Debug, PartialEq, Clone)]
pub enum Constant
{
    /// An ident `foo.bar.baz`.
    Ident(String),

    /// An integer constant.
    Integer(i64),

    /// A floating point constant.
    Float(f64),

    /// A string constant.
    ///
    /// The string isn't guaranteed to be well formed UTF-8 so it's stored as
    /// Bytes here.
    String(Bytes),

    /// A boolean constant.
    Bool(bool),

    /// An aggregate `{ ... }` value, kept as the source text.
    Aggregate(String),
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn basic_package()
    {
        let ctx = Context::parse(&[r#"
            syntax = "proto3";
            message Message {}
        "#])
        .unwrap();

        let m = ctx.get_message("Message").unwrap();
        assert_eq!(m.parent, TypeParent::Package(PackageRef(InternalRef(0))));
    }

    #[test]
    fn basic_multiple_package()
    {
        let ctx = Context::parse(&[
            r#"
                syntax = "proto3";
                package First;
                message Message {}
            "#,
            r#"
                syntax = "proto3";
                package Second;
                message Message {}
            "#,
        ])
        .unwrap();

        let m = ctx.get_message("First.Message").unwrap();
        let pkg_ref = match m.parent {
            TypeParent::Package(p) => p,
            _ => panic!("Not a package reference: {:?}", m.parent),
        };
        let pkg = ctx.resolve_package(pkg_ref);
        assert_eq!(pkg.name.as_deref(), Some("First"));
        assert_eq!(pkg.types.len(), 1);

        let m = ctx.get_message(".Second.Message").unwrap();
        let pkg_ref = match m.parent {
            TypeParent::Package(p) => p,
            _ => panic!("Not a package reference: {:?}", m.parent),
        };
        let pkg = ctx.resolve_package(pkg_ref);
        assert_eq!(m.parent, TypeParent::Package(PackageRef(InternalRef(1))));
        assert_eq!(pkg.name.as_deref(), Some("Second"));
        assert_eq!(pkg.types.len(), 1);
    }

    #[test]
    fn same_package_in_two_files()
    {
        let ctx = Context::parse(&[
            "syntax = \"proto3\"; package Shared; message A {}",
            "syntax = \"proto3\"; package Shared; message B { A a = 1; }",
        ])
        .unwrap();

        let a = ctx.get_message("Shared.A").unwrap();
        let b = ctx.get_message("Shared.B").unwrap();
        assert_eq!(a.parent, b.parent);
        assert_eq!(
            b.get_field(1).unwrap().field_type,
            ValueType::Message(a.self_ref)
        );
    }
}
