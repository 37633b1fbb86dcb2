use super::*;
use crate::decode::WireType;

impl Context
{
    /// Create a new context.
    pub fn new() -> Self
    {
        Context {
            packages: Default::default(),
            types: Default::default(),
            types_by_name: Default::default(),
            extensions: Default::default(),
        }
    }

    /// Resolves a package reference.
    ///
    /// Will **panic** if the package defined by the `PackageRef` does not exist in this context.
    /// Such panic means the `PackageRef` came from a different context.
    pub fn resolve_package(&self, package_ref: PackageRef) -> &Package
    {
        &self.packages[package_ref.0 .0]
    }

    /// Gets type info by name.
    ///
    /// The name is fully qualified. A leading `.` is accepted, as used in descriptor type names.
    pub fn get_type(&self, full_name: &str) -> Option<&TypeInfo>
    {
        let full_name = full_name.strip_prefix('.').unwrap_or(full_name);
        self.types_by_name
            .get(full_name)
            .map(|idx| &self.types[*idx])
    }

    /// Gets a message type info by name.
    pub fn get_message(&self, full_name: &str) -> Option<&MessageInfo>
    {
        match self.get_type(full_name) {
            Some(TypeInfo::Message(m)) => Some(m),
            _ => None,
        }
    }

    /// Gets an enum type info by name.
    pub fn get_enum(&self, full_name: &str) -> Option<&EnumInfo>
    {
        match self.get_type(full_name) {
            Some(TypeInfo::Enum(e)) => Some(e),
            _ => None,
        }
    }

    /// Gets an extension field by the name of the extended message and the field number.
    pub fn get_extension(&self, extendee: &str, number: u64) -> Option<&MessageField>
    {
        let msg = self.get_message(extendee)?;
        self.extension(msg.self_ref, number)
    }

    /// Gets an extension field of the referenced message.
    pub fn extension(&self, extendee: MessageRef, number: u64) -> Option<&MessageField>
    {
        self.extensions.get(&(extendee, number))
    }

    /// Iterates all extension fields registered for the referenced message.
    pub fn iter_extensions(&self, extendee: MessageRef) -> impl Iterator<Item = &MessageField>
    {
        self.extensions
            .iter()
            .filter(move |((r, _), _)| *r == extendee)
            .map(|(_, field)| field)
    }

    fn resolve_type(&self, tr: InternalRef) -> Option<&TypeInfo>
    {
        self.types.get(tr.0)
    }

    /// Resolves a message reference.
    ///
    /// Returns `None` if the `MessageRef` came from a different context. A foreign reference is
    /// not guaranteed to be detected, as a message with an equal `MessageRef` may exist in
    /// multiple contexts.
    pub fn resolve_message(&self, tr: MessageRef) -> Option<&MessageInfo>
    {
        match self.resolve_type(tr.0) {
            Some(TypeInfo::Message(msg)) => Some(msg),
            _ => None,
        }
    }

    /// Resolves a enum reference.
    ///
    /// Returns `None` if the `EnumRef` came from a different context.
    pub fn resolve_enum(&self, tr: EnumRef) -> Option<&EnumInfo>
    {
        match self.resolve_type(tr.0) {
            Some(TypeInfo::Enum(e)) => Some(e),
            _ => None,
        }
    }

    /// Iterates all messages and enums in the order they were defined.
    pub fn iter_types(&self) -> impl Iterator<Item = &TypeInfo>
    {
        self.types.iter()
    }
}

impl Package
{
    /// Package name. None for an anonymous package.
    pub fn name(&self) -> Option<&str>
    {
        self.name.as_deref()
    }

    /// Top level types defined in the package.
    pub fn types(&self) -> &[TypeRef]
    {
        &self.types
    }
}

impl TypeInfo
{
    /// Get the name of the type.
    pub fn name(&self) -> &str
    {
        match self {
            TypeInfo::Message(m) => &m.name,
            TypeInfo::Enum(e) => &e.name,
        }
    }

    /// Get the full name of the type.
    pub fn full_name(&self) -> &str
    {
        match self {
            TypeInfo::Message(m) => &m.full_name,
            TypeInfo::Enum(e) => &e.full_name,
        }
    }

    /// Get the parent information for the type.
    pub fn parent(&self) -> TypeParent
    {
        match self {
            TypeInfo::Message(m) => m.parent,
            TypeInfo::Enum(e) => e.parent,
        }
    }
}

impl MessageInfo
{
    /// Iterates all message fields.
    pub fn iter_fields(&self) -> impl Iterator<Item = &MessageField>
    {
        self.fields.values()
    }

    /// Get a field by its number.
    pub fn get_field(&self, number: u64) -> Option<&MessageField>
    {
        self.fields.get(&number)
    }

    /// Get a field by its name.
    pub fn get_field_by_name(&self, name: &str) -> Option<&MessageField>
    {
        self.fields_by_name
            .get(name)
            .and_then(|id| self.get_field(*id))
    }

    /// True, if the field number falls within one of the extension ranges.
    pub fn is_extension(&self, number: u64) -> bool
    {
        self.extension_ranges.iter().any(|r| r.contains(number))
    }
}

impl ExtensionRange
{
    /// Check whether the field number is in the range.
    pub fn contains(&self, number: u64) -> bool
    {
        self.start <= number && number < self.end
    }
}

impl EnumInfo
{
    /// Gets a field by value.
    ///
    /// If the value is aliased, the name declared first is returned.
    pub fn get_field_by_value(&self, value: i64) -> Option<&EnumField>
    {
        self.fields_by_value.get(&value)
    }

    /// Gets a field by name.
    pub fn get_field_by_name(&self, name: &str) -> Option<&EnumField>
    {
        self.fields_by_name
            .get(name)
            .and_then(|v| self.get_field_by_value(*v))
    }

    /// Iterates the enum values in value order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &EnumField>
    {
        self.fields_by_value.values()
    }
}

impl MessageField
{
    /// True, if the field is repeated and its values may be packed on the wire.
    pub fn accepts_packed(&self) -> bool
    {
        self.label == Label::Repeated && self.field_type.is_packable()
    }
}

impl ValueType
{
    /// The wire type used to encode a single value of this type.
    pub fn wire_type(&self) -> WireType
    {
        match self {
            Self::Double => WireType::Fixed64,
            Self::Float => WireType::Fixed32,
            Self::Int32 => WireType::Varint,
            Self::Int64 => WireType::Varint,
            Self::UInt32 => WireType::Varint,
            Self::UInt64 => WireType::Varint,
            Self::SInt32 => WireType::Varint,
            Self::SInt64 => WireType::Varint,
            Self::Fixed32 => WireType::Fixed32,
            Self::Fixed64 => WireType::Fixed64,
            Self::SFixed32 => WireType::Fixed32,
            Self::SFixed64 => WireType::Fixed64,
            Self::Bool => WireType::Varint,
            Self::String => WireType::LengthDelimited,
            Self::Bytes => WireType::LengthDelimited,
            Self::Message(..) => WireType::LengthDelimited,
            Self::Enum(..) => WireType::Varint,
        }
    }

    /// True, if repeated values of this type can use the packed encoding.
    pub fn is_packable(&self) -> bool
    {
        self.wire_type() != WireType::LengthDelimited
    }
}
