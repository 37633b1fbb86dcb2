use super::*;

impl Context
{
    /// Insert a new message definition to the context.
    pub fn insert_message(&mut self, ty: MessageInfo) -> Result<MessageRef, InsertError>
    {
        self.insert_type(TypeInfo::Message(ty)).map(MessageRef)
    }

    /// Insert a new enum definition to the context.
    pub fn insert_enum(&mut self, ty: EnumInfo) -> Result<EnumRef, InsertError>
    {
        self.insert_type(TypeInfo::Enum(ty)).map(EnumRef)
    }

    /// Insert a new package to the context.
    ///
    /// Returns an error if the package with the same name already exists.
    pub fn insert_package(&mut self, mut pkg: Package) -> Result<PackageRef, PackageRef>
    {
        let pkg_ref = PackageRef(InternalRef(self.packages.len()));
        for existing in &self.packages {
            if existing.name == pkg.name {
                return Err(existing.self_ref);
            }
        }

        pkg.self_ref = pkg_ref;
        self.packages.push(pkg);
        Ok(pkg_ref)
    }

    /// Register an extension field for a message.
    ///
    /// The field number must fall within one of the extension ranges of the message.
    ///
    /// Will **panic** if the `MessageRef` does not refer to a message in this context.
    pub fn insert_extension(
        &mut self,
        extendee: MessageRef,
        field: MessageField,
    ) -> Result<(), InsertError>
    {
        use std::collections::hash_map::Entry;

        let msg = self
            .resolve_message(extendee)
            .expect("Extended message did not exist in this context");
        if !msg.is_extension(field.number) {
            return Err(InsertError::ExtensionOutOfRange {
                number: field.number,
            });
        }

        match self.extensions.entry((extendee, field.number)) {
            Entry::Occupied(..) => Err(InsertError::ExtensionExists {
                number: field.number,
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(field);
                Ok(())
            }
        }
    }

    fn insert_type(&mut self, mut ty: TypeInfo) -> Result<InternalRef, InsertError>
    {
        use std::collections::hash_map::Entry;

        // Validate everything before touching the context so a failure leaves no partial
        // changes behind.

        let internal_ref = InternalRef(self.types.len());
        let parent = ty.parent();

        let full_name = match parent {
            TypeParent::Package(p) => {
                let package = &self.packages[p.0 .0];
                match &package.name {
                    Some(package_name) => format!("{}.{}", package_name, ty.name()),
                    None => ty.name().to_string(),
                }
            }
            TypeParent::Message(m) => {
                let msg = &self.types[m.0 .0];
                format!("{}.{}", msg.full_name(), ty.name())
            }
        };

        match &mut ty {
            TypeInfo::Message(m) => m.full_name = full_name.clone(),
            TypeInfo::Enum(e) => e.full_name = full_name.clone(),
        }

        let vacant = match self.types_by_name.entry(full_name) {
            Entry::Occupied(occupied) => {
                let original_ref = InternalRef(*occupied.get());
                let original = match self.types[original_ref.0] {
                    TypeInfo::Message(..) => TypeRef::Message(MessageRef(original_ref)),
                    TypeInfo::Enum(..) => TypeRef::Enum(EnumRef(original_ref)),
                };
                return Err(InsertError::TypeExists { original });
            }
            Entry::Vacant(vacant) => vacant,
        };

        let type_ref = match &mut ty {
            TypeInfo::Message(m) => {
                m.self_ref = MessageRef(internal_ref);
                TypeRef::Message(m.self_ref)
            }
            TypeInfo::Enum(e) => {
                e.self_ref = EnumRef(internal_ref);
                TypeRef::Enum(e.self_ref)
            }
        };

        // From here on, we're modifying the context.

        match parent {
            TypeParent::Package(p) => {
                let package = &mut self.packages[p.0 .0];
                package.types.push(type_ref);
            }
            TypeParent::Message(m) => match &mut self.types[m.0 .0] {
                TypeInfo::Message(msg) => msg.inner_types.push(type_ref),
                _ => panic!("Inner type for a non-Message"),
            },
        };

        vacant.insert(internal_ref.0);
        self.types.push(ty);

        Ok(internal_ref)
    }
}

impl Package
{
    /// Create a new package.
    pub fn new(name: Option<String>) -> Self
    {
        Self {
            name,
            self_ref: PackageRef(InternalRef(0)),
            types: vec![],
        }
    }
}

impl MessageInfo
{
    /// Create a new message info.
    ///
    /// Before inserting the message info into a [`Context`] certain fields such as `self_ref` or
    /// `full_name` are not valid.
    pub fn new(name: String, parent: TypeParent) -> Self
    {
        MessageInfo {
            name,
            parent,

            full_name: String::new(),
            self_ref: MessageRef(InternalRef(0)),
            inner_types: vec![],
            extension_ranges: vec![],

            fields: BTreeMap::new(),
            fields_by_name: BTreeMap::new(),
        }
    }

    /// Add a field to the type.
    pub fn add_field(&mut self, field: MessageField) -> Result<(), MemberInsertError>
    {
        use std::collections::btree_map::Entry;

        let num = field.number;
        let num_entry = self.fields.entry(num);
        let name_entry = self.fields_by_name.entry(field.name.to_string());

        let (vacant_num, vacant_name) = match (num_entry, name_entry) {
            (Entry::Occupied(..), _) => return Err(MemberInsertError::NumberConflict),
            (_, Entry::Occupied(..)) => return Err(MemberInsertError::NameConflict),
            (Entry::Vacant(num), Entry::Vacant(name)) => (num, name),
        };

        vacant_num.insert(field);
        vacant_name.insert(num);

        Ok(())
    }

    /// Reserve the field numbers `start..end` for extensions.
    pub fn add_extension_range(&mut self, start: u64, end: u64)
    {
        self.extension_ranges.push(ExtensionRange { start, end });
    }
}

impl MessageField
{
    /// Create a new optional, unpacked message field.
    pub fn new(name: String, number: u64, field_type: ValueType) -> Self
    {
        Self {
            name,
            number,
            field_type,
            label: Label::Optional,
            packed: false,
            options: vec![],
        }
    }

    /// Create a new repeated field.
    pub fn repeated(name: String, number: u64, field_type: ValueType, packed: bool) -> Self
    {
        Self {
            label: Label::Repeated,
            packed,
            ..Self::new(name, number, field_type)
        }
    }
}

impl EnumInfo
{
    /// Create a new enum info.
    pub fn new(name: String, parent: TypeParent) -> Self
    {
        Self {
            name,
            parent,
            full_name: String::new(),
            self_ref: EnumRef(InternalRef(0)),
            fields_by_value: BTreeMap::new(),
            fields_by_name: BTreeMap::new(),
        }
    }

    /// Add a field to the enum definition.
    pub fn add_field(&mut self, field: EnumField) -> Result<(), MemberInsertError>
    {
        use std::collections::btree_map::Entry;

        let value = field.value;
        let value_entry = self.fields_by_value.entry(value);
        let name_entry = self.fields_by_name.entry(field.name.to_string());

        let (vacant_value, vacant_name) = match (value_entry, name_entry) {
            (Entry::Occupied(..), _) => return Err(MemberInsertError::NumberConflict),
            (_, Entry::Occupied(..)) => return Err(MemberInsertError::NameConflict),
            (Entry::Vacant(value), Entry::Vacant(name)) => (value, name),
        };

        vacant_value.insert(field);
        vacant_name.insert(value);

        Ok(())
    }

    /// Add an alias for an existing value. The alias is found by name only.
    pub(crate) fn add_alias(&mut self, name: String, value: i64)
    {
        self.fields_by_name.entry(name).or_insert(value);
    }
}

impl EnumField
{
    /// Create a new enum field.
    pub fn new(name: String, value: i64) -> Self
    {
        Self {
            name,
            value,
            options: vec![],
        }
    }
}

#[cfg(test)]
mod test
{
    use super::*;

    fn context_with_extendable() -> (Context, MessageRef)
    {
        let mut ctx = Context::new();
        let pkg = ctx.insert_package(Package::new(None)).unwrap();
        let mut msg = MessageInfo::new("Base".to_string(), TypeParent::Package(pkg));
        msg.add_extension_range(100, 200);
        let msg_ref = ctx.insert_message(msg).unwrap();
        (ctx, msg_ref)
    }

    #[test]
    fn extension_in_range()
    {
        let (mut ctx, base) = context_with_extendable();
        ctx.insert_extension(base, MessageField::new("ext".to_string(), 150, ValueType::Int32))
            .unwrap();

        assert_eq!(ctx.get_extension("Base", 150).unwrap().name, "ext");
        assert!(ctx.get_extension("Base", 151).is_none());
    }

    #[test]
    fn extension_out_of_range()
    {
        let (mut ctx, base) = context_with_extendable();
        let err = ctx
            .insert_extension(base, MessageField::new("ext".to_string(), 200, ValueType::Int32))
            .unwrap_err();
        assert!(matches!(err, InsertError::ExtensionOutOfRange { number: 200 }));
    }

    #[test]
    fn duplicate_extension()
    {
        let (mut ctx, base) = context_with_extendable();
        ctx.insert_extension(base, MessageField::new("a".to_string(), 100, ValueType::Int32))
            .unwrap();
        let err = ctx
            .insert_extension(base, MessageField::new("b".to_string(), 100, ValueType::Bool))
            .unwrap_err();
        assert!(matches!(err, InsertError::ExtensionExists { number: 100 }));
    }

    #[test]
    fn duplicate_type()
    {
        let (mut ctx, base) = context_with_extendable();
        let pkg = match ctx.resolve_message(base).unwrap().parent {
            TypeParent::Package(p) => p,
            other => panic!("Unexpected parent {:?}", other),
        };
        let err = ctx
            .insert_message(MessageInfo::new("Base".to_string(), TypeParent::Package(pkg)))
            .unwrap_err();
        assert!(matches!(
            err,
            InsertError::TypeExists {
                original: TypeRef::Message(r)
            } if r == base
        ));
    }

    #[test]
    fn field_conflicts()
    {
        let mut msg = MessageInfo::new("M".to_string(), TypeParent::Package(PackageRef(InternalRef(0))));
        msg.add_field(MessageField::new("a".to_string(), 1, ValueType::Int32))
            .unwrap();
        assert_eq!(
            msg.add_field(MessageField::new("b".to_string(), 1, ValueType::Int32)),
            Err(MemberInsertError::NumberConflict)
        );
        assert_eq!(
            msg.add_field(MessageField::new("a".to_string(), 2, ValueType::Int32)),
            Err(MemberInsertError::NameConflict)
        );
    }
}
