use std::borrow::Cow;
use std::collections::BTreeMap;

use super::*;

#[derive(Default)]
pub(crate) struct ContextBuilder
{
    pub(crate) packages: Vec<PackageBuilder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Syntax
{
    Proto2,
    Proto3,
}

impl Default for Syntax
{
    fn default() -> Self
    {
        Syntax::Proto2
    }
}

#[derive(Default, Debug, PartialEq)]
pub(crate) struct PackageBuilder
{
    pub(crate) name: Option<String>,
    pub(crate) syntax: Syntax,
    pub(crate) types: Vec<ProtobufTypeBuilder>,
    pub(crate) extends: Vec<ExtendBuilder>,
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum ProtobufTypeBuilder
{
    Message(MessageBuilder),
    Enum(EnumBuilder),
}

#[derive(Default, Debug, PartialEq, Clone)]
pub(crate) struct MessageBuilder
{
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldBuilder>,
    pub(crate) inner_types: Vec<ProtobufTypeBuilder>,
    pub(crate) extends: Vec<ExtendBuilder>,
    pub(crate) extension_ranges: Vec<ExtensionRange>,
    pub(crate) options: Vec<ProtoOption>,
}

#[derive(Default, Debug, PartialEq, Clone)]
pub(crate) struct EnumBuilder
{
    pub(crate) name: String,
    pub(crate) fields: Vec<EnumField>,
    pub(crate) options: Vec<ProtoOption>,
}

#[derive(Default, Debug, PartialEq, Clone)]
pub(crate) struct ExtendBuilder
{
    pub(crate) extendee: String,
    pub(crate) fields: Vec<FieldBuilder>,
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) struct FieldBuilder
{
    pub(crate) label: Option<Label>,
    pub(crate) field_type: FieldTypeBuilder,
    pub(crate) name: String,
    pub(crate) number: u64,
    pub(crate) options: Vec<ProtoOption>,
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum FieldTypeBuilder
{
    Builtin(ValueType),
    Unknown(String),
}

impl ContextBuilder
{
    pub fn build(self) -> Result<Context, ParseError>
    {
        let mut cache = BuildCache::default();
        let mut packages: Vec<Package> = vec![];
        for p in &self.packages {
            let pkg_idx = match packages.iter().position(|existing| existing.name == p.name) {
                Some(idx) => idx,
                None => {
                    let mut pkg = Package::new(p.name.clone());
                    pkg.self_ref = PackageRef(InternalRef(packages.len()));
                    packages.push(pkg);
                    packages.len() - 1
                }
            };
            p.populate(&mut cache, PackageRef(InternalRef(pkg_idx)))?;
        }

        // The types are built in the same order the cache was populated in so the
        // indices assigned during populate remain valid.
        let mut types = Vec::with_capacity(cache.types.len());
        let mut extends = vec![];
        for p in self.packages {
            let scope = p.name.clone().unwrap_or_default();
            let syntax = p.syntax;
            for t in p.types {
                let type_ref = t.build(&scope, syntax, &cache, &mut types, &mut extends)?;
                let pkg = &mut packages[cache.package_of(&type_ref)];
                pkg.types.push(type_ref);
            }
            extends.extend(p.extends.into_iter().map(|e| (scope.clone(), syntax, e)));
        }

        let types_by_name = types
            .iter()
            .enumerate()
            .map(|(idx, t): (usize, &TypeInfo)| (t.full_name().to_string(), idx))
            .collect();

        let mut context = Context {
            packages,
            types,
            types_by_name,
            extensions: Default::default(),
        };

        for (scope, syntax, extend) in extends {
            extend.build(&scope, syntax, &cache, &mut context)?;
        }

        log::debug!(
            "Built schema with {} types and {} extensions",
            context.types.len(),
            context.extensions.len()
        );

        Ok(context)
    }
}

impl PackageBuilder
{
    fn populate(&self, cache: &mut BuildCache, pkg: PackageRef) -> Result<(), ParseError>
    {
        let mut path = match &self.name {
            Some(name) => name.split('.').collect(),
            None => vec![],
        };

        for t in &self.types {
            t.populate(cache, &mut path, TypeParent::Package(pkg))?;
        }

        Ok(())
    }
}

impl ProtobufTypeBuilder
{
    fn name(&self) -> &str
    {
        match self {
            ProtobufTypeBuilder::Message(m) => &m.name,
            ProtobufTypeBuilder::Enum(e) => &e.name,
        }
    }

    /// Lists this type and its inner types recursively into the build cache.
    ///
    /// On error the `path` will be left in an undefined state.
    fn populate<'a>(
        &'a self,
        cache: &mut BuildCache,
        path: &mut Vec<&'a str>,
        parent: TypeParent,
    ) -> Result<(), ParseError>
    {
        path.push(self.name());
        let full_name = path.join(".");
        let item_type = match self {
            ProtobufTypeBuilder::Message(..) => ItemType::Message,
            ProtobufTypeBuilder::Enum(..) => ItemType::Enum,
        };

        let final_idx = cache.types.len();
        if cache.items.insert(full_name.clone(), final_idx).is_some() {
            return Err(ParseError::DuplicateType { name: full_name });
        }

        cache.types.push(CacheData {
            item_type,
            full_name,
            final_idx,
            parent,
        });

        if let ProtobufTypeBuilder::Message(m) = self {
            let self_ref = MessageRef(InternalRef(final_idx));
            for inner in &m.inner_types {
                inner.populate(cache, path, TypeParent::Message(self_ref))?;
            }
        }

        path.pop();
        Ok(())
    }

    /// Builds this type and its inner types, appending them to `types`.
    fn build(
        self,
        scope: &str,
        syntax: Syntax,
        cache: &BuildCache,
        types: &mut Vec<TypeInfo>,
        extends: &mut Vec<(String, Syntax, ExtendBuilder)>,
    ) -> Result<TypeRef, ParseError>
    {
        let full_name = match scope.is_empty() {
            true => self.name().to_string(),
            false => format!("{}.{}", scope, self.name()),
        };
        let self_data = cache
            .type_by_full_name(&full_name)
            .expect("Existing type wasn't added to the cache");
        debug_assert_eq!(self_data.final_idx, types.len());

        match self {
            ProtobufTypeBuilder::Enum(e) => {
                types.push(TypeInfo::Enum(e.build(self_data)?));
                Ok(TypeRef::Enum(EnumRef(InternalRef(self_data.final_idx))))
            }
            ProtobufTypeBuilder::Message(m) => {
                let self_ref = MessageRef(InternalRef(self_data.final_idx));
                let MessageBuilder {
                    name,
                    fields,
                    inner_types,
                    extends: inner_extends,
                    extension_ranges,
                    options: _,
                } = m;

                let mut msg = MessageInfo::new(name, self_data.parent);
                msg.full_name = full_name.clone();
                msg.self_ref = self_ref;
                msg.extension_ranges = extension_ranges;
                for field in fields {
                    let field = field.build(self_data, &self_data.full_name, syntax, cache)?;
                    let field_name = field.name.clone();
                    if msg.add_field(field).is_err() {
                        return Err(ParseError::DuplicateField {
                            name: field_name,
                            message: full_name.clone(),
                        });
                    }
                }
                types.push(TypeInfo::Message(msg));

                let mut inner_refs = vec![];
                for inner in inner_types {
                    inner_refs.push(inner.build(&full_name, syntax, cache, types, extends)?);
                }
                if let Some(TypeInfo::Message(msg)) = types.get_mut(self_data.final_idx) {
                    msg.inner_types = inner_refs;
                }

                extends.extend(
                    inner_extends
                        .into_iter()
                        .map(|e| (full_name.clone(), syntax, e)),
                );

                Ok(TypeRef::Message(self_ref))
            }
        }
    }
}

impl EnumBuilder
{
    fn build(self, self_data: &CacheData) -> Result<EnumInfo, ParseError>
    {
        let mut info = EnumInfo::new(self.name, self_data.parent);
        info.full_name = self_data.full_name.clone();
        info.self_ref = EnumRef(InternalRef(self_data.final_idx));

        // With `allow_alias` the first name of a value wins, later ones are lookup aliases.
        for field in self.fields {
            if info.get_field_by_name(&field.name).is_some() {
                return Err(ParseError::DuplicateEnumValue {
                    name: field.name,
                    enum_name: info.full_name,
                });
            }

            if info.get_field_by_value(field.value).is_some() {
                info.add_alias(field.name, field.value);
            } else {
                info.add_field(field)
                    .expect("Enum value and name were checked to be free");
            }
        }

        Ok(info)
    }
}

impl ExtendBuilder
{
    fn build(
        self,
        scope: &str,
        syntax: Syntax,
        cache: &BuildCache,
        context: &mut Context,
    ) -> Result<(), ParseError>
    {
        let target = cache
            .resolve_type(&self.extendee, scope)
            .ok_or_else(|| ParseError::TypeNotFound {
                name: self.extendee.clone(),
                context: scope.to_string(),
            })?;

        if target.item_type != ItemType::Message {
            return Err(ParseError::InvalidTypeKind {
                type_name: self.extendee,
                context: "extend",
                expected: ItemType::Message,
                actual: target.item_type,
            });
        }

        let extendee = MessageRef(InternalRef(target.final_idx));
        for field in self.fields {
            let field = field.build(target, scope, syntax, cache)?;
            let number = field.number;
            context
                .insert_extension(extendee, field)
                .map_err(|e| match e {
                    InsertError::ExtensionOutOfRange { .. } => ParseError::InvalidExtension {
                        extendee: target.full_name.clone(),
                        number,
                    },
                    _ => ParseError::DuplicateExtension {
                        extendee: target.full_name.clone(),
                        number,
                    },
                })?;
        }

        Ok(())
    }
}

impl FieldBuilder
{
    /// Builds the field. Type names are resolved starting from `scope`.
    fn build(
        self,
        self_data: &CacheData,
        scope: &str,
        syntax: Syntax,
        cache: &BuildCache,
    ) -> Result<MessageField, ParseError>
    {
        let label = self.label.unwrap_or(Label::Optional);
        let field_type = self.field_type.build(self_data, scope, cache)?;
        let packed = resolve_packed(label, &field_type, &self.options, syntax);
        Ok(MessageField {
            name: self.name,
            number: self.number,
            field_type,
            label,
            packed,
            options: self.options,
        })
    }
}

fn resolve_packed(
    label: Label,
    field_type: &ValueType,
    options: &[ProtoOption],
    syntax: Syntax,
) -> bool
{
    // Only repeated scalars can be packed.
    if label != Label::Repeated || !field_type.is_packable() {
        return false;
    }

    // An explicit option wins over the syntax default.
    if let Some(opt) = options.iter().find(|o| o.name == "packed") {
        return opt.value == Constant::Bool(true);
    }

    syntax == Syntax::Proto3
}

impl FieldTypeBuilder
{
    fn build(
        self,
        self_data: &CacheData,
        scope: &str,
        cache: &BuildCache,
    ) -> Result<ValueType, ParseError>
    {
        Ok(match self {
            FieldTypeBuilder::Builtin(vt) => vt,
            FieldTypeBuilder::Unknown(s) => {
                let t = cache
                    .resolve_type(&s, scope)
                    .ok_or_else(|| ParseError::TypeNotFound {
                        name: s,
                        context: self_data.full_name.to_string(),
                    })?;

                match t.item_type {
                    ItemType::Message => ValueType::Message(MessageRef(InternalRef(t.final_idx))),
                    ItemType::Enum => ValueType::Enum(EnumRef(InternalRef(t.final_idx))),
                }
            }
        })
    }
}

#[derive(Default)]
struct BuildCache
{
    items: BTreeMap<String, usize>,
    types: Vec<CacheData>,
}

struct CacheData
{
    item_type: ItemType,
    final_idx: usize,
    full_name: String,
    parent: TypeParent,
}

impl BuildCache
{
    fn resolve_type(&self, relative_name: &str, mut current_path: &str) -> Option<&CacheData>
    {
        if let Some(absolute) = relative_name.strip_prefix('.') {
            return self.type_by_full_name(absolute);
        }

        loop {
            let lookup: Cow<str> = match current_path.is_empty() {
                true => relative_name.into(),
                false => format!("{}.{}", current_path, relative_name).into(),
            };

            if let Some(t) = self.type_by_full_name(&lookup) {
                return Some(t);
            }

            if current_path.is_empty() {
                return None;
            }

            match current_path.rfind('.') {
                Some(i) => {
                    let (start, _) = current_path.split_at(i);
                    current_path = start;
                }
                None => {
                    current_path = "";
                }
            }
        }
    }

    fn type_by_full_name(&self, full_name: &str) -> Option<&CacheData>
    {
        self.items.get(full_name).and_then(|i| self.types.get(*i))
    }

    fn package_of(&self, type_ref: &TypeRef) -> usize
    {
        let idx = match type_ref {
            TypeRef::Message(m) => m.0 .0,
            TypeRef::Enum(e) => e.0 .0,
        };
        match self.types[idx].parent {
            TypeParent::Package(p) => p.0 .0,
            TypeParent::Message(..) => unreachable!("Top level type with a message parent"),
        }
    }
}
