use bytes::{BufMut, Bytes, BytesMut};
use pest::{
    iterators::{Pair, Pairs},
    Parser,
};
use snafu::ResultExt;

use super::builder::*;
use super::*;

#[derive(pest_derive::Parser)]
#[grammar = "proto.pest"]
struct ProtoParser;

/// Largest field number allowed by the protobuf encoding.
pub const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

impl Context
{
    /// Parses the files and creates a decoding context.
    pub fn parse<T, S>(files: T) -> Result<Self, ParseError>
    where
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let builder = ContextBuilder {
            packages: files
                .into_iter()
                .map(|f| PackageBuilder::parse_str(f.as_ref()))
                .collect::<Result<_, _>>()?,
        };

        builder.build()
    }
}

impl PackageBuilder
{
    pub fn parse_str(input: &str) -> Result<Self, ParseError>
    {
        let pairs = ProtoParser::parse(Rule::proto, input)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            .context(SyntaxError {})?;

        let mut current_package = PackageBuilder::default();
        for pair in pairs {
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::syntax => {
                        current_package.syntax = match inner.into_inner().next().unwrap().as_str() {
                            "proto3" => Syntax::Proto3,
                            _ => Syntax::Proto2,
                        }
                    }
                    // Editions pack repeated scalars by default, same as proto3.
                    Rule::edition => current_package.syntax = Syntax::Proto3,
                    Rule::topLevelDef => {
                        let def = inner.into_inner().next().unwrap();
                        match def.as_rule() {
                            Rule::message => current_package
                                .types
                                .push(ProtobufTypeBuilder::Message(MessageBuilder::parse(def)?)),
                            Rule::enum_ => current_package
                                .types
                                .push(ProtobufTypeBuilder::Enum(EnumBuilder::parse(def)?)),
                            Rule::extend => current_package.extends.push(ExtendBuilder::parse(def)?),
                            Rule::service => {}
                            r => unreachable!("{:?}: {:?}", r, def),
                        }
                    }
                    Rule::package => {
                        current_package.name =
                            Some(inner.into_inner().next().unwrap().as_str().to_string())
                    }
                    Rule::import => {}
                    Rule::option => {}
                    Rule::emptyStatement => {}
                    Rule::EOI => {}
                    r => unreachable!("{:?}: {:?}", r, inner),
                }
            }
        }

        log::trace!(
            "Parsed package {:?} with {} top level types",
            current_package.name,
            current_package.types.len()
        );
        Ok(current_package)
    }
}

impl MessageBuilder
{
    pub fn parse(p: Pair<Rule>) -> Result<Self, ParseError>
    {
        let mut inner = p.into_inner();
        let name = inner.next().unwrap().as_str().to_string();

        let mut message = MessageBuilder {
            name,
            ..Default::default()
        };
        let body = inner.next().unwrap();
        for p in body.into_inner() {
            match p.as_rule() {
                Rule::field => message.fields.push(FieldBuilder::parse(p)?),
                Rule::enum_ => message
                    .inner_types
                    .push(ProtobufTypeBuilder::Enum(EnumBuilder::parse(p)?)),
                Rule::message => message
                    .inner_types
                    .push(ProtobufTypeBuilder::Message(MessageBuilder::parse(p)?)),
                Rule::option => message.options.push(ProtoOption::parse(p)?),
                Rule::oneof => {
                    // Oneof members decode like any other optional field.
                    for f in p.into_inner().skip(1) {
                        if f.as_rule() == Rule::oneofField {
                            message.fields.push(FieldBuilder::parse_oneof(f)?);
                        }
                    }
                }
                Rule::mapField => {
                    let (field, entry) = FieldBuilder::parse_map(p)?;
                    message.fields.push(field);
                    message
                        .inner_types
                        .push(ProtobufTypeBuilder::Message(entry));
                }
                Rule::extensions => {
                    for r in p.into_inner() {
                        if r.as_rule() == Rule::range {
                            message.extension_ranges.push(parse_extension_range(r)?);
                        }
                    }
                }
                Rule::extend => message.extends.push(ExtendBuilder::parse(p)?),
                Rule::reserved => {} // We don't need to care about reserved field numbers.
                Rule::emptyStatement => {}
                r => unreachable!("{:?}: {:?}", r, p),
            }
        }

        Ok(message)
    }
}

impl EnumBuilder
{
    fn parse(p: Pair<Rule>) -> Result<EnumBuilder, ParseError>
    {
        let mut inner = p.into_inner();
        let name = inner.next().unwrap().as_str().to_string();

        let mut fields = vec![];
        let mut options = vec![];
        let body = inner.next().unwrap();
        for p in body.into_inner() {
            match p.as_rule() {
                Rule::enumField => {
                    let mut inner = p.into_inner();
                    fields.push(EnumField {
                        name: inner.next().unwrap().as_str().to_string(),
                        value: parse_int_literal(inner.next().unwrap())?,
                        options: ProtoOption::parse_options(inner)?,
                    })
                }
                Rule::option => options.push(ProtoOption::parse(p)?),
                Rule::reserved => {}
                Rule::emptyStatement => {}
                r => unreachable!("{:?}: {:?}", r, p),
            }
        }

        Ok(EnumBuilder {
            name,
            fields,
            options,
        })
    }
}

impl ExtendBuilder
{
    fn parse(p: Pair<Rule>) -> Result<Self, ParseError>
    {
        let mut inner = p.into_inner();
        let extendee = inner.next().unwrap().as_str().to_string();
        let fields = inner
            .filter(|f| f.as_rule() == Rule::field)
            .map(FieldBuilder::parse)
            .collect::<Result<_, _>>()?;

        Ok(ExtendBuilder { extendee, fields })
    }
}

impl FieldBuilder
{
    pub fn parse(p: Pair<Rule>) -> Result<Self, ParseError>
    {
        let mut inner = p.into_inner().peekable();
        let label = match inner.peek().map(|p| p.as_rule()) {
            Some(Rule::fieldLabel) => match inner.next().unwrap().as_str() {
                "required" => Some(Label::Required),
                "repeated" => Some(Label::Repeated),
                _ => Some(Label::Optional),
            },
            _ => None,
        };
        let field_type = parse_field_type(inner.next().unwrap().as_str());
        let name = inner.next().unwrap().as_str().to_string();
        let number = parse_field_number(inner.next().unwrap())?;

        let options = match inner.next() {
            Some(p) => ProtoOption::parse_options(p.into_inner())?,
            None => vec![],
        };

        Ok(FieldBuilder {
            label,
            field_type,
            name,
            number,
            options,
        })
    }

    pub fn parse_oneof(p: Pair<Rule>) -> Result<Self, ParseError>
    {
        let mut inner = p.into_inner();
        let field_type = parse_field_type(inner.next().unwrap().as_str());
        let name = inner.next().unwrap().as_str().to_string();
        let number = parse_field_number(inner.next().unwrap())?;

        let options = match inner.next() {
            Some(p) => ProtoOption::parse_options(p.into_inner())?,
            None => vec![],
        };

        Ok(FieldBuilder {
            label: None,
            field_type,
            name,
            number,
            options,
        })
    }

    /// Parses a `map<K, V>` field into a repeated field and its synthesized entry message.
    pub fn parse_map(p: Pair<Rule>) -> Result<(Self, MessageBuilder), ParseError>
    {
        let mut inner = p.into_inner();
        let key_type = parse_field_type(inner.next().unwrap().as_str());
        let value_type = parse_field_type(inner.next().unwrap().as_str());
        let name = inner.next().unwrap().as_str().to_string();
        let number = parse_field_number(inner.next().unwrap())?;
        let options = match inner.next() {
            Some(p) => ProtoOption::parse_options(p.into_inner())?,
            None => vec![],
        };

        let entry_name = map_entry_name(&name);
        let entry_field = |name: &str, number, field_type| FieldBuilder {
            label: Some(Label::Optional),
            field_type,
            name: name.to_string(),
            number,
            options: vec![],
        };
        let entry = MessageBuilder {
            name: entry_name.clone(),
            fields: vec![
                entry_field("key", 1, key_type),
                entry_field("value", 2, value_type),
            ],
            ..Default::default()
        };

        let field = FieldBuilder {
            label: Some(Label::Repeated),
            field_type: FieldTypeBuilder::Unknown(entry_name),
            name,
            number,
            options,
        };
        Ok((field, entry))
    }
}

/// `my_field` becomes `MyFieldEntry`.
fn map_entry_name(field_name: &str) -> String
{
    let mut name = String::with_capacity(field_name.len() + 5);
    let mut upper = true;
    for c in field_name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            name.extend(c.to_uppercase());
            upper = false;
        } else {
            name.push(c);
        }
    }
    name.push_str("Entry");
    name
}

fn parse_field_type(t: &str) -> FieldTypeBuilder
{
    FieldTypeBuilder::Builtin(match t {
        "double" => ValueType::Double,
        "float" => ValueType::Float,
        "int32" => ValueType::Int32,
        "int64" => ValueType::Int64,
        "uint32" => ValueType::UInt32,
        "uint64" => ValueType::UInt64,
        "sint32" => ValueType::SInt32,
        "sint64" => ValueType::SInt64,
        "fixed32" => ValueType::Fixed32,
        "fixed64" => ValueType::Fixed64,
        "sfixed32" => ValueType::SFixed32,
        "sfixed64" => ValueType::SFixed64,
        "bool" => ValueType::Bool,
        "string" => ValueType::String,
        "bytes" => ValueType::Bytes,
        _ => return FieldTypeBuilder::Unknown(t.to_string()),
    })
}

fn parse_extension_range(p: Pair<Rule>) -> Result<ExtensionRange, ParseError>
{
    let literal = p.as_str().to_string();
    let mut inner = p.into_inner();
    let start = parse_uint_literal(inner.next().unwrap())?;
    let last = match inner.next() {
        Some(end) if end.as_rule() == Rule::maxKw => MAX_FIELD_NUMBER,
        Some(end) => parse_uint_literal(end)?,
        None => start,
    };

    // Ranges are inclusive in the file and half-open in the context.
    match (start, last) {
        (1..=MAX_FIELD_NUMBER, _) if (start..=MAX_FIELD_NUMBER).contains(&last) => {
            Ok(ExtensionRange {
                start,
                end: last + 1,
            })
        }
        _ => Err(ParseError::InvalidLiteral { literal }),
    }
}

fn parse_field_number(p: Pair<Rule>) -> Result<u64, ParseError>
{
    let literal = p.as_str().to_string();
    let number = parse_uint_literal(p.into_inner().next().unwrap())?;
    match number {
        1..=MAX_FIELD_NUMBER => Ok(number),
        _ => Err(ParseError::InvalidLiteral { literal }),
    }
}

/// Splits an `intLit` into its sign and magnitude.
fn parse_int_parts(p: Pair<Rule>) -> Result<(bool, u64), ParseError>
{
    let literal = p.as_str().to_string();
    let mut inner = p.into_inner();
    let mut lit = inner.next().unwrap();
    let mut negative = false;
    if lit.as_rule() == Rule::sign {
        negative = lit.as_str() == "-";
        lit = inner.next().unwrap();
    }

    let magnitude = match lit.as_rule() {
        Rule::decimalLit => lit.as_str().parse::<u64>().ok(),
        Rule::hexLit => u64::from_str_radix(&lit.as_str()[2..], 16).ok(),
        Rule::octalLit => match &lit.as_str()[1..] {
            "" => Some(0),
            digits => u64::from_str_radix(digits, 8).ok(),
        },
        r => unreachable!("{:?}: {:?}", r, lit),
    };

    magnitude
        .map(|m| (negative, m))
        .ok_or(ParseError::InvalidLiteral { literal })
}

fn parse_uint_literal(p: Pair<Rule>) -> Result<u64, ParseError>
{
    let literal = p.as_str().to_string();
    match parse_int_parts(p)? {
        (false, value) | (true, value @ 0) => Ok(value),
        (true, _) => Err(ParseError::InvalidLiteral { literal }),
    }
}

fn parse_int_literal(p: Pair<Rule>) -> Result<i64, ParseError>
{
    let literal = p.as_str().to_string();
    let (negative, magnitude) = parse_int_parts(p)?;
    let value = match negative {
        true => -i128::from(magnitude),
        false => i128::from(magnitude),
    };
    i64::try_from(value).map_err(|_| ParseError::InvalidLiteral { literal })
}

fn parse_float_literal(p: Pair<Rule>) -> Result<f64, ParseError>
{
    let text = p.as_str();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let value = match unsigned {
        "inf" => f64::INFINITY,
        "nan" => f64::NAN,
        other => other.parse::<f64>().map_err(|_| ParseError::InvalidLiteral {
            literal: text.to_string(),
        })?,
    };
    Ok(if negative { -value } else { value })
}

impl ProtoOption
{
    fn parse(p: Pair<Rule>) -> Result<Self, ParseError>
    {
        let mut inner = p.into_inner();
        Ok(Self {
            name: parse_ident(inner.next().unwrap()),
            value: Constant::parse(inner.next().unwrap())?,
        })
    }

    fn parse_options(pairs: Pairs<Rule>) -> Result<Vec<Self>, ParseError>
    {
        pairs
            .map(|p| match p.as_rule() {
                Rule::fieldOption => Self::parse(p),
                Rule::enumValueOption => Self::parse(p),
                r => unreachable!("{:?}: {:?}", r, p),
            })
            .collect()
    }
}

impl Constant
{
    fn parse(p: Pair<Rule>) -> Result<Self, ParseError>
    {
        let p = p.into_inner().next().unwrap();
        Ok(match p.as_rule() {
            Rule::fullIdent => Constant::Ident(parse_ident(p)),
            Rule::intLit => Constant::Integer(parse_int_literal(p)?),
            Rule::floatLit => Constant::Float(parse_float_literal(p)?),
            Rule::strLit => Constant::String(parse_string_literal(p)?),
            Rule::boolLit => Constant::Bool(p.as_str() == "true"),
            Rule::aggregate => Constant::Aggregate(p.as_str().to_string()),
            r => unreachable!("{:?}: {:?}", r, p),
        })
    }
}

fn parse_ident(p: Pair<Rule>) -> String
{
    let mut ident = vec![];
    for part in p.into_inner() {
        match part.as_rule() {
            Rule::ident => ident.push(part.as_str().to_string()),
            Rule::fullIdent => ident.push(format!("({})", part.as_str())),
            r => unreachable!("{:?}: {:?}", r, part),
        }
    }

    ident.join(".")
}

fn parse_string_literal(s: Pair<Rule>) -> Result<Bytes, ParseError>
{
    let literal = s.as_str().to_string();
    let invalid = || ParseError::InvalidLiteral {
        literal: literal.clone(),
    };

    let mut output = BytesMut::new();
    for c in s.into_inner() {
        let c = c.into_inner().next().unwrap();
        match c.as_rule() {
            Rule::hexEscape => {
                let digits = c.into_inner().next().unwrap().as_str();
                output.put_u8(u8::from_str_radix(digits, 16).map_err(|_| invalid())?);
            }
            Rule::octEscape => {
                let digits = c.into_inner().next().unwrap().as_str();
                output.put_u8(u8::from_str_radix(digits, 8).map_err(|_| invalid())?);
            }
            Rule::charEscape => match c.into_inner().next().unwrap().as_str() {
                "a" => output.put_u8(0x07),
                "b" => output.put_u8(0x08),
                "f" => output.put_u8(0x0C),
                "n" => output.put_u8(0x0A),
                "r" => output.put_u8(0x0D),
                "t" => output.put_u8(0x09),
                "v" => output.put_u8(0x0B),
                "\\" => output.put_u8(0x5C),
                "\'" => output.put_u8(0x27),
                "\"" => output.put_u8(0x22),
                o => unreachable!("Invalid escape sequence \\{}", o),
            },
            Rule::anyChar => output.put(c.as_str().as_bytes()),
            r => unreachable!("{:?}: {:?}", r, c),
        }
    }
    Ok(output.freeze())
}
