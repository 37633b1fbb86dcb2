#[test]
fn parse()
{
    use protofs::context::{
        Constant, Context, Label, MessageField, MessageInfo, Package, ProtoOption, TypeParent,
        ValueType,
    };

    let context = Context::parse(&[r#"
      syntax = "proto3";
      message Message {
          string s = 1;
          repeated bytes b = 2;
          optional int64 large = 3;
          repeated sint32 signed = 4;
          repeated fixed32 unpacked = 5 [packed = false];
          Message child = 10;
      }
    "#])
    .unwrap();

    let mut expected = Context::new();
    let package = expected.insert_package(Package::new(None)).unwrap();
    let mut message = MessageInfo::new("Message".to_string(), TypeParent::Package(package));

    message
        .add_field(MessageField::new("s".to_string(), 1, ValueType::String))
        .unwrap();

    let b_field = MessageField::repeated("b".to_string(), 2, ValueType::Bytes, false);
    let large_field = MessageField::new("large".to_string(), 3, ValueType::Int64);
    let signed_field = MessageField::repeated("signed".to_string(), 4, ValueType::SInt32, true);

    let mut unpacked_field =
        MessageField::repeated("unpacked".to_string(), 5, ValueType::Fixed32, false);
    unpacked_field.options.push(ProtoOption {
        name: "packed".to_string(),
        value: Constant::Bool(false),
    });

    let child_field = MessageField::new(
        "child".to_string(),
        10,
        ValueType::Message(message.self_ref),
    );

    message.add_field(b_field).unwrap();
    message.add_field(large_field).unwrap();
    message.add_field(signed_field).unwrap();
    message.add_field(unpacked_field).unwrap();
    message.add_field(child_field).unwrap();

    expected.insert_message(message).unwrap();

    assert_eq!(expected, context);

    let signed = context
        .get_message("Message")
        .unwrap()
        .get_field_by_name("signed")
        .unwrap();
    assert_eq!(signed.label, Label::Repeated);
    assert!(signed.packed);
}

#[test]
fn proto2_labels()
{
    use protofs::context::{Context, Label};

    let context = Context::parse(&[r#"
      syntax = "proto2";
      package two;
      message Message {
          required int32 id = 1;
          optional string name = 2;
          repeated uint32 plain = 3;
          repeated uint32 packed = 4 [packed = true];
      }
    "#])
    .unwrap();

    let msg = context.get_message(".two.Message").unwrap();
    let labels: Vec<_> = msg.iter_fields().map(|f| (f.label, f.packed)).collect();
    assert_eq!(
        labels,
        vec![
            (Label::Required, false),
            (Label::Optional, false),
            (Label::Repeated, false),
            (Label::Repeated, true),
        ]
    );
}

#[test]
fn map_fields()
{
    use protofs::context::{Context, Label, ValueType};

    let context = Context::parse(&[r#"
      syntax = "proto3";
      package maps;
      enum Color { RED = 0; GREEN = 1; }
      message Palette {
          map<string, Color> colors = 1;
      }
    "#])
    .unwrap();

    let palette = context.get_message("maps.Palette").unwrap();
    let entry = context.get_message("maps.Palette.ColorsEntry").unwrap();
    let color = context.get_enum("maps.Color").unwrap();

    let colors = palette.get_field(1).unwrap();
    assert_eq!(colors.name, "colors");
    assert_eq!(colors.label, Label::Repeated);
    assert_eq!(colors.field_type, ValueType::Message(entry.self_ref));

    assert_eq!(entry.get_field(1).unwrap().field_type, ValueType::String);
    assert_eq!(
        entry.get_field_by_name("value").unwrap().field_type,
        ValueType::Enum(color.self_ref)
    );
}

#[test]
fn errors()
{
    use protofs::context::{Context, ParseError};

    let cases = [
        ("message A { B b = 1; }", "TypeNotFound"),
        ("message A {} message A {}", "DuplicateType"),
        ("message A { optional int32 a = 1; optional int32 b = 1; }", "DuplicateField"),
        ("message A { optional int32 a = 99999999999; }", "InvalidLiteral"),
        ("message A { extensions 5 to 10; } extend A { optional int32 x = 11; }", "InvalidExtension"),
        (
            "message A { extensions 5 to 10; } extend A { optional int32 x = 5; optional int32 y = 5; }",
            "DuplicateExtension",
        ),
        ("enum E { A = 0; } extend E { optional int32 x = 1; }", "InvalidTypeKind"),
        ("message A { int32 a = 1 }", "SyntaxError"),
        ("enum E { A = 0; B = 1; A = 2; }", "DuplicateEnumValue"),
        ("enum E { option allow_alias = true; A = 0; B = 0; B = 1; }", "DuplicateEnumValue"),
        ("message A { extensions 1 to 18446744073709551615; }", "InvalidLiteral"),
    ];

    for (input, expected) in &cases {
        let err = Context::parse(&[*input]).unwrap_err();
        let kind = match err {
            ParseError::TypeNotFound { .. } => "TypeNotFound",
            ParseError::DuplicateType { .. } => "DuplicateType",
            ParseError::DuplicateField { .. } => "DuplicateField",
            ParseError::DuplicateEnumValue { .. } => "DuplicateEnumValue",
            ParseError::InvalidLiteral { .. } => "InvalidLiteral",
            ParseError::InvalidExtension { .. } => "InvalidExtension",
            ParseError::DuplicateExtension { .. } => "DuplicateExtension",
            ParseError::InvalidTypeKind { .. } => "InvalidTypeKind",
            ParseError::SyntaxError { .. } => "SyntaxError",
            _ => "other",
        };
        assert_eq!(kind, *expected, "{}", input);
    }
}
