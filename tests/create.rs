#[test]
fn create_context_by_hand()
{
    use protofs::context::{
        Constant, Context, EnumField, EnumInfo, Label, MessageField, MessageInfo, Package,
        ProtoOption, TypeParent, ValueType,
    };

    let parsed_context = Context::parse(&[r#"
        syntax = "proto2";

        package Named;

        message Message {
            required bool immediate = 1;
            repeated int32 numbers = 2 [packed = true];
            oneof a {
                string a1 = 10;
                string a2 = 11;
            };

            enum Inner {
                value1 = 1;
                value2 = 2;
            }

            extensions 100 to 199;
        }

        extend Message {
            optional uint32 extra = 100;
        }
    "#])
    .unwrap();

    let mut handbuilt_context = Context::new();
    let package = handbuilt_context
        .insert_package(Package::new(Some("Named".to_string())))
        .unwrap();
    let mut message = MessageInfo::new("Message".to_string(), TypeParent::Package(package));

    let mut immediate = MessageField::new("immediate".to_string(), 1, ValueType::Bool);
    immediate.label = Label::Required;
    message.add_field(immediate).unwrap();

    let mut numbers = MessageField::repeated("numbers".to_string(), 2, ValueType::Int32, true);
    numbers.options.push(ProtoOption {
        name: "packed".to_string(),
        value: Constant::Bool(true),
    });
    message.add_field(numbers).unwrap();

    // Oneof members are regular optional fields.
    message
        .add_field(MessageField::new("a1".to_string(), 10, ValueType::String))
        .unwrap();
    message
        .add_field(MessageField::new("a2".to_string(), 11, ValueType::String))
        .unwrap();

    message.add_extension_range(100, 200);

    let message_ref = handbuilt_context.insert_message(message).unwrap();

    let mut inner_enum = EnumInfo::new("Inner".to_string(), TypeParent::Message(message_ref));
    inner_enum
        .add_field(EnumField::new("value1".to_string(), 1))
        .unwrap();
    inner_enum
        .add_field(EnumField::new("value2".to_string(), 2))
        .unwrap();

    handbuilt_context.insert_enum(inner_enum).unwrap();

    handbuilt_context
        .insert_extension(
            message_ref,
            MessageField::new("extra".to_string(), 100, ValueType::UInt32),
        )
        .unwrap();

    assert_eq!(parsed_context, handbuilt_context);
}

#[test]
fn decode_with_handbuilt_context()
{
    use protofs::context::{Context, MessageField, MessageInfo, Package, TypeParent, ValueType};

    let mut context = Context::new();
    let package = context.insert_package(Package::new(None)).unwrap();
    let mut message = MessageInfo::new("Point".to_string(), TypeParent::Package(package));
    message
        .add_field(MessageField::new("x".to_string(), 1, ValueType::SInt32))
        .unwrap();
    message
        .add_field(MessageField::repeated(
            "tags".to_string(),
            2,
            ValueType::String,
            false,
        ))
        .unwrap();
    message.add_extension_range(10, 20);
    let point = context.insert_message(message).unwrap();
    context
        .insert_extension(
            point,
            MessageField::new("label".to_string(), 10, ValueType::String),
        )
        .unwrap();

    let tree = point
        .decode(b"\x08\x03\x12\x01a\x52\x02hi\x12\x01b", &context)
        .unwrap();
    assert_eq!(
        tree.to_string(),
        "Point/\n  x = -2\n  tags_1 = a\n  label = hi\n  tags_2 = b\n"
    );
}
