#[test]
fn oneof()
{
    use protofs::{decode, Context};

    let context = Context::parse(&[r#"
      syntax = "proto3";
      message Message {
          oneof a {
            string a1 = 1;
            string a2 = 2;
            string a3 = 3;
          };
          oneof b {
            uint32 b1 = 4;
            uint32 b2 = 5;
            uint32 b3 = 6;
          }
      }
    "#])
    .unwrap();

    // Oneof members are plain optional fields of the message.
    let msg = context.get_message("Message").unwrap();
    assert_eq!(msg.iter_fields().count(), 6);

    let tree = decode(&[b"\x12\x03two\x30\x06"], "Message", &context).unwrap();
    let root = tree.root_directory();
    let names: Vec<_> = root.list_children().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["a2", "b3"]);
    assert_eq!(tree.lookup("b3").unwrap().as_leaf().unwrap().text(), "6");
}
