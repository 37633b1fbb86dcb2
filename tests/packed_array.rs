use bytes::{BufMut, BytesMut};
use protofs::{decode, Context, DecodeError, ValueTree};

fn leaf_texts(tree: &ValueTree) -> Vec<(String, String)>
{
    tree.root_directory()
        .list_children()
        .map(|(name, node)| (name.to_string(), node.as_leaf().unwrap().text().into_owned()))
        .collect()
}

#[test]
fn repeated()
{
    let context = Context::parse(&[r#"
      syntax = "proto3";
      message Message {
          repeated string s = 1;
          repeated int32 small = 2;
          repeated int32 large = 3;
      }
    "#])
    .unwrap();

    let mut payload = BytesMut::new();

    payload.put_u8(1 << 3 | 2); // String tag.
    payload.put_u8(11);
    payload.put_slice(b"first value");

    payload.put_u8(1 << 3 | 2); // String tag.
    payload.put_u8(12);
    payload.put_slice(b"second value");

    payload.put_u8(2 << 3 | 2); // Packed integer array.
    payload.put_slice(b"\x06"); // Length
    payload.put_slice(b"\x01");
    payload.put_slice(b"\x80\x01");
    payload.put_slice(b"\x80\x80\x02");

    payload.put_u8(3 << 3 | 2); // Packed integer array.
    payload.put_slice(b"\x80\x01"); // Length
    payload.put_slice(&(b"\x01".repeat(128)));

    let tree = decode(&[&payload[..]], "Message", &context).unwrap();
    let leaves = leaf_texts(&tree);
    assert_eq!(leaves.len(), 2 + 3 + 128);

    assert_eq!(
        &leaves[..5],
        &[
            ("s_1".to_string(), "first value".to_string()),
            ("s_2".to_string(), "second value".to_string()),
            ("small_1".to_string(), "1".to_string()),
            ("small_2".to_string(), (1 << 7).to_string()),
            ("small_3".to_string(), (1 << 15).to_string()),
        ]
    );
    assert_eq!(leaves[5], ("large_1".to_string(), "1".to_string()));
    assert_eq!(leaves[132], ("large_128".to_string(), "1".to_string()));
}

#[test]
fn packed_and_unpacked_mixed()
{
    // Proto2 fields are unpacked by default but must accept packed payloads and vice versa.
    let context = Context::parse(&[r#"
      syntax = "proto2";
      message Message {
          repeated uint32 plain = 1;
          repeated sint64 packed = 2 [packed = true];
      }
    "#])
    .unwrap();

    let mut payload = BytesMut::new();
    payload.put_u8(1 << 3); // Unpacked varint.
    payload.put_u8(7);
    payload.put_u8(1 << 3 | 2); // Packed varints for an unpacked field.
    payload.put_slice(b"\x02\x08\x09");
    payload.put_u8(2 << 3); // Unpacked varint for a packed field.
    payload.put_u8(3);
    payload.put_u8(2 << 3 | 2);
    payload.put_slice(b"\x01\x04");

    let tree = decode(&[&payload[..]], "Message", &context).unwrap();
    assert_eq!(
        leaf_texts(&tree),
        vec![
            ("plain_1".to_string(), "7".to_string()),
            ("plain_2".to_string(), "8".to_string()),
            ("plain_3".to_string(), "9".to_string()),
            ("packed_1".to_string(), "-2".to_string()),
            ("packed_2".to_string(), "2".to_string()),
        ]
    );
}

#[test]
fn fixed_width()
{
    let context = Context::parse(&[r#"
      syntax = "proto3";
      message Message {
          repeated fixed32 f = 1;
          repeated double d = 2;
          repeated bool b = 3;
      }
    "#])
    .unwrap();

    let mut payload = BytesMut::new();
    payload.put_u8(1 << 3 | 2);
    payload.put_u8(8);
    payload.put_u32_le(1);
    payload.put_u32_le(u32::MAX);
    payload.put_u8(2 << 3 | 2);
    payload.put_u8(8);
    payload.put_f64_le(-0.5);
    payload.put_u8(3 << 3 | 2);
    payload.put_u8(2);
    payload.put_slice(b"\x01\x00");

    let tree = decode(&[&payload[..]], "Message", &context).unwrap();
    assert_eq!(
        leaf_texts(&tree),
        vec![
            ("f_1".to_string(), "1".to_string()),
            ("f_2".to_string(), u32::MAX.to_string()),
            ("d_1".to_string(), "-0.500000".to_string()),
            ("b_1".to_string(), "True".to_string()),
            ("b_2".to_string(), "False".to_string()),
        ]
    );
}

#[test]
fn corrupt()
{
    let context = Context::parse(&[r#"
      syntax = "proto3";
      message Message {
          repeated int32 i = 1;
          repeated fixed64 f = 2;
      }
    "#])
    .unwrap();

    // The last varint never terminates.
    let err = decode(&[b"\x0a\x03\x01\x02\x80"], "Message", &context).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::CorruptPackedField { ref field, remaining: 1 } if field == "i"
    ));

    // Twelve bytes is one and a half fixed64 values.
    let mut payload = BytesMut::new();
    payload.put_u8(2 << 3 | 2);
    payload.put_u8(12);
    payload.put_u64_le(1);
    payload.put_u32_le(2);
    let err = decode(&[&payload[..]], "Message", &context).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::CorruptPackedField { ref field, remaining: 4 } if field == "f"
    ));
}

#[test]
fn large_packed_payload()
{
    let context = Context::parse(&[r#"
      syntax = "proto3";
      message Message {
          repeated int32 i = 1;
      }
    "#])
    .unwrap();

    let count = 100_000;
    let mut payload = BytesMut::new();
    payload.put_u8(1 << 3 | 2);
    payload.put_slice(b"\xa0\x8d\x06"); // Length 100000
    payload.put_slice(&b"\x07".repeat(count));

    let tree = decode(&[&payload[..]], "Message", &context).unwrap();
    let root = tree.root_directory();
    assert_eq!(root.len(), count);
    assert_eq!(root.get("i_1").unwrap().as_leaf().unwrap().text(), "7");
    assert_eq!(
        root.get(&format!("i_{}", count))
            .unwrap()
            .as_leaf()
            .unwrap()
            .text(),
        "7"
    );
}
