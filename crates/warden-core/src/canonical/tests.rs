//! Tests for canonical serialization.

use serde::Serialize;
use serde_json::{Value, json};

use super::*;

#[test]
fn object_keys_sort_lexicographically() {
    let bytes = to_canonical_bytes(&json!({"z": 1, "a": 2, "m": 3})).unwrap();
    assert_eq!(bytes, br#"{"a":2,"m":3,"z":1}"#);
}

#[test]
fn arrays_preserve_insertion_order() {
    let bytes = to_canonical_bytes(&json!(["z", "a", "m"])).unwrap();
    assert_eq!(bytes, br#"["z","a","m"]"#);
}

#[test]
fn nested_objects_sort_at_every_level() {
    let bytes = to_canonical_bytes(&json!({"b": {"y": 1, "x": 2}, "a": [3, 4]})).unwrap();
    assert_eq!(bytes, br#"{"a":[3,4],"b":{"x":2,"y":1}}"#);
}

#[test]
fn no_whitespace_between_tokens() {
    let bytes = to_canonical_bytes(&json!({"k": [1, 2], "l": true})).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(!text.contains(' '));
}

#[test]
fn primitives_match_json_literals() {
    assert_eq!(to_canonical_bytes(&Value::Null).unwrap(), b"null");
    assert_eq!(to_canonical_bytes(&json!(true)).unwrap(), b"true");
    assert_eq!(to_canonical_bytes(&json!(false)).unwrap(), b"false");
    assert_eq!(to_canonical_bytes(&json!(0)).unwrap(), b"0");
    assert_eq!(to_canonical_bytes(&json!(-42)).unwrap(), b"-42");
}

#[test]
fn strings_use_minimal_escaping() {
    let bytes = to_canonical_bytes(&json!("a\"b\\c\nd")).unwrap();
    assert_eq!(bytes, br#""a\"b\\c\nd""#);

    let bytes = to_canonical_bytes(&json!("\u{01}")).unwrap();
    assert_eq!(bytes, br#""\u0001""#);
}

#[test]
fn floats_are_rejected() {
    assert_eq!(
        to_canonical_bytes(&json!(1.5)),
        Err(CanonicalError::FloatNotAllowed)
    );
}

#[test]
fn depth_limit_enforced() {
    let mut tree = json!("leaf");
    for _ in 0..(MAX_DEPTH + 2) {
        tree = json!([tree]);
    }
    assert_eq!(
        value_to_canonical_bytes(&tree),
        Err(CanonicalError::DepthExceeded)
    );
}

#[test]
fn struct_field_order_does_not_matter() {
    #[derive(Serialize)]
    struct Forward {
        alpha: u64,
        beta: String,
    }

    #[derive(Serialize)]
    struct Reversed {
        beta: String,
        alpha: u64,
    }

    let a = Forward {
        alpha: 7,
        beta: "x".to_string(),
    };
    let b = Reversed {
        beta: "x".to_string(),
        alpha: 7,
    };

    assert_eq!(
        to_canonical_bytes(&a).unwrap(),
        to_canonical_bytes(&b).unwrap()
    );
    assert_eq!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
}

#[test]
fn sha256_hex_known_vector() {
    // SHA-256 of the empty string.
    assert_eq!(
        sha256_hex(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn canonical_hash_is_stable_across_calls() {
    let tree = json!({"command": "echo", "args": ["t1"]});
    assert_eq!(
        canonical_hash(&tree).unwrap(),
        canonical_hash(&tree).unwrap()
    );
}
