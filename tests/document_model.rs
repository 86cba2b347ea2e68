use std::sync::Arc;

use kdlish::{CommentHandling, Document, Error, ParseOptions, TextWriter, TokenKind};

fn parse(input: &str) -> Document {
    Document::parse(input.as_bytes(), &ParseOptions::default()).unwrap()
}

fn rewrite(doc: &Document) -> String {
    let mut writer = TextWriter::new();
    doc.write_to(&mut writer).unwrap();
    writer.finish()
}

#[test]
fn flat_object_navigation() {
    let doc = parse(r#"{"a":1,"b":"x"}"#);
    let root = doc.root().unwrap();
    assert_eq!(root.kind().unwrap(), TokenKind::StartObject);
    assert_eq!(root.property_count().unwrap(), 2);

    let first = root.get_property(0).unwrap();
    assert_eq!(first.name_text().unwrap(), "a");
    assert_eq!(first.value.kind().unwrap(), TokenKind::Number);
    assert_eq!(first.value.try_get_number::<i32>().unwrap(), Some(1));

    let second = root.get_property(1).unwrap();
    assert_eq!(second.value.get_string().unwrap().as_deref(), Some("x"));
}

#[test]
fn simple_array_random_access() {
    let doc = parse("[1,2,3]");
    let root = doc.root().unwrap();
    assert_eq!(root.kind().unwrap(), TokenKind::StartArray);
    assert_eq!(root.array_len().unwrap(), 3);

    let third = root.array_element(2).unwrap();
    assert_eq!(third.kind().unwrap(), TokenKind::Number);
    assert_eq!(third.raw_value(false).unwrap(), b"3");
}

#[test]
fn nested_array_walks_children() {
    let doc = parse("[1,[2,3],4]");
    let root = doc.root().unwrap();
    assert_eq!(root.array_len().unwrap(), 3);

    let middle = root.array_element(1).unwrap();
    assert_eq!(middle.kind().unwrap(), TokenKind::StartArray);
    assert_eq!(middle.array_len().unwrap(), 2);

    let last = root.array_element(2).unwrap();
    assert_eq!(last.try_get_number::<i32>().unwrap(), Some(4));
}

#[test]
fn escaped_string_document() {
    let doc = parse(r#""a\nb""#);
    let root = doc.root().unwrap();
    assert_eq!(root.kind().unwrap(), TokenKind::String);
    assert_eq!(root.get_string().unwrap().as_deref(), Some("a\nb"));
    assert_eq!(root.raw_value(true).unwrap(), br#""a\nb""#);
    assert!(root.value_equals("a\nb").unwrap());
    assert!(!root.value_equals("a\\nb").unwrap());
}

#[test]
fn empty_array() {
    let doc = parse("[]");
    let root = doc.root().unwrap();
    assert_eq!(root.kind().unwrap(), TokenKind::StartArray);
    assert_eq!(root.array_len().unwrap(), 0);
    assert_eq!(root.items().unwrap().count(), 0);
    assert!(root.array_element(0).is_err());
}

#[test]
fn clone_survives_parent_disposal() {
    let mut doc = parse("[1,[2,3],4]");
    let clone = doc.root().unwrap().clone_subtree().unwrap();
    doc.dispose();
    assert!(doc.root().is_err());

    let root = clone.root().unwrap();
    assert_eq!(root.array_len().unwrap(), 3);
    let last = root.array_element(2).unwrap();
    assert_eq!(last.kind().unwrap(), TokenKind::Number);
    assert_eq!(last.raw_value(false).unwrap(), b"4");
}

#[test]
fn clone_of_clone_is_independent() {
    let doc = parse(r#"{"a":{"b":[1,2]}}"#);
    let inner = doc
        .root()
        .unwrap()
        .get_property_value("a")
        .unwrap()
        .unwrap()
        .clone_subtree()
        .unwrap();
    let mut deeper = inner
        .root()
        .unwrap()
        .get_property_value("b")
        .unwrap()
        .unwrap()
        .clone_subtree()
        .unwrap();
    drop(inner);
    // Clones ignore dispose entirely.
    deeper.dispose();
    assert_eq!(deeper.root().unwrap().array_len().unwrap(), 2);
}

#[test]
fn writer_round_trip_preserves_shape_and_payloads() {
    let input = r#"{"name":"Ada \"the first\"","tags":["a\tb",null,true,false],"n":-1.25e2,"nested":{"empty":[],"blank":{}}}"#;
    let doc = parse(input);
    let output = rewrite(&doc);

    let expected: serde_json::Value = serde_json::from_str(input).unwrap();
    let actual: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(expected, actual);

    // A second trip through the writer is a fixed point.
    let doc2 = parse(&output);
    assert_eq!(rewrite(&doc2), output);
}

#[test]
fn write_single_element_subtree() {
    let doc = parse(r#"{"a":[1,{"b":"x\ny"}]}"#);
    let value = doc
        .root()
        .unwrap()
        .get_property_value("a")
        .unwrap()
        .unwrap();
    let mut writer = TextWriter::new();
    value.write_to(&mut writer).unwrap();
    assert_eq!(writer.finish(), r#"[1,{"b":"x\ny"}]"#);
}

#[test]
fn raw_round_trip_reparses() {
    let doc = parse(r#"{"outer":[1,{"inner":"a\nb"},[2]]}"#);
    let array = doc
        .root()
        .unwrap()
        .get_property_value("outer")
        .unwrap()
        .unwrap();
    let raw = array.raw_value(true).unwrap().to_vec();
    let reparsed = Document::parse(&raw, &ParseOptions::default()).unwrap();
    assert_eq!(reparsed.root().unwrap().array_len().unwrap(), 3);
    assert_eq!(
        rewrite(&reparsed),
        {
            let mut writer = TextWriter::new();
            array.write_to(&mut writer).unwrap();
            writer.finish()
        }
    );
}

#[test]
fn shared_buffer_documents() {
    let bytes: Arc<[u8]> = Arc::from(br#"{"k":[true,false]}"#.as_slice());
    let mut doc = Document::parse_shared(bytes.clone(), &ParseOptions::default()).unwrap();
    let value = doc
        .root()
        .unwrap()
        .get_property_value("k")
        .unwrap()
        .unwrap();
    assert!(value.array_element(0).unwrap().as_bool().unwrap());
    doc.dispose();
    // The caller's reference is unaffected by disposal.
    assert_eq!(&bytes[..4], br#"{"k""#);
}

#[test]
fn dispose_is_idempotent_and_fails_deterministically() {
    let mut doc = parse(r#"{"secret":"hunter2"}"#);
    doc.dispose();
    doc.dispose();
    assert!(matches!(doc.root(), Err(Error::Disposed)));
    assert!(matches!(doc.write_to(&mut TextWriter::new()), Err(Error::Disposed)));
}

#[test]
fn comment_handling_modes() {
    let input = "// header\n[1, /* two */ 2]";
    assert!(Document::parse(input.as_bytes(), &ParseOptions::default()).is_err());

    let skip = ParseOptions::new().with_comment_handling(CommentHandling::Skip);
    let doc = Document::parse(input.as_bytes(), &skip).unwrap();
    assert_eq!(doc.root().unwrap().array_len().unwrap(), 2);

    let allow = ParseOptions::new().with_comment_handling(CommentHandling::Allow);
    assert!(matches!(
        Document::parse(b"[1]", &allow),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn max_depth_is_configurable() {
    let input = r#"{"a":{"b":{"c":1}}}"#;
    let shallow = ParseOptions::new().with_max_depth(2);
    assert!(Document::parse(input.as_bytes(), &shallow).is_err());
    let deep = ParseOptions::new().with_max_depth(3);
    assert!(Document::parse(input.as_bytes(), &deep).is_ok());
}

#[test]
fn root_scalars() {
    assert_eq!(
        parse("42").root().unwrap().try_get_number::<i64>().unwrap(),
        Some(42)
    );
    assert!(parse("true").root().unwrap().as_bool().unwrap());
    assert_eq!(parse("null").root().unwrap().kind().unwrap(), TokenKind::Null);
    assert_eq!(
        parse(r#""lone""#).root().unwrap().get_string().unwrap().as_deref(),
        Some("lone")
    );
}

#[test]
fn error_surface() {
    // Parse faults carry the failing offset.
    match Document::parse(b"[1,]", &ParseOptions::default()) {
        Err(Error::Parse { offset, .. }) => assert_eq!(offset, 3),
        other => panic!("expected parse error, got {other:?}"),
    }

    let doc = parse(r#"{"a":1}"#);
    let root = doc.root().unwrap();
    assert!(matches!(root.array_len(), Err(Error::WrongKind { .. })));
    assert!(matches!(
        root.get_property_value("a").unwrap().unwrap().get_string(),
        Err(Error::WrongKind { .. })
    ));
}

#[test]
fn unicode_payloads() {
    let doc = parse(r#"{"emoji":"😀","direct":"snow☃man"}"#);
    let root = doc.root().unwrap();
    assert_eq!(
        root.get_property_value("emoji").unwrap().unwrap().get_string().unwrap().as_deref(),
        Some("\u{1F600}")
    );
    let direct = root.get_property_value("direct").unwrap().unwrap();
    assert_eq!(direct.get_string().unwrap().as_deref(), Some("snow\u{2603}man"));
    assert!(direct.value_equals("snow\u{2603}man").unwrap());
}
