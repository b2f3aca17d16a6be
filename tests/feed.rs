//! Feed-style bundle parsing: the fixed wrapper, the text title leaf and
//! typed entries.

use saxtree::{Error, Event, Location, Node, Schema, SchemaBuilder};

const L: Location = Location::UNKNOWN;

fn schema() -> Schema {
    let mut b = SchemaBuilder::new();
    let string_ty = b.primitive("string");
    let patient = b.resource("Patient");
    b.child(patient, "active", string_ty);
    b.build()
}

fn text(data: &str) -> Event {
    Event::Text {
        data: data.into(),
        location: L,
    }
}

#[test]
fn wrapper_must_be_named_feed() {
    let schema = schema();
    let mut p = saxtree::Parser::feed(&schema);

    let err = p.begin_element("bundle", L).unwrap_err();
    assert!(matches!(
        err,
        Error::UnexpectedWrapper {
            expected: "feed",
            found,
            ..
        } if found == "bundle"
    ));
}

#[test]
fn title_text_chunks_concatenate() {
    let schema = schema();
    let mut p = saxtree::Parser::feed(&schema);

    p.begin_element("feed", L).unwrap();
    p.begin_element("title", L).unwrap();
    p.other(text("Search ")).unwrap();
    p.other(text("results")).unwrap();
    p.end_element("title", L).unwrap();
    p.end_element("feed", L).unwrap();

    let doc = p.finish().unwrap();
    match doc.root() {
        Node::Feed { title, entries } => {
            assert_eq!(title.as_deref(), Some("Search results"));
            assert!(entries.is_empty());
        }
        other => panic!("unexpected node: {other:?}"),
    }
}

#[test]
fn nested_structure_inside_title_is_skipped() {
    let schema = schema();
    let mut p = saxtree::Parser::feed(&schema);

    p.begin_element("feed", L).unwrap();
    p.begin_element("title", L).unwrap();
    p.other(text("Search")).unwrap();
    p.begin_element("b", L).unwrap();
    p.other(text("bold noise")).unwrap();
    p.end_element("b", L).unwrap();
    p.other(text(" results")).unwrap();
    p.end_element("title", L).unwrap();
    p.end_element("feed", L).unwrap();

    let doc = p.finish().unwrap();
    match doc.root() {
        Node::Feed { title, .. } => assert_eq!(title.as_deref(), Some("Search results")),
        other => panic!("unexpected node: {other:?}"),
    }
}

#[test]
fn entries_collect_in_arrival_order() {
    let schema = schema();
    let mut p = saxtree::Parser::feed(&schema);

    p.begin_element("feed", L).unwrap();
    for active in ["true", "false"] {
        p.begin_element("Patient", L).unwrap();
        p.begin_element("active", L).unwrap();
        p.attribute("value", active).unwrap();
        p.end_element("active", L).unwrap();
        p.end_element("Patient", L).unwrap();
    }
    p.end_element("feed", L).unwrap();

    let doc = p.finish().unwrap();
    let entries = match doc.root() {
        Node::Feed { entries, .. } => entries.clone(),
        other => panic!("unexpected node: {other:?}"),
    };
    assert_eq!(entries.len(), 2);
    assert_eq!(doc.primitive(entries[0], "active"), Some("true"));
    assert_eq!(doc.primitive(entries[1], "active"), Some("false"));
}

#[test]
fn unrecognized_feed_elements_are_skipped_whole() {
    let schema = schema();
    let mut p = saxtree::Parser::feed(&schema);

    p.begin_element("feed", L).unwrap();
    // The whole subtree vanishes, including nested unknown structure.
    p.begin_element("author", L).unwrap();
    p.begin_element("name", L).unwrap();
    p.other(text("HL7")).unwrap();
    p.end_element("name", L).unwrap();
    p.end_element("author", L).unwrap();
    p.begin_element("Patient", L).unwrap();
    p.end_element("Patient", L).unwrap();
    p.end_element("feed", L).unwrap();

    let doc = p.finish().unwrap();
    match doc.root() {
        Node::Feed { title, entries } => {
            assert_eq!(*title, None);
            assert_eq!(entries.len(), 1);
        }
        other => panic!("unexpected node: {other:?}"),
    }
}

#[test]
fn completeness_flips_at_the_wrapper_end() {
    let schema = schema();
    let mut p = saxtree::Parser::feed(&schema);

    p.begin_element("feed", L).unwrap();
    p.begin_element("Patient", L).unwrap();
    p.end_element("Patient", L).unwrap();
    assert!(!p.is_complete());
    p.end_element("feed", L).unwrap();
    assert!(p.is_complete());
}
