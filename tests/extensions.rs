//! Declared and undeclared extension handling, including the two-step
//! resolution (declared first, generic fallback second) and the
//! value/nested-extensions mutual-exclusion rule.

use saxtree::{Error, Location, Node, NodeId, Schema, SchemaBuilder};

const L: Location = Location::UNKNOWN;

const EYE_COLOUR: &str = "http://example.org/ext/eye-colour";
const SHADE: &str = "http://example.org/ext/eye-colour#shade";
const UNREGISTERED: &str = "http://example.org/ext/unregistered";

fn schema() -> Schema {
    let mut b = SchemaBuilder::new();
    let string_ty = b.primitive("string");
    let reference_ty = b.reference("Reference");
    let patient = b.resource("Patient");
    b.child(patient, "active", string_ty);

    // Generic child set every undeclared extension body accepts.
    b.undeclared_child("valueString", string_ty);
    b.undeclared_child("valueReference", reference_ty);

    let eye = b.declared_extension(patient, EYE_COLOUR, "eyeColour");
    b.extension_child(eye, "valueString", string_ty);
    let shade = b.nested_extension(eye, SHADE, "shade");
    b.extension_child(shade, "valueString", string_ty);

    b.build()
}

fn first_extension(doc: &saxtree::Document) -> NodeId {
    doc.extensions(doc.root_id())[0]
}

#[test]
fn unregistered_url_attaches_a_generic_holder() {
    let schema = schema();
    let mut p = saxtree::Parser::document(&schema);

    p.begin_element("Patient", L).unwrap();
    p.begin_extension(UNREGISTERED, L).unwrap();
    p.begin_element("valueString", L).unwrap();
    p.attribute("value", "blue").unwrap();
    p.end_element("valueString", L).unwrap();
    p.end_element("extension", L).unwrap();
    p.end_element("Patient", L).unwrap();

    let doc = p.finish().unwrap();
    let holder = first_extension(&doc);
    match doc.node(holder) {
        Node::Extension {
            url,
            declared,
            value,
            nested,
        } => {
            assert_eq!(url, UNREGISTERED);
            assert!(!declared);
            assert!(nested.is_empty());
            let value = value.expect("extension should carry a value");
            assert_eq!(doc.node(value).value(), Some("blue"));
        }
        other => panic!("unexpected node: {other:?}"),
    }
}

#[test]
fn undeclared_extensions_nest() {
    let schema = schema();
    let mut p = saxtree::Parser::document(&schema);

    p.begin_element("Patient", L).unwrap();
    p.begin_extension(UNREGISTERED, L).unwrap();
    p.begin_extension("http://example.org/ext/inner", L).unwrap();
    p.begin_element("valueString", L).unwrap();
    p.attribute("value", "deep").unwrap();
    p.end_element("valueString", L).unwrap();
    p.end_element("extension", L).unwrap();
    p.end_element("extension", L).unwrap();
    p.end_element("Patient", L).unwrap();

    let doc = p.finish().unwrap();
    let outer = first_extension(&doc);
    let inner = doc.extensions(outer)[0];
    match doc.node(inner) {
        Node::Extension { url, value, .. } => {
            assert_eq!(url, "http://example.org/ext/inner");
            let value = value.expect("inner extension should carry a value");
            assert_eq!(doc.node(value).value(), Some("deep"));
        }
        other => panic!("unexpected node: {other:?}"),
    }
}

#[test]
fn value_and_nested_extensions_are_mutually_exclusive() {
    let schema = schema();
    let mut p = saxtree::Parser::document(&schema);

    p.begin_element("Patient", L).unwrap();
    p.begin_extension(UNREGISTERED, L).unwrap();
    p.begin_element("valueString", L).unwrap();
    p.attribute("value", "blue").unwrap();
    p.end_element("valueString", L).unwrap();
    p.begin_extension("http://example.org/ext/inner", L).unwrap();
    p.end_element("extension", L).unwrap();
    let err = p.end_element("extension", L).unwrap_err();
    assert!(matches!(err, Error::ExtensionValueConflict { .. }));
}

#[test]
fn value_attribute_inside_extension_body_is_a_structural_error() {
    let schema = schema();
    let mut p = saxtree::Parser::document(&schema);

    p.begin_element("Patient", L).unwrap();
    p.begin_extension(UNREGISTERED, L).unwrap();
    let err = p.attribute("value", "blue").unwrap_err();
    assert!(matches!(err, Error::AttributeInExtension { .. }));
}

#[test]
fn unknown_element_inside_extension_body_is_a_structural_error() {
    let schema = schema();
    let mut p = saxtree::Parser::document(&schema);

    p.begin_element("Patient", L).unwrap();
    p.begin_extension(UNREGISTERED, L).unwrap();
    let err = p.begin_element("valueDecimal", L).unwrap_err();
    assert!(matches!(err, Error::UnknownElement { name, parent: None, .. } if name == "valueDecimal"));
}

#[test]
fn declared_extension_attaches_under_its_field() {
    let schema = schema();
    let mut p = saxtree::Parser::document(&schema);

    p.begin_element("Patient", L).unwrap();
    p.begin_extension(EYE_COLOUR, L).unwrap();
    p.begin_element("valueString", L).unwrap();
    p.attribute("value", "hazel").unwrap();
    p.end_element("valueString", L).unwrap();
    p.end_element("extension", L).unwrap();
    p.end_element("Patient", L).unwrap();

    let doc = p.finish().unwrap();
    // Declared extensions land in a named field, not the generic list.
    assert!(doc.extensions(doc.root_id()).is_empty());
    assert_eq!(doc.primitive(doc.root_id(), "eyeColour"), Some("hazel"));
}

#[test]
fn nested_declared_extension_creates_the_holder_lazily() {
    let schema = schema();
    let mut p = saxtree::Parser::document(&schema);

    p.begin_element("Patient", L).unwrap();
    p.begin_extension(EYE_COLOUR, L).unwrap();
    p.begin_extension(SHADE, L).unwrap();
    p.begin_element("valueString", L).unwrap();
    p.attribute("value", "light").unwrap();
    p.end_element("valueString", L).unwrap();
    p.end_element("extension", L).unwrap();
    p.end_element("extension", L).unwrap();
    p.end_element("Patient", L).unwrap();

    let doc = p.finish().unwrap();
    let holder = doc.child(doc.root_id(), "eyeColour").unwrap();
    match doc.node(holder) {
        Node::Extension {
            url,
            declared,
            value,
            nested,
        } => {
            assert_eq!(url, EYE_COLOUR);
            assert!(declared);
            assert!(value.is_none());
            assert_eq!(nested.len(), 1);
            let shade_value = match doc.node(nested[0]) {
                Node::Extension { value, .. } => value.expect("shade value"),
                other => panic!("unexpected node: {other:?}"),
            };
            assert_eq!(doc.node(shade_value).value(), Some("light"));
        }
        other => panic!("unexpected node: {other:?}"),
    }
}

#[test]
fn unrecognized_url_inside_declared_extension_falls_back_to_generic() {
    let schema = schema();
    let mut p = saxtree::Parser::document(&schema);

    p.begin_element("Patient", L).unwrap();
    p.begin_extension(EYE_COLOUR, L).unwrap();
    p.begin_extension(UNREGISTERED, L).unwrap();
    p.begin_element("valueString", L).unwrap();
    p.attribute("value", "odd").unwrap();
    p.end_element("valueString", L).unwrap();
    p.end_element("extension", L).unwrap();
    p.end_element("extension", L).unwrap();
    p.end_element("Patient", L).unwrap();

    let doc = p.finish().unwrap();
    // The generic holder attaches to the enclosing parent object.
    let holders = doc.extensions(doc.root_id());
    assert_eq!(holders.len(), 1);
    match doc.node(holders[0]) {
        Node::Extension { url, declared, .. } => {
            assert_eq!(url, UNREGISTERED);
            assert!(!declared);
        }
        other => panic!("unexpected node: {other:?}"),
    }
}

#[test]
fn marker_on_unsupporting_node_is_a_silent_no_op() {
    let mut b = SchemaBuilder::new();
    let string_ty = b.primitive("string");
    let patient = b.resource("Patient");
    b.child(patient, "active", string_ty);
    b.supports_undeclared(patient, false);
    let schema = b.build();

    let mut p = saxtree::Parser::document(&schema);
    p.begin_element("Patient", L).unwrap();
    // No holder, no pushed state; the marker vanishes without error.
    p.begin_extension(UNREGISTERED, L).unwrap();
    p.end_element("Patient", L).unwrap();

    let doc = p.finish().unwrap();
    assert!(doc.extensions(doc.root_id()).is_empty());
}
