//! Schema-guided streaming parser building typed object graphs from markup
//! event streams.
//!
//! The crate converts a sequence of structural events (element start/end,
//! attribute, character data) into an in-memory object graph, guided by
//! runtime model definitions that say which element names are legal at each
//! position and what kind of value each maps to: composite structure,
//! primitive value, polymorphic reference, raw inline markup, or extension
//! point.
//!
//! The core is the [`Parser`] state machine in [`parser`]; it is
//! format-agnostic and consumes events through five handler methods. The
//! optional `xml` feature (on by default) adds [`xml::read_document`] and
//! [`xml::read_feed`], which drive a parser from XML text.
//!
//! ```
//! use saxtree::{SchemaBuilder, xml};
//!
//! let mut b = SchemaBuilder::new();
//! let string_ty = b.primitive("string");
//! let name_ty = b.composite("HumanName");
//! b.child(name_ty, "family", string_ty);
//! let patient = b.resource("Patient");
//! b.child(patient, "name", name_ty);
//! let schema = b.build();
//!
//! let doc = xml::read_document(
//!     &schema,
//!     r#"<Patient><name><family value="Chalmers"/></name></Patient>"#,
//! )
//! .unwrap();
//! let name = doc.child(doc.root_id(), "name").unwrap();
//! assert_eq!(doc.primitive(name, "family"), Some("Chalmers"));
//! ```

pub use error::{Error, Location};
pub use event::Event;
pub use node::{Document, Graph, Node, NodeId};
pub use parser::Parser;
pub use schema::{ExtensionId, ModelRegistry, Schema, SchemaBuilder, Target, TypeId, TypeKind};

pub mod error;
pub mod event;
pub mod node;
pub mod parser;
pub mod schema;
#[cfg(feature = "xml")]
pub mod xml;
