//! Runtime model definitions and the registry interface the parser consumes.
//!
//! A [`Schema`] maps element names to target definitions: which kind of node
//! an element produces at a given position, and how to resolve names one
//! level further down. The parser only ever performs read-only lookups, so a
//! single `Schema` can be shared by any number of concurrent parser
//! instances.
//!
//! Definitions are built programmatically with [`SchemaBuilder`]; the parser
//! itself is generic over the [`ModelRegistry`] trait and does not care where
//! the definitions came from.

use indexmap::IndexMap;

/// Index of a type definition inside a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(pub(crate) u32);

/// Index of a declared-extension definition inside a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExtensionId(pub(crate) u32);

/// What kind of value a resolved element name maps to.
///
/// Matched exhaustively wherever a lookup result is consumed, so adding a
/// kind forces every dispatch site to decide how to handle it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// A structured datatype with named children.
    Composite(TypeId),
    /// A reusable block of a resource; parsed exactly like a composite.
    Block(TypeId),
    /// A leaf value set from an attribute string.
    Primitive(TypeId),
    /// A polymorphic reference with `reference`/`display` sub-fields.
    Reference,
    /// An opaque inline-markup fragment captured verbatim.
    RawMarkup,
    /// A full resource; legal only at the root, never as a plain child.
    Resource(TypeId),
}

/// Structural kind of a type definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    /// Top-level root type.
    Resource,
    /// Composite datatype.
    Composite,
    /// Resource block (component group nested inside one resource type).
    Block,
    /// Primitive leaf.
    Primitive,
    /// Polymorphic reference.
    Reference,
    /// Raw-markup fragment.
    RawMarkup,
}

/// One named type definition.
#[derive(Debug)]
struct TypeDef {
    name: String,
    kind: TypeKind,
    /// Element name -> target type, in declaration order. The order is what
    /// diagnostics print as "valid names".
    children: IndexMap<String, TypeId>,
    /// Declared extensions scoped to this type, keyed by URL.
    extensions: IndexMap<String, ExtensionId>,
    /// Whether unrecognized extension URLs may attach generic holders here.
    supports_undeclared: bool,
}

/// A declared (schema-known) extension slot.
#[derive(Debug)]
struct ExtensionDef {
    url: String,
    /// Field of the enclosing object that receives the extension's value.
    field: String,
    /// Legal value elements inside this extension body.
    children: IndexMap<String, TypeId>,
    /// Nested declared extensions, keyed by URL.
    nested: IndexMap<String, ExtensionId>,
}

/// Read-only lookup interface consumed by the parser.
///
/// All methods take `&self`; implementations must be safe for concurrent
/// lookups from independent parser instances.
pub trait ModelRegistry {
    /// Resolve a top-level element name to a root definition.
    fn resolve_root(&self, name: &str) -> Option<TypeId>;

    /// Resolve a child element name within the context of `ctx`.
    fn resolve_child(&self, ctx: TypeId, name: &str) -> Option<Target>;

    /// Resolve a declared-extension URL scoped to `ctx`.
    fn resolve_declared_extension(&self, ctx: TypeId, url: &str) -> Option<ExtensionId>;

    /// Resolve a value element name inside a declared extension body.
    fn extension_child(&self, ext: ExtensionId, name: &str) -> Option<Target>;

    /// Resolve a nested declared-extension URL inside a declared extension.
    fn extension_nested(&self, ext: ExtensionId, url: &str) -> Option<ExtensionId>;

    /// URL of a declared extension definition.
    fn extension_url(&self, ext: ExtensionId) -> &str;

    /// Field name a declared extension attaches its value under.
    fn extension_field(&self, ext: ExtensionId) -> &str;

    /// Resolve a value element name against the generic undeclared-extension
    /// schema (the shared child set every generic extension body accepts).
    fn undeclared_child(&self, name: &str) -> Option<Target>;

    /// Whether the type supports generic holders for unrecognized URLs.
    fn supports_undeclared(&self, ctx: TypeId) -> bool;

    /// Name of a type definition, for diagnostics.
    fn type_name(&self, ctx: TypeId) -> &str;

    /// Valid child names of a type, in schema order, for diagnostics.
    fn valid_children(&self, ctx: TypeId) -> Vec<String>;
}

/// In-memory model registry.
#[derive(Debug, Default)]
pub struct Schema {
    types: Vec<TypeDef>,
    extensions: Vec<ExtensionDef>,
    /// Root element name -> resource definition.
    roots: IndexMap<String, TypeId>,
    /// Shared child set for generic (undeclared) extension bodies.
    undeclared_children: IndexMap<String, TypeId>,
}

impl Schema {
    fn def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.0 as usize]
    }

    fn ext(&self, id: ExtensionId) -> &ExtensionDef {
        &self.extensions[id.0 as usize]
    }

    /// Derive the dispatch target for a child slot typed as `id`.
    fn target_for(&self, id: TypeId) -> Target {
        match self.def(id).kind {
            TypeKind::Resource => Target::Resource(id),
            TypeKind::Composite => Target::Composite(id),
            TypeKind::Block => Target::Block(id),
            TypeKind::Primitive => Target::Primitive(id),
            TypeKind::Reference => Target::Reference,
            TypeKind::RawMarkup => Target::RawMarkup,
        }
    }

    /// Structural kind of a definition.
    pub fn kind(&self, id: TypeId) -> TypeKind {
        self.def(id).kind
    }
}

impl ModelRegistry for Schema {
    fn resolve_root(&self, name: &str) -> Option<TypeId> {
        self.roots.get(name).copied()
    }

    fn resolve_child(&self, ctx: TypeId, name: &str) -> Option<Target> {
        let target = *self.def(ctx).children.get(name)?;
        Some(self.target_for(target))
    }

    fn resolve_declared_extension(&self, ctx: TypeId, url: &str) -> Option<ExtensionId> {
        self.def(ctx).extensions.get(url).copied()
    }

    fn extension_child(&self, ext: ExtensionId, name: &str) -> Option<Target> {
        let target = *self.ext(ext).children.get(name)?;
        Some(self.target_for(target))
    }

    fn extension_nested(&self, ext: ExtensionId, url: &str) -> Option<ExtensionId> {
        self.ext(ext).nested.get(url).copied()
    }

    fn extension_url(&self, ext: ExtensionId) -> &str {
        &self.ext(ext).url
    }

    fn extension_field(&self, ext: ExtensionId) -> &str {
        &self.ext(ext).field
    }

    fn undeclared_child(&self, name: &str) -> Option<Target> {
        let target = *self.undeclared_children.get(name)?;
        Some(self.target_for(target))
    }

    fn supports_undeclared(&self, ctx: TypeId) -> bool {
        self.def(ctx).supports_undeclared
    }

    fn type_name(&self, ctx: TypeId) -> &str {
        &self.def(ctx).name
    }

    fn valid_children(&self, ctx: TypeId) -> Vec<String> {
        self.def(ctx).children.keys().cloned().collect()
    }
}

/// Fluent builder for [`Schema`].
///
/// Type ids handed out by the `resource`/`composite`/... methods stay valid
/// in the built schema, so callers can keep them around for later lookups.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_type(&mut self, name: &str, kind: TypeKind) -> TypeId {
        let id = TypeId(self.schema.types.len() as u32);
        // Resources, composites and blocks accept generic extension holders
        // unless turned off; leaf kinds never do.
        let supports_undeclared =
            matches!(kind, TypeKind::Resource | TypeKind::Composite | TypeKind::Block);
        self.schema.types.push(TypeDef {
            name: name.to_owned(),
            kind,
            children: IndexMap::new(),
            extensions: IndexMap::new(),
            supports_undeclared,
        });
        id
    }

    /// Define a root resource type; its name becomes a valid root element.
    pub fn resource(&mut self, name: &str) -> TypeId {
        let id = self.add_type(name, TypeKind::Resource);
        self.schema.roots.insert(name.to_owned(), id);
        id
    }

    /// Define a composite datatype.
    pub fn composite(&mut self, name: &str) -> TypeId {
        self.add_type(name, TypeKind::Composite)
    }

    /// Define a resource block.
    pub fn block(&mut self, name: &str) -> TypeId {
        self.add_type(name, TypeKind::Block)
    }

    /// Define a primitive leaf datatype.
    pub fn primitive(&mut self, name: &str) -> TypeId {
        self.add_type(name, TypeKind::Primitive)
    }

    /// Define the polymorphic reference datatype.
    pub fn reference(&mut self, name: &str) -> TypeId {
        self.add_type(name, TypeKind::Reference)
    }

    /// Define the raw-markup datatype.
    pub fn markup(&mut self, name: &str) -> TypeId {
        self.add_type(name, TypeKind::RawMarkup)
    }

    /// Declare that `parent` accepts a child element `name` of type `target`.
    pub fn child(&mut self, parent: TypeId, name: &str, target: TypeId) -> &mut Self {
        self.schema.types[parent.0 as usize]
            .children
            .insert(name.to_owned(), target);
        self
    }

    /// Override whether `ty` accepts generic holders for unrecognized URLs.
    pub fn supports_undeclared(&mut self, ty: TypeId, supported: bool) -> &mut Self {
        self.schema.types[ty.0 as usize].supports_undeclared = supported;
        self
    }

    /// Declare an extension with a known URL on `parent`, attaching its value
    /// under `field`.
    pub fn declared_extension(&mut self, parent: TypeId, url: &str, field: &str) -> ExtensionId {
        let id = ExtensionId(self.schema.extensions.len() as u32);
        self.schema.extensions.push(ExtensionDef {
            url: url.to_owned(),
            field: field.to_owned(),
            children: IndexMap::new(),
            nested: IndexMap::new(),
        });
        self.schema.types[parent.0 as usize]
            .extensions
            .insert(url.to_owned(), id);
        id
    }

    /// Declare a value element accepted inside the declared extension `ext`.
    pub fn extension_child(&mut self, ext: ExtensionId, name: &str, target: TypeId) -> &mut Self {
        self.schema.extensions[ext.0 as usize]
            .children
            .insert(name.to_owned(), target);
        self
    }

    /// Declare a nested declared extension inside `ext`.
    pub fn nested_extension(&mut self, ext: ExtensionId, url: &str, field: &str) -> ExtensionId {
        let id = ExtensionId(self.schema.extensions.len() as u32);
        self.schema.extensions.push(ExtensionDef {
            url: url.to_owned(),
            field: field.to_owned(),
            children: IndexMap::new(),
            nested: IndexMap::new(),
        });
        self.schema.extensions[ext.0 as usize]
            .nested
            .insert(url.to_owned(), id);
        id
    }

    /// Declare a value element accepted inside any generic extension body.
    pub fn undeclared_child(&mut self, name: &str, target: TypeId) -> &mut Self {
        self.schema
            .undeclared_children
            .insert(name.to_owned(), target);
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_roots_and_children() {
        let mut b = SchemaBuilder::new();
        let string_ty = b.primitive("string");
        let name_ty = b.composite("HumanName");
        b.child(name_ty, "family", string_ty);
        let patient = b.resource("Patient");
        b.child(patient, "name", name_ty);
        let schema = b.build();

        assert_eq!(schema.resolve_root("Patient"), Some(patient));
        assert_eq!(schema.resolve_root("Observation"), None);
        assert_eq!(
            schema.resolve_child(patient, "name"),
            Some(Target::Composite(name_ty))
        );
        assert_eq!(
            schema.resolve_child(name_ty, "family"),
            Some(Target::Primitive(string_ty))
        );
        assert_eq!(schema.resolve_child(name_ty, "middle"), None);
        assert_eq!(schema.valid_children(name_ty), vec!["family".to_owned()]);
    }

    #[test]
    fn leaf_kinds_reject_undeclared_extensions_by_default() {
        let mut b = SchemaBuilder::new();
        let string_ty = b.primitive("string");
        let patient = b.resource("Patient");
        let schema = b.build();

        assert!(schema.supports_undeclared(patient));
        assert!(!schema.supports_undeclared(string_ty));
    }

    #[test]
    fn declared_extensions_resolve_by_url_and_nest() {
        let mut b = SchemaBuilder::new();
        let code_ty = b.primitive("code");
        let patient = b.resource("Patient");
        let race = b.declared_extension(patient, "http://example.org/race", "race");
        b.extension_child(race, "valueCode", code_ty);
        let detail = b.nested_extension(race, "http://example.org/race#detail", "raceDetail");
        b.extension_child(detail, "valueCode", code_ty);
        let schema = b.build();

        let found = schema
            .resolve_declared_extension(patient, "http://example.org/race")
            .unwrap();
        assert_eq!(found, race);
        assert_eq!(
            schema.extension_child(race, "valueCode"),
            Some(Target::Primitive(code_ty))
        );
        assert_eq!(
            schema.extension_nested(race, "http://example.org/race#detail"),
            Some(detail)
        );
        assert_eq!(schema.extension_nested(race, "http://other"), None);
        assert_eq!(schema.extension_field(race), "race");
    }
}
