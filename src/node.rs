//! The in-memory object graph built by the parser.
//!
//! Nodes live in a flat arena ([`Graph`]) and refer to each other by
//! [`NodeId`]. A child is allocated and attached to its parent's slot in one
//! step, at the moment its start event is processed; the parsing state that
//! fills it in afterwards only ever holds the id, so no two states alias the
//! same node mutably.

use crate::error::Location;
use crate::event::Event;
use crate::schema::TypeId;

/// Index of a node inside a [`Graph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// One node of the built object graph.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// A structured object with named children.
    Composite {
        ty: TypeId,
        /// `(field name, child)` pairs in arrival order. Repeated fields
        /// simply appear more than once.
        children: Vec<(String, NodeId)>,
        /// Generic extension holders attached to this object.
        extensions: Vec<NodeId>,
    },
    /// A leaf value carried as a raw string.
    Primitive { ty: TypeId, value: Option<String> },
    /// A polymorphic reference; exactly two optional sub-fields.
    Reference {
        reference: Option<String>,
        display: Option<String>,
    },
    /// An opaque markup fragment captured verbatim as structural events.
    RawMarkup { events: Vec<Event> },
    /// A URL-keyed extension, declared (schema-known) or undeclared.
    Extension {
        url: String,
        declared: bool,
        /// Direct value; mutually exclusive with `nested` at completion.
        value: Option<NodeId>,
        /// Nested extension holders.
        nested: Vec<NodeId>,
    },
    /// A feed-style bundle wrapping typed entries.
    Feed {
        title: Option<String>,
        entries: Vec<NodeId>,
    },
}

impl Node {
    /// Raw string value, when this is a primitive leaf.
    pub fn value(&self) -> Option<&str> {
        match self {
            Node::Primitive { value, .. } => value.as_deref(),
            _ => None,
        }
    }
}

/// Flat arena owning every node of one parse.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    /// Allocate a node and return its id.
    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Attach `child` to `parent` under `field`.
    ///
    /// For composites this appends a named child slot. For extension holders
    /// the field name is ignored: a non-extension child becomes the holder's
    /// direct value, an extension child joins the nested list.
    pub(crate) fn attach(&mut self, parent: NodeId, field: &str, child: NodeId) {
        let child_is_extension = matches!(self.get(child), Node::Extension { .. });
        match self.get_mut(parent) {
            Node::Composite { children, .. } => {
                children.push((field.to_owned(), child));
            }
            Node::Extension { value, nested, .. } => {
                if child_is_extension {
                    nested.push(child);
                } else {
                    *value = Some(child);
                }
            }
            Node::Feed { entries, .. } => {
                entries.push(child);
            }
            Node::Primitive { .. } | Node::Reference { .. } | Node::RawMarkup { .. } => {
                unreachable!("leaf nodes never receive children")
            }
        }
    }
}

/// The completed result of one parse: the graph plus its root node.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    graph: Graph,
    root: NodeId,
    /// Position of the event that completed the document.
    completed_at: Location,
}

impl Document {
    pub(crate) fn new(graph: Graph, root: NodeId, completed_at: Location) -> Self {
        Self {
            graph,
            root,
            completed_at,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &Node {
        self.graph.get(self.root)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.graph.get(id)
    }

    /// Position of the event that completed the document.
    pub fn completed_at(&self) -> Location {
        self.completed_at
    }

    /// First child of `parent` stored under `field`, if any.
    pub fn child(&self, parent: NodeId, field: &str) -> Option<NodeId> {
        self.children(parent, field).first().copied()
    }

    /// All children of `parent` stored under `field`, in arrival order.
    pub fn children(&self, parent: NodeId, field: &str) -> Vec<NodeId> {
        match self.graph.get(parent) {
            Node::Composite { children, .. } => children
                .iter()
                .filter(|(name, _)| name == field)
                .map(|&(_, id)| id)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Raw string value of the first `field` child of `parent`, when that
    /// child is a primitive leaf.
    pub fn primitive(&self, parent: NodeId, field: &str) -> Option<&str> {
        self.child(parent, field)
            .and_then(|id| self.graph.get(id).value())
    }

    /// Generic extension holders attached to `parent`.
    pub fn extensions(&self, parent: NodeId) -> &[NodeId] {
        match self.graph.get(parent) {
            Node::Composite { extensions, .. } => extensions,
            Node::Extension { nested, .. } => nested,
            _ => &[],
        }
    }
}
