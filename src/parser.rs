//! The parsing state machine: a stack of states driven by structural events.
//!
//! Control flow:
//! - The driver forwards every incoming event to the state on top of the
//!   stack. A state reacts by mutating the node it is building, pushing a
//!   child state (descending into a new node), or popping itself (the node is
//!   complete; control returns to the parent state).
//! - A child node is allocated and attached to its parent's slot the moment
//!   its start event arrives; completion is signaled purely by popping, so no
//!   state ever hands an object back explicitly.
//! - After a pop the new top state is "resumed"; the pre-root states use this
//!   hook to record the finished instance as the overall result.
//!
//! Failure policy:
//! - Every handler may raise a structural [`Error`]. The first error
//!   permanently fails the instance: all later calls report the failure
//!   instead of processing input, and no result is ever produced.

use tracing::{debug, trace};

use crate::error::{Error, Location};
use crate::event::Event;
use crate::node::{Document, Graph, Node, NodeId};
use crate::schema::{ExtensionId, ModelRegistry, Target, TypeId};

/// Phase of the flat reference grammar.
///
/// References have exactly two optional sub-fields and no deeper structure,
/// so they are tracked as a phase instead of a nested stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReferencePhase {
    Initial,
    Display,
    Reference,
}

/// One stackable unit of the state machine.
#[derive(Debug)]
enum State {
    /// Expecting a single top-level element naming a root type.
    PreResource { root: Option<NodeId> },
    /// Expecting the fixed `feed` wrapper of a bundle.
    PreFeed { feed: Option<NodeId> },
    /// Inside the feed wrapper: a text `title` plus typed entries.
    Feed { node: NodeId },
    /// Leaf whose value arrives as character data, committed at the end tag.
    TextLeaf { feed: NodeId, data: Option<String> },
    /// A structured object with schema-resolved children.
    Composite { ty: TypeId, node: NodeId },
    /// Leaf whose value arrives as an attribute.
    Primitive { node: NodeId },
    /// Polymorphic reference with the 3-phase sub-grammar.
    Reference { node: NodeId, phase: ReferencePhase },
    /// Opaque fragment captured verbatim, balanced by a depth counter.
    RawMarkup {
        node: NodeId,
        depth: usize,
        events: Vec<Event>,
    },
    /// Ignored subtree, consumed without building anything.
    Skip { depth: usize },
    /// Generic extension holder for an unrecognized URL.
    UndeclaredExtension { node: NodeId },
    /// Schema-known extension bound to a field of `parent`.
    DeclaredExtension {
        ext: ExtensionId,
        parent: NodeId,
        /// Own holder node. At the top level it is created lazily when the
        /// first nested declared extension arrives; until then plain values
        /// attach straight to the parent's field.
        holder: Option<NodeId>,
    },
}

/// Where a child element is being resolved from; extension bodies accept a
/// narrower set of target kinds than composites do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChildContext {
    Composite,
    Extension,
}

/// The state-stack driver.
///
/// One instance processes one event stream into one result object. Events
/// must arrive in document order; handlers must not be re-entered.
pub struct Parser<'r, R: ModelRegistry> {
    registry: &'r R,
    graph: Graph,
    stack: Vec<State>,
    result: Option<NodeId>,
    failed: bool,
    last_location: Location,
}

impl<'r, R: ModelRegistry> Parser<'r, R> {
    /// Parser expecting a single top-level typed value.
    pub fn document(registry: &'r R) -> Self {
        Self::with_initial(registry, State::PreResource { root: None })
    }

    /// Parser expecting a feed-style bundle wrapping typed entries.
    pub fn feed(registry: &'r R) -> Self {
        Self::with_initial(registry, State::PreFeed { feed: None })
    }

    fn with_initial(registry: &'r R, initial: State) -> Self {
        Self {
            registry,
            graph: Graph::default(),
            stack: vec![initial],
            result: None,
            failed: false,
            last_location: Location::UNKNOWN,
        }
    }

    /// True once the matching end event of the root wrapper has been
    /// processed and the result is recorded.
    pub fn is_complete(&self) -> bool {
        !self.failed && self.result.is_some()
    }

    /// Consume the parser and return the completed document.
    ///
    /// Returns:
    /// - `Ok(Document)` when the stream produced exactly one finished root.
    /// - `Err(Error)` when the instance failed earlier or input ended before
    ///   the root was complete.
    pub fn finish(self) -> Result<Document, Error> {
        if self.failed {
            return Err(Error::Failed {
                location: self.last_location,
            });
        }
        match self.result {
            Some(root) => Ok(Document::new(self.graph, root, self.last_location)),
            None => Err(Error::Incomplete {
                location: self.last_location,
            }),
        }
    }

    /// Handle the start of an element named `name`.
    pub fn begin_element(&mut self, name: &str, location: Location) -> Result<(), Error> {
        self.guard(location)?;
        self.last_location = location;
        let result = self.handle_begin_element(name, location);
        self.poison_on_error(result)
    }

    /// Handle the end of the current element.
    pub fn end_element(&mut self, name: &str, location: Location) -> Result<(), Error> {
        self.guard(location)?;
        self.last_location = location;
        let result = self.handle_end_element(name, location);
        self.poison_on_error(result)
    }

    /// Handle one attribute of the most recently started element.
    pub fn attribute(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.guard(self.last_location)?;
        let result = self.handle_attribute(name, value);
        self.poison_on_error(result)
    }

    /// Handle an extension marker: an extension element whose `url`
    /// attribute has already been extracted by the event source.
    pub fn begin_extension(&mut self, url: &str, location: Location) -> Result<(), Error> {
        self.guard(location)?;
        self.last_location = location;
        let result = self.handle_begin_extension(url, location);
        self.poison_on_error(result)
    }

    /// Handle any other event (character data, comments).
    pub fn other(&mut self, event: Event) -> Result<(), Error> {
        self.guard(event.location())?;
        self.last_location = event.location();
        let result = self.handle_other(event);
        self.poison_on_error(result)
    }

    fn guard(&self, location: Location) -> Result<(), Error> {
        if self.failed {
            Err(Error::Failed { location })
        } else {
            Ok(())
        }
    }

    fn poison_on_error(&mut self, result: Result<(), Error>) -> Result<(), Error> {
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn take_top(&mut self) -> Result<State, Error> {
        self.stack
            .pop()
            .ok_or_else(|| Error::msg("no active parsing state").with_location(self.last_location))
    }

    /// Invoked on the new top state after a pop.
    ///
    /// The pre-root states record their finished instance as the overall
    /// result here; every other state ignores the wakeup.
    fn resumed(&mut self) {
        match self.stack.last() {
            Some(State::PreResource { root: Some(id) }) => {
                trace!(node = id.0, "root resource complete");
                self.result = Some(*id);
            }
            Some(State::PreFeed { feed: Some(id) }) => {
                trace!(node = id.0, "feed complete");
                self.result = Some(*id);
            }
            _ => {}
        }
    }

    fn handle_begin_element(&mut self, name: &str, location: Location) -> Result<(), Error> {
        let mut state = self.take_top()?;
        match &mut state {
            State::PreResource { root } => {
                let Some(ty) = self.registry.resolve_root(name) else {
                    return Err(Error::NotAResource {
                        name: name.to_owned(),
                        location,
                    });
                };
                let node = self.graph.alloc(Node::Composite {
                    ty,
                    children: Vec::new(),
                    extensions: Vec::new(),
                });
                *root = Some(node);
                self.stack.push(state);
                self.push(State::Composite { ty, node });
                Ok(())
            }
            State::PreFeed { feed } => {
                if name != "feed" {
                    return Err(Error::UnexpectedWrapper {
                        expected: "feed",
                        found: name.to_owned(),
                        location,
                    });
                }
                let node = self.graph.alloc(Node::Feed {
                    title: None,
                    entries: Vec::new(),
                });
                *feed = Some(node);
                self.stack.push(state);
                self.push(State::Feed { node });
                Ok(())
            }
            State::Feed { node } => {
                let feed = *node;
                self.stack.push(state);
                if name == "title" {
                    self.push(State::TextLeaf { feed, data: None });
                } else if let Some(ty) = self.registry.resolve_root(name) {
                    let entry = self.graph.alloc(Node::Composite {
                        ty,
                        children: Vec::new(),
                        extensions: Vec::new(),
                    });
                    self.graph.attach(feed, "entry", entry);
                    self.push(State::Composite { ty, node: entry });
                } else {
                    trace!(element = name, "ignoring unrecognized feed element");
                    self.push(State::Skip { depth: 1 });
                }
                Ok(())
            }
            // The text leaf is lenient: unknown structure inside it is
            // skipped, only the leaf's own character data is kept.
            State::TextLeaf { .. } => {
                trace!(element = name, "ignoring nested element in text leaf");
                self.stack.push(state);
                self.push(State::Skip { depth: 1 });
                Ok(())
            }
            State::Primitive { .. } => Err(Error::UnexpectedChild {
                name: name.to_owned(),
                location,
            }),
            State::Composite { ty, node } => {
                let (ty, node) = (*ty, *node);
                let Some(target) = self.registry.resolve_child(ty, name) else {
                    return Err(Error::UnknownElement {
                        name: name.to_owned(),
                        parent: Some(self.registry.type_name(ty).to_owned()),
                        valid: self.registry.valid_children(ty),
                        location,
                    });
                };
                self.stack.push(state);
                self.descend(target, node, name, location, ChildContext::Composite)
            }
            State::Reference { phase, .. } => match *phase {
                ReferencePhase::Initial if name == "display" => {
                    *phase = ReferencePhase::Display;
                    self.stack.push(state);
                    Ok(())
                }
                ReferencePhase::Initial if name == "reference" => {
                    *phase = ReferencePhase::Reference;
                    self.stack.push(state);
                    Ok(())
                }
                _ => Err(Error::UnexpectedChild {
                    name: name.to_owned(),
                    location,
                }),
            },
            State::RawMarkup { depth, events, .. } => {
                *depth += 1;
                events.push(Event::ElementStart {
                    name: name.to_owned(),
                    location,
                });
                self.stack.push(state);
                Ok(())
            }
            State::Skip { depth } => {
                *depth += 1;
                self.stack.push(state);
                Ok(())
            }
            State::UndeclaredExtension { node } => {
                let holder = *node;
                let Some(target) = self.registry.undeclared_child(name) else {
                    return Err(Error::UnknownElement {
                        name: name.to_owned(),
                        parent: None,
                        valid: Vec::new(),
                        location,
                    });
                };
                self.stack.push(state);
                self.descend(target, holder, name, location, ChildContext::Extension)
            }
            State::DeclaredExtension { ext, parent, .. } => {
                let (ext, parent) = (*ext, *parent);
                let Some(target) = self.registry.extension_child(ext, name) else {
                    return Err(Error::UnknownElement {
                        name: name.to_owned(),
                        parent: None,
                        valid: Vec::new(),
                        location,
                    });
                };
                let field = self.registry.extension_field(ext).to_owned();
                self.stack.push(state);
                self.descend(target, parent, &field, location, ChildContext::Extension)
            }
        }
    }

    /// Instantiate the node a resolved target calls for, attach it to
    /// `parent` under `field`, and push the matching state.
    fn descend(
        &mut self,
        target: Target,
        parent: NodeId,
        field: &str,
        location: Location,
        context: ChildContext,
    ) -> Result<(), Error> {
        match target {
            Target::Composite(ty) => {
                let node = self.graph.alloc(Node::Composite {
                    ty,
                    children: Vec::new(),
                    extensions: Vec::new(),
                });
                self.graph.attach(parent, field, node);
                self.push(State::Composite { ty, node });
                Ok(())
            }
            Target::Block(ty) if context == ChildContext::Composite => {
                let node = self.graph.alloc(Node::Composite {
                    ty,
                    children: Vec::new(),
                    extensions: Vec::new(),
                });
                self.graph.attach(parent, field, node);
                self.push(State::Composite { ty, node });
                Ok(())
            }
            Target::Primitive(ty) => {
                let node = self.graph.alloc(Node::Primitive { ty, value: None });
                self.graph.attach(parent, field, node);
                self.push(State::Primitive { node });
                Ok(())
            }
            Target::Reference => {
                let node = self.graph.alloc(Node::Reference {
                    reference: None,
                    display: None,
                });
                self.graph.attach(parent, field, node);
                self.push(State::Reference {
                    node,
                    phase: ReferencePhase::Initial,
                });
                Ok(())
            }
            Target::RawMarkup if context == ChildContext::Composite => {
                let node = self.graph.alloc(Node::RawMarkup { events: Vec::new() });
                self.graph.attach(parent, field, node);
                self.push(State::RawMarkup {
                    node,
                    depth: 1,
                    events: vec![Event::ElementStart {
                        name: field.to_owned(),
                        location,
                    }],
                });
                Ok(())
            }
            Target::Resource(_) => Err(Error::IllegalPosition {
                kind: "resource",
                location,
            }),
            Target::Block(_) => Err(Error::IllegalPosition {
                kind: "resource block",
                location,
            }),
            Target::RawMarkup => Err(Error::IllegalPosition {
                kind: "raw markup",
                location,
            }),
        }
    }

    fn handle_end_element(&mut self, name: &str, location: Location) -> Result<(), Error> {
        let mut state = self.take_top()?;
        match &mut state {
            // The pre-root states outlive their wrapper's end event.
            State::PreResource { .. } | State::PreFeed { .. } => {
                self.stack.push(state);
                Ok(())
            }
            State::Feed { .. } | State::Primitive { .. } | State::DeclaredExtension { .. } => {
                self.resumed();
                Ok(())
            }
            State::TextLeaf { feed, data } => {
                let data = data.take();
                if let Node::Feed { title, .. } = self.graph.get_mut(*feed) {
                    *title = data;
                }
                self.resumed();
                Ok(())
            }
            State::Composite { node, .. } => {
                let node = *node;
                self.resumed();
                if self.stack.is_empty() {
                    self.result = Some(node);
                }
                Ok(())
            }
            State::Reference { phase, .. } => match phase {
                // The whole reference node is complete.
                ReferencePhase::Initial => {
                    self.resumed();
                    Ok(())
                }
                // Only the open sub-field closes; the node stays current.
                ReferencePhase::Display | ReferencePhase::Reference => {
                    *phase = ReferencePhase::Initial;
                    self.stack.push(state);
                    Ok(())
                }
            },
            State::RawMarkup {
                node,
                depth,
                events,
            } => {
                events.push(Event::ElementEnd {
                    name: name.to_owned(),
                    location,
                });
                *depth -= 1;
                if *depth == 0 {
                    let node = *node;
                    let events = std::mem::take(events);
                    *self.graph.get_mut(node) = Node::RawMarkup { events };
                    self.resumed();
                } else {
                    self.stack.push(state);
                }
                Ok(())
            }
            State::Skip { depth } => {
                *depth -= 1;
                if *depth == 0 {
                    self.resumed();
                } else {
                    self.stack.push(state);
                }
                Ok(())
            }
            State::UndeclaredExtension { node } => {
                if let Node::Extension { value, nested, .. } = self.graph.get(*node)
                    && value.is_some()
                    && !nested.is_empty()
                {
                    return Err(Error::ExtensionValueConflict { location });
                }
                self.resumed();
                Ok(())
            }
        }
    }

    fn handle_attribute(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let location = self.last_location;
        let mut state = self.take_top()?;
        match &mut state {
            State::PreResource { .. }
            | State::PreFeed { .. }
            | State::Feed { .. }
            | State::TextLeaf { .. }
            | State::Skip { .. } => {
                self.stack.push(state);
                Ok(())
            }
            State::Composite { .. } => {
                debug!(attribute = name, value, "ignoring attribute on composite");
                self.stack.push(state);
                Ok(())
            }
            State::Primitive { node } => {
                if let Node::Primitive { value: slot, .. } = self.graph.get_mut(*node) {
                    *slot = Some(value.to_owned());
                }
                self.stack.push(state);
                Ok(())
            }
            State::Reference { node, phase } => {
                let result = match phase {
                    ReferencePhase::Initial => Err(Error::UnexpectedAttribute {
                        value: value.to_owned(),
                        location,
                    }),
                    ReferencePhase::Display => {
                        if let Node::Reference { display, .. } = self.graph.get_mut(*node) {
                            *display = Some(value.to_owned());
                        }
                        Ok(())
                    }
                    ReferencePhase::Reference => {
                        if let Node::Reference { reference, .. } = self.graph.get_mut(*node) {
                            *reference = Some(value.to_owned());
                        }
                        Ok(())
                    }
                };
                self.stack.push(state);
                result
            }
            State::RawMarkup { events, .. } => {
                events.push(Event::Attribute {
                    name: name.to_owned(),
                    value: value.to_owned(),
                    location,
                });
                self.stack.push(state);
                Ok(())
            }
            State::UndeclaredExtension { .. } | State::DeclaredExtension { .. } => {
                Err(Error::AttributeInExtension { location })
            }
        }
    }

    fn handle_begin_extension(&mut self, url: &str, location: Location) -> Result<(), Error> {
        let mut state = self.take_top()?;
        match &mut state {
            State::Composite { ty, node } => {
                let (ty, node) = (*ty, *node);
                self.stack.push(state);
                if let Some(ext) = self.registry.resolve_declared_extension(ty, url) {
                    self.push(State::DeclaredExtension {
                        ext,
                        parent: node,
                        holder: None,
                    });
                } else {
                    self.undeclared_fallback(node, url);
                }
                Ok(())
            }
            State::DeclaredExtension {
                ext,
                parent,
                holder,
            } => {
                let (ext, parent) = (*ext, *parent);
                if let Some(nested) = self.registry.extension_nested(ext, url) {
                    let holder_id = match *holder {
                        Some(id) => id,
                        None => {
                            let id = self.graph.alloc(Node::Extension {
                                url: self.registry.extension_url(ext).to_owned(),
                                declared: true,
                                value: None,
                                nested: Vec::new(),
                            });
                            let field = self.registry.extension_field(ext).to_owned();
                            self.graph.attach(parent, &field, id);
                            *holder = Some(id);
                            id
                        }
                    };
                    let child = self.graph.alloc(Node::Extension {
                        url: self.registry.extension_url(nested).to_owned(),
                        declared: true,
                        value: None,
                        nested: Vec::new(),
                    });
                    let field = self.registry.extension_field(nested).to_owned();
                    self.graph.attach(holder_id, &field, child);
                    self.stack.push(state);
                    self.push(State::DeclaredExtension {
                        ext: nested,
                        parent: child,
                        holder: Some(child),
                    });
                } else {
                    // Unrecognized URL inside a declared extension attaches a
                    // generic holder to the enclosing parent object.
                    self.stack.push(state);
                    self.undeclared_fallback(parent, url);
                }
                Ok(())
            }
            State::UndeclaredExtension { node } => {
                let node = *node;
                self.stack.push(state);
                self.undeclared_fallback(node, url);
                Ok(())
            }
            State::RawMarkup { depth, events, .. } => {
                // Inside an opaque fragment an extension element is payload,
                // not a marker; keep the subtree verbatim and balanced.
                *depth += 1;
                events.push(Event::ElementStart {
                    name: "extension".to_owned(),
                    location,
                });
                events.push(Event::Attribute {
                    name: "url".to_owned(),
                    value: url.to_owned(),
                    location,
                });
                self.stack.push(state);
                Ok(())
            }
            State::Skip { depth } => {
                *depth += 1;
                self.stack.push(state);
                Ok(())
            }
            State::PreResource { .. }
            | State::PreFeed { .. }
            | State::Feed { .. }
            | State::TextLeaf { .. }
            | State::Primitive { .. }
            | State::Reference { .. } => {
                trace!(url, "extension marker in a position without extension support, skipping");
                self.stack.push(state);
                Ok(())
            }
        }
    }

    /// Generic extension behavior shared by every node kind: attach a holder
    /// to `current` when it supports undeclared extensions, otherwise do
    /// nothing.
    fn undeclared_fallback(&mut self, current: NodeId, url: &str) {
        let supports = match self.graph.get(current) {
            Node::Composite { ty, .. } => self.registry.supports_undeclared(*ty),
            Node::Extension { .. } => true,
            _ => false,
        };
        if !supports {
            trace!(url, "node does not support undeclared extensions, skipping");
            return;
        }
        let holder = self.graph.alloc(Node::Extension {
            url: url.to_owned(),
            declared: false,
            value: None,
            nested: Vec::new(),
        });
        match self.graph.get_mut(current) {
            Node::Composite { extensions, .. } => extensions.push(holder),
            Node::Extension { nested, .. } => nested.push(holder),
            _ => return,
        }
        self.push(State::UndeclaredExtension { node: holder });
    }

    fn handle_other(&mut self, event: Event) -> Result<(), Error> {
        let mut state = self.take_top()?;
        match &mut state {
            State::RawMarkup { events, .. } => {
                events.push(event);
            }
            State::TextLeaf { data, .. } => {
                if let Event::Text { data: chunk, .. } = event {
                    match data {
                        // Multiple chunks concatenate in arrival order.
                        Some(existing) => existing.push_str(&chunk),
                        None => *data = Some(chunk),
                    }
                }
            }
            _ => {}
        }
        self.stack.push(state);
        Ok(())
    }

    fn push(&mut self, state: State) {
        trace!(depth = self.stack.len(), "descending into child state");
        self.stack.push(state);
    }
}
