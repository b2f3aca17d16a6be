//! Owned structural events.
//!
//! The parser is format-agnostic: any tokenizer able to produce this event
//! vocabulary can drive it. Events are also the unit of verbatim capture for
//! raw-markup fragments, which store their whole subtree as an ordered event
//! buffer instead of decomposing it.

use crate::error::Location;

/// One unit of the structural input stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Start of an element.
    ElementStart { name: String, location: Location },
    /// End of an element.
    ElementEnd { name: String, location: Location },
    /// A single attribute on the most recently started element.
    Attribute {
        name: String,
        value: String,
        location: Location,
    },
    /// Character data.
    Text { data: String, location: Location },
    /// A comment; carried only so raw-markup fragments stay verbatim.
    Comment { data: String, location: Location },
}

impl Event {
    /// Get the source location attached to this event.
    pub fn location(&self) -> Location {
        match self {
            Event::ElementStart { location, .. }
            | Event::ElementEnd { location, .. }
            | Event::Attribute { location, .. }
            | Event::Text { location, .. }
            | Event::Comment { location, .. } => *location,
        }
    }
}
