//! Structural error type and source locations.
//!
//! The state machine raises exactly one error kind: a structural error. Every
//! variant of [`Error`] is a flavor of "the input does not fit the schema at
//! this position". Errors are never recovered internally; the first one
//! permanently fails the parser instance.

use std::fmt;

/// Row/column location within the source document (1-indexed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    /// 1-indexed row number in the input stream.
    pub row: u32,
    /// 1-indexed column number in the input stream.
    pub column: u32,
}

impl Location {
    /// Sentinel value meaning "location unknown".
    ///
    /// Used when a precise position is not available at error creation time.
    pub const UNKNOWN: Self = Self { row: 0, column: 0 };

    /// Create a new location record.
    ///
    /// Arguments:
    /// - `row`: 1-indexed row.
    /// - `column`: 1-indexed column.
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    fn is_known(&self) -> bool {
        self != &Location::UNKNOWN
    }
}

/// The single fatal error kind for any grammar violation.
///
/// Carries a human-readable description of the offending element, attribute
/// or URL and, where useful, the set of valid alternatives.
#[derive(Debug)]
pub enum Error {
    /// Free-form structural error with optional source location.
    Message { msg: String, location: Location },
    /// An element name that is not in the schema-derived valid-child set.
    UnknownElement {
        /// Offending element name.
        name: String,
        /// Name of the enclosing definition, when known.
        parent: Option<String>,
        /// Valid child names at this position, in schema order.
        valid: Vec<String>,
        location: Location,
    },
    /// An element resolved to a kind that is illegal at this position
    /// (for example a resource nested as a plain child).
    IllegalPosition {
        kind: &'static str,
        location: Location,
    },
    /// A nested element arrived inside a leaf that cannot contain children.
    UnexpectedChild { name: String, location: Location },
    /// An attribute arrived in a phase that does not accept one.
    UnexpectedAttribute { value: String, location: Location },
    /// A `value` attribute inside an extension body; extension values must be
    /// child elements.
    AttributeInExtension { location: Location },
    /// An extension holder ended carrying both a direct value and nested
    /// extensions; the two are mutually exclusive.
    ExtensionValueConflict { location: Location },
    /// The root-acquisition state saw a wrapper element it did not expect.
    UnexpectedWrapper {
        expected: &'static str,
        found: String,
        location: Location,
    },
    /// The root element name did not resolve to a root definition.
    NotAResource { name: String, location: Location },
    /// The input ended before the object graph was complete.
    Incomplete { location: Location },
    /// The parser instance already failed earlier and cannot be resumed.
    Failed { location: Location },
}

impl Error {
    /// Construct a `Message` error with no known location.
    ///
    /// Called by:
    /// - The XML adapter for tokenizer-level failures.
    pub(crate) fn msg<S: Into<String>>(s: S) -> Self {
        Error::Message {
            msg: s.into(),
            location: Location::UNKNOWN,
        }
    }

    /// Attach/override a concrete location to this error and return it.
    pub(crate) fn with_location(mut self, set_location: Location) -> Self {
        match &mut self {
            Error::Message { location, .. }
            | Error::UnknownElement { location, .. }
            | Error::IllegalPosition { location, .. }
            | Error::UnexpectedChild { location, .. }
            | Error::UnexpectedAttribute { location, .. }
            | Error::AttributeInExtension { location }
            | Error::ExtensionValueConflict { location }
            | Error::UnexpectedWrapper { location, .. }
            | Error::NotAResource { location, .. }
            | Error::Incomplete { location }
            | Error::Failed { location } => {
                *location = set_location;
            }
        }
        self
    }

    /// If the error has a known location, return it.
    ///
    /// Returns:
    /// - `Some(Location)` when coordinates are known; `None` otherwise.
    pub fn location(&self) -> Option<Location> {
        match self {
            Error::Message { location, .. }
            | Error::UnknownElement { location, .. }
            | Error::IllegalPosition { location, .. }
            | Error::UnexpectedChild { location, .. }
            | Error::UnexpectedAttribute { location, .. }
            | Error::AttributeInExtension { location }
            | Error::ExtensionValueConflict { location }
            | Error::UnexpectedWrapper { location, .. }
            | Error::NotAResource { location, .. }
            | Error::Incomplete { location }
            | Error::Failed { location } => {
                if location.is_known() {
                    Some(*location)
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Message { msg, location } => fmt_with_location(f, msg, location),
            Error::UnknownElement {
                name,
                parent,
                valid,
                location,
            } => {
                let msg = match parent {
                    Some(parent) => format!(
                        "found unexpected element '{name}' in parent element '{parent}'. Valid names are: {}",
                        valid.join(", ")
                    ),
                    None => format!("unknown extension element name: {name}"),
                };
                fmt_with_location(f, &msg, location)
            }
            Error::IllegalPosition { kind, location } => fmt_with_location(
                f,
                &format!("illegal position for element of kind {kind}"),
                location,
            ),
            Error::UnexpectedChild { name, location } => fmt_with_location(
                f,
                &format!("unexpected nested element '{name}' inside a value element"),
                location,
            ),
            Error::UnexpectedAttribute { value, location } => {
                fmt_with_location(f, &format!("unexpected attribute: {value}"), location)
            }
            Error::AttributeInExtension { location } => fmt_with_location(
                f,
                "'value' attribute is invalid in 'extension' element",
                location,
            ),
            Error::ExtensionValueConflict { location } => fmt_with_location(
                f,
                "extension must not have both a value and other contained extensions",
                location,
            ),
            Error::UnexpectedWrapper {
                expected,
                found,
                location,
            } => fmt_with_location(
                f,
                &format!("expecting outer element called '{expected}', found: {found}"),
                location,
            ),
            Error::NotAResource { name, location } => fmt_with_location(
                f,
                &format!("element '{name}' is not a resource, expected a resource at this position"),
                location,
            ),
            Error::Incomplete { location } => {
                fmt_with_location(f, "input ended before the document was complete", location)
            }
            Error::Failed { location } => fmt_with_location(
                f,
                "parser instance already failed and cannot process further input",
                location,
            ),
        }
    }
}

impl std::error::Error for Error {}

/// Print a message optionally suffixed with "at line X, column Y".
fn fmt_with_location(f: &mut fmt::Formatter<'_>, msg: &str, location: &Location) -> fmt::Result {
    if location.is_known() {
        write!(
            f,
            "{msg} at line {}, column {}",
            location.row, location.column
        )
    } else {
        write!(f, "{msg}")
    }
}
