//! XML event source: drives a [`Parser`] from XML text via `quick-xml`.
//!
//! The adapter owns the two format-specific concerns the state machine is
//! agnostic about:
//! - recognizing extension elements (`extension` / `modifierExtension` with a
//!   `url` attribute) and delivering them as extension markers with the URL
//!   already extracted,
//! - translating byte offsets into line/column locations for diagnostics.
//!
//! Self-closing elements are delivered as a start immediately followed by the
//! matching end.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event as XmlEvent};

use crate::error::{Error, Location};
use crate::event::Event;
use crate::node::Document;
use crate::parser::Parser;
use crate::schema::ModelRegistry;

/// Parse a single top-level typed value from XML text.
pub fn read_document<R: ModelRegistry>(registry: &R, input: &str) -> Result<Document, Error> {
    let mut parser = Parser::document(registry);
    drive(&mut parser, input)?;
    parser.finish()
}

/// Parse a feed-style bundle from XML text.
pub fn read_feed<R: ModelRegistry>(registry: &R, input: &str) -> Result<Document, Error> {
    let mut parser = Parser::feed(registry);
    drive(&mut parser, input)?;
    parser.finish()
}

/// Byte-offset to line/column translation, built once per input.
struct LineIndex {
    /// Byte offset of the start of each line.
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(input: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in input.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    fn location(&self, offset: usize) -> Location {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let column = offset - self.line_starts[line] + 1;
        Location::new(line as u32 + 1, column as u32)
    }
}

/// Pump every XML event through the parser.
fn drive<R: ModelRegistry>(parser: &mut Parser<'_, R>, input: &str) -> Result<(), Error> {
    let index = LineIndex::new(input);
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    loop {
        let offset = reader.buffer_position() as usize;
        let location = index.location(offset);
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) => {
                handle_start(parser, &e, location)?;
            }
            Ok(XmlEvent::Empty(e)) => {
                let name = element_name(&e)?;
                handle_start(parser, &e, location)?;
                parser.end_element(&name, location)?;
            }
            Ok(XmlEvent::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                parser.end_element(&name, location)?;
            }
            Ok(XmlEvent::Text(e)) => {
                let data = e
                    .unescape()
                    .map_err(|e| Error::msg(format!("malformed text content: {e}")).with_location(location))?
                    .into_owned();
                parser.other(Event::Text { data, location })?;
            }
            Ok(XmlEvent::CData(e)) => {
                let data = String::from_utf8_lossy(e.as_ref()).into_owned();
                parser.other(Event::Text { data, location })?;
            }
            Ok(XmlEvent::Comment(e)) => {
                let data = String::from_utf8_lossy(e.as_ref()).into_owned();
                parser.other(Event::Comment { data, location })?;
            }
            Ok(XmlEvent::Eof) => break,
            // Declarations, processing instructions and doctypes carry no
            // structure for the state machine.
            Ok(_) => {}
            Err(e) => {
                let location = index.location(reader.error_position() as usize);
                return Err(
                    Error::msg(format!("malformed XML: {e}")).with_location(location)
                );
            }
        }
    }
    Ok(())
}

fn element_name(e: &BytesStart<'_>) -> Result<String, Error> {
    std::str::from_utf8(e.local_name().as_ref())
        .map(str::to_owned)
        .map_err(|e| Error::msg(format!("invalid element name: {e}")))
}

/// Deliver one start tag: either an extension marker with its URL stripped
/// out, or a plain element followed by its attributes in document order.
fn handle_start<R: ModelRegistry>(
    parser: &mut Parser<'_, R>,
    e: &BytesStart<'_>,
    location: Location,
) -> Result<(), Error> {
    let name = element_name(e)?;
    let is_extension = name == "extension" || name == "modifierExtension";

    let extension_url = if is_extension {
        attribute_value(e, b"url", location)?
    } else {
        None
    };

    match extension_url {
        Some(url) => parser.begin_extension(&url, location)?,
        None => parser.begin_element(&name, location)?,
    }

    for attr in e.attributes() {
        let attr =
            attr.map_err(|e| Error::msg(format!("malformed attribute: {e}")).with_location(location))?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        if is_extension && attr.key.as_ref() == b"url" {
            continue;
        }
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(|e| Error::msg(format!("invalid attribute name: {e}")).with_location(location))?
            .to_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::msg(format!("malformed attribute value: {e}")).with_location(location))?
            .into_owned();
        parser.attribute(&key, &value)?;
    }
    Ok(())
}

/// Unescaped value of the attribute named `key`, if present.
fn attribute_value(
    e: &BytesStart<'_>,
    key: &[u8],
    location: Location,
) -> Result<Option<String>, Error> {
    for attr in e.attributes() {
        let attr =
            attr.map_err(|e| Error::msg(format!("malformed attribute: {e}")).with_location(location))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| {
                    Error::msg(format!("malformed attribute value: {e}")).with_location(location)
                })?
                .into_owned();
            return Ok(Some(value));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::LineIndex;

    #[test]
    fn line_index_maps_offsets() {
        let index = LineIndex::new("ab\ncde\nf");
        assert_eq!(index.location(0), crate::Location::new(1, 1));
        assert_eq!(index.location(1), crate::Location::new(1, 2));
        assert_eq!(index.location(3), crate::Location::new(2, 1));
        assert_eq!(index.location(7), crate::Location::new(3, 1));
    }
}
