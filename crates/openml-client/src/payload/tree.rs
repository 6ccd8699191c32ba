//! Minimal element tree over `quick-xml` events.
//!
//! Names are stored without namespace prefix, so `oml:did` becomes `did`.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{OpenMlError, OpenMlResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Parse a document and return its root element.
    pub fn parse(bytes: &[u8]) -> OpenMlResult<Element> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(open(&start)?),
                Event::Empty(start) => {
                    let element = open(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| OpenMlError::invalid_response("unbalanced end tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(OpenMlError::invalid_response(
                "unexpected end of xml document",
            ));
        }
        root.ok_or_else(|| OpenMlError::invalid_response("empty xml document"))
    }

    /// Parse and require a specific root element name.
    pub fn parse_root(bytes: &[u8], expected: &str) -> OpenMlResult<Element> {
        let root = Self::parse(bytes)?;
        if root.name != expected {
            return Err(OpenMlError::invalid_response(format!(
                "expected <{}> document, got <{}>",
                expected, root.name
            )));
        }
        Ok(root)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of the first child with this name; empty text counts as absent.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Required child text, parsed.
    pub fn require<T: std::str::FromStr>(&self, name: &str) -> OpenMlResult<T> {
        let text = self.child_text(name).ok_or_else(|| {
            OpenMlError::invalid_response(format!("<{}> is missing <{}>", self.name, name))
        })?;
        text.parse().map_err(|_| {
            OpenMlError::invalid_response(format!("<{}> has invalid value {:?}", name, text))
        })
    }

    /// Optional child text, owned.
    pub fn optional(&self, name: &str) -> Option<String> {
        self.child_text(name).map(String::from)
    }
}

fn open(start: &BytesStart<'_>) -> OpenMlResult<Element> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value: Cow<'_, str> = attr.unescape_value()?;
        attributes.push((key, value.into_owned()));
    }
    Ok(Element {
        name,
        attributes,
        ..Element::default()
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> OpenMlResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(OpenMlError::invalid_response(
                "xml document has more than one root element",
            ))
        }
    }
    Ok(())
}
