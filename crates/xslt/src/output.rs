//! The output event interface and the buffered result-tree-fragment.
//!
//! Instruction execution emits events into an [`EventSink`]; the external
//! serializer is one implementation, and [`RtfBuffer`] is the other: it
//! records the stream so a variable holding constructed content can later
//! be read as a single document node.

use std::sync::Arc;

use stilo_xdm::{QName, TreeBuilder, XmlNode, XmlTree};

use crate::error::{Result, XsltError};

/// The abstract output handler the runtime emits into.
pub trait EventSink {
    fn start_document(&mut self);
    fn end_document(&mut self);
    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str);
    fn end_prefix_mapping(&mut self, prefix: Option<&str>);
    fn start_element(&mut self, name: &QName, uri: Option<&str>);
    fn attribute(&mut self, name: &QName, uri: Option<&str>, value: &str);
    fn end_element(&mut self);
    fn characters(&mut self, text: &str);
    fn comment(&mut self, text: &str);
    fn processing_instruction(&mut self, target: &str, data: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    StartDocument,
    EndDocument,
    StartPrefixMapping { prefix: Option<String>, uri: String },
    EndPrefixMapping { prefix: Option<String> },
    StartElement { name: QName, uri: Option<String> },
    Attribute { name: QName, uri: Option<String>, value: String },
    EndElement,
    Characters(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

/// A buffered event stream interpretable as a single document node.
#[derive(Debug, Default)]
pub struct RtfBuffer {
    events: Vec<OutputEvent>,
}

impl RtfBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    /// Replays the buffered events into an owned tree and returns its
    /// document node.
    pub fn into_document(self) -> Result<XmlNode> {
        let mut builder = TreeBuilder::new();
        for event in &self.events {
            match event {
                OutputEvent::StartDocument | OutputEvent::EndDocument => {}
                OutputEvent::StartPrefixMapping { prefix, uri } => {
                    builder.namespace(prefix.as_deref(), uri);
                }
                OutputEvent::EndPrefixMapping { .. } => {}
                OutputEvent::StartElement { name, uri } => {
                    builder.start_element(name.clone(), uri.as_deref());
                }
                OutputEvent::Attribute { name, uri, value } => {
                    builder.attribute(name.clone(), uri.as_deref(), value);
                }
                OutputEvent::EndElement => builder
                    .end_element()
                    .map_err(|err| XsltError::Output(err.to_string()))?,
                OutputEvent::Characters(text) => builder.text(text),
                OutputEvent::Comment(text) => builder.comment(text),
                OutputEvent::ProcessingInstruction { target, data } => {
                    builder.processing_instruction(target, data);
                }
            }
        }
        let tree: Arc<XmlTree> = builder
            .finish()
            .map_err(|err| XsltError::Output(err.to_string()))?;
        Ok(tree.root())
    }
}

impl EventSink for RtfBuffer {
    fn start_document(&mut self) {
        self.events.push(OutputEvent::StartDocument);
    }

    fn end_document(&mut self) {
        self.events.push(OutputEvent::EndDocument);
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        self.events.push(OutputEvent::StartPrefixMapping {
            prefix: prefix.map(str::to_string),
            uri: uri.to_string(),
        });
    }

    fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        self.events.push(OutputEvent::EndPrefixMapping {
            prefix: prefix.map(str::to_string),
        });
    }

    fn start_element(&mut self, name: &QName, uri: Option<&str>) {
        self.events.push(OutputEvent::StartElement {
            name: name.clone(),
            uri: uri.map(str::to_string),
        });
    }

    fn attribute(&mut self, name: &QName, uri: Option<&str>, value: &str) {
        self.events.push(OutputEvent::Attribute {
            name: name.clone(),
            uri: uri.map(str::to_string),
            value: value.to_string(),
        });
    }

    fn end_element(&mut self) {
        self.events.push(OutputEvent::EndElement);
    }

    fn characters(&mut self, text: &str) {
        self.events.push(OutputEvent::Characters(text.to_string()));
    }

    fn comment(&mut self, text: &str) {
        self.events.push(OutputEvent::Comment(text.to_string()));
    }

    fn processing_instruction(&mut self, target: &str, data: &str) {
        self.events.push(OutputEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::{NodeKind, SourceNode};

    #[test]
    fn buffered_events_become_a_document() {
        let mut buffer = RtfBuffer::new();
        buffer.start_document();
        buffer.start_element(&QName::new("out"), None);
        buffer.attribute(&QName::new("k"), None, "v");
        buffer.characters("hello ");
        buffer.characters("world");
        buffer.start_element(&QName::new("inner"), None);
        buffer.end_element();
        buffer.end_element();
        buffer.end_document();

        let document = buffer.into_document().unwrap();
        assert_eq!(document.node_kind(), NodeKind::Document);
        assert_eq!(document.string_value(), "hello world");
        let out = document.children().next().unwrap();
        assert_eq!(out.attributes().next().unwrap().string_value(), "v");
        assert_eq!(out.children().count(), 2);
    }

    #[test]
    fn unbalanced_events_error() {
        let mut buffer = RtfBuffer::new();
        buffer.start_element(&QName::new("open"), None);
        assert!(buffer.into_document().is_err());
    }
}
