// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sequences: ordered lists of typed byte payloads exchanged over channels.
//!
//! Inbound sequences are created by the native layer and only live for the
//! duration of the callback they are delivered to. Outbound sequences are
//! assembled with a [`SequenceBuilder`], which copies payloads in.

mod view;

pub use view::{ElementRef, SequenceView};

use serde::Serialize;
use std::fmt;

/// Opaque native identity of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SequenceHandle(pub u64);

impl fmt::Display for SequenceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq#{:x}", self.0)
    }
}

/// Application-level sequence id (the name service uses a fixed one).
pub type SequenceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceType {
    Data,
    Request,
    Query,
    Subscribe,
    Other(u8),
}

impl SequenceType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => SequenceType::Data,
            1 => SequenceType::Request,
            2 => SequenceType::Query,
            3 => SequenceType::Subscribe,
            other => SequenceType::Other(other),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            SequenceType::Data => 0,
            SequenceType::Request => 1,
            SequenceType::Query => 2,
            SequenceType::Subscribe => 3,
            SequenceType::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Io,
    Data,
    Mgmt,
    Net,
}

impl ServiceType {
    pub fn raw(self) -> u8 {
        match self {
            ServiceType::Io => 1,
            ServiceType::Data => 2,
            ServiceType::Mgmt => 3,
            ServiceType::Net => 4,
        }
    }
}

/// One payload in a sequence together with its user type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    payload: Vec<u8>,
    type_tag: u64,
}

impl Element {
    pub fn new(payload: Vec<u8>, type_tag: u64) -> Self {
        Self { payload, type_tag }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn type_tag(&self) -> u64 {
        self.type_tag
    }
}

/// An immutable sequence. Once built its elements never change, so any
/// number of views may walk it concurrently.
#[derive(Debug, PartialEq, Eq)]
pub struct Sequence {
    handle: SequenceHandle,
    id: SequenceId,
    name: String,
    sequence_type: SequenceType,
    service_type: ServiceType,
    elements: Vec<Element>,
}

impl Sequence {
    pub fn builder(name: impl Into<String>, id: SequenceId) -> SequenceBuilder {
        SequenceBuilder {
            name: name.into(),
            id,
            sequence_type: SequenceType::Data,
            service_type: ServiceType::Data,
            elements: Vec::new(),
        }
    }

    pub fn handle(&self) -> SequenceHandle {
        self.handle
    }

    pub fn id(&self) -> SequenceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sequence_type(&self) -> SequenceType {
        self.sequence_type
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn count(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// A fresh view positioned at the first element.
    pub fn iter(&self) -> SequenceView<'_> {
        SequenceView::new(self)
    }

    /// Payload of the first element carrying `type_tag`.
    pub fn find_by_type(&self, type_tag: u64) -> Option<&[u8]> {
        self.elements
            .iter()
            .find(|e| e.type_tag == type_tag)
            .map(|e| e.payload.as_slice())
    }

    /// A builder pre-loaded with this sequence's header and elements.
    pub fn to_builder(&self) -> SequenceBuilder {
        SequenceBuilder {
            name: self.name.clone(),
            id: self.id,
            sequence_type: self.sequence_type,
            service_type: self.service_type,
            elements: self.elements.clone(),
        }
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = ElementRef<'a>;
    type IntoIter = SequenceView<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Assembles a sequence by copying payloads in.
#[derive(Debug, Clone)]
pub struct SequenceBuilder {
    name: String,
    id: SequenceId,
    sequence_type: SequenceType,
    service_type: ServiceType,
    elements: Vec<Element>,
}

impl SequenceBuilder {
    pub fn sequence_type(mut self, sequence_type: SequenceType) -> Self {
        self.sequence_type = sequence_type;
        self
    }

    pub fn service_type(mut self, service_type: ServiceType) -> Self {
        self.service_type = service_type;
        self
    }

    pub fn copy_bytes(&mut self, data: &[u8], type_tag: u64) -> &mut Self {
        self.elements.push(Element::new(data.to_vec(), type_tag));
        self
    }

    /// Copy a string payload. No terminator is appended.
    pub fn copy_str(&mut self, data: &str, type_tag: u64) -> &mut Self {
        self.copy_bytes(data.as_bytes(), type_tag)
    }

    pub fn push_element(&mut self, element: Element) -> &mut Self {
        self.elements.push(element);
        self
    }

    /// Append every element of `other`, preserving order and tags.
    pub fn append_from(&mut self, other: &Sequence) -> &mut Self {
        self.elements.extend(other.elements.iter().cloned());
        self
    }

    pub fn count(&self) -> usize {
        self.elements.len()
    }

    pub fn build(self, handle: SequenceHandle) -> Sequence {
        Sequence {
            handle,
            id: self.id,
            name: self.name,
            sequence_type: self.sequence_type,
            service_type: self.service_type,
            elements: self.elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_copies_payloads_in_order() {
        let mut source = vec![1u8, 2, 3];
        let mut builder = Sequence::builder("telemetry", 7).sequence_type(SequenceType::Data);
        builder.copy_bytes(&source, 0x10).copy_str("hello", 0x11);
        source[0] = 99;

        let seq = builder.build(SequenceHandle(1));
        assert_eq!(seq.count(), 2);
        assert_eq!(seq.elements()[0].payload(), &[1, 2, 3]);
        assert_eq!(seq.elements()[1].payload(), b"hello");
        assert_eq!(seq.name(), "telemetry");
        assert_eq!(seq.id(), 7);
    }

    #[test]
    fn test_find_by_type_returns_first_match() {
        let mut builder = Sequence::builder("s", 1);
        builder.copy_str("a", 1).copy_str("b", 2).copy_str("c", 2);
        let seq = builder.build(SequenceHandle(2));

        assert_eq!(seq.find_by_type(2), Some(&b"b"[..]));
        assert_eq!(seq.find_by_type(3), None);
    }

    #[test]
    fn test_append_from_merges_elements() {
        let mut meta = Sequence::builder("meta", 2);
        meta.copy_str("rack-4", 0x200);
        let meta = meta.build(SequenceHandle(3));

        let mut builder = Sequence::builder("request", 1);
        builder.copy_str("svc", 1).append_from(&meta);
        let seq = builder.build(SequenceHandle(4));

        let tags: Vec<u64> = seq.elements().iter().map(Element::type_tag).collect();
        assert_eq!(tags, vec![1, 0x200]);
    }

    #[test]
    fn test_sequence_type_raw_codes() {
        assert_eq!(SequenceType::from_raw(2), SequenceType::Query);
        assert_eq!(SequenceType::Subscribe.raw(), 3);
        assert_eq!(SequenceType::from_raw(40), SequenceType::Other(40));
    }
}
