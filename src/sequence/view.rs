// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Read-only traversal of a sequence's elements.

use crate::sequence::Sequence;
use std::iter::FusedIterator;

/// One element as seen through a [`SequenceView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementRef<'a> {
    pub sequence: &'a Sequence,
    pub payload: &'a [u8],
    pub type_tag: u64,
}

/// Restartable iterator over a sequence, yielding `(sequence, payload, tag)`
/// for each element in order.
///
/// A view borrows its sequence, so it cannot outlive it. Once the cursor
/// reaches the end it stays there; start over with [`Sequence::iter`] or
/// [`SequenceView::restart`].
#[derive(Debug, Clone)]
pub struct SequenceView<'a> {
    sequence: &'a Sequence,
    cursor: usize,
}

impl<'a> SequenceView<'a> {
    pub fn new(sequence: &'a Sequence) -> Self {
        Self {
            sequence,
            cursor: 0,
        }
    }

    pub fn sequence(&self) -> &'a Sequence {
        self.sequence
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor >= self.sequence.elements.len()
    }

    pub fn restart(&mut self) {
        self.cursor = 0;
    }
}

impl<'a> Iterator for SequenceView<'a> {
    type Item = ElementRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.sequence.elements.get(self.cursor)?;
        self.cursor += 1;
        Some(ElementRef {
            sequence: self.sequence,
            payload: &element.payload,
            type_tag: element.type_tag,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.sequence.elements.len().saturating_sub(self.cursor);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SequenceView<'_> {}

impl FusedIterator for SequenceView<'_> {}
