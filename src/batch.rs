//! Bounded staging of arcs and their encoded labels.

use std::path::Path;

use crate::bits::{BitReader, BitWriter};
use crate::error::{Error, Result};
use crate::label::{Label, LabelMergeStrategy};
use crate::NodeId;

/// Largest bit offset a batch can address.
pub const MAX_BATCH_BITS: u64 = u32::max_value() as u64;

/// The largest batch whose `width`-bit labels fit in `MAX_BATCH_BITS`.
pub fn max_batch_size(width: u32) -> usize {
    if width == 0 { usize::max_value() } else { (MAX_BATCH_BITS / width as u64) as usize }
}

/// A full (or final) batch: co-indexed arcs, label offsets and label bits.
pub struct BatchView<'a> {
    pub sources: &'a [NodeId],
    pub targets: &'a [NodeId],
    pub offsets: &'a [u32],
    pub labels: &'a [u8],
}

impl<'a> BatchView<'a> {
    pub fn len(&self) -> usize { self.sources.len() }
    pub fn is_empty(&self) -> bool { self.sources.is_empty() }

    /// Decodes the label of arc `index` into a copy of `prototype`.
    pub fn label(&self, index: usize, prototype: &Label) -> Result<Label> {
        let mut label = prototype.clone();
        let mut reader = BitReader::new(self.labels);
        reader.set_position(self.offsets[index] as u64);
        label.decode(&mut reader)?;
        Ok(label)
    }
}

/// Receives batches of arcs; owns sorting, deduplication and storage.
pub trait BatchSink {
    /// Returns the number of arcs the batch materialized into.
    fn process(&mut self, batch: &BatchView, prototype: &Label, merge: Option<&dyn LabelMergeStrategy>, temp_dir: Option<&Path>) -> Result<u64>;
}

impl<'b, S: BatchSink + ?Sized> BatchSink for &'b mut S {
    fn process(&mut self, batch: &BatchView, prototype: &Label, merge: Option<&dyn LabelMergeStrategy>, temp_dir: Option<&Path>) -> Result<u64> {
        (**self).process(batch, prototype, merge, temp_dir)
    }
}

pub struct Batch {
    capacity: usize,
    sources: Vec<NodeId>,
    targets: Vec<NodeId>,
    offsets: Vec<u32>,
    labels: BitWriter,
}

impl Batch {
    pub fn new(capacity: usize) -> Batch {
        let reserve = ::std::cmp::min(capacity, 1 << 20);
        Batch {
            capacity,
            sources: Vec::with_capacity(reserve),
            targets: Vec::with_capacity(reserve),
            offsets: Vec::with_capacity(reserve),
            labels: BitWriter::new(),
        }
    }

    pub fn len(&self) -> usize { self.sources.len() }
    pub fn is_empty(&self) -> bool { self.sources.is_empty() }
    pub fn is_full(&self) -> bool { self.sources.len() >= self.capacity }
    pub fn label_bits(&self) -> u64 { self.labels.bits() }

    /// Stages an arc, encoding `label` after the previous ones.
    pub fn push(&mut self, source: NodeId, target: NodeId, label: &Label) -> Result<()> {
        let offset = self.labels.bits();
        label.encode(&mut self.labels);
        if self.labels.bits() > MAX_BATCH_BITS {
            return Err(Error::BatchOverflow { batch_size: self.capacity });
        }
        self.sources.push(source);
        self.targets.push(target);
        self.offsets.push(offset as u32);
        Ok(())
    }

    pub fn view(&self) -> BatchView {
        BatchView {
            sources: &self.sources[..],
            targets: &self.targets[..],
            offsets: &self.offsets[..],
            labels: self.labels.as_bytes(),
        }
    }

    pub fn clear(&mut self) {
        self.sources.clear();
        self.targets.clear();
        self.offsets.clear();
        self.labels.clear();
    }
}

#[test]
#[cfg(test)]
fn staged_labels_decode_in_place() {
    let mut batch = Batch::new(3);
    let mut label = Label::list();
    for (i, &(s, t)) in [(0, 1), (2, 1), (0, 3)].iter().enumerate() {
        label.init(100 + i as u64).unwrap();
        label.push(i as u64).unwrap();
        batch.push(s, t, &label).unwrap();
    }
    assert!(batch.is_full());
    let view = batch.view();
    assert_eq!(view.sources, &[0, 2, 0]);
    assert_eq!(view.targets, &[1, 1, 3]);
    assert_eq!(view.offsets[0], 0);
    assert_eq!(view.label(1, &Label::list()).unwrap().values(), &[101, 1]);
    assert_eq!(view.label(2, &Label::list()).unwrap().values(), &[102, 2]);
    batch.clear();
    assert!(batch.is_empty());
    assert_eq!(batch.label_bits(), 0);
}

#[test]
#[cfg(test)]
fn batch_sizes_for_widths() {
    assert_eq!(max_batch_size(0), usize::max_value());
    assert_eq!(max_batch_size(1), u32::max_value() as usize);
    assert_eq!(max_batch_size(32), 134_217_727);
}
