//! A batch sink that sorts each batch by arc, merges duplicate arcs, and
//! spills it to disk; the spilled batches are later merged into a single
//! sorted arc stream.
//!
//! Each batch becomes two files: `<stem>.arcs`, native-endian `u32`
//! (source, target) pairs sorted by source then target, and `<stem>.labels`,
//! the labels of those arcs encoded back to back.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::env;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};

use byteorder::{NativeEndian, WriteBytesExt};

use crate::batch::{BatchSink, BatchView};
use crate::bits::{BitReader, BitWriter};
use crate::error::Result;
use crate::label::{Label, LabelMergeStrategy};
use crate::typedrw::TypedMemoryMap;
use crate::NodeId;

static SINKS: AtomicUsize = AtomicUsize::new(0);

struct Spill {
    arcs: PathBuf,
    labels: PathBuf,
}

impl Drop for Spill {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.arcs);
        let _ = fs::remove_file(&self.labels);
    }
}

fn merge_labels(merge: Option<&dyn LabelMergeStrategy>, first: Label, second: Label) -> Result<Label> {
    match merge {
        Some(merge) => merge.merge(first, &second),
        None => Ok(second),
    }
}

pub struct SortedBatches {
    id: usize,
    spills: Vec<Spill>,
    arcs: u64,
    bytes: u64,
}

impl Default for SortedBatches {
    fn default() -> SortedBatches { SortedBatches::new() }
}

impl SortedBatches {
    pub fn new() -> SortedBatches {
        SortedBatches { id: SINKS.fetch_add(1, Ordering::Relaxed), spills: Vec::new(), arcs: 0, bytes: 0 }
    }

    /// Number of spilled batches.
    pub fn batches(&self) -> usize { self.spills.len() }

    /// Arcs written across all batches, counting duplicates in different batches.
    pub fn arcs(&self) -> u64 { self.arcs }

    /// Bits of spilled data per arc.
    pub fn bits_per_arc(&self) -> f64 {
        if self.arcs == 0 { 0.0 } else { 8.0 * self.bytes as f64 / self.arcs as f64 }
    }

    /// Merges the spilled batches into one stream sorted by source, then target.
    ///
    /// Duplicate arcs from different batches are merged with `merge`, or
    /// resolved in favour of the later batch.
    pub fn into_arcs(self, prototype: Label, merge: Option<Box<dyn LabelMergeStrategy>>) -> Result<MergedArcs> {
        let mut runs = Vec::with_capacity(self.spills.len());
        let mut heap = BinaryHeap::new();
        for (index, spill) in self.spills.into_iter().enumerate() {
            let mut run = Run {
                arcs: TypedMemoryMap::new(&spill.arcs)?,
                labels: TypedMemoryMap::new(&spill.labels)?,
                next: 0,
                position: 0,
                head: None,
                _spill: spill,
            };
            if let Some(arc) = run.advance(&prototype)? {
                heap.push(Reverse((arc.0, arc.1, index)));
            }
            runs.push(run);
        }
        Ok(MergedArcs { runs, heap, prototype, merge })
    }
}

impl BatchSink for SortedBatches {
    fn process(&mut self, batch: &BatchView, prototype: &Label, merge: Option<&dyn LabelMergeStrategy>, temp_dir: Option<&Path>) -> Result<u64> {
        let mut arcs = Vec::with_capacity(batch.len());
        for index in 0 .. batch.len() {
            arcs.push((batch.sources[index], batch.targets[index], batch.label(index, prototype)?));
        }
        // stable, so equal arcs keep their staging order
        arcs.sort_by_key(|&(s, t, _)| (s, t));

        let mut distinct: Vec<(NodeId, NodeId, Label)> = Vec::with_capacity(arcs.len());
        for (s, t, label) in arcs {
            match distinct.last_mut() {
                Some(last) if last.0 == s && last.1 == t => {
                    let first = mem::replace(&mut last.2, Label::scalar());
                    last.2 = merge_labels(merge, first, label)?;
                }
                _ => distinct.push((s, t, label)),
            }
        }

        let dir = temp_dir.map(Path::to_path_buf).unwrap_or_else(env::temp_dir);
        let stem = dir.join(format!("txgraph-{}-{}-{}", process::id(), self.id, self.spills.len()));
        let spill = Spill { arcs: stem.with_extension("arcs"), labels: stem.with_extension("labels") };

        let mut arc_writer = BufWriter::new(File::create(&spill.arcs)?);
        let mut labels = BitWriter::new();
        for &(s, t, ref label) in &distinct {
            arc_writer.write_u32::<NativeEndian>(s)?;
            arc_writer.write_u32::<NativeEndian>(t)?;
            label.encode(&mut labels);
        }
        arc_writer.flush()?;
        let labels = labels.into_bytes();
        File::create(&spill.labels)?.write_all(&labels)?;

        self.bytes += 8 * distinct.len() as u64 + labels.len() as u64;
        self.arcs += distinct.len() as u64;
        debug!("batch {}: {} arcs staged, {} distinct", self.spills.len(), batch.len(), distinct.len());
        self.spills.push(spill);
        Ok(distinct.len() as u64)
    }
}

struct Run {
    arcs: TypedMemoryMap<u32>,
    labels: TypedMemoryMap<u8>,
    next: usize,
    position: u64,
    head: Option<Label>,
    _spill: Spill,
}

impl Run {
    // loads the next arc into `head`, returning its endpoints
    fn advance(&mut self, prototype: &Label) -> Result<Option<(NodeId, NodeId)>> {
        let arcs = &self.arcs[..];
        if 2 * self.next + 1 >= arcs.len() {
            self.head = None;
            return Ok(None);
        }
        let arc = (arcs[2 * self.next], arcs[2 * self.next + 1]);
        let mut label = prototype.clone();
        let mut reader = BitReader::new(&self.labels[..]);
        reader.set_position(self.position);
        label.decode(&mut reader)?;
        self.position = reader.position();
        self.next += 1;
        self.head = Some(label);
        Ok(Some(arc))
    }
}

/// Arcs of all batches in (source, target) order, without duplicates.
pub struct MergedArcs {
    runs: Vec<Run>,
    heap: BinaryHeap<Reverse<(NodeId, NodeId, usize)>>,
    prototype: Label,
    merge: Option<Box<dyn LabelMergeStrategy>>,
}

impl MergedArcs {
    // takes the head label of run `index` and queues its next arc
    fn pop(&mut self, index: usize) -> Result<Label> {
        let prototype = &self.prototype;
        let run = &mut self.runs[index];
        let label = run.head.take().unwrap_or_else(|| prototype.clone());
        if let Some((s, t)) = run.advance(prototype)? {
            self.heap.push(Reverse((s, t, index)));
        }
        Ok(label)
    }

    fn next_arc(&mut self, s: NodeId, t: NodeId, index: usize) -> Result<(NodeId, NodeId, Label)> {
        let mut label = self.pop(index)?;
        while let Some(&Reverse((s2, t2, other))) = self.heap.peek() {
            if (s2, t2) != (s, t) { break; }
            self.heap.pop();
            let next = self.pop(other)?;
            label = merge_labels(self.merge.as_ref().map(|m| &**m), label, next)?;
        }
        Ok((s, t, label))
    }
}

impl Iterator for MergedArcs {
    type Item = Result<(NodeId, NodeId, Label)>;
    fn next(&mut self) -> Option<Self::Item> {
        let Reverse((s, t, index)) = self.heap.pop()?;
        Some(self.next_arc(s, t, index))
    }
}

#[cfg(test)]
use crate::batch::Batch;
#[cfg(test)]
use crate::label::Concatenate;

#[cfg(test)]
fn stage(sink: &mut SortedBatches, arcs: &[(NodeId, NodeId, u64)], merge: Option<&dyn LabelMergeStrategy>, dir: &Path) -> u64 {
    let mut batch = Batch::new(arcs.len());
    let mut label = Label::mergeable_list(8).unwrap();
    for &(s, t, v) in arcs {
        label.init(v).unwrap();
        batch.push(s, t, &label).unwrap();
    }
    sink.process(&batch.view(), &label, merge, Some(dir)).unwrap()
}

#[cfg(test)]
fn collect(arcs: MergedArcs) -> Vec<(NodeId, NodeId, Vec<u64>)> {
    arcs.map(|arc| arc.map(|(s, t, l)| (s, t, l.values().to_vec()))).collect::<Result<_>>().unwrap()
}

#[test]
#[cfg(test)]
fn merges_within_and_across_batches() {
    let dir = ::tempdir::TempDir::new("sorted").unwrap();
    let mut sink = SortedBatches::new();
    assert_eq!(stage(&mut sink, &[(2, 0, 1), (0, 1, 2), (2, 0, 3)], Some(&Concatenate), dir.path()), 2);
    assert_eq!(stage(&mut sink, &[(0, 1, 4), (1, 2, 5)], Some(&Concatenate), dir.path()), 2);
    assert_eq!(sink.batches(), 2);
    assert_eq!(sink.arcs(), 4);
    assert!(sink.bits_per_arc() > 64.0);

    let prototype = Label::mergeable_list(8).unwrap();
    let arcs = collect(sink.into_arcs(prototype, Some(Box::new(Concatenate))).unwrap());
    assert_eq!(arcs, vec![(0, 1, vec![2, 4]), (1, 2, vec![5]), (2, 0, vec![1, 3])]);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
#[cfg(test)]
fn keeps_the_latest_label_without_merge() {
    let dir = ::tempdir::TempDir::new("sorted").unwrap();
    let mut sink = SortedBatches::new();
    stage(&mut sink, &[(0, 1, 1), (0, 1, 2)], None, dir.path());
    stage(&mut sink, &[(0, 1, 3), (3, 3, 9)], None, dir.path());
    stage(&mut sink, &[], None, dir.path());
    let arcs = collect(sink.into_arcs(Label::mergeable_list(8).unwrap(), None).unwrap());
    assert_eq!(arcs, vec![(0, 1, vec![3]), (3, 3, vec![9])]);
}
