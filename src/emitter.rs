//! The merge join of the inputs and outputs streams.
//!
//! Input transactions are read one group at a time. Each input key is then
//! looked up in the outputs stream, which skips smaller keys and leaves
//! larger ones for later. Every matched pair of groups becomes the product
//! of its addresses, minus self-loops, all carrying the transaction label.

use std::io::BufRead;

use crate::batch::{Batch, BatchSink, MAX_BATCH_BITS};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::label::Labelling;
use crate::progress::ProgressLogger;
use crate::scanner::{AddressResolver, LineScanner};

/// Counters of a finished build.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    /// Nodes addressed (the declared count for an address map).
    pub nodes: usize,
    /// Input transactions read.
    pub transactions: u64,
    /// Input transactions with no outputs.
    pub unmatched: u64,
    /// Output lines discarded because no input transaction asked for them.
    pub skipped_outputs: u64,
    /// Arcs staged, duplicates included.
    pub arcs: u64,
    /// Arcs the sink reported after its own deduplication.
    pub materialized: u64,
    /// Bits of label data staged.
    pub label_bits: u64,
    pub batches: u64,
}

impl Stats {
    /// Staged label bits per materialized arc.
    pub fn bits_per_arc(&self) -> f64 {
        if self.materialized == 0 { 0.0 } else { self.label_bits as f64 / self.materialized as f64 }
    }
}

/// What a build hands back: the sink, the resolver (with any numbering it
/// assigned), the labelling, and the counters.
pub struct Outcome<S> {
    pub sink: S,
    pub resolver: AddressResolver,
    pub labelling: Labelling,
    pub stats: Stats,
}

pub struct ArcEmitter<I, O, S> {
    inputs: LineScanner<I>,
    outputs: LineScanner<O>,
    resolver: AddressResolver,
    labelling: Labelling,
    config: Config,
    sink: S,
}

impl<I: BufRead, O: BufRead, S: BatchSink> ArcEmitter<I, O, S> {
    /// Checks the configuration and opens both streams.
    ///
    /// Fails before reading anything if the batch size is zero, if an
    /// address map has no node count, or if fixed-width labels of a full
    /// batch would not fit 32-bit offsets; fails on the first line if a
    /// stream has no transactions.
    pub fn new(inputs: I, outputs: O, resolver: AddressResolver, labelling: Labelling, config: Config, sink: S) -> Result<ArcEmitter<I, O, S>> {
        if config.batch_size == 0 {
            return Err(Error::InvalidBatchSize);
        }
        resolver.validate()?;
        if let Some(width) = labelling.prototype.fixed_width() {
            if config.batch_size as u128 * width as u128 > MAX_BATCH_BITS as u128 {
                return Err(Error::BatchOverflow { batch_size: config.batch_size });
            }
        }
        let inputs = LineScanner::new("inputs", inputs, config.strict)?;
        let outputs = LineScanner::new("outputs", outputs, config.strict)?;
        Ok(ArcEmitter { inputs, outputs, resolver, labelling, config, sink })
    }

    /// Joins the streams to the end of the inputs, feeding every batch to the sink.
    pub fn run(self) -> Result<Outcome<S>> {
        let ArcEmitter { mut inputs, mut outputs, mut resolver, mut labelling, config, mut sink } = self;
        let mut batch = Batch::new(config.batch_size);
        let mut progress = ProgressLogger::new(config.log_interval);
        let mut stats = Stats::default();

        loop {
            let input = match inputs.next_group(&mut resolver)? {
                Some(group) => group,
                None => break,
            };
            stats.transactions += 1;

            let output = match outputs.next_group_for(input.key, &mut resolver)? {
                Some(group) => group,
                None => {
                    stats.unmatched += 1;
                    let key = String::from_utf8_lossy(input.key).into_owned();
                    if config.strict {
                        return Err(Error::InconsistentTransactionOrder {
                            key,
                            input_line: input.line,
                            output_line: outputs.line_number(),
                        });
                    }
                    warn!("inputs:{}: transaction {:?} has no outputs; next outputs line {}: {}",
                          input.line, key, outputs.line_number(), outputs.line());
                    continue;
                }
            };

            (labelling.mapping)(&mut labelling.prototype, input.key)?;
            let mut emitted = 0;
            for &source in input.addresses {
                for &target in output.addresses {
                    if source == target { continue; }
                    batch.push(source, target, &labelling.prototype)?;
                    emitted += 1;
                    if batch.is_full() {
                        flush(&mut batch, &mut sink, &labelling, &config, &mut stats)?;
                    }
                }
            }
            stats.arcs += emitted;
            progress.update(emitted);
        }

        if !batch.is_empty() {
            flush(&mut batch, &mut sink, &labelling, &config, &mut stats)?;
        }
        stats.skipped_outputs = outputs.skipped();
        stats.nodes = resolver.num_nodes();

        if outputs.has_pending() {
            if config.strict {
                return Err(Error::UnreadOutputs { stream: outputs.name().to_owned(), line: outputs.line_number() });
            }
            warn!("{}:{}: outputs left unread after the last input transaction: {}",
                  outputs.name(), outputs.line_number(), outputs.line());
        }

        progress.done();
        info!("{} transactions ({} without outputs), {} nodes, {} arcs staged, {} materialized",
              stats.transactions, stats.unmatched, stats.nodes, stats.arcs, stats.materialized);
        info!("{:.3} label bits/arc", stats.bits_per_arc());
        Ok(Outcome { sink, resolver, labelling, stats })
    }
}

fn flush<S: BatchSink>(batch: &mut Batch, sink: &mut S, labelling: &Labelling, config: &Config, stats: &mut Stats) -> Result<()> {
    let merge = labelling.merge.as_ref().map(|merge| &**merge);
    let materialized = sink.process(&batch.view(), &labelling.prototype, merge, config.temp_dir.as_ref().map(|dir| dir.as_path()))?;
    info!("batch {}: {} arcs, {} materialized", stats.batches, batch.len(), materialized);
    stats.batches += 1;
    stats.label_bits += batch.label_bits();
    stats.materialized += materialized;
    batch.clear();
    Ok(())
}

#[cfg(test)]
use std::path::Path;
#[cfg(test)]
use std::str;
#[cfg(test)]
use crate::batch::BatchView;
#[cfg(test)]
use crate::label::{decimal_mapping, ordinal_mapping, Label, LabelMapping, LabelMergeStrategy};
#[cfg(test)]
use crate::NodeId;

#[cfg(test)]
#[derive(Default)]
struct Recorder {
    arcs: Vec<(NodeId, NodeId, Vec<u64>)>,
    batches: Vec<usize>,
}

#[cfg(test)]
impl BatchSink for Recorder {
    fn process(&mut self, batch: &BatchView, prototype: &Label, _: Option<&dyn LabelMergeStrategy>, _: Option<&Path>) -> Result<u64> {
        for index in 0 .. batch.len() {
            let label = batch.label(index, prototype)?;
            self.arcs.push((batch.sources[index], batch.targets[index], label.values().to_vec()));
        }
        self.batches.push(batch.len());
        Ok(batch.len() as u64)
    }
}

#[cfg(test)]
fn nodes(num_nodes: usize) -> AddressResolver {
    AddressResolver::map(|a: &[u8]| -> Option<i64> { str::from_utf8(a).ok()?.parse().ok() }, Some(num_nodes))
}

#[cfg(test)]
fn ordinal() -> Labelling { Labelling::new(Label::scalar(), ordinal_mapping()) }

#[cfg(test)]
fn run(inputs: &str, outputs: &str, resolver: AddressResolver, labelling: Labelling, config: Config) -> Result<Outcome<Recorder>> {
    ArcEmitter::new(inputs.as_bytes(), outputs.as_bytes(), resolver, labelling, config, Recorder::default())?.run()
}

#[cfg(test)]
fn arcs(outcome: &Outcome<Recorder>) -> Vec<(NodeId, NodeId)> {
    outcome.sink.arcs.iter().map(|&(s, t, _)| (s, t)).collect()
}

#[cfg(test)]
fn error(result: Result<Outcome<Recorder>>) -> Error {
    match result {
        Err(error) => error,
        Ok(outcome) => panic!("expected an error, got arcs {:?}", arcs(&outcome)),
    }
}

#[cfg(test)]
fn strict() -> Config { Config { strict: true, ..Config::default() } }

#[test]
#[cfg(test)]
fn one_input_group_many_addresses() {
    let outcome = run("a 0\na 1\na 2", "a 3", nodes(4), ordinal(), Config::default()).unwrap();
    assert_eq!(arcs(&outcome), vec![(0, 3), (1, 3), (2, 3)]);
    assert_eq!(outcome.stats.transactions, 1);
    assert_eq!(outcome.stats.arcs, 3);
    assert_eq!(outcome.stats.nodes, 4);
}

#[test]
#[cfg(test)]
fn unmatched_inputs_are_skipped() {
    let outcome = run("a 0\nb 2\nc 3", "a 1", nodes(4), ordinal(), Config::default()).unwrap();
    assert_eq!(arcs(&outcome), vec![(0, 1)]);
    assert_eq!(outcome.stats.unmatched, 2);

    match error(run("a 0\nb 2\nc 3", "a 1", nodes(4), ordinal(), strict())) {
        Error::InconsistentTransactionOrder { ref key, input_line: 2, .. } if key == "b" => {}
        other => panic!("unexpected {}", other),
    }
}

#[test]
#[cfg(test)]
fn unmatched_outputs_are_skipped() {
    let outcome = run("b 0\nd 1", "a 5\nb 2\nc 3\nd 4", nodes(6), ordinal(), Config::default()).unwrap();
    assert_eq!(arcs(&outcome), vec![(0, 2), (1, 4)]);
    assert_eq!(outcome.stats.skipped_outputs, 2);
}

#[test]
#[cfg(test)]
fn labels_follow_transactions() {
    let labelling = Labelling::new(Label::mergeable_list(8).unwrap(), decimal_mapping());
    let outcome = run("128 0\n129 0", "128 1\n129 1", nodes(2), labelling, Config::default()).unwrap();
    assert_eq!(outcome.sink.arcs, vec![(0, 1, vec![128]), (0, 1, vec![129])]);
}

#[test]
#[cfg(test)]
fn custom_label_mapping() {
    let mapping: LabelMapping = Box::new(|label: &mut Label, key: &[u8]| label.init(if key == b"a" { 128 } else { 129 }));
    let labelling = Labelling::new(Label::fixed(8).unwrap(), mapping);
    let outcome = run("a 0\nb 0", "a 1\nb 1", nodes(2), labelling, Config::default()).unwrap();
    assert_eq!(outcome.sink.arcs, vec![(0, 1, vec![128]), (0, 1, vec![129])]);
    assert_eq!(outcome.stats.label_bits, 16);
    assert_eq!(outcome.stats.bits_per_arc(), 8.0);
}

#[test]
#[cfg(test)]
fn address_out_of_range() {
    let resolver = AddressResolver::map(|_: &[u8]| -> Option<i64> { Some(5) }, Some(2));
    match error(run("a x", "a y", resolver, ordinal(), Config::default())) {
        Error::AddressOutOfRange { ref stream, line: 1, id: 5, num_nodes: 2, .. } if stream == "inputs" => {}
        other => panic!("unexpected {}", other),
    }
}

#[test]
#[cfg(test)]
fn empty_streams() {
    match error(run("# nothing\n", "a 1", nodes(2), ordinal(), Config::default())) {
        Error::EmptyStream { ref stream } if stream == "inputs" => {}
        other => panic!("unexpected {}", other),
    }
    match error(run("a 1", "", nodes(2), ordinal(), Config::default())) {
        Error::EmptyStream { ref stream } if stream == "outputs" => {}
        other => panic!("unexpected {}", other),
    }
}

#[test]
#[cfg(test)]
fn no_self_loops() {
    let outcome = run("t 1\nt 2", "t 1\nt 3", nodes(4), ordinal(), Config::default()).unwrap();
    assert_eq!(arcs(&outcome), vec![(1, 3), (2, 1), (2, 3)]);
    let outcome = run("t 1", "t 1", nodes(4), ordinal(), Config::default()).unwrap();
    assert!(outcome.sink.batches.is_empty());
}

#[test]
#[cfg(test)]
fn ids_in_order_of_appearance() {
    let outcome = run("x 50\nx 10\ny 70", "x 10\nx 99\ny 50", AddressResolver::assign(), ordinal(), Config::default()).unwrap();
    assert_eq!(arcs(&outcome), vec![(0, 1), (0, 2), (1, 2), (3, 0)]);
    assert_eq!(outcome.resolver.assigner().unwrap().ids(), &[50, 10, 99, 70]);
    assert_eq!(outcome.stats.nodes, 4);
}

#[test]
#[cfg(test)]
fn full_batches_are_flushed() {
    let config = Config { batch_size: 2, ..Config::default() };
    let outcome = run("k 0\nk 1\nk 2", "k 3\nk 4", nodes(5), ordinal(), config).unwrap();
    assert_eq!(outcome.sink.batches, vec![2, 2, 2]);
    assert_eq!(outcome.stats.batches, 3);
    assert_eq!(outcome.stats.materialized, 6);
}

#[test]
#[cfg(test)]
fn configuration_errors() {
    let unbounded = AddressResolver::map(|_: &[u8]| -> Option<i64> { Some(0) }, None);
    match error(run("a 0", "a 1", unbounded, ordinal(), Config::default())) {
        Error::MissingNodeCount => {}
        other => panic!("unexpected {}", other),
    }
    match error(run("a 0", "a 1", nodes(2), ordinal(), Config { batch_size: 0, ..Config::default() })) {
        Error::InvalidBatchSize => {}
        other => panic!("unexpected {}", other),
    }
    let wide = Labelling::new(Label::fixed(64).unwrap(), ordinal_mapping());
    match error(run("a 0", "a 1", nodes(2), wide, Config { batch_size: 100_000_000, ..Config::default() })) {
        Error::BatchOverflow { batch_size: 100_000_000 } => {}
        other => panic!("unexpected {}", other),
    }
}

#[test]
#[cfg(test)]
fn unread_outputs() {
    let outcome = run("a 0", "a 1\nb 2", nodes(3), ordinal(), Config::default()).unwrap();
    assert_eq!(arcs(&outcome), vec![(0, 1)]);
    match error(run("a 0", "a 1\nb 2", nodes(3), ordinal(), strict())) {
        Error::UnreadOutputs { ref stream, line: 2 } if stream == "outputs" => {}
        other => panic!("unexpected {}", other),
    }
}

#[test]
#[cfg(test)]
fn mapping_errors_abort() {
    let labelling = Labelling::default();
    match error(run("a 0", "a 1", nodes(2), labelling, Config::default())) {
        Error::LabelMapping { ref key, .. } if key == "a" => {}
        other => panic!("unexpected {}", other),
    }
}
