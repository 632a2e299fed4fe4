//! Builds a labelled transaction graph from two sorted logs.
//!
//! The inputs and outputs logs hold `<transaction> <address>` lines sorted
//! by transaction. Every transaction present in both yields an arc from
//! each of its input addresses to each of its output addresses, labelled
//! with the transaction.

#[macro_use]
extern crate log;
extern crate memmap;
extern crate time;
extern crate byteorder;
extern crate thiserror;
#[cfg(test)]
extern crate tempdir;
#[cfg(test)]
extern crate rand;

pub mod error;
pub mod bits;
pub mod label;
pub mod typedrw;
pub mod assign;
pub mod scanner;
pub mod batch;
pub mod config;
pub mod progress;
pub mod emitter;
pub mod sorted;
pub mod graphmap;
pub mod encode;

use std::io::BufRead;

pub use crate::config::Config;
pub use crate::emitter::{ArcEmitter, Outcome, Stats};
pub use crate::error::{Error, Result};
pub use crate::label::{Label, Labelling};
pub use crate::scanner::AddressResolver;
pub use crate::sorted::SortedBatches;

/// Dense node identifier.
pub type NodeId = u32;

/// Joins `inputs` and `outputs` and stores the graph under `basename`.
///
/// Batches are sorted and spilled by a `SortedBatches` sink, then merged
/// into `<basename>.{offsets,targets,labeloffsets,labels}`. If addresses
/// were numbered on the fly their raw values go to `<basename>.ids`. The
/// returned `materialized` count is that of the stored graph.
pub fn build<I: BufRead, O: BufRead>(inputs: I, outputs: O, resolver: AddressResolver, labelling: Labelling, config: Config, basename: &str) -> Result<Stats> {
    let Outcome { sink, resolver, labelling, mut stats } = ArcEmitter::new(inputs, outputs, resolver, labelling, config, SortedBatches::new())?.run()?;
    info!("merging {} batches ({:.3} bits/arc spilled)", sink.batches(), sink.bits_per_arc());
    let Labelling { prototype, merge, .. } = labelling;
    stats.materialized = encode::write(basename, resolver.num_nodes(), sink.into_arcs(prototype, merge)?)?;
    if let Some(assigner) = resolver.assigner() {
        assigner.write_ids(format!("{}.ids", basename))?;
    }
    Ok(stats)
}

#[cfg(test)]
use crate::graphmap::LabelledGraphMMap;
#[cfg(test)]
use crate::label::{Concatenate, LabelMapping};

#[cfg(test)]
fn by_letter() -> LabelMapping {
    Box::new(|label: &mut Label, key: &[u8]| label.init(128 + (key[0] - b'a') as u64))
}

#[cfg(test)]
fn read(basename: &str, prototype: &Label) -> Vec<(NodeId, NodeId, Vec<u64>)> {
    let graph = LabelledGraphMMap::new(basename).unwrap();
    (0..graph.nodes()).flat_map(|node| {
        let labels = graph.labels(node, prototype).unwrap();
        graph.edges(node).iter().zip(labels).map(|(&t, l)| (node as NodeId, t, l.values().to_vec())).collect::<Vec<_>>()
    }).collect()
}

#[test]
#[cfg(test)]
fn duplicate_arcs_merge_labels() {
    let dir = ::tempdir::TempDir::new("build").unwrap();
    let basename = dir.path().join("graph").to_string_lossy().into_owned();
    for &batch_size in &[1, 1000] {
        let labelling = Labelling::new(Label::mergeable_list(8).unwrap(), by_letter()).with_merge(Concatenate);
        let config = Config { batch_size, temp_dir: Some(dir.path().to_path_buf()), ..Config::default() };
        let stats = build(&b"a 0\nb 0"[..], &b"a 1\nb 1"[..], AddressResolver::assign(), labelling, config, &basename).unwrap();
        assert_eq!(stats.arcs, 2);
        assert_eq!(stats.materialized, 1);
        assert_eq!(read(&basename, &Label::mergeable_list(8).unwrap()), vec![(0, 1, vec![128, 129])]);
    }
}

#[test]
#[cfg(test)]
fn latest_label_wins_without_merge() {
    let dir = ::tempdir::TempDir::new("build").unwrap();
    let basename = dir.path().join("graph").to_string_lossy().into_owned();
    let labelling = Labelling::new(Label::for_universe(256), by_letter());
    let config = Config { batch_size: 1, temp_dir: Some(dir.path().to_path_buf()), ..Config::default() };
    build(&b"a 0\nb 0\nc 2"[..], &b"a 1\nb 1\nc 0"[..], AddressResolver::assign(), labelling, config, &basename).unwrap();
    assert_eq!(read(&basename, &Label::for_universe(256)), vec![(0, 1, vec![129]), (2, 0, vec![130])]);
}

#[test]
#[cfg(test)]
fn stores_ids_and_isolated_nodes() {
    let dir = ::tempdir::TempDir::new("build").unwrap();
    let basename = dir.path().join("graph").to_string_lossy().into_owned();
    let inputs = "# inputs\n10 700\n10 300\n11 500\n12 900\n";
    let outputs = "10 300\n10 800\n12 700\n";
    let config = Config { temp_dir: Some(dir.path().to_path_buf()), ..Config::default() };
    let stats = build(inputs.as_bytes(), outputs.as_bytes(), AddressResolver::assign(), Labelling::default(), config, &basename).unwrap();
    assert_eq!(stats.nodes, 5);
    assert_eq!(stats.unmatched, 1);

    let ids = assign::load_ids(format!("{}.ids", basename)).unwrap();
    assert_eq!(&ids[..], &[700, 300, 800, 500, 900]);
    let graph = LabelledGraphMMap::new(&basename).unwrap();
    assert_eq!(graph.nodes(), 5);
    assert!(graph.edges(3).is_empty());
    assert_eq!(read(&basename, &Label::scalar()), vec![(0, 1, vec![10]), (0, 2, vec![10]), (1, 2, vec![10]), (4, 0, vec![12])]);
}

#[test]
#[cfg(test)]
fn no_files_for_fatal_errors() {
    let dir = ::tempdir::TempDir::new("build").unwrap();
    let basename = dir.path().join("graph").to_string_lossy().into_owned();
    let resolver = AddressResolver::map(|_: &[u8]| -> Option<i64> { Some(5) }, Some(2));
    match build(&b"a 0"[..], &b"a 1"[..], resolver, Labelling::default(), Config::default(), &basename) {
        Err(Error::AddressOutOfRange { id: 5, .. }) => {}
        other => panic!("unexpected {:?}", other),
    }
    match build(&b""[..], &b"a 1"[..], AddressResolver::assign(), Labelling::default(), Config::default(), &basename) {
        Err(Error::EmptyStream { .. }) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(::std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
