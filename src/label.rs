//! Arc labels: the transaction identity attached to every arc.
//!
//! A `Label` is a closed set of codecs. The emitter keeps one prototype,
//! resets it for every transaction with a mapping, and encodes it once per
//! arc; sinks decode into a fresh clone whenever a label has to outlive
//! the batch it came from.

use std::collections::HashMap;
use std::str;

use crate::bits::{BitReader, BitWriter};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    /// A single integer, gamma coded.
    Scalar { value: u64 },
    /// A single integer in exactly `width` bits.
    FixedWidth { width: u32, value: u64 },
    /// A gamma-coded length followed by delta-coded values.
    List { values: Vec<u64> },
    /// A gamma-coded length followed by `width`-bit values; supports `merge`.
    MergeableList { width: u32, values: Vec<u64> },
}

fn check_width(width: u32) -> Result<u32> {
    if width > 64 { Err(Error::LabelWidth { width }) } else { Ok(width) }
}

fn check_value(value: u64, width: u32) -> Result<u64> {
    if width < 64 && value >> width != 0 {
        Err(Error::LabelValueOutOfRange { value, width })
    }
    else { Ok(value) }
}

/// Bits needed to tell apart `universe` distinct values.
pub fn width_for(universe: u64) -> u32 {
    if universe <= 1 { 0 } else { 64 - (universe - 1).leading_zeros() }
}

impl Label {
    pub fn scalar() -> Label { Label::Scalar { value: 0 } }

    pub fn fixed(width: u32) -> Result<Label> {
        Label::fixed_value(width, 0)
    }

    pub fn fixed_value(width: u32, value: u64) -> Result<Label> {
        let width = check_width(width)?;
        Ok(Label::FixedWidth { width, value: check_value(value, width)? })
    }

    /// A fixed-width label wide enough for identifiers in `[0, universe)`.
    pub fn for_universe(universe: u64) -> Label {
        Label::FixedWidth { width: width_for(universe), value: 0 }
    }

    pub fn list() -> Label { Label::List { values: Vec::new() } }

    pub fn mergeable_list(width: u32) -> Result<Label> {
        Ok(Label::MergeableList { width: check_width(width)?, values: Vec::new() })
    }

    pub fn mergeable_list_values(width: u32, values: Vec<u64>) -> Result<Label> {
        let width = check_width(width)?;
        for &value in &values { check_value(value, width)?; }
        Ok(Label::MergeableList { width, values })
    }

    pub fn kind(&self) -> &'static str {
        match *self {
            Label::Scalar { .. } => "scalar",
            Label::FixedWidth { .. } => "fixed-width",
            Label::List { .. } => "list",
            Label::MergeableList { .. } => "mergeable-list",
        }
    }

    /// Width of every encoding of this label, if constant.
    pub fn fixed_width(&self) -> Option<u32> {
        match *self {
            Label::FixedWidth { width, .. } => Some(width),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<u64> {
        match *self {
            Label::Scalar { value } | Label::FixedWidth { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn values(&self) -> &[u64] {
        match *self {
            Label::Scalar { ref value } | Label::FixedWidth { ref value, .. } => ::std::slice::from_ref(value),
            Label::List { ref values } | Label::MergeableList { ref values, .. } => &values[..],
        }
    }

    /// Resets the label to hold exactly `value`.
    pub fn init(&mut self, value: u64) -> Result<()> {
        match *self {
            Label::Scalar { value: ref mut v } => *v = value,
            Label::FixedWidth { width, value: ref mut v } => *v = check_value(value, width)?,
            Label::List { ref mut values } => {
                values.clear();
                values.push(value);
            }
            Label::MergeableList { width, ref mut values } => {
                check_value(value, width)?;
                values.clear();
                values.push(value);
            }
        }
        Ok(())
    }

    /// Appends `value` to a list label.
    pub fn push(&mut self, value: u64) -> Result<()> {
        match *self {
            Label::List { ref mut values } => values.push(value),
            Label::MergeableList { width, ref mut values } => values.push(check_value(value, width)?),
            _ => return Err(Error::UnmergeableLabels { left: self.kind(), right: "value" }),
        }
        Ok(())
    }

    /// Concatenates `other`'s values after ours.
    pub fn merge(&mut self, other: &Label) -> Result<()> {
        if let Label::MergeableList { width, ref mut values } = *self {
            if let Label::MergeableList { width: other_width, values: ref more } = *other {
                if width == other_width {
                    values.extend_from_slice(more);
                    return Ok(());
                }
            }
        }
        Err(Error::UnmergeableLabels { left: self.kind(), right: other.kind() })
    }

    /// Writes the label, returning the number of bits written.
    pub fn encode(&self, out: &mut BitWriter) -> usize {
        match *self {
            Label::Scalar { value } => out.write_gamma(value),
            Label::FixedWidth { width, value } => out.write_bits(value, width),
            Label::List { ref values } => {
                let mut bits = out.write_gamma(values.len() as u64);
                for &value in values { bits += out.write_delta(value); }
                bits
            }
            Label::MergeableList { width, ref values } => {
                let mut bits = out.write_gamma(values.len() as u64);
                for &value in values { bits += out.write_bits(value, width); }
                bits
            }
        }
    }

    /// Overwrites the label with the next one in `input`, returning the bits read.
    pub fn decode(&mut self, input: &mut BitReader) -> Result<usize> {
        let start = input.position();
        match *self {
            Label::Scalar { ref mut value } => *value = input.read_gamma()?,
            Label::FixedWidth { width, ref mut value } => *value = input.read_bits(width)?,
            Label::List { ref mut values } => {
                let len = input.read_gamma()?;
                values.clear();
                for _ in 0..len { values.push(input.read_delta()?); }
            }
            Label::MergeableList { width, ref mut values } => {
                let len = input.read_gamma()?;
                values.clear();
                for _ in 0..len { values.push(input.read_bits(width)?); }
            }
        }
        Ok((input.position() - start) as usize)
    }
}

/// Combines the labels of two arcs with the same source and target.
pub trait LabelMergeStrategy {
    fn merge(&self, first: Label, second: &Label) -> Result<Label>;
}

impl<F: Fn(Label, &Label) -> Result<Label>> LabelMergeStrategy for F {
    fn merge(&self, first: Label, second: &Label) -> Result<Label> { self(first, second) }
}

/// Concatenates mergeable list labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Concatenate;

impl LabelMergeStrategy for Concatenate {
    fn merge(&self, mut first: Label, second: &Label) -> Result<Label> {
        first.merge(second)?;
        Ok(first)
    }
}

/// Populates the prototype label from the raw transaction key.
pub type LabelMapping = Box<dyn FnMut(&mut Label, &[u8]) -> Result<()>>;

fn key_string(key: &[u8]) -> String { String::from_utf8_lossy(key).into_owned() }

/// Reads the transaction key as a decimal integer.
pub fn decimal_mapping() -> LabelMapping {
    Box::new(|label: &mut Label, key: &[u8]| {
        let value = str::from_utf8(key).ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::LabelMapping { key: key_string(key), reason: "not a decimal integer".to_owned() })?;
        label.init(value)
    })
}

/// Numbers transaction keys in order of first appearance.
pub fn ordinal_mapping() -> LabelMapping {
    let mut seen = HashMap::<Vec<u8>, u64>::new();
    Box::new(move |label: &mut Label, key: &[u8]| {
        let next = seen.len() as u64;
        let value = *seen.entry(key.to_vec()).or_insert(next);
        label.init(value)
    })
}

/// The prototype, mapping and merge strategy used for a build.
pub struct Labelling {
    pub prototype: Label,
    pub mapping: LabelMapping,
    pub merge: Option<Box<dyn LabelMergeStrategy>>,
}

impl Labelling {
    pub fn new(prototype: Label, mapping: LabelMapping) -> Labelling {
        Labelling { prototype, mapping, merge: None }
    }

    pub fn with_merge<M: LabelMergeStrategy + 'static>(mut self, merge: M) -> Labelling {
        self.merge = Some(Box::new(merge));
        self
    }
}

impl Default for Labelling {
    fn default() -> Labelling { Labelling::new(Label::scalar(), decimal_mapping()) }
}

#[cfg(test)]
use rand::{Rng, SeedableRng};
#[cfg(test)]
use rand::rngs::StdRng;

#[cfg(test)]
fn round_trip(label: &Label) {
    let mut out = BitWriter::new();
    let written = label.encode(&mut out);
    assert_eq!(out.bits(), written as u64);
    let bytes = out.into_bytes();
    let mut decoded = label.clone();
    decoded.init(0).unwrap();
    let read = decoded.decode(&mut BitReader::new(&bytes)).unwrap();
    assert_eq!(read, written);
    assert_eq!(&decoded, label);
}

#[test]
#[cfg(test)]
fn every_variant_round_trips() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..200 {
        let width = rng.gen_range(0..=64u32);
        let mask = if width == 64 { u64::max_value() } else { (1u64 << width) - 1 };
        let len = rng.gen_range(0..20);

        round_trip(&Label::Scalar { value: rng.gen::<u64>() >> rng.gen_range(0..64) });
        round_trip(&Label::fixed_value(width, rng.gen::<u64>() & mask).unwrap());
        round_trip(&Label::List { values: (0..len).map(|_| rng.gen::<u64>() >> rng.gen_range(0..64)).collect() });
        round_trip(&Label::mergeable_list_values(width, (0..len).map(|_| rng.gen::<u64>() & mask).collect()).unwrap());
    }
}

#[test]
#[cfg(test)]
fn fixed_width_rejects_wide_values() {
    assert!(Label::fixed_value(7, 127).is_ok());
    match Label::fixed_value(7, 128) {
        Err(Error::LabelValueOutOfRange { value: 128, width: 7 }) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert!(Label::fixed(65).is_err());
    let mut label = Label::fixed(3).unwrap();
    assert!(label.init(8).is_err());
    assert_eq!(label.fixed_width(), Some(3));
    assert_eq!(Label::scalar().fixed_width(), None);
    assert_eq!(Label::mergeable_list(3).unwrap().fixed_width(), None);
}

#[test]
#[cfg(test)]
fn universe_widths() {
    assert_eq!(width_for(0), 0);
    assert_eq!(width_for(1), 0);
    assert_eq!(width_for(2), 1);
    assert_eq!(width_for(256), 8);
    assert_eq!(width_for(257), 9);
    assert_eq!(Label::for_universe(1000).fixed_width(), Some(10));
}

#[test]
#[cfg(test)]
fn merge_concatenates() {
    let mut first = Label::mergeable_list_values(8, vec![128]).unwrap();
    first.merge(&Label::mergeable_list_values(8, vec![129, 3]).unwrap()).unwrap();
    assert_eq!(first.values(), &[128, 129, 3]);

    let merged = Concatenate.merge(first.clone(), &Label::mergeable_list_values(8, vec![1]).unwrap()).unwrap();
    assert_eq!(merged.values(), &[128, 129, 3, 1]);

    assert!(first.merge(&Label::mergeable_list(9).unwrap()).is_err());
    assert!(Label::list().merge(&Label::list()).is_err());
    assert!(Label::scalar().merge(&Label::scalar()).is_err());
}

#[test]
#[cfg(test)]
fn list_appends() {
    let mut label = Label::list();
    label.init(5).unwrap();
    label.push(6).unwrap();
    assert_eq!(label.values(), &[5, 6]);
    assert!(Label::scalar().push(1).is_err());
}

#[test]
#[cfg(test)]
fn mappings() {
    let mut label = Label::scalar();
    let mut decimal = decimal_mapping();
    decimal(&mut label, &b"129"[..]).unwrap();
    assert_eq!(label.value(), Some(129));
    assert!(decimal(&mut label, &b"a1"[..]).is_err());

    let mut ordinal = ordinal_mapping();
    let mut list = Label::list();
    let keys: [(&[u8], u64); 4] = [(b"x", 0), (b"y", 1), (b"x", 0), (b"z", 2)];
    for &(key, expected) in &keys {
        ordinal(&mut list, key).unwrap();
        assert_eq!(list.values(), &[expected]);
    }
}
