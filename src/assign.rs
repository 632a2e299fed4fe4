//! On-the-fly numbering of raw addresses.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{NativeEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::typedrw::TypedMemoryMap;
use crate::NodeId;

/// Assigns dense node ids to raw addresses in order of first appearance.
#[derive(Default, Debug)]
pub struct AddressIdAssigner {
    nodes: HashMap<i64, NodeId>,
    ids: Vec<i64>,
}

impl AddressIdAssigner {
    pub fn new() -> AddressIdAssigner { AddressIdAssigner::default() }

    /// The node of `raw`, allocating the next one if `raw` is new.
    pub fn node(&mut self, raw: i64) -> Result<NodeId> {
        if let Some(&node) = self.nodes.get(&raw) {
            return Ok(node);
        }
        let node = self.ids.len();
        if node > NodeId::max_value() as usize { return Err(Error::TooManyNodes); }
        self.nodes.insert(raw, node as NodeId);
        self.ids.push(raw);
        Ok(node as NodeId)
    }

    pub fn len(&self) -> usize { self.ids.len() }
    pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    /// Raw addresses indexed by node.
    pub fn ids(&self) -> &[i64] { &self.ids[..] }

    /// Writes the raw addresses as native-endian `i64`s, one per node.
    pub fn write_ids<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        for &id in &self.ids {
            writer.write_i64::<NativeEndian>(id)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Maps a file written by `AddressIdAssigner::write_ids`.
pub fn load_ids<P: AsRef<Path>>(path: P) -> Result<TypedMemoryMap<i64>> {
    Ok(TypedMemoryMap::new(path)?)
}

#[test]
#[cfg(test)]
fn first_seen_order() {
    let mut map = AddressIdAssigner::new();
    assert_eq!(map.node(42).unwrap(), 0);
    assert_eq!(map.node(-7).unwrap(), 1);
    assert_eq!(map.node(42).unwrap(), 0);
    assert_eq!(map.node(0).unwrap(), 2);
    assert_eq!(map.len(), 3);
    assert_eq!(map.ids(), &[42, -7, 0]);
}

#[test]
#[cfg(test)]
fn ids_persist() {
    let dir = ::tempdir::TempDir::new("assign").unwrap();
    let path = dir.path().join("graph.ids");
    let mut map = AddressIdAssigner::new();
    for raw in &[9, 3, 9, 1 << 40] { map.node(*raw).unwrap(); }
    map.write_ids(&path).unwrap();
    let loaded = load_ids(&path).unwrap();
    assert_eq!(&loaded[..], map.ids());
}
