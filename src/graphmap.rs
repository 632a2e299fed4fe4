use std::io;

use crate::bits::BitReader;
use crate::error::Result;
use crate::label::Label;
use crate::typedrw::TypedMemoryMap;
use crate::NodeId;

/// A graph written by `encode::write`, mapped into memory.
pub struct LabelledGraphMMap {
    nodes: TypedMemoryMap<u64>,
    edges: TypedMemoryMap<u32>,
    label_offsets: TypedMemoryMap<u64>,
    labels: TypedMemoryMap<u8>,
}

impl LabelledGraphMMap {
    pub fn new(prefix: &str) -> io::Result<LabelledGraphMMap> {
        Ok(LabelledGraphMMap {
            nodes: TypedMemoryMap::new(format!("{}.offsets", prefix))?,
            edges: TypedMemoryMap::new(format!("{}.targets", prefix))?,
            label_offsets: TypedMemoryMap::new(format!("{}.labeloffsets", prefix))?,
            labels: TypedMemoryMap::new(format!("{}.labels", prefix))?,
        })
    }

    pub fn nodes(&self) -> usize { self.nodes[..].len() }

    fn range(&self, node: usize) -> (usize, usize) {
        let nodes = &self.nodes[..];
        if node < nodes.len() {
            let start = if node == 0 { 0 } else { nodes[node - 1] } as usize;
            (start, nodes[node] as usize)
        }
        else { (0, 0) }
    }

    pub fn edges(&self, node: usize) -> &[NodeId] {
        let (start, limit) = self.range(node);
        &self.edges[..][start..limit]
    }

    /// The labels of `node`'s arcs, decoded into copies of `prototype`.
    pub fn labels(&self, node: usize, prototype: &Label) -> Result<Vec<Label>> {
        let (start, limit) = self.range(node);
        let mut reader = BitReader::new(&self.labels[..]);
        self.label_offsets[..][start..limit].iter().map(|&offset| -> Result<Label> {
            let mut label = prototype.clone();
            reader.set_position(offset);
            label.decode(&mut reader)?;
            Ok(label)
        }).collect()
    }
}

#[test]
#[cfg(test)]
fn encode_and_graphmap() {
    use crate::encode;
    let target = ::tempdir::TempDir::new("encode_and_graphmap").unwrap();
    let files = target.path().join("graph").to_string_lossy().into_owned();
    let data = vec![(0, 1, vec![7]), (0, 3, vec![1, 2]), (2, 3, vec![]), (2, 0, vec![1 << 40])];
    let arcs = data.iter().map(|&(s, t, ref v)| Ok((s, t, Label::List { values: v.clone() })));
    assert_eq!(encode::write(&files, 5, arcs).unwrap(), 4);

    let graph = LabelledGraphMMap::new(&files).unwrap();
    assert_eq!(graph.nodes(), 5);
    assert!(graph.edges(1).is_empty());
    assert!(graph.edges(4).is_empty());
    assert!(graph.edges(9).is_empty());
    let read: Vec<(NodeId, NodeId, Vec<u64>)> = (0..graph.nodes()).flat_map(|src| {
        let labels = graph.labels(src, &Label::list()).unwrap();
        graph.edges(src).iter().zip(labels).map(|(d, l)| (src as NodeId, *d, l.values().to_vec())).collect::<Vec<_>>()
    }).collect();
    assert_eq!(read, data);
}
