use std::io::{BufWriter, Write};
use std::fs::File;

use byteorder::{NativeEndian, WriteBytesExt};

use crate::bits::BitWriter;
use crate::error::Result;
use crate::label::Label;
use crate::NodeId;

// output file format is
//
//     offsets:      [u64; num_nodes],  end of node i's arcs
//     targets:      [u32; arcs],
//     labeloffsets: [u64; arcs],       bit offset of each arc's label
//     labels:       bit stream of encoded labels
//
// targets[offsets[i-1]..offsets[i]] are node i's arc targets.

/// Writes arcs sorted by source into `<basename>.{offsets,targets,labeloffsets,labels}`,
/// returning the number of arcs written.
pub fn write<I>(basename: &str, num_nodes: usize, arcs: I) -> Result<u64>
where I: IntoIterator<Item=Result<(NodeId, NodeId, Label)>> {

    let mut node_writer = BufWriter::new(File::create(format!("{}.offsets", basename))?);
    let mut edge_writer = BufWriter::new(File::create(format!("{}.targets", basename))?);
    let mut offset_writer = BufWriter::new(File::create(format!("{}.labeloffsets", basename))?);
    let mut labels = BitWriter::new();

    let mut cur_source = 0usize;
    let mut cur_offset = 0u64;

    for arc in arcs {
        let (source, target, label) = arc?;
        while cur_source < source as usize {
            node_writer.write_u64::<NativeEndian>(cur_offset)?;
            cur_source += 1;
        }

        edge_writer.write_u32::<NativeEndian>(target)?;
        offset_writer.write_u64::<NativeEndian>(labels.bits())?;
        label.encode(&mut labels);
        cur_offset += 1;
    }

    // nodes with no arcs after the last source
    while cur_source < num_nodes {
        node_writer.write_u64::<NativeEndian>(cur_offset)?;
        cur_source += 1;
    }

    node_writer.flush()?;
    edge_writer.flush()?;
    offset_writer.flush()?;
    File::create(format!("{}.labels", basename))?.write_all(labels.as_bytes())?;

    info!("wrote {} nodes, {} arcs, {:.3} label bits/arc", cur_source, cur_offset,
          if cur_offset == 0 { 0.0 } else { labels.bits() as f64 / cur_offset as f64 });
    Ok(cur_offset)
}
