//! Errors raised while building a transaction graph.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{stream} contains no transaction lines")]
    EmptyStream { stream: String },

    #[error("{stream}:{line}: address {address:?} maps to node {id}, outside [0, {num_nodes})")]
    AddressOutOfRange {
        stream: String,
        line: usize,
        address: String,
        id: i64,
        num_nodes: usize,
    },

    #[error("{stream}:{line}: address {address:?} has no node")]
    UnresolvedAddress {
        stream: String,
        line: usize,
        address: String,
    },

    #[error("transaction {key:?} (inputs line {input_line}) has no outputs (outputs line {output_line})")]
    InconsistentTransactionOrder {
        key: String,
        input_line: usize,
        output_line: usize,
    },

    #[error("{stream}:{line}: outputs left unread after the last input transaction")]
    UnreadOutputs { stream: String, line: usize },

    #[error("labels of a batch of {batch_size} arcs overflow 32-bit bit offsets; reduce the batch size")]
    BatchOverflow { batch_size: usize },

    #[error("an address map requires the number of nodes")]
    MissingNodeCount,

    #[error("batch size must be positive")]
    InvalidBatchSize,

    #[error("label width {width} out of range")]
    LabelWidth { width: u32 },

    #[error("label value {value} does not fit in {width} bits")]
    LabelValueOutOfRange { value: u64, width: u32 },

    #[error("cannot merge a {left} label with a {right} label")]
    UnmergeableLabels {
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot map transaction {key:?} to a label: {reason}")]
    LabelMapping { key: String, reason: String },

    #[error("bit stream truncated at bit {position}")]
    TruncatedBitStream { position: u64 },

    #[error("more than 2^32 distinct addresses")]
    TooManyNodes,

    #[error("I/O: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
