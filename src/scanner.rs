//! Grouping of a sorted `<transaction> <address>` stream by transaction.
//!
//! A scanner always holds one lookahead line. Lines live in two owned
//! buffers used alternately: while a group is collected, its first line
//! (and so its key) stays in one slot and the following lines are read
//! into the other. When a line with a different key shows up, the slots
//! swap roles by index and that line becomes the lookahead.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::BufRead;
use std::ops::Range;
use std::str;

use crate::assign::AddressIdAssigner;
use crate::error::{Error, Result};
use crate::NodeId;

/// An external function from address bytes to node ids.
pub trait AddressMap {
    /// The node of `address`, or `None` if the address is unknown.
    fn node(&self, address: &[u8]) -> Option<i64>;
}

impl<F: Fn(&[u8]) -> Option<i64>> AddressMap for F {
    fn node(&self, address: &[u8]) -> Option<i64> { self(address) }
}

impl AddressMap for HashMap<Vec<u8>, i64> {
    fn node(&self, address: &[u8]) -> Option<i64> { self.get(address).cloned() }
}

/// How address tokens become node ids; shared by both scanners.
pub enum AddressResolver {
    /// An external map; its results must fall in `[0, num_nodes)`.
    Map { map: Box<dyn AddressMap>, num_nodes: Option<usize> },
    /// Numeric raw addresses numbered in order of first appearance.
    Assign(AddressIdAssigner),
}

enum Resolved {
    Node(NodeId),
    Unknown,
    Malformed,
    OutOfRange(i64, usize),
}

impl AddressResolver {
    pub fn map<M: AddressMap + 'static>(map: M, num_nodes: Option<usize>) -> AddressResolver {
        AddressResolver::Map { map: Box::new(map), num_nodes }
    }

    pub fn assign() -> AddressResolver { AddressResolver::Assign(AddressIdAssigner::new()) }

    pub fn validate(&self) -> Result<()> {
        match *self {
            AddressResolver::Map { num_nodes: None, .. } => Err(Error::MissingNodeCount),
            AddressResolver::Map { num_nodes: Some(num_nodes), .. } if num_nodes as u64 > NodeId::max_value() as u64 + 1 => Err(Error::TooManyNodes),
            _ => Ok(()),
        }
    }

    /// Nodes known so far (the declared count for a map).
    pub fn num_nodes(&self) -> usize {
        match *self {
            AddressResolver::Map { num_nodes, .. } => num_nodes.unwrap_or(0),
            AddressResolver::Assign(ref assigner) => assigner.len(),
        }
    }

    pub fn assigner(&self) -> Option<&AddressIdAssigner> {
        match *self {
            AddressResolver::Assign(ref assigner) => Some(assigner),
            _ => None,
        }
    }

    fn resolve(&mut self, address: &[u8]) -> Result<Resolved> {
        self.validate()?;
        match *self {
            AddressResolver::Map { ref map, num_nodes } => {
                let num_nodes = num_nodes.ok_or(Error::MissingNodeCount)?;
                Ok(match map.node(address) {
                    None => Resolved::Unknown,
                    Some(id) if id < 0 || id as u64 >= num_nodes as u64 => Resolved::OutOfRange(id, num_nodes),
                    Some(id) => Resolved::Node(id as NodeId),
                })
            }
            AddressResolver::Assign(ref mut assigner) => {
                match str::from_utf8(address).ok().and_then(|s| s.parse::<i64>().ok()) {
                    Some(raw) => Ok(Resolved::Node(assigner.node(raw)?)),
                    None => Ok(Resolved::Malformed),
                }
            }
        }
    }
}

/// The addresses of one transaction.
#[derive(Debug)]
pub struct Group<'a> {
    pub key: &'a [u8],
    pub addresses: &'a [NodeId],
    /// Line number of the group's first line.
    pub line: usize,
}

fn is_space(byte: u8) -> bool { byte <= b' ' }

fn token(line: &[u8], from: usize) -> Range<usize> {
    let start = from + line[from..].iter().take_while(|&&b| is_space(b)).count();
    let end = start + line[start..].iter().take_while(|&&b| !is_space(b)).count();
    start .. end
}

fn key(line: &[u8]) -> &[u8] { &line[token(line, 0)] }

fn address(line: &[u8]) -> &[u8] { &line[token(line, token(line, 0).end)] }

fn lossy(line: &[u8]) -> String { String::from_utf8_lossy(line).trim_end().to_owned() }

pub struct LineScanner<R> {
    name: String,
    reader: R,
    lines: [Vec<u8>; 2],
    numbers: [usize; 2],
    pending: Option<usize>,
    read: usize,
    addresses: Vec<NodeId>,
    strict: bool,
    skipped: u64,
}

impl<R: BufRead> LineScanner<R> {
    /// Reads up to the first transaction line of `reader`.
    pub fn new<S: Into<String>>(name: S, reader: R, strict: bool) -> Result<LineScanner<R>> {
        let mut scanner = LineScanner {
            name: name.into(),
            reader,
            lines: [Vec::with_capacity(1024), Vec::with_capacity(1024)],
            numbers: [0, 0],
            pending: None,
            read: 0,
            addresses: Vec::with_capacity(512),
            strict,
            skipped: 0,
        };
        if !scanner.read_line(0)? {
            return Err(Error::EmptyStream { stream: scanner.name });
        }
        scanner.pending = Some(0);
        Ok(scanner)
    }

    pub fn name(&self) -> &str { &self.name }

    /// Whether lines remain to be grouped.
    pub fn has_pending(&self) -> bool { self.pending.is_some() }

    /// Line number of the lookahead line, or of the last line read at end of stream.
    pub fn line_number(&self) -> usize {
        self.pending.map(|slot| self.numbers[slot]).unwrap_or(self.read)
    }

    /// The lookahead line, for diagnostics.
    pub fn line(&self) -> String {
        self.pending.map(|slot| lossy(&self.lines[slot])).unwrap_or_else(|| "<end of stream>".to_owned())
    }

    /// Lines discarded while seeking a transaction.
    pub fn skipped(&self) -> u64 { self.skipped }

    /// The next transaction, whatever its key; `None` at end of stream.
    pub fn next_group(&mut self, resolver: &mut AddressResolver) -> Result<Option<Group>> {
        self.addresses.clear();
        let first = match self.pending {
            Some(slot) => slot,
            None => return Ok(None),
        };
        self.collect(first, resolver)?;
        Ok(Some(self.group(first)))
    }

    /// The transaction keyed exactly `target`, discarding smaller keys.
    ///
    /// Returns `None` without consuming anything if the next key is larger.
    pub fn next_group_for(&mut self, target: &[u8], resolver: &mut AddressResolver) -> Result<Option<Group>> {
        self.addresses.clear();
        loop {
            let slot = match self.pending {
                Some(slot) => slot,
                None => return Ok(None),
            };
            match key(&self.lines[slot]).cmp(target) {
                Ordering::Less => {
                    self.skipped += 1;
                    debug!("{}:{}: skipped {:?}", self.name, self.numbers[slot], lossy(&self.lines[slot]));
                    if !self.read_line(slot)? { self.pending = None; }
                }
                Ordering::Greater => return Ok(None),
                Ordering::Equal => {
                    self.collect(slot, resolver)?;
                    return Ok(Some(self.group(slot)));
                }
            }
        }
    }

    fn group(&self, slot: usize) -> Group {
        Group {
            key: key(&self.lines[slot]),
            addresses: &self.addresses[..],
            line: self.numbers[slot],
        }
    }

    // adds the line in `first` and every following line with the same key
    fn collect(&mut self, first: usize, resolver: &mut AddressResolver) -> Result<()> {
        self.add(first, resolver)?;
        let spare = 1 - first;
        loop {
            if !self.read_line(spare)? {
                self.pending = None;
                return Ok(());
            }
            if key(&self.lines[spare]) != key(&self.lines[first]) {
                self.pending = Some(spare);
                return Ok(());
            }
            self.add(spare, resolver)?;
        }
    }

    fn add(&mut self, slot: usize, resolver: &mut AddressResolver) -> Result<()> {
        let line = &self.lines[slot];
        let number = self.numbers[slot];
        match resolver.resolve(address(line))? {
            Resolved::Node(node) => self.addresses.push(node),
            Resolved::Unknown if self.strict => {
                return Err(Error::UnresolvedAddress {
                    stream: self.name.clone(),
                    line: number,
                    address: lossy(address(line)),
                });
            }
            Resolved::Unknown => warn!("{}:{}: unknown address, skipped: {}", self.name, number, lossy(line)),
            Resolved::Malformed => warn!("{}:{}: malformed address, skipped: {}", self.name, number, lossy(line)),
            Resolved::OutOfRange(id, num_nodes) => {
                return Err(Error::AddressOutOfRange {
                    stream: self.name.clone(),
                    line: number,
                    address: lossy(address(line)),
                    id,
                    num_nodes,
                });
            }
        }
        Ok(())
    }

    // reads the next transaction line into `slot`; false at end of stream
    fn read_line(&mut self, slot: usize) -> Result<bool> {
        loop {
            self.lines[slot].clear();
            if self.reader.read_until(b'\n', &mut self.lines[slot])? == 0 {
                return Ok(false);
            }
            self.read += 1;
            let line = &self.lines[slot];
            if line.first() == Some(&b'#') || key(line).is_empty() {
                continue;
            }
            if address(line).is_empty() {
                warn!("{}:{}: malformed line, skipped: {}", self.name, self.read, lossy(line));
                continue;
            }
            self.numbers[slot] = self.read;
            return Ok(true);
        }
    }
}

#[cfg(test)]
fn decimal() -> AddressResolver {
    AddressResolver::map(|a: &[u8]| -> Option<i64> { str::from_utf8(a).ok()?.parse().ok() }, Some(NodeId::max_value() as usize + 1))
}

#[cfg(test)]
fn scanner(text: &str) -> LineScanner<&[u8]> {
    LineScanner::new("test", text.as_bytes(), false).unwrap()
}

#[cfg(test)]
fn next(s: &mut LineScanner<&[u8]>, r: &mut AddressResolver) -> Option<(String, Vec<NodeId>)> {
    s.next_group(r).unwrap().map(|g| (lossy(g.key), g.addresses.to_vec()))
}

#[cfg(test)]
fn seek(s: &mut LineScanner<&[u8]>, key: &str, r: &mut AddressResolver) -> Vec<NodeId> {
    s.next_group_for(key.as_bytes(), r).unwrap().map(|g| g.addresses.to_vec()).unwrap_or_default()
}

#[test]
#[cfg(test)]
fn one_line_groups() {
    let mut r = decimal();
    let mut s = scanner("a 0\nb 1\nc 2");
    assert_eq!(next(&mut s, &mut r), Some(("a".to_owned(), vec![0])));
    assert_eq!(next(&mut s, &mut r), Some(("b".to_owned(), vec![1])));
    assert_eq!(next(&mut s, &mut r), Some(("c".to_owned(), vec![2])));
    assert_eq!(next(&mut s, &mut r), None);
    assert_eq!(next(&mut s, &mut r), None);
}

#[test]
#[cfg(test)]
fn multiple_addresses_with_leading_spaces() {
    let mut r = decimal();
    let mut s = scanner("a 0\na 1\n a 2");
    assert_eq!(next(&mut s, &mut r), Some(("a".to_owned(), vec![0, 1, 2])));
    assert!(!s.has_pending());
}

#[test]
#[cfg(test)]
fn targeted_skips_smaller_keys() {
    let mut r = decimal();
    let mut a = scanner("b 0\nb 1\n b 2");
    let mut b = scanner("a 0\na 0\na 0\nb 0\nb 3");
    let group = a.next_group(&mut r).unwrap().unwrap();
    assert_eq!(group.addresses, &[0, 1, 2]);
    assert_eq!(b.next_group_for(group.key, &mut r).unwrap().unwrap().addresses, &[0, 3]);
    assert_eq!(b.skipped(), 3);
}

#[test]
#[cfg(test)]
fn targeted_keeps_larger_keys() {
    let mut r = decimal();
    let mut b = scanner("c 1");
    assert!(seek(&mut b, "a", &mut r).is_empty());
    assert!(seek(&mut b, "b", &mut r).is_empty());
    assert!(b.has_pending());
    assert_eq!(seek(&mut b, "c", &mut r), vec![1]);
    assert!(seek(&mut b, "d", &mut r).is_empty());
}

#[test]
#[cfg(test)]
fn inconsistency_recovers() {
    let mut r = decimal();
    let mut a = scanner("a 0\nb 1");
    let mut b = scanner("b 0");
    assert_eq!(next(&mut a, &mut r), Some(("a".to_owned(), vec![0])));
    assert!(seek(&mut b, "a", &mut r).is_empty());
    assert_eq!(next(&mut a, &mut r), Some(("b".to_owned(), vec![1])));
    assert_eq!(seek(&mut b, "b", &mut r), vec![0]);
}

#[test]
#[cfg(test)]
fn blank_comment_and_malformed_lines() {
    let mut r = decimal();
    let mut s = scanner("# header\n\n   \na 1\na\r\na x\n# note\na 2\r\nb 3\n");
    assert_eq!(next(&mut s, &mut r), Some(("a".to_owned(), vec![1, 2])));
    assert_eq!(s.line_number(), 9);
    assert_eq!(s.line(), "b 3");
    assert_eq!(next(&mut s, &mut r), Some(("b".to_owned(), vec![3])));
}

#[test]
#[cfg(test)]
fn long_lines_survive() {
    let mut r = AddressResolver::assign();
    let key = "k".repeat(5000);
    let text = format!("{} 1\n{} 2\n{}x 3\n", key, key, key);
    let mut s = scanner(&text);
    assert_eq!(next(&mut s, &mut r), Some((key.clone(), vec![0, 1])));
    assert_eq!(next(&mut s, &mut r), Some((format!("{}x", key), vec![2])));
}

#[test]
#[cfg(test)]
fn empty_streams() {
    for text in &["", "\n\n", "# only a comment\n", "   \n# x"] {
        match LineScanner::new("inputs", text.as_bytes(), false) {
            Err(Error::EmptyStream { ref stream }) if stream == "inputs" => {}
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("{:?} is not empty", text),
        }
    }
}

#[test]
#[cfg(test)]
fn out_of_range() {
    let mut r = AddressResolver::map(|_: &[u8]| -> Option<i64> { Some(5) }, Some(2));
    let mut s = scanner("a 0\na 1");
    match s.next_group(&mut r) {
        Err(Error::AddressOutOfRange { line: 1, id: 5, num_nodes: 2, .. }) => {}
        other => panic!("unexpected {:?}", other.map(|g| g.map(|g| g.addresses.to_vec()))),
    }
}

#[test]
#[cfg(test)]
fn node_count_beyond_node_ids() {
    let wide = || AddressResolver::map(|_: &[u8]| -> Option<i64> { Some((1 << 32) + 5) }, Some(1 << 33));
    match wide().validate() {
        Err(Error::TooManyNodes) => {}
        other => panic!("unexpected {:?}", other),
    }
    let mut r = wide();
    let mut s = scanner("a x");
    match s.next_group(&mut r) {
        Err(Error::TooManyNodes) => {}
        other => panic!("unexpected {:?}", other.map(|g| g.map(|g| g.addresses.to_vec()))),
    }
    assert!(AddressResolver::map(|_: &[u8]| -> Option<i64> { None }, Some(1 << 32)).validate().is_ok());
}

#[test]
#[cfg(test)]
fn unknown_addresses() {
    let mut map = HashMap::new();
    map.insert(b"x".to_vec(), 0i64);
    let mut r = AddressResolver::map(map.clone(), Some(1));
    let mut s = scanner("a x\na y");
    assert_eq!(next(&mut s, &mut r), Some(("a".to_owned(), vec![0])));

    let mut r = AddressResolver::map(map, Some(1));
    let mut s = LineScanner::new("outputs", "a y".as_bytes(), true).unwrap();
    match s.next_group(&mut r) {
        Err(Error::UnresolvedAddress { ref address, line: 1, .. }) if address == "y" => {}
        other => panic!("unexpected {:?}", other.map(|g| g.is_some())),
    }
}

#[test]
#[cfg(test)]
fn skipped_group_is_not_the_end() {
    let mut r = AddressResolver::assign();
    let mut s = scanner("a zz\nb 7");
    assert_eq!(next(&mut s, &mut r), Some(("a".to_owned(), vec![])));
    assert_eq!(next(&mut s, &mut r), Some(("b".to_owned(), vec![0])));
}
