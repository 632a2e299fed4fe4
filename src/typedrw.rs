use std::mem;
use std::slice;
use std::ops;
use std::fs::File;
use std::io::Result;
use std::marker::PhantomData;
use std::path::Path;
use memmap::Mmap;

/// A read-only view of a file of native-endian `T`s.
pub struct TypedMemoryMap<T:Copy> {
    map:    Option<Mmap>,       // mapped file (empty files cannot be mapped)
    len:    usize,              // in elements
    phn:    PhantomData<T>,
}

impl<T:Copy> TypedMemoryMap<T> {
    pub fn new<P: AsRef<Path>>(filename: P) -> Result<TypedMemoryMap<T>> {
        let file = File::open(filename)?;
        let size = file.metadata()?.len() as usize;
        let map = if size == 0 { None } else { Some(unsafe { Mmap::map(&file)? }) };
        Ok(TypedMemoryMap {
            map,
            len: size / mem::size_of::<T>(),
            phn: PhantomData,
        })
    }

    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }
}

impl<T:Copy> ops::Index<ops::RangeFull> for TypedMemoryMap<T> {
    type Output = [T];
    #[inline]
    fn index(&self, _index: ops::RangeFull) -> &[T] {
        match self.map {
            Some(ref map) => unsafe { slice::from_raw_parts(map.as_ptr() as *const T, self.len) },
            None => &[],
        }
    }
}

#[test]
#[cfg(test)]
fn empty_and_full_maps() {
    use byteorder::{NativeEndian, WriteBytesExt};
    let dir = ::tempdir::TempDir::new("typedrw").unwrap();
    let empty = dir.path().join("empty");
    File::create(&empty).unwrap();
    let map = TypedMemoryMap::<u64>::new(&empty).unwrap();
    assert!(map.is_empty());
    assert_eq!(map[..].len(), 0);

    let full = dir.path().join("full");
    let mut file = File::create(&full).unwrap();
    for x in &[3u32, 1, 4, 1, 5] { file.write_u32::<NativeEndian>(*x).unwrap(); }
    drop(file);
    let map = TypedMemoryMap::<u32>::new(&full).unwrap();
    assert_eq!(&map[..], &[3, 1, 4, 1, 5]);
}
