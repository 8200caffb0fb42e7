use crate::error::{Error, Result};
use crate::options::Options;
use crate::skiplist::SkipList;
use crc::crc32::{Digest, Hasher32, CASTAGNOLI};
use integer_encoding::{FixedIntWriter, VarIntReader, VarIntWriter};
use log::trace;
use std::io::Read;

pub const BLOCK_RESTART_INTERVAL: usize = 16;

const SNAPPY_TAG: u8 = 1;

/// Conversion between a key or value and its byte representation in a block.
pub trait Encode: Sized {
    fn encode(&self, buf: &mut Vec<u8>);
    fn decode(bytes: &[u8]) -> Result<Self>;
}

impl Encode for Vec<u8> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }
    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
    fn decode(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::Corrupt("invalid utf-8"))
    }
}

// Big-endian, so byte order matches numeric order.
macro_rules! impl_encode_uint {
    ($($t:ty),*) => {$(
        impl Encode for $t {
            fn encode(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_be_bytes());
            }
            fn decode(bytes: &[u8]) -> Result<Self> {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                if bytes.len() != raw.len() {
                    return Err(Error::Corrupt("integer width"));
                }
                raw.copy_from_slice(bytes);
                Ok(<$t>::from_be_bytes(raw))
            }
        }
    )*};
}

impl_encode_uint!(u32, u64);

// Sign bit flipped, then big-endian, so negatives sort before positives.
macro_rules! impl_encode_int {
    ($($t:ty => $u:ty),*) => {$(
        impl Encode for $t {
            fn encode(&self, buf: &mut Vec<u8>) {
                let flipped = (*self as $u) ^ (<$t>::min_value() as $u);
                flipped.encode(buf);
            }
            fn decode(bytes: &[u8]) -> Result<Self> {
                let flipped = <$u>::decode(bytes)?;
                Ok((flipped ^ (<$t>::min_value() as $u)) as $t)
            }
        }
    )*};
}

impl_encode_int!(i32 => u32, i64 => u64);

fn checksum(data: &[u8]) -> u32 {
    let mut digest = Digest::new(CASTAGNOLI);
    digest.write(data);
    digest.sum32()
}

/// Reads a little-endian fixed32, the layout `write_fixedint` produces.
fn decode_fixed32(src: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&src[..4]);
    u32::from_le_bytes(raw)
}

/// Compresses a raw block and appends the compression tag and CRC32C.
fn seal(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = snap::Encoder::new();
    let mut block = encoder.compress_vec(raw)?;
    block.push(SNAPPY_TAG);
    let crc = checksum(&block);
    block.write_fixedint(crc).unwrap();
    Ok(block)
}

/// Builds a compressed, checksummed block of sorted entries.
///
/// Entry layout: varint shared key length, varint unshared key length,
/// varint value length, unshared key bytes, value bytes. Every
/// `BLOCK_RESTART_INTERVAL` entries the key is stored whole and its offset
/// recorded as a restart point.
pub struct BlockBuilder {
    buffer: Vec<u8>,
    count: usize,
    restarts: Vec<usize>,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self {
            buffer: vec![],
            count: 0,
            restarts: vec![],
            last_key: vec![],
        }
    }

    /// Appends an entry. Keys must arrive in strictly increasing byte order.
    pub fn add(&mut self, key: &[u8], val: &[u8]) {
        debug_assert!(self.count == 0 || self.last_key.as_slice() < key);
        let mut shared_cnt = 0;
        if self.count % BLOCK_RESTART_INTERVAL == 0 {
            self.restarts.push(self.buffer.len());
        } else {
            let min_len = self.last_key.len().min(key.len());
            while shared_cnt < min_len && self.last_key[shared_cnt] == key[shared_cnt] {
                shared_cnt += 1;
            }
        }
        // shared_key_cnt, non_shared_key_cnt, val_cnt, non_shared key, val
        self.buffer.write_varint(shared_cnt).unwrap();
        self.buffer.write_varint(key.len() - shared_cnt).unwrap();
        self.buffer.write_varint(val.len()).unwrap();
        self.buffer.extend_from_slice(&key[shared_cnt..]);
        self.buffer.extend_from_slice(val);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Uncompressed size so far, restart array included.
    pub fn size(&self) -> usize {
        self.buffer.len() + 4 * self.restarts.len() + 4
    }

    /// Seals the block and resets the builder for reuse.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        for i in &self.restarts {
            self.buffer.write_fixedint(*i as u32).unwrap();
        }
        self.buffer
            .write_fixedint(self.restarts.len() as u32)
            .unwrap();

        let block = seal(&self.buffer)?;

        trace!(
            "sealed block: {} entries, {} raw bytes, {} on wire",
            self.count,
            self.buffer.len(),
            block.len()
        );
        self.buffer.clear();
        self.count = 0;
        self.restarts.clear();
        self.last_key.clear();
        Ok(block)
    }
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Verified, decompressed view over a block produced by [`BlockBuilder`].
pub struct BlockReader {
    data: Vec<u8>,
    restarts: Vec<usize>,
    entries_end: usize,
}

impl BlockReader {
    pub fn new(block: &[u8]) -> Result<Self> {
        if block.len() < 5 {
            return Err(Error::Corrupt("block too short"));
        }
        let (body, crc) = block.split_at(block.len() - 4);
        let expected = decode_fixed32(crc);
        let actual = checksum(body);
        if expected != actual {
            return Err(Error::Checksum { expected, actual });
        }
        let (compressed, tag) = body.split_at(body.len() - 1);
        if tag[0] != SNAPPY_TAG {
            return Err(Error::Corrupt("unknown compression tag"));
        }
        let data = snap::Decoder::new().decompress_vec(compressed)?;

        if data.len() < 4 {
            return Err(Error::Corrupt("missing restart count"));
        }
        let num_restarts = decode_fixed32(&data[data.len() - 4..]) as usize;
        let entries_end = num_restarts
            .checked_mul(4)
            .and_then(|n| (data.len() - 4).checked_sub(n))
            .ok_or(Error::Corrupt("restart array overflows block"))?;
        let restarts = data[entries_end..data.len() - 4]
            .chunks(4)
            .map(|c| decode_fixed32(c) as usize)
            .collect::<Vec<_>>();
        if restarts.iter().any(|&r| r > entries_end) {
            return Err(Error::Corrupt("restart offset out of range"));
        }
        Ok(Self {
            data,
            restarts,
            entries_end,
        })
    }

    pub fn restarts(&self) -> &[usize] {
        &self.restarts
    }

    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter {
            entries: &self.data[..self.entries_end],
            offset: 0,
            key: vec![],
        }
    }
}

pub struct BlockIter<'a> {
    entries: &'a [u8],
    offset: usize,
    key: Vec<u8>,
}

impl<'a> BlockIter<'a> {
    fn read_entry(&mut self) -> Result<(Vec<u8>, &'a [u8])> {
        let entries: &'a [u8] = self.entries;
        let mut rest = &entries[self.offset..];
        let start = rest.len();
        let shared: usize = rest.read_varint()?;
        let unshared: usize = rest.read_varint()?;
        let val_len: usize = rest.read_varint()?;
        let fits = unshared
            .checked_add(val_len)
            .map_or(false, |n| n <= rest.len());
        if shared > self.key.len() || !fits {
            return Err(Error::Corrupt("entry overflows block"));
        }
        self.key.truncate(shared);
        let mut unshared_key = vec![0u8; unshared];
        rest.read_exact(&mut unshared_key)?;
        self.key.extend_from_slice(&unshared_key);
        let val = &rest[..val_len];
        self.offset += start - rest.len() + val_len;
        Ok((self.key.clone(), val))
    }
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = Result<(Vec<u8>, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.entries.len() {
            return None;
        }
        let entry = self.read_entry();
        if entry.is_err() {
            // stop after the first corrupt entry
            self.offset = self.entries.len();
        }
        Some(entry)
    }
}

impl<K, V> SkipList<K, V>
where
    K: Ord + Encode,
    V: Encode,
{
    /// Encodes every entry, in key order, into a single block.
    pub fn to_block(&self) -> Result<Vec<u8>> {
        let mut builder = BlockBuilder::new();
        let mut key_buf = vec![];
        let mut val_buf = vec![];
        for (key, value) in self.iter() {
            key_buf.clear();
            val_buf.clear();
            key.encode(&mut key_buf);
            value.encode(&mut val_buf);
            builder.add(&key_buf, &val_buf);
        }
        builder.finish()
    }

    /// Rebuilds a list from a block written by [`SkipList::to_block`].
    pub fn from_block(block: &[u8], options: Options) -> Result<Self> {
        let reader = BlockReader::new(block)?;
        let mut list = Self::with_options(options)?;
        for entry in reader.iter() {
            let (key, val) = entry?;
            list.insert(K::decode(&key)?, V::decode(val)?);
        }
        Ok(list)
    }
}
