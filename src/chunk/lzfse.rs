//! LZFSE decoder.
//!
//! LZFSE frames a stream as a sequence of blocks, each either raw,
//! uncompressed-with-length, or entropy-coded with an FSE literal
//! alphabet plus an (L, M, D) value alphabet driving LZ output. This is
//! the only decoder of the three with genuine entropy-coding machinery;
//! the others are plain LZ.

use super::check_chunk_size;
use crate::error::{Error, Result};

const MAGIC_EOS: u32 = u32::from_le_bytes(*b"bvx$");
const MAGIC_V1: u32 = u32::from_le_bytes(*b"bvx1");
const MAGIC_V2: u32 = u32::from_le_bytes(*b"bvxn");
const MAGIC_UNCOMPRESSED: u32 = u32::from_le_bytes(*b"bvx-");
/// Older bit-packed-header framing, structurally identical to `bvxn`.
const MAGIC_V2_LEGACY: u32 = u32::from_le_bytes(*b"bvx2");

const LITERAL_STATES: usize = 1024;
const LITERAL_SYMBOLS: usize = 256;
const L_STATES: usize = 64;
const M_STATES: usize = 64;
const D_STATES: usize = 256;
const L_SYMBOLS: usize = 20;
const M_SYMBOLS: usize = 20;
const D_SYMBOLS: usize = 64;
const MAX_LITERALS_PER_BLOCK: usize = LITERAL_STATES;

#[rustfmt::skip]
const L_EXTRA_BITS: [u32; L_SYMBOLS] = [
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,2,3,5,8,12,
];
#[rustfmt::skip]
const L_BASE_VALUE: [i32; L_SYMBOLS] = [
    0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,19,27,59,283,
];
#[rustfmt::skip]
const M_EXTRA_BITS: [u32; M_SYMBOLS] = [
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,2,3,5,8,11,
];
#[rustfmt::skip]
const M_BASE_VALUE: [i32; M_SYMBOLS] = [
    0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,19,27,59,315,
];
#[rustfmt::skip]
const D_EXTRA_BITS: [u32; D_SYMBOLS] = [
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    1,1,1,1,2,2,2,2,3,3,3,3,4,4,4,4,
    5,5,5,5,6,6,6,6,7,7,7,7,8,8,8,8,
    9,9,9,9,10,10,10,10,11,11,11,11,12,12,12,12,
];
#[rustfmt::skip]
const D_BASE_VALUE: [i32; D_SYMBOLS] = [
    0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,
    16,18,20,22,24,28,32,36,40,48,56,64,72,88,104,120,
    136,168,200,232,264,328,392,456,520,648,776,904,1032,1288,1544,1800,
    2056,2568,3080,3592,4104,5128,6152,7176,8200,10248,12296,14344,16392,20488,24584,28680,
];

/// Decompresses one or more concatenated LZFSE blocks from `input` into
/// `output`, returning the number of bytes produced. Stops at the first
/// `bvx$` end-of-stream marker.
pub fn decompress(input: &[u8], output: &mut [u8]) -> Result<usize> {
    check_chunk_size(input.len())?;

    let mut in_pos = 0usize;
    let mut out_pos = 0usize;
    let mut current_distance: i32 = 0;

    loop {
        if in_pos + 4 > input.len() {
            return Err(Error::decompress_failed("lzfse: truncated block header"));
        }
        let magic = u32::from_le_bytes(input[in_pos..in_pos + 4].try_into().unwrap());
        match magic {
            m if m == MAGIC_EOS => break,
            m if m == MAGIC_UNCOMPRESSED => {
                in_pos += 4;
                if in_pos + 4 > input.len() {
                    return Err(Error::decompress_failed(
                        "lzfse: truncated uncompressed block length",
                    ));
                }
                let n = u32::from_le_bytes(input[in_pos..in_pos + 4].try_into().unwrap()) as usize;
                in_pos += 4;
                if in_pos + n > input.len() {
                    return Err(Error::decompress_failed(
                        "lzfse: uncompressed block overruns input",
                    ));
                }
                if out_pos + n > output.len() {
                    return Err(Error::decompress_failed(
                        "lzfse: uncompressed block overruns output capacity",
                    ));
                }
                output[out_pos..out_pos + n].copy_from_slice(&input[in_pos..in_pos + n]);
                in_pos += n;
                out_pos += n;
            }
            m if m == MAGIC_V1 => {
                let (header, consumed) = BlockHeader::parse_v1(&input[in_pos..])?;
                in_pos += consumed;
                out_pos = decode_block(&header, input, &mut in_pos, output, out_pos, &mut current_distance)?;
            }
            m if m == MAGIC_V2 || m == MAGIC_V2_LEGACY => {
                let (header, consumed) = BlockHeader::parse_v2(&input[in_pos..])?;
                in_pos += consumed;
                out_pos = decode_block(&header, input, &mut in_pos, output, out_pos, &mut current_distance)?;
            }
            _ => {
                return Err(crate::error::Error::Input(
                    crate::error::InputError::SignatureMismatch {
                        message: format!("lzfse: unrecognized block magic 0x{magic:08x}"),
                    },
                ));
            }
        }
    }

    Ok(out_pos)
}

/// Logical fields common to V1 and V2 block headers, after unpacking.
struct BlockHeader {
    n_raw_bytes: usize,
    n_payload_bytes: usize,
    n_literals: usize,
    n_matches: usize,
    n_literal_payload_bytes: usize,
    n_lmd_payload_bytes: usize,
    literal_bits: u32,
    literal_state: [u16; 4],
    lmd_bits: u32,
    l_state: u16,
    m_state: u16,
    d_state: u16,
    l_freq: [u16; L_SYMBOLS],
    m_freq: [u16; M_SYMBOLS],
    d_freq: [u16; D_SYMBOLS],
    literal_freq: [u16; LITERAL_SYMBOLS],
}

impl BlockHeader {
    fn parse_v1(data: &[u8]) -> Result<(Self, usize)> {
        // magic(4) n_raw_bytes(4) n_payload_bytes(4) n_literals(4)
        // n_matches(4) n_literal_payload_bytes(4) n_lmd_payload_bytes(4)
        // literal_bits(4, stored as i32) literal_state(4x2) lmd_bits(4)
        // l_state(2) m_state(2) d_state(2)
        // l_freq(20x2) m_freq(20x2) d_freq(64x2) literal_freq(256x2)
        let fixed_len = 4 * 7 + 4 + 2 * 4 + 4 + 2 * 3;
        if data.len() < fixed_len {
            return Err(Error::decompress_failed("lzfse: truncated v1 header"));
        }
        let mut p = 4usize; // skip magic
        let n_raw_bytes = read_u32(data, &mut p) as usize;
        let n_payload_bytes = read_u32(data, &mut p) as usize;
        let n_literals = read_u32(data, &mut p) as usize;
        let n_matches = read_u32(data, &mut p) as usize;
        let n_literal_payload_bytes = read_u32(data, &mut p) as usize;
        let n_lmd_payload_bytes = read_u32(data, &mut p) as usize;
        let literal_bits = read_u32(data, &mut p);
        let mut literal_state = [0u16; 4];
        for s in literal_state.iter_mut() {
            *s = read_u16(data, &mut p);
        }
        let lmd_bits = read_u32(data, &mut p);
        let l_state = read_u16(data, &mut p);
        let m_state = read_u16(data, &mut p);
        let d_state = read_u16(data, &mut p);

        if n_literals > MAX_LITERALS_PER_BLOCK {
            return Err(Error::invalid_data("lzfse: n_literals exceeds per-block cap"));
        }

        let freq_len = 2 * (L_SYMBOLS + M_SYMBOLS + D_SYMBOLS + LITERAL_SYMBOLS);
        if data.len() < fixed_len + freq_len {
            return Err(Error::decompress_failed("lzfse: truncated v1 frequency tables"));
        }
        let mut l_freq = [0u16; L_SYMBOLS];
        let mut m_freq = [0u16; M_SYMBOLS];
        let mut d_freq = [0u16; D_SYMBOLS];
        let mut literal_freq = [0u16; LITERAL_SYMBOLS];
        for f in l_freq.iter_mut() {
            *f = read_u16(data, &mut p);
        }
        for f in m_freq.iter_mut() {
            *f = read_u16(data, &mut p);
        }
        for f in d_freq.iter_mut() {
            *f = read_u16(data, &mut p);
        }
        for f in literal_freq.iter_mut() {
            *f = read_u16(data, &mut p);
        }

        Ok((
            BlockHeader {
                n_raw_bytes,
                n_payload_bytes,
                n_literals,
                n_matches,
                n_literal_payload_bytes,
                n_lmd_payload_bytes,
                literal_bits,
                literal_state,
                lmd_bits,
                l_state,
                m_state,
                d_state,
                l_freq,
                m_freq,
                d_freq,
                literal_freq,
            },
            p,
        ))
    }

    /// V2 packs the same logical fields bit-compressed: five 20-bit byte
    /// counts, two 3-bit bit-offsets, four 10-bit literal states and the
    /// three L/M/D states, followed by a nibble-coded frequency table.
    /// The bit layout below is this crate's own reconstruction of the
    /// packed fields (built from the field widths implied by the state
    /// table sizes), not a byte-for-byte transcription of a producer's
    /// source, since V2 is reconstructed without a reference decoder body.
    fn parse_v2(data: &[u8]) -> Result<(Self, usize)> {
        let mut cursor = BitCursor::new(&data[4..]);
        let n_payload_bytes = cursor.take(20)? as usize;
        let n_literals = cursor.take(20)? as usize;
        let n_matches = cursor.take(20)? as usize;
        let n_literal_payload_bytes = cursor.take(20)? as usize;
        let n_lmd_payload_bytes = cursor.take(20)? as usize;
        let literal_bits = cursor.take(3)?;
        let mut literal_state = [0u16; 4];
        for s in literal_state.iter_mut() {
            *s = cursor.take(10)? as u16;
        }
        let lmd_bits = cursor.take(3)?;
        let l_state = cursor.take(6)? as u16;
        let m_state = cursor.take(6)? as u16;
        let d_state = cursor.take(8)? as u16;

        if n_literals > MAX_LITERALS_PER_BLOCK {
            return Err(Error::invalid_data("lzfse: n_literals exceeds per-block cap"));
        }

        let header_bits_consumed = 20 * 5 + 3 * 2 + 10 * 4 + 6 + 6 + 8;
        let header_bytes_consumed = header_bits_consumed.div_ceil(8);

        let mut freq_cursor = BitCursor::new(&data[4 + header_bytes_consumed..]);
        let l_freq = read_nibble_freq::<L_SYMBOLS>(&mut freq_cursor)?;
        let m_freq = read_nibble_freq::<M_SYMBOLS>(&mut freq_cursor)?;
        let d_freq = read_nibble_freq::<D_SYMBOLS>(&mut freq_cursor)?;
        let literal_freq = read_nibble_freq::<LITERAL_SYMBOLS>(&mut freq_cursor)?;
        let freq_bytes_consumed = freq_cursor.bytes_consumed();

        // n_raw_bytes is not carried in the packed fields (mirroring V1's
        // leading explicit field is redundant once payload sizes are
        // known); it is recovered by the caller from the sum of L values
        // decoded, so report 0 here and let decode_block fill output
        // until n_matches/n_literals are exhausted.
        let n_raw_bytes = 0;

        Ok((
            BlockHeader {
                n_raw_bytes,
                n_payload_bytes,
                n_literals,
                n_matches,
                n_literal_payload_bytes,
                n_lmd_payload_bytes,
                literal_bits,
                literal_state,
                lmd_bits,
                l_state,
                m_state,
                d_state,
                l_freq,
                m_freq,
                d_freq,
                literal_freq,
            },
            4 + header_bytes_consumed + freq_bytes_consumed,
        ))
    }
}

fn read_u32(data: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_le_bytes(data[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

fn read_u16(data: &[u8], pos: &mut usize) -> u16 {
    let v = u16::from_le_bytes(data[*pos..*pos + 2].try_into().unwrap());
    *pos += 2;
    v
}

/// Forward, LSB-first bit reader used only for unpacking V2 header
/// fields (distinct from the reverse payload bit streams below).
struct BitCursor<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    fn take(&mut self, n_bits: u32) -> Result<u32> {
        let mut value = 0u32;
        for i in 0..n_bits {
            let byte_idx = (self.bit_pos + i as usize) / 8;
            let bit_idx = (self.bit_pos + i as usize) % 8;
            if byte_idx >= self.data.len() {
                return Err(Error::decompress_failed("lzfse: v2 header truncated"));
            }
            let bit = (self.data[byte_idx] >> bit_idx) & 1;
            value |= (bit as u32) << i;
        }
        self.bit_pos += n_bits as usize;
        Ok(value)
    }

    fn bytes_consumed(&self) -> usize {
        self.bit_pos.div_ceil(8)
    }
}

/// Decodes a nibble-coded frequency table of `N` symbols: each frequency
/// is a sequence of 4-bit groups, low three bits carrying magnitude and
/// the high bit marking continuation (a simple nibble-varint).
fn read_nibble_freq<const N: usize>(cursor: &mut BitCursor) -> Result<[u16; N]> {
    let mut freq = [0u16; N];
    for f in freq.iter_mut() {
        let mut value: u32 = 0;
        let mut shift = 0u32;
        loop {
            let nibble = cursor.take(4)?;
            value |= (nibble & 0x7) << shift;
            if nibble & 0x8 == 0 {
                break;
            }
            shift += 3;
            if shift > 24 {
                return Err(Error::invalid_data("lzfse: nibble frequency code too long"));
            }
        }
        *f = value as u16;
    }
    Ok(freq)
}

/// FSE decoder table entry for the 256-symbol literal alphabet.
#[derive(Clone, Copy)]
struct LiteralEntry {
    n_bits: u8,
    symbol: u8,
    new_state_base: u16,
}

/// FSE decoder table entry for an (L, M, D) value alphabet: the state
/// transition portion (`fse_bits`, `new_state_base`) plus the raw value
/// bits that, added to `value_base`, give the decoded value.
#[derive(Clone, Copy)]
struct ValueEntry {
    fse_bits: u8,
    value_bits: u32,
    new_state_base: u16,
    value_base: i32,
}

fn build_literal_table(freq: &[u16; LITERAL_SYMBOLS]) -> Result<Vec<LiteralEntry>> {
    build_fse_table(freq, LITERAL_STATES).map(|(positions, next)| {
        build_literal_entries(LITERAL_STATES, &positions, &next)
    })
}

fn build_literal_entries(
    table_size: usize,
    positions: &[u8],
    next: &[u32],
) -> Vec<LiteralEntry> {
    let table_log = table_size.trailing_zeros();
    let mut next = next.to_vec();
    (0..table_size)
        .map(|slot| {
            let symbol = positions[slot];
            let state = next[symbol as usize];
            next[symbol as usize] += 1;
            let n_bits = table_log - highbit(state);
            let new_state_base = ((state << n_bits) - table_size as u32) as u16;
            LiteralEntry {
                n_bits: n_bits as u8,
                symbol,
                new_state_base,
            }
        })
        .collect()
}

fn build_value_table(
    freq: &[u16],
    n_states: usize,
    extra_bits: &[u32],
    base_value: &[i32],
) -> Result<Vec<ValueEntry>> {
    let (positions, next) = build_fse_table(freq, n_states)?;
    let table_log = n_states.trailing_zeros();
    let mut next = next;
    Ok((0..n_states)
        .map(|slot| {
            let symbol = positions[slot] as usize;
            let state = next[symbol];
            next[symbol] += 1;
            let fse_bits = table_log - highbit(state);
            let new_state_base = ((state << fse_bits) - n_states as u32) as u16;
            ValueEntry {
                fse_bits: fse_bits as u8,
                value_bits: extra_bits[symbol],
                new_state_base,
                value_base: base_value[symbol],
            }
        })
        .collect())
}

/// Shared construction: spreads symbol occurrences across `table_size`
/// slots using the canonical FSE step-and-mask spread, then returns
/// (slot -> symbol, per-symbol running state counter starting at its own
/// frequency). This is the standard Zstd/FSE table-build algorithm.
fn build_fse_table(freq: &[u16], table_size: usize) -> Result<(Vec<u8>, Vec<u32>)> {
    let total: u32 = freq.iter().map(|&f| f as u32).sum();
    if total as usize != table_size {
        return Err(Error::invalid_data(format!(
            "lzfse: frequency table sums to {total}, expected {table_size}"
        )));
    }
    let mask = table_size - 1;
    let step = (table_size >> 1) + (table_size >> 3) + 3;
    let mut positions = vec![0u8; table_size];
    let mut position = 0usize;
    for (symbol, &f) in freq.iter().enumerate() {
        for _ in 0..f {
            positions[position] = symbol as u8;
            position = (position + step) & mask;
        }
    }
    let next: Vec<u32> = freq.iter().map(|&f| f as u32).collect();
    Ok((positions, next))
}

fn highbit(mut v: u32) -> u32 {
    let mut n = 0;
    while v > 1 {
        v >>= 1;
        n += 1;
    }
    n
}

/// Reverse bit reader: both payload streams are written high-address to
/// low-address and consumed most-significant-bit first within the final
/// partial byte.
struct ReverseBitReader<'a> {
    data: &'a [u8],
    /// Byte offset one past the next byte to pull into the buffer.
    byte_cursor: isize,
    bit_buffer: u64,
    bits_in_buffer: u32,
}

impl<'a> ReverseBitReader<'a> {
    fn new(data: &'a [u8], initial_bit_offset: u32) -> Self {
        let mut reader = Self {
            data,
            byte_cursor: data.len() as isize,
            bit_buffer: 0,
            bits_in_buffer: 0,
        };
        reader.refill();
        // Drop the trailing bits of the final byte that aren't payload.
        if initial_bit_offset > 0 && reader.bits_in_buffer >= initial_bit_offset {
            reader.bit_buffer >>= initial_bit_offset;
            reader.bits_in_buffer -= initial_bit_offset;
        }
        reader
    }

    fn refill(&mut self) {
        while self.bits_in_buffer <= 56 && self.byte_cursor > 0 {
            self.byte_cursor -= 1;
            let byte = self.data[self.byte_cursor as usize];
            self.bit_buffer |= (byte as u64) << self.bits_in_buffer;
            self.bits_in_buffer += 8;
        }
    }

    fn take(&mut self, n_bits: u32) -> Result<u32> {
        if n_bits == 0 {
            return Ok(0);
        }
        if self.bits_in_buffer < n_bits {
            self.refill();
            if self.bits_in_buffer < n_bits {
                return Err(Error::decompress_failed("lzfse: bit stream exhausted"));
            }
        }
        let value = (self.bit_buffer & ((1u64 << n_bits) - 1)) as u32;
        self.bit_buffer >>= n_bits;
        self.bits_in_buffer -= n_bits;
        Ok(value)
    }
}

fn decode_block(
    header: &BlockHeader,
    input: &[u8],
    in_pos: &mut usize,
    output: &mut [u8],
    out_pos_before: usize,
    current_distance: &mut i32,
) -> Result<usize> {
    let mut out_pos = out_pos_before;
    if *in_pos + header.n_literal_payload_bytes + header.n_lmd_payload_bytes > input.len() {
        return Err(Error::decompress_failed("lzfse: block payload overruns input"));
    }
    if header.n_payload_bytes != 0
        && header.n_payload_bytes != header.n_literal_payload_bytes + header.n_lmd_payload_bytes
    {
        return Err(Error::invalid_data(
            "lzfse: n_payload_bytes disagrees with literal + lmd payload lengths",
        ));
    }

    let literal_table = build_literal_table(&header.literal_freq)?;
    let l_table = build_value_table(&header.l_freq, L_STATES, &L_EXTRA_BITS, &L_BASE_VALUE)?;
    let m_table = build_value_table(&header.m_freq, M_STATES, &M_EXTRA_BITS, &M_BASE_VALUE)?;
    let d_table = build_value_table(&header.d_freq, D_STATES, &D_EXTRA_BITS, &D_BASE_VALUE)?;

    let literal_payload = &input[*in_pos..*in_pos + header.n_literal_payload_bytes];
    let lmd_payload = &input[*in_pos + header.n_literal_payload_bytes
        ..*in_pos + header.n_literal_payload_bytes + header.n_lmd_payload_bytes];
    *in_pos += header.n_literal_payload_bytes + header.n_lmd_payload_bytes;

    // Decode literals.
    let mut literals = vec![0u8; header.n_literals];
    {
        let mut reader = ReverseBitReader::new(literal_payload, header.literal_bits);
        let mut states = header.literal_state;
        let mut produced = 0usize;
        while produced < header.n_literals {
            for state in states.iter_mut() {
                if produced >= header.n_literals {
                    break;
                }
                let entry = literal_table[*state as usize];
                literals[produced] = entry.symbol;
                produced += 1;
                let bits = reader.take(entry.n_bits as u32)?;
                *state = entry.new_state_base + bits as u16;
            }
        }
    }

    // Decode LMD triples and drive LZ output.
    {
        let mut reader = ReverseBitReader::new(lmd_payload, header.lmd_bits);
        let mut l_state = header.l_state;
        let mut m_state = header.m_state;
        let mut d_state = header.d_state;
        let mut literal_cursor = 0usize;

        for _ in 0..header.n_matches {
            let l_entry = l_table[l_state as usize];
            let l_value_bits = reader.take(l_entry.value_bits)?;
            let l_value = l_entry.value_base + l_value_bits as i32;
            let l_fse_bits = reader.take(l_entry.fse_bits as u32)?;
            l_state = l_entry.new_state_base + l_fse_bits as u16;

            let m_entry = m_table[m_state as usize];
            let m_value_bits = reader.take(m_entry.value_bits)?;
            let m_value = m_entry.value_base + m_value_bits as i32;
            let m_fse_bits = reader.take(m_entry.fse_bits as u32)?;
            m_state = m_entry.new_state_base + m_fse_bits as u16;

            let d_entry = d_table[d_state as usize];
            let d_value_bits = reader.take(d_entry.value_bits)?;
            let mut d_value = d_entry.value_base + d_value_bits as i32;
            let d_fse_bits = reader.take(d_entry.fse_bits as u32)?;
            d_state = d_entry.new_state_base + d_fse_bits as u16;

            if d_value == 0 {
                d_value = *current_distance;
            }
            *current_distance = d_value;

            if l_value > 0 {
                let l_value = l_value as usize;
                if literal_cursor + l_value > literals.len() {
                    return Err(Error::invalid_data("lzfse: literal run exceeds decoded literal count"));
                }
                if out_pos + l_value > output.len() {
                    return Err(Error::decompress_failed("lzfse: literal copy overruns output capacity"));
                }
                output[out_pos..out_pos + l_value]
                    .copy_from_slice(&literals[literal_cursor..literal_cursor + l_value]);
                literal_cursor += l_value;
                out_pos += l_value;
            }

            if m_value > 0 {
                let m_value = m_value as usize;
                let distance = d_value as usize;
                if distance == 0 || distance > out_pos {
                    return Err(Error::decompress_failed(
                        "lzfse: match distance reaches before output start",
                    ));
                }
                if out_pos + m_value > output.len() {
                    return Err(Error::decompress_failed("lzfse: match overruns output capacity"));
                }
                let mut src = out_pos - distance;
                for _ in 0..m_value {
                    output[out_pos] = output[src];
                    src += 1;
                    out_pos += 1;
                }
            }
        }
    }

    if header.n_raw_bytes != 0 && out_pos - out_pos_before != header.n_raw_bytes {
        return Err(Error::invalid_data(
            "lzfse: block produced a different byte count than its header declared",
        ));
    }

    Ok(out_pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncompressed_block_roundtrip() {
        let payload = b"hello lzfse";
        let mut input = Vec::new();
        input.extend_from_slice(b"bvx-");
        input.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        input.extend_from_slice(payload);
        input.extend_from_slice(b"bvx$");

        let mut output = [0u8; 32];
        let n = decompress(&input, &mut output).unwrap();
        assert_eq!(&output[..n], payload);
    }

    #[test]
    fn bad_magic_is_signature_mismatch() {
        let input = [0u8, 1, 2, 3];
        let mut output = [0u8; 16];
        let err = decompress(&input, &mut output).unwrap_err();
        assert!(matches!(
            err,
            Error::Input(crate::error::InputError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn fse_table_spreads_every_slot_exactly_once() {
        // Two symbols, frequencies summing to a small power-of-two table.
        let freq = [6u16, 2];
        let (positions, next) = build_fse_table(&freq, 8).unwrap();
        assert_eq!(positions.len(), 8);
        assert_eq!(next, vec![6, 2]);
        let mut counts = [0u32; 2];
        for &p in &positions {
            counts[p as usize] += 1;
        }
        assert_eq!(counts, [6, 2]);
    }
}
