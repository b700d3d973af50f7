// Binary property list (`bplist00`) reader.
//
// Layout: 8-byte magic, object table, offset table, 32-byte trailer. Objects
// reference each other by index into the offset table. All multi-byte
// integers are big-endian.
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::value::{Table, Value};

pub const MAGIC: &[u8; 8] = b"bplist00";
pub(crate) const TRAILER_LEN: usize = 32;
/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
pub(crate) const APPLE_EPOCH_OFFSET: i64 = 978_307_200;
const MAX_DEPTH: usize = 512;
// Floor for the decoded node budget; see `Parser::new`.
const MIN_NODE_BUDGET: usize = 1 << 16;

pub fn decode(data: &[u8]) -> Result<Value> {
    let mut parser = Parser::new(data)?;
    let top = parser.trailer.top_object;
    parser.read_object(top)
}

#[derive(Debug, Clone, Copy)]
struct Trailer {
    offset_size: usize,
    ref_size: usize,
    num_objects: usize,
    top_object: usize,
    offset_table: usize,
}

#[derive(Debug)]
pub struct Parser<'a> {
    data: &'a [u8],
    trailer: Trailer,
    offsets: Vec<usize>,
    // objects currently being decoded, for cycle detection
    stack: Vec<usize>,
    // nodes produced so far and the most this document may produce
    produced: usize,
    budget: usize,
}

impl<'a> Parser<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < MAGIC.len() + TRAILER_LEN {
            return Err(Error::format("file too short for a binary plist"));
        }
        if &data[..MAGIC.len()] != MAGIC {
            return Err(Error::format_at("missing bplist00 header", 0));
        }
        let trailer_at = data.len() - TRAILER_LEN;
        let t = &data[trailer_at..];
        let trailer = Trailer {
            offset_size: t[6] as usize,
            ref_size: t[7] as usize,
            num_objects: to_usize(be_uint(&t[8..16]), trailer_at)?,
            top_object: to_usize(be_uint(&t[16..24]), trailer_at)?,
            offset_table: to_usize(be_uint(&t[24..32]), trailer_at)?,
        };
        if !(1..=8).contains(&trailer.offset_size) || !(1..=8).contains(&trailer.ref_size) {
            return Err(Error::format_at("invalid integer sizes in trailer", trailer_at));
        }
        if trailer.num_objects == 0 || trailer.top_object >= trailer.num_objects {
            return Err(Error::format_at("invalid object count in trailer", trailer_at));
        }
        let table_end = trailer
            .num_objects
            .checked_mul(trailer.offset_size)
            .and_then(|n| n.checked_add(trailer.offset_table))
            .filter(|end| *end <= trailer_at && trailer.offset_table >= MAGIC.len())
            .ok_or_else(|| Error::format_at("offset table out of bounds", trailer_at))?;

        let mut offsets = Vec::with_capacity(trailer.num_objects);
        for chunk in data[trailer.offset_table..table_end].chunks(trailer.offset_size) {
            let off = be_uint(chunk);
            if off < MAGIC.len() as u64 || off >= trailer.offset_table as u64 {
                return Err(Error::format_at(
                    format!("object offset {off:#x} out of bounds"),
                    trailer.offset_table,
                ));
            }
            offsets.push(off as usize);
        }
        // Each node in an unshared tree costs at least one reference byte, so
        // a decode that outgrows the input is expanding shared containers.
        let budget = data.len().saturating_mul(2).max(MIN_NODE_BUDGET);
        Ok(Self {
            data,
            trailer,
            offsets,
            stack: Vec::new(),
            produced: 0,
            budget,
        })
    }

    fn read_object(&mut self, index: usize) -> Result<Value> {
        let offset = *self
            .offsets
            .get(index)
            .ok_or_else(|| Error::format(format!("object reference {index} out of range")))?;
        if self.stack.contains(&index) {
            return Err(Error::format_at("object reference cycle", offset));
        }
        if self.stack.len() >= MAX_DEPTH {
            return Err(Error::format_at("document nested too deeply", offset));
        }
        self.produced += 1;
        if self.produced > self.budget {
            return Err(Error::format_at("document expands too far", offset));
        }
        self.stack.push(index);
        let v = self.read_object_at(offset);
        self.stack.pop();
        v
    }

    fn read_object_at(&mut self, offset: usize) -> Result<Value> {
        let marker = self.byte(offset)?;
        let low = marker & 0x0F;
        let v = match marker >> 4 {
            0x0 => match low {
                0x0 => Value::Null,
                0x8 => Value::Bool(false),
                0x9 => Value::Bool(true),
                _ => return Err(Error::format_at(format!("unknown marker {marker:#04x}"), offset)),
            },
            0x1 => Value::Integer(self.read_int(offset)?.0),
            0x2 => {
                let x = match low {
                    2 => f64::from(f32::from_bits(be_uint(self.slice(offset + 1, 4)?) as u32)),
                    3 => f64::from_bits(be_uint(self.slice(offset + 1, 8)?)),
                    _ => return Err(Error::format_at(format!("unsupported real width {low}"), offset)),
                };
                Value::Float(x)
            }
            0x3 if low == 3 => {
                let secs = f64::from_bits(be_uint(self.slice(offset + 1, 8)?));
                Value::Date(date_from_apple_secs(secs).ok_or_else(|| {
                    Error::format_at(format!("date {secs} out of range"), offset)
                })?)
            }
            0x4 => {
                let (len, start) = self.read_count(offset, low)?;
                Value::Bytes(self.slice(start, len)?.to_vec())
            }
            0x5 => {
                let (len, start) = self.read_count(offset, low)?;
                Value::Text(self.read_ascii(start, len)?)
            }
            0x6 => {
                let (len, start) = self.read_count(offset, low)?;
                Value::Text(self.read_utf16(start, len)?)
            }
            0xA => {
                let (len, start) = self.read_count(offset, low)?;
                let refs = self.read_refs(start, len)?;
                let mut items = Vec::with_capacity(refs.len());
                for r in refs {
                    items.push(self.read_object(r)?);
                }
                Value::Array(items)
            }
            0xD => {
                let (len, start) = self.read_count(offset, low)?;
                let refs = self.read_refs(start, len.checked_mul(2).unwrap_or(usize::MAX))?;
                let (keys, vals) = refs.split_at(len);
                let mut table = Table::with_capacity(len);
                for (k, v) in keys.iter().zip(vals) {
                    let key = match self.read_object(*k)? {
                        Value::Text(s) => s,
                        other => {
                            return Err(Error::format_at(
                                format!("dictionary key must be a string, found {}", other.kind()),
                                offset,
                            ));
                        }
                    };
                    let val = self.read_object(*v)?;
                    table.insert(key, val);
                }
                Value::Table(table)
            }
            _ => {
                return Err(Error::format_at(
                    format!("unsupported object marker {marker:#04x}"),
                    offset,
                ));
            }
        };
        Ok(v)
    }

    // Returns the integer and the offset just past it.
    fn read_int(&self, offset: usize) -> Result<(i64, usize)> {
        let marker = self.byte(offset)?;
        if marker >> 4 != 0x1 {
            return Err(Error::format_at(format!("expected integer, found {marker:#04x}"), offset));
        }
        let width = match marker & 0x0F {
            n @ 0..=4 => 1usize << n,
            n => return Err(Error::format_at(format!("unsupported integer width 2^{n}"), offset)),
        };
        let bytes = self.slice(offset + 1, width)?;
        let v = match width {
            // 1, 2 and 4 byte ints are unsigned; 8 byte ints are signed
            1 | 2 | 4 | 8 => be_uint(bytes) as i64,
            _ => {
                let (high, low) = bytes.split_at(8);
                let low = be_uint(low) as i64;
                let fits = match be_uint(high) {
                    0 => low >= 0,
                    u64::MAX => low < 0,
                    _ => false,
                };
                if !fits {
                    return Err(Error::format_at("integer does not fit in 64 bits", offset));
                }
                low
            }
        };
        Ok((v, offset + 1 + width))
    }

    fn read_count(&self, offset: usize, low: u8) -> Result<(usize, usize)> {
        if low != 0x0F {
            return Ok((low as usize, offset + 1));
        }
        let (n, next) = self.read_int(offset + 1)?;
        let n = usize::try_from(n).map_err(|_| Error::format_at("negative length", offset))?;
        Ok((n, next))
    }

    fn read_refs(&self, start: usize, count: usize) -> Result<Vec<usize>> {
        let size = self.trailer.ref_size;
        let len = count
            .checked_mul(size)
            .ok_or_else(|| Error::format_at("reference list too long", start))?;
        let raw = self.slice(start, len)?;
        raw.chunks(size)
            .map(|c| to_usize(be_uint(c), start))
            .collect()
    }

    fn read_ascii(&self, start: usize, len: usize) -> Result<String> {
        let raw = self.slice(start, len)?;
        if !raw.is_ascii() {
            return Err(Error::format_at("non-ASCII byte in ASCII string", start));
        }
        Ok(raw.iter().map(|b| *b as char).collect())
    }

    fn read_utf16(&self, start: usize, units: usize) -> Result<String> {
        let len = units
            .checked_mul(2)
            .ok_or_else(|| Error::format_at("string too long", start))?;
        let raw = self.slice(start, len)?;
        let units = raw.chunks(2).map(|c| u16::from_be_bytes([c[0], c[1]]));
        char::decode_utf16(units)
            .collect::<Result<String, _>>()
            .map_err(|_| Error::format_at("invalid UTF-16 string", start))
    }

    // Low-level utilities
    fn byte(&self, pos: usize) -> Result<u8> {
        self.data
            .get(pos)
            .copied()
            .ok_or_else(|| Error::format_at("eof", pos))
    }

    fn slice(&self, start: usize, len: usize) -> Result<&'a [u8]> {
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| Error::format_at("eof", start))
    }
}

pub(crate) fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn to_usize(v: u64, at: usize) -> Result<usize> {
    usize::try_from(v).map_err(|_| Error::format_at("value does not fit in usize", at))
}

pub(crate) fn date_from_apple_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs.abs() > 1e15 {
        return None;
    }
    let mut whole = secs.floor();
    let mut nanos = ((secs - whole) * 1e9).round() as u32;
    if nanos >= 1_000_000_000 {
        whole += 1.0;
        nanos = 0;
    }
    let unix = (whole as i64).checked_add(APPLE_EPOCH_OFFSET)?;
    DateTime::from_timestamp(unix, nanos)
}

pub(crate) fn date_to_apple_secs(d: &DateTime<Utc>) -> f64 {
    (d.timestamp() - APPLE_EPOCH_OFFSET) as f64 + f64::from(d.timestamp_subsec_nanos()) / 1e9
}
