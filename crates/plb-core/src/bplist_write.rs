// Binary property list (`bplist00`) writer.
// Every node becomes its own object (no uniquing); table keys are separate
// string objects. Reference and offset widths are the smallest that fit.
use crate::bplist::{MAGIC, date_to_apple_secs};
use crate::value::Value;

pub fn encode(root: &Value) -> Vec<u8> {
    let mut objects = Vec::new();
    flatten(root, &mut objects);
    let mut w = Writer::new(width_for(objects.len() as u64 - 1));
    for obj in &objects {
        w.object(obj);
    }
    w.finish(objects.len())
}

enum Obj<'v> {
    Leaf(&'v Value),
    Key(&'v str),
    Array(Vec<usize>),
    Dict(Vec<usize>, Vec<usize>),
}

// Pre-order: a container's index is always smaller than its children's.
fn flatten<'v>(v: &'v Value, objects: &mut Vec<Obj<'v>>) -> usize {
    let idx = objects.len();
    match v {
        Value::Array(items) => {
            objects.push(Obj::Array(Vec::new()));
            let refs = items.iter().map(|it| flatten(it, objects)).collect();
            objects[idx] = Obj::Array(refs);
        }
        Value::Table(map) => {
            objects.push(Obj::Dict(Vec::new(), Vec::new()));
            let keys = map
                .keys()
                .map(|k| {
                    objects.push(Obj::Key(k));
                    objects.len() - 1
                })
                .collect();
            let vals = map.values().map(|vv| flatten(vv, objects)).collect();
            objects[idx] = Obj::Dict(keys, vals);
        }
        _ => objects.push(Obj::Leaf(v)),
    }
    idx
}

fn width_for(max: u64) -> usize {
    match max {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFFFF_FFFF => 4,
        _ => 8,
    }
}

struct Writer {
    out: Vec<u8>,
    offsets: Vec<u64>,
    ref_size: usize,
}

impl Writer {
    fn new(ref_size: usize) -> Self {
        let mut out = Vec::with_capacity(1024);
        out.extend_from_slice(MAGIC);
        Self {
            out,
            offsets: Vec::new(),
            ref_size,
        }
    }

    fn push(&mut self, b: u8) {
        self.out.push(b);
    }
    fn write_be(&mut self, v: u64, width: usize) {
        self.out.extend_from_slice(&v.to_be_bytes()[8 - width..]);
    }
    fn write_f64(&mut self, v: f64) {
        self.out.extend_from_slice(&v.to_bits().to_be_bytes());
    }

    fn write_int(&mut self, v: i64) {
        match v {
            0..=0xFF => {
                self.push(0x10);
                self.write_be(v as u64, 1);
            }
            0x100..=0xFFFF => {
                self.push(0x11);
                self.write_be(v as u64, 2);
            }
            0x1_0000..=0xFFFF_FFFF => {
                self.push(0x12);
                self.write_be(v as u64, 4);
            }
            // negatives and large values use the signed 8-byte form
            _ => {
                self.push(0x13);
                self.write_be(v as u64, 8);
            }
        }
    }

    fn marker_with_count(&mut self, kind: u8, count: usize) {
        if count < 0x0F {
            self.push((kind << 4) | count as u8);
        } else {
            self.push((kind << 4) | 0x0F);
            self.write_int(count as i64);
        }
    }

    fn write_str(&mut self, s: &str) {
        if s.is_ascii() {
            self.marker_with_count(0x5, s.len());
            self.out.extend_from_slice(s.as_bytes());
        } else {
            let units: Vec<u16> = s.encode_utf16().collect();
            self.marker_with_count(0x6, units.len());
            for u in units {
                self.out.extend_from_slice(&u.to_be_bytes());
            }
        }
    }

    fn write_refs(&mut self, refs: &[usize]) {
        for r in refs {
            self.write_be(*r as u64, self.ref_size);
        }
    }

    fn object(&mut self, obj: &Obj<'_>) {
        self.offsets.push(self.out.len() as u64);
        match obj {
            Obj::Key(k) => self.write_str(k),
            Obj::Array(refs) => {
                self.marker_with_count(0xA, refs.len());
                self.write_refs(refs);
            }
            Obj::Dict(keys, vals) => {
                self.marker_with_count(0xD, keys.len());
                self.write_refs(keys);
                self.write_refs(vals);
            }
            Obj::Leaf(v) => self.leaf(v),
        }
    }

    fn leaf(&mut self, v: &Value) {
        match v {
            Value::Null => self.push(0x00),
            Value::Bool(false) => self.push(0x08),
            Value::Bool(true) => self.push(0x09),
            Value::Integer(n) => self.write_int(*n),
            Value::Float(x) => {
                self.push(0x23);
                self.write_f64(*x);
            }
            Value::Date(d) => {
                self.push(0x33);
                self.write_f64(date_to_apple_secs(d));
            }
            Value::Text(s) => self.write_str(s),
            Value::Bytes(b) => {
                self.marker_with_count(0x4, b.len());
                self.out.extend_from_slice(b);
            }
            // containers are flattened before writing
            Value::Array(_) | Value::Table(_) => unreachable!("container passed as leaf"),
        }
    }

    fn finish(mut self, num_objects: usize) -> Vec<u8> {
        let table_at = self.out.len() as u64;
        let offset_size = width_for(self.offsets.iter().copied().max().unwrap_or(0));
        let offsets = std::mem::take(&mut self.offsets);
        for off in offsets {
            self.write_be(off, offset_size);
        }
        self.out.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        self.push(offset_size as u8);
        self.push(self.ref_size as u8);
        self.write_be(num_objects as u64, 8);
        self.write_be(0, 8);
        self.write_be(table_at, 8);
        self.out
    }
}
