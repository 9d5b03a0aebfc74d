//! Hand-rolled protobuf encoder/decoder and UMP varint parser for onesie.
//!
//! No external protobuf crate needed — the request and response messages
//! only use varint, bool, string and bytes fields, and the UMP container
//! framing is a handful of varint forms.

// ─── Protobuf Writer ───────────────────────────────────────────────────────

pub struct ProtoWriter {
    buf: Vec<u8>,
}

impl ProtoWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    // Write a protobuf varint (7-bit continuation encoding)
    pub fn write_varint(&mut self, mut v: u64) {
        while v > 0x7F {
            self.buf.push((v as u8 & 0x7F) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    fn write_tag(&mut self, field: u32, wire_type: u8) {
        self.write_varint(((field as u64) << 3) | (wire_type as u64));
    }

    /// Field type 0 (varint), skip if value == 0
    pub fn write_i32(&mut self, field: u32, value: i32) {
        if value == 0 {
            return;
        }
        self.write_tag(field, 0);
        self.write_varint(value as u64);
    }

    /// Field type 0, write bool if true
    pub fn write_bool(&mut self, field: u32, value: bool) {
        if !value {
            return;
        }
        self.write_tag(field, 0);
        self.buf.push(1);
    }

    /// Field type 2 (length-delimited string)
    pub fn write_string(&mut self, field: u32, value: &str) {
        if value.is_empty() {
            return;
        }
        self.write_tag(field, 2);
        self.write_varint(value.len() as u64);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Field type 2 (length-delimited bytes)
    pub fn write_bytes(&mut self, field: u32, value: &[u8]) {
        if value.is_empty() {
            return;
        }
        self.write_tag(field, 2);
        self.write_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    /// Embed a nested message (field type 2)
    pub fn write_message(&mut self, field: u32, nested: ProtoWriter) {
        let bytes = nested.finish();
        if bytes.is_empty() {
            return;
        }
        self.write_tag(field, 2);
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// ─── Protobuf Reader ───────────────────────────────────────────────────────

pub struct ProtoReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ProtoReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn has_remaining(&self) -> bool {
        self.pos < self.data.len()
    }

    /// Read one protobuf varint. `None` once the input is exhausted.
    pub fn read_varint(&mut self) -> Option<u64> {
        let mut result: u64 = 0;
        let mut shift = 0u64;
        loop {
            if self.pos >= self.data.len() {
                return None;
            }
            let b = self.data[self.pos] as u64;
            self.pos += 1;
            result |= (b & 0x7F) << shift;
            shift += 7;
            if b & 0x80 == 0 {
                return Some(result);
            }
            if shift >= 64 {
                // Runaway continuation bits; stop rather than loop forever.
                return Some(result);
            }
        }
    }

    pub fn read_tag(&mut self) -> Option<u32> {
        self.read_varint().map(|v| v as u32)
    }

    /// Read a length-delimited field. `None` if the declared length
    /// overruns the buffer.
    pub fn read_bytes(&mut self) -> Option<&'a [u8]> {
        let len = self.read_varint()? as usize;
        if self.pos + len > self.data.len() {
            return None;
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(bytes)
    }

    pub fn read_string(&mut self) -> Option<String> {
        self.read_bytes()
            .map(|b| String::from_utf8_lossy(b).to_string())
    }

    pub fn skip_field(&mut self, wire_type: u32) {
        match wire_type {
            0 => {
                self.read_varint();
            }
            1 => {
                self.pos = (self.pos + 8).min(self.data.len());
            }
            2 => {
                let len = self.read_varint().unwrap_or(0) as usize;
                self.pos = (self.pos + len).min(self.data.len());
            }
            5 => {
                self.pos = (self.pos + 4).min(self.data.len());
            }
            _ => {
                // Unknown wire type — consume all
                self.pos = self.data.len();
            }
        }
    }
}

// ─── UMP Varint ────────────────────────────────────────────────────────────

// UMP uses a *different* multi-byte encoding than protobuf varint:
//  - 0x00..0x7F  (1 byte):  value = byte[0]
//  - 0x80..0xBF  (2 bytes): value = (byte[0] & 0x3F) + 64 * byte[1]
//  - 0xC0..0xDF  (3 bytes): value = (byte[0] & 0x1F) + 32 * (byte[1] + 256 * byte[2])
//  - 0xE0..0xEF  (4 bytes): value = (byte[0] & 0x0F) + 16 * (byte[1] + 256 * (byte[2] + 256 * byte[3]))
//  - 0xF0..      (5 bytes): skip byte[0], read LE u32 from bytes[1..5]

/// Parse one UMP varint from a byte slice, returning `(value, bytes_consumed)`.
/// Returns `None` if not enough bytes are available.
pub fn read_ump_varint(data: &[u8], offset: usize) -> Option<(u64, usize)> {
    if offset >= data.len() {
        return None;
    }
    let first = data[offset] as u64;

    if first < 0x80 {
        return Some((first, 1));
    }
    if first < 0xC0 {
        if offset + 2 > data.len() {
            return None;
        }
        let b2 = data[offset + 1] as u64;
        return Some(((first & 0x3F) + 64 * b2, 2));
    }
    if first < 0xE0 {
        if offset + 3 > data.len() {
            return None;
        }
        let b2 = data[offset + 1] as u64;
        let b3 = data[offset + 2] as u64;
        return Some(((first & 0x1F) + 32 * (b2 + 256 * b3), 3));
    }
    if first < 0xF0 {
        if offset + 4 > data.len() {
            return None;
        }
        let b2 = data[offset + 1] as u64;
        let b3 = data[offset + 2] as u64;
        let b4 = data[offset + 3] as u64;
        return Some(((first & 0x0F) + 16 * (b2 + 256 * (b3 + 256 * b4)), 4));
    }
    // 5-byte form
    if offset + 5 > data.len() {
        return None;
    }
    let value = u32::from_le_bytes([
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
        data[offset + 4],
    ]) as u64;
    Some((value, 5))
}

// ─── UMP parts ─────────────────────────────────────────────────────────────

/// One parsed UMP part: a type discriminator plus its payload bytes.
pub struct UmpPart<'a> {
    pub part_type: u64,
    pub data: &'a [u8],
}

/// Iterates the complete UMP parts of a response buffer. A truncated
/// trailing part ends the stream; it is not an error.
pub struct UmpReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> UmpReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn next_part(&mut self) -> Option<UmpPart<'a>> {
        let (part_type, n1) = read_ump_varint(self.data, self.offset)?;
        let (part_size, n2) = read_ump_varint(self.data, self.offset + n1)?;

        let start = self.offset + n1 + n2;
        let size = part_size as usize;
        if start + size > self.data.len() {
            return None;
        }

        self.offset = start + size;
        Some(UmpPart {
            part_type,
            data: &self.data[start..start + size],
        })
    }
}
