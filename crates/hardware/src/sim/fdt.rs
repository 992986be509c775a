//! Flattened device tree builder.
//!
//! A minimal FDT v17 serialiser: begin/end node nesting, typed properties,
//! and a deduplicated string table, producing the blob layout the kernel's
//! early boot code expects (header, structure block, reservation map,
//! string block). Property values are big-endian per the DT specification.

/// FDT header magic.
const FDT_MAGIC: u32 = 0xd00d_feed;
/// Blob format version emitted.
const FDT_VERSION: u32 = 17;

/// Structure block token: node start.
const FDT_BEGIN_NODE: u32 = 1;
/// Structure block token: node end.
const FDT_END_NODE: u32 = 2;
/// Structure block token: property.
const FDT_PROP: u32 = 3;
/// Structure block token: end of tree.
const FDT_END: u32 = 9;

/// Incremental device tree builder.
#[derive(Default)]
pub struct FdtBuilder {
    structure: Vec<u8>,
    strings: Vec<u8>,
    open_nodes: u32,
}

impl FdtBuilder {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    fn put_u32(&mut self, v: u32) {
        self.structure.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends raw data, zero-padded to a cell boundary.
    fn put_data(&mut self, data: &[u8]) {
        self.structure.extend_from_slice(data);
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        let bytes = name.as_bytes();
        let mut pos = 0;
        while pos < self.strings.len() {
            let end = pos + self.strings[pos..].iter().position(|&b| b == 0).unwrap_or(0);
            if &self.strings[pos..end] == bytes {
                return pos as u32;
            }
            pos = end + 1;
        }
        let off = self.strings.len() as u32;
        self.strings.extend_from_slice(bytes);
        self.strings.push(0);
        off
    }

    /// Opens a node.
    pub fn begin_node(&mut self, name: &str) {
        self.put_u32(FDT_BEGIN_NODE);
        let mut bytes = name.as_bytes().to_vec();
        bytes.push(0);
        self.put_data(&bytes);
        self.open_nodes += 1;
    }

    /// Opens a unit-addressed node (`name@hexaddr`).
    pub fn begin_node_num(&mut self, name: &str, addr: u64) {
        self.begin_node(&format!("{name}@{addr:x}"));
    }

    /// Closes the innermost open node.
    pub fn end_node(&mut self) {
        self.put_u32(FDT_END_NODE);
        self.open_nodes -= 1;
    }

    /// Raw property.
    pub fn prop(&mut self, name: &str, data: &[u8]) {
        self.put_u32(FDT_PROP);
        self.put_u32(data.len() as u32);
        let off = self.string_offset(name);
        self.put_u32(off);
        self.put_data(data);
    }

    /// Empty (boolean) property.
    pub fn prop_empty(&mut self, name: &str) {
        self.prop(name, &[]);
    }

    /// Cell-array property.
    pub fn prop_u32_list(&mut self, name: &str, vals: &[u32]) {
        let mut data = Vec::with_capacity(vals.len() * 4);
        for v in vals {
            data.extend_from_slice(&v.to_be_bytes());
        }
        self.prop(name, &data);
    }

    /// Single-cell property.
    pub fn prop_u32(&mut self, name: &str, val: u32) {
        self.prop_u32_list(name, &[val]);
    }

    /// Two-cell (64-bit) property.
    pub fn prop_u64(&mut self, name: &str, val: u64) {
        self.prop_u32_list(name, &[(val >> 32) as u32, val as u32]);
    }

    /// Four-cell property holding two 64-bit values (`reg` style).
    pub fn prop_u64_pair(&mut self, name: &str, v0: u64, v1: u64) {
        self.prop_u32_list(
            name,
            &[(v0 >> 32) as u32, v0 as u32, (v1 >> 32) as u32, v1 as u32],
        );
    }

    /// String property (NUL-terminated).
    pub fn prop_str(&mut self, name: &str, val: &str) {
        let mut data = val.as_bytes().to_vec();
        data.push(0);
        self.prop(name, &data);
    }

    /// String-list property.
    pub fn prop_str_list(&mut self, name: &str, vals: &[&str]) {
        let mut data = Vec::new();
        for v in vals {
            data.extend_from_slice(v.as_bytes());
            data.push(0);
        }
        self.prop(name, &data);
    }

    /// Serialises the finished tree.
    ///
    /// All opened nodes must have been closed.
    pub fn finish(mut self) -> Vec<u8> {
        debug_assert_eq!(self.open_nodes, 0);
        self.put_u32(FDT_END);

        let header_len = 40;
        let dt_struct_size = self.structure.len();
        let dt_strings_size = self.strings.len();

        let off_dt_struct = header_len;
        let mut pos = off_dt_struct + dt_struct_size;
        while pos % 8 != 0 {
            pos += 1;
        }
        let off_mem_rsvmap = pos;
        pos += 16; // one terminating reservation entry
        let off_dt_strings = pos;
        pos += dt_strings_size;
        while pos % 8 != 0 {
            pos += 1;
        }
        let total_size = pos;

        let mut out = vec![0u8; total_size];
        let header: [u32; 10] = [
            FDT_MAGIC,
            total_size as u32,
            off_dt_struct as u32,
            off_dt_strings as u32,
            off_mem_rsvmap as u32,
            FDT_VERSION,
            16, // last compatible version
            0,  // boot cpu
            dt_strings_size as u32,
            dt_struct_size as u32,
        ];
        for (i, v) in header.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_be_bytes());
        }
        out[off_dt_struct..off_dt_struct + dt_struct_size].copy_from_slice(&self.structure);
        out[off_dt_strings..off_dt_strings + dt_strings_size].copy_from_slice(&self.strings);
        out
    }
}
