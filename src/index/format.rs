//! Binary layout of the persisted vector index
//!
//! ```text
//! magic      4 bytes  "UKBV"
//! version    u32 LE
//! kind       u8       0 = exact, 1 = hnsw
//! params     3 x u32  hnsw m, ef_construction, ef_search (zero for exact)
//! dimension  u32 LE
//! count      u64 LE
//! checksum   32 bytes BLAKE3 of the uncompressed payload
//! length     u64 LE   compressed payload length
//! payload    zstd(count * dimension f32 LE)
//! ```

use super::IndexKind;

const MAGIC: &[u8; 4] = b"UKBV";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 1 + 12 + 4 + 8 + 32 + 8;
const ZSTD_LEVEL: i32 = 3;

/// Decoded index file contents
#[derive(Debug)]
pub(crate) struct DecodedIndex {
    pub kind: IndexKind,
    pub dimension: usize,
    pub values: Vec<f32>,
}

pub(crate) fn encode(
    kind: IndexKind,
    dimension: usize,
    count: usize,
    values: impl Iterator<Item = f32>,
) -> Result<Vec<u8>, String> {
    let mut payload = Vec::with_capacity(count * dimension * 4);
    for value in values {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    if payload.len() != count * dimension * 4 {
        return Err(format!(
            "Payload holds {} bytes, expected {}",
            payload.len(),
            count * dimension * 4
        ));
    }

    let checksum = blake3::hash(&payload);
    let compressed = zstd::encode_all(&payload[..], ZSTD_LEVEL)
        .map_err(|e| format!("Failed to compress index payload: {}", e))?;

    let (kind_byte, params) = match kind {
        IndexKind::Exact => (0u8, [0u32; 3]),
        IndexKind::Hnsw {
            m,
            ef_construction,
            ef_search,
        } => (
            1u8,
            [
                to_u32(m, "hnsw m")?,
                to_u32(ef_construction, "hnsw ef_construction")?,
                to_u32(ef_search, "hnsw ef_search")?,
            ],
        ),
    };

    let mut bytes = Vec::with_capacity(HEADER_LEN + compressed.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.push(kind_byte);
    for param in params {
        bytes.extend_from_slice(&param.to_le_bytes());
    }
    bytes.extend_from_slice(&to_u32(dimension, "dimension")?.to_le_bytes());
    bytes.extend_from_slice(&(count as u64).to_le_bytes());
    bytes.extend_from_slice(checksum.as_bytes());
    bytes.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&compressed);

    Ok(bytes)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<DecodedIndex, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("File too short ({} bytes)", bytes.len()));
    }

    let mut reader = Reader { bytes, offset: 0 };

    if reader.take(4)? != MAGIC {
        return Err("Not a vector index file (bad magic)".to_string());
    }
    let version = reader.u32()?;
    if version != FORMAT_VERSION {
        return Err(format!("Unsupported index format version {}", version));
    }

    let kind_byte = reader.take(1)?[0];
    let params = [reader.u32()?, reader.u32()?, reader.u32()?];
    let kind = match kind_byte {
        0 => IndexKind::Exact,
        1 => IndexKind::Hnsw {
            m: params[0] as usize,
            ef_construction: params[1] as usize,
            ef_search: params[2] as usize,
        },
        other => return Err(format!("Unknown index kind {}", other)),
    };

    let dimension = reader.u32()? as usize;
    let count = usize::try_from(reader.u64()?).map_err(|_| "Count overflows usize".to_string())?;
    let mut checksum = [0u8; 32];
    checksum.copy_from_slice(reader.take(32)?);
    let compressed_len =
        usize::try_from(reader.u64()?).map_err(|_| "Length overflows usize".to_string())?;
    let compressed = reader.take(compressed_len)?;
    if reader.offset != bytes.len() {
        return Err("Trailing bytes after payload".to_string());
    }

    if dimension == 0 {
        return Err("Dimension is zero".to_string());
    }

    let payload = zstd::decode_all(compressed)
        .map_err(|e| format!("Failed to decompress index payload: {}", e))?;
    if blake3::hash(&payload) != blake3::Hash::from(checksum) {
        return Err("Payload checksum mismatch".to_string());
    }

    let expected_len = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| "Payload size overflows".to_string())?;
    if payload.len() != expected_len {
        return Err(format!(
            "Payload holds {} bytes, header promises {}",
            payload.len(),
            expected_len
        ));
    }

    let values = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(DecodedIndex {
        kind,
        dimension,
        values,
    })
}

fn to_u32(value: usize, what: &str) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("{} ({}) does not fit in u32", what, value))
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| "Unexpected end of file".to_string())?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, String> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(word))
    }
}
