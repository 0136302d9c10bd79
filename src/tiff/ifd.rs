//! Image file directories and tag values.

use bytes::Bytes;

use super::header::TiffHeader;
use crate::error::TiffError;
use crate::io::RangeReader;

/// Upper bound on entries per directory, guards against corrupt counts.
const MAX_ENTRIES: u64 = 4096;

/// Size in bytes of one value of a TIFF field type.
fn field_type_size(field_type: u16) -> Option<u64> {
    match field_type {
        1 | 2 | 6 | 7 => Some(1),      // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => Some(2),              // SHORT, SSHORT
        4 | 9 | 11 | 13 => Some(4),    // LONG, SLONG, FLOAT, IFD
        5 | 10 | 12 => Some(8),        // RATIONAL, SRATIONAL, DOUBLE
        16 | 17 | 18 => Some(8),       // LONG8, SLONG8, IFD8
        _ => None,
    }
}

/// One 12-byte (classic) or 20-byte (BigTIFF) directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u64,
    /// Raw value-or-offset field, 4 or 8 bytes.
    value: Vec<u8>,
}

impl IfdEntry {
    /// Total byte length of the entry's values.
    pub fn byte_len(&self) -> Result<u64, TiffError> {
        let size = field_type_size(self.field_type)
            .ok_or(TiffError::UnknownFieldType(self.field_type))?;
        self.count
            .checked_mul(size)
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: "entry",
                message: format!("count {} overflows", self.count),
            })
    }

    /// Raw bytes of the entry's values, fetched from the file if not inline.
    pub async fn read_bytes(
        &self,
        reader: &dyn RangeReader,
        header: &TiffHeader,
    ) -> Result<Bytes, TiffError> {
        let len = self.byte_len()?;
        if len <= header.offset_size() as u64 {
            return Ok(Bytes::copy_from_slice(&self.value[..len as usize]));
        }
        let offset = header.read_offset(&self.value);
        let len = usize::try_from(len).map_err(|_| TiffError::InvalidTagValue {
            tag: "entry",
            message: format!("{} bytes do not fit in memory", len),
        })?;
        Ok(reader.read_exact_at(offset, len).await?)
    }

    /// Values of an unsigned integer field (BYTE, SHORT, LONG, LONG8, IFD, IFD8).
    pub async fn read_unsigned(
        &self,
        reader: &dyn RangeReader,
        header: &TiffHeader,
    ) -> Result<Vec<u64>, TiffError> {
        let order = header.byte_order;
        let bytes = self.read_bytes(reader, header).await?;
        let values = match self.field_type {
            1 | 7 => bytes.iter().map(|&b| b as u64).collect(),
            3 => bytes.chunks_exact(2).map(|c| order.read_u16(c) as u64).collect(),
            4 | 13 => bytes.chunks_exact(4).map(|c| order.read_u32(c) as u64).collect(),
            16 | 18 => bytes.chunks_exact(8).map(|c| order.read_u64(c)).collect(),
            other => {
                return Err(TiffError::InvalidTagValue {
                    tag: "entry",
                    message: format!("field type {} is not an unsigned integer", other),
                })
            }
        };
        Ok(values)
    }

    /// First value of an unsigned integer field.
    pub async fn read_first(
        &self,
        reader: &dyn RangeReader,
        header: &TiffHeader,
    ) -> Result<u64, TiffError> {
        self.read_unsigned(reader, header)
            .await?
            .first()
            .copied()
            .ok_or(TiffError::InvalidTagValue {
                tag: "entry",
                message: "no values".to_string(),
            })
    }
}

/// A parsed image file directory.
#[derive(Debug, Clone)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,
    /// Offset of the next IFD, 0 at the end of the chain.
    pub next_offset: u64,
}

impl Ifd {
    /// Read the directory at `offset`.
    pub async fn read(
        reader: &dyn RangeReader,
        header: &TiffHeader,
        offset: u64,
    ) -> Result<Self, TiffError> {
        if offset >= reader.size() {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let count_bytes = reader.read_exact_at(offset, header.count_size()).await?;
        let count = if header.is_bigtiff {
            header.byte_order.read_u64(&count_bytes)
        } else {
            header.byte_order.read_u16(&count_bytes) as u64
        };
        if count > MAX_ENTRIES {
            return Err(TiffError::InvalidTagValue {
                tag: "IFD",
                message: format!("{} entries", count),
            });
        }

        let entry_size = header.entry_size();
        let body_len = count as usize * entry_size + header.offset_size();
        let body = reader
            .read_exact_at(offset + header.count_size() as u64, body_len)
            .await?;

        let order = header.byte_order;
        let value_start = if header.is_bigtiff { 12 } else { 8 };
        let entries = body
            .chunks_exact(entry_size)
            .take(count as usize)
            .map(|raw| IfdEntry {
                tag: order.read_u16(&raw[0..2]),
                field_type: order.read_u16(&raw[2..4]),
                count: if header.is_bigtiff {
                    order.read_u64(&raw[4..12])
                } else {
                    order.read_u32(&raw[4..8]) as u64
                },
                value: raw[value_start..].to_vec(),
            })
            .collect();

        let next_offset = header.read_offset(&body[count as usize * entry_size..]);

        Ok(Ifd {
            entries,
            next_offset,
        })
    }

    pub fn entry(&self, tag: u16) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }
}
