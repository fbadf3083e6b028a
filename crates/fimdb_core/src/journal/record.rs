//! Journal record types and their payload encoding.

use crate::error::{CoreError, CoreResult};
use crate::store::RowKey;
use crate::types::TxnHandle;

/// Magic bytes opening every journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"FIMJ";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// Envelope header: magic (4) + version (2) + type (1) + length (4).
pub(crate) const HEADER_SIZE: usize = 11;

/// Trailing CRC32.
pub(crate) const CRC_SIZE: usize = 4;

/// Type byte of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// A transaction was opened on a table.
    Begin = 1,
    /// A row was inserted or replaced.
    Upsert = 2,
    /// A row was removed.
    Delete = 3,
    /// A transaction was closed.
    Close = 4,
}

impl RecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Upsert),
            3 => Some(Self::Delete),
            4 => Some(Self::Close),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One entry of the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// A transaction was opened.
    Begin {
        /// Handle of the transaction.
        txn: TxnHandle,
        /// Table the transaction is bound to.
        table: String,
    },
    /// A row was inserted or replaced.
    Upsert {
        /// Table holding the row.
        table: String,
        /// Primary key.
        key: RowKey,
        /// Encoded attributes.
        payload: Vec<u8>,
    },
    /// A row was removed.
    Delete {
        /// Table holding the row.
        table: String,
        /// Primary key.
        key: RowKey,
    },
    /// A transaction was closed.
    Close {
        /// Handle of the transaction.
        txn: TxnHandle,
    },
}

impl JournalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Begin { .. } => RecordType::Begin,
            Self::Upsert { .. } => RecordType::Upsert,
            Self::Delete { .. } => RecordType::Delete,
            Self::Close { .. } => RecordType::Close,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns a codec error when a field does not fit its length prefix.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::Begin { txn, table } => {
                buf.extend_from_slice(&txn.as_u64().to_le_bytes());
                put_str(&mut buf, table)?;
            }
            Self::Upsert { table, key, payload } => {
                put_str(&mut buf, table)?;
                put_key(&mut buf, key)?;
                put_bytes(&mut buf, payload)?;
            }
            Self::Delete { table, key } => {
                put_str(&mut buf, table)?;
                put_key(&mut buf, key)?;
            }
            Self::Close { txn } => {
                buf.extend_from_slice(&txn.as_u64().to_le_bytes());
            }
        }
        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// # Errors
    ///
    /// Returns a journal corruption error for short, overlong or non-UTF-8
    /// payloads.
    pub fn decode_payload(record_type: RecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut cursor = Cursor { buf: payload, pos: 0 };
        let record = match record_type {
            RecordType::Begin => Self::Begin {
                txn: TxnHandle::new(cursor.u64()?),
                table: cursor.string()?,
            },
            RecordType::Upsert => Self::Upsert {
                table: cursor.string()?,
                key: cursor.key()?,
                payload: cursor.bytes()?.to_vec(),
            },
            RecordType::Delete => Self::Delete {
                table: cursor.string()?,
                key: cursor.key()?,
            },
            RecordType::Close => Self::Close {
                txn: TxnHandle::new(cursor.u64()?),
            },
        };
        if cursor.pos != payload.len() {
            return Err(CoreError::journal_corruption(format!(
                "trailing bytes in {record_type:?} record: used {} of {}",
                cursor.pos,
                payload.len()
            )));
        }
        Ok(record)
    }

    /// Encodes the full record: envelope, payload and CRC.
    ///
    /// # Errors
    ///
    /// Returns a codec error when the payload exceeds the 32-bit length field.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::codec("journal record payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&JOURNAL_MAGIC);
        data.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        data.push(self.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

fn put_len(buf: &mut Vec<u8>, len: usize) -> CoreResult<()> {
    let len = u32::try_from(len).map_err(|_| CoreError::codec("field too large"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> CoreResult<()> {
    put_len(buf, bytes.len())?;
    buf.extend_from_slice(bytes);
    Ok(())
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> CoreResult<()> {
    put_bytes(buf, s.as_bytes())
}

fn put_key(buf: &mut Vec<u8>, key: &RowKey) -> CoreResult<()> {
    let parts = u16::try_from(key.len())
        .map_err(|_| CoreError::codec("row key has too many components"))?;
    buf.extend_from_slice(&parts.to_le_bytes());
    for part in key.parts() {
        put_str(buf, part)?;
    }
    Ok(())
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| CoreError::journal_corruption("unexpected end of payload"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        self.take(N)?
            .try_into()
            .map_err(|_| CoreError::journal_corruption("short integer field"))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn bytes(&mut self) -> CoreResult<&'a [u8]> {
        let len = u32::from_le_bytes(self.array()?) as usize;
        self.take(len)
    }

    fn string(&mut self) -> CoreResult<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CoreError::journal_corruption("string field is not UTF-8"))
    }

    fn key(&mut self) -> CoreResult<RowKey> {
        let parts = u16::from_le_bytes(self.array()?);
        let parts = (0..parts)
            .map(|_| self.string())
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(RowKey::new(parts))
    }
}

/// Computes the CRC32 (IEEE) of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert() -> JournalRecord {
        JournalRecord::Upsert {
            table: "registry_key".into(),
            key: RowKey::new(["[x64]", "HKEY_LOCAL_MACHINE\\Software"]),
            payload: vec![0xA1, 0x00, 0xFF],
        }
    }

    #[test]
    fn every_record_type_decodes_back() {
        for record in [
            JournalRecord::Begin {
                txn: TxnHandle::new(7),
                table: "file_entry".into(),
            },
            upsert(),
            JournalRecord::Delete {
                table: "file_entry".into(),
                key: RowKey::new(["/etc/passwd"]),
            },
            JournalRecord::Close {
                txn: TxnHandle::new(7),
            },
        ] {
            let payload = record.encode_payload().unwrap();
            let decoded = JournalRecord::decode_payload(record.record_type(), &payload).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn unknown_type_byte() {
        assert_eq!(RecordType::from_byte(0), None);
        assert_eq!(RecordType::from_byte(5), None);
        assert_eq!(RecordType::from_byte(2), Some(RecordType::Upsert));
    }

    #[test]
    fn short_payload_is_corruption() {
        let payload = upsert().encode_payload().unwrap();
        let err = JournalRecord::decode_payload(RecordType::Upsert, &payload[..payload.len() - 1])
            .unwrap_err();
        assert!(matches!(err, CoreError::JournalCorruption { .. }));
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut payload = JournalRecord::Close {
            txn: TxnHandle::new(1),
        }
        .encode_payload()
        .unwrap();
        payload.push(0);
        assert!(JournalRecord::decode_payload(RecordType::Close, &payload).is_err());
    }

    #[test]
    fn envelope_layout() {
        let data = upsert().encode().unwrap();
        assert_eq!(&data[..4], b"FIMJ");
        assert_eq!(u16::from_le_bytes([data[4], data[5]]), JOURNAL_VERSION);
        assert_eq!(data[6], RecordType::Upsert.as_byte());
        let len = u32::from_le_bytes([data[7], data[8], data[9], data[10]]) as usize;
        assert_eq!(data.len(), HEADER_SIZE + len + CRC_SIZE);
        let crc_at = data.len() - CRC_SIZE;
        let stored = u32::from_le_bytes(data[crc_at..].try_into().unwrap());
        assert_eq!(stored, compute_crc32(&data[..crc_at]));
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
