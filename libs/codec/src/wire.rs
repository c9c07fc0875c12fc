//! Schema-registry wire framing.
//!
//! `[magic_byte(1)][schema_id(4, big-endian)][payload]`. Protobuf payloads
//! additionally start with the message-index path (zig-zag varints).

use logscope_api::CodecError;

/// Magic byte indicating schema ID is present
pub const MAGIC_BYTE: u8 = 0x00;

const HEADER_LEN: usize = 5;

/// Split `data` into (schema_id, payload).
pub fn split_schema_header(data: &[u8]) -> Result<(i32, &[u8]), CodecError> {
    if data.len() < HEADER_LEN {
        return Err(CodecError::malformed(format!(
            "payload of {} bytes is too short for a schema header",
            data.len()
        )));
    }
    if data[0] != MAGIC_BYTE {
        return Err(CodecError::malformed(format!(
            "invalid magic byte: expected 0x00, got 0x{:02x}",
            data[0]
        )));
    }
    let id = i32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    Ok((id, &data[HEADER_LEN..]))
}

pub fn write_schema_header(schema_id: i32, buf: &mut Vec<u8>) {
    buf.push(MAGIC_BYTE);
    buf.extend_from_slice(&schema_id.to_be_bytes());
}

/// Прочитать message-index path. Одиночный `0` означает `[0]`.
pub fn read_message_indexes(mut data: &[u8]) -> Result<(Vec<i32>, &[u8]), CodecError> {
    let count = read_zigzag(&mut data)?;
    if count == 0 {
        return Ok((vec![0], data));
    }
    if count < 0 || count as usize > data.len() {
        return Err(CodecError::malformed(format!("invalid message index count {count}")));
    }
    let mut indexes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        indexes.push(read_zigzag(&mut data)?);
    }
    Ok((indexes, data))
}

pub fn write_message_indexes(indexes: &[i32], buf: &mut Vec<u8>) {
    if indexes == [0] {
        buf.push(0);
        return;
    }
    write_zigzag(indexes.len() as i32, buf);
    for &index in indexes {
        write_zigzag(index, buf);
    }
}

fn read_zigzag(data: &mut &[u8]) -> Result<i32, CodecError> {
    let raw = prost::encoding::decode_varint(data)
        .map_err(|e| CodecError::malformed(format!("message index varint: {e}")))?;
    let raw = raw as u32;
    Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
}

fn write_zigzag(value: i32, buf: &mut Vec<u8>) {
    let encoded = ((value << 1) ^ (value >> 31)) as u32;
    prost::encoding::encode_varint(u64::from(encoded), buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut buf = Vec::new();
        write_schema_header(123, &mut buf);
        buf.extend_from_slice(b"hello");
        assert_eq!(buf[0], MAGIC_BYTE);

        let (id, payload) = split_schema_header(&buf).unwrap();
        assert_eq!(id, 123);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn rejects_bad_magic_and_short_input() {
        assert!(split_schema_header(&[0xFF, 0, 0, 0, 1, 0x42]).is_err());
        assert!(split_schema_header(&[0x00, 0x01]).is_err());
    }

    #[test]
    fn single_zero_means_first_message() {
        let (indexes, rest) = read_message_indexes(&[0, 0x0a]).unwrap();
        assert_eq!(indexes, vec![0]);
        assert_eq!(rest, &[0x0a]);
    }

    #[test]
    fn nested_index_path() {
        let mut buf = Vec::new();
        write_message_indexes(&[1, 2], &mut buf);
        // count 2 -> 4, 1 -> 2, 2 -> 4 after zig-zag
        assert_eq!(buf, vec![4, 2, 4]);
        buf.push(0x99);
        let (indexes, rest) = read_message_indexes(&buf).unwrap();
        assert_eq!(indexes, vec![1, 2]);
        assert_eq!(rest, &[0x99]);
    }
}
