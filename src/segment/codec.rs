//! Byte-level encoding helpers shared by the segment file formats

use std::io;

use roaring::RoaringBitmap;

/// Variable-byte encode a u32 (high bit marks the last byte)
pub fn encode_vbyte(value: u32, output: &mut Vec<u8>) {
    encode_vbyte_u64(value as u64, output)
}

/// Decode a variable-byte encoded u32
pub fn decode_vbyte(input: &[u8], pos: &mut usize) -> io::Result<u32> {
    let value = decode_vbyte_u64(input, pos)?;
    u32::try_from(value)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "VByte value too large"))
}

/// Variable-byte encode a u64
pub fn encode_vbyte_u64(value: u64, output: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            output.push(byte | 0x80);
            break;
        } else {
            output.push(byte);
        }
    }
}

/// Decode a variable-byte encoded u64
pub fn decode_vbyte_u64(input: &[u8], pos: &mut usize) -> io::Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    loop {
        let byte = *input.get(*pos).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "Unexpected end of vbyte")
        })?;
        *pos += 1;

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 != 0 {
            return Ok(result);
        }

        shift += 7;
        if shift > 63 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "VByte value too large",
            ));
        }
    }
}

/// Write a length-prefixed byte slice
pub fn write_bytes(bytes: &[u8], output: &mut Vec<u8>) {
    encode_vbyte(bytes.len() as u32, output);
    output.extend_from_slice(bytes);
}

/// Read a length-prefixed byte slice
pub fn read_bytes<'a>(input: &'a [u8], pos: &mut usize) -> io::Result<&'a [u8]> {
    let len = decode_vbyte(input, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= input.len())
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "Truncated byte block"))?;
    let bytes = &input[*pos..end];
    *pos = end;
    Ok(bytes)
}

/// Read a length-prefixed UTF-8 string
pub fn read_string(input: &[u8], pos: &mut usize) -> io::Result<String> {
    let bytes = read_bytes(input, pos)?;
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Read a single byte
pub fn read_u8(input: &[u8], pos: &mut usize) -> io::Result<u8> {
    let byte = *input
        .get(*pos)
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "Unexpected end of data"))?;
    *pos += 1;
    Ok(byte)
}

/// Write a fixed-width little-endian i64
pub fn write_i64(value: i64, output: &mut Vec<u8>) {
    output.extend_from_slice(&value.to_le_bytes());
}

/// Read a fixed-width little-endian i64
pub fn read_i64(input: &[u8], pos: &mut usize) -> io::Result<i64> {
    let end = *pos + 8;
    let bytes: [u8; 8] = input
        .get(*pos..end)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "Truncated i64"))?;
    *pos = end;
    Ok(i64::from_le_bytes(bytes))
}

/// Write a length-prefixed roaring bitmap
pub fn write_bitmap(bitmap: &RoaringBitmap, output: &mut Vec<u8>) -> io::Result<()> {
    let mut bytes = Vec::with_capacity(bitmap.serialized_size());
    bitmap.serialize_into(&mut bytes)?;
    write_bytes(&bytes, output);
    Ok(())
}

/// Read a length-prefixed roaring bitmap
pub fn read_bitmap(input: &[u8], pos: &mut usize) -> io::Result<RoaringBitmap> {
    let bytes = read_bytes(input, pos)?;
    RoaringBitmap::deserialize_from(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
