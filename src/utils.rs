use crate::error::{Error, Result};

pub fn read_u8(data: &[u8], pos: &mut usize) -> Result<u8> {
    if *pos >= data.len() {
        return Err(Error::ParseError("Unexpected end of data while reading u8".to_string()));
    }

    let value = data[*pos];
    *pos += 1;
    Ok(value)
}

pub fn read_u16(data: &[u8], pos: &mut usize) -> Result<u16> {
    if *pos + 2 > data.len() {
        return Err(Error::ParseError("Unexpected end of data while reading u16".to_string()));
    }

    let value = u16::from_be_bytes([data[*pos], data[*pos + 1]]);
    *pos += 2;
    Ok(value)
}

pub fn read_bytes<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    if *pos + len > data.len() {
        return Err(Error::ParseError(format!(
            "Unexpected end of data while reading {} bytes", len
        )));
    }

    let bytes = &data[*pos..*pos + len];
    *pos += len;
    Ok(bytes)
}

pub fn validate_length(data: &[u8], expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(Error::ParseError(format!(
            "Invalid length: expected {}, got {}",
            expected,
            data.len()
        )));
    }
    Ok(())
}

pub fn write_u8(vec: &mut Vec<u8>, value: u8) {
    vec.push(value);
}

pub fn write_u16(vec: &mut Vec<u8>, value: u16) {
    vec.extend_from_slice(&value.to_be_bytes());
}

pub fn write_u64(vec: &mut Vec<u8>, value: u64) {
    vec.extend_from_slice(&value.to_be_bytes());
}

// Two-byte length field; records never come near the limit
pub fn write_length_u16(vec: &mut Vec<u8>, len: usize) -> Result<()> {
    let value = u16::try_from(len).map_err(|_| {
        Error::InternalError(format!("Length {} does not fit a u16 field", len))
    })?;
    write_u16(vec, value);
    Ok(())
}
