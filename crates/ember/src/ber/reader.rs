use super::{DecodeError, MAX_NESTING};
use super::tag::{Tag, TagClass};

/// Cursor over a BER byte slice.
///
/// Each `read_*` call consumes one complete TLV. Constructed values are
/// returned as a nested reader positioned over their content.
#[derive(Debug, Clone)]
pub struct BerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_tag(&self) -> Result<Tag, DecodeError> {
        let (tag, _) = parse_tag(self.data, self.pos)?;
        Ok(tag)
    }

    /// Reads the next TLV and returns its tag and content bytes.
    pub fn read_tlv(&mut self) -> Result<(Tag, &'a [u8]), DecodeError> {
        let (tag, after_tag) = parse_tag(self.data, self.pos)?;
        let (length, after_len) = parse_length(self.data, after_tag)?;
        match length {
            Some(len) => {
                let end = after_len.checked_add(len).ok_or(DecodeError::InvalidLength)?;
                if end > self.data.len() {
                    return Err(DecodeError::UnexpectedEof);
                }
                self.pos = end;
                Ok((tag, &self.data[after_len..end]))
            }
            None => {
                if !tag.constructed {
                    return Err(DecodeError::InvalidLength);
                }
                let content_end = find_end_of_contents(self.data, after_len)?;
                self.pos = content_end + 2;
                Ok((tag, &self.data[after_len..content_end]))
            }
        }
    }

    /// Reads any constructed TLV and returns a reader over its content.
    pub fn read_constructed(&mut self) -> Result<(Tag, BerReader<'a>), DecodeError> {
        let (tag, content) = self.read_tlv()?;
        Ok((tag, BerReader::new(content)))
    }

    /// Reads a TLV that must carry `expected` and returns its content.
    pub fn read_sequence(&mut self, expected: Tag) -> Result<BerReader<'a>, DecodeError> {
        let (tag, content) = self.read_tlv()?;
        if !tag.matches(expected) {
            return Err(DecodeError::UnexpectedTag {
                expected,
                found: tag,
            });
        }
        Ok(BerReader::new(content))
    }

    fn read_primitive(&mut self, expected: Tag) -> Result<&'a [u8], DecodeError> {
        let (tag, content) = self.read_tlv()?;
        if !tag.matches(expected) {
            return Err(DecodeError::UnexpectedTag {
                expected,
                found: tag,
            });
        }
        Ok(content)
    }

    pub fn read_integer(&mut self) -> Result<i64, DecodeError> {
        let content = self.read_primitive(Tag::INTEGER)?;
        decode_integer(content)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let value = self.read_integer()?;
        u32::try_from(value).map_err(|_| DecodeError::InvalidValue("unsigned integer"))
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        let content = self.read_primitive(Tag::BOOLEAN)?;
        match content {
            [byte] => Ok(*byte != 0),
            _ => Err(DecodeError::InvalidValue("boolean")),
        }
    }

    pub fn read_utf8(&mut self) -> Result<String, DecodeError> {
        let content = self.read_primitive(Tag::UTF8_STRING)?;
        decode_utf8(content)
    }

    pub fn read_octets(&mut self) -> Result<Vec<u8>, DecodeError> {
        Ok(self.read_primitive(Tag::OCTET_STRING)?.to_vec())
    }

    pub fn read_null(&mut self) -> Result<(), DecodeError> {
        let content = self.read_primitive(Tag::NULL)?;
        if !content.is_empty() {
            return Err(DecodeError::InvalidValue("null"));
        }
        Ok(())
    }

    pub fn read_real(&mut self) -> Result<f64, DecodeError> {
        let content = self.read_primitive(Tag::REAL)?;
        decode_real(content)
    }

    pub fn read_relative_oid(&mut self) -> Result<Vec<u32>, DecodeError> {
        let content = self.read_primitive(Tag::RELATIVE_OID)?;
        decode_relative_oid(content)
    }
}

fn parse_tag(data: &[u8], pos: usize) -> Result<(Tag, usize), DecodeError> {
    let first = *data.get(pos).ok_or(DecodeError::UnexpectedEof)?;
    let class = TagClass::from_bits(first);
    let constructed = first & 0x20 != 0;
    let low = u32::from(first & 0x1F);
    if low != 0x1F {
        return Ok((
            Tag {
                class,
                constructed,
                number: low,
            },
            pos + 1,
        ));
    }

    let mut number: u32 = 0;
    let mut cursor = pos + 1;
    loop {
        let byte = *data.get(cursor).ok_or(DecodeError::UnexpectedEof)?;
        cursor += 1;
        number = number
            .checked_mul(128)
            .and_then(|n| n.checked_add(u32::from(byte & 0x7F)))
            .ok_or(DecodeError::InvalidValue("tag number"))?;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok((
        Tag {
            class,
            constructed,
            number,
        },
        cursor,
    ))
}

/// Returns `None` for the indefinite form.
fn parse_length(data: &[u8], pos: usize) -> Result<(Option<usize>, usize), DecodeError> {
    let first = *data.get(pos).ok_or(DecodeError::UnexpectedEof)?;
    if first < 0x80 {
        return Ok((Some(first as usize), pos + 1));
    }
    if first == 0x80 {
        return Ok((None, pos + 1));
    }
    let count = (first & 0x7F) as usize;
    if count > 4 {
        return Err(DecodeError::InvalidLength);
    }
    let bytes = data
        .get(pos + 1..pos + 1 + count)
        .ok_or(DecodeError::UnexpectedEof)?;
    let len = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok((Some(len), pos + 1 + count))
}

/// Scans nested TLVs starting at `pos` and returns the offset of the
/// end-of-contents marker that closes the value opened before `pos`.
fn find_end_of_contents(data: &[u8], mut pos: usize) -> Result<usize, DecodeError> {
    // Open indefinite-length values below the starting one.
    let mut depth = 0usize;
    loop {
        match data.get(pos..pos + 2) {
            Some([0x00, 0x00]) if depth == 0 => return Ok(pos),
            Some([0x00, 0x00]) => {
                depth -= 1;
                pos += 2;
                continue;
            }
            Some(_) => {}
            None => return Err(DecodeError::UnexpectedEof),
        }
        let (tag, after_tag) = parse_tag(data, pos)?;
        let (length, after_len) = parse_length(data, after_tag)?;
        pos = match length {
            Some(len) => {
                let end = after_len.checked_add(len).ok_or(DecodeError::InvalidLength)?;
                if end > data.len() {
                    return Err(DecodeError::UnexpectedEof);
                }
                end
            }
            None if tag.constructed => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(DecodeError::TooDeep(MAX_NESTING));
                }
                after_len
            }
            None => return Err(DecodeError::InvalidLength),
        };
    }
}

fn decode_integer(content: &[u8]) -> Result<i64, DecodeError> {
    if content.is_empty() || content.len() > 8 {
        return Err(DecodeError::InvalidValue("integer"));
    }
    let fill = if content[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut bytes = [fill; 8];
    bytes[8 - content.len()..].copy_from_slice(content);
    Ok(i64::from_be_bytes(bytes))
}

fn decode_utf8(content: &[u8]) -> Result<String, DecodeError> {
    String::from_utf8(content.to_vec()).map_err(|_| DecodeError::InvalidValue("utf8 string"))
}

fn decode_relative_oid(content: &[u8]) -> Result<Vec<u32>, DecodeError> {
    let mut components = Vec::new();
    let mut current: u32 = 0;
    let mut pending = false;
    for &byte in content {
        current = current
            .checked_mul(128)
            .and_then(|n| n.checked_add(u32::from(byte & 0x7F)))
            .ok_or(DecodeError::InvalidValue("relative oid"))?;
        pending = byte & 0x80 != 0;
        if !pending {
            components.push(current);
            current = 0;
        }
    }
    if pending {
        return Err(DecodeError::InvalidValue("relative oid"));
    }
    Ok(components)
}

fn decode_real(content: &[u8]) -> Result<f64, DecodeError> {
    let Some((&first, rest)) = content.split_first() else {
        return Ok(0.0);
    };

    if first & 0x80 == 0 {
        return match first {
            0x40 => Ok(f64::INFINITY),
            0x41 => Ok(f64::NEG_INFINITY),
            0x42 => Ok(f64::NAN),
            0x43 => Ok(-0.0),
            // ISO 6093 decimal forms
            0x01..=0x03 => decode_utf8(rest)?
                .trim()
                .replace(',', ".")
                .parse::<f64>()
                .map_err(|_| DecodeError::InvalidValue("decimal real")),
            _ => Err(DecodeError::InvalidValue("real")),
        };
    }

    let negative = first & 0x40 != 0;
    let base_shift = match (first >> 4) & 0x03 {
        0 => 1,
        1 => 3,
        2 => 4,
        _ => return Err(DecodeError::InvalidValue("real base")),
    };
    let scale = i32::from((first >> 2) & 0x03);

    let (exp_len, rest) = match first & 0x03 {
        3 => {
            let (&len, rest) = rest.split_first().ok_or(DecodeError::UnexpectedEof)?;
            (len as usize, rest)
        }
        n => (n as usize + 1, rest),
    };
    if exp_len == 0 || exp_len > 4 || rest.len() < exp_len {
        return Err(DecodeError::InvalidValue("real exponent"));
    }
    let exponent = decode_integer(&rest[..exp_len])?;
    let mantissa_bytes = &rest[exp_len..];
    if mantissa_bytes.len() > 8 {
        return Err(DecodeError::InvalidValue("real mantissa"));
    }
    let mantissa = mantissa_bytes
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));

    let power = exponent
        .checked_mul(base_shift)
        .and_then(|e| e.checked_add(i64::from(scale)))
        .ok_or(DecodeError::InvalidValue("real exponent"))?;
    let magnitude = scale_by_power_of_two(mantissa as f64, power);
    Ok(if negative { -magnitude } else { magnitude })
}

fn scale_by_power_of_two(mut value: f64, mut power: i64) -> f64 {
    let step = 2f64.powi(1000);
    let inverse_step = 2f64.powi(-1000);
    while power > 1000 {
        value *= step;
        power -= 1000;
        if value.is_infinite() {
            return value;
        }
    }
    while power < -1000 {
        value *= inverse_step;
        power += 1000;
        if value == 0.0 {
            return value;
        }
    }
    value * 2f64.powi(power as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::BerWriter;

    #[test]
    fn test_nested_indefinite_lengths() {
        // [0] { [1] { INTEGER 5 } [2] {} } followed by NULL
        let data = [
            0xA0, 0x80, 0xA1, 0x80, 0x02, 0x01, 0x05, 0x00, 0x00, 0xA2, 0x80, 0x00, 0x00, 0x00,
            0x00, 0x05, 0x00,
        ];
        let mut reader = BerReader::new(&data);
        let (tag, mut inner) = reader.read_constructed().unwrap();
        assert_eq!(tag, Tag::context(0));
        let mut first = inner.read_sequence(Tag::context(1)).unwrap();
        assert_eq!(first.read_integer().unwrap(), 5);
        assert!(inner.read_sequence(Tag::context(2)).unwrap().is_empty());
        assert!(inner.is_empty());
        reader.read_null().unwrap();
        assert!(reader.is_empty());
    }

    #[test]
    fn test_deep_indefinite_nesting_is_rejected() {
        let levels = 200_000;
        let mut data = vec![0x60, 0x80];
        for _ in 0..levels {
            data.extend_from_slice(&[0xA0, 0x80]);
        }
        data.resize(data.len() + 2 * (levels + 1), 0x00);

        let result = BerReader::new(&data).read_tlv();
        assert_eq!(result, Err(DecodeError::TooDeep(MAX_NESTING)));

        let mut data = vec![0x60, 0x80];
        for _ in 0..MAX_NESTING {
            data.extend_from_slice(&[0xA0, 0x80]);
        }
        data.resize(data.len() + 2 * (MAX_NESTING + 1), 0x00);
        let mut reader = BerReader::new(&data);
        assert!(reader.read_tlv().is_ok());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_integer_round_trip() {
        for value in [0i64, 1, -1, 127, 128, -128, -129, 65535, i64::MAX, i64::MIN] {
            let mut writer = BerWriter::new();
            writer.write_integer(value);
            let bytes = writer.into_bytes();
            assert_eq!(BerReader::new(&bytes).read_integer().unwrap(), value);
        }
    }

    #[test]
    fn test_real_values() {
        for value in [1.0, -0.5, 3.25, 1e-300, 6.02e23, f64::MIN_POSITIVE, 5e-324, -1234.5678] {
            let mut writer = BerWriter::new();
            writer.write_real(value);
            let bytes = writer.into_bytes();
            assert_eq!(BerReader::new(&bytes).read_real().unwrap(), value);
        }
        assert_eq!(decode_real(&[]).unwrap(), 0.0);
        assert!(decode_real(&[0x42]).unwrap().is_nan());
    }

    #[test]
    fn test_decimal_real() {
        let mut content = vec![0x03];
        content.extend_from_slice(b"12.5E0");
        assert_eq!(decode_real(&content).unwrap(), 12.5);
    }

    #[test]
    fn test_indefinite_length() {
        // CONTEXT(0) indefinite { INTEGER 5, SEQUENCE indefinite { NULL } }
        let bytes = [
            0xA0, 0x80, 0x02, 0x01, 0x05, 0x30, 0x80, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut reader = BerReader::new(&bytes);
        let mut inner = reader.read_sequence(Tag::context(0)).unwrap();
        assert!(reader.is_empty());
        assert_eq!(inner.read_integer().unwrap(), 5);
        let mut seq = inner.read_sequence(Tag::SEQUENCE).unwrap();
        seq.read_null().unwrap();
        assert!(inner.is_empty());
    }

    #[test]
    fn test_truncated_input() {
        let bytes = [0x02, 0x04, 0x01];
        assert_eq!(
            BerReader::new(&bytes).read_integer(),
            Err(DecodeError::UnexpectedEof)
        );
    }

    #[test]
    fn test_unexpected_tag() {
        let bytes = [0x01, 0x01, 0xFF];
        assert!(matches!(
            BerReader::new(&bytes).read_integer(),
            Err(DecodeError::UnexpectedTag { .. })
        ));
    }

    #[test]
    fn test_relative_oid_round_trip() {
        let mut writer = BerWriter::new();
        writer.write_relative_oid(&[0, 1, 300, 70000]);
        let bytes = writer.into_bytes();
        assert_eq!(
            BerReader::new(&bytes).read_relative_oid().unwrap(),
            vec![0, 1, 300, 70000]
        );
    }
}
