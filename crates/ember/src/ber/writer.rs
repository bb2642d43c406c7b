use super::tag::Tag;

/// Definite-length BER encoder.
///
/// Constructed values are built into a scratch writer first so the length
/// prefix is known before the content is appended.
#[derive(Debug, Default)]
pub struct BerWriter {
    buf: Vec<u8>,
}

impl BerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_tlv(&mut self, tag: Tag, content: &[u8]) {
        self.write_tag(tag);
        self.write_length(content.len());
        self.buf.extend_from_slice(content);
    }

    pub fn sequence<F>(&mut self, tag: Tag, f: F)
    where
        F: FnOnce(&mut BerWriter),
    {
        let mut inner = BerWriter::new();
        f(&mut inner);
        let tag = Tag {
            constructed: true,
            ..tag
        };
        self.write_tlv(tag, &inner.buf);
    }

    /// Writes `f` wrapped in an explicit context tag.
    pub fn context<F>(&mut self, number: u32, f: F)
    where
        F: FnOnce(&mut BerWriter),
    {
        self.sequence(Tag::context(number), f);
    }

    pub fn write_integer(&mut self, value: i64) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < bytes.len() - 1 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        self.write_tlv(Tag::INTEGER, &bytes[start..]);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_tlv(Tag::BOOLEAN, &[if value { 0xFF } else { 0x00 }]);
    }

    pub fn write_utf8(&mut self, value: &str) {
        self.write_tlv(Tag::UTF8_STRING, value.as_bytes());
    }

    pub fn write_octets(&mut self, value: &[u8]) {
        self.write_tlv(Tag::OCTET_STRING, value);
    }

    pub fn write_null(&mut self) {
        self.write_tlv(Tag::NULL, &[]);
    }

    pub fn write_relative_oid(&mut self, components: &[u32]) {
        let mut content = Vec::with_capacity(components.len() * 2);
        for &component in components {
            encode_base128(component, &mut content);
        }
        self.write_tlv(Tag::RELATIVE_OID, &content);
    }

    pub fn write_real(&mut self, value: f64) {
        self.write_tlv(Tag::REAL, &encode_real(value));
    }

    fn write_tag(&mut self, tag: Tag) {
        let mut first = tag.class.bits();
        if tag.constructed {
            first |= 0x20;
        }
        if tag.number < 0x1F {
            self.buf.push(first | tag.number as u8);
        } else {
            self.buf.push(first | 0x1F);
            encode_base128(tag.number, &mut self.buf);
        }
    }

    fn write_length(&mut self, len: usize) {
        if len < 0x80 {
            self.buf.push(len as u8);
            return;
        }
        let bytes = (len as u64).to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        self.buf.push(0x80 | (bytes.len() - skip) as u8);
        self.buf.extend_from_slice(&bytes[skip..]);
    }
}

fn encode_base128(value: u32, out: &mut Vec<u8>) {
    let mut groups = [0u8; 5];
    let mut count = 0;
    let mut remaining = value;
    loop {
        groups[count] = (remaining & 0x7F) as u8;
        count += 1;
        remaining >>= 7;
        if remaining == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        let continuation = if i > 0 { 0x80 } else { 0x00 };
        out.push(groups[i] | continuation);
    }
}

/// X.690 binary encoding, base 2, scale factor 0.
fn encode_real(value: f64) -> Vec<u8> {
    if value.is_nan() {
        return vec![0x42];
    }
    if value.is_infinite() {
        return vec![if value > 0.0 { 0x40 } else { 0x41 }];
    }
    if value == 0.0 {
        return if value.is_sign_negative() {
            vec![0x43]
        } else {
            Vec::new()
        };
    }

    let bits = value.to_bits();
    let negative = bits >> 63 != 0;
    let biased = ((bits >> 52) & 0x7FF) as i64;
    let fraction = bits & 0x000F_FFFF_FFFF_FFFF;

    let (mut mantissa, mut exponent) = if biased == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1 << 52), biased - 1075)
    };
    while mantissa & 1 == 0 {
        mantissa >>= 1;
        exponent += 1;
    }

    let exp_bytes = exponent.to_be_bytes();
    let mut exp_start = 0;
    while exp_start < exp_bytes.len() - 1 {
        let redundant = (exp_bytes[exp_start] == 0x00 && exp_bytes[exp_start + 1] & 0x80 == 0)
            || (exp_bytes[exp_start] == 0xFF && exp_bytes[exp_start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        exp_start += 1;
    }
    let exp_bytes = &exp_bytes[exp_start..];

    let mant_bytes = mantissa.to_be_bytes();
    let mant_start = mant_bytes.iter().take_while(|&&b| b == 0).count();

    let mut out = Vec::with_capacity(1 + exp_bytes.len() + 8);
    let mut first = 0x80u8;
    if negative {
        first |= 0x40;
    }
    first |= (exp_bytes.len() - 1) as u8;
    out.push(first);
    out.extend_from_slice(exp_bytes);
    out.extend_from_slice(&mant_bytes[mant_start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<F: FnOnce(&mut BerWriter)>(f: F) -> Vec<u8> {
        let mut writer = BerWriter::new();
        f(&mut writer);
        writer.into_bytes()
    }

    #[test]
    fn test_integer_minimal_encoding() {
        assert_eq!(encoded(|w| w.write_integer(0)), vec![0x02, 0x01, 0x00]);
        assert_eq!(encoded(|w| w.write_integer(127)), vec![0x02, 0x01, 0x7F]);
        assert_eq!(encoded(|w| w.write_integer(128)), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(encoded(|w| w.write_integer(-1)), vec![0x02, 0x01, 0xFF]);
        assert_eq!(encoded(|w| w.write_integer(-129)), vec![0x02, 0x02, 0xFF, 0x7F]);
    }

    #[test]
    fn test_relative_oid_encoding() {
        assert_eq!(
            encoded(|w| w.write_relative_oid(&[1, 2, 200])),
            vec![0x0D, 0x04, 0x01, 0x02, 0x81, 0x48]
        );
    }

    #[test]
    fn test_long_length_form() {
        let bytes = encoded(|w| w.write_octets(&[0u8; 200]));
        assert_eq!(&bytes[..3], &[0x04, 0x81, 200]);
        assert_eq!(bytes.len(), 203);
    }

    #[test]
    fn test_high_tag_number() {
        let bytes = encoded(|w| w.sequence(Tag::application(40), |_| {}));
        assert_eq!(bytes, vec![0x7F, 0x28, 0x00]);
    }

    #[test]
    fn test_real_special_values() {
        assert_eq!(encode_real(0.0), Vec::<u8>::new());
        assert_eq!(encode_real(f64::INFINITY), vec![0x40]);
        assert_eq!(encode_real(f64::NEG_INFINITY), vec![0x41]);
        assert_eq!(encode_real(1.0), vec![0x80, 0x00, 0x01]);
        assert_eq!(encode_real(-0.5), vec![0xC0, 0xFF, 0x01]);
    }
}
