//! Raw code to physical unit conversion.

/// One sample as read from a device, before unit conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSample {
    /// Signed register codes, one per axis.
    Codes(Vec<i16>),
    /// Values already parsed from a text line, one per field.
    Values(Vec<f64>),
}

impl RawSample {
    pub fn len(&self) -> usize {
        match self {
            RawSample::Codes(codes) => codes.len(),
            RawSample::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reinterpret a 16-bit register word as two's complement.
pub fn to_signed(raw: u16) -> i16 {
    raw as i16
}

/// Group bytes into little-endian words, one per axis, and sign them.
///
/// Trailing bytes beyond `axes` words are ignored; a short buffer yields
/// fewer values.
pub fn decode_le_axes(bytes: &[u8], axes: usize) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .take(axes)
        .map(|pair| to_signed(u16::from_le_bytes([pair[0], pair[1]])))
        .collect()
}

/// Scale a raw code or parsed field into physical units.
pub fn convert(raw: impl Into<f64>, sensitivity: f64) -> f64 {
    raw.into() * sensitivity
}

/// Convert every axis or field of a sample with the device's sensitivity.
pub fn convert_sample(sample: &RawSample, sensitivity: f64) -> Vec<f64> {
    match sample {
        RawSample::Codes(codes) => codes
            .iter()
            .map(|&code| convert(code, sensitivity))
            .collect(),
        RawSample::Values(values) => values
            .iter()
            .map(|&value| convert(value, sensitivity))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_signed_boundaries() {
        assert_eq!(to_signed(0x0000), 0);
        assert_eq!(to_signed(0x7FFF), 32767);
        assert_eq!(to_signed(0x8000), -32768);
        assert_eq!(to_signed(0xFFFF), -1);
    }

    #[test]
    fn test_to_signed_matches_subtraction_rule() {
        for raw in (0..=u16::MAX).step_by(97).chain([32767, 32768, 65535]) {
            let expected = if raw < 32768 {
                i32::from(raw)
            } else {
                i32::from(raw) - 65536
            };
            assert_eq!(i32::from(to_signed(raw)), expected, "raw = {raw:#06x}");
        }
    }

    #[test]
    fn test_signed_value_survives_reencoding() {
        for value in [i16::MIN, -1234, -1, 0, 1, 4321, i16::MAX] {
            assert_eq!(to_signed(value as u16), value);
        }
    }

    #[test]
    fn test_decode_le_axes() {
        let bytes = [0x10, 0x00, 0x20, 0x00, 0x30, 0x00];
        assert_eq!(decode_le_axes(&bytes, 3), vec![16, 32, 48]);

        let bytes = [0xFF, 0xFF, 0x00, 0x80, 0x01, 0x02];
        assert_eq!(decode_le_axes(&bytes, 3), vec![-1, -32768, 0x0201]);
    }

    #[test]
    fn test_decode_short_buffer() {
        assert_eq!(decode_le_axes(&[0x01, 0x00, 0x02], 3), vec![1]);
    }

    #[test]
    fn test_convert_is_linear() {
        let s = 0.061;
        assert_eq!(convert(0, s), 0.0);
        for raw in [-300, -1, 1, 7, 1000] {
            for k in [-3, 2, 5] {
                let lhs = convert(k * raw, s);
                let rhs = f64::from(k) * convert(raw, s);
                assert!((lhs - rhs).abs() < 1e-9, "raw={raw} k={k}");
            }
        }
    }

    #[test]
    fn test_convert_sample() {
        let codes = RawSample::Codes(vec![16, -1]);
        assert_eq!(convert_sample(&codes, 1.5), vec![24.0, -1.5]);

        let values = RawSample::Values(vec![24.5, 55.1]);
        assert_eq!(convert_sample(&values, 1.0), vec![24.5, 55.1]);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_codes_and_values_scale_alike() {
        let codes = convert_sample(&RawSample::Codes(vec![-4, 0, 12]), 0.5);
        let values = convert_sample(&RawSample::Values(vec![-4.0, 0.0, 12.0]), 0.5);
        assert_eq!(codes, values);
        assert_eq!(values, vec![-2.0, 0.0, 6.0]);
        assert_eq!(convert(2.5, 2.0), 5.0);
    }
}
