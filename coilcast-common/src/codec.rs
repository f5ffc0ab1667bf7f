//! Bit-level encoding of IEEE-754 floats into coil arrays.
//!
//! A float is carried as its raw bit pattern, most-significant bit first:
//! coil `0` of a region holds the sign bit. Encoding and decoding are exact
//! reinterpretations, so every pattern (NaN payloads included) survives a
//! round trip unchanged.

/// Number of coils carrying an `f64`.
pub const F64_BITS: usize = 64;

/// Number of coils carrying an `f32`.
pub const F32_BITS: usize = 32;

/// Encode an `f64` as 64 coils, MSB first.
pub fn encode_f64(value: f64) -> [bool; F64_BITS] {
    unpack(value.to_bits())
}

/// Decode 64 coils (MSB first) into an `f64`.
pub fn decode_f64(bits: &[bool; F64_BITS]) -> f64 {
    f64::from_bits(pack(bits))
}

/// Encode an `f32` as 32 coils, MSB first.
pub fn encode_f32(value: f32) -> [bool; F32_BITS] {
    unpack(u64::from(value.to_bits()))
}

/// Decode 32 coils (MSB first) into an `f32`.
pub fn decode_f32(bits: &[bool; F32_BITS]) -> f32 {
    // At most 32 bits were accumulated.
    f32::from_bits(pack(bits) as u32)
}

fn unpack<const N: usize>(raw: u64) -> [bool; N] {
    std::array::from_fn(|i| (raw >> (N - 1 - i)) & 1 == 1)
}

fn pack<const N: usize>(bits: &[bool; N]) -> u64 {
    bits.iter().fold(0, |acc, &bit| (acc << 1) | u64::from(bit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_encode_f64_msb_first() {
        // 1.0 = 0x3FF0_0000_0000_0000
        let bits = encode_f64(1.0);
        assert!(!bits[0]);
        assert!(bits[2..12].iter().all(|&b| b));
        assert!(!bits[1]);
        assert!(bits[12..].iter().all(|&b| !b));
    }

    #[test]
    fn test_encode_f32_sign_bit() {
        let bits = encode_f32(-0.0);
        assert!(bits[0]);
        assert!(bits[1..].iter().all(|&b| !b));
    }

    #[test]
    fn test_widths() {
        assert_eq!(encode_f64(123.456).len(), 64);
        assert_eq!(encode_f32(123.456).len(), 32);
    }

    #[test]
    fn test_f64_edge_values() {
        let values = [
            0.0,
            -0.0,
            f64::MAX,
            f64::MIN,
            f64::MIN_POSITIVE,
            f64::from_bits(1),
            f64::INFINITY,
            f64::NEG_INFINITY,
            1_700_000_000.5,
        ];

        for value in values {
            let decoded = decode_f64(&encode_f64(value));
            assert_eq!(decoded.to_bits(), value.to_bits(), "value {value:e}");
        }
    }

    #[test]
    fn test_f32_edge_values() {
        let values = [
            0.0f32,
            -0.0,
            f32::MAX,
            f32::MIN,
            f32::MIN_POSITIVE,
            f32::from_bits(1),
            -1.0,
            0.5,
        ];

        for value in values {
            let decoded = decode_f32(&encode_f32(value));
            assert_eq!(decoded.to_bits(), value.to_bits(), "value {value:e}");
        }
    }

    #[test]
    fn test_nan_payload_preserved() {
        let nan64 = f64::from_bits(0x7FF8_0000_DEAD_BEEF);
        assert_eq!(decode_f64(&encode_f64(nan64)).to_bits(), nan64.to_bits());

        let nan32 = f32::from_bits(0xFFC0_1234);
        assert_eq!(decode_f32(&encode_f32(nan32)).to_bits(), nan32.to_bits());
    }

    #[test]
    fn test_random_round_trip() {
        let mut rng = rand::rng();

        for _ in 0..2000 {
            let x = f64::from_bits(rng.random::<u64>());
            assert_eq!(decode_f64(&encode_f64(x)).to_bits(), x.to_bits());

            let y = f32::from_bits(rng.random::<u32>());
            assert_eq!(decode_f32(&encode_f32(y)).to_bits(), y.to_bits());
        }

        for _ in 0..1000 {
            let x: f64 = rng.random_range(-1e12..1e12);
            assert_eq!(decode_f64(&encode_f64(x)), x);

            let y: f32 = rng.random_range(-1.0..1.0);
            assert_eq!(decode_f32(&encode_f32(y)), y);
        }
    }
}
