//! G.711 µ-law (PCMU) sample conversion

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

pub fn encode_sample(sample: i16) -> u8 {
    let mut value = sample as i32;
    let sign = if value < 0 {
        value = -value;
        0x80
    } else {
        0
    };

    value = value.min(CLIP) + BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && value & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = (value >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

pub fn decode_sample(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = ((byte >> 4) & 0x07) as i32;
    let mantissa = (byte & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

pub fn encode(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| encode_sample(s)).collect()
}

pub fn decode(payload: &[u8]) -> Vec<i16> {
    payload.iter().map(|&b| decode_sample(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_encodes_to_0xff() {
        assert_eq!(encode_sample(0), 0xFF);
        assert_eq!(decode_sample(0xFF), 0);
    }

    #[test]
    fn extremes_are_clipped() {
        assert_eq!(encode_sample(i16::MAX), 0x80);
        assert_eq!(encode_sample(i16::MIN), 0x00);
        assert_eq!(decode_sample(0x80), 32124);
        assert_eq!(decode_sample(0x00), -32124);
    }

    #[test]
    fn quantization_error_stays_small() {
        for sample in [-20000i16, -1000, -50, 50, 1000, 20000] {
            let decoded = decode_sample(encode_sample(sample)) as i32;
            let error = (decoded - sample as i32).abs();
            assert!(
                error <= (sample as i32).abs() / 16 + 8,
                "sample {} decoded to {}",
                sample,
                decoded
            );
        }
    }

    #[test]
    fn sign_is_preserved() {
        let decoded = decode(&encode(&[1200, -1200]));
        assert!(decoded[0] > 0);
        assert_eq!(decoded[0], -decoded[1]);
    }
}
