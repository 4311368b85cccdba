//! Per-sample scaling kernels.
//!
//! Samples are little-endian. 24-bit samples are 3-byte packed. Scaled values
//! saturate at the representable range instead of wrapping. Trailing bytes
//! that do not form a whole sample are left untouched.

/// How to interpret the raw bytes of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    pub bit_depth: u16,
    pub signed: bool,
}

impl SampleLayout {
    pub fn bytes_per_sample(&self) -> usize {
        (self.bit_depth >> 3) as usize
    }
}

/// Scale every whole sample in `buf` by `factor`, in place.
pub fn scale_in_place(buf: &mut [u8], layout: SampleLayout, factor: f64) {
    match (layout.bit_depth, layout.signed) {
        (8, true) => {
            let factor = factor as f32;
            for byte in buf.iter_mut() {
                let scaled = (*byte as i8 as f32 * factor) as i32;
                *byte = scaled.clamp(i8::MIN as i32, i8::MAX as i32) as i8 as u8;
            }
        }
        (8, false) => {
            let factor = factor as f32;
            for byte in buf.iter_mut() {
                let scaled = (*byte as f32 * factor) as i32;
                *byte = scaled.clamp(0, u8::MAX as i32) as u8;
            }
        }
        (16, true) => {
            let factor = factor as f32;
            for raw in buf.chunks_exact_mut(2) {
                let sample = i16::from_le_bytes([raw[0], raw[1]]);
                let scaled = (sample as f32 * factor) as i32;
                let clamped = scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
                raw.copy_from_slice(&clamped.to_le_bytes());
            }
        }
        (16, false) => {
            let factor = factor as f32;
            for raw in buf.chunks_exact_mut(2) {
                let sample = u16::from_le_bytes([raw[0], raw[1]]);
                let scaled = (sample as f32 * factor) as i32;
                let clamped = scaled.clamp(0, u16::MAX as i32) as u16;
                raw.copy_from_slice(&clamped.to_le_bytes());
            }
        }
        (24, true) => {
            for raw in buf.chunks_exact_mut(3) {
                // Sign-extend the 3 packed bytes through the top of an i32.
                let sample = i32::from_le_bytes([0, raw[0], raw[1], raw[2]]) >> 8;
                let scaled = (sample as f64 * factor) as i64;
                let clamped = scaled.clamp(-(1 << 23), (1 << 23) - 1) as i32;
                let bytes = clamped.to_le_bytes();
                raw.copy_from_slice(&bytes[..3]);
            }
        }
        (24, false) => {
            for raw in buf.chunks_exact_mut(3) {
                let sample = u32::from_le_bytes([raw[0], raw[1], raw[2], 0]);
                let scaled = (sample as f64 * factor) as i64;
                let clamped = scaled.clamp(0, (1 << 24) - 1) as u32;
                let bytes = clamped.to_le_bytes();
                raw.copy_from_slice(&bytes[..3]);
            }
        }
        (32, true) => {
            for raw in buf.chunks_exact_mut(4) {
                let sample = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                let scaled = (sample as f64 * factor) as i64;
                let clamped = scaled.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                raw.copy_from_slice(&clamped.to_le_bytes());
            }
        }
        (32, false) => {
            for raw in buf.chunks_exact_mut(4) {
                let sample = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                let scaled = (sample as f64 * factor) as i64;
                let clamped = scaled.clamp(0, u32::MAX as i64) as u32;
                raw.copy_from_slice(&clamped.to_le_bytes());
            }
        }
        _ => {
            tracing::warn!(
                bit_depth = layout.bit_depth,
                "unsupported sample layout, leaving buffer untouched"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(bit_depth: u16, signed: bool) -> SampleLayout {
        SampleLayout { bit_depth, signed }
    }

    #[test]
    fn scales_signed_16() {
        let mut buf = Vec::new();
        for sample in [100i16, -100, 0, 1000] {
            buf.extend_from_slice(&sample.to_le_bytes());
        }
        scale_in_place(&mut buf, layout(16, true), 0.5);
        let out: Vec<i16> = buf
            .chunks_exact(2)
            .map(|raw| i16::from_le_bytes([raw[0], raw[1]]))
            .collect();
        assert_eq!(out, vec![50, -50, 0, 500]);
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        let mut buf = i16::MAX.to_le_bytes().to_vec();
        scale_in_place(&mut buf, layout(16, true), 4.0);
        assert_eq!(i16::from_le_bytes([buf[0], buf[1]]), i16::MAX);

        let mut buf = i16::MIN.to_le_bytes().to_vec();
        scale_in_place(&mut buf, layout(16, true), 4.0);
        assert_eq!(i16::from_le_bytes([buf[0], buf[1]]), i16::MIN);
    }

    #[test]
    fn scales_unsigned_8() {
        let mut buf = vec![10u8, 200, 255];
        scale_in_place(&mut buf, layout(8, false), 2.0);
        assert_eq!(buf, vec![20, 255, 255]);
    }

    #[test]
    fn scales_signed_8() {
        let mut buf = vec![10i8 as u8, (-10i8) as u8, i8::MIN as u8];
        scale_in_place(&mut buf, layout(8, true), 3.0);
        assert_eq!(buf[0] as i8, 30);
        assert_eq!(buf[1] as i8, -30);
        assert_eq!(buf[2] as i8, i8::MIN);
    }

    #[test]
    fn scales_packed_24_signed() {
        // -4096 and 4096 as 3-byte little-endian
        let mut buf = Vec::new();
        for sample in [4096i32, -4096] {
            buf.extend_from_slice(&sample.to_le_bytes()[..3]);
        }
        scale_in_place(&mut buf, layout(24, true), 2.0);
        let first = i32::from_le_bytes([0, buf[0], buf[1], buf[2]]) >> 8;
        let second = i32::from_le_bytes([0, buf[3], buf[4], buf[5]]) >> 8;
        assert_eq!(first, 8192);
        assert_eq!(second, -8192);
    }

    #[test]
    fn packed_24_saturates() {
        let max = (1i32 << 23) - 1;
        let mut buf = max.to_le_bytes()[..3].to_vec();
        scale_in_place(&mut buf, layout(24, true), 10.0);
        assert_eq!(i32::from_le_bytes([0, buf[0], buf[1], buf[2]]) >> 8, max);
    }

    #[test]
    fn scales_signed_32() {
        let mut buf = 1_000_000i32.to_le_bytes().to_vec();
        scale_in_place(&mut buf, layout(32, true), -1.5);
        assert_eq!(
            i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            -1_500_000
        );
    }

    #[test]
    fn trailing_partial_sample_untouched() {
        let mut buf = vec![0x10, 0x00, 0x7f]; // one i16 sample + one stray byte
        scale_in_place(&mut buf, layout(16, true), 2.0);
        assert_eq!(i16::from_le_bytes([buf[0], buf[1]]), 0x20);
        assert_eq!(buf[2], 0x7f);
    }
}
