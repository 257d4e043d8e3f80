//! Fixed-order integer and float helpers for the shapefile headers, which
//! mix big- and little-endian fields.
#![expect(
    clippy::little_endian_bytes,
    clippy::big_endian_bytes,
    reason = "shapefile headers fix the byte order of every field"
)]

pub(crate) fn put_i32_be(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_i32_le(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32_le(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u16_le(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_f64_le(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn array<const N: usize>(bytes: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    bytes
        .get(offset..end)
        .and_then(|slice| <[u8; N]>::try_from(slice).ok())
}

pub(crate) fn read_i32_be(bytes: &[u8], offset: usize) -> Option<i32> {
    array(bytes, offset).map(i32::from_be_bytes)
}

pub(crate) fn read_i32_le(bytes: &[u8], offset: usize) -> Option<i32> {
    array(bytes, offset).map(i32::from_le_bytes)
}

pub(crate) fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    array(bytes, offset).map(u32::from_le_bytes)
}

pub(crate) fn read_u16_le(bytes: &[u8], offset: usize) -> Option<u16> {
    array(bytes, offset).map(u16::from_le_bytes)
}

pub(crate) fn read_f64_le(bytes: &[u8], offset: usize) -> Option<f64> {
    array(bytes, offset).map(f64::from_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_order_fields_read_back() {
        let mut out = Vec::new();
        put_i32_be(&mut out, 9994);
        put_i32_le(&mut out, 1000);
        put_f64_le(&mut out, -1.5);
        assert_eq!(out.get(..4), Some(&[0, 0, 0x27, 0x0A][..]));
        assert_eq!(read_i32_be(&out, 0), Some(9994));
        assert_eq!(read_i32_le(&out, 4), Some(1000));
        assert_eq!(read_f64_le(&out, 8), Some(-1.5));
        assert_eq!(read_u32_le(&out, 14), None);
    }
}
