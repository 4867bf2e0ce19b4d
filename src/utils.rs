//! Utility functions

use crate::error::{CubeError, Result};
use crate::types::{CubePoint, FragmentId, NDIMS};

/// Size of one point on the stitch input: three little-endian i32
pub const POINT_SIZE: usize = NDIMS * std::mem::size_of::<i32>();

/// Size of one stitched sample: little-endian u64 offset, then f32 value
pub const SAMPLE_SIZE: usize = std::mem::size_of::<u64>() + std::mem::size_of::<f32>();

/// Storage key of a fragment: `{prefix}/{fx}-{fy}-{fz}/{x}-{y}-{z}.{ext}`
pub fn fragment_key(prefix: &str, shape: &[usize; NDIMS], ext: &str, id: FragmentId) -> String {
    format!(
        "{}/{}-{}-{}/{}-{}-{}.{}",
        prefix,
        shape[0],
        shape[1],
        shape[2],
        id.x(),
        id.y(),
        id.z(),
        ext
    )
}

/// File name of a fragment on the stitch input: `{basename}-{x}-{y}-{z}.f32`
pub fn fragment_path(basename: &str, id: FragmentId) -> String {
    format!("{}-{}-{}-{}.f32", basename, id.x(), id.y(), id.z())
}

/// Parse `count` points packed as little-endian i32 triples
pub fn parse_points(bytes: &[u8], count: usize) -> Result<Vec<CubePoint>> {
    let expected = count.checked_mul(POINT_SIZE).ok_or_else(|| {
        CubeError::Overflow(format!("{} points do not fit in memory", count))
    })?;
    if bytes.len() < expected {
        return Err(CubeError::InvalidArgument(format!(
            "expected {} bytes of points, got {}",
            expected,
            bytes.len()
        )));
    }

    bytes[..expected]
        .chunks_exact(POINT_SIZE)
        .map(|chunk| {
            let mut p = [0usize; NDIMS];
            for (i, field) in chunk.chunks_exact(4).enumerate() {
                let v = i32::from_le_bytes([field[0], field[1], field[2], field[3]]);
                p[i] = usize::try_from(v).map_err(|_| {
                    CubeError::OutOfRange(format!("negative coordinate (= {})", v))
                })?;
            }
            Ok(CubePoint(p))
        })
        .collect()
}

/// Read the little-endian f32 at cell `offset`
pub fn read_f32(bytes: &[u8], offset: usize) -> Result<f32> {
    let range = offset
        .checked_mul(4)
        .and_then(|start| Some(start..start.checked_add(4)?));
    match range.and_then(|r| bytes.get(r)) {
        Some(b) => Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(CubeError::OutOfRange(format!(
            "cell (= {}) past the end of a {} byte fragment",
            offset,
            bytes.len()
        ))),
    }
}

/// Encode one stitched sample
pub fn encode_sample(offset: u64, value: f32) -> [u8; SAMPLE_SIZE] {
    let mut out = [0u8; SAMPLE_SIZE];
    out[..8].copy_from_slice(&offset.to_le_bytes());
    out[8..].copy_from_slice(&value.to_le_bytes());
    out
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(points: &[[i32; 3]]) -> Vec<u8> {
        points
            .iter()
            .flat_map(|p| p.iter().flat_map(|v| v.to_le_bytes()))
            .collect()
    }

    #[test]
    fn test_fragment_key() {
        assert_eq!(
            fragment_key("src", &[64, 64, 64], "f32", FragmentId::new(1, 0, 12)),
            "src/64-64-64/1-0-12.f32"
        );
    }

    #[test]
    fn test_fragment_path() {
        assert_eq!(
            fragment_path("cube", FragmentId::new(0, 3, 1)),
            "cube-0-3-1.f32"
        );
    }

    #[test]
    fn test_parse_points() {
        let bytes = pack(&[[1, 2, 3], [0, 0, 70000]]);
        let points = parse_points(&bytes, 2).unwrap();
        assert_eq!(points, vec![CubePoint::new(1, 2, 3), CubePoint::new(0, 0, 70000)]);

        assert!(matches!(
            parse_points(&bytes, 3),
            Err(CubeError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_points(&pack(&[[0, -1, 0]]), 1),
            Err(CubeError::OutOfRange(_))
        ));
        assert!(parse_points(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_read_f32() {
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(read_f32(&bytes, 1).unwrap(), -2.0);
        assert!(matches!(read_f32(&bytes, 2), Err(CubeError::OutOfRange(_))));
        assert!(read_f32(&bytes, usize::MAX).is_err());
    }

    #[test]
    fn test_encode_sample() {
        let sample = encode_sample(258, 1.0);
        assert_eq!(&sample[..8], &[2, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&sample[8..], &1.0f32.to_le_bytes());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }
}
