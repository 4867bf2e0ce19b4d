//! Response framing
//!
//! A response can be buffered and parsed in one go, or streamed, so the
//! response *as a whole* must be one msgpack message, not a by-convention
//! concatenation of independent messages. It looks like this:
//!
//! ```text
//! [header, [part1, part2, part3, ...]]
//! ```
//!
//! which in bytes is
//!
//! ```text
//! array(2) header array(n) part1 part2 part3
//! ```
//!
//! The envelope is everything up to and including `array(n)`. The parts are
//! the packed tasks, appended as-is.

use crate::error::{CubeError, Result};
use crate::header::ProcessHeader;
use serde::de::DeserializeOwned;
use std::io::Read;

fn write_error(err: impl std::fmt::Display) -> CubeError {
    CubeError::Serialization(format!("unable to write envelope: {}", err))
}

fn read_error(err: impl std::fmt::Display) -> CubeError {
    CubeError::Serialization(format!("unable to read envelope: {}", err))
}

/// Pack the header with the array tags around it
pub fn pack_with_envelope(head: &ProcessHeader) -> Result<Vec<u8>> {
    let nbundles = u32::try_from(head.nbundles).map_err(|_| {
        CubeError::Overflow(format!(
            "nbundles (= {}) does not fit in a message array",
            head.nbundles
        ))
    })?;

    let mut buffer = Vec::new();
    rmp::encode::write_array_len(&mut buffer, 2).map_err(write_error)?;
    rmp_serde::encode::write_named(&mut buffer, head)?;
    rmp::encode::write_array_len(&mut buffer, nbundles).map_err(write_error)?;
    Ok(buffer)
}

/// Read the envelope from the start of a response, leaving `reader` at the
/// first part. Returns the header and the number of parts that follow.
pub fn unpack_envelope<R: Read>(reader: &mut R) -> Result<(ProcessHeader, usize)> {
    let outer = rmp::decode::read_array_len(reader).map_err(read_error)?;
    if outer != 2 {
        return Err(CubeError::Serialization(format!(
            "expected envelope of length 2, was {}",
            outer
        )));
    }

    let head: ProcessHeader = rmp_serde::from_read(&mut *reader)?;
    let parts = rmp::decode::read_array_len(reader).map_err(read_error)?;
    Ok((head, parts as usize))
}

/// Read the next part of a response
pub fn read_part<T: DeserializeOwned, R: Read>(reader: &mut R) -> Result<T> {
    Ok(rmp_serde::from_read(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Function;

    fn header(nbundles: usize) -> ProcessHeader {
        ProcessHeader {
            pid: "pid".to_string(),
            function: Function::Slice,
            nbundles,
            ndims: 3,
            labels: vec!["inline".into(), "crossline".into(), "time".into()],
            index: vec![1, 2, 1, 7, 0, 1, 5],
            attributes: vec!["data".into()],
            shapes: vec![3, 1, 2, 1],
        }
    }

    #[test]
    fn test_envelope_prefix() {
        let envelope = pack_with_envelope(&header(3)).unwrap();
        // fixarray(2) ... fixarray(3)
        assert_eq!(envelope[0], 0x92);
        assert_eq!(*envelope.last().unwrap(), 0x93);
    }

    #[test]
    fn test_envelope_large_count() {
        let envelope = pack_with_envelope(&header(70_000)).unwrap();
        let mut reader = envelope.as_slice();
        let (head, parts) = unpack_envelope(&mut reader).unwrap();
        assert_eq!(parts, 70_000);
        assert_eq!(head.nbundles, 70_000);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_streamed_and_buffered_decode_agree() {
        let parts: Vec<Vec<u32>> = vec![vec![0, 1], vec![], vec![2]];
        let mut stream = pack_with_envelope(&header(parts.len())).unwrap();
        for part in &parts {
            stream.extend(rmp_serde::to_vec(part).unwrap());
        }

        let (head, decoded): (ProcessHeader, Vec<Vec<u32>>) =
            rmp_serde::from_slice(&stream).unwrap();
        assert_eq!(head, header(3));
        assert_eq!(decoded, parts);

        let mut reader = stream.as_slice();
        let (head, n) = unpack_envelope(&mut reader).unwrap();
        assert_eq!(head, header(3));
        assert_eq!(n, 3);
        for part in &parts {
            let got: Vec<u32> = read_part(&mut reader).unwrap();
            assert_eq!(&got, part);
        }
        assert!(reader.is_empty());
    }

    #[test]
    fn test_rejects_non_envelope() {
        let bytes = rmp_serde::to_vec(&vec![1u8, 2, 3]).unwrap();
        assert!(matches!(
            unpack_envelope(&mut bytes.as_slice()),
            Err(CubeError::Serialization(_))
        ));
    }
}
