//! zlib compression for RPT page data and PDF streams.

use crate::error::{Result, RptError};
use crate::rpt::layout::MAX_OBJECT_SIZE;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::Write;

/// Inflate a zlib-wrapped buffer whose uncompressed size is known.
///
/// The output allocation is bounded by the declared size, so a corrupt or
/// hostile length field cannot amplify beyond [`MAX_OBJECT_SIZE`]. A length
/// mismatch between the declaration and the actual inflated byte count is a
/// [`RptError::Decompression`].
pub fn inflate_exact(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    if expected_len > MAX_OBJECT_SIZE {
        return Err(RptError::Memory(format!(
            "declared uncompressed size {expected_len} exceeds the {MAX_OBJECT_SIZE} byte ceiling"
        )));
    }

    let mut decoder = Decompress::new(true);
    let mut out = vec![0u8; expected_len];
    let mut in_pos = 0usize;
    let mut out_pos = 0usize;

    loop {
        let status = decoder
            .decompress(&data[in_pos..], &mut out[out_pos..], FlushDecompress::Finish)
            .map_err(|e| RptError::Decompression(e.to_string()))?;
        in_pos = decoder.total_in() as usize;
        out_pos = decoder.total_out() as usize;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if out_pos == out.len() {
                    // More output pending than the descriptor declared.
                    let mut probe = [0u8; 1];
                    let st = decoder
                        .decompress(&data[in_pos..], &mut probe, FlushDecompress::Finish)
                        .map_err(|e| RptError::Decompression(e.to_string()))?;
                    if decoder.total_out() as usize > out.len() {
                        return Err(RptError::Decompression(format!(
                            "inflated size exceeds declared {expected_len}"
                        )));
                    }
                    if st == Status::StreamEnd {
                        break;
                    }
                    return Err(RptError::Decompression(
                        "truncated zlib stream".into(),
                    ));
                }
                if in_pos == data.len() {
                    return Err(RptError::Decompression("truncated zlib stream".into()));
                }
            }
        }
    }

    if out_pos != expected_len {
        return Err(RptError::Decompression(format!(
            "inflated {out_pos} bytes, descriptor declares {expected_len}"
        )));
    }
    Ok(out)
}

/// Deflate a buffer with the zlib wrapper (used for embedded PDF streams).
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing to a Vec cannot fail.
    encoder.write_all(data).expect("deflate to memory");
    encoder.finish().expect("deflate to memory")
}
