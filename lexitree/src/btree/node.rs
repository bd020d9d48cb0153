//! B-tree node codec
//!
//! On disk a node is `u32 uncompressedSize | u32 compressedSize |
//! compressed payload`, zlib-compressed, all integers little-endian. The
//! decoded payload starts with a marker word: [`INTERNAL_NODE_MARK`] for an
//! internal node, anything else is a leaf's chain count. Leaves are followed
//! on disk by one more `u32`, the forward link to the next leaf, which is
//! NOT part of the compressed payload.

use std::io::{Read, Write};

use anyhow::Result;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::IndexError;
use crate::io::file::IndexFile;

/// Marker word distinguishing internal nodes from leaves.
pub(crate) const INTERNAL_NODE_MARK: u32 = 0xffff_ffff;

pub(crate) const U32_SIZE: usize = std::mem::size_of::<u32>();

/// Read and inflate the node at `offset`.
///
/// On return the file cursor rests immediately past the compressed payload.
/// For a leaf that is its forward-link word, and callers that need the link
/// must read it before releasing the file mutex.
pub(crate) async fn read_node(file: &mut IndexFile, offset: u32) -> Result<Vec<u8>> {
    file.seek(offset as u64).await?;

    let uncompressed_size = file.read_u32().await? as usize;
    let compressed_size = file.read_u32().await? as usize;

    let mut compressed = vec![0; compressed_size];
    file.read_exact(&mut compressed).await?;

    let mut out = Vec::with_capacity(uncompressed_size);
    let mut decoder = ZlibDecoder::new(compressed.as_slice());
    if decoder.read_to_end(&mut out).is_err() || out.len() != uncompressed_size {
        return Err(IndexError::FailedToDecompressNode.into());
    }

    Ok(out)
}

/// Deflate `payload` and append it as a node at the current cursor.
/// Returns the node's offset.
pub(crate) async fn write_node(file: &mut IndexFile, payload: &[u8]) -> Result<u32> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    let compressed = encoder.finish()?;

    let offset = file.tell().await? as u32;
    file.write_u32(payload.len() as u32).await?;
    file.write_u32(compressed.len() as u32).await?;
    file.write_all(&compressed).await?;

    Ok(offset)
}

/// Read a little-endian `u32` out of a decoded payload.
pub(crate) fn read_u32_at(buf: &[u8], offset: usize) -> Result<u32> {
    let end = offset
        .checked_add(U32_SIZE)
        .ok_or(IndexError::CorruptedChainData)?;
    let bytes = buf.get(offset..end).ok_or(IndexError::CorruptedChainData)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a NUL-terminated UTF-8 string out of a decoded payload. Returns the
/// string and the offset just past its terminator.
pub(crate) fn read_cstr_at(buf: &[u8], offset: usize) -> Result<(&str, usize)> {
    let rest = buf.get(offset..).ok_or(IndexError::CorruptedChainData)?;
    let nul = rest
        .iter()
        .position(|b| *b == 0)
        .ok_or(IndexError::CorruptedChainData)?;
    let s = std::str::from_utf8(&rest[..nul]).map_err(|_| IndexError::CantDecodeUtf8)?;
    Ok((s, offset + nul + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn it_round_trips_a_node() {
        let mut file = IndexFile::create("node_round_trip.idx")
            .await
            .expect("creates index file");

        let payload: Vec<u8> = (0..200u16).map(|x| (x % 251) as u8).collect();
        let offset = write_node(&mut file, &payload)
            .await
            .expect("writes node");

        let decoded = read_node(&mut file, offset).await.expect("reads node");
        assert_eq!(decoded, payload);
        std::fs::remove_file("node_round_trip.idx").expect("cleanup");
    }

    #[tokio::test]
    async fn it_leaves_the_cursor_past_the_payload() {
        let mut file = IndexFile::create("node_cursor.idx")
            .await
            .expect("creates index file");

        let offset = write_node(&mut file, b"some leaf bytes")
            .await
            .expect("writes node");
        file.write_u32(0x1234).await.expect("writes forward link");

        read_node(&mut file, offset).await.expect("reads node");
        // The next word after the payload is the forward link.
        assert_eq!(file.read_u32().await.expect("reads link"), 0x1234);
        std::fs::remove_file("node_cursor.idx").expect("cleanup");
    }

    #[tokio::test]
    async fn it_rejects_a_length_mismatch() {
        let mut file = IndexFile::create("node_bad_length.idx")
            .await
            .expect("creates index file");

        let offset = write_node(&mut file, b"honest payload")
            .await
            .expect("writes node");

        // Overstate the uncompressed size in the header.
        file.seek(offset as u64).await.expect("seeks to node");
        file.write_u32(9999).await.expect("rewrites size");

        let err = read_node(&mut file, offset)
            .await
            .expect_err("length mismatch must fail");
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::FailedToDecompressNode)
        ));
        std::fs::remove_file("node_bad_length.idx").expect("cleanup");
    }

    #[test]
    fn it_reads_payload_strings() {
        let buf = b"word\0prefix\0\x2a\0\0\0";
        let (word, next) = read_cstr_at(buf, 0).expect("reads word");
        assert_eq!(word, "word");
        let (prefix, next) = read_cstr_at(buf, next).expect("reads prefix");
        assert_eq!(prefix, "prefix");
        assert_eq!(read_u32_at(buf, next).expect("reads offset"), 42);
    }

    #[test]
    fn it_rejects_unterminated_strings() {
        let err = read_cstr_at(b"no terminator", 0).expect_err("must fail");
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::CorruptedChainData)
        ));
    }

    #[test]
    fn it_rejects_invalid_utf8() {
        let err = read_cstr_at(b"\xff\xfe\0", 0).expect_err("must fail");
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::CantDecodeUtf8)
        ));
    }
}
