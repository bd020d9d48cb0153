//! Index file functions
//!
//! An index file has the following structure
//!
//! Header
//!   [Node]
//!
//! The Header records the format version plus the fanout and root offset of
//! the btree that follows it. Everything after the header is btree nodes,
//! written by the index builder. Because the header occupies the start of
//! the file, no node ever lands at offset zero, which the leaf forward-link
//! encoding relies on (zero means "no next leaf").

use std::io::SeekFrom;
use std::path::Path;

use anyhow::Result;
use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::btree::IndexInfo;
use crate::BINCODER;

const FORMAT_VERSION_1: u8 = 1;

const SUPPORTED_VERSIONS: &[u8] = &[FORMAT_VERSION_1];

/// Serialized size of [`FileHeader`] with fixint encoding.
pub const HEADER_SIZE: u64 = 9;

/// Errors specific to index file handling.
#[derive(Error, Debug)]
pub enum FileError {
    /// The header carries a version this build does not understand.
    #[error("file version not supported: {0}")]
    InvalidFileVersion(u8),
}

/// The fixed-size header at the start of every index file.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileHeader {
    version: u8,
    fanout: u32,
    root_offset: u32,
}

impl FileHeader {
    /// Build a header describing a freshly built btree.
    pub fn new(info: IndexInfo) -> Self {
        Self {
            version: FORMAT_VERSION_1,
            fanout: info.fanout,
            root_offset: info.root_offset,
        }
    }

    /// The btree location this header describes.
    pub fn index_info(&self) -> IndexInfo {
        IndexInfo {
            fanout: self.fanout,
            root_offset: self.root_offset,
        }
    }

    /// Read and version-check the header at the start of the file.
    pub async fn read(file: &mut IndexFile) -> Result<Self> {
        file.seek(0).await?;
        let mut buf = vec![0; HEADER_SIZE as usize];
        file.read_exact(&mut buf).await?;
        let header: FileHeader = BINCODER.deserialize(&buf)?;
        if !SUPPORTED_VERSIONS.contains(&header.version) {
            return Err(FileError::InvalidFileVersion(header.version).into());
        }
        Ok(header)
    }

    /// Write the header at the start of the file.
    pub async fn write(&self, file: &mut IndexFile) -> Result<()> {
        let buf = BINCODER.serialize(self)?;
        file.seek(0).await?;
        file.write_all(&buf).await?;
        Ok(())
    }
}

/// An open index file.
///
/// This is the single handle the builder writes through and every reader
/// reads through. The seek cursor is part of the handle, so concurrent
/// readers must serialize access behind one mutex; [`crate::btree::BtreeIndex`]
/// takes care of that.
#[derive(Debug)]
pub struct IndexFile {
    file: File,
}

impl IndexFile {
    /// Create a new index file, truncating any existing one. Space for the
    /// header is reserved and the cursor left just past it, ready for the
    /// builder.
    pub async fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())
            .await?;

        tracing::debug!("creating index file at: {}", path.as_ref().display());

        let mut this = Self { file };
        this.write_all(&[0; HEADER_SIZE as usize]).await?;
        Ok(this)
    }

    /// Open an existing index file for reading.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(false)
            .create(false)
            .open(path.as_ref())
            .await?;

        Ok(Self { file })
    }

    /// Move the cursor to an absolute offset.
    pub async fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        Ok(())
    }

    /// Current cursor position.
    pub async fn tell(&mut self) -> Result<u64> {
        Ok(self.file.stream_position().await?)
    }

    /// Read a little-endian `u32` at the cursor.
    pub async fn read_u32(&mut self) -> Result<u32> {
        Ok(self.file.read_u32_le().await?)
    }

    /// Write a little-endian `u32` at the cursor.
    pub async fn write_u32(&mut self, value: u32) -> Result<()> {
        self.file.write_u32_le(value).await?;
        Ok(())
    }

    /// Fill `buf` from the cursor.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.file.read_exact(buf).await?;
        Ok(())
    }

    /// Write `buf` at the cursor.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf).await?;
        Ok(())
    }

    /// Flush file contents to stable storage.
    pub async fn sync(&self) -> Result<()> {
        self.file.sync_all().await.map_err(|e| e.into())
    }
}
