//! Seekable byte sources.

use std::io;

use alloc::vec::Vec;

/// Random-access input for a decode session.
///
/// A source may still be growing (a network download, for instance):
/// while [`is_complete`](Self::is_complete) is false, running out of bytes
/// pauses decoding instead of failing it.
pub trait ByteSource {
    /// Bytes currently available.
    fn size(&self) -> u64;

    /// Fill `buf` from `offset`. Fails if the range is not available.
    fn read_block_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Whether `size` is final.
    fn is_complete(&self) -> bool {
        true
    }
}

fn read_from_slice(data: &[u8], buf: &mut [u8], offset: u64) -> io::Result<()> {
    let start = usize::try_from(offset).map_err(|_| io::ErrorKind::UnexpectedEof)?;
    let end = start
        .checked_add(buf.len())
        .filter(|&end| end <= data.len())
        .ok_or(io::ErrorKind::UnexpectedEof)?;
    buf.copy_from_slice(&data[start..end]);
    Ok(())
}

impl ByteSource for &[u8] {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_block_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        read_from_slice(self, buf, offset)
    }
}

impl ByteSource for Vec<u8> {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_block_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        read_from_slice(self, buf, offset)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_block_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_block_at(buf, offset)
    }

    fn is_complete(&self) -> bool {
        (**self).is_complete()
    }
}
