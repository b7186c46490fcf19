//! Input buffering between a [`ByteSource`] and a codec adapter.

use alloc::vec::Vec;

use crate::codec::CodecAdapter;
use crate::error::DecodeError;
use crate::limits::Limits;
use crate::source::ByteSource;

/// Minimum read and growth quantum.
pub const BLOCK_SIZE: usize = 4096;

/// Bytes handed to a codec, with a cursor marking how far it has consumed.
#[derive(Debug, Default)]
pub struct CodecMemory {
    buf: Vec<u8>,
    pos: usize,
    end_of_stream: bool,
}

impl CodecMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything buffered, consumed or not.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes the codec has not consumed yet.
    pub fn unconsumed(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Mark `n` more bytes as consumed.
    pub fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buf.len());
    }

    /// Consume everything buffered.
    pub fn consume_all(&mut self) {
        self.pos = self.buf.len();
    }

    /// True once the buffer ends where the complete source ends.
    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(data: &[u8], end_of_stream: bool) -> Self {
        Self {
            buf: data.to_vec(),
            pos: 0,
            end_of_stream,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.end_of_stream = false;
    }
}

/// Outcome of one [`InputFeeder::read_more`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feed {
    /// New bytes were appended, or the end of the stream was reached,
    /// and the codec has seen the updated buffer.
    Fed,
    /// The source has nothing more yet but may still grow.
    Pending,
    /// The complete source has been read to the end.
    Exhausted,
}

/// Pulls blocks from a source into a [`CodecMemory`].
#[derive(Debug, Default)]
pub struct InputFeeder {
    offset: u64,
}

impl InputFeeder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source offset of the next byte to read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn reset(&mut self, mem: &mut CodecMemory) {
        self.offset = 0;
        mem.clear();
    }

    /// Append more source bytes for `codec`.
    ///
    /// Grows the buffer by up to [`BLOCK_SIZE`] when the codec consumed
    /// nothing since the last feed; otherwise drops consumed bytes and
    /// refills the reclaimed space. Unconsumed bytes are never discarded.
    pub fn read_more<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        mem: &mut CodecMemory,
        codec: &mut dyn CodecAdapter,
        limits: &Limits,
    ) -> Result<Feed, DecodeError> {
        let size = source.size();
        if self.offset >= size {
            if !source.is_complete() {
                return Ok(Feed::Pending);
            }
            if mem.end_of_stream {
                return Ok(Feed::Exhausted);
            }
            // The source was finalized after its last bytes were read.
            mem.end_of_stream = true;
            codec.input(mem)?;
            return Ok(Feed::Fed);
        }
        let remaining = usize::try_from(size - self.offset).unwrap_or(usize::MAX);
        let avail = codec.avail_input(mem).min(mem.buf.len());
        let buf_len = mem.buf.len();

        let read_len = if avail == buf_len {
            let read_len = remaining.min(BLOCK_SIZE);
            let new_len = buf_len + read_len;
            limits.check_memory(new_len)?;
            mem.buf
                .try_reserve_exact(read_len)
                .map_err(|_| DecodeError::AllocationFailed { requested: new_len })?;
            ltrace!("feeder: grow input buffer {} -> {}", buf_len, new_len);
            read_len
        } else {
            let consumed = buf_len - avail;
            ltrace!("feeder: drop {} consumed bytes", consumed);
            mem.buf.copy_within(consumed.., 0);
            mem.buf.truncate(avail);
            remaining.min(consumed)
        };

        mem.buf.resize(avail + read_len, 0);
        source.read_block_at(&mut mem.buf[avail..], self.offset)?;
        self.offset += read_len as u64;
        mem.pos = 0;
        mem.end_of_stream = self.offset == size && source.is_complete();
        codec.input(mem)?;
        Ok(Feed::Fed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecEvent, HeaderInfo, ImageType, Progress, StartParams};
    use crate::pixel::SourceFormat;

    /// Consumes a fixed number of bytes per feed.
    struct Nibbler {
        per_feed: usize,
        seen: Vec<u8>,
    }

    impl CodecAdapter for Nibbler {
        fn image_type(&self) -> ImageType {
            ImageType::Unknown
        }

        fn input(&mut self, mem: &mut CodecMemory) -> Result<(), DecodeError> {
            let take = self.per_feed.min(mem.remaining());
            self.seen.extend_from_slice(&mem.unconsumed()[..take]);
            mem.consume(take);
            Ok(())
        }

        fn read_header(&mut self, _mem: &mut CodecMemory) -> Result<Progress<HeaderInfo>, DecodeError> {
            Ok(Progress::NeedMoreInput)
        }

        fn start_decode(&mut self, _params: &StartParams) -> Result<SourceFormat, DecodeError> {
            Ok(SourceFormat::Gray8)
        }

        fn next_event(
            &mut self,
            _mem: &mut CodecMemory,
            _row: &mut Vec<u8>,
        ) -> Result<Progress<CodecEvent>, DecodeError> {
            Ok(Progress::NeedMoreInput)
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn first_feed_reads_one_block() {
        let data = pattern(10_000);
        let mut src = data.as_slice();
        let mut mem = CodecMemory::new();
        let mut feeder = InputFeeder::new();
        let mut codec = Nibbler { per_feed: 0, seen: Vec::new() };
        let r = feeder
            .read_more(&mut src, &mut mem, &mut codec, &Limits::default())
            .unwrap();
        assert_eq!(r, Feed::Fed);
        assert_eq!(mem.len(), BLOCK_SIZE);
        assert_eq!(feeder.offset(), BLOCK_SIZE as u64);
        assert!(!mem.is_end_of_stream());
    }

    #[test]
    fn stuck_codec_grows_buffer() {
        let data = pattern(10_000);
        let mut src = data.as_slice();
        let mut mem = CodecMemory::new();
        let mut feeder = InputFeeder::new();
        let mut codec = Nibbler { per_feed: 0, seen: Vec::new() };
        let limits = Limits::default();
        feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap();
        feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap();
        assert_eq!(mem.len(), 2 * BLOCK_SIZE);
        feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap();
        assert_eq!(mem.len(), 10_000);
        assert!(mem.is_end_of_stream());
        assert_eq!(mem.data(), data.as_slice());
        assert_eq!(
            feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap(),
            Feed::Exhausted
        );
    }

    #[test]
    fn partial_progress_compacts_without_losing_bytes() {
        let data = pattern(20_000);
        let mut src = data.as_slice();
        let mut mem = CodecMemory::new();
        let mut feeder = InputFeeder::new();
        let mut codec = Nibbler { per_feed: 1000, seen: Vec::new() };
        let limits = Limits::default();
        loop {
            match feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap() {
                Feed::Fed => assert!(mem.len() <= BLOCK_SIZE),
                Feed::Exhausted => break,
                Feed::Pending => unreachable!(),
            }
        }
        // Drain what is still buffered.
        while mem.remaining() > 0 {
            codec.input(&mut mem).unwrap();
        }
        assert_eq!(codec.seen, data);
    }

    #[test]
    fn memory_limit_blocks_growth() {
        let data = pattern(10_000);
        let mut src = data.as_slice();
        let mut mem = CodecMemory::new();
        let mut feeder = InputFeeder::new();
        let mut codec = Nibbler { per_feed: 0, seen: Vec::new() };
        let limits = Limits {
            max_memory_bytes: Some(5000),
            ..Default::default()
        };
        feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap();
        assert!(matches!(
            feeder.read_more(&mut src, &mut mem, &mut codec, &limits),
            Err(DecodeError::LimitExceeded(_))
        ));
    }

    struct Growing {
        data: Vec<u8>,
        visible: usize,
    }

    impl ByteSource for Growing {
        fn size(&self) -> u64 {
            self.visible as u64
        }
        fn read_block_at(&mut self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
            let o = offset as usize;
            buf.copy_from_slice(&self.data[o..o + buf.len()]);
            Ok(())
        }
        fn is_complete(&self) -> bool {
            self.visible == self.data.len()
        }
    }

    #[test]
    fn growing_source_reports_pending() {
        let mut src = Growing { data: pattern(100), visible: 40 };
        let mut mem = CodecMemory::new();
        let mut feeder = InputFeeder::new();
        let mut codec = Nibbler { per_feed: 0, seen: Vec::new() };
        let limits = Limits::default();
        feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap();
        assert_eq!(mem.len(), 40);
        assert!(!mem.is_end_of_stream());
        assert_eq!(
            feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap(),
            Feed::Pending
        );
        src.visible = 100;
        feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap();
        assert_eq!(mem.len(), 100);
        assert!(mem.is_end_of_stream());
    }

    struct Finalizing {
        data: Vec<u8>,
        complete: bool,
    }

    impl ByteSource for Finalizing {
        fn size(&self) -> u64 {
            self.data.len() as u64
        }
        fn read_block_at(&mut self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
            let o = offset as usize;
            buf.copy_from_slice(&self.data[o..o + buf.len()]);
            Ok(())
        }
        fn is_complete(&self) -> bool {
            self.complete
        }
    }

    #[test]
    fn finalizing_without_new_bytes_marks_end_of_stream() {
        let mut src = Finalizing { data: pattern(30), complete: false };
        let mut mem = CodecMemory::new();
        let mut feeder = InputFeeder::new();
        let mut codec = Nibbler { per_feed: 0, seen: Vec::new() };
        let limits = Limits::default();
        feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap();
        assert!(!mem.is_end_of_stream());
        src.complete = true;
        assert_eq!(
            feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap(),
            Feed::Fed
        );
        assert!(mem.is_end_of_stream());
        assert_eq!(mem.len(), 30);
        assert_eq!(
            feeder.read_more(&mut src, &mut mem, &mut codec, &limits).unwrap(),
            Feed::Exhausted
        );
    }
}
