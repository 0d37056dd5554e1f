//! Attach-stream demultiplexing
//!
//! A container attached without a TTY emits one combined byte stream of
//! frames: an 8-byte header (byte 0 selects the stream, 1 for stdout and 2
//! for stderr; bytes 1-3 are reserved; bytes 4-7 are a big-endian unsigned
//! payload length) immediately followed by that many payload bytes. The
//! demultiplexer buffers across arbitrary chunk boundaries, stops when fewer
//! than a full header remains, and reassembles the original stdout and
//! stderr byte sequences.

use tokio::io::{AsyncRead, AsyncReadExt};

const FRAME_HEADER_LEN: usize = 8;

/// Which output stream a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Incremental decoder for the multiplexed attach stream
#[derive(Debug, Default)]
pub struct OutputDemuxer {
    buffer: Vec<u8>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl OutputDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of the raw multiplexed stream.
    ///
    /// Complete frames are routed to their accumulator; a partial frame is
    /// retained until the bytes that complete it arrive. A trailing fragment
    /// shorter than one header is left unconsumed, matching a stream that
    /// closed mid-frame.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);

        let mut offset = 0;
        loop {
            let remaining = &self.buffer[offset..];
            if remaining.len() < FRAME_HEADER_LEN {
                break;
            }
            let length =
                u32::from_be_bytes([remaining[4], remaining[5], remaining[6], remaining[7]])
                    as usize;
            if remaining.len() < FRAME_HEADER_LEN + length {
                break;
            }

            let selector = remaining[0];
            let payload = &remaining[FRAME_HEADER_LEN..FRAME_HEADER_LEN + length];
            match selector {
                1 => self.stdout.extend_from_slice(payload),
                2 => self.stderr.extend_from_slice(payload),
                // stdin echo and unknown selectors carry nothing we keep
                _ => {}
            }
            offset += FRAME_HEADER_LEN + length;
        }
        self.buffer.drain(..offset);
    }

    /// Append a frame an upstream client library has already split off the
    /// wire, sharing the accumulators with the raw byte path.
    pub fn push(&mut self, kind: StreamKind, payload: &[u8]) {
        match kind {
            StreamKind::Stdout => self.stdout.extend_from_slice(payload),
            StreamKind::Stderr => self.stderr.extend_from_slice(payload),
        }
    }

    /// Drain a raw multiplexed reader until it closes
    pub async fn read_to_end<R>(&mut self, reader: &mut R) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; 8192];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            self.feed(&chunk[..n]);
        }
        Ok(())
    }

    /// Reassembled streams as lossily-decoded text
    pub fn into_output(self) -> (String, String) {
        (
            String::from_utf8_lossy(&self.stdout).into_owned(),
            String::from_utf8_lossy(&self.stderr).into_owned(),
        )
    }

    /// Reassembled streams as raw bytes
    pub fn into_bytes(self) -> (Vec<u8>, Vec<u8>) {
        (self.stdout, self.stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(selector: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![selector, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_reconstructs_interleaved_streams() {
        let mut stream = Vec::new();
        stream.extend(frame(1, b"hello "));
        stream.extend(frame(2, b"warning: "));
        stream.extend(frame(1, b"world"));
        stream.extend(frame(2, b"deprecated"));

        let mut demuxer = OutputDemuxer::new();
        demuxer.feed(&stream);

        let (stdout, stderr) = demuxer.into_output();
        assert_eq!(stdout, "hello world");
        assert_eq!(stderr, "warning: deprecated");
    }

    #[test]
    fn test_payload_split_across_two_feeds() {
        let data = frame(1, b"split-me-in-half");
        let (first, second) = data.split_at(11);

        let mut demuxer = OutputDemuxer::new();
        demuxer.feed(first);
        demuxer.feed(second);

        let (stdout, _) = demuxer.into_output();
        assert_eq!(stdout, "split-me-in-half");
    }

    #[test]
    fn test_header_split_across_feeds() {
        let data = frame(2, b"stderr bytes");
        let (first, second) = data.split_at(3);

        let mut demuxer = OutputDemuxer::new();
        demuxer.feed(first);
        demuxer.feed(second);

        let (_, stderr) = demuxer.into_output();
        assert_eq!(stderr, "stderr bytes");
    }

    #[test]
    fn test_byte_at_a_time_feeding() {
        let mut stream = Vec::new();
        stream.extend(frame(1, b"one"));
        stream.extend(frame(2, b"two"));

        let mut demuxer = OutputDemuxer::new();
        for byte in &stream {
            demuxer.feed(std::slice::from_ref(byte));
        }

        let (stdout, stderr) = demuxer.into_output();
        assert_eq!(stdout, "one");
        assert_eq!(stderr, "two");
    }

    #[test]
    fn test_short_trailing_header_is_dropped() {
        let mut stream = frame(1, b"complete");
        stream.extend_from_slice(&[1, 0, 0]); // stream closed mid-header

        let mut demuxer = OutputDemuxer::new();
        demuxer.feed(&stream);

        let (stdout, stderr) = demuxer.into_output();
        assert_eq!(stdout, "complete");
        assert!(stderr.is_empty());
    }

    #[test]
    fn test_unknown_selector_skipped_without_desync() {
        let mut stream = Vec::new();
        stream.extend(frame(0, b"stdin echo"));
        stream.extend(frame(1, b"kept"));

        let mut demuxer = OutputDemuxer::new();
        demuxer.feed(&stream);

        let (stdout, _) = demuxer.into_output();
        assert_eq!(stdout, "kept");
    }

    #[test]
    fn test_empty_payload_frame() {
        let mut stream = Vec::new();
        stream.extend(frame(1, b""));
        stream.extend(frame(1, b"after-empty"));

        let mut demuxer = OutputDemuxer::new();
        demuxer.feed(&stream);

        let (stdout, _) = demuxer.into_output();
        assert_eq!(stdout, "after-empty");
    }

    #[test]
    fn test_binary_payloads_preserved_exactly() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let mut demuxer = OutputDemuxer::new();
        demuxer.feed(&frame(1, &payload));

        let (stdout, _) = demuxer.into_bytes();
        assert_eq!(stdout, payload);
    }

    #[tokio::test]
    async fn test_read_to_end_over_split_reads() {
        let data = frame(1, b"framed over a socket");
        let (first, second) = data.split_at(13);

        let mut reader = tokio_test::io::Builder::new()
            .read(first)
            .read(second)
            .build();

        let mut demuxer = OutputDemuxer::new();
        demuxer.read_to_end(&mut reader).await.unwrap();

        let (stdout, _) = demuxer.into_output();
        assert_eq!(stdout, "framed over a socket");
    }
}
