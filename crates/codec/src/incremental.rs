// Path: crates/codec/src/incremental.rs
//! Incremental compressor and decompressor builders.

use flate2::write::{GzEncoder, MultiGzDecoder};
use flate2::Compression;
use sensei_types::error::CodecError;
use sensei_types::model::CompressionMethod;
use std::io::Write;

/// Reserved headroom under `max_result_size`. `Compressor::add` refuses any
/// chunk whose worst-case growth would land inside this margin, so
/// `finish()` never returns more than the cap plus one margin.
pub const SAFETY_MARGIN: usize = 1024; // 1 KiB

/// A finished codec result, typed by the stream's `binary` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw bytes.
    Binary(Vec<u8>),
    /// UTF-8 text.
    Text(String),
}

impl Payload {
    /// The payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Binary(b) => b.len(),
            Self::Text(s) => s.len(),
        }
    }

    /// True iff the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows the payload as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Binary(b) => b.as_slice(),
            Self::Text(s) => s.as_bytes(),
        }
    }

    /// Consumes the payload into bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Binary(b) => b,
            Self::Text(s) => s.into_bytes(),
        }
    }
}

/// Worst-case output growth for feeding `len` input bytes to deflate: stored
/// blocks plus a sync-flush marker.
fn worst_case_growth(len: usize) -> usize {
    len + len / 1000 + 64
}

/// A conservative upper bound for a single `add` against a fresh codec with
/// the given cap.
pub fn max_safe_chunk_size(max_result_size: usize) -> usize {
    let budget = max_result_size.saturating_sub(SAFETY_MARGIN);
    budget.saturating_sub(budget / 1000 + 64)
}

enum EncoderState {
    Plain(Vec<u8>),
    Gzip(GzEncoder<Vec<u8>>),
}

/// An incremental compressor bounded by an optional result-size cap.
///
/// A failed `add` does not incorporate the chunk; `finish()` may still be
/// called to close the already-accumulated archive, which is how the stream
/// writer ends one frame and starts the next.
pub struct Compressor {
    inner: EncoderState,
    max_result_size: Option<usize>,
}

impl Compressor {
    /// Starts a compressor for the given method.
    pub fn start(method: CompressionMethod, max_result_size: Option<usize>) -> Self {
        let inner = match method {
            CompressionMethod::None => EncoderState::Plain(Vec::new()),
            CompressionMethod::Gzip => {
                EncoderState::Gzip(GzEncoder::new(Vec::new(), Compression::default()))
            }
        };
        Self {
            inner,
            max_result_size,
        }
    }

    /// Bytes of output accumulated so far.
    pub fn current_size(&self) -> usize {
        match &self.inner {
            EncoderState::Plain(buf) => buf.len(),
            EncoderState::Gzip(enc) => enc.get_ref().len(),
        }
    }

    /// A conservative upper bound for the next `add`, given what has already
    /// been accumulated.
    pub fn max_safe_chunk_size(&self) -> usize {
        match self.max_result_size {
            None => usize::MAX,
            Some(max) => {
                let budget = max.saturating_sub(SAFETY_MARGIN);
                let remaining = budget.saturating_sub(self.current_size());
                remaining.saturating_sub(remaining / 1000 + 64)
            }
        }
    }

    /// Feeds a chunk, returning the accumulated output size.
    ///
    /// Fails with `SizeLimitExceeded` when the potential total would cross
    /// the cap minus the safety margin; the chunk is not incorporated.
    pub fn add(&mut self, chunk: &[u8]) -> Result<usize, CodecError> {
        if let Some(max) = self.max_result_size {
            let budget = max.saturating_sub(SAFETY_MARGIN);
            let potential = self.current_size() + worst_case_growth(chunk.len());
            if potential > budget {
                return Err(CodecError::SizeLimitExceeded {
                    current: self.current_size(),
                    max,
                });
            }
        }
        match &mut self.inner {
            EncoderState::Plain(buf) => buf.extend_from_slice(chunk),
            EncoderState::Gzip(enc) => {
                enc.write_all(chunk).map_err(|e| CodecError::Io(e.to_string()))?;
                // Sync-flush so current_size reflects everything fed so far.
                enc.flush().map_err(|e| CodecError::Io(e.to_string()))?;
            }
        }
        Ok(self.current_size())
    }

    /// Closes the archive and returns it.
    pub fn finish(self) -> Result<Vec<u8>, CodecError> {
        match self.inner {
            EncoderState::Plain(buf) => Ok(buf),
            EncoderState::Gzip(enc) => enc.finish().map_err(|e| CodecError::Io(e.to_string())),
        }
    }
}

/// A byte sink that refuses to grow past its cap.
struct CapBuf {
    buf: Vec<u8>,
    cap: Option<usize>,
    overflowed: bool,
}

impl CapBuf {
    fn new(cap: Option<usize>) -> Self {
        Self {
            buf: Vec::new(),
            cap,
            overflowed: false,
        }
    }
}

impl Write for CapBuf {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        if let Some(cap) = self.cap {
            if self.buf.len() + data.len() > cap {
                self.overflowed = true;
                return Err(std::io::Error::other("decompressed size cap exceeded"));
            }
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

enum DecoderState {
    Plain(CapBuf),
    Gzip(MultiGzDecoder<CapBuf>),
}

/// An incremental decompressor bounded by an optional result-size cap.
///
/// Unlike the compressor, crossing the cap here is fatal: the whole archive
/// must be rejected. The multi-member gzip decoder carries state across
/// `add` calls, so one decompressor serves an entire chunked stream.
pub struct Decompressor {
    inner: DecoderState,
    binary: bool,
}

impl Decompressor {
    /// Starts a decompressor for the given method.
    pub fn start(method: CompressionMethod, binary: bool, max_result_size: Option<usize>) -> Self {
        let inner = match method {
            CompressionMethod::None => DecoderState::Plain(CapBuf::new(max_result_size)),
            CompressionMethod::Gzip => {
                DecoderState::Gzip(MultiGzDecoder::new(CapBuf::new(max_result_size)))
            }
        };
        Self { inner, binary }
    }

    /// Bytes of decoded output accumulated so far.
    pub fn current_size(&self) -> usize {
        match &self.inner {
            DecoderState::Plain(buf) => buf.buf.len(),
            DecoderState::Gzip(dec) => dec.get_ref().buf.len(),
        }
    }

    /// Bytes decoded since the previous `add`, as a slice of the full
    /// output starting at `from`.
    pub fn decoded_since(&self, from: usize) -> &[u8] {
        let buf = match &self.inner {
            DecoderState::Plain(buf) => &buf.buf,
            DecoderState::Gzip(dec) => &dec.get_ref().buf,
        };
        buf.get(from..).unwrap_or_default()
    }

    /// Feeds an archive chunk, returning the accumulated decoded size.
    pub fn add(&mut self, chunk: &[u8]) -> Result<usize, CodecError> {
        match &mut self.inner {
            DecoderState::Plain(buf) => {
                if buf.write_all(chunk).is_err() {
                    return Err(Self::overflow_error(buf));
                }
            }
            DecoderState::Gzip(dec) => {
                if let Err(e) = dec.write_all(chunk).and_then(|()| dec.flush()) {
                    if dec.get_ref().overflowed {
                        return Err(Self::overflow_error(dec.get_ref()));
                    }
                    return Err(CodecError::Decompression(e.to_string()));
                }
            }
        }
        Ok(self.current_size())
    }

    fn overflow_error(buf: &CapBuf) -> CodecError {
        CodecError::SizeLimitExceeded {
            current: buf.buf.len(),
            max: buf.cap.unwrap_or(usize::MAX),
        }
    }

    /// Closes the decoder and returns the decoded payload, typed by the
    /// `binary` flag.
    pub fn finish(self) -> Result<Payload, CodecError> {
        let buf = match self.inner {
            DecoderState::Plain(buf) => buf,
            DecoderState::Gzip(dec) => {
                let overflowed = dec.get_ref().overflowed;
                let current = dec.get_ref().buf.len();
                let cap = dec.get_ref().cap;
                match dec.finish() {
                    Ok(buf) => buf,
                    Err(e) => {
                        return Err(if overflowed {
                            CodecError::SizeLimitExceeded {
                                current,
                                max: cap.unwrap_or(usize::MAX),
                            }
                        } else {
                            CodecError::Decompression(e.to_string())
                        })
                    }
                }
            }
        };
        if buf.overflowed {
            return Err(Self::overflow_error(&buf));
        }
        if self.binary {
            Ok(Payload::Binary(buf.buf))
        } else {
            String::from_utf8(buf.buf)
                .map(Payload::Text)
                .map_err(|_| CodecError::InvalidUtf8)
        }
    }
}

/// One-shot decompression, used for legacy single-event compressed payloads.
pub fn decompress_all(
    data: &[u8],
    method: CompressionMethod,
    binary: bool,
    max_result_size: Option<usize>,
) -> Result<Payload, CodecError> {
    let mut decompressor = Decompressor::start(method, binary, max_result_size);
    decompressor.add(data)?;
    decompressor.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gzip_roundtrip(input: &[u8]) -> Vec<u8> {
        let mut compressor = Compressor::start(CompressionMethod::Gzip, None);
        for chunk in input.chunks(7919) {
            compressor.add(chunk).unwrap();
        }
        let archive = compressor.finish().unwrap();

        let mut decompressor = Decompressor::start(CompressionMethod::Gzip, true, None);
        decompressor.add(&archive).unwrap();
        match decompressor.finish().unwrap() {
            Payload::Binary(b) => b,
            Payload::Text(_) => panic!("binary expected"),
        }
    }

    #[test]
    fn gzip_roundtrip_arbitrary_bytes() {
        let input: Vec<u8> = (0..1024 * 1024u32).map(|i| (i * 31 % 251) as u8).collect();
        assert_eq!(gzip_roundtrip(&input), input);
    }

    #[test]
    fn gzip_roundtrip_empty() {
        assert_eq!(gzip_roundtrip(&[]), Vec::<u8>::new());
    }

    #[test]
    fn multi_member_archives_decode_across_adds() {
        // Two independently finished frames, decoded by one decompressor.
        let mut first = Compressor::start(CompressionMethod::Gzip, None);
        first.add(b"hello ").unwrap();
        let frame_a = first.finish().unwrap();

        let mut second = Compressor::start(CompressionMethod::Gzip, None);
        second.add(b"world").unwrap();
        let frame_b = second.finish().unwrap();

        let mut decompressor = Decompressor::start(CompressionMethod::Gzip, false, None);
        decompressor.add(&frame_a).unwrap();
        decompressor.add(&frame_b).unwrap();
        assert_eq!(decompressor.finish().unwrap(), Payload::Text("hello world".into()));
    }

    #[test]
    fn compressor_cap_rejects_without_incorporating() {
        let max = 8 * 1024;
        let mut compressor = Compressor::start(CompressionMethod::None, Some(max));
        compressor.add(&[0u8; 4 * 1024]).unwrap();
        let before = compressor.current_size();

        let err = compressor.add(&[0u8; 8 * 1024]).unwrap_err();
        assert!(matches!(err, CodecError::SizeLimitExceeded { .. }));
        assert_eq!(compressor.current_size(), before);

        // finish() still yields the accumulated archive.
        let archive = compressor.finish().unwrap();
        assert_eq!(archive.len(), 4 * 1024);
        assert!(archive.len() <= max + SAFETY_MARGIN);
    }

    #[test]
    fn finish_never_exceeds_cap_plus_margin() {
        // Non-repeating LCG output keeps the compression ratio near 1 so the
        // cap actually triggers.
        let mut state = 0x2545f491u64;
        let mut noise = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as u8
        };
        for max in [4 * 1024usize, 16 * 1024, 64 * 1024] {
            let mut compressor = Compressor::start(CompressionMethod::Gzip, Some(max));
            let mut fed = 0usize;
            loop {
                let chunk: Vec<u8> = (0..997).map(|_| noise()).collect();
                if compressor.add(&chunk).is_err() {
                    break;
                }
                fed += chunk.len();
                assert!(fed < 16 * 1024 * 1024, "cap never triggered");
            }
            let archive = compressor.finish().unwrap();
            assert!(archive.len() <= max + SAFETY_MARGIN);
        }
    }

    #[test]
    fn max_safe_chunk_size_is_accepted() {
        let max = 32 * 1024;
        let mut compressor = Compressor::start(CompressionMethod::Gzip, Some(max));
        let safe = compressor.max_safe_chunk_size();
        assert!(safe > 0 && safe < max);
        compressor.add(&vec![0u8; safe]).unwrap();
    }

    #[test]
    fn decompression_bomb_is_rejected() {
        // 1 MiB of 'A' compresses to ~1 KiB.
        let mut compressor = Compressor::start(CompressionMethod::Gzip, None);
        compressor.add(&vec![b'A'; 1024 * 1024]).unwrap();
        let archive = compressor.finish().unwrap();
        assert!(archive.len() < 8 * 1024);

        let mut decompressor =
            Decompressor::start(CompressionMethod::Gzip, true, Some(100 * 1024));
        let err = match decompressor.add(&archive) {
            Err(e) => e,
            Ok(_) => decompressor.finish().unwrap_err(),
        };
        assert!(matches!(err, CodecError::SizeLimitExceeded { .. }));
    }

    #[test]
    fn decompressor_rejects_garbage() {
        let mut decompressor = Decompressor::start(CompressionMethod::Gzip, true, None);
        let result = decompressor
            .add(b"definitely not gzip")
            .and_then(|_| decompressor.finish().map(|_| 0));
        assert!(matches!(result, Err(CodecError::Decompression(_))));
    }

    #[test]
    fn text_mode_rejects_invalid_utf8() {
        let mut compressor = Compressor::start(CompressionMethod::Gzip, None);
        compressor.add(&[0xff, 0xfe, 0xfd]).unwrap();
        let archive = compressor.finish().unwrap();

        let mut decompressor = Decompressor::start(CompressionMethod::Gzip, false, None);
        decompressor.add(&archive).unwrap();
        assert!(matches!(decompressor.finish(), Err(CodecError::InvalidUtf8)));
    }

    #[test]
    fn passthrough_respects_binary_flag() {
        let mut decompressor = Decompressor::start(CompressionMethod::None, false, None);
        decompressor.add("plain text".as_bytes()).unwrap();
        assert_eq!(decompressor.finish().unwrap(), Payload::Text("plain text".into()));
    }

    #[test]
    fn decoded_since_exposes_incremental_output() {
        let mut decompressor = Decompressor::start(CompressionMethod::None, true, None);
        decompressor.add(b"abc").unwrap();
        let mark = decompressor.current_size();
        decompressor.add(b"def").unwrap();
        assert_eq!(decompressor.decoded_since(mark), b"def");
    }
}
