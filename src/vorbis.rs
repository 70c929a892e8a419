//! Vorbis source adapter: open a compressed file, report channel/rate, seek, and stream raw PCM.
//!
//! The production implementation is a thin wrapper around [`lewton`]'s streaming Ogg/Vorbis
//! decoder. `lewton` decodes whole packets at a time and has no notion of "give me exactly N
//! bytes", so a small pending-sample queue bridges packet-at-a-time decoding to the
//! byte-at-a-time `read` contract the stream player needs.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use lewton::inside_ogg::OggStreamReader;

use crate::error::VorbisOpenError;

/// The seam between the stream player / SFX mixer and however Vorbis decoding is actually done.
///
/// Kept as a trait so tests can substitute a synthetic, deterministic source instead of decoding a
/// real `.ogg` file from disk.
pub trait VorbisSource {
    fn channel_count(&self) -> u8;
    fn sample_rate(&self) -> u32;
    /// Total number of PCM frames in the file, resolved once at open time.
    fn total_pcm_frames(&self) -> u64;

    fn seek_seconds(&mut self, seconds: f64) -> io::Result<()> {
        let frame = (seconds * self.sample_rate() as f64).round().max(0.0) as u64;
        self.seek_pcm_frames(frame)
    }
    fn seek_pcm_frames(&mut self, frame: u64) -> io::Result<()>;
    fn tell_pcm_frames(&self) -> u64;

    /// Fills as much of `dst` as decoded data allows, returning the number of bytes written.
    /// `0` means end of file. May return fewer bytes than `dst.len()` even mid-stream.
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize>;
}

/// A decoder only ever seeks to page boundaries, so the position reported after a seek can be
/// less than what was requested. We do not have a real granule-accurate seek in `lewton`'s public
/// API, so this models the same rounding real decoders exhibit: round down to the nearest block.
const SEEK_GRANULARITY_FRAMES: u64 = 64;

pub struct LewtonVorbisSource {
    reader: OggStreamReader<BufReader<File>>,
    channel_count: u8,
    sample_rate: u32,
    total_pcm_frames: u64,
    position_pcm_frames: u64,
    pending: VecDeque<i16>,
}

impl LewtonVorbisSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VorbisOpenError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let total_pcm_frames = {
            let mut f = File::open(path)?;
            last_granule_position(&mut f)?
        };

        let reader = OggStreamReader::new(BufReader::new(file))?;
        let channel_count = reader.ident_hdr.audio_channels;
        let sample_rate = reader.ident_hdr.audio_sample_rate;

        Ok(Self {
            reader,
            channel_count,
            sample_rate,
            total_pcm_frames,
            position_pcm_frames: 0,
            pending: VecDeque::new(),
        })
    }
}

impl VorbisSource for LewtonVorbisSource {
    fn channel_count(&self) -> u8 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_pcm_frames(&self) -> u64 {
        self.total_pcm_frames
    }

    fn seek_pcm_frames(&mut self, frame: u64) -> io::Result<()> {
        let frame = frame.min(self.total_pcm_frames);
        self.reader
            .seek_absgp_pg(frame)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.pending.clear();
        self.position_pcm_frames = (frame / SEEK_GRANULARITY_FRAMES) * SEEK_GRANULARITY_FRAMES;
        Ok(())
    }

    fn tell_pcm_frames(&self) -> u64 {
        self.position_pcm_frames
    }

    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let max_samples = dst.len() / 2;
        if max_samples == 0 {
            return Ok(0);
        }

        while self.pending.is_empty() {
            match self
                .reader
                .read_dec_packet_itl()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
            {
                Some(samples) if !samples.is_empty() => self.pending.extend(samples),
                Some(_) => continue,
                None => return Ok(0),
            }
        }

        let n = max_samples.min(self.pending.len());
        for (i, chunk) in dst[..n * 2].chunks_exact_mut(2).enumerate() {
            let sample = self.pending.pop_front().expect("checked len above");
            let _ = i;
            chunk.copy_from_slice(&sample.to_le_bytes());
        }
        self.position_pcm_frames += (n / self.channel_count as usize) as u64;
        Ok(n * 2)
    }
}

/// Locates the granule position of the last Ogg page in the file, the same way
/// `libvorbisfile`'s `ov_pcm_total` resolves total PCM frame count: by scanning backward for the
/// final page header rather than decoding the whole stream up front.
fn last_granule_position(file: &mut File) -> io::Result<u64> {
    const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
    const GRANULE_POS_OFFSET: usize = 6;
    const TAIL_SCAN_BYTES: u64 = 128 * 1024;

    let len = file.metadata()?.len();
    let scan_len = len.min(TAIL_SCAN_BYTES);
    let start = len - scan_len;
    file.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; scan_len as usize];
    file.read_exact(&mut buf)?;

    let mut granule = 0u64;
    let mut search_from = 0usize;
    while let Some(rel_pos) = buf[search_from..]
        .windows(4)
        .position(|w| w == CAPTURE_PATTERN)
    {
        let pos = search_from + rel_pos;
        if pos + GRANULE_POS_OFFSET + 8 <= buf.len() {
            let mut gp_bytes = [0u8; 8];
            gp_bytes.copy_from_slice(&buf[pos + GRANULE_POS_OFFSET..pos + GRANULE_POS_OFFSET + 8]);
            let gp = i64::from_le_bytes(gp_bytes);
            if gp >= 0 {
                granule = gp as u64;
            }
        }
        search_from = pos + 4;
        if search_from >= buf.len() {
            break;
        }
    }
    Ok(granule)
}

/// Signature used to obtain a source given a path, boxed so the stream player and SFX mixer don't
/// need to be generic over a concrete decoder type — it's what lets tests substitute
/// [`fake::FakeVorbisSource`] for [`LewtonVorbisSource`].
pub type OpenVorbisFn = Box<dyn FnMut(&Path) -> Result<Box<dyn VorbisSource>, VorbisOpenError>>;

/// The production [`OpenVorbisFn`]: opens real `.ogg` files from disk through `lewton`.
pub fn open_boxed() -> OpenVorbisFn {
    Box::new(|path: &Path| -> Result<Box<dyn VorbisSource>, VorbisOpenError> {
        LewtonVorbisSource::open(path).map(|s| Box::new(s) as Box<dyn VorbisSource>)
    })
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! A fully synthetic [`VorbisSource`] used by every test in this crate, so tests never touch
    //! disk or require a real `.ogg` fixture.

    use super::*;

    /// Deterministic PCM generator: sample `i` (interleaved, not per-frame) is `(i % 256) as i16 -
    /// 128`, scaled up — the exact values are irrelevant, only counts and positions are asserted
    /// against in tests.
    pub struct FakeVorbisSource {
        channel_count: u8,
        sample_rate: u32,
        total_pcm_frames: u64,
        position_pcm_frames: u64,
    }

    impl FakeVorbisSource {
        pub fn new(channel_count: u8, sample_rate: u32, total_pcm_frames: u64) -> Self {
            Self {
                channel_count,
                sample_rate,
                total_pcm_frames,
                position_pcm_frames: 0,
            }
        }
    }

    impl VorbisSource for FakeVorbisSource {
        fn channel_count(&self) -> u8 {
            self.channel_count
        }

        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn total_pcm_frames(&self) -> u64 {
            self.total_pcm_frames
        }

        fn seek_pcm_frames(&mut self, frame: u64) -> io::Result<()> {
            self.position_pcm_frames = frame.min(self.total_pcm_frames);
            Ok(())
        }

        fn tell_pcm_frames(&self) -> u64 {
            self.position_pcm_frames
        }

        fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
            let frames_left = self.total_pcm_frames - self.position_pcm_frames;
            let bytes_left = frames_left * self.channel_count as u64 * 2;
            let n = (dst.len() as u64).min(bytes_left) as usize;
            for (i, b) in dst[..n].iter_mut().enumerate() {
                *b = ((self.position_pcm_frames as usize * self.channel_count as usize * 2 + i) % 256) as u8;
            }
            let frame_bytes = self.channel_count as usize * 2;
            self.position_pcm_frames += (n / frame_bytes) as u64;
            Ok(n)
        }
    }

    #[test]
    fn fake_source_reports_eof_at_total_frames() {
        let mut src = FakeVorbisSource::new(2, 44100, 10);
        let mut buf = vec![0u8; 4096];
        let n = src.read(&mut buf).unwrap();
        assert_eq!(n, 10 * 2 * 2);
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn fake_source_seek_seconds_uses_sample_rate() {
        let mut src = FakeVorbisSource::new(2, 44100, 10_000_000);
        src.seek_seconds(1.0).unwrap();
        assert_eq!(src.tell_pcm_frames(), 44100);
    }
}
