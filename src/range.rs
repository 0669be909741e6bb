//! Length hiding: spreading a message over records whose sizes only reveal
//! a range of possible lengths.
//!
//! The caller states that the true length lies in `[low, high]`. The range is
//! split into per-record ranges; each record carries some real data and is
//! padded up to the high end of its range, so the sequence of record sizes is
//! the same for every length in the original range.

use log::trace;

use crate::crypto::CipherType;
use crate::error::{Error, Result};
use crate::record::ContentType;
use crate::session::Session;
use crate::tls::constants::{CBC_PAD_LENGTH_FIELD, EXTRA_PAD_LENGTH_FIELD, MAX_PAD_SIZE};
use crate::transport::Transport;

/// A closed interval of plaintext lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub low: usize,
    pub high: usize,
}

impl Range {
    pub fn new(low: usize, high: usize) -> Self {
        Self { low, high }
    }

    /// A range that hides nothing.
    pub fn exact(len: usize) -> Self {
        Self::new(len, len)
    }

    pub fn is_exact(&self) -> bool {
        self.low == self.high
    }

    pub fn contains(&self, len: usize) -> bool {
        self.low <= len && len <= self.high
    }
}

/// What the write side's protection allows in the way of padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingProfile {
    pub cipher_type: CipherType,
    pub block_size: usize,
    pub tag_len: usize,
    /// The extra-padding extension is in use
    pub extra_padding: bool,
}

// Padding one record has room for before block alignment
fn pad_room(profile: &PaddingProfile, data_len: usize, max_fragment: usize) -> usize {
    let max_pad = if profile.extra_padding { max_fragment } else { MAX_PAD_SIZE };
    max_pad.min(max_fragment.saturating_sub(data_len))
}

/// Largest padding one record can add to `data_len` real bytes.
///
/// For block ciphers the pad is trimmed so the encrypted body ends on a block
/// boundary, unless the overflow exceeds the pad itself.
pub fn max_lh_pad(profile: &PaddingProfile, data_len: usize, max_fragment: usize) -> usize {
    let fixed_pad = if profile.extra_padding {
        EXTRA_PAD_LENGTH_FIELD
    } else {
        CBC_PAD_LENGTH_FIELD
    };

    let this_pad = pad_room(profile, data_len, max_fragment);

    match profile.cipher_type {
        CipherType::Stream => this_pad,
        CipherType::Block => {
            let overflow = (data_len + this_pad + profile.tag_len + fixed_pad) % profile.block_size;
            if overflow > this_pad {
                this_pad
            } else {
                this_pad - overflow
            }
        }
    }
}

/// Splits off the range the next record covers. Returns `(record, remainder)`;
/// repeat on the remainder until it is `[0, 0]`.
pub fn split_range(profile: &PaddingProfile, range: Range, max_fragment: usize) -> (Range, Range) {
    if range.is_exact() {
        let len = range.high.min(max_fragment);
        let rem = range.high - len;
        return (Range::exact(len), Range::exact(rem));
    }

    if range.low >= max_fragment {
        return (
            Range::exact(max_fragment),
            Range::new(range.low - max_fragment, range.high - max_fragment),
        );
    }

    let mut pad = max_lh_pad(profile, range.low, max_fragment);
    if pad == 0 && range.low == 0 {
        // Alignment ate the whole pad of an empty record: take the unaligned
        // room, which the codec rounds up, so the remainder still shrinks
        pad = pad_room(profile, 0, max_fragment);
    }
    let pad = pad.min(range.high - range.low);

    (
        Range::new(range.low, range.low + pad),
        Range::new(0, range.high - (range.low + pad)),
    )
}

impl<T: Transport> Session<T> {
    /// Whether records written now can carry length-hiding padding.
    pub fn can_use_length_hiding(&self) -> bool {
        if self.config.extra_padding {
            return true;
        }

        if self.version.is_legacy() {
            return false;
        }

        self.write_codec.padding_profile().cipher_type == CipherType::Block
    }

    /// Sends `data` as application records whose sizes only reveal that its
    /// length lies in `range`. Returns the number of bytes sent.
    pub fn send_range(&mut self, data: &[u8], range: Range) -> Result<usize> {
        if range.low > range.high || !range.contains(data.len()) {
            return Err(Error::InvalidRequest(format!(
                "Data length {} is outside the range ({}, {})",
                data.len(),
                range.low,
                range.high
            )));
        }

        if !range.is_exact() && !self.can_use_length_hiding() {
            return Err(Error::InvalidRequest(
                "Length hiding is not available with the current cipher".to_string(),
            ));
        }

        let profile = self.write_codec.padding_profile();
        let max_fragment = self.config.max_fragment_size;

        trace!(
            "Preparing message of {} bytes, range ({}, {})",
            data.len(),
            range.low,
            range.high
        );

        let mut sent = 0;
        let mut remaining = data.len();
        let mut current = range;

        while current.high != 0 {
            let (record, next) = split_range(&profile, current, max_fragment);
            let fragment_len = record.high.min(remaining.saturating_sub(next.low));

            trace!(
                "Next fragment {} bytes ({}, {}); remaining range ({}, {})",
                fragment_len,
                record.low,
                record.high,
                next.low,
                next.high
            );

            let written = self.write_record(
                ContentType::ApplicationData,
                &data[sent..sent + fragment_len],
                record.high,
            )?;
            if written != fragment_len {
                return Err(Error::InternalError(format!(
                    "Sent {} bytes of a {} byte fragment",
                    written, fragment_len
                )));
            }

            sent += fragment_len;
            remaining -= fragment_len;
            current = next;
        }

        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CBC_SHA1: PaddingProfile = PaddingProfile {
        cipher_type: CipherType::Block,
        block_size: 16,
        tag_len: 20,
        extra_padding: false,
    };

    const STREAM_SHA1: PaddingProfile = PaddingProfile {
        cipher_type: CipherType::Stream,
        block_size: 1,
        tag_len: 20,
        extra_padding: false,
    };

    #[test]
    fn test_max_pad_block_alignment() {
        // 0 + 255 + 20 + 1 = 276, 276 % 16 = 4
        assert_eq!(max_lh_pad(&CBC_SHA1, 0, 16384), 251);
        assert_eq!((0 + 251 + 20 + 1) % 16, 0);

        // 100 + 255 + 20 + 1 = 376, 376 % 16 = 8
        assert_eq!(max_lh_pad(&CBC_SHA1, 100, 16384), 247);
    }

    #[test]
    fn test_max_pad_limited_by_fragment_room() {
        assert_eq!(max_lh_pad(&STREAM_SHA1, 16380, 16384), 4);
        assert_eq!(max_lh_pad(&STREAM_SHA1, 16384, 16384), 0);

        // 16380 + 4 + 20 + 1 = 16405, 16405 % 16 = 5 > 4: kept as is
        assert_eq!(max_lh_pad(&CBC_SHA1, 16380, 16384), 4);
    }

    #[test]
    fn test_max_pad_trimmed_when_overflow_equals_pad() {
        // 16379 + 5 + 20 + 1 = 16405, 16405 % 16 = 5 == 5: trimmed to the boundary
        assert_eq!(max_lh_pad(&CBC_SHA1, 16379, 16384), 0);
        assert_eq!((16379 + 0 + 20 + 1) % 16, 0);

        // 0 + 5 + 15 + 1 = 21, overflow 5 == 5
        let profile = PaddingProfile { tag_len: 15, ..CBC_SHA1 };
        assert_eq!(max_lh_pad(&profile, 0, 5), 0);

        // 0 + 5 + 16 + 1 = 22: overflow 6 > 5, kept
        let profile = PaddingProfile { tag_len: 16, ..CBC_SHA1 };
        assert_eq!(max_lh_pad(&profile, 0, 5), 5);
    }

    #[test]
    fn test_split_advances_when_alignment_leaves_no_pad() {
        let profile = PaddingProfile { tag_len: 15, ..CBC_SHA1 };
        let (record, rem) = split_range(&profile, Range::new(0, 100), 5);
        assert_eq!(record, Range::new(0, 5));
        assert_eq!(rem, Range::new(0, 95));

        // A non-empty low bound still makes progress with a zero pad
        let (record, rem) = split_range(&CBC_SHA1, Range::new(16379, 20000), 16384);
        assert_eq!(record, Range::exact(16379));
        assert_eq!(rem, Range::new(0, 3621));
    }

    #[test]
    fn test_extra_padding_extension_pads_whole_fragment() {
        let profile = PaddingProfile {
            extra_padding: true,
            ..STREAM_SHA1
        };
        assert_eq!(max_lh_pad(&profile, 1000, 16384), 15384);
    }

    #[test]
    fn test_split_exact_range() {
        let (record, rem) = split_range(&CBC_SHA1, Range::exact(40000), 16384);
        assert_eq!(record, Range::exact(16384));
        assert_eq!(rem, Range::exact(23616));

        let (record, rem) = split_range(&CBC_SHA1, Range::exact(10), 16384);
        assert_eq!(record, Range::exact(10));
        assert_eq!(rem, Range::exact(0));
    }

    #[test]
    fn test_split_large_low_bound() {
        let (record, rem) = split_range(&CBC_SHA1, Range::new(20000, 30000), 16384);
        assert_eq!(record, Range::exact(16384));
        assert_eq!(rem, Range::new(3616, 13616));
    }

    #[test]
    fn test_split_pads_and_collapses_low_bound() {
        let (record, rem) = split_range(&CBC_SHA1, Range::new(100, 1000), 16384);
        assert_eq!(record, Range::new(100, 347));
        assert_eq!(rem, Range::new(0, 653));

        // Pad clamped to the width of the range
        let (record, rem) = split_range(&CBC_SHA1, Range::new(100, 110), 16384);
        assert_eq!(record, Range::new(100, 110));
        assert_eq!(rem, Range::new(0, 0));
    }

    #[test]
    fn test_repeated_splits_terminate_and_cover_range() {
        let profiles = [
            CBC_SHA1,
            STREAM_SHA1,
            PaddingProfile { tag_len: 15, ..CBC_SHA1 },
            PaddingProfile { extra_padding: true, ..CBC_SHA1 },
        ];

        for profile in &profiles {
            for &max_fragment in &[1usize, 5, 16, 300, 16384] {
                for &(low, high) in &[(0, 0), (0, 1), (7, 7), (0, 5000), (123, 40000), (16384, 16400), (50000, 50001)] {
                    let mut current = Range::new(low, high);
                    let mut total = 0;
                    let mut steps = 0;

                    while current.high != 0 {
                        let (record, next) = split_range(profile, current, max_fragment);
                        assert!(record.high <= max_fragment);
                        total += record.high;
                        current = next;
                        steps += 1;
                        assert!(steps <= high + 1, "no progress for {:?} ({}, {})", profile, low, high);
                    }

                    assert!(low <= total && total <= high, "({}, {}) produced {}", low, high, total);
                }
            }
        }
    }
}
