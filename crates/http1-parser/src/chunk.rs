//! Chunk-size + chunk-extension + last-chunk discriminator.
//!
//! ```text
//! chunk-metadata = 1*12 HEXDIG *( BWS ";" BWS chunk-ext-name [ BWS "=" BWS chunk-ext-val ] ) CRLF
//! ```

use ring_channel::{find_first_non_field_char, find_first_non_hex_digit, DataSink, DataSource, IOChannel, NotificationSink, SimdIterator};

const MAX_CHUNK_SIZE_DIGITS: usize = 12;

#[derive(Debug, PartialEq, Eq)]
pub enum ChunkMetadataStatus {
    ExpectingChunkData { chunk_data_size: u64, chunk_metadata_size: usize },
    /// Valid only when `chunk_data_size` was zero and no trailers follow;
    /// `chunk_metadata_size` includes the trailing `"\r\n\r\n"`.
    ParsedRequest { chunk_metadata_size: usize },
    ExpectingTrailer,
    NeedsMoreData,
    Failed(&'static str),
}

/// Parses chunk metadata starting at `offset` bytes into the channel's
/// read buffer. Never consumes anything; the caller advances past
/// `chunk_metadata_size` once it commits to the result.
pub fn parse_chunk_metadata<D, K, N>(channel: &IOChannel<D, K, N>, offset: usize) -> ChunkMetadataStatus
where
    D: DataSource,
    K: DataSink,
    N: NotificationSink,
{
    let available = channel.data_available();
    if offset >= available {
        return ChunkMetadataStatus::NeedsMoreData;
    }

    let iter = SimdIterator::new(channel);
    let digit_window = iter.next_at(offset);
    let avail_in_window = (available - offset).min(32);
    let digit_count = match find_first_non_hex_digit(&digit_window) {
        Some(p) if p < avail_in_window => p,
        _ => {
            // No terminator visible yet within the data we actually have.
            if avail_in_window > MAX_CHUNK_SIZE_DIGITS {
                return ChunkMetadataStatus::Failed("chunk size exceeds 12 hex digits");
            }
            return ChunkMetadataStatus::NeedsMoreData;
        }
    };
    if digit_count == 0 {
        return ChunkMetadataStatus::Failed("chunk metadata missing hex size digits");
    }
    if digit_count > MAX_CHUNK_SIZE_DIGITS {
        return ChunkMetadataStatus::Failed("chunk size exceeds 12 hex digits");
    }

    let chunk_size = match std::str::from_utf8(&digit_window[..digit_count])
        .ok()
        .and_then(|s| u64::from_str_radix(s, 16).ok())
    {
        Some(n) => n,
        None => return ChunkMetadataStatus::Failed("chunk size is not a valid hex number"),
    };

    let ext_start = offset + digit_count;
    if ext_start >= available {
        return ChunkMetadataStatus::NeedsMoreData;
    }
    let ext_window = iter.next_at(ext_start);
    let avail_in_ext_window = (available - ext_start).min(32);
    let cr_pos = match find_first_non_field_char(&ext_window) {
        Some(p) if p < avail_in_ext_window => p,
        _ => return ChunkMetadataStatus::NeedsMoreData,
    };
    if ext_window[cr_pos] != b'\r' {
        return ChunkMetadataStatus::Failed("illegal control character in chunk extension");
    }
    let lf_index = ext_start + cr_pos + 1;
    if lf_index >= available {
        return ChunkMetadataStatus::NeedsMoreData;
    }
    if channel.peek_char(lf_index) != b'\n' {
        return ChunkMetadataStatus::Failed("chunk metadata CR not followed by LF");
    }
    let crlf_end = lf_index + 1;
    let chunk_metadata_size = crlf_end - offset;

    if chunk_size > 0 {
        return ChunkMetadataStatus::ExpectingChunkData { chunk_data_size: chunk_size, chunk_metadata_size };
    }

    if available - crlf_end < 2 {
        return ChunkMetadataStatus::NeedsMoreData;
    }
    if channel.peek_char(crlf_end) == b'\r' && channel.peek_char(crlf_end + 1) == b'\n' {
        ChunkMetadataStatus::ParsedRequest { chunk_metadata_size: chunk_metadata_size + 2 }
    } else {
        ChunkMetadataStatus::ExpectingTrailer
    }
}
