use std::fmt;

/// Elementary stream stream_type for H.264 video (ISO/IEC 13818-1 Table 2-34)
pub const STREAM_TYPE_H264: u8 = 0x1b;
/// Elementary stream stream_type for AAC audio in ADTS framing
pub const STREAM_TYPE_AAC: u8 = 0x0f;

/// Codec classification assigned to a payload channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecTag {
    /// H.264/AVC video
    H264,
    /// AAC audio
    AAC,
    /// Tracked but never emitted
    Unclassified,
}

impl CodecTag {
    /// Maps a PMT stream_type code to a codec tag.
    pub fn from_stream_type(stream_type: u8) -> Self {
        match stream_type {
            STREAM_TYPE_H264 => CodecTag::H264,
            STREAM_TYPE_AAC => CodecTag::AAC,
            _ => CodecTag::Unclassified,
        }
    }

    /// Whether units of this codec are ever emitted.
    pub fn is_emitted(&self) -> bool {
        !matches!(self, CodecTag::Unclassified)
    }

    /// Conventional file extension for a raw elementary stream of this codec.
    pub fn extension(&self) -> &'static str {
        match self {
            CodecTag::H264 => "h264",
            CodecTag::AAC => "aac",
            CodecTag::Unclassified => "bin",
        }
    }
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecTag::H264 => write!(f, "H264"),
            CodecTag::AAC => write!(f, "AAC"),
            CodecTag::Unclassified => write!(f, "unclassified"),
        }
    }
}

mod packet;
pub use packet::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_classification() {
        assert_eq!(CodecTag::from_stream_type(0x1b), CodecTag::H264);
        assert_eq!(CodecTag::from_stream_type(0x0f), CodecTag::AAC);
        // MPEG-2 video and HEVC are tracked but not classified
        assert_eq!(CodecTag::from_stream_type(0x02), CodecTag::Unclassified);
        assert_eq!(CodecTag::from_stream_type(0x24), CodecTag::Unclassified);
        assert!(!CodecTag::Unclassified.is_emitted());
        assert!(CodecTag::H264.is_emitted());
    }
}
