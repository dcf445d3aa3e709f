use super::CodecTag;
use bytes::Bytes;

/// One reassembled elementary stream unit (the payload of a PES packet).
#[derive(Debug, Clone, PartialEq)]
pub struct OutputUnit {
    pub codec: CodecTag,
    pub data: Bytes,
    /// Channel the unit was carried on
    pub pid: u16,
    /// PES stream_id, informational
    pub stream_id: u8,
    /// Presentation timestamp in 90 kHz ticks, when the header carried one
    pub pts: Option<u64>,
    /// Decode timestamp in 90 kHz ticks
    pub dts: Option<u64>,
}

impl OutputUnit {
    pub fn new(codec: CodecTag, data: impl Into<Bytes>) -> Self {
        Self {
            codec,
            data: data.into(),
            pid: 0,
            stream_id: 0,
            pts: None,
            dts: None,
        }
    }

    pub fn with_pid(mut self, pid: u16) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_stream_id(mut self, stream_id: u8) -> Self {
        self.stream_id = stream_id;
        self
    }

    pub fn with_pts(mut self, pts: Option<u64>) -> Self {
        self.pts = pts;
        self
    }

    pub fn with_dts(mut self, dts: Option<u64>) -> Self {
        self.dts = dts;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
