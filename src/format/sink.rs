use crate::av::{CodecTag, OutputUnit};
use crate::error::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Destination for reassembled units
#[async_trait::async_trait]
pub trait UnitSink: Send {
    /// Write one unit. Units arrive in stream order.
    async fn write_unit(&mut self, unit: &OutputUnit) -> Result<()>;

    /// Flush and release anything the sink holds
    async fn finish(&mut self) -> Result<()>;
}

/// Collects units in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub units: Vec<OutputUnit>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UnitSink for MemorySink {
    async fn write_unit(&mut self, unit: &OutputUnit) -> Result<()> {
        self.units.push(unit.clone());
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// How a [`FileSink`] lays units out on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLayout {
    /// One raw elementary stream per codec, `<stem>.h264` / `<stem>.aac`
    PerCodec,
    /// One file per unit, `<index>.<ext>`, numbered from 0 in stream order
    PerUnit,
}

/// Writes units as raw elementary stream files under a directory
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    stem: String,
    layout: FileLayout,
    files: HashMap<CodecTag, File>,
    written: u64,
}

impl FileSink {
    /// Creates `dir` if needed and writes per-codec files named `<stem>.<ext>`.
    pub async fn per_codec<P: AsRef<Path>>(dir: P, stem: &str) -> Result<Self> {
        Self::create(dir.as_ref(), stem, FileLayout::PerCodec).await
    }

    /// Creates `dir` if needed and writes each unit to its own file.
    pub async fn per_unit<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::create(dir.as_ref(), "", FileLayout::PerUnit).await
    }

    async fn create(dir: &Path, stem: &str, layout: FileLayout) -> Result<Self> {
        fs::create_dir_all(dir).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            stem: stem.to_string(),
            layout,
            files: HashMap::new(),
            written: 0,
        })
    }

    pub fn layout(&self) -> FileLayout {
        self.layout
    }

    /// Units written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Path of the per-codec file for `codec`.
    pub fn codec_path(&self, codec: CodecTag) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, codec.extension()))
    }

    /// Path of the per-unit file for the unit at `index`.
    pub fn unit_path(&self, index: u64, codec: CodecTag) -> PathBuf {
        self.dir.join(format!("{}.{}", index, codec.extension()))
    }
}

#[async_trait::async_trait]
impl UnitSink for FileSink {
    async fn write_unit(&mut self, unit: &OutputUnit) -> Result<()> {
        match self.layout {
            FileLayout::PerCodec => {
                if !self.files.contains_key(&unit.codec) {
                    let path = self.codec_path(unit.codec);
                    log::info!("writing {} stream to {}", unit.codec, path.display());
                    let file = File::create(&path).await?;
                    self.files.insert(unit.codec, file);
                }
                if let Some(file) = self.files.get_mut(&unit.codec) {
                    file.write_all(&unit.data).await?;
                }
            }
            FileLayout::PerUnit => {
                let path = self.unit_path(self.written, unit.codec);
                fs::write(&path, &unit.data).await?;
            }
        }
        self.written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        for file in self.files.values_mut() {
            file.flush().await?;
            file.sync_all().await?;
        }
        self.files.clear();
        log::debug!("file sink finished after {} units", self.written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tsdemux-sink-{}-{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.write_unit(&OutputUnit::new(CodecTag::AAC, vec![1, 2]))
            .await
            .unwrap();
        sink.finish().await.unwrap();
        assert_eq!(sink.units.len(), 1);
        assert!(sink.finished);
    }

    #[tokio::test]
    async fn test_per_codec_files() {
        let dir = test_dir("codec");
        let mut sink = FileSink::per_codec(&dir, "out").await.unwrap();
        sink.write_unit(&OutputUnit::new(CodecTag::H264, vec![1, 2, 3]))
            .await
            .unwrap();
        sink.write_unit(&OutputUnit::new(CodecTag::AAC, vec![9]))
            .await
            .unwrap();
        sink.write_unit(&OutputUnit::new(CodecTag::H264, vec![4, 5]))
            .await
            .unwrap();
        sink.finish().await.unwrap();

        assert_eq!(sink.written(), 3);
        let video = fs::read(dir.join("out.h264")).await.unwrap();
        assert_eq!(video, vec![1, 2, 3, 4, 5]);
        let audio = fs::read(dir.join("out.aac")).await.unwrap();
        assert_eq!(audio, vec![9]);
        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_per_unit_files() {
        let dir = test_dir("unit");
        let mut sink = FileSink::per_unit(&dir).await.unwrap();
        sink.write_unit(&OutputUnit::new(CodecTag::H264, vec![1]))
            .await
            .unwrap();
        sink.write_unit(&OutputUnit::new(CodecTag::AAC, vec![2, 2]))
            .await
            .unwrap();
        sink.finish().await.unwrap();

        assert_eq!(fs::read(dir.join("0.h264")).await.unwrap(), vec![1]);
        assert_eq!(fs::read(dir.join("1.aac")).await.unwrap(), vec![2, 2]);
        let _ = fs::remove_dir_all(&dir).await;
    }
}
