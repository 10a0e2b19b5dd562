//! Pack stream encoder. Emits non-delta entries only: every object is framed with its own
//! pack-entry header and sent zlib-compressed, which is always a valid pack even though it
//! forgoes the size savings of ofs-delta/ref-delta compression.

use std::io::Write;

use flate2::{Compression, write::ZlibEncoder};
use tokio::sync::mpsc;

use crate::{errors::GitError, internal::pack::entry::Entry, utils::HashAlgorithm};

pub struct PackEncoder {
    object_count: usize,
    window_size: usize,
    sender: mpsc::Sender<Vec<u8>>,
    hash: HashAlgorithm,
}

impl PackEncoder {
    /// `window_size` is accepted for interface parity with delta-aware encoders; this
    /// implementation does not build a delta window and always emits base objects.
    pub fn new(object_count: usize, window_size: usize, sender: mpsc::Sender<Vec<u8>>) -> Self {
        PackEncoder {
            object_count,
            window_size,
            sender,
            hash: HashAlgorithm::new(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    async fn send(&mut self, data: Vec<u8>) -> Result<(), GitError> {
        self.hash.update(&data);
        self.sender.send(data).await.map_err(|e| {
            GitError::IOError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("pack encoder channel closed: {e}"),
            ))
        })
    }

    async fn write_header(&mut self) -> Result<(), GitError> {
        let mut header = Vec::with_capacity(12);
        header.extend_from_slice(b"PACK");
        header.extend_from_slice(&2u32.to_be_bytes());
        header.extend_from_slice(&(self.object_count as u32).to_be_bytes());
        self.send(header).await
    }

    fn frame_entry(entry: &Entry) -> Result<Vec<u8>, GitError> {
        let type_code = entry.obj_type.to_pack_type_u8()?;
        let mut out = Vec::new();
        let mut size = entry.data.len();
        let mut first = (type_code << 4) | (size as u8 & 0x0f);
        size >>= 4;
        if size > 0 {
            first |= 0x80;
        }
        out.push(first);
        while size > 0 {
            let mut byte = (size & 0x7f) as u8;
            size >>= 7;
            if size > 0 {
                byte |= 0x80;
            }
            out.push(byte);
        }

        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(&entry.data)?;
        out.extend(zlib.finish()?);
        Ok(out)
    }

    /// Consume entries from `entry_rx` until the channel closes, streaming a complete pack
    /// (header, one frame per entry, trailer hash) to the encoder's output channel.
    pub async fn encode(&mut self, mut entry_rx: mpsc::Receiver<Entry>) -> Result<(), GitError> {
        self.write_header().await?;

        while let Some(entry) = entry_rx.recv().await {
            let framed = Self::frame_entry(&entry)?;
            self.send(framed).await?;
        }

        let trailer = self.hash.clone().finalize();
        self.sender.send(trailer).await.map_err(|e| {
            GitError::IOError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("pack encoder channel closed before trailer: {e}"),
            ))
        })?;
        Ok(())
    }
}
