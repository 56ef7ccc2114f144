use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::TransferError;
use crate::types::Chunk;

/// Reads a file as a sequence of numbered chunks.
///
/// The sequence is lazy and single-pass: each [`open`](Self::open) starts
/// again from the first byte. Dropping the reader early closes the file.
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: u32,
    next_seq: u32,
    file_size: u64,
    remaining: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    pub async fn open(path: &Path, chunk_size: u32) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::EmptyInput);
        }
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        Ok(Self {
            file,
            chunk_size,
            next_seq: 0,
            file_size,
            remaining: file_size,
        })
    }

    /// Reads the next chunk. Returns `None` after the last one.
    ///
    /// A file that shrinks while being read fails with an
    /// `UnexpectedEof` I/O error.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let len = self.remaining.min(u64::from(self.chunk_size)) as usize;
        let mut payload = vec![0u8; len];
        self.file.read_exact(&mut payload).await?;

        let chunk = Chunk {
            sequence: self.next_seq,
            payload,
        };
        self.next_seq += 1;
        self.remaining -= len as u64;
        Ok(Some(chunk))
    }

    /// File size observed when the reader was opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    async fn read_all(path: &Path, chunk_size: u32) -> Vec<Chunk> {
        let mut reader = ChunkReader::open(path, chunk_size).await.unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn reads_all_chunks_in_order() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.file_size(), 10);

        let c1 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c1.sequence, 0);
        assert_eq!(&c1.payload, b"AABB");

        let c2 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c2.sequence, 1);
        assert_eq!(&c2.payload, b"CCDD");

        let c3 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c3.sequence, 2);
        assert_eq!(&c3.payload, b"EE");

        assert!(reader.next_chunk().await.unwrap().is_none());
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn thousand_bytes_at_180() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let path = create_test_file(dir.path(), "prompt.wav", &data);

        let chunks = read_all(&path, 180).await;
        assert_eq!(chunks.len(), 6);
        assert!(chunks[..5].iter().all(|c| c.payload.len() == 180));
        assert_eq!(chunks[5].payload.len(), 100);

        let seqs: Vec<u32> = chunks.iter().map(|c| c.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5]);

        let joined: Vec<u8> = chunks.into_iter().flat_map(|c| c.payload).collect();
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn sequences_are_contiguous_for_many_sizes() {
        let dir = TempDir::new().unwrap();
        for size in [1usize, 179, 180, 181, 999, 2048] {
            let data = vec![0x5au8; size];
            let path = create_test_file(dir.path(), "f.bin", &data);
            let chunks = read_all(&path, 180).await;

            assert_eq!(chunks.len(), size.div_ceil(180));
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.sequence as usize, i);
            }
            let total: usize = chunks.iter().map(|c| c.payload.len()).sum();
            assert_eq!(total, size);
        }
    }

    #[tokio::test]
    async fn empty_file_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");
        assert!(read_all(&path, 180).await.is_empty());
    }

    #[tokio::test]
    async fn reopening_restarts_the_sequence() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut first = ChunkReader::open(&path, 4).await.unwrap();
        first.next_chunk().await.unwrap();
        drop(first);

        let chunks = read_all(&path, 4).await;
        assert_eq!(chunks[0].sequence, 0);
        assert_eq!(&chunks[0].payload, b"0123");
    }

    #[tokio::test]
    async fn truncated_file_fails_the_sequence() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "shrink.bin", &[1u8; 100]);

        let mut reader = ChunkReader::open(&path, 40).await.unwrap();
        reader.next_chunk().await.unwrap();
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(50)
            .unwrap();

        let err = reader.next_chunk().await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof
        ));
    }

    #[tokio::test]
    async fn zero_chunk_size_rejected() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "a.bin", b"abc");
        assert!(matches!(
            ChunkReader::open(&path, 0).await,
            Err(TransferError::EmptyInput)
        ));
    }
}
