//! 청크 분할과 재조립
//!
//! - ChunkSplitter: 송신측, 바이트 스트림을 1024바이트 청크로 분할 (zero-copy)
//! - ReassemblyBuffer: 수신측, 순서 무관하게 도착한 청크를 sequence_id 순으로 조립

use bytes::{Bytes, BytesMut};

use crate::{Error, Result, CHUNK_SIZE};

/// 바이트 길이에 필요한 DATA 패킷 수 (ceil(len / 1024))
pub fn chunk_count(byte_length: u64) -> u32 {
    byte_length.div_ceil(CHUNK_SIZE as u64) as u32
}

/// 청크 분할기 (송신측)
pub struct ChunkSplitter {
    chunk_size: usize,
}

impl ChunkSplitter {
    pub fn new() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }

    /// 데이터를 청크들로 분할
    ///
    /// `Bytes::slice`라서 원본 버퍼를 복사하지 않는다.
    pub fn split(&self, data: &Bytes) -> Vec<Bytes> {
        (0..data.len())
            .step_by(self.chunk_size)
            .map(|offset| {
                let end = (offset + self.chunk_size).min(data.len());
                data.slice(offset..end)
            })
            .collect()
    }
}

impl Default for ChunkSplitter {
    fn default() -> Self {
        Self::new()
    }
}

/// 재조립 버퍼 (수신측)
///
/// 메모리는 `total_count × 1024` 바이트로 제한된다.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    /// 총 청크 수
    total_count: u32,

    /// sequence_id -> 청크
    chunks: Vec<Option<Bytes>>,

    /// 수신된 (고유) 청크 수
    received_count: u32,

    /// 중복 수신 횟수
    duplicates: u32,
}

impl ReassemblyBuffer {
    pub fn new(total_count: u32) -> Self {
        Self {
            total_count,
            chunks: vec![None; total_count as usize],
            received_count: 0,
            duplicates: 0,
        }
    }

    /// 청크 기록
    ///
    /// 새 청크면 `true`, 중복이면 `false` (마지막 쓰기가 남는다).
    pub fn accept(&mut self, sequence_id: u32, total_count: u32, payload: Bytes) -> Result<bool> {
        if sequence_id >= self.total_count
            || total_count != self.total_count
            || payload.len() > CHUNK_SIZE
        {
            return Err(Error::OutOfRange {
                sequence_id,
                total_count: self.total_count,
            });
        }

        let slot = &mut self.chunks[sequence_id as usize];
        let is_new = slot.is_none();
        *slot = Some(payload);

        if is_new {
            self.received_count += 1;
        } else {
            self.duplicates += 1;
        }
        Ok(is_new)
    }

    /// 모든 sequence_id (0..total_count)가 기록되었는지
    pub fn is_complete(&self) -> bool {
        self.received_count == self.total_count
    }

    /// 누락된 sequence_id 목록
    pub fn missing(&self) -> Vec<u32> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| chunk.is_none())
            .map(|(id, _)| id as u32)
            .collect()
    }

    pub fn received_count(&self) -> u32 {
        self.received_count
    }

    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    pub fn duplicates(&self) -> u32 {
        self.duplicates
    }

    /// sequence_id 순으로 이어 붙인 전체 데이터
    pub fn assemble(&self) -> Result<Bytes> {
        if !self.is_complete() {
            return Err(Error::Incomplete {
                received: self.received_count,
                total: self.total_count,
            });
        }

        let len = self.chunks.iter().flatten().map(Bytes::len).sum();
        let mut data = BytesMut::with_capacity(len);
        for chunk in self.chunks.iter().flatten() {
            data.extend_from_slice(chunk);
        }
        Ok(data.freeze())
    }
}
