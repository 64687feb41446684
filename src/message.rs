//! 패킷 정의 및 코덱
//!
//! 모든 패킷은 고정 9바이트 헤더 + 가변 페이로드(최대 1024바이트)
//!
//! ```text
//! offset 0:   type          (1 byte)
//! offset 1:   sequence_id   (4 bytes, big-endian)
//! offset 5:   total_count   (4 bytes, big-endian)
//! offset 9..: payload       (0..=1024 bytes)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::transform::ConversionMode;
use crate::{DecodeError, Error, Result, CHUNK_SIZE, DIGEST_SIZE, HEADER_SIZE};

/// METADATA 패킷의 sequence_id
///
/// DATA(0..total)와 HASH(total)의 ACK과 절대 겹치지 않는 값
pub const METADATA_SEQUENCE: u32 = u32::MAX;

/// 와이어 상의 거부/에러 사유 코드
pub mod reason {
    pub const INVALID_COMMAND: &str = "invalid_command";
    pub const INVALID_COMMAND_FORMAT: &str = "invalid_command_format";
    pub const UNSUPPORTED_FORMAT: &str = "unsupported_format";
    pub const PROTOCOL_VIOLATION: &str = "protocol_violation";
    pub const INVALID_METADATA: &str = "invalid_metadata";
    pub const FILE_TOO_LARGE: &str = "file_too_large";
    pub const INTEGRITY_MISMATCH: &str = "integrity_mismatch";
    pub const CONVERSION_FAILED: &str = "conversion_failed";
}

/// 패킷 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// 초기 명령 (CONVERT ...)
    Command = 0x01,

    /// 파일 메타데이터 (이름, 크기, 총 패킷 수, 모드)
    Metadata = 0x02,

    /// 파일 청크
    Data = 0x03,

    /// SHA-256 다이제스트
    Hash = 0x04,

    /// 수신 확인
    Ack = 0x05,

    /// 거부 (사유 포함)
    Nack = 0x06,

    /// 명령 수락 / 전용 포트 안내
    Ok = 0x07,

    /// 에러 (사유 포함)
    Error = 0x08,

    /// 전송 완료
    Complete = 0x09,
}

impl PacketType {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Command),
            0x02 => Some(Self::Metadata),
            0x03 => Some(Self::Data),
            0x04 => Some(Self::Hash),
            0x05 => Some(Self::Ack),
            0x06 => Some(Self::Nack),
            0x07 => Some(Self::Ok),
            0x08 => Some(Self::Error),
            0x09 => Some(Self::Complete),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Command => "COMMAND",
            Self::Metadata => "METADATA",
            Self::Data => "DATA",
            Self::Hash => "HASH",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Complete => "COMPLETE",
        }
    }
}

/// 와이어 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub sequence_id: u32,
    pub total_count: u32,
    pub payload: Bytes,
}

impl Packet {
    /// 새 패킷 생성 (페이로드 크기 검증)
    pub fn new(
        packet_type: PacketType,
        sequence_id: u32,
        total_count: u32,
        payload: impl Into<Bytes>,
    ) -> std::result::Result<Self, DecodeError> {
        let payload = payload.into();
        if payload.len() > CHUNK_SIZE {
            return Err(DecodeError::PayloadTooLarge {
                len: payload.len(),
                max: CHUNK_SIZE,
            });
        }

        Ok(Self {
            packet_type,
            sequence_id,
            total_count,
            payload,
        })
    }

    /// 페이로드 없는 제어 패킷
    pub fn control(packet_type: PacketType, sequence_id: u32, total_count: u32) -> Self {
        Self {
            packet_type,
            sequence_id,
            total_count,
            payload: Bytes::new(),
        }
    }

    /// 사유 문자열을 담은 패킷 (최대 크기로 잘림)
    fn with_reason(packet_type: PacketType, sequence_id: u32, total_count: u32, reason: &str) -> Self {
        let bytes = reason.as_bytes();
        let len = bytes.len().min(CHUNK_SIZE);
        Self {
            packet_type,
            sequence_id,
            total_count,
            payload: Bytes::copy_from_slice(&bytes[..len]),
        }
    }

    pub fn command(text: &str) -> std::result::Result<Self, DecodeError> {
        Self::new(PacketType::Command, 0, 0, Bytes::copy_from_slice(text.as_bytes()))
    }

    pub fn metadata(metadata: &MetadataMessage) -> Result<Self> {
        let payload = metadata.to_bytes()?;
        Ok(Self::new(
            PacketType::Metadata,
            METADATA_SEQUENCE,
            metadata.total_count,
            payload,
        )?)
    }

    pub fn data(
        sequence_id: u32,
        total_count: u32,
        chunk: Bytes,
    ) -> std::result::Result<Self, DecodeError> {
        Self::new(PacketType::Data, sequence_id, total_count, chunk)
    }

    /// HASH 패킷: sequence_id = total_count (마지막 DATA 다음)
    pub fn hash(total_count: u32, digest: [u8; DIGEST_SIZE]) -> Self {
        Self {
            packet_type: PacketType::Hash,
            sequence_id: total_count,
            total_count,
            payload: Bytes::copy_from_slice(&digest),
        }
    }

    /// 받은 패킷에 대한 ACK (sequence_id, total_count 그대로 반사)
    pub fn ack_for(packet: &Packet) -> Self {
        Self::control(PacketType::Ack, packet.sequence_id, packet.total_count)
    }

    pub fn nack_for(packet: &Packet, reason: &str) -> Self {
        Self::with_reason(PacketType::Nack, packet.sequence_id, packet.total_count, reason)
    }

    pub fn error(reason: &str) -> Self {
        Self::with_reason(PacketType::Error, 0, 0, reason)
    }

    /// 첫 번째 OK: 전용 포트 안내 (u16 big-endian)
    pub fn redirect(port: u16) -> Self {
        Self {
            packet_type: PacketType::Ok,
            sequence_id: 0,
            total_count: 0,
            payload: Bytes::copy_from_slice(&port.to_be_bytes()),
        }
    }

    /// 두 번째 OK: 명령 수락
    pub fn accepted() -> Self {
        Self::with_reason(PacketType::Ok, 1, 0, "OK")
    }

    pub fn complete(name: &str) -> Self {
        Self::with_reason(PacketType::Complete, 0, 0, name)
    }

    /// 바이트로 직렬화
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u8(self.packet_type as u8);
        buf.put_u32(self.sequence_id);
        buf.put_u32(self.total_count);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// 바이트에서 역직렬화
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::TooShort { len: bytes.len() });
        }

        let mut buf = bytes;
        let code = buf.get_u8();
        let packet_type = PacketType::from_u8(code).ok_or(DecodeError::UnknownType(code))?;
        let sequence_id = buf.get_u32();
        let total_count = buf.get_u32();

        Self::new(
            packet_type,
            sequence_id,
            total_count,
            Bytes::copy_from_slice(buf),
        )
    }

    /// ERROR/NACK/COMPLETE 페이로드를 문자열로
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// 첫 번째 OK의 전용 포트
    ///
    /// 포트 안내는 sequence_id 0, 수락 OK는 1로 구분한다.
    pub fn redirect_port(&self) -> Option<u16> {
        if self.packet_type != PacketType::Ok || self.sequence_id != 0 || self.payload.len() != 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    pub fn is_ack_for(&self, packet: &Packet) -> bool {
        self.packet_type == PacketType::Ack && self.sequence_id == packet.sequence_id
    }
}

/// METADATA 페이로드
///
/// bincode 인코딩 (문자열은 길이 접두, 정수는 고정 폭)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataMessage {
    /// 원본 파일명
    pub filename: String,

    /// 전체 바이트 수
    pub byte_length: u64,

    /// DATA 패킷 수
    pub total_count: u32,

    /// 변환 모드
    pub mode: ConversionMode,
}

impl MetadataMessage {
    pub fn new(filename: &str, byte_length: u64, mode: ConversionMode) -> Self {
        Self {
            filename: filename.to_string(),
            byte_length,
            total_count: crate::chunk::chunk_count(byte_length),
            mode,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(self)?;
        if bytes.len() > CHUNK_SIZE {
            return Err(Error::InvalidMetadata("메타데이터가 패킷 크기를 초과"));
        }
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// COMMAND 페이로드: `CONVERT <source> <target> <filename>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub mode: ConversionMode,
    pub filename: String,
}

impl CommandMessage {
    pub const KEYWORD: &'static str = "CONVERT";

    pub fn new(mode: ConversionMode, filename: &str) -> Self {
        Self {
            mode,
            filename: filename.to_string(),
        }
    }

    /// 명령 텍스트 파싱
    ///
    /// 실패 시 와이어 사유 코드를 담은 `InvalidCommand`
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split_whitespace().collect();

        match parts.first() {
            Some(keyword) if keyword.eq_ignore_ascii_case(Self::KEYWORD) => {}
            _ => return Err(Error::InvalidCommand(reason::INVALID_COMMAND)),
        }

        match parts.as_slice() {
            [_, source, target, filename] => Ok(Self {
                mode: ConversionMode::new(source, target),
                filename: filename.to_string(),
            }),
            _ => Err(Error::InvalidCommand(reason::INVALID_COMMAND_FORMAT)),
        }
    }

    pub fn to_text(&self) -> String {
        format!(
            "{} {} {} {}",
            Self::KEYWORD,
            self.mode.source,
            self.mode.target,
            self.filename
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let packet = Packet::data(0x0102_0304, 0x0A0B_0C0D, Bytes::from_static(b"xy")).unwrap();
        let bytes = packet.encode();

        assert_eq!(
            bytes.as_ref(),
            &[0x03, 0x01, 0x02, 0x03, 0x04, 0x0A, 0x0B, 0x0C, 0x0D, b'x', b'y']
        );
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_full_size_packet() {
        let packet = Packet::data(7, 8, Bytes::from(vec![0x5A; CHUNK_SIZE])).unwrap();
        let bytes = packet.encode();

        assert_eq!(bytes.len(), crate::MAX_PACKET_SIZE);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_empty_payload_packet() {
        let packet = Packet::control(PacketType::Ack, 3, 4);
        let decoded = Packet::decode(&packet.encode()).unwrap();

        assert_eq!(decoded, packet);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            Packet::decode(&[0x05, 0, 0]),
            Err(DecodeError::TooShort { len: 3 })
        );

        let mut unknown = Packet::control(PacketType::Ack, 0, 0).encode().to_vec();
        unknown[0] = 0x42;
        assert_eq!(Packet::decode(&unknown), Err(DecodeError::UnknownType(0x42)));

        let mut oversized = vec![0x03, 0, 0, 0, 0, 0, 0, 0, 1];
        oversized.extend(std::iter::repeat(0u8).take(CHUNK_SIZE + 1));
        assert_eq!(
            Packet::decode(&oversized),
            Err(DecodeError::PayloadTooLarge {
                len: CHUNK_SIZE + 1,
                max: CHUNK_SIZE
            })
        );
    }

    #[test]
    fn test_oversized_payload_rejected_on_construction() {
        let result = Packet::new(PacketType::Data, 0, 1, vec![0u8; CHUNK_SIZE + 1]);
        assert!(matches!(result, Err(DecodeError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_ack_echoes_sequence() {
        let data = Packet::data(4, 9, Bytes::from_static(b"abc")).unwrap();
        let ack = Packet::ack_for(&data);

        assert_eq!(ack.packet_type, PacketType::Ack);
        assert!(ack.is_ack_for(&data));
        assert!(!ack.is_ack_for(&Packet::hash(9, [0u8; DIGEST_SIZE])));
    }

    #[test]
    fn test_redirect_port() {
        let ok = Packet::redirect(40123);
        let decoded = Packet::decode(&ok.encode()).unwrap();

        assert_eq!(decoded.redirect_port(), Some(40123));

        // 수락 OK의 "OK"도 2바이트지만 포트로 읽히면 안 된다
        let accepted = Packet::decode(&Packet::accepted().encode()).unwrap();
        assert_eq!(accepted.payload.len(), 2);
        assert_eq!(accepted.redirect_port(), None);
        assert_eq!(Packet::accepted().redirect_port(), None);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let metadata = MetadataMessage::new("a.txt", 2048, ConversionMode::new("txt", "pdf"));
        assert_eq!(metadata.total_count, 2);

        let packet = Packet::metadata(&metadata).unwrap();
        assert_eq!(packet.sequence_id, METADATA_SEQUENCE);
        assert_eq!(packet.total_count, 2);

        let decoded = Packet::decode(&packet.encode()).unwrap();
        assert_eq!(MetadataMessage::from_bytes(&decoded.payload).unwrap(), metadata);
    }

    #[test]
    fn test_metadata_too_long_filename() {
        let name = "x".repeat(CHUNK_SIZE);
        let metadata = MetadataMessage::new(&name, 10, ConversionMode::new("txt", "pdf"));

        assert!(matches!(
            Packet::metadata(&metadata),
            Err(Error::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_command_parse() {
        let command = CommandMessage::parse("CONVERT .txt .pdf notes.txt").unwrap();
        assert_eq!(command.mode, ConversionMode::new("txt", "pdf"));
        assert_eq!(command.filename, "notes.txt");
        assert_eq!(command.to_text(), "CONVERT txt pdf notes.txt");

        let lower = CommandMessage::parse("convert jpg png photo.jpg").unwrap();
        assert_eq!(lower.mode.to_string(), "jpg->png");
    }

    #[test]
    fn test_command_parse_errors() {
        assert!(matches!(
            CommandMessage::parse("DELETE txt pdf a.txt"),
            Err(Error::InvalidCommand(reason::INVALID_COMMAND))
        ));
        assert!(matches!(
            CommandMessage::parse(""),
            Err(Error::InvalidCommand(reason::INVALID_COMMAND))
        ));
        assert!(matches!(
            CommandMessage::parse("CONVERT txt pdf"),
            Err(Error::InvalidCommand(reason::INVALID_COMMAND_FORMAT))
        ));
    }
}
