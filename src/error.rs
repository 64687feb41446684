//! 에러 타입 정의

use thiserror::Error;

use crate::transform::ConversionError;

/// 패킷 디코딩 에러
///
/// 세션이 성립하기 전에는 NACK을 보낼 상대가 불확실하므로 수신 측에서는 조용히 버린다.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("패킷이 헤더보다 짧음: {len} bytes")]
    TooShort { len: usize },

    #[error("알 수 없는 패킷 타입: 0x{0:02X}")]
    UnknownType(u8),

    #[error("페이로드 크기 초과: {len} bytes (최대 {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

/// SWP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("디코딩 에러: {0}")]
    Decode(#[from] DecodeError),

    #[error("시퀀스 범위 초과: sequence_id={sequence_id}, total_count={total_count}")]
    OutOfRange { sequence_id: u32, total_count: u32 },

    #[error("조립 불가: {received}/{total} 청크 수신")]
    Incomplete { received: u32, total: u32 },

    #[error("전송 타임아웃: {step} ({attempts}회 시도)")]
    TransferTimeout { step: &'static str, attempts: u32 },

    #[error("무결성 불일치: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("프로토콜 위반: {packet_type} 패킷은 {state} 상태에서 허용되지 않음")]
    ProtocolViolation {
        state: &'static str,
        packet_type: &'static str,
    },

    #[error("유효하지 않은 메타데이터: {0}")]
    InvalidMetadata(&'static str),

    #[error("유효하지 않은 명령: {0}")]
    InvalidCommand(&'static str),

    #[error("상대가 거부함: {reason}")]
    Rejected { reason: String },

    #[error("변환 에러: {0}")]
    Conversion(#[from] ConversionError),

    #[error("채널 에러")]
    ChannelError,
}

impl Error {
    /// 사용자에게 노출되는 실패인지 여부
    ///
    /// 디코딩/범위 초과/프로토콜 위반은 전송 계층 잡음으로, 재전송으로 처리된다.
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            Error::Decode(_) | Error::OutOfRange { .. } | Error::ProtocolViolation { .. }
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
