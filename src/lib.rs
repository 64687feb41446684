//! # SWP (Stop-and-Wait Protocol)
//!
//! UDP 기반 ACK 확인형 파일 변환 전송 프로토콜
//!
//! ## 핵심 특징
//! - **Stop-and-wait**: 한 번에 하나의 미확인 패킷만 전송
//! - **패킷별 ACK**: 타임아웃 기반 재전송, 재시도 횟수 제한
//! - **순서 무관 조립**: 중복/역순 도착 청크도 그대로 조립
//! - **무결성 검증**: SHA-256 다이제스트로 종단간 검증
//! - **세션 분리**: 전송마다 전용 포트를 할당해 시퀀스 공간 격리

pub mod chunk;
pub mod client;
pub mod config;
pub mod digest;
pub mod error;
pub mod link;
pub mod message;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod stats;
pub mod timer;
pub mod transform;

pub use chunk::{chunk_count, ChunkSplitter, ReassemblyBuffer};
pub use client::{save_output, Client, ConvertedFile};
pub use config::Config;
pub use error::{DecodeError, Error, Result};
pub use link::Link;
pub use message::{CommandMessage, MetadataMessage, Packet, PacketType};
pub use receiver::{ReceivedFile, Receiver, ReceiverEngine, ReceiverState};
pub use sender::{SenderEngine, SenderState};
pub use session::{establish, Registry, Responder, SessionEntry};
pub use stats::TransferStats;
pub use timer::RetransmitTimer;
pub use transform::{ConversionError, ConversionMode, EchoTransform, Transform, TransformOutput};

/// 청크(DATA 페이로드) 최대 크기 (바이트)
pub const CHUNK_SIZE: usize = 1024;

/// 헤더 크기: type(1) + sequence_id(4) + total_count(4)
pub const HEADER_SIZE: usize = 9;

/// 패킷 최대 크기 (헤더 포함)
pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + CHUNK_SIZE;

/// SHA-256 다이제스트 크기
pub const DIGEST_SIZE: usize = 32;

/// 기본 서버 포트 (well-known rendezvous)
pub const DEFAULT_SERVER_PORT: u16 = 5051;
