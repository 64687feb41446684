//! 수신 엔진
//!
//! - ReceiverEngine: 동기 상태 머신 (패킷 하나 -> 응답 + 이벤트)
//! - Receiver: Link 위에서 엔진을 구동하는 비동기 드라이버
//!
//! 엔진 상태는 전송 하나를 처리하는 단일 태스크만 변경한다.

use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::chunk::{chunk_count, ReassemblyBuffer};
use crate::digest;
use crate::link::Link;
use crate::message::{reason, MetadataMessage, Packet, PacketType};
use crate::stats::TransferStats;
use crate::transform::ConversionMode;
use crate::{Config, Error, Result};

/// 수신 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    AwaitingMetadata,
    ReceivingData,
    AwaitingHash,
    Verifying,
    Complete,
    Failed,
}

impl ReceiverState {
    pub fn name(self) -> &'static str {
        match self {
            Self::AwaitingMetadata => "AWAITING_METADATA",
            Self::ReceivingData => "RECEIVING_DATA",
            Self::AwaitingHash => "AWAITING_HASH",
            Self::Verifying => "VERIFYING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// 검증이 끝난 수신 파일
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub filename: String,
    pub mode: ConversionMode,
    pub data: Bytes,
}

/// 패킷 처리 결과 이벤트
#[derive(Debug)]
pub enum ReceiverEvent {
    /// 정상 진행
    Progress,

    /// 패킷 폐기 (상태 변화 없음)
    Dropped(Error),

    /// 무결성 검증 완료, 상위로 전달할 바이트
    Verified(ReceivedFile),

    /// 전송 실패
    Failed(Error),
}

/// 패킷 하나에 대한 반응
#[derive(Debug)]
pub struct Reaction {
    /// 상대에게 보낼 응답 (ACK/NACK)
    pub reply: Option<Packet>,
    pub event: ReceiverEvent,
}

impl Reaction {
    fn reply(reply: Packet) -> Self {
        Self {
            reply: Some(reply),
            event: ReceiverEvent::Progress,
        }
    }

    fn dropped(error: Error) -> Self {
        Self {
            reply: None,
            event: ReceiverEvent::Dropped(error),
        }
    }
}

/// 수신 상태 머신
pub struct ReceiverEngine {
    max_file_size: u64,
    state: ReceiverState,

    /// 수락된 METADATA (원본 페이로드 포함, 중복 판별용)
    metadata: Option<(MetadataMessage, Bytes)>,

    buffer: Option<ReassemblyBuffer>,

    /// 검증 완료된 다이제스트 (HASH 재전송 재확인용)
    verified_digest: Option<Bytes>,

    stats: TransferStats,
}

impl ReceiverEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            max_file_size: config.max_file_size,
            state: ReceiverState::AwaitingMetadata,
            metadata: None,
            buffer: None,
            verified_digest: None,
            stats: TransferStats::new(),
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn metadata(&self) -> Option<&MetadataMessage> {
        self.metadata.as_ref().map(|(metadata, _)| metadata)
    }

    pub fn buffer(&self) -> Option<&ReassemblyBuffer> {
        self.buffer.as_ref()
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// 외부 요인(유휴 타임아웃 등)으로 실패 처리
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.transition(ReceiverState::Failed);
        }
        self.stats.finish();
    }

    /// 패킷 처리
    pub fn on_packet(&mut self, packet: Packet) -> Reaction {
        self.stats.packets_received += 1;

        let reaction = match (self.state, packet.packet_type) {
            (state, PacketType::Error) if !state.is_terminal() => {
                self.transition(ReceiverState::Failed);
                Reaction {
                    reply: None,
                    event: ReceiverEvent::Failed(Error::Rejected {
                        reason: packet.text(),
                    }),
                }
            }

            (ReceiverState::AwaitingMetadata, PacketType::Metadata) => self.on_metadata(packet),

            (
                ReceiverState::ReceivingData | ReceiverState::AwaitingHash | ReceiverState::Complete,
                PacketType::Metadata,
            ) => self.on_duplicate_metadata(packet),

            (
                ReceiverState::ReceivingData | ReceiverState::AwaitingHash | ReceiverState::Complete,
                PacketType::Data,
            ) => self.on_data(packet),

            (ReceiverState::AwaitingHash, PacketType::Hash) => self.on_hash(packet),

            (ReceiverState::Complete, PacketType::Hash) => self.on_duplicate_hash(packet),

            (state, packet_type) => self.violation(state, packet_type),
        };

        if reaction.reply.is_some() {
            self.stats.packets_sent += 1;
        }
        reaction
    }

    fn on_metadata(&mut self, packet: Packet) -> Reaction {
        let metadata = match MetadataMessage::from_bytes(&packet.payload) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("METADATA 파싱 실패: {}", e);
                return Self::reject_metadata(&packet, reason::INVALID_METADATA);
            }
        };

        if let Err(code) = self.validate(&metadata, packet.total_count) {
            warn!(
                "METADATA 거부 ({}): {} bytes, {} 패킷",
                code, metadata.byte_length, metadata.total_count
            );
            return Self::reject_metadata(&packet, code);
        }

        info!(
            "수신 시작: {} ({} bytes, {} 패킷, {})",
            metadata.filename, metadata.byte_length, metadata.total_count, metadata.mode
        );

        self.buffer = Some(ReassemblyBuffer::new(metadata.total_count));
        self.metadata = Some((metadata, packet.payload.clone()));
        self.transition(ReceiverState::ReceivingData);
        Reaction::reply(Packet::ack_for(&packet))
    }

    fn reject_metadata(packet: &Packet, code: &'static str) -> Reaction {
        Reaction {
            reply: Some(Packet::nack_for(packet, code)),
            event: ReceiverEvent::Dropped(Error::InvalidMetadata(code)),
        }
    }

    /// byte_length, total_count 검증. 실패 시 와이어 사유 코드
    fn validate(&self, metadata: &MetadataMessage, header_total: u32) -> std::result::Result<(), &'static str> {
        if metadata.byte_length == 0 || metadata.total_count == 0 {
            return Err(reason::INVALID_METADATA);
        }
        if metadata.byte_length > self.max_file_size {
            return Err(reason::FILE_TOO_LARGE);
        }
        if metadata.total_count != chunk_count(metadata.byte_length)
            || metadata.total_count != header_total
        {
            return Err(reason::INVALID_METADATA);
        }
        Ok(())
    }

    /// 상대가 ACK을 못 받고 METADATA를 재전송한 경우
    fn on_duplicate_metadata(&mut self, packet: Packet) -> Reaction {
        let same = matches!(&self.metadata, Some((_, payload)) if *payload == packet.payload);
        if !same {
            return self.violation(self.state, packet.packet_type);
        }

        debug!("중복 METADATA 재확인");
        Reaction::reply(Packet::ack_for(&packet))
    }

    fn on_data(&mut self, packet: Packet) -> Reaction {
        let Some(buffer) = self.buffer.as_mut() else {
            return self.violation(self.state, packet.packet_type);
        };

        let len = packet.payload.len() as u64;
        match buffer.accept(packet.sequence_id, packet.total_count, packet.payload.clone()) {
            Ok(true) => {
                self.stats.payload_bytes += len;
                debug!(
                    "DATA 수신 {}/{}",
                    buffer.received_count(),
                    buffer.total_count()
                );
            }
            Ok(false) => {
                self.stats.duplicate_chunks += 1;
                debug!("중복 DATA: sequence_id={}", packet.sequence_id);
            }
            Err(e) => {
                // ACK 없이 폐기 -> 상대가 재전송
                self.stats.dropped_packets += 1;
                return Reaction::dropped(e);
            }
        }

        let complete = buffer.is_complete();
        if complete && self.state == ReceiverState::ReceivingData {
            self.transition(ReceiverState::AwaitingHash);
        }

        // 중복이어도 ACK (이전 ACK가 유실됐을 수 있음)
        Reaction::reply(Packet::ack_for(&packet))
    }

    fn on_hash(&mut self, packet: Packet) -> Reaction {
        self.transition(ReceiverState::Verifying);

        let (Some((metadata, _)), Some(buffer)) = (&self.metadata, &self.buffer) else {
            self.transition(ReceiverState::AwaitingHash);
            return self.violation(ReceiverState::Verifying, packet.packet_type);
        };

        let data = match buffer.assemble() {
            Ok(data) => data,
            Err(e) => {
                self.transition(ReceiverState::AwaitingHash);
                return Reaction::dropped(e);
            }
        };

        let actual = digest::sha256(&data);
        let length_ok = data.len() as u64 == metadata.byte_length;

        if !length_ok || actual[..] != packet.payload[..] {
            let error = Error::IntegrityMismatch {
                expected: digest::to_hex(&packet.payload),
                actual: digest::to_hex(&actual),
            };
            warn!("무결성 검증 실패: {} ({})", metadata.filename, error);
            self.transition(ReceiverState::Failed);
            self.stats.finish();
            return Reaction {
                reply: Some(Packet::nack_for(&packet, reason::INTEGRITY_MISMATCH)),
                event: ReceiverEvent::Failed(error),
            };
        }

        let file = ReceivedFile {
            filename: metadata.filename.clone(),
            mode: metadata.mode.clone(),
            data,
        };

        self.verified_digest = Some(packet.payload.clone());
        self.transition(ReceiverState::Complete);
        self.stats.finish();
        info!(
            "수신 검증 완료: {} (sha256 {}..., {})",
            file.filename,
            digest::short_hex(&actual),
            self.stats.summary()
        );

        Reaction {
            reply: Some(Packet::ack_for(&packet)),
            event: ReceiverEvent::Verified(file),
        }
    }

    /// 검증 후 HASH 재전송: 같은 다이제스트면 다시 ACK
    fn on_duplicate_hash(&mut self, packet: Packet) -> Reaction {
        if self.verified_digest.as_ref() != Some(&packet.payload) {
            return self.violation(self.state, packet.packet_type);
        }
        Reaction::reply(Packet::ack_for(&packet))
    }

    fn violation(&mut self, state: ReceiverState, packet_type: PacketType) -> Reaction {
        self.stats.dropped_packets += 1;
        Reaction::dropped(Error::ProtocolViolation {
            state: state.name(),
            packet_type: packet_type.name(),
        })
    }

    fn transition(&mut self, next: ReceiverState) {
        debug!("수신 상태: {} -> {}", self.state.name(), next.name());
        self.state = next;
    }
}

/// Link 위의 수신 드라이버
pub struct Receiver<'a> {
    link: &'a mut Link,
    config: &'a Config,
    engine: ReceiverEngine,
}

impl<'a> Receiver<'a> {
    pub fn new(link: &'a mut Link, config: &'a Config) -> Self {
        Self {
            engine: ReceiverEngine::new(config),
            link,
            config,
        }
    }

    pub fn engine(&self) -> &ReceiverEngine {
        &self.engine
    }

    /// 검증된 파일 하나를 받을 때까지 구동
    ///
    /// `handshake_reply`가 있으면 METADATA 전에 다시 온 COMMAND에 그 판정을 재전송한다.
    pub async fn receive(&mut self, handshake_reply: Option<&Packet>) -> Result<ReceivedFile> {
        loop {
            let Some(packet) = self.link.recv_timeout(self.config.idle_timeout()).await? else {
                self.engine.abort();
                warn!(
                    "수신 유휴 타임아웃: {} 상태에서 {:?} 동안 패킷 없음",
                    self.engine.state().name(),
                    self.config.idle_timeout()
                );
                return Err(Error::TransferTimeout {
                    step: "RECEIVE",
                    attempts: 1,
                });
            };

            if packet.packet_type == PacketType::Command
                && self.engine.state() == ReceiverState::AwaitingMetadata
            {
                if let Some(reply) = handshake_reply {
                    debug!("COMMAND 재수신: 판정 재전송");
                    self.link.send(reply).await?;
                }
                continue;
            }

            let reaction = self.engine.on_packet(packet);
            if let Some(reply) = &reaction.reply {
                self.link.send(reply).await?;
            }

            match reaction.event {
                ReceiverEvent::Progress => {}
                ReceiverEvent::Dropped(e) => debug!("패킷 폐기: {}", e),
                ReceiverEvent::Verified(file) => return Ok(file),
                ReceiverEvent::Failed(e) => return Err(e),
            }
        }
    }

    /// 검증 이후 단계(변환 등)의 실패를 ERROR로 알림
    pub async fn abort_with(&mut self, code: &str) -> Result<()> {
        self.engine.abort();
        self.link.send(&Packet::error(code)).await
    }

    /// COMPLETE 전송
    ///
    /// `linger`면 잠시 남아서 재전송된 HASH에 ACK + COMPLETE를 다시 보낸다.
    pub async fn complete(&mut self, name: &str, linger: bool) -> Result<()> {
        let complete = Packet::complete(name);
        self.link.send(&complete).await?;
        debug!("COMPLETE 전송: {}", name);

        if !linger {
            return Ok(());
        }

        let mut deadline = Instant::now() + self.config.linger();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let Some(packet) = self.link.recv_timeout(remaining).await? else {
                break;
            };

            let is_hash = packet.packet_type == PacketType::Hash;
            let reaction = self.engine.on_packet(packet);
            if let Some(reply) = &reaction.reply {
                self.link.send(reply).await?;
                if is_hash && reply.packet_type == PacketType::Ack {
                    debug!("COMPLETE 재전송 (HASH 재수신)");
                    self.link.send(&complete).await?;
                    // HASH 재수신마다 대기 구간 연장
                    deadline = Instant::now() + self.config.linger();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use rand::seq::SliceRandom;
    use tokio::net::UdpSocket;

    use crate::chunk::ChunkSplitter;
    use crate::message::METADATA_SEQUENCE;

    fn mode() -> ConversionMode {
        ConversionMode::new("txt", "pdf")
    }

    fn metadata_packet(filename: &str, byte_length: u64) -> Packet {
        Packet::metadata(&MetadataMessage::new(filename, byte_length, mode())).unwrap()
    }

    fn data_packets(data: &Bytes) -> Vec<Packet> {
        let chunks = ChunkSplitter::new().split(data);
        let total = chunks.len() as u32;
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| Packet::data(i as u32, total, chunk).unwrap())
            .collect()
    }

    fn scenario_data() -> Bytes {
        let mut data = vec![0xAAu8; 1024];
        data.extend(std::iter::repeat(0xBBu8).take(1024));
        Bytes::from(data)
    }

    fn expect_ack(reaction: &Reaction, sequence_id: u32) {
        let reply = reaction.reply.as_ref().expect("reply");
        assert_eq!(reply.packet_type, PacketType::Ack);
        assert_eq!(reply.sequence_id, sequence_id);
    }

    /// METADATA를 수락시킨 엔진
    fn started_engine(filename: &str, data: &Bytes) -> ReceiverEngine {
        let mut engine = ReceiverEngine::new(&Config::default());
        let reaction = engine.on_packet(metadata_packet(filename, data.len() as u64));
        expect_ack(&reaction, METADATA_SEQUENCE);
        engine
    }

    #[test]
    fn test_end_to_end_scenario() {
        let data = scenario_data();
        let mut engine = started_engine("a.txt", &data);
        assert_eq!(engine.state(), ReceiverState::ReceivingData);
        assert_eq!(engine.metadata().unwrap().total_count, 2);

        for packet in data_packets(&data) {
            let seq = packet.sequence_id;
            let reaction = engine.on_packet(packet);
            expect_ack(&reaction, seq);
        }
        assert_eq!(engine.state(), ReceiverState::AwaitingHash);

        let reaction = engine.on_packet(Packet::hash(2, digest::sha256(&data)));
        expect_ack(&reaction, 2);
        assert_eq!(engine.state(), ReceiverState::Complete);

        match reaction.event {
            ReceiverEvent::Verified(file) => {
                assert_eq!(file.filename, "a.txt");
                assert_eq!(file.mode, mode());
                assert_eq!(&file.data[..1024], &[0xAAu8; 1024][..]);
                assert_eq!(&file.data[1024..], &[0xBBu8; 1024][..]);
                assert_eq!(file.data, data);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_data_acked_idempotently() {
        let data = scenario_data();
        let mut engine = started_engine("a.txt", &data);
        let packets = data_packets(&data);

        let first = engine.on_packet(packets[0].clone());
        let second = engine.on_packet(packets[0].clone());

        assert_eq!(first.reply, second.reply);
        expect_ack(&second, 0);
        assert_eq!(engine.state(), ReceiverState::ReceivingData);
        assert_eq!(engine.buffer().unwrap().received_count(), 1);
        assert_eq!(engine.buffer().unwrap().missing(), vec![1]);
        assert_eq!(engine.stats().duplicate_chunks, 1);
    }

    #[test]
    fn test_out_of_order_delivery() {
        let data: Bytes = (0..10_000u32).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into();
        let total = crate::chunk_count(data.len() as u64);

        for _ in 0..5 {
            let mut packets = data_packets(&data);
            packets.shuffle(&mut rand::thread_rng());

            let mut engine = started_engine("shuffled.txt", &data);
            for packet in packets {
                engine.on_packet(packet);
            }
            assert_eq!(engine.state(), ReceiverState::AwaitingHash);

            let reaction = engine.on_packet(Packet::hash(total, digest::sha256(&data)));
            match reaction.event {
                ReceiverEvent::Verified(file) => assert_eq!(file.data, data),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_duplicates_after_completion_still_acked() {
        let data = scenario_data();
        let mut engine = started_engine("a.txt", &data);
        let packets = data_packets(&data);
        for packet in &packets {
            engine.on_packet(packet.clone());
        }

        // 마지막 ACK 유실 -> 재전송
        let reaction = engine.on_packet(packets[1].clone());
        expect_ack(&reaction, 1);
        assert_eq!(engine.state(), ReceiverState::AwaitingHash);

        let hash = Packet::hash(2, digest::sha256(&data));
        engine.on_packet(hash.clone());
        assert_eq!(engine.state(), ReceiverState::Complete);

        // HASH ACK 유실 -> 재전송
        let reaction = engine.on_packet(hash);
        expect_ack(&reaction, 2);
        assert!(matches!(reaction.event, ReceiverEvent::Progress));
    }

    #[test]
    fn test_duplicate_metadata_reacked() {
        let data = scenario_data();
        let mut engine = started_engine("a.txt", &data);

        let reaction = engine.on_packet(metadata_packet("a.txt", 2048));
        expect_ack(&reaction, METADATA_SEQUENCE);

        let different = engine.on_packet(metadata_packet("b.txt", 2048));
        assert!(different.reply.is_none());
        assert!(matches!(
            different.event,
            ReceiverEvent::Dropped(Error::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn test_inconsistent_metadata_nacked() {
        let mut engine = ReceiverEngine::new(&Config::default());

        let mut bad = MetadataMessage::new("a.txt", 2048, mode());
        bad.total_count = 3;
        let packet = Packet::metadata(&bad).unwrap();

        let reaction = engine.on_packet(packet);
        let reply = reaction.reply.unwrap();
        assert_eq!(reply.packet_type, PacketType::Nack);
        assert_eq!(reply.text(), reason::INVALID_METADATA);
        assert_eq!(engine.state(), ReceiverState::AwaitingMetadata);

        // 올바른 METADATA는 이후에도 수락됨
        let reaction = engine.on_packet(metadata_packet("a.txt", 2048));
        expect_ack(&reaction, METADATA_SEQUENCE);
        assert_eq!(engine.state(), ReceiverState::ReceivingData);
    }

    #[test]
    fn test_zero_length_and_oversized_metadata() {
        let config = Config {
            max_file_size: 4096,
            ..Config::default()
        };
        let mut engine = ReceiverEngine::new(&config);

        let empty = engine.on_packet(metadata_packet("empty.txt", 0));
        assert_eq!(empty.reply.unwrap().text(), reason::INVALID_METADATA);

        let large = engine.on_packet(metadata_packet("big.txt", 8192));
        assert_eq!(large.reply.unwrap().text(), reason::FILE_TOO_LARGE);
        assert_eq!(engine.state(), ReceiverState::AwaitingMetadata);
    }

    #[test]
    fn test_garbage_metadata_payload_nacked() {
        let mut engine = ReceiverEngine::new(&Config::default());
        let packet = Packet::new(PacketType::Metadata, METADATA_SEQUENCE, 1, Bytes::from_static(b"\x01")).unwrap();

        let reaction = engine.on_packet(packet);
        assert_eq!(reaction.reply.unwrap().packet_type, PacketType::Nack);
        assert_eq!(engine.state(), ReceiverState::AwaitingMetadata);
    }

    #[test]
    fn test_integrity_mismatch() {
        let data = scenario_data();
        let mut engine = started_engine("a.txt", &data);

        let mut packets = data_packets(&data);
        let mut corrupted = packets[1].payload.to_vec();
        corrupted[100] ^= 0xFF;
        packets[1].payload = Bytes::from(corrupted);

        for packet in packets {
            engine.on_packet(packet);
        }
        assert_eq!(engine.state(), ReceiverState::AwaitingHash);

        let reaction = engine.on_packet(Packet::hash(2, digest::sha256(&data)));
        let reply = reaction.reply.unwrap();
        assert_eq!(reply.packet_type, PacketType::Nack);
        assert_eq!(reply.text(), reason::INTEGRITY_MISMATCH);
        assert!(matches!(
            reaction.event,
            ReceiverEvent::Failed(Error::IntegrityMismatch { .. })
        ));
        assert_eq!(engine.state(), ReceiverState::Failed);
    }

    #[test]
    fn test_out_of_range_data_dropped_without_ack() {
        let data = scenario_data();
        let mut engine = started_engine("a.txt", &data);

        let rogue = Packet::data(5, 2, Bytes::from_static(b"zz")).unwrap();
        let reaction = engine.on_packet(rogue);

        assert!(reaction.reply.is_none());
        assert!(matches!(
            reaction.event,
            ReceiverEvent::Dropped(Error::OutOfRange { sequence_id: 5, .. })
        ));
        assert_eq!(engine.buffer().unwrap().received_count(), 0);
    }

    #[test]
    fn test_protocol_violations_dropped() {
        let mut engine = ReceiverEngine::new(&Config::default());

        let data = Packet::data(0, 1, Bytes::from_static(b"x")).unwrap();
        let reaction = engine.on_packet(data);
        assert!(reaction.reply.is_none());
        assert!(matches!(
            reaction.event,
            ReceiverEvent::Dropped(Error::ProtocolViolation {
                state: "AWAITING_METADATA",
                packet_type: "DATA"
            })
        ));

        let bytes = scenario_data();
        let mut engine = started_engine("a.txt", &bytes);
        let early_hash = engine.on_packet(Packet::hash(2, digest::sha256(&bytes)));
        assert!(early_hash.reply.is_none());
        assert_eq!(engine.state(), ReceiverState::ReceivingData);
    }

    #[test]
    fn test_peer_error_fails_transfer() {
        let data = scenario_data();
        let mut engine = started_engine("a.txt", &data);

        let reaction = engine.on_packet(Packet::error("conversion_failed"));
        match reaction.event {
            ReceiverEvent::Failed(Error::Rejected { reason }) => {
                assert_eq!(reason, "conversion_failed")
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(engine.state(), ReceiverState::Failed);
    }

    #[tokio::test]
    async fn test_linger_recovers_lost_complete() {
        let config = Config {
            complete_timeout_ms: 100,
            idle_timeout_ms: 2000,
            ..Config::default()
        };
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let local = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let local_addr = local.local_addr().unwrap();
        let mut link = Link::new(Arc::new(local), peer.local_addr().unwrap());

        let data = scenario_data();
        let peer_config = config.clone();
        let sending = tokio::spawn(async move {
            let mut peer = Link::new(Arc::new(peer), local_addr);
            let hash = Packet::hash(2, digest::sha256(&data));

            let mut packets = vec![metadata_packet("a.txt", 2048)];
            packets.extend(data_packets(&data));
            packets.push(hash.clone());
            for packet in &packets {
                peer.send(packet).await.unwrap();
                assert!(peer.recv().await.unwrap().is_ack_for(packet));
            }

            // 첫 COMPLETE는 유실, COMPLETE 대기 타임아웃 후 HASH 재전송
            assert_eq!(peer.recv().await.unwrap().packet_type, PacketType::Complete);
            tokio::time::sleep(peer_config.complete_timeout()).await;
            peer.send(&hash).await.unwrap();

            assert!(peer.recv().await.unwrap().is_ack_for(&hash));
            peer.recv_timeout(Duration::from_secs(1)).await.unwrap()
        });

        let mut receiver = Receiver::new(&mut link, &config);
        let file = receiver.receive(None).await.unwrap();
        receiver.complete(&file.filename, true).await.unwrap();

        let again = sending.await.unwrap().expect("COMPLETE not repeated");
        assert_eq!(again.packet_type, PacketType::Complete);
        assert_eq!(again.text(), "a.txt");
    }
}
