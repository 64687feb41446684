//! 송신 엔진
//!
//! - Stop-and-wait: 미확인 패킷은 항상 하나
//! - 단계마다 고정 타임아웃 + 제한된 재전송
//! - 재시도 소진 시 전송 전체 실패 (부분 성공 없음)

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::chunk::ChunkSplitter;
use crate::digest;
use crate::link::Link;
use crate::message::{reason, MetadataMessage, Packet, PacketType};
use crate::stats::TransferStats;
use crate::timer::RetransmitTimer;
use crate::transform::ConversionMode;
use crate::{Config, Error, Result};

/// 송신 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    SendingMetadata,
    SendingData,
    SendingHash,
    AwaitingComplete,
    Done,
    Failed,
}

impl SenderState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::SendingMetadata => "SENDING_METADATA",
            Self::SendingData => "SENDING_DATA",
            Self::SendingHash => "SENDING_HASH",
            Self::AwaitingComplete => "AWAITING_COMPLETE",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// 무엇을 기다리는지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    /// 미확인 패킷의 ACK
    Ack,
    /// 상대의 COMPLETE (타임아웃 시 마지막 단위 재전송)
    Complete,
}

/// 수신 패킷 판정
enum Verdict {
    Accept,
    Ignore,
    Fail(Error),
}

/// 송신 엔진 (전송 하나당 하나)
pub struct SenderEngine<'a> {
    link: &'a mut Link,
    config: &'a Config,
    state: SenderState,
    stats: TransferStats,
    timer: RetransmitTimer,
}

impl<'a> SenderEngine<'a> {
    pub fn new(link: &'a mut Link, config: &'a Config) -> Self {
        Self {
            link,
            config,
            state: SenderState::Idle,
            stats: TransferStats::new(),
            timer: RetransmitTimer::new(),
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// 바이트 스트림 전송
    ///
    /// METADATA -> DATA* -> HASH -> COMPLETE 대기. 실패하면 상태는 FAILED로 고정된다.
    pub async fn send(&mut self, filename: &str, mode: &ConversionMode, data: Bytes) -> Result<()> {
        if self.state != SenderState::Idle {
            return Err(Error::ProtocolViolation {
                state: self.state.name(),
                packet_type: PacketType::Metadata.name(),
            });
        }

        let result = self.run(filename, mode, data).await;
        self.timer.cancel();
        self.stats.finish();

        match &result {
            Ok(()) => {
                self.transition(SenderState::Done);
                info!("송신 완료: {} -> {} ({})", filename, self.link.peer(), self.stats.summary());
            }
            Err(e) => {
                self.transition(SenderState::Failed);
                warn!("송신 실패: {} -> {}: {}", filename, self.link.peer(), e);
            }
        }
        result
    }

    async fn run(&mut self, filename: &str, mode: &ConversionMode, data: Bytes) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidMetadata("빈 파일은 전송할 수 없음"));
        }

        let metadata = MetadataMessage::new(filename, data.len() as u64, mode.clone());
        let total_count = metadata.total_count;
        let metadata_packet = Packet::metadata(&metadata)?;

        info!(
            "송신 시작: {} ({} bytes, {} 패킷, {}) -> {}",
            filename,
            data.len(),
            total_count,
            mode,
            self.link.peer()
        );

        // 1. METADATA
        self.transition(SenderState::SendingMetadata);
        self.send_and_wait(&metadata_packet, Wait::Ack, "METADATA").await?;

        // 2. DATA (엄격히 순서대로, 파이프라이닝 없음)
        self.transition(SenderState::SendingData);
        for (sequence_id, chunk) in ChunkSplitter::new().split(&data).into_iter().enumerate() {
            let packet = Packet::data(sequence_id as u32, total_count, chunk)?;
            self.send_and_wait(&packet, Wait::Ack, "DATA").await?;
            self.stats.payload_bytes += packet.payload.len() as u64;
            debug!("DATA {}/{} 확인", sequence_id + 1, total_count);
        }

        // 3. HASH
        self.transition(SenderState::SendingHash);
        let digest = digest::sha256(&data);
        debug!("다이제스트: {}", digest::short_hex(&digest));
        let hash_packet = Packet::hash(total_count, digest);
        self.send_and_wait(&hash_packet, Wait::Ack, "HASH").await?;

        // 4. COMPLETE 대기 (타임아웃 시 HASH 재전송)
        self.transition(SenderState::AwaitingComplete);
        self.send_and_wait(&hash_packet, Wait::Complete, "COMPLETE").await?;

        Ok(())
    }

    /// 전송 후 응답 대기, 타임아웃마다 재전송
    ///
    /// 총 전송 횟수는 1 + max_retries.
    async fn send_and_wait(&mut self, packet: &Packet, wait: Wait, step: &'static str) -> Result<()> {
        let timeout = match wait {
            Wait::Ack => self.config.ack_timeout(),
            Wait::Complete => self.config.complete_timeout(),
        };

        for attempt in 0..self.config.attempts_per_step() {
            if attempt > 0 {
                self.stats.retransmissions += 1;
                warn!(
                    "[Timeout] {} 재전송 {}/{} (sequence_id={})",
                    step, attempt, self.config.max_retries, packet.sequence_id
                );
            }

            // COMPLETE 대기는 HASH가 이미 확인된 상태에서 시작하므로 첫 회는 보내지 않는다
            if attempt > 0 || wait == Wait::Ack {
                self.link.send(packet).await?;
                self.stats.packets_sent += 1;
            }

            if self.wait_for(packet, wait, timeout).await? {
                return Ok(());
            }
        }

        Err(Error::TransferTimeout {
            step,
            attempts: self.config.attempts_per_step(),
        })
    }

    /// 타이머 한 주기 동안 응답 대기
    async fn wait_for(&mut self, outstanding: &Packet, wait: Wait, timeout: Duration) -> Result<bool> {
        let (expired_tx, mut expired_rx) = oneshot::channel::<()>();
        self.timer.arm(timeout, move || {
            let _ = expired_tx.send(());
        });

        let result = loop {
            tokio::select! {
                _ = &mut expired_rx => break Ok(false),
                received = self.link.recv() => {
                    let packet = match received {
                        Ok(packet) => packet,
                        Err(e) => break Err(e),
                    };
                    self.stats.packets_received += 1;

                    match self.judge(outstanding, wait, packet) {
                        Verdict::Accept => break Ok(true),
                        Verdict::Ignore => continue,
                        Verdict::Fail(e) => break Err(e),
                    }
                }
            }
        };

        self.timer.cancel();
        result
    }

    fn judge(&mut self, outstanding: &Packet, wait: Wait, packet: Packet) -> Verdict {
        match (wait, packet.packet_type) {
            (_, PacketType::Nack) if packet.text() == reason::INTEGRITY_MISMATCH => {
                Verdict::Fail(Error::IntegrityMismatch {
                    expected: digest::to_hex(&outstanding.payload),
                    actual: "상대 측 다이제스트 불일치".to_string(),
                })
            }

            (_, PacketType::Nack) | (_, PacketType::Error) => Verdict::Fail(Error::Rejected {
                reason: packet.text(),
            }),

            (Wait::Ack, PacketType::Ack) if packet.is_ack_for(outstanding) => Verdict::Accept,

            (_, PacketType::Ack) => {
                // 지난 단위의 늦은 ACK: 재전송도 에러도 없음
                self.stats.stale_acks += 1;
                debug!("지난 ACK 무시: sequence_id={}", packet.sequence_id);
                Verdict::Ignore
            }

            (Wait::Complete, PacketType::Complete) => {
                debug!("COMPLETE 수신: {}", packet.text());
                Verdict::Accept
            }

            (Wait::Complete, PacketType::Metadata) => {
                // 상대가 이미 응답 전송을 시작함 = COMPLETE 유실
                warn!("COMPLETE 유실 추정: 상대의 METADATA를 다음 단계로 넘김");
                self.link.push_back(packet);
                Verdict::Accept
            }

            (_, packet_type) => {
                self.stats.dropped_packets += 1;
                debug!(
                    "프로토콜 위반 패킷 무시: {} (상태 {})",
                    packet_type.name(),
                    self.state.name()
                );
                Verdict::Ignore
            }
        }
    }

    fn transition(&mut self, next: SenderState) {
        debug!("송신 상태: {} -> {}", self.state.name(), next.name());
        self.state = next;
    }
}
