//! 단일 상대에 묶인 UDP 링크
//!
//! 디코딩 실패 패킷과 다른 주소에서 온 패킷은 여기서 걸러진다.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::message::Packet;
use crate::{Result, MAX_PACKET_SIZE};

/// 상대 주소 하나와 통신하는 링크
pub struct Link {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,

    /// 다음 단계에서 처리할 패킷 (되돌려 놓은 것)
    pending: VecDeque<Packet>,

    buf: Vec<u8>,
}

impl Link {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self {
            socket,
            peer,
            pending: VecDeque::new(),
            // 최대 패킷보다 큰 데이터그램도 잘리지 않고 받아서 PayloadTooLarge로 거른다
            buf: vec![0u8; MAX_PACKET_SIZE + 1],
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn socket(&self) -> &Arc<UdpSocket> {
        &self.socket
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 패킷 전송
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        self.socket.send_to(&packet.encode(), self.peer).await?;
        Ok(())
    }

    /// 패킷을 되돌려 놓음 (다음 recv에서 먼저 반환)
    pub fn push_back(&mut self, packet: Packet) {
        self.pending.push_back(packet);
    }

    /// 다음 유효 패킷 수신
    pub async fn recv(&mut self) -> Result<Packet> {
        if let Some(packet) = self.pending.pop_front() {
            return Ok(packet);
        }

        loop {
            let (len, addr) = self.socket.recv_from(&mut self.buf).await?;

            if addr != self.peer {
                debug!("다른 주소의 패킷 무시: {} (peer={})", addr, self.peer);
                continue;
            }

            match Packet::decode(&self.buf[..len]) {
                Ok(packet) => return Ok(packet),
                Err(e) => {
                    debug!("잘못된 패킷 폐기: {}", e);
                }
            }
        }
    }

    /// 타임아웃 수신 (시간 초과 시 None)
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Packet>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }
}
