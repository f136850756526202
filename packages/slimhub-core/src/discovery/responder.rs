//! Discovery responder and its UDP socket loop.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::datagram::{encode_legacy_response, encode_tlv_response, Datagram, TlvEntry, TlvTag};
use super::{DiscoveryError, DiscoveryResult};
use crate::context::ServerIdentity;
use crate::utils::hex_bytes;

/// Builds responses to discovery datagrams. Performs no I/O.
#[derive(Debug, Clone)]
pub struct DiscoveryResponder {
    identity: ServerIdentity,
}

impl DiscoveryResponder {
    pub fn new(identity: ServerIdentity) -> Self {
        Self { identity }
    }

    /// Returns the reply for `data`, or `None` when the datagram needs no answer.
    ///
    /// `local_ip` is the address the socket is bound to, reported for `IPAD`.
    pub fn respond(&self, data: &[u8], local_ip: IpAddr) -> DiscoveryResult<Option<Bytes>> {
        let reply = match Datagram::decode(data)? {
            Datagram::Probe(probe) => {
                log::debug!(
                    "[Discovery] Probe from {} (device {}, firmware {:#x})",
                    probe.mac,
                    probe.device,
                    probe.firmware
                );
                Some(encode_legacy_response(&self.identity.hostname))
            }
            Datagram::TlvRequest(request) => {
                let response = self.build_tlv_response(&request, local_ip);
                Some(encode_tlv_response(&response))
            }
            Datagram::TlvResponse(_) => {
                log::trace!("[Discovery] Ignoring response from another server");
                None
            }
            Datagram::Hello | Datagram::Ir | Datagram::I2c | Datagram::Ack => None,
        };
        Ok(reply)
    }

    /// Answers each requested tag in request order, dropping tags it cannot answer.
    pub fn build_tlv_response(&self, request: &[TlvEntry], local_ip: IpAddr) -> Vec<TlvEntry> {
        let mut response = Vec::with_capacity(request.len());
        for entry in request {
            let value: Bytes = match entry.tag {
                TlvTag::NAME => self.identity.hostname.clone().into(),
                TlvTag::IPAD => {
                    if local_ip.is_unspecified() {
                        continue;
                    }
                    local_ip.to_string().into()
                }
                TlvTag::JSON => self.identity.http_port.to_string().into(),
                TlvTag::VERS => self.identity.version.clone().into(),
                TlvTag::UUID => self.identity.uuid.clone().into(),
                TlvTag::JVID => {
                    let jive = entry.value.as_deref().unwrap_or_default();
                    log::info!("[Discovery] Jive: {}", hex_bytes(jive));
                    continue;
                }
                other => {
                    log::error!("[Discovery] Unexpected information request: {}", other);
                    continue;
                }
            };
            response.push(TlvEntry::new(entry.tag, value));
        }
        response
    }
}

/// Owns the discovery socket.
pub struct DiscoveryService {
    responder: DiscoveryResponder,
    socket: UdpSocket,
}

impl DiscoveryService {
    /// Binds the discovery socket with address reuse and broadcast enabled.
    pub fn bind(addr: SocketAddr, responder: DiscoveryResponder) -> DiscoveryResult<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(DiscoveryError::SocketBind)?;

        if let Err(e) = socket.set_reuse_address(true) {
            log::warn!("[Discovery] Failed to set SO_REUSEADDR on {}: {}", addr, e);
        }
        #[cfg(unix)]
        if let Err(e) = socket.set_reuse_port(true) {
            log::warn!("[Discovery] Failed to set SO_REUSEPORT on {}: {}", addr, e);
        }
        if let Err(e) = socket.set_broadcast(true) {
            log::warn!("[Discovery] Failed to set SO_BROADCAST on {}: {}", addr, e);
        }

        socket
            .set_nonblocking(true)
            .map_err(DiscoveryError::SocketBind)?;
        socket
            .bind(&addr.into())
            .map_err(DiscoveryError::SocketBind)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket).map_err(DiscoveryError::SocketBind)?;
        Ok(Self { responder, socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Answers datagrams until `cancel` fires. Malformed datagrams are logged and dropped.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let local_ip = match self.socket.local_addr() {
            Ok(addr) => {
                log::info!("[Discovery] Listening on {}", addr);
                addr.ip()
            }
            Err(e) => {
                log::warn!("[Discovery] Could not read local address: {}", e);
                IpAddr::from([0, 0, 0, 0])
            }
        };

        let mut buf = vec![0u8; 1500];
        loop {
            let (len, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        log::warn!("[Discovery] Receive failed: {}", e);
                        continue;
                    }
                },
            };

            match self.responder.respond(&buf[..len], local_ip) {
                Ok(Some(reply)) => {
                    log::debug!("[Discovery] Replying to {} ({} bytes)", peer, reply.len());
                    if let Err(e) = self.socket.send_to(&reply, peer).await {
                        log::warn!("[Discovery] {}", DiscoveryError::Send(e));
                    }
                }
                Ok(None) => {}
                Err(e) => log::debug!("[Discovery] Dropping datagram from {}: {}", peer, e),
            }
        }
        log::info!("[Discovery] Stopped");
    }
}
