//! The context of one network step: everything the simulation loop needs to push inbound
//!  datagrams through decoding and dispatch, and to drain outbound queues into datagrams.
//!
//! Sockets are not part of this: the caller feeds received datagrams into
//!  [NetSession::on_datagram] and sends whatever [NetSession::poll_outbound] returns.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use bytes::{Bytes, BytesMut};
use tracing::{debug, info, trace, warn};

use crate::config::NetConfig;
use crate::congestion::CongestionMonitor;
use crate::decoder::PacketDecoder;
use crate::error::CodecError;
use crate::handler::MessageHandler;
use crate::health::LinkHealth;
use crate::message::NetworkMessage;
use crate::peer::{PeerAddr, PeerId};
use crate::queue::{OutboundQueue, PacketSource};
use crate::record::FactoryTable;
use crate::wire::{Priority, WireHeader};

/// A datagram ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPacket {
    pub peer: PeerId,
    pub to: PeerAddr,
    pub bytes: Bytes,
}

struct PeerEntry {
    addr: PeerAddr,
    queue: OutboundQueue,
}

pub struct NetSession {
    config: NetConfig,
    myself: PeerId,
    table: Arc<FactoryTable>,
    peers: BTreeMap<PeerId, PeerEntry>,
    decoder: PacketDecoder,
    health: Arc<LinkHealth>,
    congestion: CongestionMonitor,
    /// rotates the choice between peers with equal priority
    round_robin: usize,
}

impl NetSession {
    pub fn new(config: NetConfig, myself: PeerId, table: Arc<FactoryTable>) -> anyhow::Result<NetSession> {
        config.validate()?;

        info!(?myself, record_types = table.len(), max_packet_size = config.max_packet_size, "starting network session");

        let health = Arc::new(LinkHealth::new());
        let decoder = PacketDecoder::new(table.clone(), health.clone(), config.max_payload_len());
        let congestion = CongestionMonitor::new(&config);

        Ok(NetSession {
            config,
            myself,
            table,
            peers: BTreeMap::new(),
            decoder,
            health,
            congestion,
            round_robin: 0,
        })
    }

    pub fn myself(&self) -> PeerId {
        self.myself
    }

    pub fn table(&self) -> &Arc<FactoryTable> {
        &self.table
    }

    pub fn health(&self) -> &Arc<LinkHealth> {
        &self.health
    }

    pub fn congestion(&self) -> &CongestionMonitor {
        &self.congestion
    }

    pub fn add_peer(&mut self, peer: PeerId, addr: PeerAddr) -> anyhow::Result<()> {
        if peer == self.myself {
            bail!("{:?} is this session's own peer id", peer);
        }
        if self.peers.contains_key(&peer) {
            bail!("peer {:?} was added already", peer);
        }

        info!(?peer, %addr, "adding peer");
        self.peers.insert(peer, PeerEntry {
            addr,
            queue: OutboundQueue::new(self.myself, peer, self.table.clone()),
        });
        Ok(())
    }

    /// removes a peer, discarding all messages queued for it
    pub fn remove_peer(&mut self, peer: PeerId) -> anyhow::Result<()> {
        match self.peers.remove(&peer) {
            Some(mut entry) => {
                info!(?peer, addr = %entry.addr, "removing peer");
                entry.queue.clear();
                Ok(())
            }
            None => bail!("peer {:?} is not part of the session", peer),
        }
    }

    pub fn peers(&self) -> Vec<(PeerId, PeerAddr)> {
        self.peers.iter()
            .map(|(&peer, entry)| (peer, entry.addr))
            .collect()
    }

    /// number of messages queued for a peer
    pub fn pending(&self, peer: PeerId) -> usize {
        self.peers.get(&peer)
            .map(|entry| entry.queue.size())
            .unwrap_or(0)
    }

    pub fn add_message_handler(&mut self, handler: Arc<dyn MessageHandler>) -> bool {
        self.decoder.add_message_handler(handler)
    }

    pub fn remove_message_handler(&mut self, handler: &Arc<dyn MessageHandler>) -> bool {
        self.decoder.remove_message_handler(handler)
    }

    /// Queues a message for its destination peer. It is serialized and sent by one of the
    ///  following calls to [NetSession::poll_outbound].
    pub fn send(&mut self, msg: NetworkMessage) -> anyhow::Result<()> {
        if msg.source != self.myself {
            bail!("message source {:?} is not this session's peer {:?}", msg.source, self.myself);
        }
        if self.table.local_id_of(msg.record_type()).is_none() {
            bail!("record type {:?} is not part of this session's factory table", msg.record_type());
        }
        let Some(entry) = self.peers.get_mut(&msg.destination) else {
            bail!("destination {:?} is not part of the session", msg.destination);
        };

        entry.queue.queue(msg);
        Ok(())
    }

    /// Handles a received datagram, returning true if it was decoded and passed to the handlers.
    ///  Malformed datagrams are counted and dropped.
    pub fn on_datagram(&mut self, datagram: &[u8]) -> bool {
        let result = self.handle_datagram(datagram);
        self.check_health_window();
        result
    }

    fn handle_datagram(&mut self, datagram: &[u8]) -> bool {
        let mut buf = datagram;
        let header = match WireHeader::deser(&mut buf) {
            Ok(header) => header,
            Err(e) => {
                debug!(len = datagram.len(), "dropping datagram with invalid header: {}", e);
                self.health.packet_received(datagram.len());
                self.health.decode_error();
                return false;
            }
        };

        if header.destination != self.myself {
            debug!(?header, "dropping datagram addressed to a different peer");
            self.health.packet_received(datagram.len());
            self.health.dropped();
            return false;
        }

        trace!(?header, payload_len = buf.len(), "received datagram");
        self.decoder.handle_packet(&header, buf).is_ok()
    }

    fn check_health_window(&mut self) {
        if self.health.window_len() < self.config.health_window {
            return;
        }

        let error_ratio = self.health.take_window();
        if error_ratio > self.config.max_error_ratio {
            warn!(error_ratio, max_error_ratio = self.config.max_error_ratio, "link is unhealthy");
            self.health.log_health();
        }
        self.congestion.record_error_ratio(error_ratio);
    }

    /// Feeds a round trip time measurement from the transport into congestion control,
    ///  returning the resulting drop probability.
    pub fn record_rtt(&mut self, rtt: Duration) -> f64 {
        self.congestion.record_rtt(rtt)
    }

    /// The peer whose next message has the highest priority. Between peers with the same
    ///  priority, the choice rotates.
    fn next_peer(&self) -> Option<(PeerId, Priority)> {
        let candidates = self.peers.values()
            .filter_map(|entry| entry.queue.peek_priority())
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return None;
        }

        let start = self.round_robin % candidates.len();
        let mut best = candidates[start];
        for offset in 1..candidates.len() {
            let candidate = candidates[(start + offset) % candidates.len()];
            if candidate.1 > best.1 {
                best = candidate;
            }
        }
        Some(best)
    }

    /// One network step's worth of sending: packets are taken from the peers' queues in
    ///  priority order until the queues are empty or the send budget is used up.
    pub fn poll_outbound(&mut self) -> Vec<OutgoingPacket> {
        let max_payload_len = self.config.max_payload_len();
        let mut payload_buf = vec![0u8; max_payload_len];
        let mut budget = self.config.send_budget_per_step;
        let conn_stat = self.congestion.conn_stat();

        let mut result = Vec::new();
        while let Some((peer, priority)) = self.next_peer() {
            self.round_robin = self.round_robin.wrapping_add(1);

            let Some(entry) = self.peers.get_mut(&peer) else {
                break;
            };

            let header_len = if priority == Priority::Reliable { WireHeader::RECEIPT_LEN } else { WireHeader::SIMPLE_LEN };
            if budget < header_len {
                break;
            }

            if self.congestion.should_drop(priority) {
                entry.queue.skip_packet();
                self.health.dropped();
                continue;
            }
            let buf_len = max_payload_len.min(budget - header_len);

            let mut header = WireHeader {
                conn_stat,
                ..Default::default()
            };
            match entry.queue.get_packet(&mut header, &mut payload_buf[..buf_len]) {
                Ok(Some(payload_len)) => {
                    let mut datagram = BytesMut::with_capacity(header.serialized_len() + payload_len);
                    if let Err(e) = header.ser(&mut datagram) {
                        warn!(?peer, ?header, "dropping packet with unserializable header: {}", e);
                        self.health.encode_error();
                        continue;
                    }
                    datagram.extend_from_slice(&payload_buf[..payload_len]);

                    budget = budget.saturating_sub(datagram.len());
                    self.health.packet_sent(datagram.len());
                    result.push(OutgoingPacket {
                        peer,
                        to: entry.addr,
                        bytes: datagram.freeze(),
                    });
                }
                Ok(None) => break,
                Err(CodecError::Overflow { .. }) if buf_len < max_payload_len => {
                    trace!(?peer, budget, "send budget used up");
                    break;
                }
                Err(e) => {
                    warn!(?peer, "skipping message that can not be sent: {}", e);
                    entry.queue.skip_packet();
                    self.health.encode_error();
                }
            }
        }

        trace!(num_packets = result.len(), remaining_budget = budget, "polled outbound packets");
        result
    }
}
