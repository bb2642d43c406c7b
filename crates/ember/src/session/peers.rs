use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::glow::Root;
use crate::subscribers::{PeerId, PeerSink};

#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub connected_at: Instant,
}

#[derive(Debug)]
struct Peer {
    info: PeerInfo,
    outbound: mpsc::UnboundedSender<Root>,
}

/// Live peers and their outbound queues.
#[derive(Debug, Default)]
pub(crate) struct PeerTable {
    peers: HashMap<PeerId, Peer>,
}

impl PeerTable {
    pub fn insert(&mut self, id: PeerId, addr: SocketAddr, outbound: mpsc::UnboundedSender<Root>) {
        let info = PeerInfo {
            id,
            addr,
            connected_at: Instant::now(),
        };
        self.peers.insert(id, Peer { info, outbound });
    }

    pub fn remove(&mut self, id: PeerId) -> Option<PeerInfo> {
        self.peers.remove(&id).map(|peer| peer.info)
    }

    pub fn infos(&self) -> Vec<PeerInfo> {
        let mut infos: Vec<PeerInfo> = self.peers.values().map(|p| p.info.clone()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }
}

impl PeerSink for PeerTable {
    fn deliver(&self, peer: PeerId, message: &Root) -> bool {
        self.peers
            .get(&peer)
            .is_some_and(|p| p.outbound.send(message.clone()).is_ok())
    }
}
