use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::glow::{Root, TreePath};

/// Stable handle of a connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Outbound side of the live peer set.
pub trait PeerSink {
    /// Queues `message` for `peer`. Returns `false` when the peer is no
    /// longer connected.
    fn deliver(&self, peer: PeerId, message: &Root) -> bool;
}

#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    entries: HashMap<TreePath, HashSet<PeerId>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, path: TreePath, peer: PeerId) {
        self.entries.entry(path).or_default().insert(peer);
    }

    pub fn unsubscribe(&mut self, path: &TreePath, peer: PeerId) {
        if let Some(peers) = self.entries.get_mut(path) {
            peers.remove(&peer);
        }
    }

    pub fn is_subscribed(&self, path: &TreePath, peer: PeerId) -> bool {
        self.entries
            .get(path)
            .is_some_and(|peers| peers.contains(&peer))
    }

    pub fn subscribers(&self, path: &TreePath) -> impl Iterator<Item = PeerId> + '_ {
        self.entries.get(path).into_iter().flatten().copied()
    }

    /// Sends `message` to every subscriber of `path` except `origin`.
    /// A peer the sink reports as gone is dropped from every entry at
    /// once; nothing is swept in the background.
    pub fn notify(
        &mut self,
        path: &TreePath,
        message: &Root,
        origin: Option<PeerId>,
        sink: &impl PeerSink,
    ) -> usize {
        let Some(peers) = self.entries.get(path) else {
            return 0;
        };
        let mut delivered = 0;
        let mut stale = Vec::new();
        for &peer in peers {
            if Some(peer) == origin {
                continue;
            }
            if sink.deliver(peer, message) {
                delivered += 1;
            } else {
                stale.push(peer);
            }
        }
        for peer in stale {
            log::debug!("Dropping stale subscriber {} (seen on {})", peer, path);
            self.remove_peer(peer);
        }
        delivered
    }

    fn remove_peer(&mut self, peer: PeerId) {
        for peers in self.entries.values_mut() {
            peers.remove(&peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct RecordingSink {
        live: HashSet<PeerId>,
        sent: RefCell<Vec<PeerId>>,
    }

    impl RecordingSink {
        fn new(live: &[u64]) -> Self {
            Self {
                live: live.iter().map(|id| PeerId(*id)).collect(),
                sent: RefCell::new(Vec::new()),
            }
        }
    }

    impl PeerSink for RecordingSink {
        fn deliver(&self, peer: PeerId, _message: &Root) -> bool {
            if self.live.contains(&peer) {
                self.sent.borrow_mut().push(peer);
                true
            } else {
                false
            }
        }
    }

    #[test]
    fn test_notify_skips_origin() {
        let path = TreePath::new(vec![0, 1]);
        let mut registry = SubscriberRegistry::new();
        registry.subscribe(path.clone(), PeerId(1));
        registry.subscribe(path.clone(), PeerId(2));

        let sink = RecordingSink::new(&[1, 2]);
        let delivered = registry.notify(&path, &Root::default(), Some(PeerId(1)), &sink);
        assert_eq!(delivered, 1);
        assert_eq!(*sink.sent.borrow(), vec![PeerId(2)]);
    }

    #[test]
    fn test_stale_peer_dropped_from_every_entry() {
        let path = TreePath::new(vec![3]);
        let other = TreePath::new(vec![4]);
        let mut registry = SubscriberRegistry::new();
        registry.subscribe(path.clone(), PeerId(7));
        registry.subscribe(other.clone(), PeerId(7));
        registry.subscribe(other.clone(), PeerId(8));

        let sink = RecordingSink::new(&[8]);
        assert_eq!(registry.notify(&path, &Root::default(), None, &sink), 0);
        assert!(!registry.is_subscribed(&path, PeerId(7)));
        assert!(!registry.is_subscribed(&other, PeerId(7)));
        assert!(registry.is_subscribed(&other, PeerId(8)));
    }

    #[test]
    fn test_unsubscribe() {
        let path = TreePath::new(vec![1]);
        let mut registry = SubscriberRegistry::new();
        registry.subscribe(path.clone(), PeerId(1));
        registry.unsubscribe(&path, PeerId(1));
        registry.unsubscribe(&TreePath::new(vec![9]), PeerId(1));
        assert_eq!(registry.subscribers(&path).count(), 0);
    }
}
