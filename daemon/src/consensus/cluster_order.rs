//! Leader rotation order for one round.

use takara_common::crypto::PublicKey;
use takara_common::model::Peer;

#[derive(Debug, Clone)]
pub struct ClusterOrdering {
    order: Vec<Peer>,
    index: usize,
}

impl ClusterOrdering {
    /// `None` for an empty peer list.
    pub fn create(order: Vec<Peer>) -> Option<Self> {
        if order.is_empty() {
            return None;
        }
        Some(Self { order, index: 0 })
    }

    /// Builds the ordering by picking `peers[positions[i]]` for every i.
    pub fn with_positions(peers: &[Peer], positions: &[usize]) -> Option<Self> {
        if peers.is_empty() || positions.len() != peers.len() {
            return None;
        }
        let order = positions.iter().map(|&i| peers[i].clone()).collect();
        Some(Self { order, index: 0 })
    }

    /// Current leader; wraps around past the end.
    pub fn current_leader(&mut self) -> &Peer {
        if self.index >= self.order.len() {
            self.index = 0;
        }
        &self.order[self.index]
    }

    pub fn switch_to_next(&mut self) -> &mut Self {
        self.index += 1;
        self
    }

    pub fn has_next(&self) -> bool {
        self.index != self.order.len()
    }

    pub fn peers(&self) -> &[Peer] {
        &self.order
    }

    pub fn number_of_peers(&self) -> usize {
        self.order.len()
    }

    pub fn contains(&self, public_key: &PublicKey) -> bool {
        self.order.iter().any(|peer| peer.public_key == *public_key)
    }

    pub fn find(&self, public_key: &PublicKey) -> Option<&Peer> {
        self.order.iter().find(|peer| peer.public_key == *public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(byte: u8) -> Peer {
        Peer::new(PublicKey::from_bytes([byte; 32]), format!("peer{}:50541", byte))
    }

    #[test]
    fn test_rotation_wraps() {
        let peers = vec![peer(1), peer(2), peer(3)];
        let mut order = ClusterOrdering::create(peers.clone()).unwrap();
        assert_eq!(order.current_leader().public_key, peers[0].public_key);
        order.switch_to_next();
        assert_eq!(order.current_leader().public_key, peers[1].public_key);
        order.switch_to_next();
        order.switch_to_next();
        assert!(!order.has_next());
        // wraps back to the first peer
        assert_eq!(order.current_leader().public_key, peers[0].public_key);
    }

    #[test]
    fn test_empty_order_rejected() {
        assert!(ClusterOrdering::create(Vec::new()).is_none());
    }

    #[test]
    fn test_with_positions() {
        let peers = vec![peer(1), peer(2), peer(3)];
        let order = ClusterOrdering::with_positions(&peers, &[2, 0, 1]).unwrap();
        let keys: Vec<_> = order.peers().iter().map(|p| p.public_key).collect();
        assert_eq!(
            keys,
            vec![peers[2].public_key, peers[0].public_key, peers[1].public_key]
        );
        assert!(ClusterOrdering::with_positions(&peers, &[0]).is_none());
    }
}
