//! Cluster membership state machine.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors raised by cluster transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("already a member of the cluster led by {leader}")]
    AlreadyMember { leader: Ipv4Addr },
}

/// This node's place in the clustering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterRole {
    /// Not part of any cluster.
    Unclustered,
    /// Sent a join request and awaiting confirmation.
    PendingJoin { leader: Ipv4Addr, key: u16 },
    /// Member of `leader`'s cluster.
    Member { leader: Ipv4Addr, key: u16 },
    /// Leader of a cluster; members with the key each matched.
    Leader { members: BTreeMap<Ipv4Addr, u16> },
}

/// Cluster state owned by the engine.
#[derive(Clone, Debug)]
pub struct ClusterState {
    role: ClusterRole,
}

impl Default for ClusterState {
    fn default() -> Self {
        Self {
            role: ClusterRole::Unclustered,
        }
    }
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(&self) -> &ClusterRole {
        &self.role
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.role, ClusterRole::Leader { .. })
    }

    pub fn is_member(&self) -> bool {
        matches!(self.role, ClusterRole::Member { .. })
    }

    /// Part of a cluster in either role.
    pub fn is_clustered(&self) -> bool {
        self.is_leader() || self.is_member()
    }

    /// Leader of the cluster this node belongs to (itself excluded).
    pub fn leader(&self) -> Option<Ipv4Addr> {
        match self.role {
            ClusterRole::Member { leader, .. } => Some(leader),
            _ => None,
        }
    }

    /// Leader a join is pending with.
    pub fn pending_leader(&self) -> Option<Ipv4Addr> {
        match self.role {
            ClusterRole::PendingJoin { leader, .. } => Some(leader),
            _ => None,
        }
    }

    /// Members if this node leads a cluster.
    pub fn members(&self) -> Option<&BTreeMap<Ipv4Addr, u16>> {
        match &self.role {
            ClusterRole::Leader { members } => Some(members),
            _ => None,
        }
    }

    /// Start joining `leader`. Only an unclustered node without a pending
    /// join may start one.
    pub fn begin_join(&mut self, leader: Ipv4Addr, key: u16) -> bool {
        if self.role != ClusterRole::Unclustered {
            return false;
        }
        self.role = ClusterRole::PendingJoin { leader, key };
        true
    }

    /// Complete the pending join with `leader`.
    pub fn confirm_join(&mut self, leader: Ipv4Addr) -> bool {
        match self.role {
            ClusterRole::PendingJoin { leader: pending, key } if pending == leader => {
                self.role = ClusterRole::Member { leader, key };
                true
            }
            _ => false,
        }
    }

    /// Abandon the pending join with `leader`.
    pub fn join_timed_out(&mut self, leader: Ipv4Addr) -> bool {
        match self.role {
            ClusterRole::PendingJoin { leader: pending, .. } if pending == leader => {
                self.role = ClusterRole::Unclustered;
                true
            }
            _ => false,
        }
    }

    /// Accept `joiner` as a member, becoming leader if not one already.
    ///
    /// Returns true if the joiner was not yet a member. A pending join of
    /// our own is dropped.
    pub fn accept_member(&mut self, joiner: Ipv4Addr, key: u16) -> Result<bool, ClusterError> {
        if let ClusterRole::Member { leader, .. } = self.role {
            return Err(ClusterError::AlreadyMember { leader });
        }
        if let ClusterRole::Leader { members } = &mut self.role {
            return Ok(members.insert(joiner, key).is_none());
        }
        let mut members = BTreeMap::new();
        members.insert(joiner, key);
        self.role = ClusterRole::Leader { members };
        Ok(true)
    }

    /// Drop a member. The leader stays leader even with no members left.
    pub fn remove_member(&mut self, addr: &Ipv4Addr) -> bool {
        match &mut self.role {
            ClusterRole::Leader { members } => members.remove(addr).is_some(),
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.role = ClusterRole::Unclustered;
    }
}
