use crate::{
    common::{MemberId, ViewId},
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

/// A versioned snapshot of the group membership.
///
/// Members are kept in admission order, which decides coordinator succession.
/// Alongside the members a view records who left cleanly (`shutdown`) and who
/// was crashed or removed (`crashed`) in the change that produced it. A member
/// is in at most one of the three collections.
///
/// Once installed a view is shared as an `Arc<View>` and never changed again,
/// successors are built with [`View::successor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    creator: MemberId,
    view_id: ViewId,
    members: Vec<MemberId>,
    shutdown: HashSet<MemberId>,
    crashed: HashSet<MemberId>,
}

impl View {
    pub fn new(
        creator: MemberId,
        view_id: ViewId,
        members: Vec<MemberId>,
        shutdown: HashSet<MemberId>,
        crashed: HashSet<MemberId>,
    ) -> Self {
        let mut view = Self {
            creator,
            view_id,
            members: Vec::with_capacity(members.len()),
            shutdown: HashSet::new(),
            crashed: HashSet::new(),
        };

        for member in members {
            // Duplicates are dropped, the first admission keeps its place.
            let _ = view.add(member);
        }
        view.shutdown = shutdown
            .into_iter()
            .filter(|m| !view.contains(m))
            .collect();
        view.crashed = crashed
            .into_iter()
            .filter(|m| !view.contains(m) && !view.shutdown.contains(m))
            .collect();

        view
    }

    /// The first view of a group, holding only its creator.
    pub fn initial(creator: MemberId, view_id: ViewId) -> Self {
        let mut founder = creator.clone();
        founder.admit(view_id);
        Self::new(
            creator,
            view_id,
            vec![founder],
            HashSet::new(),
            HashSet::new(),
        )
    }

    /// Start a new view with the same members and empty departure sets.
    pub fn successor(&self, creator: MemberId, view_id: ViewId) -> Self {
        Self {
            creator,
            view_id,
            members: self.members.clone(),
            shutdown: HashSet::new(),
            crashed: HashSet::new(),
        }
    }

    pub fn creator(&self) -> &MemberId {
        &self.creator
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn shutdown_members(&self) -> &HashSet<MemberId> {
        &self.shutdown
    }

    pub fn crashed_members(&self) -> &HashSet<MemberId> {
        &self.crashed
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.contains(member)
    }

    /// The entry for `member` as this view knows it, including its join sequence.
    pub fn get(&self, member: &MemberId) -> Option<&MemberId> {
        self.members.iter().find(|m| *m == member)
    }

    /// Append a member at the end of the admission order.
    pub fn add(&mut self, member: MemberId) -> Result<()> {
        if self.contains(&member) {
            return Err(Error::new_member_already_in_view());
        }

        self.shutdown.remove(&member);
        self.crashed.remove(&member);
        self.members.push(member);

        Ok(())
    }

    /// Remove a member that left on its own.
    pub fn add_shutdown(&mut self, member: &MemberId) -> Result<MemberId> {
        let removed = self.remove(member)?;
        self.shutdown.insert(removed.clone());
        Ok(removed)
    }

    /// Remove a member that crashed or was forced out.
    pub fn add_crashed(&mut self, member: &MemberId) -> Result<MemberId> {
        let removed = self.remove(member)?;
        self.crashed.insert(removed.clone());
        Ok(removed)
    }

    fn remove(&mut self, member: &MemberId) -> Result<MemberId> {
        let idx = self
            .members
            .iter()
            .position(|m| m == member)
            .ok_or_else(Error::new_member_not_in_view)?;

        Ok(self.members.remove(idx))
    }

    /// The member in charge of creating views: the oldest surviving member.
    pub fn coordinator(&self) -> Option<&MemberId> {
        self.members.first()
    }

    /// Same as [`View::coordinator`] while pretending `departed` already left.
    pub fn coordinator_excluding(&self, departed: &HashSet<MemberId>) -> Option<&MemberId> {
        self.members.iter().find(|m| !departed.contains(m))
    }

    pub fn total_weight(&self) -> u32 {
        self.members.iter().map(|m| u32::from(m.weight())).sum()
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "View[{}; {}|{}]", self.creator, self.view_id, self.members.len())?;
        write!(f, " members: {:?}", self.members)?;
        if !self.shutdown.is_empty() {
            write!(f, " shutdown: {:?}", self.shutdown)?;
        }
        if !self.crashed.is_empty() {
            write!(f, " crashed: {:?}", self.crashed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::member;

    fn view(id: ViewId, ports: &[u16]) -> View {
        let members = ports.iter().map(|p| member(*p)).collect::<Vec<_>>();
        View::new(
            members[0].clone(),
            id,
            members,
            HashSet::new(),
            HashSet::new(),
        )
    }

    #[test]
    fn add() {
        let mut view = view(1, &[1]);
        view.add(member(2)).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.members()[1], member(2));
    }

    #[test]
    fn re_addition() {
        let mut view = view(1, &[1, 2]);
        let err = view.add(member(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemberAlreadyInView);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn remove_invalid() {
        let mut view = view(1, &[1]);
        let err = view.add_crashed(&member(9)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemberNotInView);
    }

    #[test]
    fn departures_are_exclusive() {
        let mut view = view(1, &[1, 2, 3]);
        view.add_shutdown(&member(2)).unwrap();
        view.add_crashed(&member(3)).unwrap();

        assert_eq!(view.members(), &[member(1)][..]);
        assert!(view.shutdown_members().contains(&member(2)));
        assert!(view.crashed_members().contains(&member(3)));

        view.add(member(3)).unwrap();
        assert!(!view.crashed_members().contains(&member(3)));
    }

    #[test]
    fn new_drops_overlapping_departures() {
        let shutdown = vec![member(1), member(3)].into_iter().collect();
        let crashed = vec![member(3), member(4)].into_iter().collect();
        let view = View::new(member(1), 2, vec![member(1), member(2)], shutdown, crashed);

        assert_eq!(view.shutdown_members().len(), 1);
        assert!(view.shutdown_members().contains(&member(3)));
        assert_eq!(view.crashed_members().len(), 1);
        assert!(view.crashed_members().contains(&member(4)));
    }

    #[test]
    fn coordinator_follows_admission_order() {
        let view = view(1, &[3, 1, 2]);
        assert_eq!(view.coordinator(), Some(&member(3)));

        let departed = vec![member(3)].into_iter().collect();
        assert_eq!(view.coordinator_excluding(&departed), Some(&member(1)));
    }

    #[test]
    fn successor_keeps_members_only() {
        let mut base = view(4, &[1, 2, 3]);
        base.add_crashed(&member(3)).unwrap();

        let next = base.successor(member(2), 10);
        assert_eq!(next.view_id(), 10);
        assert_eq!(next.creator(), &member(2));
        assert_eq!(next.members(), base.members());
        assert!(next.crashed_members().is_empty());
    }

    #[test]
    fn initial_admits_creator() {
        let view = View::initial(member(1), 1);
        assert_eq!(view.get(&member(1)).unwrap().join_view_id(), Some(1));
    }

    #[test]
    fn total_weight() {
        let mut view = view(1, &[1, 2]);
        view.add(member(3).with_weight(20)).unwrap();
        assert_eq!(view.total_weight(), 40);
    }
}
