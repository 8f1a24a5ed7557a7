//! Room-membership reconciliation.
//!
//! Planning is pure: [`plan_membership`] turns the desired roster and the
//! observed occupants into an ordered list of [`MembershipAction`]s. The
//! [`RoomSynchronizer`] fetches the inputs, plans, and executes the actions
//! against a [`RoomApi`], stopping at the first failure.
//!
//! Actions always come in the same order: invites, one power-level write,
//! kicks. The agent is part of every allowed set and is never kicked.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::{
    api::{PermissionTier, RoomApi, StateContent, event_type},
    error::RemoteError,
    ids::{RoomId, UserId},
};

/// One mutation of a room's membership or permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipAction {
    /// Invite a desired user who is not present
    Invite {
        /// User to invite
        user_id: UserId,
    },

    /// Replace the explicit user levels of the room
    SetPowerLevels {
        /// Complete user level map
        users: BTreeMap<UserId, i64>,
    },

    /// Remove a present user who is no longer allowed
    Kick {
        /// User to remove
        user_id: UserId,
    },
}

/// Target user levels: staff at [`PermissionTier::Staff`], the agent at
/// [`PermissionTier::Owner`]. Learners get no entry.
pub fn target_power_levels(self_id: &UserId, staff: &BTreeSet<UserId>) -> BTreeMap<UserId, i64> {
    let mut users: BTreeMap<UserId, i64> =
        staff.iter().map(|user| (user.clone(), PermissionTier::Staff.level())).collect();
    users.insert(self_id.clone(), PermissionTier::Owner.level());
    users
}

/// Actions that bring a room from `present` to the desired membership.
///
/// A user listed both as learner and staff is treated as staff. Every user in
/// the desired set who is not present gets exactly one invite; every present
/// user outside it (and other than `self_id`) gets exactly one kick.
pub fn plan_membership(
    self_id: &UserId,
    present: &BTreeSet<UserId>,
    learners: &BTreeSet<UserId>,
    staff: &BTreeSet<UserId>,
) -> Vec<MembershipAction> {
    let desired: BTreeSet<&UserId> = learners.union(staff).collect();

    let invites = desired
        .iter()
        .filter(|user| **user != self_id && !present.contains(**user))
        .map(|user| MembershipAction::Invite { user_id: (**user).clone() });

    let power = MembershipAction::SetPowerLevels { users: target_power_levels(self_id, staff) };

    let kicks = present
        .iter()
        .filter(|user| *user != self_id && !desired.contains(user))
        .map(|user| MembershipAction::Kick { user_id: user.clone() });

    invites.chain(std::iter::once(power)).chain(kicks).collect()
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Reconciled room
    pub room_id: RoomId,
    /// Invites issued
    pub invited: usize,
    /// Kicks issued
    pub kicked: usize,
}

/// Applies membership plans to remote rooms.
#[derive(Debug, Clone)]
pub struct RoomSynchronizer<A> {
    api: A,
}

impl<A: RoomApi> RoomSynchronizer<A> {
    /// Synchronizer backed by `api`.
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Make the room's occupants and user levels match the roster.
    ///
    /// # Errors
    ///
    /// The first failing remote call aborts the pass. Actions already applied
    /// stay applied; a rerun issues only what is still missing.
    pub fn synchronize_room_members(
        &self,
        room_id: &RoomId,
        learners: &BTreeSet<UserId>,
        staff: &BTreeSet<UserId>,
    ) -> Result<SyncReport, RemoteError> {
        let self_id = self.api.whoami()?;
        let present = self.api.list_occupants(room_id)?;
        let actions = plan_membership(&self_id, &present, learners, staff);

        let mut report = SyncReport { room_id: room_id.clone(), invited: 0, kicked: 0 };
        for action in actions {
            self.apply(room_id, action, &mut report)?;
        }

        tracing::info!(
            %room_id,
            invited = report.invited,
            kicked = report.kicked,
            "room members synchronized"
        );
        Ok(report)
    }

    /// Kick every occupant except the agent. Returns the number kicked.
    pub fn evict_all(&self, room_id: &RoomId) -> Result<usize, RemoteError> {
        let self_id = self.api.whoami()?;
        let present = self.api.list_occupants(room_id)?;

        let mut kicked = 0;
        for user_id in present.iter().filter(|user| **user != self_id) {
            tracing::debug!(%room_id, %user_id, "kicking");
            self.api.kick_user(user_id, room_id)?;
            kicked += 1;
        }

        tracing::info!(%room_id, kicked, "room emptied");
        Ok(kicked)
    }

    fn apply(
        &self,
        room_id: &RoomId,
        action: MembershipAction,
        report: &mut SyncReport,
    ) -> Result<(), RemoteError> {
        match action {
            MembershipAction::Invite { user_id } => {
                tracing::debug!(%room_id, %user_id, "inviting");
                self.api.invite_user(&user_id, room_id)?;
                report.invited += 1;
            },
            MembershipAction::SetPowerLevels { users } => {
                let mut content = self.api.get_state(room_id, event_type::POWER_LEVELS, "")?;
                content.insert("users".to_string(), users_value(&users));
                tracing::debug!(%room_id, users = users.len(), "writing power levels");
                self.api.set_state(room_id, event_type::POWER_LEVELS, "", &content)?;
            },
            MembershipAction::Kick { user_id } => {
                tracing::debug!(%room_id, %user_id, "kicking");
                self.api.kick_user(&user_id, room_id)?;
                report.kicked += 1;
            },
        }
        Ok(())
    }
}

fn users_value(users: &BTreeMap<UserId, i64>) -> Value {
    let map: StateContent =
        users.iter().map(|(user, level)| (user.to_string(), Value::from(*level))).collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn set(ids: &[&str]) -> BTreeSet<UserId> {
        ids.iter().map(|id| user(id)).collect()
    }

    fn invites(actions: &[MembershipAction]) -> Vec<&str> {
        actions
            .iter()
            .filter_map(|a| match a {
                MembershipAction::Invite { user_id } => Some(user_id.as_str()),
                _ => None,
            })
            .collect()
    }

    fn kicks(actions: &[MembershipAction]) -> Vec<&str> {
        actions
            .iter()
            .filter_map(|a| match a {
                MembershipAction::Kick { user_id } => Some(user_id.as_str()),
                _ => None,
            })
            .collect()
    }

    fn power(actions: &[MembershipAction]) -> &BTreeMap<UserId, i64> {
        let mut writes = actions.iter().filter_map(|a| match a {
            MembershipAction::SetPowerLevels { users } => Some(users),
            _ => None,
        });
        let users = writes.next().unwrap();
        assert!(writes.next().is_none(), "exactly one power-level write");
        users
    }

    #[test]
    fn invites_missing_and_kicks_stale() {
        let me = user("@bot:x");
        let present = set(&["@a:x", "@b:x", "@bot:x"]);
        let learners = set(&["@a:x", "@c:x"]);

        let actions = plan_membership(&me, &present, &learners, &BTreeSet::new());

        assert_eq!(invites(&actions), vec!["@c:x"]);
        assert_eq!(kicks(&actions), vec!["@b:x"]);
        assert_eq!(power(&actions), &BTreeMap::from([(me, 100)]));
    }

    #[test]
    fn actions_are_ordered_invites_power_kicks() {
        let me = user("@bot:x");
        let present = set(&["@old:x"]);
        let learners = set(&["@new:x"]);

        let actions = plan_membership(&me, &present, &learners, &BTreeSet::new());

        assert!(matches!(actions[0], MembershipAction::Invite { .. }));
        assert!(matches!(actions[1], MembershipAction::SetPowerLevels { .. }));
        assert!(matches!(actions[2], MembershipAction::Kick { .. }));
        assert_eq!(actions.len(), 3);
    }

    #[test]
    fn staff_outranks_learner() {
        let me = user("@bot:x");
        let both = set(&["@u:x"]);

        let actions = plan_membership(&me, &BTreeSet::new(), &both, &both);

        assert_eq!(invites(&actions), vec!["@u:x"]);
        assert_eq!(power(&actions), &BTreeMap::from([(user("@u:x"), 99), (me, 100)]));
    }

    #[test]
    fn agent_is_never_kicked_or_invited() {
        let me = user("@bot:x");
        let present = set(&["@bot:x", "@stranger:x"]);
        let learners = set(&["@bot:x"]);

        let actions = plan_membership(&me, &present, &learners, &BTreeSet::new());

        assert!(invites(&actions).is_empty());
        assert_eq!(kicks(&actions), vec!["@stranger:x"]);
    }

    #[test]
    fn agent_listed_as_staff_stays_owner() {
        let me = user("@bot:x");
        let staff = set(&["@bot:x"]);

        let actions = plan_membership(&me, &set(&["@bot:x"]), &BTreeSet::new(), &staff);

        assert_eq!(power(&actions), &BTreeMap::from([(me, 100)]));
    }

    #[test]
    fn converged_room_only_rewrites_power_levels() {
        let me = user("@bot:x");
        let learners = set(&["@a:x"]);
        let staff = set(&["@t:x"]);
        let present = set(&["@a:x", "@t:x", "@bot:x"]);

        let actions = plan_membership(&me, &present, &learners, &staff);

        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], MembershipAction::SetPowerLevels { .. }));
    }

    #[test]
    fn users_value_is_json_object() {
        let users = BTreeMap::from([(user("@bot:x"), 100), (user("@t:x"), 99)]);
        assert_eq!(users_value(&users), serde_json::json!({ "@bot:x": 100, "@t:x": 99 }));
    }
}
