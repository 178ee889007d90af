//! Presence channel membership.

use crate::core::codec::id_string;
use crate::core::protocol::keys;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// A member of a presence channel, identified by its string user id
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceMember {
    pub user_id: String,
    pub user_info: Option<Value>,
}

impl PresenceMember {
    pub fn new(user_id: impl Into<String>, user_info: Option<Value>) -> Self {
        Self {
            user_id: user_id.into(),
            user_info,
        }
    }
}

/// Callback invoked when a member joins or leaves
pub type MemberCallback = Arc<dyn Fn(&PresenceMember) + Send + Sync>;

#[derive(Default)]
struct RosterState {
    members: Vec<PresenceMember>,
    my_id: Option<String>,
    on_added: Option<MemberCallback>,
    on_removed: Option<MemberCallback>,
}

/// Member list of a presence channel, in server order
#[derive(Default)]
pub struct PresenceRoster {
    state: Mutex<RosterState>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self) -> Vec<PresenceMember> {
        self.state.lock().members.clone()
    }

    pub fn find_member(&self, user_id: &str) -> Option<PresenceMember> {
        self.state
            .lock()
            .members
            .iter()
            .find(|m| m.user_id == user_id)
            .cloned()
    }

    /// The local member, once the subscription has been acknowledged
    pub fn me(&self) -> Option<PresenceMember> {
        let my_id = self.state.lock().my_id.clone()?;
        self.find_member(&my_id)
    }

    pub fn my_id(&self) -> Option<String> {
        self.state.lock().my_id.clone()
    }

    pub fn on_member_added(&self, callback: impl Fn(&PresenceMember) + Send + Sync + 'static) {
        self.state.lock().on_added = Some(Arc::new(callback));
    }

    pub fn on_member_removed(&self, callback: impl Fn(&PresenceMember) + Send + Sync + 'static) {
        self.state.lock().on_removed = Some(Arc::new(callback));
    }

    pub(crate) fn set_callbacks(
        &self,
        on_added: Option<MemberCallback>,
        on_removed: Option<MemberCallback>,
    ) {
        let mut state = self.state.lock();
        if on_added.is_some() {
            state.on_added = on_added;
        }
        if on_removed.is_some() {
            state.on_removed = on_removed;
        }
    }

    /// Record the local member id from the `channel_data` sent with the subscription
    pub(crate) fn set_my_id_from_channel_data(&self, channel_data: &str) {
        let Ok(value) = serde_json::from_str::<Value>(channel_data) else {
            debug!("Unable to parse channel data: {}", channel_data);
            return;
        };
        if let Some(id) = value.get(keys::USER_ID).and_then(id_string) {
            self.state.lock().my_id = Some(id);
        }
    }

    /// Add a member from a `{user_id, user_info?}` object and notify
    pub(crate) fn add_member(&self, member: &Value) -> Option<PresenceMember> {
        let user_id = member.get(keys::USER_ID).and_then(id_string)?;
        let user_info = member
            .get(keys::USER_INFO)
            .filter(|info| !info.is_null())
            .cloned();
        let member = PresenceMember::new(user_id, user_info);

        let callback = {
            let mut state = self.state.lock();
            if state.members.iter().any(|m| m.user_id == member.user_id) {
                return None;
            }
            state.members.push(member.clone());
            state.on_added.clone()
        };

        if let Some(callback) = callback {
            callback(&member);
        }
        Some(member)
    }

    /// Remove the member named by a `{user_id}` object and notify
    pub(crate) fn remove_member(&self, member: &Value) -> Option<PresenceMember> {
        let user_id = member.get(keys::USER_ID).and_then(id_string)?;

        let (removed, callback) = {
            let mut state = self.state.lock();
            let index = state.members.iter().position(|m| m.user_id == user_id)?;
            let removed = state.members.remove(index);
            (removed, state.on_removed.clone())
        };

        if let Some(callback) = callback {
            callback(&removed);
        }
        Some(removed)
    }

    /// Replace the member list from subscription-succeeded data
    ///
    /// Expects `{"presence": {"hash": {user_id: user_info, ...}}}`. Member
    /// callbacks are not invoked.
    pub(crate) fn add_existing_members(&self, subscription_data: &Value) {
        let Some(hash) = subscription_data
            .get(keys::PRESENCE)
            .and_then(|presence| presence.get(keys::HASH))
            .and_then(Value::as_object)
        else {
            debug!("Subscription data has no presence hash");
            return;
        };

        let members = hash
            .iter()
            .map(|(user_id, info)| {
                let info = (!info.is_null()).then(|| info.clone());
                PresenceMember::new(user_id.clone(), info)
            })
            .collect();

        self.state.lock().members = members;
    }
}
