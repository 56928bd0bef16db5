//! Per-device subscriber groups.
//!
//! Each device id owns one group with at most one agent member (the device's
//! live session) and any number of browser members. Group identity is the
//! device id itself, so a group rematerializes whenever a member joins and
//! the entry is dropped once the last member leaves.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One subscriber's slot in a group.
struct GroupMember {
    id: Uuid,
    tx: mpsc::Sender<Message>,
}

#[derive(Default)]
struct DeviceEntry {
    agent: Option<GroupMember>,
    browsers: HashMap<Uuid, mpsc::Sender<Message>>,
}

impl DeviceEntry {
    fn is_empty(&self) -> bool {
        self.agent.is_none() && self.browsers.is_empty()
    }
}

/// Thread-safe registry of live subscriber groups, keyed by device id.
#[derive(Clone, Default)]
pub struct DeviceGroups {
    groups: Arc<RwLock<HashMap<String, DeviceEntry>>>,
}

impl DeviceGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the device's agent member, superseding any previous one.
    ///
    /// The superseded member is asked to close; its eventual cleanup is a
    /// no-op because membership is id-checked in [`leave_agent`].
    ///
    /// [`leave_agent`]: DeviceGroups::leave_agent
    pub async fn join_agent(&self, device_id: &str, tx: mpsc::Sender<Message>) -> Uuid {
        let member_id = Uuid::new_v4();
        let superseded = {
            let mut groups = self.groups.write().await;
            let entry = groups.entry(device_id.to_string()).or_default();
            entry.agent.replace(GroupMember { id: member_id, tx })
        };

        if let Some(old) = superseded {
            warn!(device_id = %device_id, superseded = %old.id, "Agent session superseded by a newer handshake");
            let _ = old.tx.try_send(Message::Close(None));
        }

        info!(device_id = %device_id, member_id = %member_id, "Agent joined group");
        member_id
    }

    /// Remove the agent member if it still holds the slot.
    ///
    /// Returns whether the departing member owned the slot; only then may the
    /// caller mark the device offline. A superseded session leaving later
    /// must not clobber its replacement's state.
    pub async fn leave_agent(&self, device_id: &str, member_id: Uuid) -> bool {
        let mut groups = self.groups.write().await;
        let Some(entry) = groups.get_mut(device_id) else {
            return false;
        };

        let is_current = entry.agent.as_ref().is_some_and(|m| m.id == member_id);
        if is_current {
            entry.agent = None;
            info!(device_id = %device_id, member_id = %member_id, "Agent left group");
        }
        if entry.is_empty() {
            groups.remove(device_id);
        }
        is_current
    }

    /// Add a browser member to the device's group.
    pub async fn join_browser(&self, device_id: &str, tx: mpsc::Sender<Message>) -> Uuid {
        let member_id = Uuid::new_v4();
        let mut groups = self.groups.write().await;
        let entry = groups.entry(device_id.to_string()).or_default();
        entry.browsers.insert(member_id, tx);

        info!(
            device_id = %device_id,
            member_id = %member_id,
            browsers = entry.browsers.len(),
            "Browser joined group"
        );
        member_id
    }

    /// Remove a browser member from the device's group.
    pub async fn leave_browser(&self, device_id: &str, member_id: Uuid) {
        let mut groups = self.groups.write().await;
        let Some(entry) = groups.get_mut(device_id) else {
            return;
        };

        if entry.browsers.remove(&member_id).is_some() {
            info!(device_id = %device_id, member_id = %member_id, "Browser left group");
        }
        if entry.is_empty() {
            groups.remove(device_id);
        }
    }

    /// Best-effort delivery to the device's agent member.
    ///
    /// Returns false when no agent is connected or its queue is unavailable.
    pub async fn send_to_agent(&self, device_id: &str, message: Message) -> bool {
        let tx = {
            let groups = self.groups.read().await;
            groups
                .get(device_id)
                .and_then(|entry| entry.agent.as_ref())
                .map(|member| member.tx.clone())
        };

        let Some(tx) = tx else {
            debug!(device_id = %device_id, "No agent connected; dropping frame");
            return false;
        };

        match tx.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                debug!(device_id = %device_id, error = %e, "Agent queue unavailable; dropping frame");
                false
            }
        }
    }

    /// Best-effort fan-out to the device's browser members.
    ///
    /// Members with a full or closed queue are skipped. Returns the number
    /// of members the frame was queued for.
    pub async fn broadcast_to_browsers(&self, device_id: &str, message: Message) -> usize {
        let senders: Vec<(Uuid, mpsc::Sender<Message>)> = {
            let groups = self.groups.read().await;
            groups
                .get(device_id)
                .map(|entry| {
                    entry
                        .browsers
                        .iter()
                        .map(|(id, tx)| (*id, tx.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for (member_id, tx) in senders {
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    debug!(
                        device_id = %device_id,
                        member_id = %member_id,
                        "Browser queue unavailable; skipping member"
                    );
                }
            }
        }
        delivered
    }

    /// Number of devices with a live agent session.
    pub async fn connected_agents(&self) -> usize {
        self.groups
            .read()
            .await
            .values()
            .filter(|entry| entry.agent.is_some())
            .count()
    }

    /// Number of browser members subscribed to a device's group.
    pub async fn browser_count(&self, device_id: &str) -> usize {
        self.groups
            .read()
            .await
            .get(device_id)
            .map_or(0, |entry| entry.browsers.len())
    }

    /// Number of groups with at least one member.
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }
}
