use dashmap::DashMap;
use socketioxide::socket::Sid;
use std::collections::HashSet;
use uuid::Uuid;

/// In-process session registry tracking which users have live sockets.
///
/// Presence is owned here, keyed by user id, decoupled from the user
/// profile record: the `is_online` column is only written through on the
/// first-connect and last-disconnect transitions this registry reports.
#[derive(Default)]
pub struct PresenceRegistry {
    sessions: DashMap<Uuid, HashSet<Sid>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new socket for the user. Returns true when this is the
    /// user's first live session, i.e. the user just came online.
    pub fn connect(&self, user_id: Uuid, sid: Sid) -> bool {
        let mut entry = self.sessions.entry(user_id).or_default();
        let was_offline = entry.is_empty();
        entry.insert(sid);
        was_offline
    }

    /// Drop a socket for the user. Returns true when no sessions remain,
    /// i.e. the user just went offline.
    pub fn disconnect(&self, user_id: Uuid, sid: Sid) -> bool {
        let went_offline = match self.sessions.get_mut(&user_id) {
            Some(mut entry) => {
                entry.remove(&sid);
                entry.is_empty()
            }
            None => return false,
        };
        if went_offline {
            self.sessions.remove_if(&user_id, |_, sids| sids.is_empty());
        }
        went_offline
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.sessions
            .get(&user_id)
            .map(|sids| !sids.is_empty())
            .unwrap_or(false)
    }
}
