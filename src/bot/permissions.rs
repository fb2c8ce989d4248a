//! Command authorization. Checked by the command layer before it touches a
//! session; the playback core itself never authorizes anything.

#[cfg(test)]
use mockall::automock;
use serenity::model::id::{RoleId, UserId};

/// Acciones que un comando puede pedir
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MusicAction {
    Play,
    Search,
    Select,
    View,
    Join,
    Pause,
    Resume,
    Skip,
    Stop,
    Clear,
    Remove,
    Volume,
    Leave,
}

impl MusicAction {
    /// Acciones que afectan a todos los oyentes del canal
    pub fn is_disruptive(self) -> bool {
        matches!(
            self,
            MusicAction::Pause
                | MusicAction::Skip
                | MusicAction::Stop
                | MusicAction::Clear
                | MusicAction::Remove
                | MusicAction::Volume
                | MusicAction::Leave
        )
    }
}

/// Quién ejecuta el comando
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAuthor {
    pub user_id: UserId,
    pub roles: Vec<RoleId>,
    pub is_admin: bool,
}

#[cfg_attr(test, automock)]
pub trait PermissionGate: Send + Sync {
    fn has_permission(&self, author: &CommandAuthor, action: MusicAction) -> bool;
}

/// Reserva las acciones disruptivas al rol DJ (y a los administradores).
/// Without a configured role everyone may do everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DjRoleGate {
    dj_role: Option<RoleId>,
}

impl DjRoleGate {
    pub fn new(dj_role: Option<RoleId>) -> Self {
        Self { dj_role }
    }
}

impl PermissionGate for DjRoleGate {
    fn has_permission(&self, author: &CommandAuthor, action: MusicAction) -> bool {
        let Some(dj_role) = self.dj_role else {
            return true;
        };
        !action.is_disruptive() || author.is_admin || author.roles.contains(&dj_role)
    }
}
