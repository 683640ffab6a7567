//! Chat command table
//!
//! Command names map to a closed set of actions. Unknown names resolve to
//! nothing and never reach the room core.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandAction {
    DropFlag,
    Flag,
    Respawn,
    Spectate,
    Upgrade,
    Profile,
    Server,
    Spectators,
    Su,
    DropUpgrade,
    /// CTF only
    Match,
    /// CTF only
    Switch,
}

impl CommandAction {
    pub const ALL: [CommandAction; 12] = [
        CommandAction::DropFlag,
        CommandAction::Flag,
        CommandAction::Respawn,
        CommandAction::Spectate,
        CommandAction::Upgrade,
        CommandAction::Profile,
        CommandAction::Server,
        CommandAction::Spectators,
        CommandAction::Su,
        CommandAction::DropUpgrade,
        CommandAction::Match,
        CommandAction::Switch,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "drop" => Some(CommandAction::DropFlag),
            "flag" => Some(CommandAction::Flag),
            "respawn" => Some(CommandAction::Respawn),
            "spectate" => Some(CommandAction::Spectate),
            "upgrade" => Some(CommandAction::Upgrade),
            "profile" => Some(CommandAction::Profile),
            "server" => Some(CommandAction::Server),
            "spectators" => Some(CommandAction::Spectators),
            "su" => Some(CommandAction::Su),
            "upgrades" => Some(CommandAction::DropUpgrade),
            "match" => Some(CommandAction::Match),
            "switch" => Some(CommandAction::Switch),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandAction::DropFlag => "drop",
            CommandAction::Flag => "flag",
            CommandAction::Respawn => "respawn",
            CommandAction::Spectate => "spectate",
            CommandAction::Upgrade => "upgrade",
            CommandAction::Profile => "profile",
            CommandAction::Server => "server",
            CommandAction::Spectators => "spectators",
            CommandAction::Su => "su",
            CommandAction::DropUpgrade => "upgrades",
            CommandAction::Match => "match",
            CommandAction::Switch => "switch",
        }
    }
}

/// A command whose name has already been resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub action: CommandAction,
    pub data: String,
}

/// Resolve a raw `(name, data)` pair from a client packet
pub fn resolve(name: &str, data: &str) -> Option<ResolvedCommand> {
    CommandAction::from_name(name).map(|action| ResolvedCommand {
        action,
        data: data.to_string(),
    })
}
