use crate::monitor::Snapshot;
use itertools::Itertools;

pub const NO_PLAYERS: &str = "Os zumbis estão carentes, seja o primeiro a matar a saudade deles!";

/// What the status channel should look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub channel_name: String,
    pub message: String,
}

impl StatusView {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            channel_name: channel_name(snapshot),
            message: player_list(snapshot),
        }
    }
}

pub fn channel_name(snapshot: &Snapshot) -> String {
    if snapshot.online {
        format!("🟢online|👥{}", snapshot.players.len())
    } else {
        "🔴offline".to_string()
    }
}

pub fn player_list(snapshot: &Snapshot) -> String {
    if snapshot.players.is_empty() {
        NO_PLAYERS.to_string()
    } else {
        let bullets = snapshot.players.iter().map(|p| format!("• {p}")).join("\n");
        format!("Online no momento:\n\n{bullets}\n")
    }
}

/// Plain text answer for the `status` command.
pub fn summary(snapshot: &Snapshot) -> String {
    if !snapshot.online {
        return "Server Offline".to_string();
    }
    let count = snapshot.players.len();
    let players = snapshot.players.iter().join("\n");
    format!("```\n{count} players online\n{players}\n```")
}
