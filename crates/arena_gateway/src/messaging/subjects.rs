//! Bus subjects the gateway talks on.

/// Registration requests.
pub const REGISTER: &str = "registerAI";
/// Published when a registered bot disconnects.
pub const UNREGISTER: &str = "unregisterAI";

pub fn join(game_id: &str) -> String {
    format!("{game_id}.join")
}

pub fn action(game_id: &str) -> String {
    format!("{game_id}.action")
}

/// Pushes with the running game's state.
pub fn game_state(bot_id: &str) -> String {
    format!("{bot_id}.gameState")
}

/// Invitations to join a game.
pub fn join_request(bot_id: &str) -> String {
    format!("{bot_id}.joinRequest")
}

/// Every private subject a registered bot is subscribed to.
pub fn bot_subjects(bot_id: &str) -> [String; 2] {
    [game_state(bot_id), join_request(bot_id)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_names() {
        assert_eq!(join("G1"), "G1.join");
        assert_eq!(action("G1"), "G1.action");
        assert_eq!(
            bot_subjects("bot-42"),
            ["bot-42.gameState".to_string(), "bot-42.joinRequest".to_string()]
        );
    }
}
