//! Inbound client commands, one tagged JSON object per WebSocket text frame.

use serde::Deserialize;

use fleche_core::grid::Direction;
use fleche_core::ids::EntryId;

/// Commands clients send over the WebSocket.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    JoinGame {
        code: String,
        pseudo: String,
        color: String,
    },
    LeaveGame {},
    /// Clients rate-limit to one update per 50 ms; the server enforces the
    /// same floor per connection.
    CursorUpdate {
        row: usize,
        col: usize,
        direction: Direction,
        #[serde(default)]
        entry_id: Option<EntryId>,
    },
    CellInput {
        row: usize,
        col: usize,
        value: String,
    },
    ChatMessage {
        content: String,
    },
    NextGrid {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_join_game() {
        let json = r##"{"type":"join_game","code":"AB12","pseudo":"zoe","color":"#FF0000"}"##;
        let cmd: ClientCommand = serde_json::from_str(json).unwrap();
        match cmd {
            ClientCommand::JoinGame { code, pseudo, color } => {
                assert_eq!(code, "AB12");
                assert_eq!(pseudo, "zoe");
                assert_eq!(color, "#FF0000");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_cursor_update_with_camel_case_fields() {
        let json = r#"{"type":"cursor_update","row":2,"col":5,"direction":"down","entryId":"3-down"}"#;
        let cmd: ClientCommand = serde_json::from_str(json).unwrap();
        match cmd {
            ClientCommand::CursorUpdate { row, col, direction, entry_id } => {
                assert_eq!((row, col), (2, 5));
                assert_eq!(direction, Direction::Down);
                assert_eq!(entry_id.unwrap().as_str(), "3-down");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_cell_input_with_empty_value() {
        let json = r#"{"type":"cell_input","row":0,"col":1,"value":""}"#;
        let cmd: ClientCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, ClientCommand::CellInput { value, .. } if value.is_empty()));
    }

    #[test]
    fn parse_bodyless_commands() {
        assert!(matches!(
            serde_json::from_str::<ClientCommand>(r#"{"type":"leave_game"}"#).unwrap(),
            ClientCommand::LeaveGame {}
        ));
        assert!(matches!(
            serde_json::from_str::<ClientCommand>(r#"{"type":"next_grid"}"#).unwrap(),
            ClientCommand::NextGrid {}
        ));
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"bogus"}"#).is_err());
    }
}
