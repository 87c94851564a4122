//! Connection-level orchestration: inbound commands are validated, routed
//! to the game engine and presence tracker, and the resulting deltas are
//! fanned out to the game's room through the broadcast channel.
//!
//! Each connection moves through `Connected → Joined → Left`; the presence
//! tracker's reverse index is the authority on which state a connection is
//! in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use fleche_core::events::{GameEvent, MessageKind, ScoreEntry, ServerEvent, WireMessage};
use fleche_core::validation;
use fleche_engine::resolver::{CellEdit, ClaimResolver, EntryOutcome};
use fleche_engine::service::{grid_info, GameService};
use fleche_store::Database;

use crate::client::{ClientId, ClientRegistry};
use crate::presence::PresenceTracker;
use crate::protocol::ClientCommand;

/// Minimum spacing between cursor updates per connection.
const CURSOR_THROTTLE: Duration = Duration::from_millis(50);

pub struct RealtimeCoordinator {
    service: Arc<GameService>,
    resolver: ClaimResolver,
    presence: Arc<PresenceTracker>,
    registry: Arc<ClientRegistry>,
    events: broadcast::Sender<GameEvent>,
    cursor_times: DashMap<ClientId, Instant>,
}

impl RealtimeCoordinator {
    pub fn new(
        db: Database,
        service: Arc<GameService>,
        presence: Arc<PresenceTracker>,
        registry: Arc<ClientRegistry>,
        events: broadcast::Sender<GameEvent>,
    ) -> Self {
        Self {
            service,
            resolver: ClaimResolver::new(db),
            presence,
            registry,
            events,
            cursor_times: DashMap::new(),
        }
    }

    /// Entry point for one inbound text frame.
    pub async fn handle_message(&self, client_id: &ClientId, raw: &str) {
        match serde_json::from_str::<ClientCommand>(raw) {
            Ok(command) => self.handle_command(client_id, command).await,
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "malformed command");
                self.send_error(client_id, "malformed command").await;
            }
        }
    }

    pub async fn handle_command(&self, client_id: &ClientId, command: ClientCommand) {
        match command {
            ClientCommand::JoinGame { code, pseudo, color } => {
                self.handle_join(client_id, &code, &pseudo, &color).await;
            }
            ClientCommand::LeaveGame {} => self.handle_leave(client_id).await,
            ClientCommand::CursorUpdate { row, col, direction, entry_id } => {
                self.handle_cursor(client_id, row, col, direction, entry_id);
            }
            ClientCommand::CellInput { row, col, value } => {
                self.handle_cell_input(client_id, row, col, &value).await;
            }
            ClientCommand::ChatMessage { content } => {
                self.handle_chat(client_id, &content).await;
            }
            ClientCommand::NextGrid {} => self.handle_next_grid(client_id).await,
        }
    }

    /// The socket dropped: same cleanup as an explicit leave.
    pub async fn handle_disconnect(&self, client_id: &ClientId) {
        self.handle_leave(client_id).await;
    }

    async fn handle_join(&self, client_id: &ClientId, code: &str, pseudo: &str, color: &str) {
        let (game, player) = match self.service.join_game(code, pseudo, color) {
            Ok(joined) => joined,
            Err(e) => {
                self.send_error(client_id, &e.to_string()).await;
                return;
            }
        };
        let code = game.code.clone();

        self.registry.set_room(client_id, &code).await;
        let state = self.presence.join(client_id, &code, &player.pseudo, &player.color);

        let join_log = self
            .service
            .log_system(
                &game.id,
                MessageKind::LogJoin,
                Some(&player.pseudo),
                Some(&player.color),
                &format!("{} a rejoint la partie", player.pseudo),
            )
            .ok();

        // Full snapshot to the joiner only.
        match self.service.snapshot(&code) {
            Ok(snapshot) => {
                let event = ServerEvent::GameState {
                    game: snapshot.game,
                    grid: snapshot.grid,
                    cells: snapshot.cells,
                    claims: snapshot.claims,
                    players: snapshot.players,
                    messages: snapshot.messages,
                    presence: self.presence.snapshot(&code),
                    scoreboard: snapshot.scoreboard,
                };
                self.send_event(client_id, &event).await;
            }
            Err(e) => {
                self.send_error(client_id, &e.to_string()).await;
                return;
            }
        }

        // Lightweight notices to everyone else in the room.
        self.emit(GameEvent::except(
            code.clone(),
            ServerEvent::PresenceUpdate { state },
            client_id.as_str(),
        ));
        if let Some(message) = join_log {
            self.emit(GameEvent::except(
                code,
                ServerEvent::MessageBroadcast { message },
                client_id.as_str(),
            ));
        }
    }

    async fn handle_leave(&self, client_id: &ClientId) {
        self.cursor_times.remove(client_id);
        let Some(info) = self.presence.leave(client_id) else {
            return;
        };
        self.registry.clear_room(client_id).await;

        let Ok(game) = self.service.get_game(&info.game_code) else {
            return;
        };
        let leave_log = self
            .service
            .log_system(
                &game.id,
                MessageKind::LogLeave,
                Some(&info.pseudo),
                Some(&info.color),
                &format!("{} a quitté la partie", info.pseudo),
            )
            .ok();

        self.emit(GameEvent::except(
            info.game_code.clone(),
            ServerEvent::PresenceRemove { pseudo: info.pseudo.clone() },
            client_id.as_str(),
        ));
        if let Some(message) = leave_log {
            self.emit(GameEvent::except(
                info.game_code,
                ServerEvent::MessageBroadcast { message },
                client_id.as_str(),
            ));
        }
    }

    fn handle_cursor(
        &self,
        client_id: &ClientId,
        row: usize,
        col: usize,
        direction: fleche_core::grid::Direction,
        entry_id: Option<fleche_core::ids::EntryId>,
    ) {
        // Server-side floor matching the client rate limit.
        let now = Instant::now();
        if let Some(last) = self.cursor_times.get(client_id) {
            if now.duration_since(*last) < CURSOR_THROTTLE {
                return;
            }
        }
        self.cursor_times.insert(client_id.clone(), now);

        if !validation::is_valid_cell_position(row, col) {
            return;
        }
        if let Some((code, state)) = self.presence.update_cursor(client_id, row, col, direction, entry_id) {
            self.emit(GameEvent::except(
                code,
                ServerEvent::PresenceUpdate { state },
                client_id.as_str(),
            ));
        }
    }

    async fn handle_cell_input(&self, client_id: &ClientId, row: usize, col: usize, value: &str) {
        let Some(info) = self.presence.info(client_id) else {
            self.send_error(client_id, "not connected to a game").await;
            return;
        };
        if !validation::is_valid_cell_position(row, col) || !validation::is_valid_cell_value(value) {
            return;
        }
        let value = validation::normalize_cell_value(value);

        let result = self
            .service
            .get_game(&info.game_code)
            .and_then(|game| {
                let session = self.service.session(&game)?;
                let grid = self.service.current_grid(&game)?;
                let edit = CellEdit {
                    row,
                    col,
                    value: value.clone(),
                    author: info.pseudo.clone(),
                    author_color: info.color.clone(),
                };
                let outcome = self.resolver.process_edit(&game.id, &session, &grid.layout, &edit)?;
                Ok((game, outcome))
            });

        let (game, result) = match result {
            Ok(pair) => pair,
            Err(e) => {
                // A claim/score write that fails must not be swallowed.
                warn!(client_id = %client_id, error = %e, "cell input failed");
                self.send_error(client_id, "cell update failed").await;
                return;
            }
        };

        if !result.applied {
            return;
        }
        let code = info.game_code.clone();

        self.emit(GameEvent::new(
            code.clone(),
            ServerEvent::CellUpdate { row, col, value, pseudo: info.pseudo.clone() },
        ));

        for outcome in result.entries {
            match outcome {
                EntryOutcome::Claimed { entry_id, word, pseudo, color, .. } => {
                    self.emit(GameEvent::new(
                        code.clone(),
                        ServerEvent::EntryClaimed {
                            entry_id: entry_id.clone(),
                            pseudo: pseudo.clone(),
                            color: color.clone(),
                            word: word.clone(),
                        },
                    ));
                    if let Ok(scores) = self.service.scoreboard(&game.id) {
                        self.emit(GameEvent::new(
                            code.clone(),
                            ServerEvent::ScoreboardUpdate { scores },
                        ));
                    }
                    self.emit(GameEvent::new(
                        code.clone(),
                        ServerEvent::MessageBroadcast {
                            message: wire_now(
                                MessageKind::LogSuccess,
                                Some(&pseudo),
                                Some(&color),
                                format!("{pseudo} a trouvé {word} !"),
                                Some(serde_json::json!({ "entryId": entry_id, "word": word })),
                            ),
                        },
                    ));
                }
                EntryOutcome::Incorrect { entry_id, word, cells } => {
                    self.emit(GameEvent::new(
                        code.clone(),
                        ServerEvent::EntryIncorrect { entry_id: entry_id.clone(), cells },
                    ));
                    self.emit(GameEvent::new(
                        code.clone(),
                        ServerEvent::MessageBroadcast {
                            message: wire_now(
                                MessageKind::LogFail,
                                Some(&info.pseudo),
                                Some(&info.color),
                                format!("{} {} incorrect", info.pseudo, word),
                                Some(serde_json::json!({ "entryId": entry_id, "word": word })),
                            ),
                        },
                    ));
                }
            }
        }

        if let Some(final_scores) = result.completed {
            let podium: Vec<ScoreEntry> = final_scores.iter().take(3).cloned().collect();
            self.emit(GameEvent::new(
                code,
                ServerEvent::GridCompleted { final_scores, podium },
            ));
        }
    }

    async fn handle_chat(&self, client_id: &ClientId, content: &str) {
        let Some(info) = self.presence.info(client_id) else {
            return;
        };
        let Ok(game) = self.service.get_game(&info.game_code) else {
            return;
        };
        match self.service.post_chat(&game.id, &info.pseudo, &info.color, content) {
            Ok(message) => {
                self.emit(GameEvent::new(
                    info.game_code,
                    ServerEvent::MessageBroadcast { message },
                ));
            }
            Err(e) => debug!(client_id = %client_id, error = %e, "chat rejected"),
        }
    }

    async fn handle_next_grid(&self, client_id: &ClientId) {
        let Some(info) = self.presence.info(client_id) else {
            return;
        };
        match self.service.next_grid(&info.game_code, &info.pseudo, None) {
            Ok(grid) => {
                let game = match self.service.get_game(&info.game_code) {
                    Ok(game) => game,
                    Err(_) => return,
                };
                let next_log = self
                    .service
                    .log_system(
                        &game.id,
                        MessageKind::LogNext,
                        None,
                        None,
                        &format!("Nouvelle grille lancée par {}", info.pseudo),
                    )
                    .ok();

                self.emit(GameEvent::new(
                    info.game_code.clone(),
                    ServerEvent::GridNext { grid: grid_info(&grid) },
                ));
                if let Some(message) = next_log {
                    self.emit(GameEvent::new(
                        info.game_code,
                        ServerEvent::MessageBroadcast { message },
                    ));
                }
            }
            Err(e) => self.send_error(client_id, &e.to_string()).await,
        }
    }

    fn emit(&self, event: GameEvent) {
        // No receivers (no bridge running) only happens in tests.
        let _ = self.events.send(event);
    }

    async fn send_event(&self, client_id: &ClientId, event: &ServerEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            self.registry.send_to(client_id, json).await;
        }
    }

    async fn send_error(&self, client_id: &ClientId, message: &str) {
        self.send_event(client_id, &ServerEvent::Error { message: message.to_string() })
            .await;
    }
}

fn wire_now(
    kind: MessageKind,
    pseudo: Option<&str>,
    color: Option<&str>,
    content: String,
    payload: Option<serde_json::Value>,
) -> WireMessage {
    WireMessage {
        kind,
        pseudo: pseudo.map(str::to_string),
        color: color.map(str::to_string),
        content,
        payload,
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}
