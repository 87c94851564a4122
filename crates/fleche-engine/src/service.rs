//! Game lifecycle operations shared by the HTTP surface and the realtime
//! coordinator: create, join, snapshot, rotate, delete, history.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{info, instrument};

use fleche_core::events::{
    ClaimInfo, GameInfo, GridInfo, MessageKind, PlayerInfo, ScoreEntry, WireMessage,
};
use fleche_core::ids::{GameId, GridId};
use fleche_core::validation;
use fleche_store::games::{GameRepo, GameRow, GameStatus};
use fleche_store::grids::{GridArchive, GridRepo, GridRow};
use fleche_store::messages::MessageRepo;
use fleche_store::players::{PlayerRepo, PlayerRow};
use fleche_store::Database;

use crate::builder::GridBuilder;
use crate::code;
use crate::error::GameError;
use crate::session::SessionStore;
use crate::wordbank::WordBank;

/// Grid side length for generated games.
const GRID_SIZE: usize = 10;

/// Messages returned with a snapshot.
const SNAPSHOT_MESSAGES: u32 = 50;

/// Full game state as served to a joining client or the HTTP snapshot
/// endpoint. Never carries answers.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub game: GameInfo,
    pub grid: Option<GridInfo>,
    pub cells: HashMap<String, String>,
    pub claims: Vec<ClaimInfo>,
    pub players: Vec<PlayerInfo>,
    pub messages: Vec<WireMessage>,
    pub scoreboard: Vec<ScoreEntry>,
}

/// One line of the active-games listing.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGame {
    pub code: String,
    pub owner_pseudo: String,
    pub theme: String,
    pub difficulty: String,
    pub player_count: i64,
    pub created_at: String,
}

/// One line of the grid history listing.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: GridId,
    pub index_number: i64,
    pub created_at: String,
    pub completed_at: Option<String>,
}

pub struct GameService {
    db: Database,
    builder: GridBuilder,
    games: GameRepo,
    grids: GridRepo,
    players: PlayerRepo,
    messages: MessageRepo,
}

impl GameService {
    pub fn new(db: Database, bank: Arc<WordBank>) -> Self {
        Self {
            builder: GridBuilder::new(bank),
            games: GameRepo::new(db.clone()),
            grids: GridRepo::new(db.clone()),
            players: PlayerRepo::new(db.clone()),
            messages: MessageRepo::new(db.clone()),
            db,
        }
    }

    /// Create a game with its first grid. A generation failure blocks the
    /// whole creation; no half-made game is left behind.
    #[instrument(skip(self), fields(owner_pseudo))]
    pub fn create_game(
        &self,
        owner_pseudo: &str,
        theme: &str,
        difficulty: &str,
        seed: Option<u64>,
    ) -> Result<(GameRow, GridRow), GameError> {
        if !validation::is_valid_pseudo(owner_pseudo) {
            return Err(GameError::Validation("invalid pseudo".into()));
        }
        let owner = owner_pseudo.trim();

        // Generate before touching the games table.
        let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
        let generated = self.builder.generate(GRID_SIZE, seed)?;

        let mut rng = rand::thread_rng();
        let code = code::generate_unique_code(&mut rng, |c| {
            Ok(self.games.code_exists(c)?)
        })?;

        let game = self.games.create(&code, owner, theme, difficulty)?;
        let grid = self.grids.insert(&game.id, 1, &generated.layout, &generated.entries)?;
        self.games.set_current_grid(&game.id, &grid.id)?;

        info!(code = %game.code, words = generated.metrics.word_count, "game created");
        let game = GameRow { current_grid_id: Some(grid.id.clone()), ..game };
        Ok((game, grid))
    }

    /// Look up a game by code, validating the code shape first.
    pub fn get_game(&self, code: &str) -> Result<GameRow, GameError> {
        if !validation::is_valid_code(code) {
            return Err(GameError::Validation("invalid game code".into()));
        }
        self.games.get_by_code(code).map_err(|e| match e {
            fleche_store::StoreError::NotFound(m) => GameError::NotFound(m),
            other => GameError::Store(other),
        })
    }

    /// Join (or rejoin) a game. Creates the player on first join.
    #[instrument(skip(self), fields(code, pseudo))]
    pub fn join_game(&self, code: &str, pseudo: &str, color: &str) -> Result<(GameRow, PlayerRow), GameError> {
        if !validation::is_valid_pseudo(pseudo) {
            return Err(GameError::Validation("invalid pseudo".into()));
        }
        if !validation::is_valid_color(color) {
            return Err(GameError::Validation("invalid color".into()));
        }
        let game = self.get_game(code)?;
        if game.status != GameStatus::Active {
            return Err(GameError::Validation("game has ended".into()));
        }
        let player = self.players.upsert(&game.id, pseudo.trim(), color)?;
        Ok((game, player))
    }

    /// Full state for a game. Presence is layered on by the realtime side.
    pub fn snapshot(&self, code: &str) -> Result<GameSnapshot, GameError> {
        let game = self.get_game(code)?;
        let grid = match &game.current_grid_id {
            Some(grid_id) => Some(self.grids.get(grid_id)?),
            None => None,
        };

        let (cells, claims) = match &grid {
            Some(grid) => {
                let session = SessionStore::open(self.db.clone(), grid.id.clone());
                // Read degradation: a failed cell/claim read yields an empty
                // view rather than a failed snapshot.
                (session.cells().unwrap_or_default(), session.list_claims().unwrap_or_default())
            }
            None => (HashMap::new(), Vec::new()),
        };

        let players = self.players.list_by_score(&game.id)?;
        let messages = self
            .messages
            .recent(&game.id, SNAPSHOT_MESSAGES)
            .unwrap_or_default()
            .iter()
            .map(|m| m.to_wire())
            .collect();
        let scoreboard = players
            .iter()
            .map(|p| ScoreEntry { pseudo: p.pseudo.clone(), color: p.color.clone(), score: p.score_total })
            .collect();

        Ok(GameSnapshot {
            game: game_info(&game),
            grid: grid.map(|g| grid_info(&g)),
            cells,
            claims,
            players: players
                .into_iter()
                .map(|p| PlayerInfo { pseudo: p.pseudo, color: p.color, score_total: p.score_total })
                .collect(),
            messages,
            scoreboard,
        })
    }

    /// Archive the current grid and install a freshly generated one.
    /// Owner-only.
    #[instrument(skip(self), fields(code, requester))]
    pub fn next_grid(&self, code: &str, requester: &str, seed: Option<u64>) -> Result<GridRow, GameError> {
        let game = self.get_game(code)?;
        if game.owner_pseudo != requester {
            return Err(GameError::Forbidden("only the game owner can start a new grid".into()));
        }

        let current = game
            .current_grid_id
            .as_ref()
            .ok_or_else(|| GameError::NotFound(format!("game {code} has no current grid")))?;
        let current = self.grids.get(current)?;

        // Snapshot final cells + scores on the outgoing grid.
        let session = SessionStore::open(self.db.clone(), current.id.clone());
        let scores = self.scoreboard(&game.id)?;
        session.archive_final_state(&scores)?;

        let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
        let generated = self.builder.generate(GRID_SIZE, seed)?;
        let grid = self.grids.insert(
            &game.id,
            current.index_number + 1,
            &generated.layout,
            &generated.entries,
        )?;
        self.games.set_current_grid(&game.id, &grid.id)?;

        info!(code = %game.code, index = grid.index_number, "grid rotated");
        Ok(grid)
    }

    /// Delete a game and all its data. Owner-only.
    #[instrument(skip(self), fields(code, requester))]
    pub fn delete_game(&self, code: &str, requester: &str) -> Result<(), GameError> {
        let game = self.get_game(code)?;
        if game.owner_pseudo != requester {
            return Err(GameError::Forbidden("only the game owner can delete the game".into()));
        }
        self.games.delete(&game.id)?;
        info!(code = %game.code, "game deleted");
        Ok(())
    }

    pub fn list_active(&self) -> Result<Vec<ActiveGame>, GameError> {
        Ok(self
            .games
            .list_active()?
            .into_iter()
            .map(|l| ActiveGame {
                code: l.game.code,
                owner_pseudo: l.game.owner_pseudo,
                theme: l.game.theme,
                difficulty: l.game.difficulty,
                player_count: l.player_count,
                created_at: l.game.created_at,
            })
            .collect())
    }

    /// Completed grids of a game, newest first.
    pub fn history(&self, code: &str) -> Result<Vec<HistoryItem>, GameError> {
        let game = self.get_game(code)?;
        Ok(self
            .grids
            .list_completed(&game.id)?
            .into_iter()
            .map(|g| HistoryItem {
                id: g.id,
                index_number: g.index_number,
                created_at: g.created_at,
                completed_at: g.completed_at,
            })
            .collect())
    }

    /// One archived grid with final state and claims.
    pub fn history_grid(&self, code: &str, grid_id: &GridId) -> Result<(GridArchive, Vec<ClaimInfo>), GameError> {
        let game = self.get_game(code)?;
        let archive = self.grids.get_archive(&game.id, grid_id)?;
        let session = SessionStore::open(self.db.clone(), grid_id.clone());
        let claims = session.list_claims().unwrap_or_default();
        Ok((archive, claims))
    }

    /// Current scoreboard, score-descending.
    pub fn scoreboard(&self, game_id: &GameId) -> Result<Vec<ScoreEntry>, GameError> {
        Ok(self
            .players
            .list_by_score(game_id)?
            .into_iter()
            .map(|p| ScoreEntry { pseudo: p.pseudo, color: p.color, score: p.score_total })
            .collect())
    }

    /// The game's current grid row (layout included).
    pub fn current_grid(&self, game: &GameRow) -> Result<GridRow, GameError> {
        let grid_id = game
            .current_grid_id
            .as_ref()
            .ok_or_else(|| GameError::NotFound(format!("game {} has no current grid", game.code)))?;
        Ok(self.grids.get(grid_id)?)
    }

    /// Open the session over a game's current grid.
    pub fn session(&self, game: &GameRow) -> Result<SessionStore, GameError> {
        let grid_id = game
            .current_grid_id
            .clone()
            .ok_or_else(|| GameError::NotFound(format!("game {} has no current grid", game.code)))?;
        Ok(SessionStore::open(self.db.clone(), grid_id))
    }

    /// Persist a chat message.
    pub fn post_chat(
        &self,
        game_id: &GameId,
        pseudo: &str,
        color: &str,
        content: &str,
    ) -> Result<WireMessage, GameError> {
        let content = content.trim();
        if content.is_empty() || content.chars().count() > validation::MAX_CHAT_LEN {
            return Err(GameError::Validation("invalid chat message".into()));
        }
        let row = self
            .messages
            .add(game_id, MessageKind::Chat, Some(pseudo), Some(color), content, None)?;
        Ok(row.to_wire())
    }

    /// Persist a join/leave/next-grid log line and return its wire form.
    pub fn log_system(
        &self,
        game_id: &GameId,
        kind: MessageKind,
        pseudo: Option<&str>,
        color: Option<&str>,
        content: &str,
    ) -> Result<WireMessage, GameError> {
        let row = self.messages.add(game_id, kind, pseudo, color, content, None)?;
        Ok(row.to_wire())
    }
}

pub fn game_info(game: &GameRow) -> GameInfo {
    GameInfo {
        id: game.id.to_string(),
        code: game.code.clone(),
        owner_pseudo: game.owner_pseudo.clone(),
        theme: game.theme.clone(),
        difficulty: game.difficulty.clone(),
        status: game.status.to_string(),
    }
}

pub fn grid_info(grid: &GridRow) -> GridInfo {
    GridInfo {
        id: grid.id.clone(),
        index_number: grid.index_number,
        layout: grid.layout.clone(),
    }
}
