/// SQL DDL for the fleche database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS games (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    owner_pseudo TEXT NOT NULL,
    theme TEXT NOT NULL DEFAULT 'general',
    difficulty TEXT NOT NULL DEFAULT 'easy',
    status TEXT NOT NULL DEFAULT 'active',
    current_grid_id TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS grids (
    id TEXT PRIMARY KEY,
    game_id TEXT NOT NULL REFERENCES games(id),
    index_number INTEGER NOT NULL,
    layout TEXT NOT NULL,
    entries TEXT NOT NULL,
    final_cells TEXT,
    final_scores TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS grid_cells (
    grid_id TEXT NOT NULL REFERENCES grids(id),
    row INTEGER NOT NULL,
    col INTEGER NOT NULL,
    value TEXT NOT NULL,
    updated_by_pseudo TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (grid_id, row, col)
);

CREATE TABLE IF NOT EXISTS entry_claims (
    grid_id TEXT NOT NULL REFERENCES grids(id),
    entry_id TEXT NOT NULL,
    claimed_by_pseudo TEXT NOT NULL,
    claimed_at TEXT NOT NULL,
    PRIMARY KEY (grid_id, entry_id)
);

CREATE TABLE IF NOT EXISTS players (
    game_id TEXT NOT NULL REFERENCES games(id),
    pseudo TEXT NOT NULL,
    color TEXT NOT NULL,
    score_total INTEGER NOT NULL DEFAULT 0,
    last_seen TEXT NOT NULL,
    PRIMARY KEY (game_id, pseudo)
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    game_id TEXT NOT NULL REFERENCES games(id),
    type TEXT NOT NULL,
    pseudo TEXT,
    color TEXT,
    content TEXT NOT NULL,
    payload TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS words (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lemma TEXT NOT NULL,
    normalized TEXT NOT NULL UNIQUE,
    length INTEGER NOT NULL,
    frequency REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS word_clues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    word_id INTEGER NOT NULL REFERENCES words(id),
    clue_text TEXT NOT NULL,
    clue_short TEXT,
    quality_score REAL NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_grids_game ON grids(game_id);
CREATE INDEX IF NOT EXISTS idx_grids_completed ON grids(game_id, completed_at);
CREATE INDEX IF NOT EXISTS idx_claims_grid ON entry_claims(grid_id);
CREATE INDEX IF NOT EXISTS idx_messages_game ON messages(game_id, created_at);
CREATE INDEX IF NOT EXISTS idx_words_length ON words(length);
CREATE INDEX IF NOT EXISTS idx_word_clues_word ON word_clues(word_id);
CREATE INDEX IF NOT EXISTS idx_games_status ON games(status);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
