//! Input validation for pseudos, colors, game codes, and cell edits.
//! Invalid input is rejected before it reaches the game engine.

/// Largest grid dimension accepted from clients.
pub const MAX_GRID_DIM: usize = 20;

/// Longest accepted chat message, in characters.
pub const MAX_CHAT_LEN: usize = 500;

/// A pseudo is 1–50 characters after trimming.
pub fn is_valid_pseudo(pseudo: &str) -> bool {
    let trimmed = pseudo.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= 50
}

/// A color is `#RRGGBB` hex.
pub fn is_valid_color(color: &str) -> bool {
    let bytes = color.as_bytes();
    bytes.len() == 7
        && bytes[0] == b'#'
        && bytes[1..].iter().all(|b| b.is_ascii_hexdigit())
}

/// A game code is exactly 4 characters of `[A-Z0-9]`, case-insensitive.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 4
        && code
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_alphabetic())
}

/// A cell position must sit inside the maximum supported grid.
pub fn is_valid_cell_position(row: usize, col: usize) -> bool {
    row < MAX_GRID_DIM && col < MAX_GRID_DIM
}

/// A cell value is empty (erase) or a single ASCII letter.
pub fn is_valid_cell_value(value: &str) -> bool {
    value.is_empty() || (value.len() == 1 && value.as_bytes()[0].is_ascii_alphabetic())
}

/// Uppercase a validated cell value.
pub fn normalize_cell_value(value: &str) -> String {
    value.to_ascii_uppercase()
}
