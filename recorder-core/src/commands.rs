//! Controller commands triggered by completed notes.
//!
//! Commands are sent as one JSON object per line, e.g. `{"action":"move_up"}`.

use serde::{Deserialize, Serialize};

use crate::notes::NoteSymbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Select the next card (1 → 2 → 3 → 4 → 1).
    CycleCard,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    /// Place the selected card at the cursor.
    PlaceCard,
    /// The note source is shutting down.
    Exit,
}

impl Command {
    /// The command bound to `symbol`, if any.
    pub fn for_note(symbol: NoteSymbol) -> Option<Self> {
        match symbol {
            NoteSymbol::C => Some(Command::CycleCard),
            NoteSymbol::D => Some(Command::MoveUp),
            NoteSymbol::E => Some(Command::MoveDown),
            NoteSymbol::F => Some(Command::MoveLeft),
            NoteSymbol::G => Some(Command::MoveRight),
            NoteSymbol::A => Some(Command::PlaceCard),
            NoteSymbol::B => None,
        }
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self).map(|mut line| {
            line.push('\n');
            line
        })
    }
}
