//! Device-name classification into room roles.
//!
//! Rooms are never configured explicitly; they are inferred from how the
//! builders named their doors and vents. The default [`NamePatterns`]
//! understands three conventions (case-insensitive, anywhere in the name):
//!
//! | Device | Pattern | Example |
//! |--------|---------|---------|
//! | Outer door | `<Room> Outer` | `Hangar Outer Door` |
//! | Inner door | `<Room>/<Room>` | `Door Hangar/Corridor` |
//! | Vent | `<Room> Vent`, `<Room> Air Vent` | `Hangar Air Vent 2` |
//!
//! A room name is a run of word characters (letters, digits, `_`).
//!
//! ```
//! use airseal_logic::topology::{Classifier, DoorRole, NamePatterns};
//!
//! let patterns = NamePatterns;
//! assert_eq!(
//!     patterns.classify_door("Door Hangar/Corridor"),
//!     Some(DoorRole::Inner { first: "Hangar".into(), second: "Corridor".into() })
//! );
//! assert_eq!(patterns.classify_vent("Hangar Air Vent 2"), Some("Hangar".into()));
//! assert_eq!(patterns.classify_vent("Hangar Light"), None);
//! ```

/// What a door is to the rooms it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoorRole {
    /// Boundary between `room` and vacuum.
    Outer { room: String },
    /// Partition between two rooms.
    Inner { first: String, second: String },
}

/// Maps device display names to room roles.
pub trait Classifier {
    fn classify_door(&self, name: &str) -> Option<DoorRole>;
    /// The room a vent belongs to.
    fn classify_vent(&self, name: &str) -> Option<String>;
}

/// The built-in naming convention. Outer-door matches win over inner-door
/// matches for the same name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamePatterns;

impl Classifier for NamePatterns {
    fn classify_door(&self, name: &str) -> Option<DoorRole> {
        if let Some(room) = word_before_keyword(name, &["outer"]) {
            return Some(DoorRole::Outer { room });
        }
        split_room_pair(name).map(|(first, second)| DoorRole::Inner { first, second })
    }

    fn classify_vent(&self, name: &str) -> Option<String> {
        word_before_keyword(name, &["air", "vent"])
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte ranges of every maximal run of word characters, left to right.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (start, is_word_char(c)) {
            (None, true) => start = Some(i),
            (Some(s), false) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Find the leftmost word followed by whitespace and then the keyword
/// sequence. Every keyword but the last is optional and may be followed by
/// whitespace, so `["air", "vent"]` accepts both "Vent" and "Air Vent".
fn word_before_keyword(name: &str, keywords: &[&str]) -> Option<String> {
    let (last, optional) = keywords.split_last()?;
    for (start, end) in word_spans(name) {
        let rest = &name[end..];
        let after_space = rest.trim_start();
        if after_space.len() == rest.len() {
            continue;
        }
        let mut tail = after_space;
        for keyword in optional {
            if let Some(stripped) = strip_prefix_ignore_case(tail, keyword) {
                if strip_prefix_ignore_case(stripped.trim_start(), last).is_some() {
                    tail = stripped.trim_start();
                }
            }
        }
        if strip_prefix_ignore_case(tail, last).is_some() {
            return Some(name[start..end].to_string());
        }
    }
    None
}

/// Find the leftmost `word/word` pair.
fn split_room_pair(name: &str) -> Option<(String, String)> {
    let spans = word_spans(name);
    spans.windows(2).find_map(|pair| {
        let (a_start, a_end) = pair[0];
        let (b_start, b_end) = pair[1];
        (&name[a_end..b_start] == "/")
            .then(|| (name[a_start..a_end].to_string(), name[b_start..b_end].to_string()))
    })
}
