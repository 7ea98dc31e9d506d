//! Key token resolution
//!
//! Maps the symbolic tokens used in combos (`"lctrl"`, `"f5"`, `"a"`, `"\""`)
//! to a [`KeyId`] the injection backends understand. Resolution is pure and
//! case/whitespace-insensitive.
//!
//! Named keys (modifiers, navigation, function keys) resolve to an evdev
//! [`Key`]. Any other single printable character resolves to
//! [`KeyId::Char`]; the backend decides how to type it and fails if it can't.

use std::fmt;

use evdev::Key;
use thiserror::Error;

/// Separator between tokens in a combo string
pub const COMBO_SEPARATOR: char = '+';

/// A resolved key, ready to be pressed or released by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyId {
    /// A named key with a fixed evdev code
    Named(Key),
    /// A literal character; the backend maps it to a physical key
    Char(char),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Named(key) => write!(f, "{:?}", key),
            KeyId::Char(c) => write!(f, "'{}'", c),
        }
    }
}

/// A token that names no known key and is not a single printable character
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved key token '{token}'")]
pub struct UnresolvedToken {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("combo is empty")]
    EmptyCombo,

    #[error("key {} of combo: {source}", position + 1)]
    Token {
        /// Zero-based index of the failing token in the combo
        position: usize,
        #[source]
        source: UnresolvedToken,
    },
}

/// Named special keys. Lookup is done on the lowercased token.
const SPECIAL_KEYS: &[(&str, Key)] = &[
    // Modifiers
    ("ctrl", Key::KEY_LEFTCTRL),
    ("control", Key::KEY_LEFTCTRL),
    ("lctrl", Key::KEY_LEFTCTRL),
    ("rctrl", Key::KEY_RIGHTCTRL),
    ("shift", Key::KEY_LEFTSHIFT),
    ("lshift", Key::KEY_LEFTSHIFT),
    ("rshift", Key::KEY_RIGHTSHIFT),
    ("alt", Key::KEY_LEFTALT),
    ("lalt", Key::KEY_LEFTALT),
    ("ralt", Key::KEY_RIGHTALT),
    ("altgr", Key::KEY_RIGHTALT),
    ("cmd", Key::KEY_LEFTMETA),
    ("win", Key::KEY_LEFTMETA),
    ("lwin", Key::KEY_LEFTMETA),
    ("rwin", Key::KEY_RIGHTMETA),
    ("super", Key::KEY_LEFTMETA),
    ("meta", Key::KEY_LEFTMETA),
    // Editing and navigation
    ("enter", Key::KEY_ENTER),
    ("return", Key::KEY_ENTER),
    ("tab", Key::KEY_TAB),
    ("space", Key::KEY_SPACE),
    ("esc", Key::KEY_ESC),
    ("escape", Key::KEY_ESC),
    ("backspace", Key::KEY_BACKSPACE),
    ("delete", Key::KEY_DELETE),
    ("del", Key::KEY_DELETE),
    ("insert", Key::KEY_INSERT),
    ("home", Key::KEY_HOME),
    ("end", Key::KEY_END),
    ("pageup", Key::KEY_PAGEUP),
    ("pagedown", Key::KEY_PAGEDOWN),
    ("up", Key::KEY_UP),
    ("down", Key::KEY_DOWN),
    ("left", Key::KEY_LEFT),
    ("right", Key::KEY_RIGHT),
    ("capslock", Key::KEY_CAPSLOCK),
    ("pause", Key::KEY_PAUSE),
    ("printscreen", Key::KEY_SYSRQ),
    // Function keys
    ("f1", Key::KEY_F1),
    ("f2", Key::KEY_F2),
    ("f3", Key::KEY_F3),
    ("f4", Key::KEY_F4),
    ("f5", Key::KEY_F5),
    ("f6", Key::KEY_F6),
    ("f7", Key::KEY_F7),
    ("f8", Key::KEY_F8),
    ("f9", Key::KEY_F9),
    ("f10", Key::KEY_F10),
    ("f11", Key::KEY_F11),
    ("f12", Key::KEY_F12),
    ("f13", Key::KEY_F13),
    ("f14", Key::KEY_F14),
    ("f15", Key::KEY_F15),
    ("f16", Key::KEY_F16),
    ("f17", Key::KEY_F17),
    ("f18", Key::KEY_F18),
    ("f19", Key::KEY_F19),
    ("f20", Key::KEY_F20),
    ("f21", Key::KEY_F21),
    ("f22", Key::KEY_F22),
    ("f23", Key::KEY_F23),
    ("f24", Key::KEY_F24),
    // Numpad
    ("num0", Key::KEY_KP0),
    ("num1", Key::KEY_KP1),
    ("num2", Key::KEY_KP2),
    ("num3", Key::KEY_KP3),
    ("num4", Key::KEY_KP4),
    ("num5", Key::KEY_KP5),
    ("num6", Key::KEY_KP6),
    ("num7", Key::KEY_KP7),
    ("num8", Key::KEY_KP8),
    ("num9", Key::KEY_KP9),
    ("numenter", Key::KEY_KPENTER),
    ("numplus", Key::KEY_KPPLUS),
    ("numminus", Key::KEY_KPMINUS),
    ("nummultiply", Key::KEY_KPASTERISK),
    ("numdivide", Key::KEY_KPSLASH),
    ("numdot", Key::KEY_KPDOT),
];

/// Resolve a single token to a key.
///
/// # Examples
///
/// ```
/// use sim_deck_daemon::keys::{resolve, KeyId};
///
/// assert_eq!(resolve(" CTRL ").unwrap(), resolve("ctrl").unwrap());
/// assert_eq!(resolve("Q").unwrap(), KeyId::Char('q'));
/// assert!(resolve("notakey").is_err());
/// ```
pub fn resolve(token: &str) -> Result<KeyId, UnresolvedToken> {
    let normalized = token.trim().to_lowercase();

    if let Some((_, key)) = SPECIAL_KEYS.iter().find(|(name, _)| *name == normalized) {
        return Ok(KeyId::Named(*key));
    }

    // `+` separates tokens, so a literal plus has to be spelled out
    if normalized == "plus" {
        return Ok(KeyId::Char('+'));
    }

    let mut chars = normalized.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_control() => Ok(KeyId::Char(c)),
        _ => Err(UnresolvedToken {
            token: token.to_string(),
        }),
    }
}

/// Resolve every token of a combo string, left to right.
///
/// Stops at the first token that fails; nothing is returned for a partially
/// valid combo.
pub fn resolve_combo(combo: &str) -> Result<Vec<KeyId>, ResolveError> {
    if combo.trim().is_empty() {
        return Err(ResolveError::EmptyCombo);
    }

    combo
        .split(COMBO_SEPARATOR)
        .enumerate()
        .map(|(position, token)| {
            resolve(token).map_err(|source| ResolveError::Token { position, source })
        })
        .collect()
}

/// Names of all special keys, in table order, for help output
pub fn special_key_names() -> impl Iterator<Item = &'static str> {
    SPECIAL_KEYS
        .iter()
        .map(|(name, _)| *name)
        .chain(std::iter::once("plus"))
}
