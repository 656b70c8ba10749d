//! Key-name normalization and CDP key definitions.

/// Modifier bits as understood by `Input.dispatchMouseEvent` / `dispatchKeyEvent`.
pub const MODIFIER_ALT: u32 = 1;
pub const MODIFIER_CONTROL: u32 = 2;
pub const MODIFIER_META: u32 = 4;
pub const MODIFIER_SHIFT: u32 = 8;

/// Map a model-supplied key name onto the browser's key name.
///
/// Lookup is case-insensitive on the trimmed name; names without an alias are
/// passed through trimmed but otherwise untouched.
pub fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let alias = match trimmed.to_lowercase().as_str() {
        "/" => "Divide",
        "\\" => "Backslash",
        "alt" | "option" => "Alt",
        "arrowdown" | "down" => "ArrowDown",
        "arrowleft" | "left" => "ArrowLeft",
        "arrowright" | "right" => "ArrowRight",
        "arrowup" | "up" => "ArrowUp",
        "backspace" => "Backspace",
        "capslock" => "CapsLock",
        "cmd" | "command" | "meta" | "super" | "win" => "Meta",
        "ctrl" | "control" => "Control",
        "delete" | "del" => "Delete",
        "end" => "End",
        "enter" | "return" => "Enter",
        "esc" | "escape" => "Escape",
        "home" => "Home",
        "insert" => "Insert",
        "pagedown" => "PageDown",
        "pageup" => "PageUp",
        "shift" => "Shift",
        "space" => " ",
        "tab" => "Tab",
        _ => return trimmed.to_string(),
    };
    alias.to_string()
}

/// Everything needed to synthesize a key event for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDefinition {
    pub key: String,
    pub code: String,
    pub key_code: u32,
    /// Text the key produces, if it produces any.
    pub text: Option<String>,
    /// Modifier bit set while this key is held, 0 for ordinary keys.
    pub modifier: u32,
}

/// Resolve a normalized key name (see [`normalize_key`]).
pub fn key_definition(key: &str) -> KeyDefinition {
    let named = |code: &str, key_code: u32, text: Option<&str>, modifier: u32| KeyDefinition {
        key: key.to_string(),
        code: code.to_string(),
        key_code,
        text: text.map(str::to_string),
        modifier,
    };

    match key {
        "Alt" => named("AltLeft", 18, None, MODIFIER_ALT),
        "Control" => named("ControlLeft", 17, None, MODIFIER_CONTROL),
        "Meta" => named("MetaLeft", 91, None, MODIFIER_META),
        "Shift" => named("ShiftLeft", 16, None, MODIFIER_SHIFT),
        "Backspace" => named("Backspace", 8, None, 0),
        "Tab" => named("Tab", 9, None, 0),
        "Enter" => named("Enter", 13, Some("\r"), 0),
        "Escape" => named("Escape", 27, None, 0),
        "CapsLock" => named("CapsLock", 20, None, 0),
        " " => named("Space", 32, Some(" "), 0),
        "PageUp" => named("PageUp", 33, None, 0),
        "PageDown" => named("PageDown", 34, None, 0),
        "End" => named("End", 35, None, 0),
        "Home" => named("Home", 36, None, 0),
        "ArrowLeft" => named("ArrowLeft", 37, None, 0),
        "ArrowUp" => named("ArrowUp", 38, None, 0),
        "ArrowRight" => named("ArrowRight", 39, None, 0),
        "ArrowDown" => named("ArrowDown", 40, None, 0),
        "Insert" => named("Insert", 45, None, 0),
        "Delete" => named("Delete", 46, None, 0),
        "Divide" => named("NumpadDivide", 111, Some("/"), 0),
        "Backslash" => KeyDefinition {
            key: "\\".to_string(),
            code: "Backslash".to_string(),
            key_code: 220,
            text: Some("\\".to_string()),
            modifier: 0,
        },
        _ => single_character(key).unwrap_or_else(|| function_key(key)),
    }
}

fn single_character(key: &str) -> Option<KeyDefinition> {
    let mut chars = key.chars();
    let ch = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let (code, key_code) = if ch.is_ascii_alphabetic() {
        let upper = ch.to_ascii_uppercase();
        (format!("Key{upper}"), upper as u32)
    } else if ch.is_ascii_digit() {
        (format!("Digit{ch}"), ch as u32)
    } else {
        (String::new(), 0)
    };
    Some(KeyDefinition {
        key: key.to_string(),
        code,
        key_code,
        text: Some(key.to_string()),
        modifier: 0,
    })
}

fn function_key(key: &str) -> KeyDefinition {
    let key_code = key
        .strip_prefix('F')
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| (1..=12).contains(n))
        .map(|n| 111 + n)
        .unwrap_or(0);
    KeyDefinition {
        key: key.to_string(),
        code: if key_code == 0 { String::new() } else { key.to_string() },
        key_code,
        text: None,
        modifier: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_case_and_whitespace_insensitive() {
        assert_eq!(normalize_key("  CMD "), "Meta");
        assert_eq!(normalize_key("super"), "Meta");
        assert_eq!(normalize_key("Win"), "Meta");
        assert_eq!(normalize_key("esc"), "Escape");
        assert_eq!(normalize_key("Return"), "Enter");
        assert_eq!(normalize_key("ctrl"), "Control");
        assert_eq!(normalize_key("option"), "Alt");
        assert_eq!(normalize_key("space"), " ");
    }

    #[test]
    fn unknown_keys_pass_through() {
        assert_eq!(normalize_key(" a "), "a");
        assert_eq!(normalize_key("F5"), "F5");
        assert_eq!(normalize_key("MediaPlayPause"), "MediaPlayPause");
    }

    #[test]
    fn definitions() {
        let ctrl = key_definition("Control");
        assert_eq!(ctrl.modifier, MODIFIER_CONTROL);
        assert_eq!(ctrl.text, None);

        let a = key_definition("a");
        assert_eq!(a.code, "KeyA");
        assert_eq!(a.key_code, 65);
        assert_eq!(a.text.as_deref(), Some("a"));

        assert_eq!(key_definition("Enter").key_code, 13);
        assert_eq!(key_definition("F5").key_code, 116);
        assert_eq!(key_definition("MediaPlayPause").key_code, 0);
    }
}
