//! Operator list, read once at startup from the game server's `ops.json`:
//! a shallow object array, parsed with a real JSON parser.

use std::io;
use std::path::Path;

use serde::Deserialize;

/// One operator entry as the game server writes it.
#[derive(Debug, Clone, Deserialize)]
pub struct OpInfo {
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    #[serde(default = "default_level")]
    pub level: i32,
    #[serde(default, rename = "bypassesPlayerLimit")]
    pub bypasses_player_limit: bool,
}

fn default_level() -> i32 {
    4
}

/// Loads the operator list. A missing file is an empty list; a malformed one
/// is an error for the caller to log.
pub fn load_ops(path: &Path) -> io::Result<Vec<OpInfo>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let ops: Vec<OpInfo> = serde_json::from_str(&text)?;
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_the_game_server_format() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"uuid":"aa-bb","name":"Alice","level":4,"bypassesPlayerLimit":false}},
                {{"name":"Bob","level":3}}
            ]"#
        )
        .unwrap();

        let ops = load_ops(file.path()).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].name, "Alice");
        assert_eq!(ops[0].uuid, "aa-bb");
        assert_eq!(ops[1].name, "Bob");
        assert_eq!(ops[1].level, 3);
        assert!(!ops[1].bypasses_player_limit);
    }

    #[test]
    fn missing_file_is_an_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let ops = load_ops(&dir.path().join("ops.json")).unwrap();
        assert!(ops.is_empty());
    }
}
