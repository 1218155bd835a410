//! Forbidden-action rule table, loaded once at startup.
//!
//! File format: one `keyword <hours>` pair per line, whitespace-separated;
//! blank lines and `#` comments are skipped, a leading `/` on the keyword is
//! dropped. `hours == 0` means a permanent ban.

use std::io;
use std::path::Path;

/// One forbidden-action rule. The keyword is compared against a
/// whitespace-stripped, case-folded projection of the candidate content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenRule {
    pub keyword: String,
    pub ban_hours: u64,
}

impl ForbiddenRule {
    /// True for rules that ban forever.
    pub fn is_permanent(&self) -> bool {
        self.ban_hours == 0
    }
}

/// Loads the rule table, creating an empty placeholder when missing.
/// Malformed lines are skipped so old files keep loading.
pub fn load_rules(path: &Path) -> io::Result<Vec<ForbiddenRule>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, b"")?;
            return Ok(Vec::new());
        }
        Err(err) => return Err(err),
    };

    let mut rules = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(keyword), Some(hours)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(ban_hours) = hours.parse::<u64>() else {
            continue;
        };
        let keyword = keyword.strip_prefix('/').unwrap_or(keyword).to_string();
        if keyword.is_empty() {
            continue;
        }
        rules.push(ForbiddenRule { keyword, ban_hours });
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_rules_in_order_skipping_noise() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# forbidden actions").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "/killall 24").unwrap();
        writeln!(file, "creative 0").unwrap();
        writeln!(file, "incomplete").unwrap();
        writeln!(file, "badhours xyz").unwrap();

        let rules = load_rules(file.path()).unwrap();
        assert_eq!(
            rules,
            vec![
                ForbiddenRule { keyword: "killall".into(), ban_hours: 24 },
                ForbiddenRule { keyword: "creative".into(), ban_hours: 0 },
            ]
        );
        assert!(rules[1].is_permanent());
    }

    #[test]
    fn missing_file_becomes_an_empty_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forbidden_commands.list");
        let rules = load_rules(&path).unwrap();
        assert!(rules.is_empty());
        assert!(path.exists());
    }
}
