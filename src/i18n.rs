use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::discord::EmbedField;

/// Directory holding `messages_<locale>.json` catalogs.
pub const I18N_DIR: &str = "i18n";

const EMBEDDED_EN: &str = include_str!("../i18n/messages_en.json");

/// Substitutions applied to catalog strings, e.g. `("%game%", "Tetris")`.
pub type Substitutions<'a> = [(&'a str, String)];

/// Message catalog: nested JSON looked up by dotted key with `%placeholder%`
/// substitution. Falls back to the embedded English catalog when the
/// configured locale file is missing or malformed.
pub struct Messages {
    root: Value,
}

impl Messages {
    pub fn load(locale: &str) -> Self {
        let path = Path::new(I18N_DIR).join(format!("messages_{locale}.json"));
        let loaded = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|contents| Ok(serde_json::from_str(&contents)?));
        match loaded {
            Ok(root) => {
                info!(locale, path = %path.display(), "loaded message catalog");
                Self { root }
            }
            Err(e) => {
                warn!(locale, error = %e, "message catalog unavailable, using embedded English");
                Self::embedded()
            }
        }
    }

    /// The catalog compiled into the binary.
    pub fn embedded() -> Self {
        let root = serde_json::from_str(EMBEDDED_EN).unwrap_or_else(|e| {
            warn!(error = %e, "embedded message catalog is invalid");
            Value::Object(serde_json::Map::new())
        });
        Self { root }
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        let mut node = &self.root;
        for part in key.split('.') {
            node = node.get(part)?;
        }
        Some(node)
    }

    /// Resolve a string entry, warning on missing keys.
    pub fn get(&self, key: &str, vars: &Substitutions) -> String {
        match self.lookup(key).and_then(Value::as_str) {
            Some(text) => substitute(text, vars),
            None => {
                warn!(key, "missing message catalog entry");
                String::new()
            }
        }
    }

    /// Resolve a string entry that is allowed to be absent.
    pub fn maybe(&self, key: &str, vars: &Substitutions) -> Option<String> {
        self.lookup(key)
            .and_then(Value::as_str)
            .map(|text| substitute(text, vars))
    }

    /// Resolve an embed field list, dropping fields whose value substitutes
    /// to an empty string (e.g. no game name recorded yet).
    pub fn fields(&self, key: &str, vars: &Substitutions) -> Vec<EmbedField> {
        let Some(node) = self.lookup(key) else {
            return Vec::new();
        };
        let parsed: Vec<EmbedField> = match serde_json::from_value(node.clone()) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(key, error = %e, "malformed field list in catalog");
                return Vec::new();
            }
        };
        parsed
            .into_iter()
            .map(|field| EmbedField {
                name: substitute(&field.name, vars),
                value: substitute(&field.value, vars),
                inline: field.inline,
            })
            .filter(|field| !field.value.is_empty())
            .collect()
    }
}

fn substitute(text: &str, vars: &Substitutions) -> String {
    let mut out = text.to_string();
    for (placeholder, value) in vars {
        out = out.replace(placeholder, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Vec<(&'static str, String)> {
        vec![
            ("%streamer%", "alice".to_string()),
            ("%game%", "Tetris".to_string()),
            ("%title%", "ranked grind".to_string()),
            ("%viewer%", "42".to_string()),
            ("%startDate%", "<t:1700000000:R>".to_string()),
        ]
    }

    #[test]
    fn embedded_catalog_resolves_keys() {
        let messages = Messages::embedded();
        let title = messages.get("discord.embed.online.title", &vars());
        assert!(title.contains("alice"), "got {title:?}");
        assert!(!title.contains('%'), "unsubstituted placeholder in {title:?}");
    }

    #[test]
    fn missing_key_resolves_empty() {
        let messages = Messages::embedded();
        assert_eq!(messages.get("discord.no.such.key", &vars()), "");
        assert!(messages.maybe("discord.no.such.key", &vars()).is_none());
    }

    #[test]
    fn fields_substitute_and_drop_empty_values() {
        let messages = Messages::embedded();
        let fields = messages.fields("discord.embed.online.fields", &vars());
        assert!(!fields.is_empty());
        assert!(fields.iter().any(|f| f.value == "Tetris"));

        // With no game name, the game field disappears instead of rendering blank.
        let mut empty_game = vars();
        empty_game[1].1 = String::new();
        let fields = messages.fields("discord.embed.online.fields", &empty_game);
        assert!(fields.iter().all(|f| !f.value.is_empty()));
    }

    #[test]
    fn unknown_locale_falls_back_to_english() {
        let messages = Messages::load("xx");
        assert!(!messages.get("discord.event.title", &vars()).is_empty());
    }
}
