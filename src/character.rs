use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::llm::strip_terminator;
use crate::prompts;
use crate::repair::{self, ParseError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub role: String,
    pub description: String,
    pub personality: String,
    #[serde(default)]
    pub relationships: BTreeMap<String, String>,
    #[serde(default)]
    pub key_traits: Vec<String>,
    /// `None` is persisted as `0`.
    #[serde(default, with = "chapter_slot")]
    pub first_appearance: Option<u32>,
    #[serde(default, with = "chapter_slot")]
    pub last_appearance: Option<u32>,
    pub story_arc: String,
}

/// Chapter numbers as written by earlier runs: a number, a numeric string, or
/// `0` for unset.
mod chapter_slot {
    use serde::{Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(value.unwrap_or(0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(super::chapter_from_value(&value))
    }
}

fn chapter_from_value(value: &Value) -> Option<u32> {
    let chapter = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u32::try_from(chapter).ok().filter(|&chapter| chapter > 0)
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CharacterError {
    #[error("character entry is not an object")]
    NotAnObject,

    #[error("character entry is missing `{field}`")]
    MissingField { field: &'static str },

    #[error("character {name:?} is missing `{field}`")]
    MissingFieldFor { name: String, field: &'static str },
}

/// A character as extracted from a model reply, before appearance coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterProfile {
    pub name: String,
    pub role: String,
    pub description: String,
    pub personality: String,
    pub relationships: BTreeMap<String, String>,
    pub key_traits: Vec<String>,
    pub first_appearance: Option<String>,
    pub story_arc: String,
}

impl CharacterProfile {
    pub fn from_value(value: &Value) -> Result<Self, CharacterError> {
        let object = value.as_object().ok_or(CharacterError::NotAnObject)?;

        let name = object
            .get("name")
            .and_then(scalar_text)
            .filter(|name| !name.trim().is_empty())
            .ok_or(CharacterError::MissingField { field: "name" })?
            .trim()
            .to_owned();
        let required = |field: &'static str| {
            object
                .get(field)
                .and_then(scalar_text)
                .ok_or_else(|| CharacterError::MissingFieldFor {
                    name: name.clone(),
                    field,
                })
        };

        let role = required("role")?;
        let description = required("description")?;
        let personality = required("personality")?;
        let story_arc = required("story_arc")?;

        let relationships = match object.get("relationships") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(other, relation)| (other.clone(), value_text(relation)))
                .collect(),
            _ => BTreeMap::new(),
        };
        let key_traits = match object.get("key_traits") {
            Some(Value::Array(traits)) => traits.iter().map(value_text).collect(),
            Some(Value::String(single)) if !single.trim().is_empty() => vec![single.clone()],
            _ => Vec::new(),
        };
        let first_appearance = object.get("first_appearance").and_then(scalar_text);

        Ok(Self {
            name,
            role,
            description,
            personality,
            relationships,
            key_traits,
            first_appearance,
            story_arc,
        })
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parses a character-extraction reply. The outer error means the reply had no
/// usable payload; inner errors are per-entry and may be skipped.
pub fn parse_character_list(
    response: &str,
) -> Result<Vec<Result<CharacterProfile, CharacterError>>, ParseError> {
    let value = repair::parse_lenient(&strip_terminator(response))?;
    let entries = character_entries(value)?;
    Ok(entries.iter().map(CharacterProfile::from_value).collect())
}

fn character_entries(value: Value) -> Result<Vec<Value>, ParseError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut object) => match object.remove("characters") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Object(map)) => Ok(named_entries(map)),
            Some(_) => Err(ParseError::Shape {
                expected: "`characters` to be an array or object",
            }),
            None if object.contains_key("name") => Ok(vec![Value::Object(object)]),
            None if !object.is_empty() && object.values().all(Value::is_object) => {
                Ok(named_entries(object))
            }
            None => Err(ParseError::Shape {
                expected: "a character array or object",
            }),
        },
        _ => Err(ParseError::Shape {
            expected: "a character array or object",
        }),
    }
}

/// `{"Mara": {...}}` entries; the key fills in a missing name.
fn named_entries(map: serde_json::Map<String, Value>) -> Vec<Value> {
    map.into_iter()
        .map(|(key, mut entry)| {
            if let Value::Object(fields) = &mut entry
                && !fields.contains_key("name")
            {
                fields.insert("name".to_owned(), Value::String(key));
            }
            entry
        })
        .collect()
}

/// Persisted form of the store: characters by lower-cased name plus the
/// per-chapter mention table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRegistry {
    pub characters: BTreeMap<String, Character>,
    #[serde(default)]
    pub mentions: BTreeMap<u32, BTreeMap<String, u32>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterStore {
    characters: BTreeMap<String, Character>,
    mentions: BTreeMap<u32, BTreeMap<String, u32>>,
}

impl CharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `profile` under its lower-cased name and returns any character it
    /// replaced. A first appearance that is not a positive number becomes unset.
    pub fn add(&mut self, profile: CharacterProfile) -> Option<Character> {
        let first = profile
            .first_appearance
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|&chapter| chapter > 0);
        if first.is_none() && profile.first_appearance.is_some() {
            tracing::debug!(
                name = %profile.name,
                first_appearance = ?profile.first_appearance,
                "first appearance is not a chapter number; leaving it unset"
            );
        }

        let character = Character {
            name: profile.name,
            role: profile.role,
            description: profile.description,
            personality: profile.personality,
            relationships: profile.relationships,
            key_traits: profile.key_traits,
            first_appearance: first,
            last_appearance: first,
            story_arc: profile.story_arc,
        };
        self.characters
            .insert(character.name.to_lowercase(), character)
    }

    pub fn get(&self, name: &str) -> Option<&Character> {
        self.characters.get(&name.to_lowercase())
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Returns false when the character is unknown or `chapter` is 0.
    pub fn update_appearance(&mut self, name: &str, chapter: u32) -> bool {
        if chapter == 0 {
            return false;
        }
        let Some(character) = self.characters.get_mut(&name.to_lowercase()) else {
            return false;
        };
        if character.first_appearance.is_none_or(|first| chapter < first) {
            character.first_appearance = Some(chapter);
        }
        character.last_appearance = Some(chapter);
        true
    }

    pub fn record_mention(&mut self, chapter: u32, name: &str) {
        *self
            .mentions
            .entry(chapter)
            .or_default()
            .entry(name.to_lowercase())
            .or_insert(0) += 1;
    }

    pub fn mentions_in(&self, chapter: u32) -> Option<&BTreeMap<String, u32>> {
        self.mentions.get(&chapter)
    }

    /// Updates appearances and mentions for every known character named in
    /// `content`, once per character. A rescan replaces the chapter's
    /// previous mention counts. Returns the matched names.
    pub fn scan_chapter_text(&mut self, content: &str, chapter: u32) -> Vec<String> {
        self.mentions.remove(&chapter);
        let haystack = content.to_lowercase();
        let found: Vec<String> = self
            .characters
            .values()
            .filter(|character| {
                let needle = character.name.trim().to_lowercase();
                !needle.is_empty() && haystack.contains(&needle)
            })
            .map(|character| character.name.clone())
            .collect();

        for name in &found {
            self.update_appearance(name, chapter);
            self.record_mention(chapter, name);
        }
        found
    }

    /// Characters not yet placed in the story, or last seen within `window`
    /// chapters of `chapter`.
    pub fn active_characters(&self, chapter: u32, window: u32) -> Vec<&Character> {
        let horizon = chapter.saturating_sub(window);
        self.characters
            .values()
            .filter(|character| character.last_appearance.is_none_or(|last| last >= horizon))
            .collect()
    }

    pub fn context_for_chapter(&self, chapter: u32, window: u32) -> String {
        prompts::character_context(&self.active_characters(chapter, window))
    }

    pub fn to_registry(&self) -> CharacterRegistry {
        CharacterRegistry {
            characters: self.characters.clone(),
            mentions: self.mentions.clone(),
        }
    }

    /// Replaces all state with `registry`, normalizing name keys.
    pub fn restore(&mut self, registry: CharacterRegistry) {
        self.characters = registry
            .characters
            .into_iter()
            .map(|(key, character)| {
                let name = character.name.to_lowercase();
                if name != key.to_lowercase() {
                    tracing::warn!(
                        %key,
                        name = %character.name,
                        "registry key differs from character name; keying by name"
                    );
                }
                (name, character)
            })
            .collect();

        self.mentions.clear();
        for (chapter, counts) in registry.mentions {
            let bucket = self.mentions.entry(chapter).or_default();
            for (name, count) in counts {
                *bucket.entry(name.to_lowercase()).or_insert(0) += count;
            }
        }
    }

    pub fn from_registry(registry: CharacterRegistry) -> Self {
        let mut store = Self::new();
        store.restore(registry);
        store
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn profile(name: &str, first: Option<&str>) -> CharacterProfile {
        CharacterProfile {
            name: name.to_owned(),
            role: "Protagonist".to_owned(),
            description: "A harbor pilot".to_owned(),
            personality: "Stubborn".to_owned(),
            relationships: BTreeMap::new(),
            key_traits: vec!["loyal".to_owned()],
            first_appearance: first.map(str::to_owned),
            story_arc: "Learns to trust".to_owned(),
        }
    }

    #[test]
    fn add_coerces_non_numeric_first_appearance() {
        let mut store = CharacterStore::new();
        store.add(profile("Mara", Some("not-a-number")));

        let mara = store.get("mara").map(Clone::clone).unwrap_or_default();
        assert_eq!(mara.first_appearance, None);
        assert_eq!(mara.last_appearance, None);
    }

    #[test]
    fn add_sets_both_appearances_from_number_and_overwrites_by_name() {
        let mut store = CharacterStore::new();
        assert!(store.add(profile("Mara", Some("2"))).is_none());
        let mara = store.get("MARA").cloned().unwrap_or_default();
        assert_eq!((mara.first_appearance, mara.last_appearance), (Some(2), Some(2)));

        let replaced = store.add(profile("mara", None));
        assert_eq!(replaced.map(|c| c.name), Some("Mara".to_owned()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_appearance_advances_last_and_keeps_first() {
        let mut store = CharacterStore::new();
        store.add(profile("Mara", None));

        assert!(store.update_appearance("Mara", 3));
        assert!(store.update_appearance("mara", 5));
        let mara = store.get("Mara").cloned().unwrap_or_default();
        assert_eq!(mara.first_appearance, Some(3));
        assert_eq!(mara.last_appearance, Some(5));

        assert!(!store.update_appearance("Nobody", 5));
        assert!(!store.update_appearance("Mara", 0));
    }

    #[test]
    fn scan_counts_a_character_once_per_chapter() {
        let mut store = CharacterStore::new();
        store.add(profile("Mara", None));
        store.add(profile("Tobin Vale", None));

        let found = store.scan_chapter_text("MARA laughed. Mara ran. mara hid.", 4);
        assert_eq!(found, ["Mara"]);
        assert_eq!(store.mentions_in(4).and_then(|m| m.get("mara")), Some(&1));
        assert_eq!(store.get("tobin vale").and_then(|c| c.last_appearance), None);

        store.record_mention(4, "Mara");
        assert_eq!(store.mentions_in(4).and_then(|m| m.get("mara")), Some(&2));

        store.scan_chapter_text("Tobin Vale waits.", 4);
        assert_eq!(store.mentions_in(4).and_then(|m| m.get("mara")), None);
        assert_eq!(store.mentions_in(4).and_then(|m| m.get("tobin vale")), Some(&1));
    }

    #[test]
    fn registry_round_trip_reproduces_store() -> anyhow::Result<()> {
        let mut store = CharacterStore::new();
        store.add(profile("Mara", Some("1")));
        store.add(profile("Tobin", Some("later")));
        store.scan_chapter_text("Mara and Tobin meet.", 2);

        let json = serde_json::to_string(&store.to_registry())?;
        let registry: CharacterRegistry = serde_json::from_str(&json)?;
        assert_eq!(CharacterStore::from_registry(registry), store);
        Ok(())
    }

    #[test]
    fn restore_keys_characters_by_name() {
        let registry = CharacterRegistry {
            characters: [(
                "captain".to_owned(),
                Character {
                    name: "Mara".to_owned(),
                    ..Character::default()
                },
            )]
            .into(),
            mentions: BTreeMap::new(),
        };
        let mut store = CharacterStore::from_registry(registry);

        assert!(store.get("captain").is_none());
        assert_eq!(store.scan_chapter_text("Mara docks.", 3), ["Mara"]);
        assert_eq!(store.get("mara").and_then(|c| c.last_appearance), Some(3));
    }

    #[test]
    fn appearance_slots_accept_strings_and_zero() -> anyhow::Result<()> {
        let character: Character = serde_json::from_value(json!({
            "name": "Mara", "role": "r", "description": "d", "personality": "p",
            "first_appearance": "3", "last_appearance": 0, "story_arc": "a"
        }))?;
        assert_eq!(character.first_appearance, Some(3));
        assert_eq!(character.last_appearance, None);

        let value = serde_json::to_value(&character)?;
        assert_eq!(value["last_appearance"], 0);
        assert_eq!(value["first_appearance"], 3);
        Ok(())
    }

    #[test]
    fn active_characters_respect_recency_window() {
        let mut store = CharacterStore::new();
        store.add(profile("Mara", None));
        store.add(profile("Tobin", None));
        store.add(profile("Iris", None));
        store.update_appearance("Tobin", 1);
        store.update_appearance("Iris", 4);

        let names: Vec<&str> = store
            .active_characters(6, 2)
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, ["Iris", "Mara"]);
        assert!(store.context_for_chapter(6, 2).contains("Name: Iris"));
    }

    #[test]
    fn parse_character_list_skips_malformed_entries() -> anyhow::Result<()> {
        let response = "Here are the profiles:\n```json\n[\n\
            {\"name\": \"Mara\", \"role\": \"Pilot\", \"description\": \"d\", \"personality\": \"p\",\n\
             \"relationships\": {\"Tobin\": \"brother\"}, \"key_traits\": [\"brave\", 3],\n\
             \"first_appearance\": 1, \"story_arc\": \"a\"},\n\
            {\"name\": \"Tobin\", \"description\": \"d\"},\n\
            ]\n```\nTERMINATE";
        let entries = parse_character_list(response)?;
        assert_eq!(entries.len(), 2);

        let mara = entries[0].clone()?;
        assert_eq!(mara.first_appearance.as_deref(), Some("1"));
        assert_eq!(mara.key_traits, ["brave", "3"]);
        assert_eq!(mara.relationships.get("Tobin").map(String::as_str), Some("brother"));
        assert_eq!(
            entries[1],
            Err(CharacterError::MissingFieldFor {
                name: "Tobin".to_owned(),
                field: "role"
            })
        );
        Ok(())
    }

    #[test]
    fn parse_character_list_accepts_wrapped_and_keyed_objects() -> anyhow::Result<()> {
        let wrapped = parse_character_list(
            r#"{"characters": [{"name": "Mara", "role": "r", "description": "d", "personality": "p", "story_arc": "a"}]}"#,
        )?;
        assert_eq!(wrapped.len(), 1);

        let keyed = parse_character_list(
            r#"{"Mara": {"role": "r", "description": "d", "personality": "p", "story_arc": "a"}}"#,
        )?;
        assert_eq!(keyed[0].as_ref().map(|p| p.name.as_str()), Ok("Mara"));
        Ok(())
    }

    #[test]
    fn parse_character_list_rejects_unusable_replies() {
        assert!(parse_character_list("TERMINATE").is_err());
        assert!(matches!(
            parse_character_list("[1, 2]").map(|entries| entries.len()),
            Ok(2)
        ));
        assert!(matches!(
            parse_character_list("\"just a string\" {}"),
            Err(ParseError::Shape { .. })
        ));
    }
}
