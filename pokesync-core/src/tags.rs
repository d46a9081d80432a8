//! Tag references and system tag definitions.

use crate::TagParent;
use serde_json::Value;
use std::collections::HashSet;

/// Keys checked, in order, when a tag reference is an object.
const TAG_ID_KEYS: [&str; 3] = ["tag_id", "id", "value"];

/// One of the per-user tags derived from instance flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemTagDef {
    pub parent: TagParent,
    pub name: &'static str,
    pub color: &'static str,
    pub sort: i32,
}

/// Flag that selects a system tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemTagKind {
    Favorite,
    ForTrade,
    Wanted,
    MostWanted,
}

pub const SYSTEM_TAGS: [(SystemTagKind, SystemTagDef); 4] = [
    (
        SystemTagKind::Favorite,
        SystemTagDef {
            parent: TagParent::Caught,
            name: "Favorite",
            color: "#facc15",
            sort: 10,
        },
    ),
    (
        SystemTagKind::ForTrade,
        SystemTagDef {
            parent: TagParent::Trade,
            name: "For Trade",
            color: "#22c55e",
            sort: 20,
        },
    ),
    (
        SystemTagKind::Wanted,
        SystemTagDef {
            parent: TagParent::Wanted,
            name: "Wanted",
            color: "#3b82f6",
            sort: 30,
        },
    ),
    (
        SystemTagKind::MostWanted,
        SystemTagDef {
            parent: TagParent::Wanted,
            name: "Most Wanted",
            color: "#ef4444",
            sort: 40,
        },
    ),
];

/// Flags that drive system tag membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagFlags {
    pub favorite: bool,
    pub is_for_trade: bool,
    pub is_wanted: bool,
    pub most_wanted: bool,
}

impl TagFlags {
    pub fn any(&self) -> bool {
        self.favorite || self.is_for_trade || self.is_wanted || self.most_wanted
    }

    pub fn selects(&self, kind: SystemTagKind) -> bool {
        match kind {
            SystemTagKind::Favorite => self.favorite,
            SystemTagKind::ForTrade => self.is_for_trade,
            SystemTagKind::Wanted => self.is_wanted,
            SystemTagKind::MostWanted => self.most_wanted,
        }
    }
}

/// Find the system tag kind for a `(parent, name)` pair.
pub fn system_tag_kind(parent: TagParent, name: &str) -> Option<SystemTagKind> {
    SYSTEM_TAGS
        .iter()
        .find(|(_, def)| def.parent == parent && def.name == name)
        .map(|(kind, _)| *kind)
}

/// Extract tag ids from a tag-reference list.
///
/// Accepts a JSON array or a string holding a JSON array. Items are strings
/// or objects carrying one of `tag_id`, `id`, `value`. Blank and unknown
/// items are ignored; duplicates keep their first position.
pub fn extract_tag_ids(value: &Value) -> Vec<String> {
    let parsed;
    let items = match value {
        Value::Array(items) => items,
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw.trim()).ok();
            match &parsed {
                Some(Value::Array(items)) => items,
                _ => return Vec::new(),
            }
        }
        _ => return Vec::new(),
    };

    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(tag_id_of)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn tag_id_of(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(obj) => TAG_ID_KEYS.iter().find_map(|key| match obj.get(*key) {
            Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }),
        _ => None,
    }
}

/// Merge several id lists, dropping blanks and duplicates.
pub fn merge_unique<I, S>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_mixed_shapes() {
        let v = json!([
            "a",
            {"tag_id": "b"},
            {"id": "c"},
            {"value": "d"},
            {"name": "ignored"},
            42,
            " ",
            "a"
        ]);
        assert_eq!(extract_tag_ids(&v), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_extract_object_key_precedence() {
        let v = json!([{"value": "v", "id": "i", "tag_id": "t"}, {"tag_id": "", "id": "x"}]);
        assert_eq!(extract_tag_ids(&v), vec!["t", "x"]);
    }

    #[test]
    fn test_extract_from_encoded_string() {
        let v = json!("[\"x\", {\"id\": \"y\"}]");
        assert_eq!(extract_tag_ids(&v), vec!["x", "y"]);
        assert!(extract_tag_ids(&json!("not json")).is_empty());
        assert!(extract_tag_ids(&json!(null)).is_empty());
        assert!(extract_tag_ids(&json!({"id": "z"})).is_empty());
    }

    #[test]
    fn test_merge_unique() {
        let merged = merge_unique(vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["b".to_string(), " ".to_string(), "c".to_string()],
        ]);
        assert_eq!(merged, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_system_tag_lookup() {
        assert_eq!(
            system_tag_kind(TagParent::Wanted, "Most Wanted"),
            Some(SystemTagKind::MostWanted)
        );
        assert_eq!(system_tag_kind(TagParent::Trade, "Wanted"), None);
    }

    #[test]
    fn test_tag_flags() {
        let flags = TagFlags {
            is_wanted: true,
            ..Default::default()
        };
        assert!(flags.any());
        assert!(flags.selects(SystemTagKind::Wanted));
        assert!(!flags.selects(SystemTagKind::MostWanted));
        assert!(!TagFlags::default().any());
    }
}
