use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{GmailError, Result};

pub const INBOX: &str = "INBOX";
pub const SENT: &str = "SENT";
pub const DRAFT: &str = "DRAFT";
pub const TRASH: &str = "TRASH";
pub const SPAM: &str = "SPAM";
pub const STARRED: &str = "STARRED";
pub const IMPORTANT: &str = "IMPORTANT";
pub const UNREAD: &str = "UNREAD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    System,
    User,
}

impl LabelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelType::System => "system",
            LabelType::User => "user",
        }
    }

    /// Unknown or missing types are treated as user labels
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("system") {
            LabelType::System
        } else {
            LabelType::User
        }
    }
}

/// Whether messages carrying the label appear in the message list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageVisibility {
    Show,
    Hide,
}

impl MessageVisibility {
    /// `messageListVisibility` wire values: `show` | `hide`
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "show" => Some(MessageVisibility::Show),
            "hide" => Some(MessageVisibility::Hide),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageVisibility::Show => "show",
            MessageVisibility::Hide => "hide",
        }
    }
}

/// Visibility of the label itself in the label list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Show,
    ShowIfUnread,
    Hide,
}

impl Visibility {
    /// `labelListVisibility` wire values: `labelShow` | `labelShowIfUnread` | `labelHide`
    pub fn from_label_list(value: &str) -> Option<Self> {
        match value {
            "labelShow" => Some(Visibility::Show),
            "labelShowIfUnread" => Some(Visibility::ShowIfUnread),
            "labelHide" => Some(Visibility::Hide),
            _ => None,
        }
    }

    pub fn as_label_list(&self) -> &'static str {
        match self {
            Visibility::Show => "labelShow",
            Visibility::ShowIfUnread => "labelShowIfUnread",
            Visibility::Hide => "labelHide",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelColor {
    pub text_color: String,
    pub background_color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub label_type: LabelType,
    pub message_list_visibility: Option<MessageVisibility>,
    pub label_list_visibility: Option<Visibility>,
    pub messages_total: Option<u64>,
    pub messages_unread: Option<u64>,
    pub threads_total: Option<u64>,
    pub threads_unread: Option<u64>,
    pub color: Option<LabelColor>,
}

/// Counts arrive as JSON numbers, but tolerate numeric strings
fn count(value: &Value, key: &str) -> Option<u64> {
    value
        .get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
}

fn text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

impl Label {
    pub fn from_api_response(value: &Value) -> Result<Self> {
        let id = text(value, "id")
            .ok_or_else(|| GmailError::InvalidResponse("Label has no id".to_string()))?;

        let color = value.get("color").and_then(|c| {
            Some(LabelColor {
                text_color: text(c, "textColor")?.to_string(),
                background_color: text(c, "backgroundColor")?.to_string(),
            })
        });

        Ok(Self {
            id: id.to_string(),
            name: text(value, "name").unwrap_or(id).to_string(),
            label_type: text(value, "type")
                .map(LabelType::parse)
                .unwrap_or(LabelType::User),
            message_list_visibility: text(value, "messageListVisibility")
                .and_then(MessageVisibility::parse),
            label_list_visibility: text(value, "labelListVisibility")
                .and_then(Visibility::from_label_list),
            messages_total: count(value, "messagesTotal"),
            messages_unread: count(value, "messagesUnread"),
            threads_total: count(value, "threadsTotal"),
            threads_unread: count(value, "threadsUnread"),
            color,
        })
    }

    /// Wire representation; absent optional fields are omitted
    pub fn to_api_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".to_string(), json!(self.id));
        map.insert("name".to_string(), json!(self.name));
        map.insert("type".to_string(), json!(self.label_type.as_str()));

        if let Some(v) = self.message_list_visibility {
            map.insert("messageListVisibility".to_string(), json!(v.as_str()));
        }
        if let Some(v) = self.label_list_visibility {
            map.insert("labelListVisibility".to_string(), json!(v.as_label_list()));
        }

        for (key, value) in [
            ("messagesTotal", self.messages_total),
            ("messagesUnread", self.messages_unread),
            ("threadsTotal", self.threads_total),
            ("threadsUnread", self.threads_unread),
        ] {
            if let Some(value) = value {
                map.insert(key.to_string(), json!(value));
            }
        }

        if let Some(color) = &self.color {
            map.insert(
                "color".to_string(),
                json!({"textColor": color.text_color, "backgroundColor": color.background_color}),
            );
        }
        Value::Object(map)
    }

    pub fn is_system(&self) -> bool {
        self.label_type == LabelType::System
    }

    pub fn is_user(&self) -> bool {
        self.label_type == LabelType::User
    }

    /// Hidden only when the label list says `labelHide`
    pub fn is_visible(&self) -> bool {
        self.label_list_visibility != Some(Visibility::Hide)
    }

    pub fn has_unread(&self) -> bool {
        self.messages_unread.unwrap_or(0) > 0
    }
}

/// Split labels into (visible, hidden) by label-list visibility
pub fn partition_by_visibility(labels: &[Label]) -> (Vec<Label>, Vec<Label>) {
    labels.iter().cloned().partition(Label::is_visible)
}

/// Split labels into (system, user) by type
pub fn partition_by_type(labels: &[Label]) -> (Vec<Label>, Vec<Label>) {
    labels.iter().cloned().partition(Label::is_system)
}

/// Fields accepted by label create and update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelDraft {
    pub name: String,
    pub message_list_visibility: Option<MessageVisibility>,
    pub label_list_visibility: Option<Visibility>,
    pub color: Option<LabelColor>,
}

impl LabelDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn to_api_value(&self) -> Value {
        let mut body = json!({"name": self.name});
        if let Some(v) = self.message_list_visibility {
            body["messageListVisibility"] = json!(v.as_str());
        }
        if let Some(v) = self.label_list_visibility {
            body["labelListVisibility"] = json!(v.as_label_list());
        }
        if let Some(color) = &self.color {
            body["color"] =
                json!({"textColor": color.text_color, "backgroundColor": color.background_color});
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_full_label() {
        let value = json!({
            "id": "Label_12",
            "name": "Receipts",
            "type": "user",
            "messageListVisibility": "show",
            "labelListVisibility": "labelShowIfUnread",
            "messagesTotal": 40,
            "messagesUnread": 2,
            "threadsTotal": 35,
            "threadsUnread": 2,
            "color": {"textColor": "#000000", "backgroundColor": "#ffffff"}
        });
        let label = Label::from_api_response(&value).unwrap();

        assert_eq!(label.label_type, LabelType::User);
        assert_eq!(label.label_list_visibility, Some(Visibility::ShowIfUnread));
        assert_eq!(label.messages_unread, Some(2));
        assert!(label.has_unread());
        assert_eq!(label.to_api_value(), value);
    }

    #[test]
    fn test_absent_fields_are_none() {
        let label = Label::from_api_response(&json!({"id": "INBOX", "name": "INBOX", "type": "system"}))
            .unwrap();
        assert!(label.is_system());
        assert!(label.messages_total.is_none());
        assert!(label.color.is_none());
        assert!(label.is_visible());
    }

    #[test]
    fn test_missing_id_is_invalid() {
        assert!(Label::from_api_response(&json!({"name": "x"})).is_err());
    }

    #[test]
    fn test_draft_omits_unset_fields() {
        let draft = LabelDraft {
            label_list_visibility: Some(Visibility::Hide),
            ..LabelDraft::new("Archive/2024")
        };
        assert_eq!(
            draft.to_api_value(),
            json!({"name": "Archive/2024", "labelListVisibility": "labelHide"})
        );
    }

    #[test]
    fn test_message_list_visibility_has_no_show_if_unread() {
        // Only the label list has a third state
        assert_eq!(MessageVisibility::parse("showIfUnread"), None);
        assert_eq!(MessageVisibility::parse("labelShowIfUnread"), None);

        let value = json!({
            "id": "Label_7",
            "name": "Newsletters",
            "type": "user",
            "messageListVisibility": "hide",
            "labelListVisibility": "labelShowIfUnread"
        });
        let label = Label::from_api_response(&value).unwrap();
        assert_eq!(label.message_list_visibility, Some(MessageVisibility::Hide));
        assert_eq!(label.label_list_visibility, Some(Visibility::ShowIfUnread));
        assert_eq!(Label::from_api_response(&label.to_api_value()).unwrap(), label);
    }

    fn arb_label() -> impl Strategy<Value = Label> {
        (
            "[A-Za-z0-9_]{1,12}",
            prop_oneof![Just(LabelType::System), Just(LabelType::User)],
            proptest::option::of(prop_oneof![
                Just(MessageVisibility::Show),
                Just(MessageVisibility::Hide)
            ]),
            proptest::option::of(prop_oneof![
                Just(Visibility::Show),
                Just(Visibility::ShowIfUnread),
                Just(Visibility::Hide)
            ]),
            proptest::option::of(0u64..10_000),
            proptest::option::of(0u64..10_000),
        )
            .prop_map(|(id, label_type, mlv, llv, total, unread)| Label {
                name: format!("name-{}", id),
                id,
                label_type,
                message_list_visibility: mlv,
                label_list_visibility: llv,
                messages_total: total,
                messages_unread: unread,
                threads_total: None,
                threads_unread: None,
                color: None,
            })
    }

    proptest! {
        #[test]
        fn prop_api_value_roundtrips(label in arb_label()) {
            let parsed = Label::from_api_response(&label.to_api_value()).unwrap();
            prop_assert_eq!(parsed, label);
        }

        #[test]
        fn prop_partitions_cover_every_label(labels in proptest::collection::vec(arb_label(), 0..20)) {
            let (visible, hidden) = partition_by_visibility(&labels);
            prop_assert_eq!(visible.len() + hidden.len(), labels.len());
            prop_assert!(hidden.iter().all(|l| l.label_list_visibility == Some(Visibility::Hide)));
            prop_assert!(visible.iter().all(Label::is_visible));

            let (system, user) = partition_by_type(&labels);
            prop_assert_eq!(system.len() + user.len(), labels.len());
            prop_assert!(system.iter().all(Label::is_system));
            prop_assert!(user.iter().all(Label::is_user));
        }
    }
}
