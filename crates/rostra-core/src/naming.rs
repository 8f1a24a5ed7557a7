//! Room naming and topic policy.
//!
//! Pure functions of course, group and module data. The same derivation runs
//! at provisioning time and when a module is renamed, so a room's name always
//! reflects the current module name.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! text_value {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Trim and validate.
            pub fn new(value: &str) -> Result<Self, ValidationError> {
                let value = value.trim();
                if value.is_empty() {
                    return Err(ValidationError::Blank($what));
                }
                Ok(Self(value.to_string()))
            }

            /// Borrow the text.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

text_value!(
    /// Display name of a remote room.
    RoomName,
    "room name"
);

text_value!(
    /// Name of a chat module.
    ModuleName,
    "module name"
);

/// Topic of a remote room. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RoomTopic(String);

impl RoomTopic {
    /// Trimmed topic text.
    pub fn new(value: &str) -> Self {
        Self(value.trim().to_string())
    }

    /// Borrow the text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoomTopic {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<RoomTopic> for String {
    fn from(value: RoomTopic) -> Self {
        value.0
    }
}

/// Room name for a module.
///
/// `"<module> (<course>)"` for a whole-course room,
/// `"<group>: <module> (<course>)"` for a group room.
pub fn room_name(
    course_short_name: &str,
    group_name: Option<&str>,
    module_name: &ModuleName,
) -> RoomName {
    let course = course_short_name.trim();
    let scoped = if course.is_empty() {
        module_name.as_str().to_string()
    } else {
        format!("{module_name} ({course})")
    };

    let name = match group_name.map(str::trim) {
        Some(group) if !group.is_empty() => format!("{group}: {scoped}"),
        _ => scoped,
    };

    // Built from a non-blank module name, so never blank.
    RoomName(name)
}

/// Room topic for a module: the module's own topic.
pub fn room_topic(module_topic: &RoomTopic) -> RoomTopic {
    module_topic.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str) -> ModuleName {
        ModuleName::new(name).unwrap()
    }

    #[test]
    fn course_room_name() {
        let name = room_name("CS101", None, &module("Office hours"));
        assert_eq!(name.as_str(), "Office hours (CS101)");
    }

    #[test]
    fn group_room_name() {
        let name = room_name("CS101", Some("Group A"), &module("Office hours"));
        assert_eq!(name.as_str(), "Group A: Office hours (CS101)");
    }

    #[test]
    fn blank_group_name_is_course_form() {
        let name = room_name("CS101", Some("  "), &module("Chat"));
        assert_eq!(name.as_str(), "Chat (CS101)");
    }

    #[test]
    fn blank_course_short_name_drops_scope() {
        let name = room_name(" ", None, &module("Chat"));
        assert_eq!(name.as_str(), "Chat");
    }

    #[test]
    fn naming_is_deterministic() {
        let a = room_name("BIO", Some("Lab 2"), &module("Discussion"));
        let b = room_name("BIO", Some("Lab 2"), &module("Discussion"));
        assert_eq!(a, b);
    }

    #[test]
    fn names_are_trimmed_and_non_blank() {
        assert_eq!(ModuleName::new("  Chat ").unwrap().as_str(), "Chat");
        assert_eq!(ModuleName::new("   "), Err(ValidationError::Blank("module name")));
        assert_eq!(RoomName::new(""), Err(ValidationError::Blank("room name")));
        assert_eq!(RoomTopic::new("  about  ").as_str(), "about");
    }

    #[test]
    fn topic_is_module_topic() {
        let topic = RoomTopic::new("Weekly questions");
        assert_eq!(room_topic(&topic), topic);
    }
}
