use serde::{Deserialize, Serialize};

use crate::hashing::HashMap;

/// Flattened attributes of one markup tag. The markup parser itself lives
/// outside this crate; by the time a definition reaches us it has already
/// been reduced to plain string key/value pairs.
pub type AttributeMap = HashMap<String, String>;

/// One resource entry nested inside a group tag, e.g.
/// `<texture name="ui_atlas" file="ui/atlas.png"/>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Tag name, used to select a constructor in the resource factory
    pub type_name: String,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl ResourceDefinition {
    /// The resource name, taken from the `name` attribute. A missing or empty
    /// name makes the definition unusable.
    pub fn name(&self) -> Option<&str> {
        self.attributes
            .get("name")
            .map(|x| x.as_str())
            .filter(|x| !x.is_empty())
    }

    /// Manual resources have an externally managed lifecycle and are excluded
    /// from the owning group's aggregate loaded state.
    pub fn is_manual(&self) -> bool {
        self.attributes.get("manual").map(|x| x.as_str()) == Some("true")
    }
}

/// A parsed group tag: name, source path, override flag, dependency entries
/// and nested resource definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub name: String,
    /// Path of the file the definition was parsed from. Used to guard against
    /// a group overriding itself.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub overridable: bool,
    /// Names of groups that must be loaded before this one
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn resource_def(
        type_name: &str,
        name: &str,
    ) -> ResourceDefinition {
        let mut attributes = AttributeMap::default();
        attributes.insert("name".to_string(), name.to_string());
        ResourceDefinition {
            type_name: type_name.to_string(),
            attributes,
        }
    }

    #[test]
    fn resource_name_comes_from_attributes() {
        let def = resource_def("texture", "ui_atlas");
        assert_eq!(def.name(), Some("ui_atlas"));

        // An empty name attribute is as bad as a missing one
        let def = resource_def("texture", "");
        assert_eq!(def.name(), None);
    }

    #[test]
    fn manual_flag_defaults_to_false() {
        let mut def = resource_def("sound", "click");
        assert!(!def.is_manual());

        def.attributes
            .insert("manual".to_string(), "true".to_string());
        assert!(def.is_manual());
    }

    #[test]
    fn group_definition_from_json() {
        let json = r#"{
            "name": "ui",
            "path": "data/groups/ui.json",
            "overridable": true,
            "dependencies": ["fonts"],
            "resources": [
                {
                    "type_name": "texture",
                    "attributes": { "name": "ui_atlas", "file": "ui/atlas.png" }
                }
            ]
        }"#;

        let def: GroupDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.name, "ui");
        assert!(def.overridable);
        assert_eq!(def.dependencies, vec!["fonts".to_string()]);
        assert_eq!(def.resources.len(), 1);
        assert_eq!(def.resources[0].name(), Some("ui_atlas"));
    }
}
