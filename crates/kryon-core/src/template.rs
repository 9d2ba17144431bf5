// crates/kryon-core/src/template.rs
use crate::{ResourceEntry, ResourcePayload, ResourceType};
use tracing::warn;

/// One component definition: a name and the raw element substream that gets
/// re-decoded on every expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDef {
    pub name: String,
    pub template: Vec<u8>,
}

/// Holds the component definitions of a document. Templates stay as raw
/// bytes; the tree builder re-invokes the decoder on them lazily, reusing
/// the file-wide string/style/resource tables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TemplateStore {
    definitions: Vec<ComponentDef>,
}

impl TemplateStore {
    pub fn from_resources(resources: &[ResourceEntry], strings: &[String]) -> Self {
        let mut definitions = Vec::new();
        for entry in resources {
            if entry.resource_type != ResourceType::Component {
                continue;
            }
            let Some(name) = strings.get(entry.name_index as usize).filter(|n| !n.is_empty())
            else {
                warn!(
                    name_index = entry.name_index,
                    "component definition has no usable name; skipping"
                );
                continue;
            };
            match &entry.payload {
                ResourcePayload::Inline { data } => definitions.push(ComponentDef {
                    name: name.clone(),
                    template: data.clone(),
                }),
                ResourcePayload::External { .. } => {
                    warn!(%name, "component templates must be inline; skipping");
                }
            }
        }
        Self { definitions }
    }

    pub fn find_definition(&self, name: &str) -> Option<&[u8]> {
        self.definitions
            .iter()
            .find(|def| def.name == name)
            .map(|def| def.template.as_slice())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentDef> {
        self.definitions.iter()
    }
}
