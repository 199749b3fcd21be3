use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};

const COMPONENT_SCHEMA_PREFIX: &str = "#/components/schemas/";

/// A JSON-schema node as far as command generation cares about it.
///
/// When `reference` is set the other fields are meaningless until the node
/// has gone through [`SchemaResolver::resolve`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchemaNode {
    #[serde(rename = "$ref")]
    pub reference: Option<String>,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub schema_type: SchemaType,
    pub description: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub properties: IndexMap<String, SchemaNode>,
    #[serde(deserialize_with = "null_as_default")]
    pub required: BTreeSet<String>,
    #[serde(rename = "enum", deserialize_with = "null_as_default")]
    pub enum_values: Vec<Value>,
}

/// Reads an explicit JSON `null` as the field's empty value. Any other
/// mismatch is still an error.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl SchemaNode {
    /// Enum literals rendered as text, in declaration order.
    pub fn enum_strings(&self) -> Vec<String> {
        self.enum_values
            .iter()
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }

    fn pending_reference(&self) -> Option<&str> {
        self.reference.as_deref().filter(|r| !r.is_empty())
    }
}

/// Scalar type of a schema node.
///
/// OpenAPI 3.1 allows `"type": ["string", "null"]`; the first non-null entry
/// wins, an all-null list keeps its first entry and an empty list normalizes
/// to the empty type. Any other shape fails deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "TypeDecl")]
pub struct SchemaType(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum TypeDecl {
    Single(String),
    Union(Vec<String>),
}

impl From<TypeDecl> for SchemaType {
    fn from(decl: TypeDecl) -> Self {
        match decl {
            TypeDecl::Single(name) => SchemaType(name),
            TypeDecl::Union(names) => {
                let chosen = names
                    .iter()
                    .find(|name| name.as_str() != "null")
                    .or_else(|| names.first())
                    .cloned()
                    .unwrap_or_default();
                SchemaType(chosen)
            }
        }
    }
}

impl SchemaType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Follows local `#/components/schemas/<name>` pointers.
pub struct SchemaResolver<'a> {
    schemas: &'a BTreeMap<String, SchemaNode>,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(schemas: &'a BTreeMap<String, SchemaNode>) -> Self {
        Self { schemas }
    }

    /// Returns the concrete node behind `node`, following reference chains.
    /// `None` when a pointer is foreign, dangling or part of a cycle.
    pub fn resolve(&self, node: &'a SchemaNode) -> Option<&'a SchemaNode> {
        let mut current = node;
        let mut visited: HashSet<&str> = HashSet::new();

        while let Some(reference) = current.pending_reference() {
            let Some(name) = component_name(reference) else {
                log::warn!("unsupported $ref {reference}");
                return None;
            };
            if !visited.insert(reference) {
                log::warn!("cyclic $ref {reference}");
                return None;
            }
            let Some(target) = self.schemas.get(&name) else {
                log::warn!("unresolvable $ref {reference}");
                return None;
            };
            current = target;
        }

        Some(current)
    }
}

fn component_name(reference: &str) -> Option<String> {
    let name = reference.strip_prefix(COMPONENT_SCHEMA_PREFIX)?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name.replace("~1", "/").replace("~0", "~"))
}
