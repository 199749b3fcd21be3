use serde::{Deserialize, Serialize};

use crate::params::{self, ParamInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Body,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    /// Maps a normalized schema type; `None` for empty or unknown names.
    pub fn from_schema(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ParamType::String),
            "integer" => Some(ParamType::Integer),
            "number" => Some(ParamType::Number),
            "boolean" => Some(ParamType::Boolean),
            "object" => Some(ParamType::Object),
            "array" => Some(ParamType::Array),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    #[serde(rename = "in")]
    pub location: ParamLocation,
    #[serde(rename = "enum")]
    pub enum_values: Vec<String>,
}

/// One command per compiled (path, method) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDef {
    pub name: String,
    /// Empty for top-level commands.
    pub parent: String,
    pub short: String,
    pub long: String,
    pub method: String,
    pub path: String,
    pub params: Vec<ParamDef>,
}

/// What a node needs at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub method: String,
    pub path: String,
    pub params: Vec<ParamInfo>,
}

impl Endpoint {
    pub fn positional(&self) -> impl Iterator<Item = &ParamInfo> {
        self.params.iter().filter(|p| p.positional)
    }

    pub fn flags(&self) -> impl Iterator<Item = &ParamInfo> {
        self.params.iter().filter(|p| !p.positional)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandNode {
    pub name: String,
    pub about: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub long_about: String,
    /// `None` for pure grouping nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CommandNode>,
}

impl CommandNode {
    fn from_def(def: &CommandDef, name: String) -> Self {
        Self {
            name,
            about: def.short.clone(),
            long_about: def.long.clone(),
            endpoint: Some(Endpoint {
                method: def.method.clone(),
                path: def.path.clone(),
                params: params::param_infos(&def.params),
            }),
            children: Vec::new(),
        }
    }

    fn grouping(name: &str) -> Self {
        Self {
            name: name.to_string(),
            about: format!("{} commands", capitalize(name)),
            long_about: String::new(),
            endpoint: None,
            children: Vec::new(),
        }
    }

    pub fn is_grouping(&self) -> bool {
        self.endpoint.is_none()
    }

    pub fn child(&self, name: &str) -> Option<&CommandNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Two-level command hierarchy, built once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandTree {
    pub commands: Vec<CommandNode>,
}

impl CommandTree {
    /// Top-level commands are registered before children. Name collisions at
    /// one level rename the later command to `<name>-<method>`; a parent
    /// with no matching command is created as a grouping node.
    pub fn build(defs: &[CommandDef]) -> Self {
        let (top_level, nested): (Vec<&CommandDef>, Vec<&CommandDef>) =
            defs.iter().partition(|d| d.parent.is_empty());

        let mut commands: Vec<CommandNode> = Vec::new();
        for def in top_level {
            let name = unique_name(&commands, &def.name, &def.method);
            commands.push(CommandNode::from_def(def, name));
        }

        for def in nested {
            let index = match commands.iter().position(|c| c.name == def.parent) {
                Some(index) => index,
                None => {
                    commands.push(CommandNode::grouping(&def.parent));
                    commands.len() - 1
                }
            };
            let parent = &mut commands[index];
            let name = unique_name(&parent.children, &def.name, &def.method);
            parent.children.push(CommandNode::from_def(def, name));
        }

        Self { commands }
    }

    pub fn find(&self, name: &str) -> Option<&CommandNode> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn unique_name(siblings: &[CommandNode], base: &str, method: &str) -> String {
    let taken = |name: &str| siblings.iter().any(|s| s.name == name);
    if !taken(base) {
        return base.to_string();
    }

    let suffixed = format!("{base}-{}", method.to_ascii_lowercase());
    let mut candidate = suffixed.clone();
    let mut counter = 2;
    while taken(&candidate) {
        candidate = format!("{suffixed}-{counter}");
        counter += 1;
    }
    log::debug!("command name {base} already registered, using {candidate}");
    candidate
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
