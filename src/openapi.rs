use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::command_tree::{CommandDef, ParamDef, ParamLocation, ParamType};
use crate::error::CliError;
use crate::schema::{SchemaNode, SchemaResolver, null_as_default};

pub const API_PREFIX: &str = "/api/v1/";

/// Endpoints that never become commands: generic tool execution and
/// discovery, the OpenAPI document itself, and prompt endpoints.
pub const EXCLUDED_PATHS: &[&str] = &[
    "/api/v1/tools/{toolName}",
    "/api/v1/tools",
    "/api/v1/openapi",
    "/api/v1/prompts/{promptName}",
    "/api/v1/prompts",
];

/// Leading segments dropped from command names, e.g. `tools/query` → `query`.
pub const GROUPING_SEGMENTS: &[&str] = &["tools"];

const FALLBACK_NAME: &str = "unknown";
const NAME_SEPARATOR: &str = "-";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub prefix: String,
    pub excluded_paths: BTreeSet<String>,
    pub grouping_segments: BTreeSet<String>,
    pub fallback_name: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            prefix: API_PREFIX.to_string(),
            excluded_paths: EXCLUDED_PATHS.iter().map(|p| p.to_string()).collect(),
            grouping_segments: GROUPING_SEGMENTS.iter().map(|s| s.to_string()).collect(),
            fallback_name: FALLBACK_NAME.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiDocument {
    #[serde(deserialize_with = "null_as_default")]
    paths: BTreeMap<String, PathItem>,
    #[serde(deserialize_with = "null_as_default")]
    components: Components,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Components {
    #[serde(deserialize_with = "null_as_default")]
    schemas: BTreeMap<String, SchemaNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PathItem {
    get: Option<Operation>,
    post: Option<Operation>,
    put: Option<Operation>,
    patch: Option<Operation>,
    delete: Option<Operation>,
}

impl PathItem {
    fn operations(&self) -> [(&'static str, Option<&Operation>); 5] {
        [
            ("GET", self.get.as_ref()),
            ("POST", self.post.as_ref()),
            ("PUT", self.put.as_ref()),
            ("PATCH", self.patch.as_ref()),
            ("DELETE", self.delete.as_ref()),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Operation {
    #[serde(deserialize_with = "null_as_default")]
    summary: String,
    #[serde(deserialize_with = "null_as_default")]
    description: String,
    #[serde(deserialize_with = "null_as_default")]
    parameters: Vec<Parameter>,
    #[serde(rename = "requestBody")]
    request_body: Option<RequestBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Parameter {
    #[serde(deserialize_with = "null_as_default")]
    name: String,
    #[serde(rename = "in", deserialize_with = "null_as_default")]
    location: String,
    #[serde(deserialize_with = "null_as_default")]
    required: bool,
    #[serde(deserialize_with = "null_as_default")]
    description: String,
    schema: Option<SchemaNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RequestBody {
    #[serde(deserialize_with = "null_as_default")]
    content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MediaType {
    schema: Option<SchemaNode>,
}

/// Compiles an OpenAPI document into command definitions, ordered by path
/// and then GET, POST, PUT, PATCH, DELETE.
pub fn compile(spec: &[u8], options: &CompileOptions) -> Result<Vec<CommandDef>, CliError> {
    let document: ApiDocument = serde_json::from_slice(spec).map_err(CliError::SpecParse)?;
    let compiler = Compiler {
        resolver: SchemaResolver::new(&document.components.schemas),
        options,
    };

    let mut commands = Vec::new();
    for (path, item) in &document.paths {
        let Some(relative) = path.strip_prefix(options.prefix.as_str()) else {
            continue;
        };
        if options.excluded_paths.contains(path) {
            log::debug!("skipping excluded path {path}");
            continue;
        }
        for (method, operation) in item.operations() {
            if let Some(operation) = operation {
                commands.push(compiler.command(path, relative, method, operation));
            }
        }
    }

    log::debug!("compiled {} commands", commands.len());
    Ok(commands)
}

struct Compiler<'a> {
    resolver: SchemaResolver<'a>,
    options: &'a CompileOptions,
}

impl<'a> Compiler<'a> {
    fn command(&self, path: &str, relative: &str, method: &str, op: &'a Operation) -> CommandDef {
        let literals: Vec<&str> = relative
            .split('/')
            .filter(|s| !s.is_empty() && !s.contains('{'))
            .collect();
        let (parent, name) = self.derive_name(&literals);

        let mut params: Vec<ParamDef> = placeholders(relative)
            .into_iter()
            .map(|name| ParamDef {
                name,
                description: String::new(),
                param_type: ParamType::String,
                required: true,
                location: ParamLocation::Path,
                enum_values: Vec::new(),
            })
            .collect();

        for declared in &op.parameters {
            match declared.location.as_str() {
                "path" => self.enrich_path_param(&mut params, declared),
                "query" if !declared.name.is_empty() => {
                    let schema = declared.schema.as_ref().and_then(|s| self.resolver.resolve(s));
                    push_unique(
                        &mut params,
                        ParamDef {
                            name: declared.name.clone(),
                            description: declared.description.clone(),
                            param_type: schema_param_type(schema),
                            required: declared.required,
                            location: ParamLocation::Query,
                            enum_values: schema.map(SchemaNode::enum_strings).unwrap_or_default(),
                        },
                        method,
                        path,
                    );
                }
                _ => {}
            }
        }

        for body_param in self.body_params(method, path, op) {
            push_unique(&mut params, body_param, method, path);
        }

        CommandDef {
            name,
            parent,
            short: op.summary.clone(),
            long: op.description.clone(),
            method: method.to_string(),
            path: path.to_string(),
            params,
        }
    }

    fn derive_name(&self, literals: &[&str]) -> (String, String) {
        let literals = match literals {
            [first, rest @ ..]
                if !rest.is_empty() && self.options.grouping_segments.contains(*first) =>
            {
                rest
            }
            _ => literals,
        };

        match literals {
            [] => (String::new(), self.options.fallback_name.clone()),
            [only] => (String::new(), only.to_string()),
            [parent, rest @ ..] => (parent.to_string(), rest.join(NAME_SEPARATOR)),
        }
    }

    fn enrich_path_param(&self, params: &mut [ParamDef], declared: &'a Parameter) {
        let Some(param) = params
            .iter_mut()
            .find(|p| p.location == ParamLocation::Path && p.name == declared.name)
        else {
            return;
        };
        if !declared.description.is_empty() {
            param.description = declared.description.clone();
        }
        let schema = declared.schema.as_ref().and_then(|s| self.resolver.resolve(s));
        if let Some(param_type) = schema.and_then(|s| ParamType::from_schema(s.schema_type.as_str()))
        {
            param.param_type = param_type;
        }
    }

    fn body_params(&self, method: &str, path: &str, op: &'a Operation) -> Vec<ParamDef> {
        let Some(schema) = op
            .request_body
            .as_ref()
            .and_then(|body| body.content.get(JSON_CONTENT_TYPE))
            .and_then(|media| media.schema.as_ref())
        else {
            return Vec::new();
        };
        let Some(resolved) = self.resolver.resolve(schema) else {
            log::warn!("{method} {path}: request body schema unresolved, no body parameters");
            return Vec::new();
        };

        resolved
            .properties
            .iter()
            .map(|(name, property)| {
                let property = self.resolver.resolve(property);
                ParamDef {
                    name: name.clone(),
                    description: property
                        .and_then(|p| p.description.clone())
                        .unwrap_or_default(),
                    param_type: schema_param_type(property),
                    required: resolved.required.contains(name),
                    location: ParamLocation::Body,
                    enum_values: property.map(SchemaNode::enum_strings).unwrap_or_default(),
                }
            })
            .collect()
    }
}

fn schema_param_type(schema: Option<&SchemaNode>) -> ParamType {
    schema
        .and_then(|s| ParamType::from_schema(s.schema_type.as_str()))
        .unwrap_or_default()
}

fn push_unique(params: &mut Vec<ParamDef>, param: ParamDef, method: &str, path: &str) {
    if params.iter().any(|p| p.name == param.name) {
        log::warn!(
            "{method} {path}: parameter {} declared more than once, keeping the first",
            param.name
        );
        return;
    }
    params.push(param);
}

/// Distinct `{name}` placeholders of a path template, left to right.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    names
}

/// `info.version` of the document, or `unknown`.
pub fn spec_version(spec: &[u8]) -> String {
    #[derive(Deserialize)]
    struct Probe {
        info: Option<Info>,
    }
    #[derive(Deserialize)]
    struct Info {
        version: Option<String>,
    }

    serde_json::from_slice::<Probe>(spec)
        .ok()
        .and_then(|probe| probe.info)
        .and_then(|info| info.version)
        .filter(|version| !version.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
