use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command_tree::{ParamDef, ParamLocation, ParamType};
use crate::error::CliError;

/// Per-parameter metadata stored on a built command so execution does not
/// need to re-run classification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    #[serde(rename = "in")]
    pub location: ParamLocation,
    pub positional: bool,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl ParamInfo {
    fn new(param: &ParamDef, positional: bool) -> Self {
        Self {
            name: param.name.clone(),
            description: param.description.clone(),
            param_type: param.param_type,
            required: param.required,
            location: param.location,
            positional,
            enum_values: param.enum_values.clone(),
        }
    }

    /// Rejects a value outside the declared enum set.
    pub fn validate(&self, value: &str) -> Result<(), CliError> {
        if self.enum_values.is_empty() || self.enum_values.iter().any(|v| v == value) {
            return Ok(());
        }
        Err(CliError::Validation {
            flag: self.name.clone(),
            value: value.to_string(),
            allowed: self.enum_values.clone(),
        })
    }
}

/// Splits parameters into positional arguments and flags.
///
/// Path parameters are positional in template order. A single required,
/// string-typed, enum-free body parameter is promoted after them; with zero
/// or several such candidates nothing is promoted. Everything else is a flag.
pub fn classify(params: &[ParamDef]) -> (Vec<&ParamDef>, Vec<&ParamDef>) {
    let mut positional: Vec<&ParamDef> = params
        .iter()
        .filter(|p| p.location == ParamLocation::Path)
        .collect();

    let candidates: Vec<&ParamDef> = params
        .iter()
        .filter(|p| p.location == ParamLocation::Body && is_promotable(p))
        .collect();
    let promoted = match candidates.as_slice() {
        [only] => Some(*only),
        _ => None,
    };
    positional.extend(promoted);

    let flags = params
        .iter()
        .filter(|p| match p.location {
            ParamLocation::Path => false,
            ParamLocation::Query => true,
            ParamLocation::Body => !promoted.is_some_and(|q| std::ptr::eq(q, *p)),
        })
        .collect();

    (positional, flags)
}

fn is_promotable(param: &ParamDef) -> bool {
    param.required && param.param_type == ParamType::String && param.enum_values.is_empty()
}

/// Metadata for every parameter: positional ones first in argument order,
/// then flags in declaration order.
pub fn param_infos(params: &[ParamDef]) -> Vec<ParamInfo> {
    let (positional, flags) = classify(params);
    positional
        .into_iter()
        .map(|p| ParamInfo::new(p, true))
        .chain(flags.into_iter().map(|p| ParamInfo::new(p, false)))
        .collect()
}

/// A user-supplied value, interpreted once: text that parses as JSON keeps
/// its parsed form alongside the text as supplied.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Json { raw: String, value: Value },
}

impl ParamValue {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => ParamValue::Json { raw, value },
            Err(_) => ParamValue::Text(raw),
        }
    }

    /// The text exactly as supplied.
    pub fn raw(&self) -> &str {
        match self {
            ParamValue::Text(raw) | ParamValue::Json { raw, .. } => raw,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw().is_empty()
    }

    /// The value to embed in a JSON request body.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Text(raw) => Value::String(raw.clone()),
            ParamValue::Json { value, .. } => value.clone(),
        }
    }
}

/// A resolved parameter ready for the request builder.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParam {
    pub name: String,
    pub location: ParamLocation,
    pub value: ParamValue,
}

impl RequestParam {
    pub fn new(name: impl Into<String>, location: ParamLocation, raw: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location,
            value: ParamValue::parse(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param(name: &str, param_type: ParamType, required: bool, location: ParamLocation) -> ParamDef {
        ParamDef {
            name: name.to_string(),
            description: String::new(),
            param_type,
            required,
            location,
            enum_values: Vec::new(),
        }
    }

    fn names(params: &[&ParamDef]) -> Vec<String> {
        params.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn path_params_are_always_positional() {
        let params = vec![
            param("id", ParamType::String, true, ParamLocation::Path),
            param("filter", ParamType::String, false, ParamLocation::Query),
        ];
        let (positional, flags) = classify(&params);
        assert_eq!(names(&positional), vec!["id"]);
        assert_eq!(names(&flags), vec!["filter"]);
    }

    #[test]
    fn single_required_string_body_is_promoted() {
        let params = vec![
            param("intent", ParamType::String, true, ParamLocation::Body),
            param("limit", ParamType::Number, false, ParamLocation::Body),
        ];
        let (positional, flags) = classify(&params);
        assert_eq!(names(&positional), vec!["intent"]);
        assert_eq!(names(&flags), vec!["limit"]);
    }

    #[test]
    fn several_required_strings_are_not_promoted() {
        let params = vec![
            param("a", ParamType::String, true, ParamLocation::Body),
            param("b", ParamType::String, true, ParamLocation::Body),
        ];
        let (positional, flags) = classify(&params);
        assert!(positional.is_empty());
        assert_eq!(names(&flags), vec!["a", "b"]);
    }

    #[test]
    fn enum_body_is_not_promoted() {
        let mut mode = param("mode", ParamType::String, true, ParamLocation::Body);
        mode.enum_values = vec!["a".into(), "b".into()];
        let params = vec![mode];
        let (positional, flags) = classify(&params);
        assert!(positional.is_empty());
        assert_eq!(flags.len(), 1);
    }

    #[test]
    fn non_string_body_is_not_promoted() {
        let params = vec![param("count", ParamType::Integer, true, ParamLocation::Body)];
        let (positional, flags) = classify(&params);
        assert!(positional.is_empty());
        assert_eq!(flags.len(), 1);
    }

    #[test]
    fn required_string_query_is_never_promoted() {
        let params = vec![param("kind", ParamType::String, true, ParamLocation::Query)];
        let (positional, flags) = classify(&params);
        assert!(positional.is_empty());
        assert_eq!(names(&flags), vec!["kind"]);
    }

    #[test]
    fn promoted_body_follows_path_params() {
        let params = vec![
            param("intent", ParamType::String, true, ParamLocation::Body),
            param("sessionId", ParamType::String, true, ParamLocation::Path),
            param("mode", ParamType::String, false, ParamLocation::Body),
        ];
        let (positional, flags) = classify(&params);
        assert_eq!(names(&positional), vec!["sessionId", "intent"]);
        assert_eq!(names(&flags), vec!["mode"]);
    }

    #[test]
    fn param_infos_put_positional_first() {
        let params = vec![
            param("intent", ParamType::String, true, ParamLocation::Body),
            param("sessionId", ParamType::String, true, ParamLocation::Path),
            param("limit", ParamType::Integer, false, ParamLocation::Query),
        ];
        let infos = param_infos(&params);
        let summary: Vec<(&str, bool)> = infos
            .iter()
            .map(|i| (i.name.as_str(), i.positional))
            .collect();
        assert_eq!(
            summary,
            vec![("sessionId", true), ("intent", true), ("limit", false)]
        );
    }

    #[test]
    fn validate_checks_enum_membership() {
        let mut status = param("status", ParamType::String, false, ParamLocation::Query);
        status.enum_values = vec!["active".into(), "inactive".into()];
        let infos = param_infos(&[status]);
        let info = &infos[0];

        assert!(info.validate("active").is_ok());
        let err = info.validate("bad").unwrap_err();
        assert!(err.to_string().contains("must be one of"));
        assert_eq!(err.exit_code(), crate::error::EXIT_USAGE_ERROR);
    }

    #[test]
    fn param_value_keeps_raw_and_parsed_forms() {
        let value = ParamValue::parse(r#"{"a": 1}"#);
        assert_eq!(value.raw(), r#"{"a": 1}"#);
        assert_eq!(value.to_json(), json!({"a": 1}));

        let value = ParamValue::parse("hello world");
        assert_eq!(value, ParamValue::Text("hello world".into()));
        assert_eq!(value.to_json(), json!("hello world"));

        let value = ParamValue::parse("42");
        assert_eq!(value.to_json(), json!(42));
        assert_eq!(value.raw(), "42");
    }
}
