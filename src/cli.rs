use clap::builder::{PossibleValue, PossibleValuesParser, StringValueParser, TypedValueParser};
use clap::{Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use std::collections::HashSet;
use std::ffi::OsStr;

use crate::client::ApiClient;
use crate::command_tree::{CommandNode, CommandTree, Endpoint, ParamType};
use crate::error::CliError;
use crate::params::{ParamInfo, RequestParam};

pub const BIN_NAME: &str = "dot-ai";
pub const TREE_COMMAND: &str = "tree";
pub const COMPLETION_COMMAND: &str = "completion";

const SHELLS: [&str; 3] = ["bash", "zsh", "fish"];

/// Long names owned by global flags; parameters with these names get a
/// `-param` suffix on the command line.
const RESERVED_FLAGS: &[&str] = &[
    "server-url",
    "token",
    "output",
    "timeout",
    "debug",
    "help",
    "version",
];

pub fn build_cli(tree: &CommandTree, api_version: &str) -> Command {
    let mut cmd = Command::new(BIN_NAME)
        .about("DevOps AI Toolkit CLI (generated from the server's OpenAPI document)")
        .version(format!("{} (API {})", env!("CARGO_PKG_VERSION"), api_version))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("server_url")
                .long("server-url")
                .global(true)
                .value_name("URL")
                .help("Server URL (env: DOT_AI_URL, default: http://localhost:3456)"),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .global(true)
                .value_name("TOKEN")
                .help("Bearer token (env: DOT_AI_AUTH_TOKEN)"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .global(true)
                .value_name("FORMAT")
                .value_parser(PossibleValuesParser::new(["json", "yaml"]))
                .help("Output format (env: DOT_AI_OUTPUT_FORMAT, default: yaml)"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .global(true)
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64))
                .help("Request timeout in seconds, 0 disables (env: DOT_AI_TIMEOUT, default: 300)"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        );

    for node in &tree.commands {
        cmd = cmd.subcommand(node_command(node));
    }

    if tree.find(TREE_COMMAND).is_none() {
        cmd = cmd.subcommand(
            Command::new(TREE_COMMAND).about("Show the command tree compiled from the API document"),
        );
    }

    if tree.find(COMPLETION_COMMAND).is_none() {
        cmd = cmd.subcommand(
            Command::new(COMPLETION_COMMAND)
                .about("Generate a shell completion script")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(PossibleValuesParser::new(SHELLS)),
                ),
        );
    }

    cmd
}

/// The shell requested through the `completion` built-in.
pub fn completion_shell(matches: &ArgMatches) -> Option<Shell> {
    let shell = matches
        .subcommand_matches(COMPLETION_COMMAND)?
        .get_one::<String>("shell")?;
    match shell.as_str() {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        _ => None,
    }
}

pub fn completion_script(mut cmd: Command, shell: Shell) -> Vec<u8> {
    let mut script = Vec::new();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut script);
    script
}

fn node_command(node: &CommandNode) -> Command {
    let mut cmd = Command::new(node.name.clone()).about(node.about.clone());
    if !node.long_about.is_empty() {
        cmd = cmd.long_about(node.long_about.clone());
    }

    if let Some(endpoint) = &node.endpoint {
        for (index, param) in endpoint.positional().enumerate() {
            cmd = cmd.arg(
                Arg::new(param_key(&param.name))
                    .value_name(param.name.clone())
                    .index(index + 1)
                    .required(true)
                    .help(param.description.clone()),
            );
        }
        let mut taken: HashSet<String> = endpoint
            .flags()
            .map(|p| p.name.clone())
            .filter(|name| !RESERVED_FLAGS.contains(&name.as_str()))
            .collect();
        for param in endpoint.flags() {
            let long = flag_name(&param.name, &mut taken);
            cmd = cmd.arg(flag_arg(param, long));
        }
    }

    for child in &node.children {
        cmd = cmd.subcommand(node_command(child));
    }

    if node.is_grouping() {
        cmd = cmd.subcommand_required(true).arg_required_else_help(true);
    } else if !node.children.is_empty() {
        // `resources kinds` must not demand the parent's required flags.
        cmd = cmd.subcommand_negates_reqs(true);
    }
    cmd
}

fn flag_arg(param: &ParamInfo, long: String) -> Arg {
    let arg = Arg::new(param_key(&param.name))
        .long(long)
        .help(flag_help(param));

    match param.param_type {
        ParamType::Boolean => arg.action(ArgAction::SetTrue),
        ParamType::Integer => arg
            .value_name("INTEGER")
            .allow_negative_numbers(true)
            .value_parser(clap::value_parser!(i64))
            .required(param.required),
        ParamType::Number => arg
            .value_name("NUMBER")
            .allow_negative_numbers(true)
            .value_parser(clap::value_parser!(f64))
            .required(param.required),
        ParamType::Object | ParamType::Array => arg.value_name("JSON").required(param.required),
        ParamType::String if !param.enum_values.is_empty() => arg
            .value_name("STRING")
            .value_parser(EnumHint::new(&param.enum_values))
            .hide_possible_values(true)
            .required(param.required),
        ParamType::String => arg.value_name("STRING").required(param.required),
    }
}

/// Accepts any text but advertises the enum literals, so completion scripts
/// can offer them while membership is still checked by `ParamInfo::validate`.
#[derive(Clone)]
struct EnumHint(PossibleValuesParser);

impl EnumHint {
    fn new(values: &[String]) -> Self {
        Self(PossibleValuesParser::new(
            values.iter().map(|v| PossibleValue::new(v.clone())),
        ))
    }
}

impl TypedValueParser for EnumHint {
    type Value = String;

    fn parse_ref(
        &self,
        cmd: &Command,
        arg: Option<&Arg>,
        value: &OsStr,
    ) -> Result<Self::Value, clap::Error> {
        StringValueParser::new().parse_ref(cmd, arg, value)
    }

    fn possible_values(&self) -> Option<Box<dyn Iterator<Item = PossibleValue> + '_>> {
        self.0.possible_values()
    }
}

/// Long flag name for a parameter. Names owned by global flags get a
/// `-param` suffix, numbered when another parameter already uses it.
fn flag_name(name: &str, taken: &mut HashSet<String>) -> String {
    if !RESERVED_FLAGS.contains(&name) {
        return name.to_string();
    }
    let base = format!("{name}-param");
    let mut candidate = base.clone();
    let mut counter = 2;
    while taken.contains(&candidate) {
        candidate = format!("{base}-{counter}");
        counter += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

fn flag_help(param: &ParamInfo) -> String {
    let mut help = param.description.clone();
    if !param.enum_values.is_empty() {
        help = format!("{help} (one of: {})", param.enum_values.join(", "));
    }
    // Switches cannot be enforced as required.
    if param.required && param.param_type != ParamType::Boolean {
        help.push_str(" (required)");
    }
    help.trim_start().to_string()
}

fn param_key(name: &str) -> String {
    format!("param__{name}")
}

/// Walks the matched subcommand chain down to the invoked node.
pub fn find_invocation<'t, 'm>(
    tree: &'t CommandTree,
    matches: &'m ArgMatches,
) -> Option<(&'t CommandNode, &'m ArgMatches)> {
    let (name, mut current) = matches.subcommand()?;
    let mut node = tree.find(name)?;
    while let Some((name, sub)) = current.subcommand() {
        node = node.child(name)?;
        current = sub;
    }
    Some((node, current))
}

/// Reads every supplied value for an endpoint and checks enum membership
/// before anything is sent.
pub fn collect_params(
    endpoint: &Endpoint,
    matches: &ArgMatches,
) -> Result<Vec<RequestParam>, CliError> {
    let mut params = Vec::new();
    for info in &endpoint.params {
        let key = param_key(&info.name);
        let raw = if info.positional {
            matches.get_one::<String>(&key).cloned()
        } else {
            match info.param_type {
                ParamType::Boolean => matches.get_flag(&key).then(|| "true".to_string()),
                ParamType::Integer => matches.get_one::<i64>(&key).map(|v| v.to_string()),
                ParamType::Number => matches.get_one::<f64>(&key).map(|v| v.to_string()),
                ParamType::String | ParamType::Object | ParamType::Array => {
                    matches.get_one::<String>(&key).cloned()
                }
            }
        };
        let Some(raw) = raw else {
            continue;
        };
        info.validate(&raw)?;
        params.push(RequestParam::new(info.name.clone(), info.location, raw));
    }
    Ok(params)
}

pub fn invoke(
    endpoint: &Endpoint,
    matches: &ArgMatches,
    client: &ApiClient,
) -> Result<Vec<u8>, CliError> {
    let params = collect_params(endpoint, matches)?;
    client.execute(&endpoint.method, &endpoint.path, &params)
}
