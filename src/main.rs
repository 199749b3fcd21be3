mod cli;
mod client;
mod command_tree;
mod config;
mod error;
mod openapi;
mod output;
mod params;
mod schema;
mod sources;

use anyhow::{Result, anyhow};
use std::env;

use crate::client::ApiClient;
use crate::command_tree::CommandTree;
use crate::config::Config;
use crate::error::{CliError, EXIT_SUCCESS, EXIT_TOOL_ERROR, EXIT_USAGE_ERROR};
use crate::openapi::CompileOptions;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        let code = err
            .downcast_ref::<CliError>()
            .map(CliError::exit_code)
            .unwrap_or(EXIT_TOOL_ERROR);
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    // The command surface is compiled before clap runs, so --debug is
    // picked up from raw argv.
    setup_logging(env::args().any(|arg| arg == "--debug"))?;

    let spec = load_spec_bytes();
    let tree = compile_tree(&spec);
    if tree.is_empty() {
        log::debug!("no API commands registered");
    }
    let api_version = openapi::spec_version(&spec);
    let cli = cli::build_cli(&tree, &api_version);

    let matches = match cli.try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            let code = if err.use_stderr() {
                EXIT_USAGE_ERROR
            } else {
                EXIT_SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let found = cli::find_invocation(&tree, &matches);
    if found.is_none() {
        if let Some(shell) = cli::completion_shell(&matches) {
            let script = cli::completion_script(cli::build_cli(&tree, &api_version), shell);
            return print_output(String::from_utf8_lossy(&script).trim_end());
        }
    }

    let config = Config::load(&matches)?;

    let Some((node, sub_matches)) = found else {
        if matches.subcommand_name() == Some(cli::TREE_COMMAND) {
            let value = serde_json::to_value(&tree)?;
            return print_output(&output::format_value(&value, config.output)?);
        }
        return Err(anyhow!("unknown command"));
    };
    let endpoint = node
        .endpoint
        .as_ref()
        .ok_or_else(|| CliError::Usage(format!("{} requires a subcommand", node.name)))?;

    let client = ApiClient::new(&config)?;
    let body = cli::invoke(endpoint, sub_matches, &client)?;
    print_output(&output::format_response(&body, config.output))
}

fn load_spec_bytes() -> Vec<u8> {
    let source = env::var(sources::SPEC_ENV).ok();
    match sources::load_spec(source.as_deref()) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("could not load API document: {err:#}");
            Vec::new()
        }
    }
}

fn compile_tree(spec: &[u8]) -> CommandTree {
    if spec.is_empty() {
        return CommandTree::default();
    }
    match openapi::compile(spec, &CompileOptions::default()) {
        Ok(defs) => CommandTree::build(&defs),
        Err(err) => {
            log::warn!("{err}; no API commands available");
            CommandTree::default()
        }
    }
}

fn print_output(text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    output::write_stdout_line(text)
}

fn setup_logging(debug: bool) -> Result<()> {
    if debug {
        env_logger::Builder::from_env("RUST_LOG")
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_env("RUST_LOG")
            .filter_level(log::LevelFilter::Warn)
            .init();
    }
    Ok(())
}
