//! `leoscope config` — read or replace the coordinator's global config
//! document (admission defaults, node active threshold, etc). `set` takes
//! either a literal JSON string or `@path` to read the document from disk.

use clap::{Args, Subcommand};
use reqwest::Method;

use leoscope_core::wire::ConfigDoc;

use super::{call, print_json, CliError, Connection};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    Get,
    Set(SetArgs),
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// A JSON object, or `@path` to read it from a file.
    #[arg(long)]
    pub doc: String,
}

pub async fn run(conn: &Connection, cmd: ConfigCommand) -> Result<(), CliError> {
    match cmd {
        ConfigCommand::Get => {
            let resp: ConfigDoc =
                call(conn, Method::GET, "api/config", None::<&()>, None::<&()>).await?;
            print_json(&resp.doc);
        }
        ConfigCommand::Set(args) => {
            let raw = match args.doc.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .map_err(|e| CliError::BadInput(format!("failed to read {path}: {e}")))?,
                None => args.doc,
            };
            let doc: serde_json::Value = serde_json::from_str(&raw)
                .map_err(|e| CliError::BadInput(format!("invalid JSON config doc: {e}")))?;
            let body = ConfigDoc { doc };
            let resp: ConfigDoc =
                call(conn, Method::POST, "api/config", None::<&()>, Some(&body)).await?;
            print_json(&resp.doc);
        }
    }
    Ok(())
}
