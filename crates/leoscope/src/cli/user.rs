//! `leoscope user` — register/modify/delete accounts. Registration is the
//! one call in this whole CLI whose response matters beyond a status code:
//! it's the only place the bearer token is ever shown.

use clap::{Args, Subcommand};
use reqwest::Method;

use leoscope_core::model::Role;
use leoscope_core::wire::{ModifyUserRequest, RegisterUserRequest, RegisterUserResponse};

use super::{call, print_json, CliError, Connection};

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Create a user and print the one-time access token.
    Register(RegisterArgs),
    /// Patch name/role/team on an existing user.
    Modify(ModifyArgs),
    /// Delete a user by id.
    Delete(IdArgs),
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub role: Role,
    #[arg(long)]
    pub team: Option<String>,
}

#[derive(Debug, Args)]
pub struct ModifyArgs {
    #[arg(long)]
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub role: Option<Role>,
    #[arg(long)]
    pub team: Option<String>,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    #[arg(long)]
    pub id: String,
}

pub async fn run(conn: &Connection, cmd: UserCommand) -> Result<(), CliError> {
    match cmd {
        UserCommand::Register(args) => {
            let body = RegisterUserRequest {
                name: args.name,
                role: args.role,
                team: args.team,
            };
            let resp: RegisterUserResponse =
                call(conn, Method::POST, "api/users", None::<&()>, Some(&body)).await?;
            print_json(&resp);
        }
        UserCommand::Modify(args) => {
            let body = ModifyUserRequest {
                name: args.name,
                role: args.role,
                team: args.team,
            };
            let path = format!("api/users/{}", args.id);
            let _: serde_json::Value =
                call(conn, Method::PUT, &path, None::<&()>, Some(&body)).await?;
        }
        UserCommand::Delete(args) => {
            let path = format!("api/users/{}", args.id);
            let _: serde_json::Value =
                call(conn, Method::DELETE, &path, None::<&()>, None::<&()>).await?;
        }
    }
    Ok(())
}
