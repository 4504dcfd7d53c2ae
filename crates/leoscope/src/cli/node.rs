//! `leoscope node` — register/update/delete nodes, list them, and flip the
//! per-node scavenger flag that tells a node agent it's allowed to reclaim
//! overhead containers without waiting for a graceful finish.

use clap::{Args, Subcommand};
use reqwest::Method;

use leoscope_core::model::Coords;
use leoscope_core::wire::{
    GetNodesFilter, GetNodesResponse, RegisterNodeRequest, RegisterNodeResponse, ScavengerState,
};

use super::{call, print_json, CliError, Connection};

#[derive(Debug, Subcommand)]
pub enum NodeCommand {
    Register(RegisterArgs),
    Update(UpdateArgs),
    Delete(IdArgs),
    Get(GetArgs),
    ScavengerSet(ScavengerSetArgs),
    ScavengerGet(IdArgs),
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    #[arg(long)]
    pub node_id: String,
    #[arg(long)]
    pub display_name: String,
    #[arg(long)]
    pub lat: f64,
    #[arg(long)]
    pub lon: f64,
    #[arg(long)]
    pub location: String,
    #[arg(long)]
    pub provider: String,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[arg(long)]
    pub node_id: String,
    #[arg(long)]
    pub display_name: Option<String>,
    #[arg(long)]
    pub lat: Option<f64>,
    #[arg(long)]
    pub lon: Option<f64>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub provider: Option<String>,
    #[arg(long)]
    pub public_ip: Option<String>,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    #[arg(long)]
    pub node_id: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub active: Option<bool>,
    #[arg(long)]
    pub active_thres_s: Option<i64>,
}

#[derive(Debug, Args)]
pub struct ScavengerSetArgs {
    #[arg(long)]
    pub node_id: String,
    #[arg(long)]
    pub active: bool,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    #[arg(long)]
    pub node_id: String,
}

#[derive(Debug, serde::Serialize)]
struct UpdateNodeBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    coords: Option<Coords>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_ip: Option<Option<String>>,
}

pub async fn run(conn: &Connection, cmd: NodeCommand) -> Result<(), CliError> {
    match cmd {
        NodeCommand::Register(args) => {
            let body = RegisterNodeRequest {
                node_id: args.node_id,
                display_name: args.display_name,
                coords: Coords {
                    lat: args.lat,
                    lon: args.lon,
                },
                location: args.location,
                provider: args.provider,
            };
            let resp: RegisterNodeResponse =
                call(conn, Method::POST, "api/nodes", None::<&()>, Some(&body)).await?;
            print_json(&resp);
        }
        NodeCommand::Update(args) => {
            let body = UpdateNodeBody {
                display_name: args.display_name,
                coords: match (args.lat, args.lon) {
                    (Some(lat), Some(lon)) => Some(Coords { lat, lon }),
                    (None, None) => None,
                    _ => {
                        return Err(CliError::BadInput(
                            "--lat and --lon must be given together".into(),
                        ))
                    }
                },
                location: args.location,
                provider: args.provider,
                public_ip: args.public_ip.map(Some),
            };
            let path = format!("api/nodes/{}", args.node_id);
            let _: serde_json::Value =
                call(conn, Method::PUT, &path, None::<&()>, Some(&body)).await?;
        }
        NodeCommand::Delete(args) => {
            let path = format!("api/nodes/{}", args.node_id);
            let _: serde_json::Value =
                call(conn, Method::DELETE, &path, None::<&()>, None::<&()>).await?;
        }
        NodeCommand::Get(args) => {
            let filter = GetNodesFilter {
                node_id: args.node_id,
                location: args.location,
                active: args.active,
                active_thres_s: args.active_thres_s,
            };
            let resp: GetNodesResponse =
                call(conn, Method::GET, "api/nodes", Some(&filter), None::<&()>).await?;
            print_json(&resp.nodes);
        }
        NodeCommand::ScavengerSet(args) => {
            let path = format!("api/nodes/{}/scavenger", args.node_id);
            let body = leoscope_core::wire::ScavengerRequest {
                node_id: args.node_id.clone(),
                active: args.active,
            };
            let _: serde_json::Value =
                call(conn, Method::POST, &path, None::<&()>, Some(&body)).await?;
        }
        NodeCommand::ScavengerGet(args) => {
            let path = format!("api/nodes/{}/scavenger", args.node_id);
            let resp: ScavengerState =
                call(conn, Method::GET, &path, None::<&()>, None::<&()>).await?;
            print_json(&resp);
        }
    }
    Ok(())
}
