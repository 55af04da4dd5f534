use clap::{Parser, Subcommand};
use serde_json::Value;
use uuid::Uuid;

use edge_gateway::security::auth::{mint_token, Claims};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the edge gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the gateway health endpoint
    Health {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
    },
    /// Sign a bearer token the gateway will accept
    MintToken {
        #[arg(long, env = "JWT_SECRET")]
        secret: String,
        /// Subject id; a random one is generated when omitted
        #[arg(long)]
        user_id: Option<Uuid>,
        #[arg(long)]
        email: String,
        /// Repeat for several roles
        #[arg(long = "role")]
        roles: Vec<String>,
        #[arg(long, default_value_t = 3600)]
        ttl_secs: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Health { url } => {
            let res = reqwest::Client::new()
                .get(format!("{}/health", url.trim_end_matches('/')))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::MintToken {
            secret,
            user_id,
            email,
            roles,
            ttl_secs,
        } => {
            let claims = Claims::new(user_id.unwrap_or_else(Uuid::new_v4), email, roles, ttl_secs);
            println!("{}", mint_token(&secret, &claims)?);
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
