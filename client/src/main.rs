use clap::{Parser, ValueEnum};
use client::network::Client;
use log::info;
use shared::Role;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Presenter,
    Respondent,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Presenter => Role::Presenter,
            RoleArg::Respondent => Role::Respondent,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Join as presenter or respondent
    #[arg(short = 'r', long, value_enum, default_value = "respondent")]
    role: RoleArg,

    /// Display name; required for respondents
    #[arg(short = 'n', long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let role = Role::from(args.role);
    let name = match (args.name, role) {
        (Some(name), _) => name,
        (None, Role::Presenter) => "Presenter".to_string(),
        (None, Role::Respondent) => return Err("respondents must pass --name".into()),
    };

    info!("Connecting to {} as {} '{}'", args.server, role, name);
    match role {
        Role::Presenter => {
            println!("Commands: /poll <secs> <question> | <opt> | *<correct> ..., /end, /kick <id>");
        }
        Role::Respondent => println!("Commands: /answer <n> (or just <n>)"),
    }
    println!("Also: /who, /history, /quit; anything else is sent as chat");

    let mut client = Client::new(&args.server, role, &name).await?;
    client.run().await?;

    Ok(())
}
