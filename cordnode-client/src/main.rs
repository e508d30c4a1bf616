use clap::Parser;
use cordnode_client::{Cli, run};

#[tokio::main]
async fn main() -> Result<(), cordnode_client::AppError> {
    run(Cli::parse()).await
}
