//! AuthAPI Mailer Entry Point

use clap::Parser;
use core_config::tracing::install_color_eyre;
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre first for colored error output
    install_color_eyre();

    authapi_mailer::run(authapi_mailer::Cli::parse()).await
}
