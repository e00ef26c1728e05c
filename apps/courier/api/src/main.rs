//! Courier API entry point

use core_config::tracing::install_color_eyre;
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();
    courier_api::run().await
}
