use std::path::PathBuf;

use clap::Parser;
use imprint::network::StatusCode;
use imprint::service::{level_from_verbosity, setup_local_tracing};
use imprint::{AppError, AppResult, Client};
use tokio::runtime;
use tracing::{info, warn};

/// Sends one image with a caption and stores the watermarked result.
#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// server address
    #[arg(short, long, default_value = "127.0.0.1:9400")]
    pub addr: String,
    /// caption stamped into the image
    #[arg(long, default_value = "")]
    pub caption: String,
    /// image file to send
    #[arg(short, long)]
    pub input: PathBuf,
    /// where to write the returned image, defaults to `<input>.imprint`
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn main() -> AppResult<()> {
    let commandline = CommandLine::parse();
    if commandline.verbose > 0 {
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", level_from_verbosity(commandline.verbose));
        }
        setup_local_tracing()?;
    }

    let image = std::fs::read(&commandline.input)?;
    let output = commandline.output.clone().unwrap_or_else(|| {
        let mut name = commandline.input.clone().into_os_string();
        name.push(".imprint");
        PathBuf::from(name)
    });

    let rt = runtime::Builder::new_current_thread().enable_all().build()?;
    let response = rt.block_on(async {
        let client = Client::connect(&commandline.addr).await?;
        client
            .request(commandline.caption.as_bytes(), &image)
            .await
    })?;

    match response.status {
        StatusCode::Ok => {
            std::fs::write(&output, &response.image)?;
            info!(size = response.image.len(), "result written");
            println!("{}", output.display());
            Ok(())
        }
        status => {
            warn!(?status, "request not served");
            Err(AppError::IllegalStateError(format!(
                "server answered {:?}",
                status
            )))
        }
    }
}
