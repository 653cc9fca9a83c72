//! TCP front door for an nTCP-attached HTTP accelerator.
//!
//! Bridges TCP clients to a device speaking nTCP frames, either over a
//! serial character device or against the in-process simulated device.
//! The serial line must already be configured raw (no echo, no line
//! discipline) by the likes of `stty`.

use argh::FromArgs;
use ntcp::device::HttpAccelerator;
use ntcp::host;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Serve HTTP/1.0 clients from an nTCP-attached accelerator.
struct Args {
    /// address to listen on (default 127.0.0.1:3278)
    #[argh(option, default = "String::from(\"127.0.0.1:3278\")")]
    listen: String,

    /// serial device carrying nTCP frames, e.g. /dev/ttyACM0
    #[argh(option)]
    device: Option<String>,

    /// run against an in-process simulated device instead of hardware
    #[argh(switch)]
    sim: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Args = argh::from_env();
    let listener = TcpListener::bind(&args.listen).await?;
    tracing::info!(listen = %args.listen, "listening");

    match (args.sim, args.device) {
        (true, _) => {
            let (proxy_io, device_io) = tokio::io::duplex(1024);
            tokio::spawn(async move {
                if let Err(err) = host::sim::attach(HttpAccelerator::new(), device_io).await {
                    tracing::error!(error = %err, "simulated device stopped");
                }
            });
            host::serve(listener, proxy_io).await?;
        }
        (false, Some(path)) => {
            let serial = tokio::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .await?;
            tracing::info!(device = %path, "opened serial transport");
            host::serve(listener, serial).await?;
        }
        (false, None) => return Err("pass --device <path> or --sim".into()),
    }
    Ok(())
}
