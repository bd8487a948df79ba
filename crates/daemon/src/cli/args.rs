pub use clap::Parser;

use url::Url;

#[derive(Parser, Debug)]
#[command(name = "burnbox")]
#[command(about = "One-time file relay: upload once, download once, then it burns")]
pub struct Args {
    /// Address of a running relay daemon
    #[arg(long, global = true, env = "BURNBOX_REMOTE", default_value = "http://localhost:8000")]
    pub remote: Url,

    #[command(subcommand)]
    pub command: crate::Command,
}
