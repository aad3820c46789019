use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "hubbub-server", about = "Hubbub realtime chat and voice relay")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/hubbub.toml")]
    pub config: String,
}
