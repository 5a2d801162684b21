use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "chillibot-server")]
#[command(author, version, about = "ChilliBot LINE webhook server", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "PORT")]
    pub port: Option<u16>,

    /// LINE channel secret used to verify webhook signatures
    #[arg(long, env = "CHILLIBOT_CHANNEL_SECRET", hide_env_values = true)]
    pub channel_secret: Option<String>,

    /// LINE channel access token used to send replies
    #[arg(long, env = "CHILLIBOT_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Model download URL (overrides the configured source)
    #[arg(long, env = "CHILLIBOT_MODEL_URL")]
    pub model_url: Option<String>,

    /// Local model cache path
    #[arg(long, env = "CHILLIBOT_MODEL_PATH")]
    pub model_path: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
