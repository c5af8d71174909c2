//! Voicebridge Gateway
//!
//! Realtime voice telephony gateway: bridges a telephony provider's media
//! WebSocket stream to speech-to-text, LLM and text-to-speech providers.

use voicebridge_gateway::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    cli::run().await
}
