use std::process::ExitCode;

use aituber::{
    cli::{Args, Commands, LipSyncCommand, RunCommand},
    logger,
    stream::{ChatFeed, ConsoleChat},
    tts::VoicevoxClient,
    LipSync, Result, Streamer, StreamerConfig,
};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Args = argh::from_env();

    if let Err(e) = logger::init(args.verbose, args.quiet) {
        eprintln!("Unable to initialize logging: {e}");
    }

    let config = match load_config(&args) {
        Ok(v) => v,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match args.commands {
        None => run(config, RunCommand { platform: None }).await,
        Some(Commands::Run(command)) => run(config, command).await,
        Some(Commands::LipSync(command)) => lip_sync(&config, command),
        Some(Commands::Speakers(_)) => speakers(&config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// An explicitly requested config must exist. The default one may be missing.
fn load_config(args: &Args) -> Result<StreamerConfig> {
    let (path, explicit) = args.config_path();
    if !explicit && !path.exists() {
        warn!("{} not found, using the default config", path.display());
        return StreamerConfig::default().validated();
    }

    StreamerConfig::load(path)
}

async fn run(mut config: StreamerConfig, command: RunCommand) -> Result<()> {
    if let Some(platform) = command.platform {
        config.platform = platform;
    }

    let mut streamer = Streamer::from_config(&config)?;
    let (feed, messages) = ChatFeed::spawn(
        Box::new(ConsoleChat::stdin(config.platform.clone())),
        config.chat_buffer,
    );

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            ctrl_c.cancel();
        }
    });

    info!("Type chat messages, one per line");
    streamer.run(messages, shutdown).await;
    feed.stop().await;

    match serde_json::to_string(&streamer.status()) {
        Ok(v) => info!("Final status: {v}"),
        Err(e) => warn!("Unable to serialize status: {e}"),
    }

    Ok(())
}

fn lip_sync(config: &StreamerConfig, command: LipSyncCommand) -> Result<()> {
    let bytes = std::fs::read(&command.wav)?;
    let events = LipSync::new(&config.lip_sync)?.analyze_wav(&bytes)?;
    info!("{} visemes from {}", events.len(), command.wav.display());

    let json = serde_json::to_string_pretty(&events)?;
    match command.output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}

async fn speakers(config: &StreamerConfig) -> Result<()> {
    let tts = VoicevoxClient::new(&config.tts, config.voice_config.clone())?;

    println!("Engine version: {}", tts.version().await);
    println!("{}", serde_json::to_string_pretty(&tts.speakers().await?)?);

    Ok(())
}
