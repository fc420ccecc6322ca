use std::{fmt::Display, path::PathBuf};

use argh::FromArgs;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Debug, Clone)]
pub enum CliError {
    ParseFailure(argh::EarlyExit),
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseFailure(e) => write!(f, "{}", e.output),
        }
    }
}

/// aituber command line interface
#[derive(Debug, FromArgs)]
pub struct Args {
    /// enable verbose logging, overridden by "quiet" if passed
    #[argh(switch, short = 'v', long = "verbose")]
    pub verbose: bool,
    /// disable all logging, overrides verbose
    #[argh(switch, short = 'q', long = "quiet")]
    pub quiet: bool,
    /// path to the config file, defaults to config.json
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,
    #[argh(subcommand)]
    pub commands: Option<Commands>,
}

impl Args {
    /// Parse some `args`, not including the program name.
    pub fn parse(args: &[&str]) -> Result<Self, CliError> {
        Self::from_args(&[env!("CARGO_PKG_NAME")], args).map_err(CliError::ParseFailure)
    }

    /// The config path to load and whether it was asked for explicitly.
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(v) => (v.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        }
    }
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
pub enum Commands {
    Run(RunCommand),
    LipSync(LipSyncCommand),
    Speakers(SpeakersCommand),
}

/// Start streaming, reading chat from stdin until EOF or Ctrl-C
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
pub struct RunCommand {
    /// override the platform name reported for chat messages
    #[argh(option)]
    pub platform: Option<String>,
}

/// Print the viseme timeline of a WAV file as JSON
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "lip-sync")]
pub struct LipSyncCommand {
    /// path to the WAV file to analyze
    #[argh(positional)]
    pub wav: PathBuf,
    /// write the timeline here instead of stdout
    #[argh(option, short = 'o')]
    pub output: Option<PathBuf>,
}

/// List the speakers offered by the speech synthesis engine
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "speakers")]
pub struct SpeakersCommand {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        let args = Args::parse(&["--verbose"]).unwrap();

        assert!(args.verbose);
        assert!(!args.quiet);
    }

    #[test]
    fn empty() {
        let args = Args::from_args(&["aituber"], &[]).unwrap();

        assert!(!args.verbose);
        assert!(!args.quiet);
        assert!(args.commands.is_none());
        assert_eq!(
            args.config_path(),
            (PathBuf::from(DEFAULT_CONFIG_PATH), false)
        );
    }

    #[test]
    fn no_command_quiet_verbose() {
        let args = Args::from_args(&["aituber"], &["--quiet", "--verbose"]).unwrap();

        assert!(args.verbose);
        assert!(args.quiet);
    }

    #[test]
    fn explicit_config() {
        let args = Args::from_args(&["aituber"], &["--config", "stream.json", "run"]).unwrap();

        assert_eq!(args.config_path(), (PathBuf::from("stream.json"), true));
        assert!(matches!(args.commands, Some(Commands::Run(_))));
    }

    #[test]
    fn unknown_command() {
        assert!(Args::parse(&["dance"]).is_err());
    }

    mod run {
        use super::*;

        #[test]
        fn platform_override() {
            let args =
                Args::from_args(&["aituber"], &["run", "--platform", "twitch"]).unwrap();

            match args.commands.unwrap() {
                Commands::Run(v) => assert_eq!(v.platform.as_deref(), Some("twitch")),
                _ => panic!("expected run"),
            }
        }
    }

    mod lip_sync {
        use super::*;

        #[test]
        fn wav_only() {
            let args = Args::from_args(&["aituber"], &["lip-sync", "./speech.wav"]).unwrap();

            match args.commands.unwrap() {
                Commands::LipSync(v) => {
                    assert_eq!(v.wav, PathBuf::from("./speech.wav"));
                    assert!(v.output.is_none());
                }
                _ => panic!("expected lip-sync"),
            }
        }

        #[test]
        fn with_output() {
            let args = Args::from_args(
                &["aituber"],
                &["lip-sync", "./speech.wav", "--output", "./visemes.json"],
            )
            .unwrap();

            match args.commands.unwrap() {
                Commands::LipSync(v) => {
                    assert_eq!(v.output.unwrap(), PathBuf::from("./visemes.json"));
                }
                _ => panic!("expected lip-sync"),
            }
        }

        #[test]
        fn missing_wav() {
            assert!(Args::from_args(&["aituber"], &["lip-sync"]).is_err());
        }

        #[test]
        fn missing_output_arg() {
            assert!(Args::from_args(&["aituber"], &["lip-sync", "a.wav", "--output"]).is_err());
        }
    }

    #[test]
    fn speakers() {
        let args = Args::from_args(&["aituber"], &["speakers"]).unwrap();

        assert!(matches!(args.commands, Some(Commands::Speakers(_))));
    }
}
