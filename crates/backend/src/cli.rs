//! Administrative commands for the id counters.

use clap::{Parser, Subcommand};
use domain::IdType;

use crate::{Backend, BackendError};

#[derive(Debug, Parser)]
#[command(name = "backend")]
#[command(about = "Inspect, issue and reset the sequential id counters")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Print the Prometheus exposition after the command ran
    #[arg(long, global = true)]
    pub metrics: bool,
}

impl Cli {
    /// The requested command, `counters` when none was given.
    pub fn selected_command(&self) -> Command {
        self.command.unwrap_or(Command::Counters)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print every counter's current value
    Counters,
    /// Issue and print a fresh identifier
    Generate {
        /// USER, PRODUCT or ORDER
        #[arg(value_name = "TYPE")]
        id_type: IdType,
    },
    /// Set a counter back to zero (unsafe while ids are being generated)
    Reset {
        /// USER, PRODUCT or ORDER
        #[arg(value_name = "TYPE")]
        id_type: IdType,
    },
}

impl Backend {
    /// Runs an admin command and returns the text to print.
    pub async fn execute(&self, command: Command) -> Result<String, BackendError> {
        match command {
            Command::Counters => {
                let counters = self.ids().counters().await?;
                Ok(counters
                    .iter()
                    .map(|c| format!("{:<8} {}", c.id_type.as_str(), c.counter))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Command::Generate { id_type } => Ok(self.ids().generate(id_type).await?),
            Command::Reset { id_type } => {
                self.ids().reset(id_type).await?;
                Ok(format!("{id_type} counter reset to 0"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("backend").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        <Cli as CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_counters_is_default() {
        assert_eq!(parse(&[]).unwrap().selected_command(), Command::Counters);
        assert_eq!(parse(&["counters"]).unwrap().selected_command(), Command::Counters);
    }

    #[test]
    fn test_generate_and_reset_take_a_type() {
        assert_eq!(
            parse(&["generate", "order"]).unwrap().selected_command(),
            Command::Generate {
                id_type: IdType::Order
            }
        );
        assert_eq!(
            parse(&["reset", "USER"]).unwrap().selected_command(),
            Command::Reset {
                id_type: IdType::User
            }
        );
    }

    #[test]
    fn test_metrics_flag_anywhere() {
        let before = parse(&["--metrics", "generate", "product"]).unwrap();
        assert!(before.metrics);
        assert_eq!(
            before.selected_command(),
            Command::Generate {
                id_type: IdType::Product
            }
        );

        assert!(parse(&["generate", "product", "--metrics"]).unwrap().metrics);
        assert!(!parse(&["counters"]).unwrap().metrics);
    }

    #[test]
    fn test_bad_arguments_are_rejected() {
        for args in [
            &["generate"][..],
            &["generate", "invoice"],
            &["reset", "user", "extra"],
            &["counters", "user"],
            &["delete"],
        ] {
            assert!(parse(args).is_err(), "{args:?}");
        }
    }
}
