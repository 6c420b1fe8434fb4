//! Package install command implementation.

use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use newtdock::port::{DEFAULT_BAUD_RATE, open_serial};
use newtdock::{DockEvents, DockLink, DockSession, LinkOutcome, SerialConfig};
use std::path::Path;

use crate::config::Config;
use crate::{Cli, CliError, use_fancy_output, was_interrupted};

/// Progress bar length; positions read as percent.
const PROGRESS_STEPS: u64 = 100;

/// Status output and progress bar for one install.
struct InstallProgress {
    quiet: bool,
    pb: ProgressBar,
    completed: bool,
}

impl InstallProgress {
    fn new(quiet: bool) -> Self {
        let pb = if quiet || !use_fancy_output() {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(PROGRESS_STEPS);
            #[allow(clippy::unwrap_used)] // Static template string
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            pb.set_draw_target(ProgressDrawTarget::stderr());
            pb
        };
        Self {
            quiet,
            pb,
            completed: false,
        }
    }

    fn finish(&self) {
        if self.completed {
            self.pb.finish_with_message("sent");
        } else {
            self.pb.abandon();
        }
    }
}

impl DockEvents for InstallProgress {
    fn on_connected(&mut self) {
        if !self.quiet {
            self.pb.suspend(|| {
                eprintln!("{} Connected", style("✓").green());
            });
        }
    }

    fn on_disconnected(&mut self) {
        log::debug!("Device closed the link");
    }

    fn on_install_progress(&mut self, fraction: f64) {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_precision_loss,
            clippy::cast_sign_loss
        )]
        let pos = (fraction.clamp(0.0, 1.0) * PROGRESS_STEPS as f64).round() as u64;
        self.pb.set_position(pos);
        if fraction >= 1.0 {
            self.completed = true;
        }
    }
}

/// Port from the command line or environment, then the config file.
fn resolve_port(cli: &Cli, config: &Config) -> Result<String> {
    cli.port
        .clone()
        .or_else(|| config.connection.serial.clone())
        .ok_or_else(|| {
            CliError::Usage(
                "No serial port specified; use --port or set NEWTDOCK_PORT (see `newtdock list-ports`)"
                    .to_string(),
            )
            .into()
        })
}

/// Install command implementation.
pub(crate) fn cmd_install(cli: &Cli, config: &Config, package: &Path) -> Result<()> {
    let progress = InstallProgress::new(cli.quiet);
    let mut session = DockSession::with_config(progress, config.dock_config());
    session
        .attach_package(package)
        .with_context(|| format!("Failed to open package {}", package.display()))?;

    let port_name = resolve_port(cli, config)?;
    let baud = cli
        .baud
        .or(config.connection.baud)
        .unwrap_or(DEFAULT_BAUD_RATE);

    if !cli.quiet {
        eprintln!(
            "{} {} ({} bytes)",
            style("📦").cyan(),
            package.display(),
            session.package_size().unwrap_or_default()
        );
        eprintln!(
            "{} Using {} at {} baud",
            style("🔌").cyan(),
            style(&port_name).green(),
            baud
        );
    }

    let mut port = open_serial(&SerialConfig::new(&port_name, baud))
        .with_context(|| format!("Failed to open serial port {port_name}"))?;

    if !cli.quiet {
        eprintln!(
            "{} Waiting for the Newton (start Dock and connect via serial)...",
            style("⏳").yellow()
        );
    }

    let result = DockLink::with_config(&mut port, config.link_config()).run(&mut session);
    session.events().finish();

    if was_interrupted() {
        return Err(CliError::Cancelled("Interrupted by user".to_string()).into());
    }

    match result.context("Dock session failed")? {
        LinkOutcome::Disconnected if session.events().completed => {
            if !cli.quiet {
                eprintln!("{} Package installed", style("✓").green().bold());
            }
            Ok(())
        },
        LinkOutcome::Disconnected => bail!("Device disconnected before the package was sent"),
        LinkOutcome::Closed => bail!("Serial port {port_name} closed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_progress_marks_completion() {
        let mut progress = InstallProgress::new(true);
        progress.on_install_progress(0.25);
        assert!(!progress.completed);
        assert_eq!(progress.pb.position(), 25);

        progress.on_install_progress(1.0);
        assert!(progress.completed);
        assert_eq!(progress.pb.position(), 100);
    }

    #[test]
    fn test_resolve_port_prefers_command_line() {
        let cli = Cli::try_parse_from(["newtdock", "-p", "COM3", "install", "a.pkg"]).unwrap();
        let mut config = Config::default();
        config.connection.serial = Some("/dev/ttyUSB0".into());
        assert_eq!(resolve_port(&cli, &config).unwrap(), "COM3");
    }

    #[test]
    fn test_resolve_port_falls_back_to_config() {
        let cli = Cli::try_parse_from(["newtdock", "install", "a.pkg"]).unwrap();
        let mut config = Config::default();
        if cli.port.is_some() {
            // NEWTDOCK_PORT is set in this environment.
            return;
        }
        assert!(matches!(
            resolve_port(&cli, &config)
                .unwrap_err()
                .downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));

        config.connection.serial = Some("/dev/ttyUSB0".into());
        assert_eq!(resolve_port(&cli, &config).unwrap(), "/dev/ttyUSB0");
    }
}
