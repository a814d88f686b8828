//! Output formatting and management

use crate::scanner::{Liveness, ScanReport};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

/// Output format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Greppable,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "greppable" | "grep" => Ok(OutputFormat::Greppable),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub file: Option<PathBuf>,
    pub colored: bool,
    pub verbose: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
            colored: true,
            verbose: false,
        }
    }
}

/// Main output manager
pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Write the report to the configured file, or stdout
    pub fn write_report(&self, report: &ScanReport) -> io::Result<()> {
        let output = self.render(report)?;
        self.emit(&output)
    }

    /// Record a host that failed the liveness gate, in the configured format
    pub fn write_host_down(&self, target: &str, liveness: &Liveness) -> io::Result<()> {
        let output = self.render_host_down(target, liveness)?;
        self.emit(&output)
    }

    pub fn render_host_down(&self, target: &str, liveness: &Liveness) -> io::Result<String> {
        match self.config.format {
            OutputFormat::Text => Ok(format!("Host {} appears to be down\n", target)),
            OutputFormat::Json => {
                let value = serde_json::json!({
                    "target": target,
                    "status": "down",
                    "reason": liveness.describe(),
                });
                let mut json = serde_json::to_string_pretty(&value)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                json.push('\n');
                Ok(json)
            }
            OutputFormat::Greppable => Ok(format!("Host: {} () Status: Down\n", target)),
        }
    }

    fn emit(&self, output: &str) -> io::Result<()> {
        match &self.config.file {
            Some(path) => {
                let mut file = File::create(path)?;
                file.write_all(output.as_bytes())?;
                log::info!("Results written to {}", path.display());
            }
            None => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(output.as_bytes())?;
                stdout.flush()?;
            }
        }

        Ok(())
    }

    pub fn render(&self, report: &ScanReport) -> io::Result<String> {
        match self.config.format {
            OutputFormat::Text => Ok(self.format_text(report)),
            OutputFormat::Json => self.format_json(report),
            OutputFormat::Greppable => Ok(self.format_greppable(report)),
        }
    }

    /// One line verdict of the liveness gate
    pub fn host_status(&self, target: &str, liveness: &Liveness) -> String {
        if liveness.is_alive() {
            let line = format!("Host {} is up", target);
            if self.config.colored {
                line.green().to_string()
            } else {
                line
            }
        } else {
            let line = format!("Host {} appears to be down", target);
            if self.config.colored {
                line.red().to_string()
            } else {
                line
            }
        }
    }

    fn format_text(&self, report: &ScanReport) -> String {
        let mut output = String::new();

        if report.open_ports.is_empty() {
            output.push_str("\nNo open ports found\n");
        } else {
            output.push_str("\nOpen ports:\n");
            for port in &report.open_ports {
                let line = match report.services.get(port) {
                    Some(service) => format!("  {:<6} {}", port, service),
                    None => format!("  {}", port),
                };
                output.push_str(&self.highlight(&line));
                output.push('\n');
            }
        }

        if report.cancelled {
            let line = format!(
                "\nScan interrupted after {}/{} ports",
                report.probed(),
                report.requested
            );
            output.push_str(&self.warn(&line));
            output.push('\n');
        }

        if self.config.verbose {
            output.push_str(&format!(
                "\nScanned {} ports on {} in {:.2}s ({:.0} ports/s, {} workers)\n",
                report.probed(),
                report.target,
                report.duration.as_secs_f64(),
                report.scan_rate(),
                report.concurrency
            ));
            output.push_str(&format!(
                "  refused: {}  timed out: {}  unresolved: {}  unreachable: {}\n",
                report.counts.refused,
                report.counts.timed_out,
                report.counts.resolution_failed,
                report.counts.unreachable
            ));
        }

        output
    }

    fn format_json(&self, report: &ScanReport) -> io::Result<String> {
        let mut json = serde_json::to_string_pretty(report)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        json.push('\n');
        Ok(json)
    }

    fn format_greppable(&self, report: &ScanReport) -> String {
        let mut output = String::new();

        for port in &report.open_ports {
            let service = report
                .services
                .get(port)
                .map(|service| service.protocol.as_str())
                .unwrap_or("unknown");
            output.push_str(&format!(
                "Host: {} () Ports: {}/open/tcp//{}/\n",
                report.target, port, service
            ));
        }

        output
    }

    fn highlight(&self, text: &str) -> String {
        if self.config.colored {
            text.bright_green().to_string()
        } else {
            text.to_string()
        }
    }

    fn warn(&self, text: &str) -> String {
        if self.config.colored {
            text.yellow().to_string()
        } else {
            text.to_string()
        }
    }
}
