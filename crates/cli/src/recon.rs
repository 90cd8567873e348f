//! `pmatch run` / `pmatch validate`: design-vs-field pole reconciliation.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use polematch_recon::model::{MatchTier, ReconResult};
use polematch_recon::{load_document, ReconConfig, ReconInput};

use crate::exit_codes::EXIT_RECON_UNMATCHED;
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Match a design export against a field survey export
    #[command(after_help = "\
Examples:
  pmatch run design.json field.json
  pmatch run design.json field.json --config recon.toml --json
  pmatch run design.json field.json --output result.json --strict")]
    Run {
        /// Design-source JSON document
        design: PathBuf,

        /// Field-survey JSON document
        field: PathBuf,

        /// TOML config (thresholds, tolerances, carrier); defaults when omitted
        #[arg(long, short, env = "PMATCH_CONFIG")]
        config: Option<PathBuf>,

        /// Output JSON to stdout in addition to the human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Exit non-zero when any record is left unmatched
        #[arg(long)]
        strict: bool,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  pmatch validate recon.toml")]
    Validate {
        /// Path to the TOML config file
        config: PathBuf,
    },
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run { design, field, config, json, output, strict } => {
            cmd_recon_run(&design, &field, config.as_deref(), json, output.as_deref(), strict)
        }
        ReconCommands::Validate { config } => cmd_recon_validate(&config),
    }
}

fn read_text(path: &Path, what: &str) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| CliError::runtime(format!("cannot read {what} {}: {e}", path.display())))
}

fn load_config(path: Option<&Path>) -> Result<ReconConfig, CliError> {
    match path {
        None => Ok(ReconConfig::default()),
        Some(path) => {
            let text = read_text(path, "config")?;
            ReconConfig::from_toml(&text).map_err(|e| {
                CliError::config(e.to_string()).with_hint(format!("run `pmatch validate {}`", path.display()))
            })
        }
    }
}

fn cmd_recon_run(
    design_path: &Path,
    field_path: &Path,
    config_path: Option<&Path>,
    json_output: bool,
    output_file: Option<&Path>,
    strict: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;

    let design = load_document("design", &read_text(design_path, "design document")?)?;
    let field = load_document("field", &read_text(field_path, "field document")?)?;
    let input = ReconInput::from_values(&design, &field)?;
    log::debug!(
        "loaded {} design locations, {} pole types, {} field nodes",
        input.design.locations.len(),
        input.design.pole_types.len(),
        input.field.nodes.len(),
    );

    let result = polematch_recon::run(&config, &input)?;

    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| CliError::runtime(format!("JSON serialization error: {e}")))?;

    if let Some(path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::runtime(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    print_summary(&result);

    let s = &result.statistics;
    let unmatched = s.unmatched_field + s.unmatched_design;
    if strict && unmatched > 0 {
        return Err(CliError::new(
            EXIT_RECON_UNMATCHED,
            format!("{unmatched} record(s) left unmatched (--strict)"),
        ));
    }

    Ok(())
}

/// Human summary to stderr.
fn print_summary(result: &ReconResult) {
    let s = &result.statistics;
    eprintln!(
        "{}: {} design / {} field records, {} matched ({}), {} mismatched pair(s)",
        result.meta.config_name,
        s.design_total,
        s.field_total,
        s.total_matches,
        s.success_rate,
        s.mismatched_pairs,
    );
    for tier in MatchTier::ALL {
        let count = s.tier_counts.get(tier.key()).copied().unwrap_or(0);
        if count > 0 {
            eprintln!("  {:<34} {count}", tier.to_string());
        }
    }
}

fn cmd_recon_validate(config_path: &Path) -> Result<(), CliError> {
    let text = read_text(config_path, "config")?;
    let config = ReconConfig::from_toml(&text).map_err(|e| CliError::config(e.to_string()))?;

    eprintln!(
        "valid: '{}' direct < {} m, verified <= {} m, height tolerance {} ft, carrier \"{}\"",
        config.name,
        config.thresholds.direct_m,
        config.thresholds.verified_m,
        config.spec.height_tolerance_ft,
        config.comm_drop.carrier,
    );
    Ok(())
}
