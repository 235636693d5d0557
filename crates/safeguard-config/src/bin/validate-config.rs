//! Config validation CLI tool
//!
//! Validates a safeguard configuration file and reports any errors.

use safeguard_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a safeguard configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match safeguard_config::load_config(&config_path) {
        Ok(config) => {
            let policy = &config.policy;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", safeguard_config::CURRENT_CONFIG_VERSION);
            println!("  Enforcement: {}", if policy.enforcement_enabled { "on" } else { "off" });
            println!("  Blocked apps: {}", policy.blocked_packages.len());
            println!(
                "  Hidden apps: {} (hide mode {})",
                policy.hidden_packages.len(),
                if policy.hide_mode_active { "on" } else { "off" }
            );

            match policy.configured_geofence() {
                Some(fence) if policy.location_gate_enabled => println!(
                    "  Allowed area: {:.5}, {:.5} within {:.0} m",
                    fence.latitude, fence.longitude, fence.radius_m
                ),
                Some(_) => println!("  Allowed area: set, gate disabled"),
                None => println!("  Allowed area: not set"),
            }

            let mut blocked: Vec<_> = policy.blocked_packages.iter().collect();
            blocked.sort();
            if !blocked.is_empty() {
                println!();
                println!("Blocked:");
                for pkg in blocked {
                    println!("  - {}", pkg);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                safeguard_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                safeguard_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                safeguard_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                safeguard_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        safeguard_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
