mod inspect;
mod serve;
mod tokens;

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use crate::core::config::{self, GatewayConfig};
use crate::core::store::Store;
use crate::core::terminal::{self, GuideSection, print_error, print_success};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Server")
        .command("serve", "Run the HTTP gateway in the foreground")
        .command("seed", "Install the default skill catalogue")
        .print();

    GuideSection::new("Credentials")
        .command("token create <name>", "Issue a new API token")
        .command("token list", "Show issued tokens")
        .command("token deactivate <name>", "Revoke every token with that name")
        .print();

    GuideSection::new("Inspection")
        .command("skill list", "Show the skill registry")
        .command("logs", "Show recent gateway requests")
        .command("jobs", "Show recent workflow jobs")
        .print();

    println!(
        "\n {} {} <command> [subcommand] [--config <path>]\n",
        style("Usage:").bold(),
        style("openclaw-gateway").green()
    );
}

/// Removes `--config <path>` from anywhere in the argument list.
pub(crate) fn take_config_flag(args: &mut Vec<String>) -> Option<PathBuf> {
    let pos = args.iter().position(|a| a == "--config")?;
    if pos + 1 < args.len() {
        let path = args.remove(pos + 1);
        args.remove(pos);
        Some(PathBuf::from(path))
    } else {
        args.remove(pos);
        None
    }
}

pub(crate) fn parse_api_server_flags(
    args: &[String],
    start: usize,
    mut api_host: String,
    mut api_port: u16,
) -> (String, u16) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                if i + 1 < args.len() {
                    api_port = args[i + 1].parse().unwrap_or(config::DEFAULT_API_PORT);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    api_host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (api_host, api_port)
}

pub(crate) fn parse_limit_flag(args: &[String], start: usize, default: i64) -> i64 {
    let mut limit = default;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" | "-n" => {
                if i + 1 < args.len() {
                    limit = args[i + 1].parse().unwrap_or(default);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    limit.max(1)
}

/// Splits a comma-separated flag value, dropping blanks.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn open_store(config: &GatewayConfig) -> Result<Store> {
    Store::open(config.database_path()).await
}

pub async fn run_main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().collect();
    let config_path = take_config_flag(&mut args).unwrap_or_else(config::default_config_path);

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "serve" => {
            let config = GatewayConfig::load(&config_path).await?;
            let (api_host, api_port) = parse_api_server_flags(
                &args,
                2,
                config.server.host.clone(),
                config.server.port,
            );
            serve::run_serve(config, api_host, api_port).await?;
        }
        "seed" => {
            let config = GatewayConfig::load(&config_path).await?;
            let store = open_store(&config).await?;
            let inserted = store.seed_default_skills().await?;
            print_success(&format!("Seeded {} new skill(s).", inserted));
        }
        "token" => {
            let config = GatewayConfig::load(&config_path).await?;
            let store = open_store(&config).await?;
            tokens::run_token_command(&store, &args).await?;
        }
        "skill" | "skills" => {
            let sub_cmd = if args.len() > 2 { args[2].as_str() } else { "list" };
            if sub_cmd != "list" {
                print_error("Unknown skill command. Expected: list");
                return Ok(());
            }
            let config = GatewayConfig::load(&config_path).await?;
            let store = open_store(&config).await?;
            inspect::list_skills(&store).await?;
        }
        "logs" => {
            let config = GatewayConfig::load(&config_path).await?;
            let store = open_store(&config).await?;
            inspect::list_logs(&store, parse_limit_flag(&args, 2, 20)).await?;
        }
        "jobs" => {
            let config = GatewayConfig::load(&config_path).await?;
            let store = open_store(&config).await?;
            inspect::list_jobs(&store, parse_limit_flag(&args, 2, 20)).await?;
        }
        "help" | "--help" | "-h" => print_help(),
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn config_flag_is_removed_wherever_it_appears() {
        let mut args = argv(&["bin", "logs", "--config", "/tmp/g.toml", "--limit", "5"]);
        assert_eq!(
            take_config_flag(&mut args),
            Some(PathBuf::from("/tmp/g.toml"))
        );
        assert_eq!(args, argv(&["bin", "logs", "--limit", "5"]));

        let mut dangling = argv(&["bin", "seed", "--config"]);
        assert_eq!(take_config_flag(&mut dangling), None);
        assert_eq!(dangling, argv(&["bin", "seed"]));
    }

    #[test]
    fn server_flags_override_config_values() {
        let args = argv(&["bin", "serve", "--api-host", "0.0.0.0", "--api-port", "9100"]);
        let (host, port) = parse_api_server_flags(&args, 2, "127.0.0.1".into(), 8069);
        assert_eq!(host, "0.0.0.0");
        assert_eq!(port, 9100);

        let args = argv(&["bin", "serve", "--api-port", "nope"]);
        let (_, port) = parse_api_server_flags(&args, 2, "127.0.0.1".into(), 1234);
        assert_eq!(port, config::DEFAULT_API_PORT);
    }

    #[test]
    fn limit_flag_falls_back_and_stays_positive() {
        assert_eq!(parse_limit_flag(&argv(&["bin", "logs"]), 2, 20), 20);
        assert_eq!(parse_limit_flag(&argv(&["bin", "logs", "-n", "3"]), 2, 20), 3);
        assert_eq!(parse_limit_flag(&argv(&["bin", "logs", "--limit", "0"]), 2, 20), 1);
    }

    #[test]
    fn list_values_are_trimmed() {
        assert_eq!(split_list(" ping, summary ,,"), vec!["ping", "summary"]);
        assert!(split_list("").is_empty());
    }
}
