use anyhow::Result;
use chrono::{DateTime, Utc};
use console::style;

use super::split_list;
use crate::core::store::Store;
use crate::core::store::types::NewToken;
use crate::core::terminal::{print_error, print_info, print_secret, print_success, print_table};

fn print_create_usage() {
    println!(
        "{}",
        style("Usage: openclaw-gateway token create <name> [--skills a,b] [--roles r1,r2] [--ips ip1,ip2] [--expires RFC3339] [--secret S]").bold()
    );
    println!("  Example: openclaw-gateway token create n8n-prod --skills ping,summary");
}

/// Parses the flags of `token create` starting after the subcommand.
pub(crate) fn parse_create_args(args: &[String], start: usize) -> Result<NewToken, String> {
    let mut token = NewToken::default();
    let mut i = start;
    while i < args.len() {
        let value = args.get(i + 1).map(String::as_str);
        match (args[i].as_str(), value) {
            ("--skills" | "-s", Some(v)) => {
                token.allowed_skills = split_list(v);
                i += 2;
            }
            ("--roles" | "-r", Some(v)) => {
                token.roles = split_list(v);
                i += 2;
            }
            ("--ips", Some(v)) => {
                token.allowed_ips = split_list(v);
                i += 2;
            }
            ("--expires", Some(v)) => {
                let at = DateTime::parse_from_rfc3339(v)
                    .map_err(|e| format!("--expires must be RFC 3339: {}", e))?;
                token.expires_at = Some(at.with_timezone(&Utc));
                i += 2;
            }
            ("--secret", Some(v)) => {
                token.secret = Some(v.to_string());
                i += 2;
            }
            (flag, _) if flag.starts_with('-') => {
                return Err(format!("Unknown or incomplete flag: {}", flag));
            }
            (positional, _) => {
                if token.name.is_empty() {
                    token.name = positional.to_string();
                }
                i += 1;
            }
        }
    }
    if token.name.trim().is_empty() {
        return Err("A token name is required".to_string());
    }
    Ok(token)
}

fn or_any(values: &[String]) -> String {
    if values.is_empty() {
        "any".to_string()
    } else {
        values.join(",")
    }
}

pub async fn run_token_command(store: &Store, args: &[String]) -> Result<()> {
    let sub_cmd = if args.len() > 2 { args[2].as_str() } else { "" };
    match sub_cmd {
        "create" => {
            let new = match parse_create_args(args, 3) {
                Ok(new) => new,
                Err(msg) => {
                    print_error(&msg);
                    print_create_usage();
                    return Ok(());
                }
            };
            let (raw, record) = store.create_api_token(&new).await?;
            print_success(&format!("Token '{}' created (id {}).", record.name, record.id));
            print_secret("Secret", &raw);
            print_info("Store it now. Only its hash is kept, it cannot be shown again.");
        }
        "list" | "ls" => {
            let tokens = store.list_api_tokens().await?;
            if tokens.is_empty() {
                print_info("No tokens issued yet.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = tokens
                .iter()
                .map(|t| {
                    vec![
                        t.id.to_string(),
                        t.name.clone(),
                        if t.active { "yes" } else { "no" }.to_string(),
                        or_any(&t.allowed_skills),
                        if t.allowed_ips.is_empty() {
                            "any".to_string()
                        } else {
                            t.allowed_ips.clone()
                        },
                        t.expires_at.clone().unwrap_or_else(|| "never".to_string()),
                        t.use_count.to_string(),
                        t.last_used_at.clone().unwrap_or_else(|| "-".to_string()),
                    ]
                })
                .collect();
            print_table(
                &["ID", "NAME", "ACTIVE", "SKILLS", "IPS", "EXPIRES", "USES", "LAST USED"],
                &rows,
            );
        }
        "deactivate" | "revoke" => {
            let Some(name) = args.get(3) else {
                println!(
                    "{}",
                    style("Usage: openclaw-gateway token deactivate <name>").bold()
                );
                return Ok(());
            };
            let changed = store.deactivate_api_token(name).await?;
            if changed == 0 {
                print_error(&format!("No token named '{}'.", name));
            } else {
                print_success(&format!("Deactivated {} token(s) named '{}'.", changed, name));
            }
        }
        _ => {
            print_error("Unknown token command. Expected: create, list, deactivate");
        }
    }
    Ok(())
}
