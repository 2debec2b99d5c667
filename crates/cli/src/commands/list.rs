use std::fmt::Write as _;

use anyhow::{Context, Result};
use stdhttp_common::output::Output;
use stdhttp_common::{ProcessBroker, ProcessRecord};
use stdhttpd_client::BrokerClient;

pub async fn list(broker_url: &str, output: &Output) -> Result<()> {
    let writer = output
        .open_shared()
        .with_context(|| format!("Error creating stdout output {:?}", output))?;
    let client = BrokerClient::new(broker_url, std::time::Duration::ZERO)?;

    let mut processes = client.list().await.context("Error listing processes")?;
    processes.sort_by_key(|process| process.pid);

    writer
        .write_all(format_processes(&processes).as_bytes())
        .context("Error writing output")
}

/// Renders the process table printed by `stdhttp list`.
pub fn format_processes(processes: &[ProcessRecord]) -> String {
    let mut table = String::new();
    let _ = writeln!(table, "{:<12} {:<12} {}", "PID", "CLIENT NAME", "COMMAND");
    for process in processes {
        let _ = writeln!(
            table,
            "{:<12} {:<12} {}",
            process.pid,
            process.client_name,
            format_command(process)
        );
    }
    let _ = writeln!(table, "Total: {}", processes.len());
    table
}

fn format_command(process: &ProcessRecord) -> String {
    if process.is_pipe() {
        return "PIPE".to_string();
    }
    std::iter::once(&process.command_name)
        .chain(&process.command_args)
        .map(|part| quote(part))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(raw: &str) -> String {
    let escaped = raw.replace('"', "\\\"");
    if escaped.contains(&[' ', '"'][..]) {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u32, client_name: &str, command_name: &str, args: &[&str]) -> ProcessRecord {
        ProcessRecord {
            pid,
            client_name: client_name.into(),
            command_name: command_name.into(),
            command_args: args.iter().map(|arg| arg.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn renders_header_rows_and_total() {
        let table = format_processes(&[
            record(7, "web", "nginx", &["-g", "daemon off;"]),
            record(12345, "", "", &[]),
        ]);
        assert_eq!(
            table,
            "PID          CLIENT NAME  COMMAND\n\
             7            web          nginx -g \"daemon off;\"\n\
             12345                     PIPE\n\
             Total: 2\n"
        );
    }

    #[test]
    fn empty_listing_still_has_header_and_total() {
        assert_eq!(
            format_processes(&[]),
            "PID          CLIENT NAME  COMMAND\nTotal: 0\n"
        );
    }

    #[test]
    fn quotes_are_escaped_and_wrapped() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("two words"), "\"two words\"");
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn long_client_names_push_the_command_column() {
        let table = format_processes(&[record(1, "a-very-long-client", "sh", &[])]);
        assert!(table.contains("1            a-very-long-client sh\n"));
    }
}
