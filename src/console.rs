//! Administrative command surface read line by line from the operator.

use anyhow::{anyhow, bail, Context, Result};
use std::fmt::Write as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

use crate::algorithms::format_path;
use crate::router::Router;

const HELP: &str = "\
attach <processIp> <processPort> <simulatedIp> <weight>  register a link
start                                                    handshake with attached links
connect <processIp> <processPort> <simulatedIp> <weight> attach and handshake at once
neighbors                                                list port table
detect <simulatedIp>                                     shortest path to a router
disconnect <portIndex>                                   tear down one link
lsd                                                      dump the link state database
quit                                                     disconnect everything and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Attach {
        process_ip: String,
        process_port: u16,
        simulated_ip: String,
        weight: u16,
    },
    Start,
    Connect {
        process_ip: String,
        process_port: u16,
        simulated_ip: String,
        weight: u16,
    },
    Neighbors,
    Detect(String),
    Disconnect(usize),
    Lsd,
    Quit,
    Help,
}

fn link_args(name: &str, args: &[&str]) -> Result<(String, u16, String, u16)> {
    let [process_ip, process_port, simulated_ip, weight] = args else {
        bail!("usage: {} <processIp> <processPort> <simulatedIp> <weight>", name);
    };
    let process_port = process_port
        .parse()
        .with_context(|| format!("invalid process port '{}'", process_port))?;
    let weight = weight
        .parse()
        .with_context(|| format!("invalid weight '{}'", weight))?;
    Ok((
        process_ip.to_string(),
        process_port,
        simulated_ip.to_string(),
        weight,
    ))
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or_else(|| anyhow!("empty command"))?;
        let args: Vec<&str> = words.collect();

        let command = match (name, args.as_slice()) {
            ("attach", _) => {
                let (process_ip, process_port, simulated_ip, weight) = link_args(name, &args)?;
                Command::Attach {
                    process_ip,
                    process_port,
                    simulated_ip,
                    weight,
                }
            }
            ("connect", _) => {
                let (process_ip, process_port, simulated_ip, weight) = link_args(name, &args)?;
                Command::Connect {
                    process_ip,
                    process_port,
                    simulated_ip,
                    weight,
                }
            }
            ("start", []) => Command::Start,
            ("neighbors", []) => Command::Neighbors,
            ("detect", [destination]) => Command::Detect(destination.to_string()),
            ("detect", _) => bail!("usage: detect <simulatedIp>"),
            ("disconnect", [index]) => Command::Disconnect(
                index
                    .parse()
                    .with_context(|| format!("invalid port index '{}'", index))?,
            ),
            ("disconnect", _) => bail!("usage: disconnect <portIndex>"),
            ("lsd", []) => Command::Lsd,
            ("quit", []) => Command::Quit,
            ("help", _) => Command::Help,
            (other, _) => bail!("unknown command '{}', try 'help'", other),
        };
        Ok(command)
    }
}

/// Run one command against `router` and return the text to show the operator.
pub async fn execute(router: &Router, command: &Command) -> Result<String> {
    let mut out = String::new();
    match command {
        Command::Attach {
            process_ip,
            process_port,
            simulated_ip,
            weight,
        } => {
            let index = router
                .attach(process_ip, *process_port, simulated_ip, *weight)
                .await?;
            write!(out, "attached {} at port {}", simulated_ip, index)?;
        }
        Command::Start => {
            let results = router.start().await;
            if results.is_empty() {
                write!(out, "no pending links")?;
            }
            for (neighbor, result) in results {
                match result {
                    Ok(()) => writeln!(out, "{}: TWO_WAY", neighbor)?,
                    Err(e) => writeln!(out, "{}: failed ({})", neighbor, e)?,
                }
            }
        }
        Command::Connect {
            process_ip,
            process_port,
            simulated_ip,
            weight,
        } => {
            let index = router
                .connect(process_ip, *process_port, simulated_ip, *weight)
                .await?;
            write!(out, "connected to {} at port {}", simulated_ip, index)?;
        }
        Command::Neighbors => {
            let neighbors = router.neighbors().await;
            if neighbors.is_empty() {
                write!(out, "no neighbors")?;
            }
            for (index, link) in neighbors {
                write!(
                    out,
                    "port {}: {} ({}) weight {} {}",
                    index,
                    link.remote.simulated_ip,
                    link.remote.process_addr(),
                    link.weight,
                    link.status()
                )?;
                if let Some(at) = link.established_at {
                    write!(out, " since {}", at.format("%H:%M:%S"))?;
                }
                if let Some(at) = link.last_heartbeat {
                    write!(out, " last heartbeat {}", at.format("%H:%M:%S"))?;
                }
                writeln!(out)?;
            }
        }
        Command::Detect(destination) => {
            let outcome = router.detect(destination).await?;
            write!(out, "{}", format_path(&outcome, destination))?;
        }
        Command::Disconnect(index) => {
            let remote = router.disconnect(*index).await?;
            write!(out, "disconnected {} from port {}", remote.simulated_ip, index)?;
        }
        Command::Lsd => {
            write!(out, "{}", router.lsd_dump().await)?;
        }
        Command::Quit => {
            for (index, result) in router.quit().await {
                if let Err(e) = result {
                    writeln!(out, "port {}: {}", index, e)?;
                }
            }
            write!(out, "bye")?;
        }
        Command::Help => out.push_str(HELP),
    }
    Ok(out.trim_end().to_string())
}

/// Read commands until `quit` or end of input. Returns whether `quit` was issued.
pub async fn run<R, W>(router: &Router, input: R, mut output: W) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    output.write_all(b">> ").await?;
    output.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            let response = match Command::parse(trimmed) {
                Ok(command) => {
                    let quit = command == Command::Quit;
                    let response = match execute(router, &command).await {
                        Ok(text) => text,
                        Err(e) => {
                            error!(command = trimmed, error = %e, "command failed");
                            format!("error: {:#}", e)
                        }
                    };
                    if quit {
                        output.write_all(format!("{}\n", response).as_bytes()).await?;
                        output.flush().await?;
                        info!("console closed by quit");
                        return Ok(true);
                    }
                    response
                }
                Err(e) => format!("error: {:#}", e),
            };
            if !response.is_empty() {
                output.write_all(format!("{}\n", response).as_bytes()).await?;
            }
        }
        output.write_all(b">> ").await?;
        output.flush().await?;
    }
    Ok(false)
}
