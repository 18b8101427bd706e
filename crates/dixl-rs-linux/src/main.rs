use dixl_rs::NodeId;
use dixl_rs_linux::{NodeOptions, net, start};
use log::{error, info};
use std::io::BufRead;
use std::net::Ipv4Addr;
use std::process;
use std::str::FromStr;

fn parse_node_id(value: &str) -> Option<NodeId> {
    Ipv4Addr::from_str(value).ok().map(|ip| NodeId(ip.octets()))
}

fn banner(options: &NodeOptions) {
    info!("******************************************************");
    info!("*     dixl-node - Distributed InterLocking system    *");
    info!("******************************************************");
    info!("> Node informations");
    info!("> -----------------------------------------------");
    info!("> IP address : {}", options.local_id);
    info!("> TCP port   : {}", options.port);
    info!("> -----------------------------------------------");
}

/// Boots the node, then waits for `stop` on stdin (or EOF) before the
/// cooperative shutdown.
fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let mut local_id = None;
    let mut port = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--id" => {
                local_id = args.next().as_deref().and_then(parse_node_id);
                if local_id.is_none() {
                    eprintln!("--id expects an IPv4 address");
                    process::exit(2);
                }
            }
            "--port" => {
                port = args.next().and_then(|value| value.parse::<u16>().ok());
                if port.is_none() {
                    eprintln!("--port expects a TCP port number");
                    process::exit(2);
                }
            }
            other => {
                eprintln!("unknown argument: {other}");
                eprintln!("usage: dixl-node [--id a.b.c.d] [--port n]");
                process::exit(2);
            }
        }
    }

    let local_id = match local_id {
        Some(id) => id,
        None => match net::local_ipv4() {
            Ok(id) => id,
            Err(e) => {
                error!("{e}");
                process::exit(e.exit_code());
            }
        },
    };

    let mut options = NodeOptions::new(local_id);
    if let Some(port) = port {
        options.port = port;
        options.peer_port = port;
    }

    banner(&options);
    let handle = start(options);
    info!("Node started; type 'stop' to shut down");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(command) if matches!(command.trim(), "stop" | "quit" | "exit") => break,
            Ok(_) => info!("type 'stop' to shut down"),
            Err(_) => break,
        }
    }

    handle.stop();
}
