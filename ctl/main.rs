#![forbid(unsafe_code)]

//! `lockdown-ctl` — sends a single message to the runtime host.
//!
//! Meant to be called by a client process (or an operator) to report
//! readiness, request a reconfiguration or shutdown, or answer a password
//! request. Address and token default to the environment the runtime sets
//! for its client.

use std::io::{BufRead, BufReader, Write};

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};
use uuid::Uuid;

use lockdown_runtime::ipc::protocol::{HostRequest, IpcResponse, RuntimeMessage};
use lockdown_runtime::process::{ENV_RUNTIME_ADDRESS, ENV_STARTUP_TOKEN};

#[derive(Debug, Parser)]
#[command(
    name = "lockdown-ctl",
    about = "Send messages to the lockdown runtime host",
    version,
    long_about = None
)]
struct Cli {
    /// Runtime host address.
    #[arg(long, env = ENV_RUNTIME_ADDRESS)]
    address: String,

    /// Startup token of the current session.
    #[arg(long, env = ENV_STARTUP_TOKEN)]
    token: Option<Uuid>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the runtime host answers.
    Ping,

    /// Report that the client is ready.
    Ready,

    /// Ask the runtime to load new settings.
    Reconfigure {
        /// Location of the settings file.
        path: String,
    },

    /// Ask the runtime to shut down.
    Shutdown,

    /// Answer a password request.
    PasswordReply {
        /// Request id from the password request.
        request_id: Uuid,
        /// The entered password.
        #[arg(long, conflicts_with = "cancel")]
        password: Option<String>,
        /// The user cancelled the dialog.
        #[arg(long)]
        cancel: bool,
    },
}

impl Command {
    fn into_message(self) -> RuntimeMessage {
        match self {
            Self::Ping => RuntimeMessage::Ping,
            Self::Ready => RuntimeMessage::ClientReady,
            Self::Reconfigure { path } => RuntimeMessage::ReconfigurationRequested { path },
            Self::Shutdown => RuntimeMessage::ShutdownRequested,
            Self::PasswordReply {
                request_id,
                password,
                cancel,
            } => RuntimeMessage::PasswordReply {
                request_id,
                success: !cancel,
                password: if cancel { None } else { password },
            },
        }
    }
}

fn main() {
    let args = Cli::parse();
    let request = HostRequest {
        token: args.token,
        message: args.command.into_message(),
    };

    match send_request(&args.address, &request) {
        Ok(response) if response.ok => println!("OK"),
        Ok(response) => {
            eprintln!(
                "Error: {}",
                response.error.as_deref().unwrap_or("unknown error")
            );
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("Failed to reach runtime host: {err}");
            eprintln!("Is lockdown-runtime listening on '{}'?", args.address);
            std::process::exit(1);
        }
    }
}

/// Connect to the host, send one request line and read the response line.
fn send_request(
    address: &str,
    request: &HostRequest,
) -> std::result::Result<IpcResponse, Box<dyn std::error::Error>> {
    let name = address.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    Ok(serde_json::from_str(response_line.trim())?)
}
