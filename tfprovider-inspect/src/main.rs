//! tfprovider-inspect
//!
//! Starts a provider plugin and prints the resource types in its schema.
//!
//! ```bash
//! tfprovider-inspect ./terraform-provider-null
//! tfprovider-inspect --json ./terraform-provider-null > schema.json
//! RUST_LOG=tfprovider=debug tfprovider-inspect ./terraform-provider-null
//! ```

use std::ffi::OsString;
use std::process::ExitCode;
use tfprovider::{Diagnostics, Provider, Schema};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .init();
}

#[derive(Debug, PartialEq)]
struct Args {
    json: bool,
    executable: OsString,
    provider_args: Vec<OsString>,
}

fn parse_args(args: impl IntoIterator<Item = OsString>) -> Option<Args> {
    let mut args = args.into_iter().peekable();
    let json = args.next_if(|arg| arg == "--json").is_some();
    let executable = args.next()?;
    Some(Args {
        json,
        executable,
        provider_args: args.collect(),
    })
}

fn render_listing(schema: &Schema) -> String {
    let mut out = String::new();
    if !schema.managed_resource_types.is_empty() {
        out.push_str("\n# Managed Resource Types\n\n");
        for name in schema.managed_resource_types.keys() {
            out.push_str(&format!("- {name}\n"));
        }
    }
    if !schema.data_resource_types.is_empty() {
        out.push_str("\n# Data Resource Types\n\n");
        for name in schema.data_resource_types.keys() {
            out.push_str(&format!("- {name}\n"));
        }
    }
    out.push('\n');
    out
}

fn show_diagnostics(diags: &Diagnostics) {
    for diag in diags {
        eprintln!("{diag}");
    }
}

async fn close(provider: &Provider) {
    if let Err(err) = provider.close().await {
        tracing::warn!(error = %err, "failed to stop provider plugin");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let mut argv = std::env::args_os();
    let program = argv
        .next()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tfprovider-inspect".to_string());
    let Some(args) = parse_args(argv) else {
        eprintln!("Usage: {program} [--json] <provider-executable> [provider-args...]");
        return ExitCode::FAILURE;
    };

    let provider = match tfprovider::start(&args.executable, args.provider_args).await {
        Ok(provider) => provider,
        Err(tfprovider::TfproviderError::Schema(diags)) => {
            show_diagnostics(&diags);
            return ExitCode::FAILURE;
        }
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(version = %provider.protocol_version(), "provider started");

    let schema = provider.schema();
    let code = if args.json {
        match serde_json::to_string_pretty(&*schema) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("Error: failed to render schema: {err}");
                ExitCode::FAILURE
            }
        }
    } else {
        print!("{}", render_listing(&schema));
        ExitCode::SUCCESS
    };

    close(&provider).await;
    code
}
