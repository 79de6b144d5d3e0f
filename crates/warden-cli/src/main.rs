//! warden - deterministic execution gate
//!
//! CLI adapter over `warden-core`: gates a single command invocation
//! through policy evaluation, signed token issuance, and the kernel
//! verification chain, then propagates the child's exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// warden - deterministic execution gate for untrusted command requests
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Gate and execute a command
    Run {
        /// Bare executable name (no shell syntax)
        command: String,

        /// Arguments, passed verbatim to the executable
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Path to the policy file
        #[arg(long, default_value = "./policy.yaml")]
        policy: PathBuf,

        /// Gate mode (strict or permissive; unknown values coerce to
        /// strict)
        #[arg(long, default_value = "strict")]
        gate_mode: String,

        /// Under permissive mode, convert a policy miss into an audited
        /// ALLOW
        #[arg(long)]
        allow_with_audit: bool,

        /// Treat a HOLD outcome as a failure
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        fail_on_hold: bool,

        /// Directory for the replay registry and audit streams
        #[arg(long, default_value = ".warden")]
        audit_dir: PathBuf,

        /// Environment fingerprint profile (minimal or extended)
        #[arg(long, default_value = "minimal")]
        profile: String,

        /// Token lifetime in seconds
        #[arg(long, default_value_t = 300)]
        ttl: i64,
    },

    /// Gate an agent proposal supplied as JSON (stdin when omitted)
    Propose {
        /// The proposal document
        #[arg(long)]
        json: Option<String>,

        /// Path to the policy file
        #[arg(long, default_value = "./policy.yaml")]
        policy: PathBuf,

        /// Gate mode (strict or permissive; unknown values coerce to
        /// strict)
        #[arg(long, default_value = "strict")]
        gate_mode: String,

        /// Under permissive mode, convert a policy miss into an audited
        /// ALLOW
        #[arg(long)]
        allow_with_audit: bool,

        /// Treat a HOLD outcome as a failure
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        fail_on_hold: bool,

        /// Directory for the replay registry and audit streams
        #[arg(long, default_value = ".warden")]
        audit_dir: PathBuf,
    },

    /// Evaluate the policy for a command without issuing or executing
    Eval {
        /// Bare executable name
        command: String,

        /// Arguments to match against rule patterns
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Path to the policy file
        #[arg(long, default_value = "./policy.yaml")]
        policy: PathBuf,
    },

    /// Policy file utilities
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyCommands {
    /// Load a policy and report structural findings
    Lint {
        /// Path to the policy file
        #[arg(long, default_value = "./policy.yaml")]
        policy: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match cli.command {
        Commands::Run {
            command,
            args,
            policy,
            gate_mode,
            allow_with_audit,
            fail_on_hold,
            audit_dir,
            profile,
            ttl,
        } => {
            commands::run::execute(commands::run::RunOptions {
                command,
                args,
                policy,
                gate_mode,
                allow_with_audit,
                fail_on_hold,
                audit_dir,
                profile,
                ttl,
            })
            .await
        },
        Commands::Propose {
            json,
            policy,
            gate_mode,
            allow_with_audit,
            fail_on_hold,
            audit_dir,
        } => {
            commands::propose::execute(commands::propose::ProposeOptions {
                json,
                policy,
                gate_mode,
                allow_with_audit,
                fail_on_hold,
                audit_dir,
            })
            .await
        },
        Commands::Eval {
            command,
            args,
            policy,
        } => commands::eval::execute(&command, &args, &policy),
        Commands::Policy { command } => match command {
            PolicyCommands::Lint { policy } => commands::policy::lint_policy(&policy),
        },
    };

    ExitCode::from(u8::try_from(code.clamp(0, 255)).unwrap_or(1))
}
