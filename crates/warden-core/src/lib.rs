//! # warden-core
//!
//! Core library for warden, a deterministic, fail-closed execution gate
//! for command invocations from untrusted or semi-trusted sources (AI
//! agents, CI steps, automated pipelines).
//!
//! The gate answers one question before any process is launched: does
//! this exact command, in this exact environment, under this exact
//! policy, have cryptographically verifiable authority to execute? The
//! default is deny. There is no shell parsing, no intent inference, and
//! no globbing; only exact identity matching bound to a signed authority
//! token.
//!
//! ## Subsystems
//!
//! - **Policy evaluation** ([`policy`]): deny-by-default, fail-closed
//!   first-match rule evaluation with scope metadata.
//! - **Authority pipeline** ([`pipeline`]): builds a canonical proposal,
//!   fingerprints the environment, evaluates policy, and issues a signed
//!   time-bound token with a fresh ephemeral keypair per call.
//! - **Execution kernel** ([`kernel`]): the sole process-spawn site,
//!   guarded by a fixed seven-step verification chain with typed denials
//!   and a pre-spawn replay mark.
//! - **Pre-validation** ([`adapter`]): shell-string rejection and
//!   canonicalization for agent proposals, plus the human-approval
//!   short-circuit.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//!
//! use warden_core::fingerprint::EnvironmentProfile;
//! use warden_core::kernel::ExecutionKernel;
//! use warden_core::pipeline::{AuthorityRequest, PipelineDecision, authorize};
//! use warden_core::registry::TokenRegistry;
//!
//! # async fn example() {
//! let mut registry = TokenRegistry::open(&PathBuf::from(".warden"));
//! let kernel = ExecutionKernel::new(EnvironmentProfile::Minimal);
//!
//! let request = AuthorityRequest::new(
//!     "echo",
//!     vec!["hello".to_string()],
//!     PathBuf::from("policy.yaml"),
//! );
//! let outcome = authorize(&request, &registry);
//!
//! if outcome.decision == PipelineDecision::Allow {
//!     let (proposal, token) = (outcome.proposal.unwrap(), outcome.token.unwrap());
//!     let receipt = kernel
//!         .execute(&mut registry, "echo", &["hello".to_string()], &proposal, &token)
//!         .await
//!         .unwrap();
//!     assert_eq!(receipt.exit_code, 0);
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod adapter;
pub mod canonical;
pub mod denial;
pub mod fingerprint;
pub mod ident;
pub mod kernel;
pub mod pipeline;
pub mod policy;
pub mod proposal;
pub mod registry;
pub mod scope;
pub mod token;

pub use adapter::{AgentProposal, GateConfig, GateOutcome, gate, prevalidate, reject_shell_strings};
pub use denial::Denial;
pub use fingerprint::EnvironmentProfile;
pub use kernel::{ExecutionKernel, ExecutionReceipt};
pub use pipeline::{AuthorityRequest, PipelineDecision, PipelineOutcome, authorize};
pub use policy::{PolicyDecision, Verdict};
pub use proposal::{CanonicalProposal, GUARD_VERSION, build_proposal};
pub use registry::TokenRegistry;
pub use scope::{MemoryTokenStore, ScopeClass, TokenStore};
pub use token::{Decision, GateMode, VerifiedToken};
