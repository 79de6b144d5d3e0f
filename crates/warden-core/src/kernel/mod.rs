//! Execution kernel: the seven-step verification chain and the sole
//! process-spawn site.
//!
//! Every process this gate ever launches is launched from one function in
//! this module, and that function demands a [`SpawnAuthorization`]: a
//! module-private proof value constructed in exactly one place, after the
//! last verification step. There is no other path to the spawn primitive.
//!
//! The chain runs in fixed order, each step independent of the next:
//!
//! 1. TTL: the token has not expired.
//! 2. Decision gate: the token carries ALLOW.
//! 3. Replay: the token identifier is not in the registry. Checked
//!    before any expensive recomputation.
//! 4. Proposal binding: the presented proposal (and the argv about to be
//!    spawned) hashes to the token's binding.
//! 5. Policy binding: the policy file on disk still hashes to the
//!    token's binding.
//! 6. Environment binding: the host identity still fingerprints to the
//!    token's binding.
//! 7. Signature: the token verifies under its embedded ephemeral key.
//!
//! On success the token is marked used *before* the spawn, so a crash or
//! hang between the two cannot open a replay window. On failure the
//! kernel emits an `executed=false` audit record and raises the typed
//! denial; it never falls back to an alternative path.

use std::path::Path;
use std::process::Stdio;

use chrono::Utc;
use ed25519_dalek::{Signature, VerifyingKey};
use subtle::ConstantTimeEq as _;
use tokio::process::Command;

use crate::denial::Denial;
use crate::fingerprint::{EnvironmentProfile, environment_fingerprint};
use crate::policy::hash_policy_file;
use crate::proposal::CanonicalProposal;
use crate::registry::{AuditEvent, TokenRegistry, UsedTokenRecord};
use crate::token::{Decision, VerifiedToken};


/// Exit code reported when the verified command cannot be spawned
/// (missing binary, permission failure). Matches the shell convention for
/// "command not found".
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// The result of a verified, executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    /// The child's exit code. Signal deaths map to `1`.
    pub exit_code: i32,
    /// The consumed token.
    pub token_id: crate::ident::TokenId,
    /// Audit reference shared with the attempt's records.
    pub audit_ref: crate::ident::AuditRef,
    /// Always `true` on a receipt; denials never produce one.
    pub executed: bool,
}

/// Proof that all seven verification steps passed for one presentation.
///
/// Private to this module and constructed at exactly one site. The spawn
/// primitive consumes it by value, so no verification means no spawn.
struct SpawnAuthorization(());

/// The execution kernel.
///
/// Holds the environment profile it re-derives fingerprints under; the
/// profile must match the issuing pipeline's or step 6 refuses.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionKernel {
    profile: EnvironmentProfile,
}

impl ExecutionKernel {
    /// Creates a kernel re-deriving fingerprints under `profile`.
    #[must_use]
    pub const fn new(profile: EnvironmentProfile) -> Self {
        Self { profile }
    }

    /// Verifies a token against its proposal and, on success, spawns the
    /// command exactly once and awaits its exit.
    ///
    /// # Errors
    ///
    /// Returns the typed [`Denial`] of the first failing verification
    /// step. The spawn primitive is not reached on any denial path.
    pub async fn execute(
        &self,
        registry: &mut TokenRegistry,
        command: &str,
        args: &[String],
        proposal: &CanonicalProposal,
        token: &VerifiedToken,
    ) -> Result<ExecutionReceipt, Denial> {
        let authorization =
            match self.verify(registry, command, args, proposal, token) {
                Ok(authorization) => authorization,
                Err(denial) => {
                    registry.append_audit(&denial_event(token, &denial));
                    tracing::warn!(
                        command,
                        error_type = denial.error_type(),
                        "kernel verification failed"
                    );
                    return Err(denial);
                },
            };

        // Replay is blocked from this point on, even if the spawn below
        // hangs or this process dies.
        registry.mark_used(&UsedTokenRecord {
            token_id: token.token_id.clone(),
            used_at: Utc::now(),
            audit_ref: token.audit_ref.clone(),
            proposal_hash: token.proposal_hash.clone(),
            policy_hash: token.policy_hash.clone(),
            env_fingerprint: token.environment_fingerprint.clone(),
            command: command.to_string(),
            scope: token.scope.clone(),
            guard_version: proposal.guard_version.clone(),
            expires_at: token.expires_at,
        });
        registry.append_audit(&executed_event(token));

        let exit_code = match spawn_gated(authorization, command, args).await {
            Ok(status) => status.code().unwrap_or(1),
            Err(e) => {
                tracing::error!(command, error = %e, "spawn failed after verification");
                SPAWN_FAILURE_EXIT_CODE
            },
        };

        Ok(ExecutionReceipt {
            exit_code,
            token_id: token.token_id.clone(),
            audit_ref: token.audit_ref.clone(),
            executed: true,
        })
    }

    /// The seven-step chain. Produces the spawn proof or the first typed
    /// denial.
    fn verify(
        &self,
        registry: &TokenRegistry,
        command: &str,
        args: &[String],
        proposal: &CanonicalProposal,
        token: &VerifiedToken,
    ) -> Result<SpawnAuthorization, Denial> {
        // Step 1: TTL.
        if token.is_expired(Utc::now()) {
            return Err(Denial::TokenExpired {
                expires_at: token.expires_at.to_rfc3339(),
            });
        }

        // Step 2: decision gate.
        if token.decision != Decision::Allow {
            return Err(Denial::DecisionNotAllow {
                decision: token.decision.as_str().to_string(),
            });
        }

        // Step 3: replay. Before all recomputation.
        if registry.is_used(&token.token_id) {
            return Err(Denial::TokenReplayed {
                token_id: token.token_id.to_string(),
            });
        }

        // Step 4: proposal binding. The argv about to be spawned must be
        // the argv inside the verified proposal; anything else would let
        // a caller swap the vector after binding.
        if command != proposal.command || args != proposal.args.as_slice() {
            return Err(Denial::ProposalHashMismatch);
        }
        let recomputed = proposal
            .canonical_hash()
            .map_err(|_| Denial::ProposalHashMismatch)?;
        if !hashes_match(&recomputed, &token.proposal_hash) {
            return Err(Denial::ProposalHashMismatch);
        }

        // Step 5: policy binding. Detects policy edits after issuance.
        let policy_path = Path::new(&proposal.policy_path);
        let policy_hash = hash_policy_file(policy_path);
        if !hashes_match(&policy_hash, &token.policy_hash) {
            return Err(Denial::PolicyHashMismatch);
        }

        // Step 6: environment binding.
        let fingerprint = environment_fingerprint(policy_path, self.profile)
            .map_err(|_| Denial::EnvFingerprintMismatch)?;
        if !hashes_match(&fingerprint, &token.environment_fingerprint) {
            return Err(Denial::EnvFingerprintMismatch);
        }

        // Step 7: signature, over the reconstructed canonical payload.
        verify_signature(token)?;

        Ok(SpawnAuthorization(()))
    }
}

/// Constant-time comparison of two hex digests.
fn hashes_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

fn verify_signature(token: &VerifiedToken) -> Result<(), Denial> {
    let invalid = |reason: &str| Denial::SignatureInvalid {
        reason: reason.to_string(),
    };

    let key_bytes: [u8; 32] = hex::decode(&token.public_key_hex)
        .map_err(|_| invalid("public key is not hex"))?
        .try_into()
        .map_err(|_| invalid("public key has wrong length"))?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| invalid("public key is malformed"))?;

    let sig_bytes: [u8; 64] = hex::decode(&token.issuer_signature)
        .map_err(|_| invalid("signature is not hex"))?
        .try_into()
        .map_err(|_| invalid("signature has wrong length"))?;
    let signature = Signature::from_bytes(&sig_bytes);

    let payload = token
        .signing_payload()
        .map_err(|_| invalid("payload reconstruction failed"))?;

    verifying_key
        .verify_strict(&payload, &signature)
        .map_err(|_| invalid("verification failed"))
}

/// The sole spawn site.
///
/// Shell interpretation is disabled by construction: the executable and
/// argv are passed verbatim to the OS, standard streams are inherited,
/// and no string ever reaches a shell.
async fn spawn_gated(
    _proof: SpawnAuthorization,
    command: &str,
    args: &[String],
) -> std::io::Result<std::process::ExitStatus> {
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()?;
    child.wait().await
}

fn denial_event(token: &VerifiedToken, denial: &Denial) -> AuditEvent {
    AuditEvent {
        decision: token.decision.as_str().to_string(),
        proposal_hash: token.proposal_hash.clone(),
        token_id: Some(token.token_id.clone()),
        policy_hash: token.policy_hash.clone(),
        environment_fingerprint: token.environment_fingerprint.clone(),
        reason: denial.to_string(),
        executed: false,
        error_type: Some(denial.error_type().to_string()),
        time: Utc::now(),
    }
}

fn executed_event(token: &VerifiedToken) -> AuditEvent {
    AuditEvent {
        decision: token.decision.as_str().to_string(),
        proposal_hash: token.proposal_hash.clone(),
        token_id: Some(token.token_id.clone()),
        policy_hash: token.policy_hash.clone(),
        environment_fingerprint: token.environment_fingerprint.clone(),
        reason: "all verifications passed".to_string(),
        executed: true,
        error_type: None,
        time: Utc::now(),
    }
}
