use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use txauth::{
    ExpiredKeyPolicy, HybridServices, SignatureEnvelope, SystemClock, TracingAuditSink,
    TxAuthConfig, UserId,
};

#[derive(Parser, Debug)]
#[command(name = "txauth", about = "Hybrid post-quantum + classical transaction signing")]
struct Cli {
    /// Overrides TXAUTH_KEY_VALIDITY_DAYS.
    #[arg(long, global = true)]
    key_validity_days: Option<u32>,
    /// Overrides TXAUTH_EXPIRED_POLICY (reject | accept-before-expiry).
    #[arg(long, global = true)]
    expired_policy: Option<ExpiredKeyPolicy>,
    /// Overrides TXAUTH_VAULT_TIMEOUT_MS.
    #[arg(long, global = true)]
    vault_timeout_ms: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a bundle, sign a payload, then verify it.
    Demo {
        #[arg(long, default_value_t = 42)]
        user: u64,
        #[arg(long, default_value = "transfer:100:acct7")]
        payload: String,
        /// Corrupt part of the envelope or payload before verifying.
        #[arg(long, value_enum)]
        tamper: Option<Tamper>,
        /// Revoke the bundle between signing and verifying.
        #[arg(long)]
        revoke: bool,
    },
    /// Generate a bundle and print its public half as JSON.
    Keygen {
        #[arg(long)]
        user: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Tamper {
    Pq,
    Classical,
    Payload,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let mut config = TxAuthConfig::from_env();
    if let Some(days) = cli.key_validity_days {
        config.key_validity_days = days;
    }
    if let Some(policy) = cli.expired_policy {
        config.expired_policy = policy;
    }
    if let Some(ms) = cli.vault_timeout_ms {
        config.vault_timeout_ms = ms;
    }

    let services = HybridServices::from_config(
        &config,
        Arc::new(SystemClock),
        None,
        Arc::new(TracingAuditSink),
    )
    .context("failed to start services")?;

    match cli.command {
        Command::Keygen { user } => {
            let bundle = services
                .vault
                .generate(UserId(user))
                .context("key generation failed")?;
            println!("{}", serde_json::to_string_pretty(&bundle)?);
        }
        Command::Demo {
            user,
            payload,
            tamper,
            revoke,
        } => demo(&services, UserId(user), payload.into_bytes(), tamper, revoke)?,
    }
    Ok(())
}

fn demo(
    services: &HybridServices,
    user: UserId,
    mut payload: Vec<u8>,
    tamper: Option<Tamper>,
    revoke: bool,
) -> Result<()> {
    let bundle = services
        .vault
        .generate(user)
        .context("key generation failed")?;
    info!(user = %user, pq_key = %bundle.pq_key_id(), classical_key = %bundle.classical_key_id(), "bundle ready");

    let mut envelope = services
        .signer
        .sign(&payload, user)
        .context("signing failed")?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    match tamper {
        Some(Tamper::Pq) => {
            let mut parts = envelope.into_parts();
            flip_last(parts.pq.bytes_mut());
            envelope = SignatureEnvelope::from_parts(parts);
        }
        Some(Tamper::Classical) => {
            let mut parts = envelope.into_parts();
            flip_last(parts.classical.bytes_mut());
            envelope = SignatureEnvelope::from_parts(parts);
        }
        Some(Tamper::Payload) => flip_last(&mut payload),
        None => {}
    }
    if revoke {
        services.vault.revoke(user).context("revocation failed")?;
    }

    let result = services
        .verifier
        .verify(&payload, &envelope, user)
        .context("verification could not run")?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn flip_last(bytes: &mut [u8]) {
    if let Some(last) = bytes.last_mut() {
        *last ^= 0x01;
    }
}
