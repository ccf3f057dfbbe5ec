//! Logging and tracing initialization.
//!
//! [`init_tracing`] wires up structured logging in one of two modes: JSON
//! with nanosecond timestamps for production aggregation, or pretty ANSI
//! output for development. Filtering follows `RUST_LOG` (e.g.
//! `RUST_LOG=coral_stream=debug`).
//!
//! A [`CredentialGuard`] layer watches recorded fields and warns when a
//! value shaped like an API key or signature is about to be logged; the
//! connectivity layer handles live credentials and a leaked secret in a
//! log shipper is unrecoverable.

use std::fmt;

use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Install the global tracing subscriber.
///
/// `json = true` selects machine-readable output; `false` selects pretty
/// output for a terminal. Panics if a global subscriber is already set.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(CredentialGuard);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_timer(UtcNanoTimer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
    }
}

/// Timer emitting RFC 3339 timestamps with nanosecond precision.
#[derive(Debug, Clone)]
struct UtcNanoTimer;

impl tracing_subscriber::fmt::time::FormatTime for UtcNanoTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.9fZ"))
    }
}

/// Field names that always count as credentials.
const CREDENTIAL_FIELDS: &[&str] = &[
    "api_key",
    "api_secret",
    "secret",
    "secret_key",
    "signature",
    "auth_sig",
    "token",
    "password",
];

/// Tracing layer that flags credential-shaped values in log fields.
#[derive(Debug, Clone)]
pub struct CredentialGuard;

impl<S> Layer<S> for CredentialGuard
where
    S: tracing::Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_new_span(
        &self,
        attrs: &span::Attributes<'_>,
        _id: &span::Id,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = CredentialVisitor::default();
        attrs.record(&mut visitor);
        if visitor.flagged {
            tracing::warn!("credential-shaped value recorded in span fields; check call site");
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = CredentialVisitor::default();
        event.record(&mut visitor);
        if visitor.flagged {
            tracing::warn!("credential-shaped value recorded in event fields; check call site");
        }
    }
}

#[derive(Default)]
struct CredentialVisitor {
    flagged: bool,
}

impl CredentialVisitor {
    /// Heuristic for key material: long, high-entropy alphanumeric or hex
    /// strings. A 64-char lowercase hex string is exactly the shape of an
    /// HMAC-SHA256 signature.
    fn looks_like_credential(value: &str) -> bool {
        if value.len() >= 40 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return true;
        }
        if value.len() >= 32 {
            let dense = value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=');
            let alnum = value.bytes().filter(|b| b.is_ascii_alphanumeric()).count();
            return dense && alnum * 100 >= value.len() * 85;
        }
        false
    }
}

impl Visit for CredentialVisitor {
    fn record_debug(&mut self, field: &Field, _value: &dyn fmt::Debug) {
        if CREDENTIAL_FIELDS.contains(&field.name()) {
            self.flagged = true;
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if CREDENTIAL_FIELDS.contains(&field.name()) || Self::looks_like_credential(value) {
            self.flagged = true;
        }
    }
}
