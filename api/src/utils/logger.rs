use sentry::{types::Dsn, ClientInitGuard, ClientOptions, SessionMode};
use std::{borrow::Cow, env, str::FromStr};
use tracing_subscriber::{
    prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

const DEFAULT_FILTER: &str = "api=info,docchat=info,tower_http=info";

/// Installs the log subscriber.
///
/// Errors are forwarded to Sentry only when `$SENTRY_DSN` is set; the returned guard
/// flushes them on shutdown.
pub fn setup() -> Option<ClientInitGuard> {
    let guard = env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init(ClientOptions {
            dsn: Some(Dsn::from_str(&dsn).expect("Invalid Sentry DSN")),
            attach_stacktrace: true,
            session_mode: SessionMode::Request,
            release: Some(Cow::Borrowed(env!("STATIC_BUILD_DATE"))),
            ..ClientOptions::default()
        })
    });

    tracing_subscriber::registry()
        .with(sentry_tracing::layer())
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
            ),
        )
        .init();

    guard
}
