//! Session management.
//!
//! Sessions live in Redis when `session.store_url` is set, in memory
//! otherwise. Cookies are signed with a key derived from the site's session
//! secret.

use anyhow::{Context, Result};
use axum::Router;
use fred::prelude::*;
use sha2::{Digest, Sha512};
use tower_sessions::cookie::time::Duration;
use tower_sessions::cookie::{Key, SameSite};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, SessionStore};
use tower_sessions_redis_store::RedisStore;
use tracing::info;

use crate::config::SessionSettings;

/// Session key for the authenticated user name.
pub const SESSION_USER: &str = "user";

/// Session key for the page to return to after logging in.
pub const SESSION_AFTER_LOGIN: &str = "after_login";

/// Derive the 64-byte cookie signing key from the session secret.
pub fn signing_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// Wrap `router` in the configured session layer.
pub async fn apply_session_layer(
    router: Router,
    settings: &SessionSettings,
    secret: &str,
) -> Result<Router> {
    let key = signing_key(secret);
    match &settings.store_url {
        Some(url) => {
            let store = redis_store(url).await?;
            info!(cookie = %settings.key, "sessions stored in redis");
            Ok(router.layer(configure(SessionManagerLayer::new(store), settings).with_signed(key)))
        }
        None => {
            info!(cookie = %settings.key, "sessions stored in memory");
            Ok(router.layer(
                configure(SessionManagerLayer::new(MemoryStore::default()), settings)
                    .with_signed(key),
            ))
        }
    }
}

async fn redis_store(redis_url: &str) -> Result<RedisStore<Pool>> {
    let config = Config::from_url(redis_url).context("failed to parse Redis URL")?;

    let pool = Builder::from_config(config)
        .build_pool(1)
        .context("failed to create Redis pool")?;

    pool.init()
        .await
        .context("failed to connect to Redis for sessions")?;

    Ok(RedisStore::new(pool))
}

fn configure<S: SessionStore>(
    layer: SessionManagerLayer<S>,
    settings: &SessionSettings,
) -> SessionManagerLayer<S> {
    let cookie = &settings.cookie;
    let same_site = match cookie.same_site.as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    };
    let expiry = match cookie.max_age {
        Some(seconds) => Expiry::OnInactivity(Duration::seconds(seconds)),
        None => Expiry::OnSessionEnd,
    };

    layer
        .with_name(settings.key.clone())
        .with_http_only(cookie.http_only)
        .with_secure(cookie.secure)
        .with_path(cookie.path.clone())
        .with_same_site(same_site)
        .with_expiry(expiry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_is_stable_per_secret() {
        let a = signing_key("battery staple");
        let b = signing_key("battery staple");
        let c = signing_key("correct horse");
        assert_eq!(a.master(), b.master());
        assert_ne!(a.master(), c.master());
    }
}
