// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Cached JWK set
//!
//! [`PublicKeyProvider`] fetches a JSON Web Key Set once on construction and
//! then refreshes it in the background. A failed refresh keeps serving the
//! last good set.

use std::{future::Future, sync::Arc, time::Duration};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::Client;
use tokio::{
    sync::RwLock,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::JwkError;

/// Source of verification keys
pub trait KeyProvider: Send + Sync {
    /// Current key set
    ///
    /// # Errors
    ///
    /// Returns an error if no key set is available
    fn get_key_set(&self) -> impl Future<Output = Result<Arc<JwkSet>, JwkError>> + Send;

    /// Stop any background work
    fn close(&self);
}

/// Key set fetched from a URL and refreshed on an interval
#[derive(Debug)]
pub struct PublicKeyProvider {
    url: Url,
    keys: Arc<RwLock<Arc<JwkSet>>>,
    cancellation_token: CancellationToken,
}

impl PublicKeyProvider {
    /// Fetch the key set at `url` and refresh it every `refresh_interval`
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the interval is zero or the first
    /// fetch fails. Nothing keeps running in that case.
    pub async fn new(url: &str, refresh_interval: Duration) -> Result<Self, JwkError> {
        Self::with_client(Client::new(), url, refresh_interval).await
    }

    /// Same as [`PublicKeyProvider::new`] with a caller-configured HTTP client
    ///
    /// # Errors
    ///
    /// See [`PublicKeyProvider::new`].
    pub async fn with_client(
        client: Client,
        url: &str,
        refresh_interval: Duration,
    ) -> Result<Self, JwkError> {
        let url = Url::parse(url).map_err(|source| JwkError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        if refresh_interval.is_zero() {
            return Err(JwkError::InvalidInterval);
        }

        let initial = fetch(&client, &url).await?;
        let keys = Arc::new(RwLock::new(Arc::new(initial)));
        let cancellation_token = CancellationToken::new();

        tokio::spawn(refresh_loop(
            client,
            url.clone(),
            refresh_interval,
            Arc::clone(&keys),
            cancellation_token.child_token(),
        ));

        Ok(Self {
            url,
            keys,
            cancellation_token,
        })
    }

    /// Key with the given `kid`, if the current set has one
    ///
    /// # Errors
    ///
    /// Returns `JwkError::Closed` once the provider is closed.
    pub async fn get_key(&self, kid: &str) -> Result<Option<Jwk>, JwkError> {
        let set = self.get_key_set().await?;
        Ok(set.find(kid).cloned())
    }

    /// Where the key set is fetched from
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl KeyProvider for PublicKeyProvider {
    async fn get_key_set(&self) -> Result<Arc<JwkSet>, JwkError> {
        if self.cancellation_token.is_cancelled() {
            return Err(JwkError::Closed);
        }
        Ok(Arc::clone(&*self.keys.read().await))
    }

    fn close(&self) {
        self.cancellation_token.cancel();
    }
}

impl Drop for PublicKeyProvider {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

async fn fetch(client: &Client, url: &Url) -> Result<JwkSet, JwkError> {
    let to_error = |source| JwkError::Fetch {
        url: url.to_string(),
        source,
    };

    client
        .get(url.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(to_error)?
        .json::<JwkSet>()
        .await
        .map_err(to_error)
}

async fn refresh_loop(
    client: Client,
    url: Url,
    refresh_interval: Duration,
    keys: Arc<RwLock<Arc<JwkSet>>>,
    cancellation_token: CancellationToken,
) {
    let mut ticker = interval(refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately and the set was just fetched
    ticker.tick().await;

    loop {
        if cancellation_token
            .run_until_cancelled(ticker.tick())
            .await
            .is_none()
        {
            break;
        }
        // a hung endpoint must not outlive close()
        let Some(fetched) = cancellation_token
            .run_until_cancelled(fetch(&client, &url))
            .await
        else {
            break;
        };
        match fetched {
            Ok(set) => {
                debug!(%url, keys = set.keys.len(), "refreshed JWK set");
                *keys.write().await = Arc::new(set);
            }
            Err(err) => warn!(%url, error = %err, "JWK refresh failed, keeping the previous set"),
        }
    }

    debug!(%url, "JWK refresh stopped");
}
