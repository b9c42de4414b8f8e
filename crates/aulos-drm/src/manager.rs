use std::{pin::pin, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::{
    helper::parse_pssh,
    license::{LicenseClient, LicenseTransport, TokenSource},
    session::{DecryptSession, KeyDigest, SessionState, Slot},
    DrmError, DrmOptions, DrmResult, DrmSystem,
};

/// What a `create_session` caller must do after the slot lookup.
enum Role {
    /// This caller owns the license acquisition.
    Owner,
    /// Someone else is acquiring; wait on the slot.
    Waiter(Arc<Notify>),
    /// Session already ready.
    Ready(DecryptSession),
    /// Key previously failed; short-circuit.
    Failed(String),
}

/// Bounded pool of DRM decrypt sessions keyed by content-key digest.
///
/// One instance per player session. The slot table is guarded by a
/// single mutex for selection bookkeeping; license acquisition and
/// decryption run outside it.
pub struct DrmSessionManager<T> {
    license: LicenseClient<T>,
    slots: Mutex<Vec<Slot>>,
    pool_size: usize,
    decrypt_wait: Duration,
    /// Cancels decrypt/creation waits without tearing down downloads.
    key_wait_cancel: CancellationToken,
}

impl<T: LicenseTransport> DrmSessionManager<T> {
    pub fn new(transport: T, opts: DrmOptions) -> Self {
        let pool_size = opts.pool_size.max(1);
        let decrypt_wait = opts.decrypt_wait;

        Self {
            license: LicenseClient::new(transport, opts),
            slots: Mutex::new(Vec::new()),
            pool_size,
            decrypt_wait,
            key_wait_cancel: CancellationToken::new(),
        }
    }

    /// Token that releases every key wait when cancelled (player
    /// teardown path).
    pub fn key_wait_cancel(&self) -> CancellationToken {
        self.key_wait_cancel.clone()
    }

    /// Mark the slot backing the current playback position, protecting
    /// it from eviction.
    pub fn set_primary(&self, key: &KeyDigest, primary: bool) {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if slot.key == *key {
                slot.primary = primary;
            } else if primary {
                // At most one primary slot at a time.
                slot.primary = false;
            }
        }
    }

    /// Forget a failed key so a later `create_session` may retry it.
    pub fn reset(&self, key: &KeyDigest) {
        let mut slots = self.slots.lock();
        slots.retain(|slot| !(slot.key == *key && slot.state.is_failed()));
    }

    /// Current `(key, state)` pairs, oldest first. Test/telemetry hook.
    pub fn slot_states(&self) -> Vec<(KeyDigest, SessionState)> {
        self.slots
            .lock()
            .iter()
            .map(|slot| (slot.key, slot.state))
            .collect()
    }

    /// Get or create the decrypt session for a key-metadata blob.
    ///
    /// Concurrent calls with the same blob produce exactly one license
    /// request; every caller receives the same session once it is ready.
    pub async fn create_session(
        &self,
        init_data: &[u8],
        token_source: Option<&dyn TokenSource>,
    ) -> DrmResult<DecryptSession> {
        let pssh = parse_pssh(init_data)?;
        let system = pssh.system;
        let key = KeyDigest::from_blob(init_data);

        match self.claim(key, system)? {
            Role::Ready(session) => Ok(session),
            Role::Failed(detail) => Err(DrmError::SessionFailed {
                key: format!("{key}: {detail}"),
            }),
            Role::Waiter(notify) => {
                self.wait_for_slot(key, system, notify, system.key_process_timeout())
                    .await
            }
            Role::Owner => self.acquire_license(key, system, &pssh, token_source).await,
        }
    }

    /// Slot lookup / allocation under the table lock.
    fn claim(&self, key: KeyDigest, system: DrmSystem) -> DrmResult<Role> {
        let mut slots = self.slots.lock();

        if let Some(slot) = slots.iter().find(|slot| slot.key == key) {
            return Ok(match slot.state {
                SessionState::Ready => {
                    let material = slot.key_material.ok_or(DrmError::EmptySessionId)?;
                    Role::Ready(DecryptSession::new(key, system, material))
                }
                state if state.is_failed() => Role::Failed(
                    slot.error_detail
                        .clone()
                        .unwrap_or_else(|| format!("{state:?}")),
                ),
                _ => Role::Waiter(slot.notify.clone()),
            });
        }

        if slots.len() >= self.pool_size {
            // Evict the oldest non-primary slot that is not mid-flight.
            let victim = slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| !slot.primary && !slot.state.is_in_flight())
                .min_by_key(|(_, slot)| slot.created_at)
                .map(|(i, _)| i);

            match victim {
                Some(index) => {
                    let evicted = slots.remove(index);
                    debug!(
                        evicted_key = %evicted.key,
                        new_key = %key,
                        "drm: evicting oldest non-primary session slot"
                    );
                }
                None => return Err(DrmError::PoolExhausted),
            }
        }

        slots.push(Slot::new(key, system));
        debug!(key = %key, system = system.name(), "drm: session slot allocated");
        Ok(Role::Owner)
    }

    /// Run the license exchange as the slot owner and publish the
    /// outcome.
    async fn acquire_license(
        &self,
        key: KeyDigest,
        system: DrmSystem,
        pssh: &crate::PsshData,
        token_source: Option<&dyn TokenSource>,
    ) -> DrmResult<DecryptSession> {
        self.set_state(key, SessionState::Pending, None);

        let outcome = self.run_license_exchange(system, pssh, token_source).await;

        match outcome {
            Ok(material) => {
                self.set_state(key, SessionState::Ready, None);
                self.set_material(key, material);
                debug!(key = %key, "drm: session ready");
                Ok(DecryptSession::new(key, system, material))
            }
            Err(error) => {
                let state = match error {
                    DrmError::KeyAcquisitionTimeout => SessionState::KeyAcquisitionTimedOut,
                    DrmError::EmptySessionId => SessionState::EmptySessionIdError,
                    _ => SessionState::Error,
                };
                warn!(key = %key, error = %error, "drm: session creation failed");
                self.set_state(key, state, Some(error.to_string()));
                Err(error)
            }
        }
    }

    async fn run_license_exchange(
        &self,
        system: DrmSystem,
        pssh: &crate::PsshData,
        token_source: Option<&dyn TokenSource>,
    ) -> DrmResult<[u8; 16]> {
        let challenge = system.generate_license_request(pssh)?;
        let url = match challenge.url.clone() {
            Some(url) => url,
            None => self.license_url(system)?,
        };

        let body = self
            .license
            .acquire(url, &challenge, token_source, None)
            .await?;

        system.transform_license_response(body)
    }

    fn license_url(&self, system: DrmSystem) -> DrmResult<Url> {
        self.license
            .options()
            .license_servers
            .get(&system)
            .cloned()
            .ok_or_else(|| DrmError::MissingLicenseServer(system.name().to_string()))
    }

    fn set_state(&self, key: KeyDigest, state: SessionState, detail: Option<String>) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.iter_mut().find(|slot| slot.key == key) {
            slot.state = state;
            if detail.is_some() {
                slot.error_detail = detail;
            }
            slot.notify.notify_waiters();
        }
    }

    fn set_material(&self, key: KeyDigest, material: [u8; 16]) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.iter_mut().find(|slot| slot.key == key) {
            slot.key_material = Some(material);
            slot.notify.notify_waiters();
        }
    }

    /// Wait for another caller's in-flight creation to settle.
    async fn wait_for_slot(
        &self,
        key: KeyDigest,
        system: DrmSystem,
        notify: Arc<Notify>,
        timeout: Duration,
    ) -> DrmResult<DecryptSession> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register for the notification before inspecting state so a
            // wakeup between check and await is not lost.
            let mut notified = pin!(notify.notified());
            notified.as_mut().enable();

            {
                let slots = self.slots.lock();
                if let Some(slot) = slots.iter().find(|slot| slot.key == key) {
                    match slot.state {
                        SessionState::Ready => {
                            let material = slot.key_material.ok_or(DrmError::EmptySessionId)?;
                            return Ok(DecryptSession::new(key, system, material));
                        }
                        state if state.is_failed() => {
                            return Err(DrmError::SessionFailed {
                                key: format!("{key}: {state:?}"),
                            });
                        }
                        _ => {}
                    }
                } else {
                    // Slot evicted while waiting; treat as failed.
                    return Err(DrmError::SessionFailed {
                        key: format!("{key}: slot evicted"),
                    });
                }
            }

            tokio::select! {
                () = &mut notified => {}
                () = self.key_wait_cancel.cancelled() => return Err(DrmError::Cancelled),
                () = tokio::time::sleep_until(deadline) => {
                    self.set_state(key, SessionState::KeyAcquisitionTimedOut, None);
                    return Err(DrmError::KeyAcquisitionTimeout);
                }
            }
        }
    }

    /// Decrypt a fragment under the session for `init_data`'s key.
    ///
    /// Waits (bounded by `decrypt_wait`, cancellable via the key-wait
    /// token) while the session is still pending.
    pub async fn decrypt(
        &self,
        init_data: &[u8],
        data: &[u8],
        iv: &[u8; 16],
    ) -> DrmResult<Vec<u8>> {
        let key = KeyDigest::from_blob(init_data);
        let system_and_notify = {
            let slots = self.slots.lock();
            let slot = slots
                .iter()
                .find(|slot| slot.key == key)
                .ok_or(DrmError::SessionFailed {
                    key: format!("{key}: no session"),
                })?;

            match slot.state {
                SessionState::Ready => {
                    let material = slot.key_material.ok_or(DrmError::EmptySessionId)?;
                    return DecryptSession::new(key, slot.system, material).decrypt(data, iv);
                }
                state if state.is_failed() => {
                    return Err(DrmError::SessionFailed {
                        key: format!("{key}: {state:?}"),
                    });
                }
                _ => (slot.system, slot.notify.clone()),
            }
        };

        let (system, notify) = system_and_notify;
        let session = self
            .wait_for_slot(key, system, notify, self.decrypt_wait)
            .await?;
        session.decrypt(data, iv)
    }
}
