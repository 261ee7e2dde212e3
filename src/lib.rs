//! # devicetrust (New Device Detection)
//!
//! `devicetrust` recognizes whether a user is logging in from a device or
//! browser that was seen before and emails the user when it was not.
//!
//! ## Pipeline
//!
//! 1. **Capture** runs inside the authentication flow. It stores the submitted
//!    browser fingerprint and a long-lived `DEVICE_ID` cookie value as notes on
//!    the in-progress authentication session. Capture never blocks a login; the
//!    only pause is a redirect that commits a freshly issued cookie.
//! 2. **Propagation** copies the session notes into the details of the login
//!    event once the flow completes.
//! 3. **Resolution** derives one device signature from the event: the raw
//!    fingerprint when present, otherwise a normalized User-Agent bucket. The IP
//!    address is never part of the signature.
//! 4. **Evaluation** checks the signature against the user's bounded history of
//!    known signatures (`knownDeviceSignatures`, 20 entries, oldest evicted
//!    first). Updates are compare-and-swap writes, so concurrent logins of the
//!    same user cannot drop each other's entries.
//! 5. **Notification** emails users with a verified address about the new
//!    device. Failures are logged and never affect the login.
//!
//! The `api` module exposes the pipeline as an HTTP sidecar for a host identity
//! server.

pub mod api;
pub mod cli;
pub mod device;
pub mod email;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
