//! Trust anchor store gating the TLS handshake.
//!
//! Anchors are loaded from PEM files and swapped in atomically: a load
//! that fails for any reason leaves the previously configured anchors
//! in place. Each connection attempt takes a snapshot at handshake
//! time, so replacing the anchors never affects an attempt already in
//! flight.

use std::{
    fs::File,
    io::BufReader,
    path::Path,
    sync::{Arc, RwLock},
};

use rustls::RootCertStore;
use tether_core::ClientError;

/// Shared, swappable set of TLS trust anchors.
///
/// Starts empty. An empty store fails every handshake, matching a
/// client that has not been told which certificate authority to trust.
pub struct TrustStore {
    anchors: RwLock<Arc<RootCertStore>>,
}

impl Default for TrustStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustStore {
    /// Create a store with no trust anchors.
    #[must_use]
    pub fn new() -> Self {
        Self { anchors: RwLock::new(Arc::new(RootCertStore::empty())) }
    }

    /// Replace the anchors with the certificates in a PEM file.
    ///
    /// The swap is all-or-nothing: an unreadable file, unparseable PEM,
    /// or a file yielding zero usable certificates leaves the current
    /// anchors untouched.
    ///
    /// # Errors
    ///
    /// `ClientError::Config` describing why the file was rejected.
    pub fn set_ca_file(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ClientError::Config(format!("cannot open CA file {}: {e}", path.display()))
        })?;

        let mut reader = BufReader::new(file);
        let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>().map_err(
            |e| ClientError::Config(format!("cannot parse CA file {}: {e}", path.display())),
        )?;

        let mut store = RootCertStore::empty();
        let (added, ignored) = store.add_parsable_certificates(certs);
        if added == 0 {
            return Err(ClientError::Config(format!(
                "no usable certificates in CA file {}",
                path.display()
            )));
        }
        if ignored > 0 {
            tracing::warn!(path = %path.display(), ignored, "skipped unparsable certificates");
        }

        tracing::info!(path = %path.display(), anchors = added, "trust anchors replaced");
        *self.write_guard() = Arc::new(store);
        Ok(())
    }

    /// Snapshot of the current anchors for one handshake.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.anchors.read().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    /// Whether no anchors are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Arc<RootCertStore>> {
        self.anchors.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore").field("anchors", &self.snapshot().len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn ca_pem() -> String {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(Vec::new()).unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn starts_empty() {
        let store = TrustStore::new();
        assert!(store.is_empty());
    }

    #[test]
    fn missing_file_leaves_store_unchanged() {
        let store = TrustStore::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ca_pem().as_bytes()).unwrap();
        store.set_ca_file(file.path()).unwrap();
        let before = store.snapshot();

        let result = store.set_ca_file("/nonexistent/ca.pem");
        assert!(matches!(result, Err(ClientError::Config(_))));
        assert_eq!(store.snapshot().len(), before.len());
    }

    #[test]
    fn garbage_pem_rejected() {
        let store = TrustStore::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a certificate").unwrap();

        let result = store.set_ca_file(file.path());
        assert!(matches!(result, Err(ClientError::Config(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn valid_ca_file_replaces_anchors() {
        let store = TrustStore::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ca_pem().as_bytes()).unwrap();

        store.set_ca_file(file.path()).unwrap();
        assert_eq!(store.snapshot().len(), 1);

        // A second load replaces rather than appends.
        let mut other = tempfile::NamedTempFile::new().unwrap();
        other.write_all(ca_pem().as_bytes()).unwrap();
        store.set_ca_file(other.path()).unwrap();
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn snapshot_is_stable_across_replacement() {
        let store = TrustStore::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ca_pem().as_bytes()).unwrap();
        store.set_ca_file(file.path()).unwrap();

        let snapshot = store.snapshot();
        let mut other = tempfile::NamedTempFile::new().unwrap();
        other.write_all(ca_pem().as_bytes()).unwrap();
        store.set_ca_file(other.path()).unwrap();

        // The handshake that took the snapshot keeps using it.
        assert_eq!(snapshot.len(), 1);
    }
}
