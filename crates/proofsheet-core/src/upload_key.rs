//! Idempotency keys for preview uploads.
//!
//! The key is a pure function of stable inputs so that every retry of the same
//! file in the same batch presents the same key, letting the receiving service
//! deduplicate a retried upload that actually succeeded the first time.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of the hex-encoded key sent to the upload service.
pub const UPLOAD_KEY_LEN: usize = 32;

pub fn derive_upload_key(gallery_id: Uuid, batch_id: Uuid, filename: &str, size: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(gallery_id.as_bytes());
    hasher.update(batch_id.as_bytes());
    hasher.update(filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(size.to_be_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..UPLOAD_KEY_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic() {
        let gallery = Uuid::new_v4();
        let batch = Uuid::new_v4();
        let a = derive_upload_key(gallery, batch, "IMG_0001.jpg", 1024);
        let b = derive_upload_key(gallery, batch, "IMG_0001.jpg", 1024);
        assert_eq!(a, b);
        assert_eq!(a.len(), UPLOAD_KEY_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn key_changes_with_any_input() {
        let gallery = Uuid::new_v4();
        let batch = Uuid::new_v4();
        let base = derive_upload_key(gallery, batch, "IMG_0001.jpg", 1024);
        assert_ne!(base, derive_upload_key(gallery, batch, "IMG_0001.jpg", 1025));
        assert_ne!(base, derive_upload_key(gallery, batch, "IMG_0002.jpg", 1024));
        assert_ne!(base, derive_upload_key(gallery, Uuid::new_v4(), "IMG_0001.jpg", 1024));
        assert_ne!(base, derive_upload_key(Uuid::new_v4(), batch, "IMG_0001.jpg", 1024));
    }
}
