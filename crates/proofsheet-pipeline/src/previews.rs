//! Locally displayable preview handles.
//!
//! Every item owns one handle from `add` until the pipeline releases it
//! (cancel-all or destroy). Factories can back handles with anything that
//! needs explicit cleanup, e.g. temporary thumbnails.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use proofsheet_core::{PreviewHandle, SourceFile};
use uuid::Uuid;

pub trait PreviewFactory: Send + Sync {
    fn create(&self, file: &SourceFile) -> PreviewHandle;

    fn release(&self, handle: &PreviewHandle);
}

/// Hands out `file://` URIs for path-backed files and `preview://` URIs for
/// in-memory ones, tracking which handles are still live.
#[derive(Default)]
pub struct LocalPreviews {
    live: Mutex<HashMap<String, usize>>,
}

impl LocalPreviews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles created and not yet released.
    pub fn live_count(&self) -> usize {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    pub fn is_live(&self, handle: &PreviewHandle) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(handle.uri())
    }
}

impl PreviewFactory for LocalPreviews {
    fn create(&self, file: &SourceFile) -> PreviewHandle {
        let uri = match &file.path {
            Some(path) => format!("file://{}", path.display()),
            None => format!("preview://{}/{}", Uuid::new_v4().simple(), file.name),
        };
        *self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(uri.clone())
            .or_insert(0) += 1;
        PreviewHandle::new(uri)
    }

    fn release(&self, handle: &PreviewHandle) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = live.get_mut(handle.uri()) {
            *count -= 1;
            if *count == 0 {
                live.remove(handle.uri());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_handles_are_unique() {
        let previews = LocalPreviews::new();
        let file = SourceFile::new("a.jpg", vec![1u8]);
        let a = previews.create(&file);
        let b = previews.create(&file);
        assert_ne!(a, b);
        assert!(a.uri().starts_with("preview://"));
        assert!(a.uri().ends_with("/a.jpg"));
        assert_eq!(previews.live_count(), 2);
    }

    #[test]
    fn path_handles_are_refcounted() {
        let previews = LocalPreviews::new();
        let file = SourceFile::new("a.jpg", vec![1u8]).with_path("/photos/a.jpg");
        let a = previews.create(&file);
        let b = previews.create(&file);
        assert_eq!(a.uri(), "file:///photos/a.jpg");
        assert_eq!(previews.live_count(), 2);

        previews.release(&a);
        assert!(previews.is_live(&b));
        previews.release(&b);
        assert!(!previews.is_live(&b));
        assert_eq!(previews.live_count(), 0);
    }

    #[test]
    fn releasing_unknown_handle_is_harmless() {
        let previews = LocalPreviews::new();
        previews.release(&PreviewHandle::new("preview://nope"));
        assert_eq!(previews.live_count(), 0);
    }
}
