//! SRTP/SRTCP protect and unprotect hooks.
//!
//! The cryptography itself lives outside this crate (keys come from the
//! DTLS handshake). A stream only needs four functions that transform a
//! packet buffer in place and report a numeric status, `0` meaning success,
//! in the style of `srtp_protect` / `srtp_unprotect`.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::format::MediaKind;

/// In-place packet transform returning `0` on success.
pub type SecurityHook = Arc<dyn Fn(&mut Vec<u8>) -> i32 + Send + Sync>;

/// A protect/unprotect hook reported a non-zero status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("SRTP hook failed with result {code}")]
pub struct SecurityError {
    pub code: i32,
}

fn apply(hook: &SecurityHook, buf: &mut Vec<u8>) -> Result<(), SecurityError> {
    match hook(buf) {
        0 => Ok(()),
        code => Err(SecurityError { code }),
    }
}

/// The four hooks for one stream.
#[derive(Clone)]
pub struct SecurityContext {
    protect_rtp: SecurityHook,
    unprotect_rtp: SecurityHook,
    protect_rtcp: SecurityHook,
    unprotect_rtcp: SecurityHook,
}

impl SecurityContext {
    pub fn new(
        protect_rtp: SecurityHook,
        unprotect_rtp: SecurityHook,
        protect_rtcp: SecurityHook,
        unprotect_rtcp: SecurityHook,
    ) -> Self {
        Self {
            protect_rtp,
            unprotect_rtp,
            protect_rtcp,
            unprotect_rtcp,
        }
    }

    pub fn protect_rtp(&self, buf: &mut Vec<u8>) -> Result<(), SecurityError> {
        apply(&self.protect_rtp, buf)
    }

    pub fn unprotect_rtp(&self, buf: &mut Vec<u8>) -> Result<(), SecurityError> {
        apply(&self.unprotect_rtp, buf)
    }

    pub fn protect_rtcp(&self, buf: &mut Vec<u8>) -> Result<(), SecurityError> {
        apply(&self.protect_rtcp, buf)
    }

    pub fn unprotect_rtcp(&self, buf: &mut Vec<u8>) -> Result<(), SecurityError> {
        apply(&self.unprotect_rtcp, buf)
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext").finish_non_exhaustive()
    }
}

/// Set-once slot holding a stream's [`SecurityContext`].
///
/// The first [`set`](Self::set) wins. Later calls are logged and ignored,
/// so keys cannot be swapped under a running stream.
#[derive(Debug)]
pub struct SecuritySlot {
    kind: MediaKind,
    context: OnceLock<SecurityContext>,
}

impl SecuritySlot {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            context: OnceLock::new(),
        }
    }

    /// Install the context. Returns `false` if one was already set.
    pub fn set(&self, context: SecurityContext) -> bool {
        match self.context.set(context) {
            Ok(()) => {
                tracing::debug!(media = %self.kind, "security context installed");
                true
            }
            Err(_) => {
                tracing::warn!(media = %self.kind, "security context already set, ignored");
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.context.get().is_some()
    }

    pub fn get(&self) -> Option<&SecurityContext> {
        self.context.get()
    }

    /// Decrypt an incoming RTP packet.
    ///
    /// Without a context the buffer is returned unchanged. On failure the
    /// buffer is consumed; the caller drops the packet.
    pub fn unprotect_rtp(&self, mut buf: Vec<u8>) -> Result<Vec<u8>, SecurityError> {
        let Some(ctx) = self.context.get() else {
            return Ok(buf);
        };
        match ctx.unprotect_rtp(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) => {
                tracing::warn!(media = %self.kind, code = e.code, len = buf.len(), "SRTP unprotect failed, packet dropped");
                Err(e)
            }
        }
    }

    /// Decrypt an incoming RTCP packet. Same contract as
    /// [`unprotect_rtp`](Self::unprotect_rtp).
    pub fn unprotect_rtcp(&self, mut buf: Vec<u8>) -> Result<Vec<u8>, SecurityError> {
        let Some(ctx) = self.context.get() else {
            return Ok(buf);
        };
        match ctx.unprotect_rtcp(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) => {
                tracing::warn!(media = %self.kind, code = e.code, len = buf.len(), "SRTCP unprotect failed, packet dropped");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_hook(key: u8) -> SecurityHook {
        Arc::new(move |buf: &mut Vec<u8>| {
            buf.iter_mut().for_each(|b| *b ^= key);
            0
        })
    }

    fn failing_hook(code: i32) -> SecurityHook {
        Arc::new(move |_: &mut Vec<u8>| code)
    }

    fn xor_context(key: u8) -> SecurityContext {
        SecurityContext::new(xor_hook(key), xor_hook(key), xor_hook(key), xor_hook(key))
    }

    #[test]
    fn second_set_is_ignored() {
        let slot = SecuritySlot::new(MediaKind::Audio);
        assert!(!slot.is_ready());
        assert!(slot.set(xor_context(0x11)));
        assert!(!slot.set(xor_context(0x22)));
        assert!(slot.is_ready());

        let plain = slot.unprotect_rtp(vec![0x11 ^ 5]).unwrap();
        assert_eq!(plain, vec![5]);
    }

    #[test]
    fn unprotect_without_context_is_passthrough() {
        let slot = SecuritySlot::new(MediaKind::Video);
        assert_eq!(slot.unprotect_rtp(vec![1, 2]).unwrap(), vec![1, 2]);
        assert_eq!(slot.unprotect_rtcp(vec![3]).unwrap(), vec![3]);
    }

    #[test]
    fn unprotect_failure_reports_code() {
        let slot = SecuritySlot::new(MediaKind::Video);
        slot.set(SecurityContext::new(
            xor_hook(1),
            failing_hook(7),
            xor_hook(1),
            failing_hook(9),
        ));
        assert_eq!(slot.unprotect_rtp(vec![1]), Err(SecurityError { code: 7 }));
        assert_eq!(slot.unprotect_rtcp(vec![1]), Err(SecurityError { code: 9 }));
    }

    #[test]
    fn protect_applies_in_place() {
        let ctx = xor_context(0xFF);
        let mut buf = vec![0x00, 0x0F];
        ctx.protect_rtp(&mut buf).unwrap();
        assert_eq!(buf, vec![0xFF, 0xF0]);
    }
}
