//! In-memory frame host for unit and integration testing.
//!
//! Stands in for the embedder's environment: records mounted frames and
//! every posted envelope, and lets tests inject inbound messages with an
//! arbitrary source and origin - including spoofed ones that the session
//! must discard.
//!
//! # Example
//!
//! ```ignore
//! let host = FakeFrameHost::new();
//! let session = WidgetSession::connect(config, Arc::new(host.clone()))?;
//!
//! let frame = host.current_frame().unwrap();
//! host.inject(&frame, event_types::READY, Value::Null);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

use crate::host::{
    FrameHandle, FrameHost, FrameSpec, HostError, InboundMessage, InboundReceiver, InboundSender,
};

/// A captured outbound post.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub frame: FrameHandle,
    pub envelope: Value,
    pub target_origin: String,
}

struct FrameState {
    spec: FrameSpec,
    origin: String,
    attached: bool,
    visible: bool,
    sender: InboundSender,
}

struct HostInner {
    next_id: u64,
    parent_origin: String,
    frames: BTreeMap<u64, FrameState>,
    sent: Vec<SentMessage>,
    fail_posts: bool,
    fail_mounts: bool,
}

/// Shared-state fake; clones all observe the same host.
#[derive(Clone)]
pub struct FakeFrameHost {
    inner: Arc<Mutex<HostInner>>,
}

impl FakeFrameHost {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HostInner {
                next_id: 0,
                parent_origin: "https://integrator.example".to_string(),
                frames: BTreeMap::new(),
                sent: Vec::new(),
                fail_posts: false,
                fail_mounts: false,
            })),
        }
    }

    /// Takes all captured posts, clearing the buffer.
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.inner.lock().sent)
    }

    /// Injects an event from the frame itself, using the frame's own
    /// origin.
    pub fn inject(&self, frame: &FrameHandle, kind: &str, payload: Value) {
        let (sender, origin) = {
            let inner = self.inner.lock();
            let Some(state) = inner.frames.get(&frame.0) else {
                return;
            };
            (state.sender.clone(), state.origin.clone())
        };
        let _ = sender.send(InboundMessage {
            source: *frame,
            origin,
            data: json!({"type": kind, "payload": payload}),
        });
    }

    /// Delivers raw data through `via`'s inbound stream while claiming an
    /// arbitrary source and origin. For exercising the session's
    /// discard-on-mismatch checks.
    pub fn inject_raw(&self, via: &FrameHandle, source: FrameHandle, origin: &str, data: Value) {
        let sender = {
            let inner = self.inner.lock();
            let Some(state) = inner.frames.get(&via.0) else {
                return;
            };
            state.sender.clone()
        };
        let _ = sender.send(InboundMessage {
            source,
            origin: origin.to_string(),
            data,
        });
    }

    /// The most recently mounted frame still present in the host.
    pub fn current_frame(&self) -> Option<FrameHandle> {
        self.inner
            .lock()
            .frames
            .keys()
            .next_back()
            .copied()
            .map(FrameHandle)
    }

    /// Frames currently present (mounted and not yet unmounted).
    pub fn frame_count(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Total number of mounts over the host's lifetime.
    pub fn total_mounts(&self) -> u64 {
        self.inner.lock().next_id
    }

    pub fn is_visible(&self, frame: &FrameHandle) -> bool {
        self.inner
            .lock()
            .frames
            .get(&frame.0)
            .map(|state| state.visible)
            .unwrap_or(false)
    }

    pub fn spec_of(&self, frame: &FrameHandle) -> Option<FrameSpec> {
        self.inner
            .lock()
            .frames
            .get(&frame.0)
            .map(|state| state.spec.clone())
    }

    /// Simulates the counterparty window going away while the frame
    /// element stays in place: posts start failing and `is_attached`
    /// reports false.
    pub fn detach(&self, frame: &FrameHandle) {
        if let Some(state) = self.inner.lock().frames.get_mut(&frame.0) {
            state.attached = false;
        }
    }

    pub fn set_post_failure(&self, fail: bool) {
        self.inner.lock().fail_posts = fail;
    }

    pub fn set_mount_failure(&self, fail: bool) {
        self.inner.lock().fail_mounts = fail;
    }

    pub fn set_parent_origin(&self, origin: impl Into<String>) {
        self.inner.lock().parent_origin = origin.into();
    }
}

impl Default for FakeFrameHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHost for FakeFrameHost {
    fn parent_origin(&self) -> String {
        self.inner.lock().parent_origin.clone()
    }

    fn has_managed_frame(&self, mount_point: &str) -> bool {
        self.inner
            .lock()
            .frames
            .values()
            .any(|state| state.spec.mount_point == mount_point)
    }

    fn mount(&self, spec: FrameSpec) -> Result<(FrameHandle, InboundReceiver), HostError> {
        let mut inner = self.inner.lock();
        if inner.fail_mounts {
            return Err(HostError::MountNotFound(spec.mount_point));
        }
        let origin = Url::parse(&spec.url)
            .map(|url| url.origin().ascii_serialization())
            .map_err(|e| HostError::Other(e.to_string()))?;

        let id = inner.next_id;
        inner.next_id += 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        let visible = spec.visible;
        inner.frames.insert(
            id,
            FrameState {
                spec,
                origin,
                attached: true,
                visible,
                sender,
            },
        );
        Ok((FrameHandle(id), receiver))
    }

    fn unmount(&self, frame: &FrameHandle) {
        self.inner.lock().frames.remove(&frame.0);
    }

    fn set_visible(&self, frame: &FrameHandle, visible: bool) {
        if let Some(state) = self.inner.lock().frames.get_mut(&frame.0) {
            state.visible = visible;
        }
    }

    fn is_attached(&self, frame: &FrameHandle) -> bool {
        self.inner
            .lock()
            .frames
            .get(&frame.0)
            .map(|state| state.attached)
            .unwrap_or(false)
    }

    fn post(
        &self,
        frame: &FrameHandle,
        envelope: &Value,
        target_origin: &str,
    ) -> Result<(), HostError> {
        let mut inner = self.inner.lock();
        if inner.fail_posts {
            return Err(HostError::Other("post failure injected".to_string()));
        }
        match inner.frames.get(&frame.0) {
            Some(state) if state.attached => {}
            _ => return Err(HostError::FrameDetached),
        }
        inner.sent.push(SentMessage {
            frame: *frame,
            envelope: envelope.clone(),
            target_origin: target_origin.to_string(),
        });
        Ok(())
    }
}
