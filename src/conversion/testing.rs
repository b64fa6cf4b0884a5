//! Scripted encoder for runner and batch tests

use std::cell::RefCell;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::ffmpeg::{EncodeRequest, Encoder};
use crate::error::EncodeError;

/// Bytes of `frames` silent-looking MPEG-1 Layer III frames (128 kbps, 44.1 kHz)
pub fn fake_mp3_bytes(frames: usize) -> Vec<u8> {
    const FRAME_LEN: usize = 417;
    let mut bytes = Vec::with_capacity(frames * FRAME_LEN);
    for _ in 0..frames {
        bytes.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
        bytes.extend(std::iter::repeat_n(0u8, FRAME_LEN - 4));
    }
    bytes
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behaviour {
    /// Write a small MP3 and succeed
    Succeed,
    /// Exit like ffmpeg with a non-zero status
    Fail,
    /// Write part of the output, then wait until cancelled
    HangUntilCancelled,
}

pub struct FakeEncoder {
    behaviour: Behaviour,
    pub requests: RefCell<Vec<EncodeRequest>>,
}

impl FakeEncoder {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl Encoder for FakeEncoder {
    async fn encode(
        &self,
        request: &EncodeRequest,
        on_progress: &mut dyn FnMut(f32),
        cancel: &CancellationToken,
    ) -> Result<(), EncodeError> {
        self.requests.borrow_mut().push(request.clone());
        match self.behaviour {
            Behaviour::Succeed => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                on_progress(50.0);
                std::fs::write(&request.output, fake_mp3_bytes(20))?;
                on_progress(100.0);
                Ok(())
            }
            Behaviour::Fail => Err(EncodeError::Failed {
                status: "exit status: 1".to_string(),
                diagnostic: "list.txt: Invalid data found when processing input".to_string(),
            }),
            Behaviour::HangUntilCancelled => {
                std::fs::write(&request.output, fake_mp3_bytes(2))?;
                on_progress(10.0);
                cancel.cancelled().await;
                Err(EncodeError::Cancelled)
            }
        }
    }
}
