//! CGEvent text insertion and clipboard-based selection lookup

use std::time::Duration;

use async_trait::async_trait;
use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, CGKeyCode};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use tracing::{debug, info};

use super::TextSink;
use crate::command::run_shell;
use crate::error::OutputError;
use crate::hotkey::keys::codes;

/// Characters per synthetic key event; longer strings get truncated by apps
const CHUNK_CHARS: usize = 20;

/// Time for the focused app to service Cmd+C
const COPY_SETTLE: Duration = Duration::from_millis(80);

const PASTEBOARD_TIMEOUT: Duration = Duration::from_secs(2);

/// Text sink that types through Quartz events
#[derive(Debug, Default)]
pub struct MacTextSink;

impl MacTextSink {
    pub fn new() -> Self {
        Self
    }

    fn type_blocking(text: &str) -> Result<(), OutputError> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| OutputError::EventCreation)?;

        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(CHUNK_CHARS) {
            let utf16: Vec<u16> = chunk
                .iter()
                .flat_map(|c| {
                    let mut buf = [0u16; 2];
                    c.encode_utf16(&mut buf).to_vec()
                })
                .collect();

            let down = CGEvent::new_keyboard_event(source.clone(), 0, true)
                .map_err(|_| OutputError::EventCreation)?;
            down.set_string_from_utf16_unchecked(&utf16);
            down.post(CGEventTapLocation::HID);

            let up = CGEvent::new_keyboard_event(source.clone(), 0, false)
                .map_err(|_| OutputError::EventCreation)?;
            up.post(CGEventTapLocation::HID);
        }
        Ok(())
    }

    fn press_blocking(key: CGKeyCode, flags: CGEventFlags) -> Result<(), OutputError> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| OutputError::EventCreation)?;

        let down = CGEvent::new_keyboard_event(source.clone(), key, true)
            .map_err(|_| OutputError::EventCreation)?;
        down.set_flags(flags);
        down.post(CGEventTapLocation::HID);

        let up = CGEvent::new_keyboard_event(source, key, false)
            .map_err(|_| OutputError::EventCreation)?;
        up.set_flags(flags);
        up.post(CGEventTapLocation::HID);
        Ok(())
    }

    async fn pasteboard() -> Result<String, OutputError> {
        Ok(run_shell("pbpaste", None, &[], PASTEBOARD_TIMEOUT).await?)
    }
}

#[async_trait]
impl TextSink for MacTextSink {
    async fn insert_text(&self, text: &str) -> Result<(), OutputError> {
        if text.is_empty() {
            return Err(OutputError::EmptyText);
        }

        // CGEventSource is not Send
        let owned = text.to_string();
        tokio::task::spawn_blocking(move || Self::type_blocking(&owned))
            .await
            .map_err(|e| OutputError::Task(e.to_string()))??;

        info!(chars = text.chars().count(), "text typed via CGEvent");
        Ok(())
    }

    /// Copies the selection with a synthetic Cmd+C and reads the pasteboard.
    /// An unchanged pasteboard means nothing was selected; the previous
    /// contents are put back afterwards.
    async fn try_selected_text(&self) -> Result<Option<String>, OutputError> {
        let previous = Self::pasteboard().await?;

        tokio::task::spawn_blocking(|| {
            Self::press_blocking(codes::C, CGEventFlags::CGEventFlagCommand)
        })
        .await
        .map_err(|e| OutputError::Task(e.to_string()))??;
        tokio::time::sleep(COPY_SETTLE).await;

        let current = Self::pasteboard().await?;
        if current == previous {
            debug!("pasteboard unchanged after copy");
            return Ok(None);
        }

        run_shell("pbcopy", Some(&previous), &[], PASTEBOARD_TIMEOUT).await?;
        Ok(Some(current))
    }
}
