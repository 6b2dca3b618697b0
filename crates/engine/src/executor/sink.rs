//! Destinations for progress lines and diagnostics.

use std::io::Write;

use anyhow::{Result, anyhow};
use crossterm::style::{Color, Stylize, style};
use tracing::{debug, info, warn};

/// Receives human-readable pipeline output.
///
/// `style` is a presentation hint such as `"yellow"`. A sink that cannot honour a style should
/// return an error; the pipeline then re-sends the message unstyled.
pub trait PrintSink: Send + Sync {
    fn print(&self, message: &str, style: Option<&str>) -> Result<()>;
}

impl<F> PrintSink for F
where
    F: Fn(&str, Option<&str>) -> Result<()> + Send + Sync,
{
    fn print(&self, message: &str, style: Option<&str>) -> Result<()> {
        self(message, style)
    }
}

/// Writes to stdout, colouring styled messages with crossterm.
///
/// Style tags are colour names understood by crossterm (`yellow`, `dark_red`, `grey`, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl PrintSink for ConsoleSink {
    fn print(&self, message: &str, style_tag: Option<&str>) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        match style_tag {
            None => writeln!(stdout, "{message}")?,
            Some(tag) => {
                let color = Color::try_from(tag).map_err(|_| anyhow!("unsupported print style '{tag}'"))?;
                writeln!(stdout, "{}", style(message).with(color))?;
            }
        }
        stdout.flush()?;
        Ok(())
    }
}

/// Sends every message to the `tracing` subscriber, keeping stdout free for machine output.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl PrintSink for TracingSink {
    fn print(&self, message: &str, style: Option<&str>) -> Result<()> {
        match style {
            Some(style) => warn!(style, "{message}"),
            None => info!("{message}"),
        }
        Ok(())
    }
}

/// Deliver a message, retrying without the style when the sink rejects it.
///
/// Sink failures never abort the pipeline; a message that cannot be delivered at all is logged.
pub(crate) fn emit(sink: &dyn PrintSink, message: &str, style: Option<&str>) {
    let Err(error) = sink.print(message, style) else {
        return;
    };
    if style.is_some() {
        debug!(error = %error, style, "print sink rejected styled message; retrying without style");
        match sink.print(message, None) {
            Ok(()) => return,
            Err(retry_error) => warn!(error = %retry_error, message, "print sink failed; message dropped"),
        }
    } else {
        warn!(error = %error, message, "print sink failed; message dropped");
    }
}
